//! Environment variable loading utilities
//!
//! Common patterns for loading prefixed environment variables with type
//! conversion and fallback defaults.

use std::env;
use std::str::FromStr;

/// Load an environment variable with a string default
pub fn load_env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Load an environment variable with type conversion and default
pub fn load_env_parsed<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Load an environment variable as an `Option<T>`
pub fn load_env_optional<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Builder for loading multiple environment variables with consistent prefix
#[derive(Debug)]
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    /// Create a new environment loader with the given prefix
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    /// Load a string value with default
    pub fn load_string(&self, suffix: &str, default: &str) -> String {
        load_env_string(&self.key(suffix), default)
    }

    /// Load a parsed value with default
    pub fn load_parsed<T>(&self, suffix: &str, default: T) -> T
    where
        T: FromStr,
    {
        load_env_parsed(&self.key(suffix), default)
    }

    /// Load an optional value
    pub fn load_optional<T>(&self, suffix: &str) -> Option<T>
    where
        T: FromStr,
    {
        load_env_optional(&self.key(suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_load_env_string() {
        let key = "FLOWKEEP_TEST_STRING_VAR";

        env::remove_var(key);
        assert_eq!(load_env_string(key, "fallback"), "fallback");

        env::set_var(key, "from-env");
        assert_eq!(load_env_string(key, "fallback"), "from-env");

        env::remove_var(key);
    }

    #[test]
    #[serial_test::serial]
    fn test_load_env_parsed_falls_back_on_garbage() {
        let key = "FLOWKEEP_TEST_PARSED_VAR";

        env::set_var(key, "not-a-number");
        assert_eq!(load_env_parsed(key, 7u32), 7);

        env::set_var(key, "12");
        assert_eq!(load_env_parsed(key, 7u32), 12);

        env::remove_var(key);
    }

    #[test]
    #[serial_test::serial]
    fn test_env_loader_prefix() {
        env::set_var("FLOWKEEP_TEST_PREFIX_EXTENSION", "yml");

        let loader = EnvLoader::new("FLOWKEEP_TEST_PREFIX");
        assert_eq!(loader.load_string("EXTENSION", "yaml"), "yml");
        assert_eq!(loader.load_optional::<String>("MISSING"), None);

        env::remove_var("FLOWKEEP_TEST_PREFIX_EXTENSION");
    }
}
