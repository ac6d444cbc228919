use crate::cli::Cli;
use crate::error::CliResult;
use clap::CommandFactory;
use clap_complete::Shell;
use std::io::{self, Write};

/// Write the completion script for `shell` to `out`
pub fn write_completion(shell: Shell, out: &mut dyn Write) -> CliResult<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "flowkeep", out);
    out.flush()?;
    Ok(())
}

/// Print shell completion script to stdout
pub fn print_completion(shell: Shell) -> CliResult<()> {
    write_completion(shell, &mut io::stdout().lock())
}
