//! Property-based tests for DAG extraction
//!
//! Documents are generated with dependencies pointing only at earlier tasks,
//! so every generated graph is acyclic unless a test adds a back edge.

use flowkeep::workflow::{DagIssue, DefinitionParser, Relation, WorkflowDocument};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn task_graph() -> impl Strategy<Value = Vec<(String, Vec<usize>)>> {
    // YAML reads these as booleans and null
    let name = "[a-z][a-z0-9_]{0,8}"
        .prop_filter("reserved scalar", |n| !matches!(n.as_str(), "true" | "false" | "null"));
    prop::collection::btree_set(name, 1..12).prop_flat_map(|names| {
        let names: Vec<String> = names.into_iter().collect();
        let deps: Vec<_> = (0..names.len())
            .map(|i| prop::collection::btree_set(0..i.max(1), 0..=i.min(3)))
            .collect();
        (Just(names), deps).prop_map(|(names, deps)| {
            names
                .into_iter()
                .zip(deps)
                .map(|(name, deps)| (name, deps.into_iter().collect()))
                .collect()
        })
    })
}

fn render(graph: &[(String, Vec<usize>)]) -> String {
    let mut out = String::from("workflow:\n  name: generated\ntasks:\n");
    for (name, deps) in graph {
        out.push_str(&format!("  - name: {name}\n    task_type: Shell\n    command: echo {name}\n"));
        if !deps.is_empty() {
            let deps: Vec<_> = deps.iter().map(|d| graph[*d].0.as_str()).collect();
            out.push_str(&format!("    deps: [{}]\n", deps.join(", ")));
        }
    }
    out
}

proptest! {
    #[test]
    fn property_relations_match_declared_deps(graph in task_graph()) {
        let parser = DefinitionParser::new(".").unwrap();
        let view = parser.parse(&render(&graph));

        prop_assert!(view.is_clean(), "{:?}", view.issues);
        prop_assert_eq!(view.tasks.len(), graph.len());

        let graph_ref = &graph;
        let expected: BTreeSet<Relation> = graph
            .iter()
            .flat_map(|(name, deps)| {
                deps.iter().map(move |d| (graph_ref[*d].0.clone(), name.clone()))
            })
            .map(|(from, to)| Relation::new(from, to))
            .collect();
        let actual: BTreeSet<Relation> = view.relations.iter().cloned().collect();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(view.relations.len(), view.relations.iter().collect::<BTreeSet<_>>().len());
    }

    #[test]
    fn property_back_edge_is_reported_as_cycle(graph in task_graph()) {
        prop_assume!(graph.len() >= 2);
        let mut graph = graph;
        let last = graph.len() - 1;
        graph[last].1 = vec![0];
        graph[0].1 = vec![last];

        let view = DefinitionParser::new(".").unwrap().parse(&render(&graph));
        let cycles = view
            .issues
            .iter()
            .filter(|issue| matches!(issue, DagIssue::Cycle { .. }))
            .count();
        prop_assert!(cycles >= 1, "{:?}", view.issues);
        prop_assert_eq!(view.tasks.len(), graph.len());
    }

    #[test]
    fn property_document_survives_reserialization(graph in task_graph()) {
        let doc = WorkflowDocument::from_yaml(&render(&graph)).unwrap();
        let again = WorkflowDocument::from_yaml(&doc.to_yaml().unwrap()).unwrap();
        prop_assert_eq!(again, doc);
    }
}
