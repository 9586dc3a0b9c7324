//! Reference graph between presets.
//!
//! A preset depends on another when one of the configured top-level keys
//! (`base_preset`, `inherits`, `reference` by default) names it, either as a
//! string or as a list of strings.

use satin_core::{ConfigDocument, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::preset::PresetStore;

pub const DEFAULT_DEPENDENCY_KEYS: [&str; 3] = ["base_preset", "inherits", "reference"];

pub fn default_dependency_keys() -> Vec<String> {
    DEFAULT_DEPENDENCY_KEYS.iter().map(|k| k.to_string()).collect()
}

/// Preset names referenced by `document` under `keys`.
pub fn collect_dependencies(document: &ConfigDocument, keys: &[String]) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();
    for key in keys {
        match document.get(key) {
            Some(Value::String(target)) => {
                deps.insert(target.clone());
            }
            Some(Value::Array(items)) => {
                deps.extend(items.iter().filter_map(Value::as_str).map(str::to_string));
            }
            _ => {}
        }
    }
    deps
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DependencySummary {
    pub total_presets: usize,
    pub max_dependencies: usize,
    pub max_dependents: usize,
    pub max_depth: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    presets: BTreeSet<String>,
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn build<'a, I>(documents: I, keys: &[String]) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a ConfigDocument)>,
    {
        let mut graph = Self::default();
        for (name, document) in documents {
            graph.presets.insert(name.to_string());
            let deps = collect_dependencies(document, keys);
            if !deps.is_empty() {
                graph.edges.insert(name.to_string(), deps);
            }
        }
        graph
    }

    /// Graph over the latest version of every preset in `store`.
    pub fn from_store(store: &PresetStore, keys: &[String]) -> Result<Self> {
        let mut latest = Vec::new();
        for summary in store.list()? {
            latest.push(store.load(&summary.name, Some(summary.latest_version))?);
        }
        Ok(Self::build(
            latest.iter().map(|p| (p.name.as_str(), &p.parameters)),
            keys,
        ))
    }

    pub fn presets(&self) -> &BTreeSet<String> {
        &self.presets
    }

    /// Presets that have at least one dependency, with their targets.
    pub fn edges(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.edges
    }

    pub fn dependencies(&self, name: &str) -> BTreeSet<String> {
        self.edges.get(name).cloned().unwrap_or_default()
    }

    /// Target → presets that reference it.
    pub fn inverted(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut inverse: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (source, targets) in &self.edges {
            for target in targets {
                inverse
                    .entry(target.clone())
                    .or_default()
                    .insert(source.clone());
            }
        }
        inverse
    }

    pub fn dependents(&self, name: &str) -> BTreeSet<String> {
        self.edges
            .iter()
            .filter(|(_, targets)| targets.contains(name))
            .map(|(source, _)| source.clone())
            .collect()
    }

    /// Presets that neither reference nor are referenced by anything.
    pub fn isolated(&self) -> BTreeSet<String> {
        let referenced: BTreeSet<&String> = self.edges.values().flatten().collect();
        self.presets
            .iter()
            .filter(|p| !referenced.contains(p) && !self.edges.contains_key(p.as_str()))
            .cloned()
            .collect()
    }

    /// Every transitive dependency of `name`.
    pub fn descendants(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = vec![name];
        while let Some(node) = stack.pop() {
            for child in self.edges.get(node).into_iter().flatten() {
                if seen.insert(child.clone()) {
                    stack.push(child);
                }
            }
        }
        seen
    }

    /// Every preset that transitively depends on `name`.
    pub fn ancestors(&self, name: &str) -> BTreeSet<String> {
        let inverse = self.inverted();
        let mut seen = BTreeSet::new();
        let mut stack: Vec<String> = vec![name.to_string()];
        while let Some(node) = stack.pop() {
            for parent in inverse.get(&node).into_iter().flatten() {
                if seen.insert(parent.clone()) {
                    stack.push(parent.clone());
                }
            }
        }
        seen
    }

    /// Reference cycles, each starting and ending at its smallest name.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut found = BTreeSet::new();
        for start in self.edges.keys() {
            let mut path = vec![start.as_str()];
            self.walk_cycles(start, start, &mut path, &mut found);
        }
        found.into_iter().collect()
    }

    /// Extends `path` through nodes not smaller than `start`, so every cycle is
    /// found from its smallest member.
    fn walk_cycles<'a>(
        &'a self,
        start: &'a str,
        node: &'a str,
        path: &mut Vec<&'a str>,
        found: &mut BTreeSet<Vec<String>>,
    ) {
        for next in self.edges.get(node).into_iter().flatten() {
            let next = next.as_str();
            if next == start {
                found.insert(normalize_cycle(path));
            } else if next > start && !path.contains(&next) {
                path.push(next);
                self.walk_cycles(start, next, path, found);
                path.pop();
            }
        }
    }

    /// Longest reference chain, counting presets. Cycles are cut where they
    /// close.
    pub fn max_depth(&self) -> usize {
        let mut memo = BTreeMap::new();
        self.edges
            .keys()
            .map(|node| self.depth(node, &mut BTreeSet::new(), &mut memo))
            .max()
            .unwrap_or(0)
    }

    fn depth<'a>(
        &'a self,
        node: &'a str,
        on_stack: &mut BTreeSet<&'a str>,
        memo: &mut BTreeMap<&'a str, usize>,
    ) -> usize {
        if let Some(depth) = memo.get(node) {
            return *depth;
        }
        if !on_stack.insert(node) {
            return 0;
        }
        let deepest_child = self
            .edges
            .get(node)
            .into_iter()
            .flatten()
            .map(|child| self.depth(child, on_stack, memo))
            .max()
            .unwrap_or(0);
        on_stack.remove(node);
        memo.insert(node, deepest_child + 1);
        deepest_child + 1
    }

    pub fn summary(&self) -> DependencySummary {
        DependencySummary {
            total_presets: self.presets.len(),
            max_dependencies: self.edges.values().map(BTreeSet::len).max().unwrap_or(0),
            max_dependents: self
                .inverted()
                .values()
                .map(BTreeSet::len)
                .max()
                .unwrap_or(0),
            max_depth: self.max_depth(),
        }
    }

    /// Graphviz DOT rendering of the reference edges.
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph dependencies {\n");
        for (source, targets) in &self.edges {
            for target in targets {
                let _ = writeln!(dot, "  \"{}\" -> \"{}\";", source, target);
            }
        }
        dot.push_str("}\n");
        dot
    }
}

fn normalize_cycle(nodes: &[&str]) -> Vec<String> {
    let start = nodes
        .iter()
        .enumerate()
        .min_by_key(|(_, n)| **n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut cycle: Vec<String> = nodes[start..]
        .iter()
        .chain(&nodes[..start])
        .map(|n| n.to_string())
        .collect();
    if let Some(first) = cycle.first().cloned() {
        cycle.push(first);
    }
    cycle
}
