// 🌍 Country-name reconciliation - rename maps as edges between vocabularies
//
// Every source spells countries its own way. A RenameMap translates one
// source's spellings (`from`) into another's (`to`). Maps are directional and
// pair-specific; the LabelGraph chains them so each source gets a single
// reconciliation pass toward the canonical vocabulary.
//
// "Côte d'Ivoire" in one file, "Cote d'Ivoire" in another → same join key.

use crate::error::{ReconcileError, Result};
use crate::reshape::Observation;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

// ============================================================================
// RENAME MAP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameMap {
    pub name: String,

    /// Vocabulary the keys come from
    pub from: String,

    /// Vocabulary the values belong to
    pub to: String,

    entries: BTreeMap<String, String>,
}

impl RenameMap {
    pub fn new(name: &str, from: &str, to: &str) -> Self {
        RenameMap {
            name: name.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            entries: BTreeMap::new(),
        }
    }

    /// Builder pattern: add entries from (raw, canonical) pairs
    pub fn with_entries<'a, I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (raw, canonical) in entries {
            self.insert(raw, canonical);
        }
        self
    }

    /// Load extra entries from a JSON object of `"raw": "canonical"` pairs
    pub fn from_file<P: AsRef<Path>>(path: P, name: &str, from: &str, to: &str) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let entries: BTreeMap<String, String> = serde_json::from_str(&content)?;

        let mut map = RenameMap::new(name, from, to);
        for (raw, canonical) in &entries {
            map.insert(raw, canonical);
        }
        Ok(map)
    }

    pub fn insert(&mut self, raw: &str, canonical: &str) {
        if let Some(previous) = self.entries.insert(raw.to_string(), canonical.to_string()) {
            if previous != canonical {
                debug!(map = %self.name, raw, previous = %previous, canonical, "Rename entry replaced");
            }
        }
    }

    /// Merge another map's entries over this one's
    pub fn extend(&mut self, other: &RenameMap) {
        for (raw, canonical) in &other.entries {
            self.insert(raw, canonical);
        }
    }

    /// Canonical label for a raw label, if the map knows it
    pub fn lookup(&self, raw: &str) -> Option<&str> {
        self.entries.get(raw).map(|s| s.as_str())
    }

    /// Mapped label, or the input unchanged (never fails on unknown names)
    pub fn apply<'a>(&'a self, raw: &'a str) -> &'a str {
        self.lookup(raw).unwrap_or(raw)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries mapping a label to itself. Kept, but worth a second look:
    /// they may confirm a spelling or may hide an old mismatch.
    pub fn identity_entries(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, v)| k == v)
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Keys that are also another entry's value but map somewhere else.
    /// Applying the map twice moves these labels twice.
    pub fn chained_keys(&self) -> Vec<&str> {
        let values: HashSet<&str> = self.entries.values().map(|v| v.as_str()).collect();
        self.entries
            .iter()
            .filter(|(k, v)| k != v && values.contains(k.as_str()))
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

// ============================================================================
// LABEL GRAPH
// ============================================================================

/// Rename maps viewed as directed edges between vocabularies
#[derive(Debug, Clone, Default)]
pub struct LabelGraph {
    edges: Vec<RenameMap>,
}

impl LabelGraph {
    pub fn new() -> Self {
        LabelGraph { edges: Vec::new() }
    }

    /// Add an edge; a second map for the same (from, to) pair is merged in
    pub fn add(&mut self, map: RenameMap) {
        match self
            .edges
            .iter_mut()
            .find(|e| e.from == map.from && e.to == map.to)
        {
            Some(existing) => existing.extend(&map),
            None => self.edges.push(map),
        }
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&RenameMap> {
        self.edges.iter().find(|e| e.from == from && e.to == to)
    }

    /// Shortest chain of maps from one vocabulary to another (BFS)
    pub fn path(&self, from: &str, to: &str) -> Option<Vec<&RenameMap>> {
        if from == to {
            return Some(Vec::new());
        }

        let mut came_from: HashMap<&str, usize> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        let mut visited = HashSet::from([from]);

        while let Some(current) = queue.pop_front() {
            for (idx, edge) in self.edges.iter().enumerate() {
                if edge.from != current || visited.contains(edge.to.as_str()) {
                    continue;
                }
                visited.insert(edge.to.as_str());
                came_from.insert(edge.to.as_str(), idx);

                if edge.to == to {
                    let mut chain = Vec::new();
                    let mut node = to;
                    while node != from {
                        let edge = &self.edges[came_from[node]];
                        chain.push(edge);
                        node = edge.from.as_str();
                    }
                    chain.reverse();
                    return Some(chain);
                }
                queue.push_back(edge.to.as_str());
            }
        }

        None
    }

    /// Translate a label between vocabularies, applying each map on the path
    pub fn resolve(&self, from: &str, to: &str, label: &str) -> Option<String> {
        let chain = self.path(from, to)?;
        let mut current = label.trim().to_string();
        for map in chain {
            current = map.apply(&current).to_string();
        }
        Some(current)
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelChange {
    pub original: String,
    pub canonical: String,
    pub rows: usize,
}

/// A label that still has no counterpart in the canonical vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedLabel {
    pub source: String,
    pub label: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub source: String,
    pub target: String,
    pub distinct_labels: usize,
    pub renamed: Vec<LabelChange>,
    pub unmatched: Vec<UnmatchedLabel>,
}

impl ReconcileReport {
    pub fn summary(&self) -> String {
        format!(
            "{} → {}: {} labels, {} renamed, {} unmatched",
            self.source,
            self.target,
            self.distinct_labels,
            self.renamed.len(),
            self.unmatched.len()
        )
    }
}

/// One reconciliation pass per source toward a single target vocabulary.
///
/// Unmatched labels are logged once per run, however many sources or rows
/// carry them.
pub struct Reconciler<'g> {
    graph: &'g LabelGraph,
    target: String,
    canonical: HashSet<String>,
    reported: HashSet<(String, String)>,
}

impl<'g> Reconciler<'g> {
    /// `canonical` is the set of labels the target vocabulary actually
    /// contains; pass an empty set to skip the unmatched check.
    pub fn new(graph: &'g LabelGraph, target: &str, canonical: HashSet<String>) -> Self {
        Reconciler {
            graph,
            target: target.to_string(),
            canonical,
            reported: HashSet::new(),
        }
    }

    /// Rewrite every observation's country label in place
    pub fn reconcile(
        &mut self,
        source: &str,
        observations: &mut [Observation],
    ) -> Result<ReconcileReport> {
        let graph = self.graph;
        let target = self.target.as_str();

        if graph.path(source, target).is_none() {
            return Err(ReconcileError::Config(format!(
                "no rename path from '{}' to '{}'",
                source, target
            )));
        }

        // raw label → (canonical label, rows)
        let mut resolved: BTreeMap<String, (String, usize)> = BTreeMap::new();
        for obs in observations.iter_mut() {
            let entry = resolved.entry(obs.country.clone()).or_insert_with(|| {
                let label = graph
                    .resolve(source, target, &obs.country)
                    .unwrap_or_else(|| obs.country.trim().to_string());
                (label, 0)
            });
            entry.1 += 1;
            obs.country = entry.0.clone();
        }

        let mut report = ReconcileReport {
            source: source.to_string(),
            target: self.target.clone(),
            distinct_labels: resolved.len(),
            ..Default::default()
        };

        for (raw, (canonical, rows)) in resolved {
            if raw != canonical {
                debug!(source, raw = %raw, canonical = %canonical, rows, "Label renamed");
                report.renamed.push(LabelChange {
                    original: raw.clone(),
                    canonical: canonical.clone(),
                    rows,
                });
            }

            if self.canonical.is_empty() || self.canonical.contains(&canonical) {
                continue;
            }

            if self.reported.insert((source.to_string(), raw.clone())) {
                warn!(source, label = %raw, resolved = %canonical, rows, "Unmatched country label");
            }
            report.unmatched.push(UnmatchedLabel {
                source: source.to_string(),
                label: raw,
                rows,
            });
        }

        Ok(report)
    }
}

// ============================================================================
// BUILT-IN MAPS
// ============================================================================

pub mod builtin {
    use super::{LabelGraph, RenameMap};

    pub const MIXED: &str = "mixed";
    pub const REFERENCE: &str = "reference";
    pub const DOMESTIC: &str = "domestic";
    pub const IMPORTERS: &str = "importers";
    pub const POPULATION: &str = "population";

    /// Spellings found across the trade/consumption files → reference (GDP) file
    pub fn standardizer() -> RenameMap {
        RenameMap::new("standardizer", MIXED, REFERENCE).with_entries([
            ("Bolivia (Plurinational State of)", "Bolivia"),
            ("United States of America", "United States"),
            ("Russian Federation", "Russia"),
            ("United Republic of Tanzania", "Tanzania"),
            ("Viet Nam", "Vietnam"),
            ("Republic of Korea", "South Korea"),
            ("Democratic People's Republic of Korea", "North Korea"),
            ("Türkiye", "Turkey"),
            ("Côte d'Ivoire", "Côte d'Ivoire"),
            ("Dem. Rep. Congo", "Dem. Rep. Congo"),
            ("Democratic Republic of Congo", "Dem. Rep. Congo"),
            ("Congo", "Congo"),
            ("Bosnia and Herzegovina", "Bosnia and Herz."),
            ("Bosnia and Herz", "Bosnia and Herz."),
            ("Dominican Rep.", "Dominican Rep."),
            ("Dominican Republic", "Dominican Rep."),
            ("Central African Rep.", "Central African Rep."),
            ("Central African Republic", "Central African Rep."),
            ("Eq. Guinea", "Eq. Guinea"),
            ("Equatorial Guinea", "Eq. Guinea"),
            ("Timor-Leste", "Timor-Leste"),
            ("Hong Kong SAR, China", "Hong Kong"),
            ("Brunei Darussalam", "Brunei"),
            ("United Kingdom of Great Britain and Northern Ireland", "United Kingdom"),
            ("Venezuela (Bolivarian Republic of)", "Venezuela"),
            ("Iran (Islamic Republic of)", "Iran"),
            ("Republic of Moldova", "Moldova"),
            ("Lao People's Democratic Republic", "Lao PDR"),
            ("Cabo Verde", "Cabo Verde"),
            ("Cape Verde", "Cabo Verde"),
            ("Myanmar", "Myanmar"),
            ("Burma", "Myanmar"),
            ("Syria", "Syrian Arab Rep."),
            ("Syrian Arab Republic", "Syrian Arab Rep."),
            ("North Macedonia", "North Macedonia"),
            ("Macedonia", "North Macedonia"),
            ("TFYR Macedonia", "North Macedonia"),
            ("Czechia", "Czechia"),
            ("Czech Republic", "Czechia"),
            ("Eswatini", "Eswatini"),
            ("Swaziland", "Eswatini"),
            ("Kyrgyz Republic", "Kyrgyzstan"),
            ("Saint Lucia", "St. Lucia"),
            ("Saint Kitts and Nevis", "St. Kitts and Nevis"),
            ("Saint Vincent and the Grenadines", "St. Vincent and the Grenadines"),
        ])
    }

    /// Domestic-consumption spellings → population (World Bank) spellings
    pub fn domestic_to_population() -> RenameMap {
        RenameMap::new("domestic_to_population", DOMESTIC, POPULATION).with_entries([
            ("United States", "United States"),
            ("Dem. Rep. Congo", "Congo, Dem. Rep."),
            ("Congo", "Congo, Rep."),
            ("Dominican Rep.", "Dominican Republic"),
            ("Central African Rep.", "Central African Republic"),
            ("Eq. Guinea", "Equatorial Guinea"),
            ("Cote d'Ivoire", "Cote d'Ivoire"),
        ])
    }

    /// Importer spellings already match; the edge only trims whitespace
    pub fn importers_to_population() -> RenameMap {
        RenameMap::new("importers_to_population", IMPORTERS, POPULATION)
    }

    /// Graph used by the consumption merger
    pub fn merge_graph() -> LabelGraph {
        let mut graph = LabelGraph::new();
        graph.add(domestic_to_population());
        graph.add(importers_to_population());
        graph
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_identity_fallback() {
        let map = builtin::standardizer();

        assert_eq!(map.apply("Viet Nam"), "Vietnam");
        assert_eq!(map.apply("Burma"), "Myanmar");
        assert_eq!(map.apply("Atlantis"), "Atlantis");
        assert_eq!(map.lookup("Atlantis"), None);
    }

    #[test]
    fn test_builtin_maps_are_stable() {
        for map in [
            builtin::standardizer(),
            builtin::domestic_to_population(),
            builtin::importers_to_population(),
        ] {
            assert!(map.chained_keys().is_empty(), "{} has chained keys", map.name);

            // Every entry whose key is not another entry's value
            let values: HashSet<&str> = map.entries().map(|(_, v)| v).collect();
            for (key, _) in map.entries().filter(|(k, v)| k == v || !values.contains(k)) {
                let once = map.apply(key);
                assert_eq!(map.apply(once), once, "{}: '{}' moved twice", map.name, key);
            }
            assert!(map.entries().all(|(k, _)| map.apply(map.apply(k)) == map.apply(k)));
        }
    }

    #[test]
    fn test_chained_keys_break_stability() {
        let map = RenameMap::new("risky", "a", "b").with_entries([("A", "B"), ("B", "C")]);

        assert_eq!(map.chained_keys(), vec!["B"]);
        assert_eq!(map.apply(map.apply("A")), "C");
    }

    #[test]
    fn test_identity_entries_flagged_not_removed() {
        let map = builtin::standardizer();
        let identities = map.identity_entries();

        assert!(identities.contains(&"Côte d'Ivoire"));
        assert!(identities.contains(&"Myanmar"));
        assert!(!identities.contains(&"Burma"));
        assert_eq!(map.lookup("Myanmar"), Some("Myanmar"));
    }

    #[test]
    fn test_from_file_and_extend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extra.json");
        fs::write(&path, r#"{ "Holland": "Netherlands", "Burma": "Myanmar (Burma)" }"#).unwrap();

        let extra = RenameMap::from_file(&path, "extra", builtin::MIXED, builtin::REFERENCE).unwrap();
        let mut map = builtin::standardizer();
        map.extend(&extra);

        assert_eq!(map.apply("Holland"), "Netherlands");
        assert_eq!(map.apply("Burma"), "Myanmar (Burma)");
    }

    #[test]
    fn test_graph_multi_hop_resolution() {
        let mut graph = LabelGraph::new();
        graph.add(RenameMap::new("a_to_b", "a", "b").with_entries([("Viet Nam", "Vietnam")]));
        graph.add(RenameMap::new("b_to_c", "b", "c").with_entries([("Vietnam", "Viet Nam (VN)")]));

        assert_eq!(graph.path("a", "c").unwrap().len(), 2);
        assert_eq!(graph.resolve("a", "c", " Viet Nam ").unwrap(), "Viet Nam (VN)");
        assert_eq!(graph.resolve("a", "a", "x").unwrap(), "x");
        assert!(graph.resolve("c", "a", "x").is_none());
    }

    #[test]
    fn test_graph_merges_same_edge() {
        let mut graph = LabelGraph::new();
        graph.add(RenameMap::new("one", "a", "b").with_entries([("X", "Y")]));
        graph.add(RenameMap::new("two", "a", "b").with_entries([("P", "Q")]));

        let edge = graph.edge("a", "b").unwrap();
        assert_eq!(edge.len(), 2);
    }

    #[test]
    fn test_reconciler_renames_and_reports_unmatched() {
        let graph = builtin::merge_graph();
        let canonical: HashSet<String> = ["Congo, Dem. Rep.", "Brazil"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut reconciler = Reconciler::new(&graph, builtin::POPULATION, canonical);

        let mut obs = vec![
            Observation::new("Dem. Rep. Congo", 1990, Some(1.0)),
            Observation::new("Dem. Rep. Congo", 1991, Some(2.0)),
            Observation::new("Brazil", 1990, Some(3.0)),
            Observation::new("Atlantis", 1990, Some(4.0)),
        ];

        let report = reconciler.reconcile(builtin::DOMESTIC, &mut obs).unwrap();

        assert_eq!(obs[0].country, "Congo, Dem. Rep.");
        assert_eq!(obs[1].country, "Congo, Dem. Rep.");
        assert_eq!(report.distinct_labels, 3);
        assert_eq!(report.renamed.len(), 1);
        assert_eq!(report.renamed[0].rows, 2);
        assert_eq!(
            report.unmatched,
            vec![UnmatchedLabel {
                source: "domestic".to_string(),
                label: "Atlantis".to_string(),
                rows: 1,
            }]
        );
    }

    #[test]
    fn test_reconciler_follows_multi_hop_chain() {
        let mut graph = LabelGraph::new();
        graph.add(RenameMap::new("a_to_b", "a", "b").with_entries([("Viet Nam", "Vietnam")]));
        graph.add(RenameMap::new("b_to_c", "b", "c").with_entries([("Vietnam", "Viet Nam (VN)")]));
        let mut reconciler = Reconciler::new(&graph, "c", HashSet::new());

        let mut obs = vec![
            Observation::new(" Viet Nam", 1990, Some(1.0)),
            Observation::new("Peru", 1990, Some(2.0)),
        ];
        let report = reconciler.reconcile("a", &mut obs).unwrap();

        assert_eq!(obs[0].country, "Viet Nam (VN)");
        assert_eq!(obs[1].country, "Peru");
        assert_eq!(report.renamed.len(), 1);
        assert_eq!(report.renamed[0].original, " Viet Nam");
    }

    #[test]
    fn test_reconciler_trims_importer_labels() {
        let graph = builtin::merge_graph();
        let mut reconciler = Reconciler::new(&graph, builtin::POPULATION, HashSet::new());

        let mut obs = vec![Observation::new("  Austria ", 1990, Some(1.0))];
        let report = reconciler.reconcile(builtin::IMPORTERS, &mut obs).unwrap();

        assert_eq!(obs[0].country, "Austria");
        assert!(report.unmatched.is_empty());
    }

    #[test]
    fn test_reconciler_unknown_source_is_config_error() {
        let graph = builtin::merge_graph();
        let mut reconciler = Reconciler::new(&graph, builtin::POPULATION, HashSet::new());

        let err = reconciler.reconcile("nowhere", &mut []).unwrap_err();
        assert!(matches!(err, ReconcileError::Config(_)));
    }
}
