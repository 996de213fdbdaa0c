//! Four coordinated symbol lookup structures: by name, by kind, by owning
//! file and by scope key.
//!
//! Every mutation goes through [`SymbolIndex::apply`], which updates all four
//! maps in one `&mut self` call. An entry reachable through the name map is
//! therefore always reachable through the kind map, the file map and (when
//! the symbol has a scope) the scope map.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::hash::Hash;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::search::SearchOptions;
use crate::types::FileInfo;
use crate::types::Symbol;
use crate::types::SymbolKind;

/// A symbol together with its owning file and that file's dependency names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolIndexEntry {
    pub symbol: Symbol,
    pub file: FileInfo,
    pub dependencies: Vec<String>,
}

impl SymbolIndexEntry {
    pub fn new(symbol: Symbol, file: FileInfo, dependencies: Vec<String>) -> Self {
        Self {
            symbol,
            file,
            dependencies,
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file.file_path
    }

    fn matches(&self, name: &str, file_path: &Path) -> bool {
        self.symbol.name == name && self.file.file_path == file_path
    }
}

/// A search hit
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolMatch {
    pub entry: Arc<SymbolIndexEntry>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolIndexStats {
    pub total_symbols: usize,
    pub unique_names: usize,
    pub files: usize,
    pub scopes: usize,
    pub symbols_by_kind: BTreeMap<SymbolKind, usize>,
    pub last_updated: DateTime<Utc>,
}

/// The single mutation vocabulary of the index
#[derive(Debug, Clone)]
pub enum IndexCommand {
    Insert(Vec<SymbolIndexEntry>),
    Remove { name: String, file_path: PathBuf },
    RemoveFile(PathBuf),
    /// Drop the `name` entries owned by the replacement's file and insert the
    /// replacement, with no intermediate state visible
    Replace { name: String, replacement: SymbolIndexEntry },
    /// Drop everything owned by `file_path` and insert `entries`
    ReplaceFile { file_path: PathBuf, entries: Vec<SymbolIndexEntry> },
    Clear,
}

#[derive(Debug)]
pub struct SymbolIndex {
    by_name: HashMap<String, Vec<Arc<SymbolIndexEntry>>>,
    by_kind: HashMap<SymbolKind, Vec<Arc<SymbolIndexEntry>>>,
    by_file: HashMap<PathBuf, Vec<Arc<SymbolIndexEntry>>>,
    by_scope: HashMap<String, Vec<Arc<SymbolIndexEntry>>>,
    last_updated: DateTime<Utc>,
}

impl Default for SymbolIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            by_kind: HashMap::new(),
            by_file: HashMap::new(),
            by_scope: HashMap::new(),
            last_updated: Utc::now(),
        }
    }

    /// Apply one command to all four structures. Returns the number of
    /// entries inserted plus removed.
    pub fn apply(&mut self, command: IndexCommand) -> usize {
        let changed = match command {
            IndexCommand::Insert(entries) => entries
                .into_iter()
                .map(|entry| self.insert(Arc::new(entry)))
                .sum(),
            IndexCommand::Remove { name, file_path } => self.remove_where(&name, &file_path),
            IndexCommand::RemoveFile(file_path) => self.remove_file_entries(&file_path),
            IndexCommand::Replace { name, replacement } => {
                let file_path = replacement.file.file_path.clone();
                self.remove_where(&name, &file_path) + self.insert(Arc::new(replacement))
            }
            IndexCommand::ReplaceFile { file_path, entries } => {
                let removed = self.remove_file_entries(&file_path);
                removed
                    + entries
                        .into_iter()
                        .map(|entry| self.insert(Arc::new(entry)))
                        .sum::<usize>()
            }
            IndexCommand::Clear => {
                let total = self.get_total_symbols();
                self.by_name.clear();
                self.by_kind.clear();
                self.by_file.clear();
                self.by_scope.clear();
                total
            }
        };
        self.last_updated = self.last_updated.max(Utc::now());
        changed
    }

    pub fn add_symbol(&mut self, entry: SymbolIndexEntry) {
        self.apply(IndexCommand::Insert(vec![entry]));
    }

    pub fn add_symbols(&mut self, entries: Vec<SymbolIndexEntry>) {
        self.apply(IndexCommand::Insert(entries));
    }

    /// Remove the entries named `name` owned by `file_path`; returns how many went
    pub fn remove_symbol(&mut self, name: &str, file_path: &Path) -> usize {
        self.apply(IndexCommand::Remove {
            name: name.to_string(),
            file_path: file_path.to_path_buf(),
        })
    }

    pub fn remove_file_symbols(&mut self, file_path: &Path) -> usize {
        self.apply(IndexCommand::RemoveFile(file_path.to_path_buf()))
    }

    /// Replace the `name` entries in the replacement's file in one step
    pub fn update_symbol(&mut self, name: &str, replacement: SymbolIndexEntry) {
        self.apply(IndexCommand::Replace {
            name: name.to_string(),
            replacement,
        });
    }

    pub fn has_symbol(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Exact-name lookup; every hit scores 1.0
    pub fn find_symbol(&self, name: &str) -> Vec<SymbolMatch> {
        self.by_name
            .get(name)
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| SymbolMatch {
                        entry: Arc::clone(entry),
                        score: 1.0,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn find_symbols_by_type(&self, kind: SymbolKind) -> Vec<Arc<SymbolIndexEntry>> {
        self.by_kind.get(&kind).cloned().unwrap_or_default()
    }

    /// Exact scope-key match
    pub fn find_symbols_in_scope(&self, scope_key: &str) -> Vec<Arc<SymbolIndexEntry>> {
        self.by_scope.get(scope_key).cloned().unwrap_or_default()
    }

    pub fn find_symbols_in_file(&self, file_path: &Path) -> Vec<Arc<SymbolIndexEntry>> {
        self.by_file.get(file_path).cloned().unwrap_or_default()
    }

    /// Score every distinct name, flatten the hits, sort by descending score
    /// (stable on ties, ties ordered by name) and truncate.
    pub fn search_symbols(&self, pattern: &str, options: &SearchOptions) -> Vec<SymbolMatch> {
        let mut names: Vec<&String> = self.by_name.keys().collect();
        names.sort();

        let mut results: Vec<SymbolMatch> = Vec::new();
        for name in names {
            let Some(score) = options.score(pattern, name) else {
                continue;
            };
            if let Some(entries) = self.by_name.get(name) {
                results.extend(entries.iter().map(|entry| SymbolMatch {
                    entry: Arc::clone(entry),
                    score,
                }));
            }
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(options.max_results);
        results
    }

    pub fn get_total_symbols(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    pub fn get_stats(&self) -> SymbolIndexStats {
        SymbolIndexStats {
            total_symbols: self.get_total_symbols(),
            unique_names: self.by_name.len(),
            files: self.by_file.len(),
            scopes: self.by_scope.len(),
            symbols_by_kind: self
                .by_kind
                .iter()
                .map(|(kind, entries)| (*kind, entries.len()))
                .collect(),
            last_updated: self.last_updated,
        }
    }

    pub const fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn clear(&mut self) {
        self.apply(IndexCommand::Clear);
    }

    fn insert(&mut self, entry: Arc<SymbolIndexEntry>) -> usize {
        self.by_name
            .entry(entry.symbol.name.clone())
            .or_default()
            .push(Arc::clone(&entry));
        self.by_kind
            .entry(entry.symbol.kind)
            .or_default()
            .push(Arc::clone(&entry));
        self.by_file
            .entry(entry.file.file_path.clone())
            .or_default()
            .push(Arc::clone(&entry));
        if let Some(key) = entry.symbol.scope_key() {
            self.by_scope.entry(key).or_default().push(entry);
        }
        1
    }

    fn remove_where(&mut self, name: &str, file_path: &Path) -> usize {
        let Some(bucket) = self.by_name.get(name) else {
            return 0;
        };
        let doomed: Vec<Arc<SymbolIndexEntry>> = bucket
            .iter()
            .filter(|e| e.matches(name, file_path))
            .cloned()
            .collect();
        for entry in &doomed {
            self.detach(entry);
        }
        doomed.len()
    }

    fn remove_file_entries(&mut self, file_path: &Path) -> usize {
        let doomed = self.by_file.get(file_path).cloned().unwrap_or_default();
        for entry in &doomed {
            self.detach(entry);
        }
        doomed.len()
    }

    /// Remove one entry (by identity) from every structure, dropping empty buckets
    fn detach(&mut self, entry: &Arc<SymbolIndexEntry>) {
        remove_from_bucket(&mut self.by_name, &entry.symbol.name, entry);
        remove_from_bucket(&mut self.by_kind, &entry.symbol.kind, entry);
        remove_from_bucket(&mut self.by_file, entry.file_path(), entry);
        if let Some(key) = entry.symbol.scope_key() {
            remove_from_bucket(&mut self.by_scope, key.as_str(), entry);
        }
    }
}

fn remove_from_bucket<K, Q>(map: &mut HashMap<K, Vec<Arc<SymbolIndexEntry>>>, key: &Q, entry: &Arc<SymbolIndexEntry>)
where
    K: Eq + Hash + std::borrow::Borrow<Q>,
    Q: Eq + Hash + ?Sized,
{
    let now_empty = match map.get_mut(key) {
        Some(bucket) => {
            bucket.retain(|e| !Arc::ptr_eq(e, entry));
            bucket.is_empty()
        }
        None => false,
    };
    if now_empty {
        map.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scope;
    use crate::types::ScopeKind;
    use crate::types::SourceLocation;
    use pretty_assertions::assert_eq;

    fn file(path: &str) -> FileInfo {
        FileInfo::from_content(path, "", Utc::now(), Some("Toy".to_string()))
    }

    fn entry(name: &str, kind: SymbolKind, path: &str, scope: Option<Scope>) -> SymbolIndexEntry {
        let mut symbol = Symbol::new(name, kind, SourceLocation::new(path, 1, 1, 1, 2, (0, 1)));
        symbol.scope = scope;
        SymbolIndexEntry::new(symbol, file(path), vec!["std".to_string()])
    }

    fn class_scope(name: &str) -> Scope {
        Scope::new(ScopeKind::Module, Some("app".to_string()))
            .child(ScopeKind::Class, Some(name.to_string()))
    }

    /// Every entry in any structure is present in all the ones it belongs to
    fn assert_coherent(index: &SymbolIndex) {
        let total_by_kind: usize = index.by_kind.values().map(Vec::len).sum();
        let total_by_file: usize = index.by_file.values().map(Vec::len).sum();
        assert_eq!(index.get_total_symbols(), total_by_kind);
        assert_eq!(index.get_total_symbols(), total_by_file);
        for entries in index.by_name.values() {
            for e in entries {
                assert!(index.by_kind[&e.symbol.kind].iter().any(|x| Arc::ptr_eq(x, e)));
                assert!(index.by_file[e.file_path()].iter().any(|x| Arc::ptr_eq(x, e)));
                if let Some(key) = e.symbol.scope_key() {
                    assert!(index.by_scope[&key].iter().any(|x| Arc::ptr_eq(x, e)));
                }
            }
        }
        for bucket in index.by_scope.values() {
            assert!(!bucket.is_empty());
        }
    }

    #[test]
    fn added_symbol_is_found_with_full_score() {
        let mut index = SymbolIndex::new();
        index.add_symbol(entry("render", SymbolKind::Method, "a.toy", Some(class_scope("View"))));

        let hits = index.find_symbol("render");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits[0].entry.symbol.name, "render");
        assert!(index.has_symbol("render"));
        assert_eq!(index.find_symbols_by_type(SymbolKind::Method).len(), 1);
        assert_eq!(index.find_symbols_in_scope("module:app/class:View").len(), 1);
        assert_coherent(&index);
    }

    #[test]
    fn removing_file_cascades_through_every_structure() {
        let mut index = SymbolIndex::new();
        index.add_symbols(vec![
            entry("render", SymbolKind::Method, "a.toy", Some(class_scope("View"))),
            entry("View", SymbolKind::Class, "a.toy", None),
            entry("render", SymbolKind::Function, "b.toy", None),
        ]);

        assert_eq!(index.remove_file_symbols(Path::new("a.toy")), 2);

        assert_eq!(index.find_symbol("render").len(), 1);
        assert!(!index.has_symbol("View"));
        assert!(index.find_symbols_by_type(SymbolKind::Method).is_empty());
        assert!(index.find_symbols_in_file(Path::new("a.toy")).is_empty());
        assert!(index.find_symbols_in_scope("module:app/class:View").is_empty());
        assert!(!index.by_scope.contains_key("module:app/class:View"));
        assert!(!index.by_kind.contains_key(&SymbolKind::Class));
        assert_coherent(&index);
    }

    #[test]
    fn remove_symbol_matches_name_and_file() {
        let mut index = SymbolIndex::new();
        index.add_symbols(vec![
            entry("parse", SymbolKind::Function, "a.toy", None),
            entry("parse", SymbolKind::Function, "b.toy", None),
        ]);

        assert_eq!(index.remove_symbol("parse", Path::new("a.toy")), 1);
        assert_eq!(index.remove_symbol("parse", Path::new("zzz.toy")), 0);

        let hits = index.find_symbol("parse");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.file_path(), Path::new("b.toy"));
        assert_coherent(&index);
    }

    #[test]
    fn update_symbol_swaps_in_one_step() {
        let mut index = SymbolIndex::new();
        index.add_symbol(entry("load", SymbolKind::Function, "a.toy", None));

        index.update_symbol(
            "load",
            entry("load", SymbolKind::Method, "a.toy", Some(class_scope("Store"))),
        );

        let hits = index.find_symbol("load");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.symbol.kind, SymbolKind::Method);
        assert!(index.find_symbols_by_type(SymbolKind::Function).is_empty());
        assert_coherent(&index);
    }

    #[test]
    fn replace_file_swaps_all_entries_of_a_file() {
        let mut index = SymbolIndex::new();
        index.add_symbols(vec![
            entry("old_a", SymbolKind::Function, "a.toy", None),
            entry("old_b", SymbolKind::Function, "a.toy", None),
        ]);

        let changed = index.apply(IndexCommand::ReplaceFile {
            file_path: PathBuf::from("a.toy"),
            entries: vec![entry("fresh", SymbolKind::Function, "a.toy", None)],
        });

        assert_eq!(changed, 3);
        assert!(!index.has_symbol("old_a"));
        assert!(index.has_symbol("fresh"));
        assert_coherent(&index);
    }

    #[test]
    fn fuzzy_search_orders_by_score() {
        let mut index = SymbolIndex::new();
        for name in ["getData", "getDate", "postData", "gd"] {
            index.add_symbol(entry(name, SymbolKind::Function, "a.toy", None));
        }

        let hits = index.search_symbols("gD", &SearchOptions::default());
        let names: Vec<&str> = hits.iter().map(|h| h.entry.symbol.name.as_str()).collect();

        assert_eq!(names, vec!["gd", "getData", "getDate"]);
        assert_eq!(hits[0].score, 1.0);
        assert!((hits[1].score - 2.0 / 7.0).abs() < 1e-9);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn substring_search_ranks_and_truncates() {
        let mut index = SymbolIndex::new();
        for name in ["user", "userName", "currentUser", "account"] {
            index.add_symbol(entry(name, SymbolKind::Variable, "a.toy", None));
        }

        let hits = index.search_symbols("user", &SearchOptions::exact().with_max_results(3));
        let scored: Vec<(&str, f64)> = hits
            .iter()
            .map(|h| (h.entry.symbol.name.as_str(), h.score))
            .collect();
        assert_eq!(
            scored,
            vec![("user", 1.0), ("userName", 0.8), ("currentUser", 0.6)]
        );
    }

    #[test]
    fn stats_and_clear() {
        let mut index = SymbolIndex::new();
        index.add_symbols(vec![
            entry("a", SymbolKind::Function, "a.toy", Some(class_scope("A"))),
            entry("b", SymbolKind::Class, "b.toy", None),
        ]);
        let stats = index.get_stats();
        assert_eq!(stats.total_symbols, 2);
        assert_eq!(stats.files, 2);
        assert_eq!(stats.scopes, 1);
        assert_eq!(stats.symbols_by_kind.get(&SymbolKind::Class), Some(&1));

        let before = index.last_updated();
        index.clear();
        assert_eq!(index.get_total_symbols(), 0);
        assert!(index.last_updated() >= before);
        assert_coherent(&index);
    }
}
