//! Duplicate detection and merging.
//!
//! Entries are grouped by transitive matching: if A matches B under one rule
//! and B matches C under another, all three form one group. The earliest
//! member represents the group.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::ast::NodeId;
use crate::index::Index;
use crate::latex::normalize_for_comparison;
use crate::options::{DuplicateRule, MergeStrategy};
use crate::warning::{Warning, WarningCode};

use super::Transform;

const DOI_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

/// Reports duplicate entries and, with a merge strategy, collapses them.
pub struct MergeEntries {
    rules: Vec<DuplicateRule>,
    merge: Option<MergeStrategy>,
}

impl MergeEntries {
    pub fn new(rules: Vec<DuplicateRule>, merge: Option<MergeStrategy>) -> Self {
        Self { rules, merge }
    }
}

/// The comparison value of `entry` under `rule`, or `None` when the entry
/// lacks the data the rule needs.
fn signature(index: &Index, entry: NodeId, rule: DuplicateRule) -> Option<String> {
    let signature = match rule {
        DuplicateRule::Doi => {
            let doi = index.lookup_rendered(entry, "doi")?.trim().to_lowercase();
            DOI_PREFIXES
                .iter()
                .find_map(|prefix| doi.strip_prefix(prefix))
                .unwrap_or(&doi)
                .trim()
                .to_string()
        }
        DuplicateRule::Key => index.key(entry)?.to_lowercase(),
        DuplicateRule::Abstract => normalize_for_comparison(&index.lookup_rendered(entry, "abstract")?),
        DuplicateRule::Citation => {
            let title = normalize_for_comparison(&index.lookup_rendered(entry, "title")?);
            let author = index.find_field(entry, "author")?;
            let authors: BTreeSet<String> = index
                .name_list(author)
                .iter()
                .filter_map(|name| name.person())
                .filter_map(|person| {
                    let last = normalize_for_comparison(&person.last);
                    if last.is_empty() {
                        return None;
                    }
                    let initial = person
                        .first
                        .as_deref()
                        .map(normalize_for_comparison)
                        .and_then(|first| first.chars().find(|c| c.is_alphanumeric()));
                    Some(match initial {
                        Some(initial) => format!("{last} {initial}"),
                        None => last,
                    })
                })
                .collect();
            if title.is_empty() || authors.is_empty() {
                return None;
            }
            let authors: Vec<&str> = authors.iter().map(String::as_str).collect();
            format!("{}\n{}", authors.join("\t"), title)
        }
    };
    (!signature.is_empty()).then_some(signature)
}

/// Union-find over entry positions where the smaller position is the root.
struct Groups {
    parent: Vec<usize>,
}

impl Groups {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = i;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[high] = low;
    }
}

fn describe(index: &Index, entry: NodeId) -> String {
    match index.key(entry) {
        Some(key) => key.to_string(),
        None => format!("{} entry without key", index.command(entry)),
    }
}

impl Transform for MergeEntries {
    fn name(&self) -> &'static str {
        "merge-entries"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        let entries = index.entries();
        let mut groups = Groups::new(entries.len());
        let mut matched: Vec<Option<DuplicateRule>> = vec![None; entries.len()];

        for rule in &self.rules {
            let mut seen: HashMap<String, usize> = HashMap::new();
            for (i, entry) in entries.iter().enumerate() {
                let Some(signature) = signature(index, *entry, *rule) else {
                    continue;
                };
                match seen.get(&signature) {
                    Some(&first) => {
                        groups.union(first, i);
                        matched[i].get_or_insert(*rule);
                    }
                    None => {
                        seen.insert(signature, i);
                    }
                }
            }
        }

        let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..entries.len() {
            let root = groups.find(i);
            if root != i {
                members.entry(root).or_insert_with(|| vec![root]).push(i);
            }
        }
        let mut roots: Vec<usize> = members.keys().copied().collect();
        roots.sort_unstable();

        let mut warnings = Vec::new();
        for root in roots {
            let group = &members[&root];
            let group_rule = group
                .iter()
                .find_map(|i| matched[*i])
                .unwrap_or(DuplicateRule::Key);
            let kept = match self.merge {
                Some(MergeStrategy::Last) => group[group.len() - 1],
                _ => group[0],
            };
            let kept_entry = entries[kept];

            for &i in group.iter().filter(|i| **i != kept) {
                let duplicate = entries[i];
                let rule = matched[i].unwrap_or(group_rule);
                let message = match self.merge {
                    None => format!(
                        "{} appears to be a duplicate of {}",
                        describe(index, duplicate),
                        describe(index, kept_entry)
                    ),
                    Some(_) => format!(
                        "{} appears to be a duplicate of {} and was merged into it",
                        describe(index, duplicate),
                        describe(index, kept_entry)
                    ),
                };
                warnings.push(Warning::new(WarningCode::DuplicateEntry { rule }, message));

                if let Some(strategy) = self.merge {
                    merge_into(index, kept_entry, duplicate, strategy);
                    index.remove_node(duplicate);
                }
            }
        }
        debug!(duplicates = warnings.len(), "duplicate check complete");
        warnings
    }
}

/// Folds the fields of `duplicate` into `kept`.
fn merge_into(index: &mut Index, kept: NodeId, duplicate: NodeId, strategy: MergeStrategy) {
    if matches!(strategy, MergeStrategy::First | MergeStrategy::Last) {
        return;
    }
    for field in index.fields(duplicate) {
        let name = index.field(field).name.clone();
        match index.find_field(kept, &name) {
            None => {
                index.adopt_field(kept, field);
            }
            Some(existing) if strategy == MergeStrategy::Overwrite => {
                let value = index.field(field).value.clone();
                if value != index.field(existing).value {
                    index.set_value(existing, value);
                }
            }
            Some(_) => {}
        }
    }
}
