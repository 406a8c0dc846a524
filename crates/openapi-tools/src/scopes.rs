//! Authorization scopes required by the published catalog.

use crate::config::{ScopeAlgorithm, ScopeDiscoveryConfig, split_comma_list};
use crate::document::SpecDocument;
use crate::operation::collect_operations;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

/// Greedy set cover: a set of scopes hitting every non-empty group.
///
/// Repeatedly takes the scope present in the most still-uncovered groups; ties go to the
/// lexicographically smallest scope. Candidate counts live in a max-heap and are refreshed
/// lazily (a popped count that is stale is recomputed and pushed back), so each pick only
/// rescans the groups of the scopes it actually pops. Empty groups impose no constraint.
#[must_use]
pub fn minimal_cover<G, S>(groups: &[G]) -> BTreeSet<String>
where
    G: AsRef<[S]>,
    S: AsRef<str>,
{
    let groups: Vec<BTreeSet<&str>> = groups
        .iter()
        .map(|g| g.as_ref().iter().map(AsRef::as_ref).collect::<BTreeSet<_>>())
        .filter(|g| !g.is_empty())
        .collect();

    let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, group) in groups.iter().enumerate() {
        for scope in group {
            index.entry(scope).or_default().push(i);
        }
    }

    let mut heap: BinaryHeap<(usize, Reverse<&str>)> = index
        .iter()
        .map(|(scope, members)| (members.len(), Reverse(*scope)))
        .collect();
    let mut covered = vec![false; groups.len()];
    let mut uncovered = groups.len();
    let mut chosen = BTreeSet::new();

    while uncovered > 0 {
        let Some((count, Reverse(scope))) = heap.pop() else {
            break;
        };
        let members = index.get(scope).map(Vec::as_slice).unwrap_or_default();
        let live = members.iter().filter(|&&g| !covered[g]).count();
        if live == 0 {
            continue;
        }
        if live < count {
            heap.push((live, Reverse(scope)));
            continue;
        }
        for &g in members {
            covered[g] = true;
        }
        uncovered -= live;
        chosen.insert(scope.to_string());
    }
    chosen
}

/// Collects scope groups from the document and reduces them per the configured algorithm.
#[derive(Debug, Clone)]
pub struct ScopeDiscovery {
    extensions: Vec<String>,
    mandatory: Vec<String>,
    algorithm: ScopeAlgorithm,
}

impl ScopeDiscovery {
    #[must_use]
    pub fn new(config: &ScopeDiscoveryConfig) -> Self {
        Self {
            extensions: config.scope_extension_names(),
            mandatory: config.mandatory_scope_list(),
            algorithm: config.calculate_minimal_scopes,
        }
    }

    /// The scopes a client should request, sorted.
    #[must_use]
    pub fn discover(&self, document: &Arc<SpecDocument>) -> BTreeSet<String> {
        let groups = self.scope_groups(document);
        let mut scopes = match self.algorithm {
            ScopeAlgorithm::None => groups.iter().flatten().cloned().collect(),
            ScopeAlgorithm::Greedy => minimal_cover(&groups),
        };
        scopes.extend(self.mandatory.iter().cloned());
        tracing::info!(scopes = ?scopes, "Discovered scopes");
        scopes
    }

    /// One group of alternative scopes per (operation, requirement).
    #[must_use]
    pub fn scope_groups(&self, document: &Arc<SpecDocument>) -> Vec<Vec<String>> {
        if self.extensions.is_empty() {
            security_groups(document)
        } else {
            self.extension_groups(document)
        }
    }

    fn extension_groups(&self, document: &Arc<SpecDocument>) -> Vec<Vec<String>> {
        collect_operations(document)
            .iter()
            .filter_map(|op| {
                self.extensions
                    .iter()
                    .find_map(|name| op.extension(name))
                    .map(extension_scopes)
            })
            .filter(|group| !group.is_empty())
            .collect()
    }
}

/// A list extension gives one scope per item; a string is split on commas.
fn extension_scopes(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => split_comma_list(s),
        _ => Vec::new(),
    }
}

fn security_groups(document: &Arc<SpecDocument>) -> Vec<Vec<String>> {
    // OpenID Connect is built on OAuth2; both carry scopes.
    let scoped: HashSet<&str> = document
        .security_schemes()
        .map(|schemes| {
            schemes
                .iter()
                .filter(|(_, scheme)| {
                    matches!(
                        scheme.get("type").and_then(Value::as_str),
                        Some("oauth2" | "openIdConnect")
                    )
                })
                .map(|(name, _)| name.as_str())
                .collect()
        })
        .unwrap_or_default();

    let mut groups = Vec::new();
    let mut uses_global = false;
    for op in collect_operations(document) {
        match op.operation().get("security").and_then(Value::as_array) {
            Some(requirements) => groups.extend(requirement_groups(&scoped, requirements)),
            None => uses_global = true,
        }
    }
    if uses_global && let Some(global) = document.security() {
        groups.extend(requirement_groups(&scoped, global));
    }
    groups
}

fn requirement_groups(scoped: &HashSet<&str>, requirements: &[Value]) -> Vec<Vec<String>> {
    let mut groups = Vec::new();
    for requirement in requirements {
        let Some(requirement) = requirement.as_object() else {
            continue;
        };
        // `{}` makes security optional: no scopes needed.
        if requirement.is_empty() {
            return Vec::new();
        }
        for (scheme, scopes) in requirement {
            if !scoped.contains(scheme.as_str()) {
                continue;
            }
            let group: Vec<String> = scopes
                .as_array()
                .map(|s| s.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            if !group.is_empty() {
                groups.push(group);
            }
        }
    }
    groups
}
