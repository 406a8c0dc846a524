//! `OpenAPI` `$ref` resolution.
//!
//! MCP tool input schemas cannot contain references, so the published document is fully
//! expanded: every `$ref` (inside parameters, request bodies, responses and composed schemas) is
//! replaced by a copy of its target.
//!
//! Supported references:
//! - Local refs (`#/...`)
//! - File refs (`./common.yaml#/...`, `/abs/path/spec.yaml#/...`, `file:///...#/...`)
//! - URL refs (`https://example.com/common.yaml#/...`)
//!
//! Key detail: `$ref` resolution is **relative to the document that contains the `$ref`**, so the
//! expansion carries the current document id (`DocId`) down the tree.
//!
//! Resolution runs in two phases: every external document reachable from the root is loaded
//! up front (async), then the tree is expanded synchronously from the cache.

use crate::document::SpecDocument;
use crate::error::{OpenApiToolsError, Result};
use openapi_mcp_http_tools::runtime::{redact_url, sanitize_reqwest_error};
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocId {
    Url(Url),
    File(PathBuf),
}

impl DocId {
    /// Parse a root spec location into a document identifier (URL or file path).
    ///
    /// # Errors
    ///
    /// Returns an error if the location is an invalid URL or invalid file URL.
    pub fn parse(spec_location: &str) -> Result<Self> {
        if spec_location.starts_with("http://") || spec_location.starts_with("https://") {
            let url = Url::parse(spec_location).map_err(|e| {
                OpenApiToolsError::invalid_spec(spec_location, format!("invalid URL: {e}"))
            })?;
            Ok(DocId::Url(strip_fragment(url)))
        } else if spec_location.starts_with("file://") {
            let url = Url::parse(spec_location).map_err(|e| {
                OpenApiToolsError::invalid_spec(spec_location, format!("invalid file URL: {e}"))
            })?;
            let path = url.to_file_path().map_err(|()| {
                OpenApiToolsError::invalid_spec(spec_location, "file URL cannot be converted to a path")
            })?;
            Ok(DocId::File(canonicalize_best_effort(path)))
        } else {
            Ok(DocId::File(canonicalize_best_effort(PathBuf::from(
                spec_location,
            ))))
        }
    }

    #[must_use]
    pub fn display(&self) -> String {
        match self {
            DocId::Url(u) => redact_url(u),
            DocId::File(p) => p.display().to_string(),
        }
    }

    fn key(&self) -> String {
        match self {
            DocId::Url(u) => format!("url:{u}"),
            DocId::File(p) => format!("file:{}", p.display()),
        }
    }
}

fn strip_fragment(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

fn canonicalize_best_effort(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}

/// Fetches raw document text from files or http(s) URLs.
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    client: Client,
}

impl DocumentLoader {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Read the document text behind `doc`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the URL cannot be fetched, or the server
    /// answers with a non-success status.
    pub async fn fetch_text(&self, doc: &DocId) -> Result<String> {
        match doc {
            DocId::File(path) => std::fs::read_to_string(path).map_err(|e| {
                OpenApiToolsError::OpenApiSpecReadFile {
                    path: path.display().to_string(),
                    source: e,
                }
            }),
            DocId::Url(url) => {
                let resp = self.client.get(url.clone()).send().await.map_err(|e| {
                    OpenApiToolsError::OpenApiSpecFetch {
                        url: redact_url(url),
                        message: sanitize_reqwest_error(&e),
                    }
                })?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(OpenApiToolsError::OpenApiSpecFetch {
                        url: redact_url(url),
                        message: format!("server answered {status}"),
                    });
                }
                resp.text()
                    .await
                    .map_err(|e| OpenApiToolsError::OpenApiSpecFetch {
                        url: redact_url(url),
                        message: sanitize_reqwest_error(&e),
                    })
            }
        }
    }
}

/// Parse JSON or YAML text into a JSON tree.
pub(crate) fn parse_document_text(content: &str) -> std::result::Result<Value, String> {
    serde_json::from_str(content)
        .or_else(|_| serde_yaml::from_str(content))
        .map_err(|e: serde_yaml::Error| e.to_string())
}

#[derive(Debug)]
pub struct OpenApiResolver<'a> {
    loader: &'a DocumentLoader,
    docs: RwLock<HashMap<DocId, Arc<Value>>>,
}

impl<'a> OpenApiResolver<'a> {
    #[must_use]
    pub fn new(loader: &'a DocumentLoader) -> Self {
        Self {
            loader,
            docs: RwLock::new(HashMap::new()),
        }
    }

    /// Fully expand every `$ref` in `document`, which was read from `root`.
    ///
    /// Cyclic references are cut at the point where the cycle re-enters and replaced by `{}`.
    /// Once a group of mutually referencing targets is entered, each member is inlined at most
    /// once below that entry, so densely cyclic schema graphs stay polynomial in size.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::InvalidSpecification`] carrying every unresolvable
    /// reference, or a load error for external documents that cannot be fetched.
    pub async fn resolve(&self, root: &DocId, document: SpecDocument) -> Result<SpecDocument> {
        let root_value = Arc::new(document.into_value());
        self.docs.write().insert(root.clone(), Arc::clone(&root_value));

        self.preload(root).await?;

        let mut state = Expansion {
            components: self.ref_components(root, &root_value),
            ..Expansion::default()
        };
        let expanded = self.expand(root, &root_value, &mut state);

        if !state.errors.is_empty() {
            return Err(OpenApiToolsError::InvalidSpecification {
                location: root.display(),
                messages: state.errors,
            });
        }
        if state.cycles > 0 {
            tracing::warn!(
                cycles = state.cycles,
                "cyclic $ref chains were cut while resolving {}",
                root.display()
            );
        }
        Ok(SpecDocument::new(expanded))
    }

    async fn preload(&self, root: &DocId) -> Result<()> {
        let mut queue: VecDeque<DocId> = VecDeque::from([root.clone()]);
        let mut scanned: HashSet<DocId> = HashSet::new();

        while let Some(doc) = queue.pop_front() {
            if !scanned.insert(doc.clone()) {
                continue;
            }
            let value = self.load_doc(&doc).await?;
            let mut refs = Vec::new();
            collect_refs(&value, &mut refs);
            for reference in refs {
                // Malformed refs are reported by the expansion phase.
                if let Ok((target, _)) = Self::parse_ref(&doc, &reference)
                    && !scanned.contains(&target)
                {
                    queue.push_back(target);
                }
            }
        }
        Ok(())
    }

    fn expand(&self, doc: &DocId, value: &Value, state: &mut Expansion) -> Value {
        match value {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("$ref") {
                    return self.expand_ref(doc, reference, map, state);
                }
                Value::Object(
                    map.iter()
                        .map(|(k, v)| (k.clone(), self.expand(doc, v, state)))
                        .collect(),
                )
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.expand(doc, v, state)).collect())
            }
            other => other.clone(),
        }
    }

    fn expand_ref(
        &self,
        doc: &DocId,
        reference: &str,
        node: &Map<String, Value>,
        state: &mut Expansion,
    ) -> Value {
        let (target_doc, pointer) = match Self::parse_ref(doc, reference) {
            Ok(parsed) => parsed,
            Err(e) => {
                state.errors.push(e.to_string());
                return Value::Object(Map::new());
            }
        };

        let key = ref_key(&target_doc, pointer.as_deref());

        let component = state.components.get(&key).copied();
        let inside = state
            .scopes
            .last()
            .is_some_and(|scope| component.is_some() && scope.component == component);

        let mut resolved = if inside {
            let first_visit = state
                .scopes
                .last_mut()
                .is_some_and(|scope| scope.visited.insert(key.clone()));
            if first_visit {
                self.inline_target(&target_doc, pointer.as_deref(), reference, state)
            } else {
                tracing::debug!(reference, "cyclic $ref replaced with an empty schema");
                state.cycles += 1;
                Value::Object(Map::new())
            }
        } else if let Some(done) = state.memo.get(&key) {
            done.clone()
        } else {
            // Nothing below an entry can reach back into the enclosing scopes.
            state.scopes.push(Scope {
                component,
                visited: HashSet::from([key.clone()]),
            });
            let expanded = self.inline_target(&target_doc, pointer.as_deref(), reference, state);
            state.scopes.pop();
            state.memo.insert(key, expanded.clone());
            expanded
        };

        // Sibling keywords next to `$ref` override the target.
        if node.len() > 1
            && let Value::Object(target_map) = &mut resolved
        {
            for (k, v) in node.iter().filter(|(k, _)| k.as_str() != "$ref") {
                target_map.insert(k.clone(), self.expand(doc, v, state));
            }
        }
        resolved
    }

    fn inline_target(
        &self,
        target_doc: &DocId,
        pointer: Option<&str>,
        reference: &str,
        state: &mut Expansion,
    ) -> Value {
        match self.lookup(target_doc, pointer) {
            Some(target) => self.expand(target_doc, &target, state),
            None => {
                state.errors.push(format!(
                    "Unresolved $ref '{reference}' (doc {})",
                    target_doc.display()
                ));
                Value::Object(Map::new())
            }
        }
    }

    /// Strongly connected components of the `$ref` graph reachable from the root.
    fn ref_components(&self, root: &DocId, root_value: &Value) -> HashMap<String, usize> {
        let mut graph = RefGraph::default();
        let mut pending = Self::ref_targets(root, root_value);
        while let Some((doc, pointer)) = pending.pop() {
            let key = ref_key(&doc, pointer.as_deref());
            if graph.edges.contains_key(&key) {
                continue;
            }
            let targets = self
                .lookup(&doc, pointer.as_deref())
                .map(|value| Self::ref_targets(&doc, &value))
                .unwrap_or_default();
            graph.edges.insert(
                key,
                targets.iter().map(|(d, p)| ref_key(d, p.as_deref())).collect(),
            );
            pending.extend(targets);
        }
        graph.components()
    }

    fn ref_targets(doc: &DocId, value: &Value) -> Vec<(DocId, Option<String>)> {
        let mut refs = Vec::new();
        collect_refs(value, &mut refs);
        refs.iter()
            .filter_map(|reference| Self::parse_ref(doc, reference).ok())
            .collect()
    }

    fn lookup(&self, doc: &DocId, pointer: Option<&str>) -> Option<Value> {
        let doc_value = self.docs.read().get(doc).cloned()?;
        match pointer {
            Some(ptr) => doc_value.pointer(ptr).cloned(),
            None => Some((*doc_value).clone()),
        }
    }

    fn parse_ref(current_doc: &DocId, reference: &str) -> Result<(DocId, Option<String>)> {
        let (doc_part, frag_part) = match reference.split_once('#') {
            Some((d, f)) => (d, Some(f)),
            None => (reference, None),
        };

        let target_doc = Self::resolve_doc(current_doc, doc_part)?;

        let ptr = match frag_part {
            Some("") | None => None,
            Some(frag) if frag.starts_with('/') => Some(percent_decode(frag)),
            Some(_) => {
                return Err(OpenApiToolsError::invalid_spec(
                    current_doc.display(),
                    format!(
                        "Unsupported $ref fragment (expected JSON pointer starting with '/'): {reference}"
                    ),
                ));
            }
        };

        Ok((target_doc, ptr))
    }

    fn resolve_doc(current_doc: &DocId, doc_part: &str) -> Result<DocId> {
        if doc_part.is_empty() {
            return Ok(current_doc.clone());
        }

        let bad_ref = |message: String| OpenApiToolsError::invalid_spec(current_doc.display(), message);

        if doc_part.starts_with("http://") || doc_part.starts_with("https://") {
            let url = Url::parse(doc_part).map_err(|e| bad_ref(format!("Bad $ref URL '{doc_part}': {e}")))?;
            return Ok(DocId::Url(strip_fragment(url)));
        }

        if doc_part.starts_with("file://") {
            let url = Url::parse(doc_part)
                .map_err(|e| bad_ref(format!("Bad $ref file URL '{doc_part}': {e}")))?;
            let path = url
                .to_file_path()
                .map_err(|()| bad_ref(format!("Bad $ref file URL (not a path): {doc_part}")))?;
            return Ok(DocId::File(canonicalize_best_effort(path)));
        }

        match current_doc {
            DocId::Url(base) => {
                let joined = base.join(doc_part).map_err(|e| {
                    bad_ref(format!(
                        "Failed to resolve relative $ref '{doc_part}' against base {base}: {e}"
                    ))
                })?;
                Ok(DocId::Url(strip_fragment(joined)))
            }
            DocId::File(base) => {
                let resolved = if Path::new(doc_part).is_absolute() {
                    PathBuf::from(doc_part)
                } else {
                    base.parent()
                        .unwrap_or_else(|| Path::new("."))
                        .join(doc_part)
                };
                Ok(DocId::File(canonicalize_best_effort(resolved)))
            }
        }
    }

    async fn load_doc(&self, doc: &DocId) -> Result<Arc<Value>> {
        if let Some(v) = self.docs.read().get(doc).cloned() {
            return Ok(v);
        }

        let content = self.loader.fetch_text(doc).await?;
        let parsed = parse_document_text(&content).map_err(|e| {
            OpenApiToolsError::invalid_spec(
                doc.display(),
                format!("Failed to parse referenced document: {e}"),
            )
        })?;

        let parsed = Arc::new(parsed);
        self.docs.write().insert(doc.clone(), Arc::clone(&parsed));
        Ok(parsed)
    }
}

fn ref_key(doc: &DocId, pointer: Option<&str>) -> String {
    let mut key = doc.key();
    if let Some(ptr) = pointer {
        key.push('#');
        key.push_str(ptr);
    }
    key
}

#[derive(Debug, Default)]
struct Expansion {
    components: HashMap<String, usize>,
    scopes: Vec<Scope>,
    memo: HashMap<String, Value>,
    errors: Vec<String>,
    cycles: usize,
}

/// Targets already inlined below the point where a component was entered.
#[derive(Debug)]
struct Scope {
    component: Option<usize>,
    visited: HashSet<String>,
}

/// `$ref` target keys and the target keys each one references (Tarjan's algorithm).
#[derive(Debug, Default)]
struct RefGraph {
    edges: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
struct Tarjan {
    next_index: usize,
    index: HashMap<String, usize>,
    low: HashMap<String, usize>,
    on_stack: HashSet<String>,
    stack: Vec<String>,
    component: HashMap<String, usize>,
    count: usize,
}

impl RefGraph {
    fn components(&self) -> HashMap<String, usize> {
        let mut t = Tarjan::default();
        for node in self.edges.keys() {
            if !t.index.contains_key(node) {
                self.connect(node, &mut t);
            }
        }
        t.component
    }

    fn connect(&self, node: &str, t: &mut Tarjan) {
        t.index.insert(node.to_string(), t.next_index);
        t.low.insert(node.to_string(), t.next_index);
        t.next_index += 1;
        t.stack.push(node.to_string());
        t.on_stack.insert(node.to_string());

        for next in self.edges.get(node).into_iter().flatten() {
            if !t.index.contains_key(next) {
                self.connect(next, t);
                let low = t.low[node].min(t.low[next]);
                t.low.insert(node.to_string(), low);
            } else if t.on_stack.contains(next) {
                let low = t.low[node].min(t.index[next]);
                t.low.insert(node.to_string(), low);
            }
        }

        if t.low[node] == t.index[node] {
            while let Some(member) = t.stack.pop() {
                t.on_stack.remove(&member);
                let done = member == node;
                t.component.insert(member, t.count);
                if done {
                    break;
                }
            }
            t.count += 1;
        }
    }
}

fn collect_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(r)) = map.get("$ref") {
                out.push(r.clone());
            }
            for v in map.values() {
                collect_refs(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_refs(v, out);
            }
        }
        _ => {}
    }
}

fn percent_decode(s: &str) -> String {
    if !s.contains('%') {
        return s.to_string();
    }
    let bytes = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let Some(b) = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())
        {
            out.push(b);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
