//! In-memory `OpenAPI` document.
//!
//! The document is kept as a JSON tree rather than a typed model so that 3.0 and 3.1 documents
//! (and vendor extensions) survive filtering and resolution unchanged.

use serde_json::{Map, Value};

/// Operation keys of a path item, in iteration order.
pub const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SpecDocument {
    root: Value,
}

impl SpecDocument {
    #[must_use]
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.root
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.root
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.root
    }

    /// `info.version`, the string live reload compares across fetches.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.root.pointer("/info/version").and_then(Value::as_str)
    }

    /// The `openapi` field, e.g. `3.0.3` or `3.1.0`.
    #[must_use]
    pub fn openapi_version(&self) -> Option<&str> {
        self.root.get("openapi").and_then(Value::as_str)
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.root.pointer("/info/title").and_then(Value::as_str)
    }

    #[must_use]
    pub fn paths(&self) -> Option<&Map<String, Value>> {
        self.root.get("paths").and_then(Value::as_object)
    }

    #[must_use]
    pub fn component_schemas(&self) -> Option<&Map<String, Value>> {
        self.root
            .pointer("/components/schemas")
            .and_then(Value::as_object)
    }

    pub fn component_schemas_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.root
            .pointer_mut("/components/schemas")
            .and_then(Value::as_object_mut)
    }

    /// `components.securitySchemes`, keyed by scheme name.
    #[must_use]
    pub fn security_schemes(&self) -> Option<&Map<String, Value>> {
        self.root
            .pointer("/components/securitySchemes")
            .and_then(Value::as_object)
    }

    /// Document-level `security` requirements.
    #[must_use]
    pub fn security(&self) -> Option<&Vec<Value>> {
        self.root.get("security").and_then(Value::as_array)
    }

    /// `servers[*].url`, in order. Entries without a URL are kept as empty strings so
    /// indices stay aligned with the document.
    #[must_use]
    pub fn server_urls(&self) -> Vec<String> {
        self.root
            .get("servers")
            .and_then(Value::as_array)
            .map(|servers| {
                servers
                    .iter()
                    .map(|s| {
                        s.get("url")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of operations across all paths.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.paths()
            .map(|paths| {
                paths
                    .values()
                    .filter_map(Value::as_object)
                    .map(|item| HTTP_METHODS.iter().filter(|m| item.contains_key(**m)).count())
                    .sum()
            })
            .unwrap_or(0)
    }
}

/// Last segment of a component reference (`#/components/schemas/Cat` -> `Cat`).
#[must_use]
pub fn simple_ref_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accessors_read_standard_locations() {
        let doc = SpecDocument::new(json!({
            "openapi": "3.1.0",
            "info": {"title": "Pets", "version": "1.2.3"},
            "servers": [{"url": "https://a.example.com"}, {"description": "no url"}],
            "paths": {
                "/pets": {"get": {}, "post": {}, "parameters": []},
                "/pets/{id}": {"delete": {}}
            },
            "components": {"schemas": {"Pet": {"type": "object"}}}
        }));

        assert_eq!(doc.version(), Some("1.2.3"));
        assert_eq!(doc.openapi_version(), Some("3.1.0"));
        assert_eq!(doc.title(), Some("Pets"));
        assert_eq!(doc.server_urls(), vec!["https://a.example.com".to_string(), String::new()]);
        assert_eq!(doc.operation_count(), 3);
        assert!(doc.component_schemas().is_some_and(|s| s.contains_key("Pet")));
    }

    #[test]
    fn simple_ref_name_takes_last_segment() {
        assert_eq!(simple_ref_name("#/components/schemas/Cat"), "Cat");
        assert_eq!(simple_ref_name("Dog"), "Dog");
    }
}
