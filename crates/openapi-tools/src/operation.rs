//! Operations of a resolved document, the unit compiled into one tool.

use crate::document::{HTTP_METHODS, SpecDocument};
use reqwest::Method;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }
}

/// One declared parameter. `location` is `None` for locations this engine does not map.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: Option<ParameterLocation>,
    /// The raw `in` value, kept for diagnostics.
    pub declared_in: String,
    pub required: bool,
    pub description: Option<String>,
    pub schema: Value,
}

impl Parameter {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let name = obj.get("name")?.as_str()?.to_string();
        let declared_in = obj.get("in")?.as_str()?.to_string();
        let location = ParameterLocation::parse(&declared_in);
        // Path parameters are always required.
        let required = location == Some(ParameterLocation::Path)
            || obj.get("required").and_then(Value::as_bool).unwrap_or(false);
        let schema = obj
            .get("schema")
            .cloned()
            .or_else(|| {
                obj.get("content")
                    .and_then(Value::as_object)
                    .and_then(|c| c.values().next())
                    .and_then(|m| m.get("schema"))
                    .cloned()
            })
            .unwrap_or_else(|| Value::Object(Map::new()));
        Some(Self {
            name,
            location,
            declared_in,
            required,
            description: obj
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            schema,
        })
    }
}

/// `(path, method, operation)` taken from one document snapshot.
#[derive(Debug, Clone)]
pub struct OperationRef {
    pub path: String,
    pub method: Method,
    operation: Value,
    parameters: Vec<Parameter>,
    document: Arc<SpecDocument>,
}

impl OperationRef {
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        method: Method,
        path_item: &Map<String, Value>,
        operation: Value,
        document: Arc<SpecDocument>,
    ) -> Self {
        let parameters = merge_parameters(path_item.get("parameters"), operation.get("parameters"));
        Self {
            path: path.into(),
            method,
            operation,
            parameters,
            document,
        }
    }

    #[must_use]
    pub fn operation(&self) -> &Value {
        &self.operation
    }

    #[must_use]
    pub fn document(&self) -> &Arc<SpecDocument> {
        &self.document
    }

    /// Path-item parameters overridden by operation parameters with the same `(in, name)`.
    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    #[must_use]
    pub fn has_parameters(&self) -> bool {
        !self.parameters.is_empty()
    }

    #[must_use]
    pub fn operation_id(&self) -> Option<&str> {
        self.str_field("operationId")
    }

    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.str_field("summary")
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.str_field("description")
    }

    #[must_use]
    pub fn request_body(&self) -> Option<&Map<String, Value>> {
        self.operation.get("requestBody").and_then(Value::as_object)
    }

    /// Media type and schema of the first JSON content of the request body.
    #[must_use]
    pub fn json_request_body(&self) -> Option<(&str, &Value)> {
        let content = self.request_body()?.get("content")?.as_object()?;
        content
            .iter()
            .filter(|(media, _)| is_json_media_type(media))
            .find_map(|(media, entry)| entry.get("schema").map(|s| (media.as_str(), s)))
    }

    #[must_use]
    pub fn responses(&self) -> Option<&Map<String, Value>> {
        self.operation.get("responses").and_then(Value::as_object)
    }

    /// A vendor extension (`x-...`) on the operation.
    #[must_use]
    pub fn extension(&self, name: &str) -> Option<&Value> {
        self.operation.get(name)
    }

    /// The operation's `security`, falling back to the document-level requirements.
    #[must_use]
    pub fn effective_security(&self) -> Option<&Vec<Value>> {
        self.operation
            .get("security")
            .and_then(Value::as_array)
            .or_else(|| self.document.security())
    }

    /// Short human label, e.g. `GET /pets/{id}`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.operation.get(key).and_then(Value::as_str)
    }
}

/// `application/json`, `application/problem+json`, with or without parameters.
#[must_use]
pub fn is_json_media_type(media: &str) -> bool {
    let essence = media
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || (essence.starts_with("application/") && essence.ends_with("+json"))
}

fn merge_parameters(path_level: Option<&Value>, op_level: Option<&Value>) -> Vec<Parameter> {
    let parse = |v: Option<&Value>| -> Vec<Parameter> {
        v.and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Parameter::from_value).collect())
            .unwrap_or_default()
    };
    let op_params = parse(op_level);
    let mut merged: Vec<Parameter> = parse(path_level)
        .into_iter()
        .filter(|p| {
            !op_params
                .iter()
                .any(|o| o.name == p.name && o.declared_in == p.declared_in)
        })
        .collect();
    merged.extend(op_params);
    merged
}

/// Every operation of `document`, paths in document order, methods in [`HTTP_METHODS`] order.
#[must_use]
pub fn collect_operations(document: &Arc<SpecDocument>) -> Vec<OperationRef> {
    let Some(paths) = document.paths() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        for method in HTTP_METHODS {
            let Some(op) = item.get(method).filter(|op| op.is_object()) else {
                continue;
            };
            let Ok(method) = Method::from_bytes(method.to_ascii_uppercase().as_bytes()) else {
                continue;
            };
            out.push(OperationRef::new(
                path.clone(),
                method,
                item,
                op.clone(),
                Arc::clone(document),
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Arc<SpecDocument> {
        Arc::new(SpecDocument::new(json!({
            "openapi": "3.1.0",
            "info": {"title": "t", "version": "1"},
            "security": [{"oauth": ["read"]}],
            "paths": {
                "/pets/{id}": {
                    "parameters": [
                        {"name": "id", "in": "path", "schema": {"type": "string"}},
                        {"name": "trace", "in": "header", "schema": {"type": "string"}}
                    ],
                    "post": {
                        "operationId": "updatePet",
                        "parameters": [
                            {"name": "trace", "in": "header", "required": true, "description": "op level", "schema": {"type": "integer"}},
                            {"name": "session", "in": "cookie", "content": {"text/plain": {"schema": {"type": "string"}}}}
                        ],
                        "requestBody": {"content": {
                            "text/plain": {"schema": {"type": "string"}},
                            "application/merge-patch+json": {"schema": {"type": "object"}}
                        }},
                        "security": []
                    },
                    "get": {"summary": "Get"}
                },
                "/a": {"trace": {}, "x-ignored": {}}
            }
        })))
    }

    #[test]
    fn collects_in_method_order_and_merges_parameters() {
        let ops = collect_operations(&doc());
        let labels: Vec<_> = ops.iter().map(OperationRef::label).collect();
        assert_eq!(labels, vec!["GET /pets/{id}", "POST /pets/{id}", "TRACE /a"]);

        let post = &ops[1];
        let names: Vec<_> = post.parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["id", "trace", "session"]);
        assert!(post.parameters()[0].required);
        let trace = &post.parameters()[1];
        assert_eq!(trace.schema["type"], "integer");
        assert_eq!(trace.description.as_deref(), Some("op level"));
        assert_eq!(post.parameters()[2].location, Some(ParameterLocation::Cookie));
        assert_eq!(post.parameters()[2].schema["type"], "string");
    }

    #[test]
    fn json_body_and_security_fallback() {
        let ops = collect_operations(&doc());
        let (media, schema) = ops[1].json_request_body().unwrap();
        assert_eq!(media, "application/merge-patch+json");
        assert_eq!(schema["type"], "object");
        assert!(ops[0].json_request_body().is_none());

        assert_eq!(ops[1].effective_security().unwrap().len(), 0);
        assert_eq!(ops[0].effective_security().unwrap()[0]["oauth"][0], "read");
    }

    #[test]
    fn media_type_detection() {
        assert!(is_json_media_type("application/json"));
        assert!(is_json_media_type("application/json; charset=utf-8"));
        assert!(is_json_media_type("application/vnd.api+json"));
        assert!(!is_json_media_type("text/json-ish"));
        assert!(!is_json_media_type("application/xml"));
    }
}
