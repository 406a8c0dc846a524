//! Visitor over every schema node of a document.
//!
//! Schemas are reached from operation parameters, request bodies, responses (body and header
//! schemas), the reusable `components` sections, and recursively through every applicator
//! keyword. `$ref` nodes are never followed: a reference target is visited at its definition
//! site, so every node is visited exactly once and traversal of recursive schemas terminates.

use crate::document::HTTP_METHODS;
use serde_json::{Map, Value};

/// What the walker does after visiting a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Continue into the node's subschemas.
    Descend,
    /// Do not look at this node's subschemas.
    Skip,
}

/// Keywords holding a single subschema.
const SINGLE_KEYWORDS: [&str; 12] = [
    "if",
    "then",
    "else",
    "not",
    "contains",
    "contentSchema",
    "items",
    "unevaluatedItems",
    "additionalItems",
    "additionalProperties",
    "unevaluatedProperties",
    "propertyNames",
];

/// Keywords holding a name -> subschema map.
const MAP_KEYWORDS: [&str; 5] = [
    "properties",
    "patternProperties",
    "dependentSchemas",
    "$defs",
    "definitions",
];

/// Keywords holding a list of subschemas.
const LIST_KEYWORDS: [&str; 4] = ["allOf", "anyOf", "oneOf", "prefixItems"];

/// Keywords of `components` whose entries carry schemas via `schema`/`content`.
const COMPONENT_CONTAINERS: [&str; 4] = ["parameters", "requestBodies", "responses", "headers"];

pub struct SchemaWalker<F>
where
    F: FnMut(&mut Map<String, Value>) -> Visit,
{
    visitor: F,
}

impl<F> SchemaWalker<F>
where
    F: FnMut(&mut Map<String, Value>) -> Visit,
{
    pub fn new(visitor: F) -> Self {
        Self { visitor }
    }

    /// Visit every schema reachable from paths and components.
    pub fn walk_document(&mut self, document: &mut Value) {
        if let Some(paths) = document.get_mut("paths").and_then(Value::as_object_mut) {
            for item in paths.values_mut() {
                self.walk_path_item(item);
            }
        }

        let Some(components) = document.get_mut("components").and_then(Value::as_object_mut)
        else {
            return;
        };
        if let Some(schemas) = components.get_mut("schemas").and_then(Value::as_object_mut) {
            for schema in schemas.values_mut() {
                self.walk_schema(schema);
            }
        }
        for container in COMPONENT_CONTAINERS {
            if let Some(entries) = components.get_mut(container).and_then(Value::as_object_mut) {
                for entry in entries.values_mut() {
                    self.walk_schema_holder(entry);
                }
            }
        }
    }

    /// Visit `schema` and, unless the visitor says otherwise, its subschemas (pre-order).
    pub fn walk_schema(&mut self, schema: &mut Value) {
        let Some(node) = schema.as_object_mut() else {
            return;
        };
        if node.contains_key("$ref") {
            return;
        }
        if (self.visitor)(node) == Visit::Skip {
            return;
        }

        for keyword in SINGLE_KEYWORDS {
            match node.get_mut(keyword) {
                // Draft-4 tuple form of `items`.
                Some(Value::Array(items)) => {
                    for item in items {
                        self.walk_schema(item);
                    }
                }
                Some(child) => self.walk_schema(child),
                None => {}
            }
        }
        for keyword in MAP_KEYWORDS {
            if let Some(children) = node.get_mut(keyword).and_then(Value::as_object_mut) {
                for child in children.values_mut() {
                    self.walk_schema(child);
                }
            }
        }
        for keyword in LIST_KEYWORDS {
            if let Some(children) = node.get_mut(keyword).and_then(Value::as_array_mut) {
                for child in children {
                    self.walk_schema(child);
                }
            }
        }
    }

    fn walk_path_item(&mut self, item: &mut Value) {
        let Some(item) = item.as_object_mut() else {
            return;
        };
        if let Some(params) = item.get_mut("parameters").and_then(Value::as_array_mut) {
            for param in params {
                self.walk_schema_holder(param);
            }
        }
        for method in HTTP_METHODS {
            if let Some(op) = item.get_mut(method) {
                self.walk_operation(op);
            }
        }
    }

    fn walk_operation(&mut self, op: &mut Value) {
        let Some(op) = op.as_object_mut() else {
            return;
        };
        if let Some(params) = op.get_mut("parameters").and_then(Value::as_array_mut) {
            for param in params {
                self.walk_schema_holder(param);
            }
        }
        if let Some(body) = op.get_mut("requestBody") {
            self.walk_schema_holder(body);
        }
        if let Some(responses) = op.get_mut("responses").and_then(Value::as_object_mut) {
            for response in responses.values_mut() {
                self.walk_schema_holder(response);
            }
        }
    }

    /// Parameter, header, request body or response: a `schema`, a `content` map of media
    /// types, and (for responses) a `headers` map.
    fn walk_schema_holder(&mut self, holder: &mut Value) {
        let Some(holder) = holder.as_object_mut() else {
            return;
        };
        if let Some(schema) = holder.get_mut("schema") {
            self.walk_schema(schema);
        }
        if let Some(content) = holder.get_mut("content").and_then(Value::as_object_mut) {
            for media in content.values_mut() {
                if let Some(schema) = media.get_mut("schema") {
                    self.walk_schema(schema);
                }
            }
        }
        if let Some(headers) = holder.get_mut("headers").and_then(Value::as_object_mut) {
            for header in headers.values_mut() {
                self.walk_schema_holder(header);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn titles_visited(doc: &mut Value) -> Vec<String> {
        let mut seen = Vec::new();
        SchemaWalker::new(|node: &mut Map<String, Value>| {
            if let Some(t) = node.get("title").and_then(Value::as_str) {
                seen.push(t.to_string());
            }
            Visit::Descend
        })
        .walk_document(doc);
        seen
    }

    #[test]
    fn reaches_operation_and_component_schemas() {
        let mut doc = json!({
            "paths": {"/a": {
                "parameters": [{"name": "p", "in": "query", "schema": {"title": "path-param"}}],
                "post": {
                    "parameters": [{"name": "q", "in": "query", "content": {"application/json": {"schema": {"title": "op-param"}}}}],
                    "requestBody": {"content": {"application/json": {"schema": {"title": "body", "properties": {"x": {"title": "body.x"}}}}}},
                    "responses": {"200": {
                        "headers": {"X-Rate": {"schema": {"title": "header"}}},
                        "content": {"application/json": {"schema": {"title": "resp", "items": {"title": "resp.items"}}}}
                    }}
                }
            }},
            "components": {
                "schemas": {"C": {"title": "C", "allOf": [{"title": "C.0"}], "if": {"title": "C.if"}}},
                "parameters": {"P": {"schema": {"title": "P"}}}
            }
        });

        let seen = titles_visited(&mut doc);
        for expected in [
            "path-param", "op-param", "body", "body.x", "header", "resp", "resp.items", "C", "C.0",
            "C.if", "P",
        ] {
            assert!(seen.contains(&expected.to_string()), "missing {expected}: {seen:?}");
        }
        assert_eq!(seen.len(), 11);
    }

    #[test]
    fn refs_are_not_visited_and_skip_stops_descent() {
        let mut schema = json!({
            "title": "root",
            "properties": {
                "r": {"$ref": "#/components/schemas/X", "title": "ref"},
                "stop": {"title": "stop", "items": {"title": "hidden"}}
            }
        });
        let mut seen = Vec::new();
        SchemaWalker::new(|node: &mut Map<String, Value>| {
            let title = node.get("title").and_then(Value::as_str).unwrap_or_default().to_string();
            let visit = if title == "stop" { Visit::Skip } else { Visit::Descend };
            seen.push(title);
            visit
        })
        .walk_schema(&mut schema);
        assert_eq!(seen, vec!["root".to_string(), "stop".to_string()]);
    }

    #[test]
    fn visitor_can_mutate_nodes() {
        let mut schema = json!({"oneOf": [{"type": "string"}, {"prefixItems": [{"type": "integer"}]}]});
        SchemaWalker::new(|node: &mut Map<String, Value>| {
            node.insert("seen".into(), json!(true));
            Visit::Descend
        })
        .walk_schema(&mut schema);
        assert_eq!(schema["oneOf"][0]["seen"], true);
        assert_eq!(schema["oneOf"][1]["prefixItems"][0]["seen"], true);
    }
}
