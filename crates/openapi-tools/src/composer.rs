//! Mapping between a tool's call arguments and its operation's parameters and body.
//!
//! The composed input schema is one of:
//! - the parameters object alone (no JSON body),
//! - the body schema alone (no parameters), wrapped under the body key unless the body is an
//!   object with properties,
//! - `{ <parametersKey>: {...}, <requestBodyKey>: {...} }` when both exist,
//! - nothing, when the operation takes no input.

use crate::config::SchemaConfig;
use crate::operation::{OperationRef, ParameterLocation};
use openapi_mcp_http_tools::request::{OutboundRequest, RequestBody};
use serde_json::{Map, Value, json};

/// Call arguments regrouped the way the operation declares them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecomposedArguments {
    pub path: Map<String, Value>,
    pub query: Map<String, Value>,
    pub header: Map<String, Value>,
    pub cookie: Map<String, Value>,
    pub body: Option<RequestBody>,
}

impl DecomposedArguments {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
            && self.query.is_empty()
            && self.header.is_empty()
            && self.cookie.is_empty()
            && self.body.is_none()
    }

    #[must_use]
    pub fn into_request(self, operation: &OperationRef) -> OutboundRequest {
        let mut request = OutboundRequest::new(operation.method.clone(), operation.path.clone());
        request.path_params = self.path;
        request.query = self.query;
        request.headers = self.header;
        request.cookies = self.cookie;
        request.body = self.body;
        request
    }
}

#[derive(Debug, Clone)]
pub struct InputSchemaComposer {
    parameters_key: String,
    request_body_key: String,
}

impl Default for InputSchemaComposer {
    fn default() -> Self {
        Self::new(&SchemaConfig::default())
    }
}

impl InputSchemaComposer {
    #[must_use]
    pub fn new(config: &SchemaConfig) -> Self {
        Self {
            parameters_key: config.parameters_key.clone(),
            request_body_key: config.request_body_key.clone(),
        }
    }

    /// Input schema for `operation`, or `None` if it takes no input.
    #[must_use]
    pub fn compose(&self, operation: &OperationRef) -> Option<Value> {
        let parameters = Self::parameter_schema(operation);
        let body = self.request_body_schema(operation);

        match (parameters, body) {
            (Some(parameters), Some(body)) => Some(json!({
                "type": "object",
                "properties": {
                    self.parameters_key.as_str(): parameters,
                    self.request_body_key.as_str(): self.unwrap_body(body),
                },
                "required": [self.parameters_key, self.request_body_key],
            })),
            (Some(parameters), None) => Some(parameters),
            (None, body) => body,
        }
    }

    /// Split raw call arguments into parameter groups and a body.
    ///
    /// Wrapped arguments are recognised by the presence of either envelope key. Flat
    /// arguments are interpreted from the operation's shape; an operation with both
    /// parameters and a body (or neither) cannot take flat arguments and yields an empty
    /// result.
    #[must_use]
    pub fn decompose(
        &self,
        operation: &OperationRef,
        arguments: Option<&Map<String, Value>>,
    ) -> DecomposedArguments {
        let Some(arguments) = arguments else {
            return DecomposedArguments::default();
        };

        let has_parameters = operation.has_parameters();
        let json_body = operation.json_request_body();
        let body_of = |content: Value| {
            json_body.map(|(media, _)| RequestBody {
                content_type: media.to_string(),
                content,
            })
        };

        let wrapped = arguments.contains_key(&self.parameters_key)
            || arguments.contains_key(&self.request_body_key);

        if wrapped {
            let mut out = DecomposedArguments::default();
            if let Some(parameters) = arguments.get(&self.parameters_key) {
                if !has_parameters {
                    tracing::warn!(
                        "Parameters are not defined in the operation, but '{}' key is present in the input arguments. Skipping passed parameters.",
                        self.parameters_key
                    );
                } else if let Some(parameters) = parameters.as_object() {
                    group_parameters(operation, parameters, &mut out);
                } else {
                    tracing::warn!(
                        "Expected '{}' to be a map when decomposing the input arguments. Skipping parameters.",
                        self.parameters_key
                    );
                }
            }
            if let Some(body) = arguments.get(&self.request_body_key) {
                if json_body.is_none() {
                    tracing::warn!(
                        "Request body is not defined in the operation, but '{}' key is present in the input arguments. Skipping passed request body.",
                        self.request_body_key
                    );
                } else {
                    out.body = body_of(body.clone());
                }
            }
            return out;
        }

        match (has_parameters, json_body.is_some()) {
            (true, false) => {
                let mut out = DecomposedArguments::default();
                group_parameters(operation, arguments, &mut out);
                out
            }
            (false, true) => DecomposedArguments {
                body: body_of(Value::Object(arguments.clone())),
                ..DecomposedArguments::default()
            },
            _ => {
                tracing::warn!(
                    operation = %operation.label(),
                    "Cannot determine argument layout: the operation has both parameters and a request body, or neither. Returning empty arguments."
                );
                DecomposedArguments::default()
            }
        }
    }

    fn parameter_schema(operation: &OperationRef) -> Option<Value> {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for parameter in operation.parameters() {
            if parameter.location.is_none() {
                tracing::warn!(
                    "Unsupported parameter type '{}' for parameter '{}'. Skipping.",
                    parameter.declared_in,
                    parameter.name
                );
                continue;
            }
            let mut schema = parameter.schema.clone();
            if let (Some(obj), Some(description)) =
                (schema.as_object_mut(), parameter.description.as_ref())
                && !obj.contains_key("description")
            {
                obj.insert("description".into(), Value::String(description.clone()));
            }
            properties.insert(parameter.name.clone(), schema);
            if parameter.required {
                required.push(Value::String(parameter.name.clone()));
            }
        }

        if properties.is_empty() {
            return None;
        }
        let mut schema = Map::new();
        schema.insert("type".into(), json!("object"));
        schema.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".into(), Value::Array(required));
        }
        Some(Value::Object(schema))
    }

    fn request_body_schema(&self, operation: &OperationRef) -> Option<Value> {
        let request_body = operation.request_body()?;
        let Some((_, schema)) = operation.json_request_body() else {
            tracing::warn!(
                operation = %operation.label(),
                "Unsupported content types in request body. Skipping."
            );
            return None;
        };
        let body_description = request_body.get("description").cloned();

        if is_object_with_properties(schema) {
            let mut schema = schema.clone();
            if let (Some(obj), Some(description)) = (schema.as_object_mut(), body_description)
                && !obj.contains_key("description")
            {
                obj.insert("description".into(), description);
            }
            return Some(schema);
        }

        tracing::debug!(
            operation = %operation.label(),
            "Request body schema is not an object with properties, wrapping under '{}'",
            self.request_body_key
        );
        let mut wrapper = Map::new();
        wrapper.insert("type".into(), json!("object"));
        if let Some(description) = body_description {
            wrapper.insert("description".into(), description);
        }
        wrapper.insert(
            "properties".into(),
            json!({ self.request_body_key.as_str(): schema }),
        );
        wrapper.insert("required".into(), json!([self.request_body_key]));
        Some(Value::Object(wrapper))
    }

    /// Undo the single-key wrapping applied by [`Self::request_body_schema`].
    fn unwrap_body(&self, schema: Value) -> Value {
        let inner = schema
            .get("properties")
            .and_then(Value::as_object)
            .filter(|props| props.len() == 1)
            .and_then(|props| props.get(&self.request_body_key))
            .cloned();
        inner.unwrap_or(schema)
    }
}

fn is_object_with_properties(schema: &Value) -> bool {
    let is_object = match schema.get("type") {
        Some(Value::String(t)) => t == "object",
        Some(Value::Array(types)) => types.iter().any(|t| t == "object"),
        _ => false,
    };
    is_object
        && schema
            .get("properties")
            .and_then(Value::as_object)
            .is_some_and(|p| !p.is_empty())
}

fn group_parameters(
    operation: &OperationRef,
    arguments: &Map<String, Value>,
    out: &mut DecomposedArguments,
) {
    for parameter in operation.parameters() {
        let Some(value) = arguments.get(&parameter.name).filter(|v| !v.is_null()) else {
            continue;
        };
        let group = match parameter.location {
            Some(ParameterLocation::Path) => &mut out.path,
            Some(ParameterLocation::Query) => &mut out.query,
            Some(ParameterLocation::Header) => &mut out.header,
            Some(ParameterLocation::Cookie) => &mut out.cookie,
            None => {
                tracing::warn!(
                    "Unsupported parameter type '{}' for parameter '{}'. Skipping parameter decomposition.",
                    parameter.declared_in,
                    parameter.name
                );
                continue;
            }
        };
        group.insert(parameter.name.clone(), value.clone());
    }
}
