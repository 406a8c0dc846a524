use super::OpenApiFilter;
use crate::document::{SpecDocument, simple_ref_name};
use crate::error::Result;
use crate::walker::{SchemaWalker, Visit};
use serde_json::{Map, Value, json};

/// Bound on flattening passes. Each pass resolves one more level of discriminators nested
/// inside mapping targets; only self-similar inline schemas need more.
const MAX_PASSES: usize = 8;

/// Rewrites every schema carrying an `OpenAPI` discriminator into a plain `oneOf` of its
/// mapped variants.
///
/// For each mapping entry `value -> Target`:
/// - `Target` declares the discriminator property: a copy of `Target` with that property
///   narrowed to the single value becomes a `oneOf` branch.
/// - `Target` is an `allOf`: the one branch declaring the property (inline or via `$ref`) is
///   narrowed the same way, the rewritten `allOf` is stored back on `Target`, and `Target`
///   becomes the branch.
/// - otherwise `Target` is appended unmodified.
///
/// Afterwards the schema's own `properties` and its `discriminator` are removed. Mapping
/// targets are looked up by simple name in `components.schemas`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscriminatorFlattener;

impl OpenApiFilter for DiscriminatorFlattener {
    fn name(&self) -> &'static str {
        "DiscriminatorFlattener"
    }

    fn filter(&self, document: &mut SpecDocument) -> Result<()> {
        for pass in 1..=MAX_PASSES {
            let components = document.component_schemas().cloned().unwrap_or_default();
            let mut rewrites: Vec<(String, Vec<Value>)> = Vec::new();
            let mut flattened = 0usize;

            SchemaWalker::new(|node: &mut Map<String, Value>| {
                if node.contains_key("discriminator") {
                    flatten(node, &components, &mut rewrites);
                    flattened += 1;
                    Visit::Skip
                } else {
                    Visit::Descend
                }
            })
            .walk_document(document.value_mut());

            if let Some(schemas) = document.component_schemas_mut() {
                for (name, all_of) in rewrites {
                    if let Some(Value::Object(target)) = schemas.get_mut(&name) {
                        target.insert("allOf".into(), Value::Array(all_of));
                    }
                }
            }

            if flattened == 0 {
                return Ok(());
            }
            tracing::debug!(pass, flattened, "flattened discriminators");
        }

        let mut leftover = 0usize;
        SchemaWalker::new(|node: &mut Map<String, Value>| {
            if node.remove("discriminator").is_some() {
                leftover += 1;
            }
            Visit::Descend
        })
        .walk_document(document.value_mut());
        if leftover > 0 {
            tracing::warn!(
                leftover,
                "discriminators still nested after {MAX_PASSES} passes were dropped"
            );
        }
        Ok(())
    }
}

fn flatten(
    node: &mut Map<String, Value>,
    components: &Map<String, Value>,
    rewrites: &mut Vec<(String, Vec<Value>)>,
) {
    let Some(discriminator) = node.remove("discriminator") else {
        return;
    };
    let Some(property) = discriminator.get("propertyName").and_then(Value::as_str) else {
        tracing::warn!("Discriminator without propertyName. It will be skipped.");
        return;
    };
    let Some(mapping) = discriminator.get("mapping").and_then(Value::as_object) else {
        tracing::warn!(
            "Discriminator '{}' does not have mapping defined. It will be skipped.",
            property
        );
        return;
    };

    let mut branches = match node.remove("oneOf") {
        Some(Value::Array(existing)) => existing,
        _ => Vec::new(),
    };

    for (value, target_ref) in mapping {
        let Some(target_ref) = target_ref.as_str() else {
            continue;
        };
        let target_name = simple_ref_name(target_ref);
        let Some(target) = components.get(target_name).and_then(Value::as_object) else {
            tracing::warn!(
                "Referenced schema '{}' not found in components for discriminator '{}'. It will be skipped.",
                target_ref,
                property
            );
            continue;
        };

        if declares(target, property) {
            branches.push(narrowed(target, property, value));
            continue;
        }

        if let Some(all_of) = target.get("allOf").and_then(Value::as_array)
            && let Some(rewritten) = narrow_all_of(all_of, components, property, value)
        {
            let mut branch = target.clone();
            branch.remove("discriminator");
            branch.insert("allOf".into(), Value::Array(rewritten.clone()));
            rewrites.push((target_name.to_string(), rewritten));
            branches.push(Value::Object(branch));
            continue;
        }

        tracing::warn!(
            "Discriminator property '{}' not found in the referenced schema '{}'. It will be appended as is.",
            property,
            target_ref
        );
        branches.push(Value::Object(target.clone()));
    }

    node.insert("oneOf".into(), Value::Array(branches));
    node.remove("properties");
}

/// Narrow the single `allOf` branch that declares `property`. `None` if no branch does.
fn narrow_all_of(
    all_of: &[Value],
    components: &Map<String, Value>,
    property: &str,
    value: &str,
) -> Option<Vec<Value>> {
    let mut found = false;
    let mut out = Vec::with_capacity(all_of.len());

    for branch in all_of {
        let declaring = match branch.get("$ref").and_then(Value::as_str) {
            Some(r) => components
                .get(simple_ref_name(r))
                .and_then(Value::as_object)
                .filter(|s| declares(s, property)),
            None => branch.as_object().filter(|s| declares(s, property)),
        };

        match declaring {
            Some(schema) if !found => {
                found = true;
                out.push(narrowed(schema, property, value));
            }
            Some(_) => {
                tracing::warn!(
                    "More than one allOf branch declares discriminator property '{}'. Only the first is narrowed.",
                    property
                );
                out.push(branch.clone());
            }
            None => out.push(branch.clone()),
        }
    }

    found.then_some(out)
}

fn declares(schema: &Map<String, Value>, property: &str) -> bool {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|p| p.contains_key(property))
}

/// Copy of `schema` without its discriminator, where `property` only admits `value`.
fn narrowed(schema: &Map<String, Value>, property: &str, value: &str) -> Value {
    let mut out = schema.clone();
    out.remove("discriminator");
    if let Some(Value::Object(props)) = out.get_mut("properties") {
        props.insert(
            property.to_string(),
            json!({
                "type": "string",
                "enum": [value],
                "default": value,
                "description": format!("Always set to '{value}'."),
            }),
        );
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> SpecDocument {
        SpecDocument::new(serde_yaml::from_str(yaml).unwrap())
    }

    fn schema<'a>(doc: &'a SpecDocument, name: &str) -> &'a Value {
        &doc.component_schemas().unwrap()[name]
    }

    fn assert_no_discriminators(doc: &SpecDocument) {
        assert!(
            !doc.value().to_string().contains("\"discriminator\""),
            "{}",
            doc.value()
        );
    }

    #[test]
    fn direct_properties_become_narrowed_branches() {
        let mut d = doc(r##"
openapi: 3.0.3
info: {title: t, version: "1"}
paths: {}
components:
  schemas:
    Pet:
      type: object
      properties:
        petType: {type: string}
      discriminator:
        propertyName: petType
        mapping:
          cat: "#/components/schemas/Cat"
          dog: "#/components/schemas/Dog"
    Cat:
      type: object
      required: [petType]
      properties:
        petType: {type: string}
        meows: {type: boolean}
    Dog:
      type: object
      properties:
        petType: {type: string}
        barks: {type: boolean}
"##);

        DiscriminatorFlattener.filter(&mut d).unwrap();

        let pet = schema(&d, "Pet");
        assert!(pet.get("properties").is_none());
        let one_of = pet["oneOf"].as_array().unwrap();
        assert_eq!(one_of.len(), 2);
        assert_eq!(one_of[0]["properties"]["petType"]["enum"], json!(["cat"]));
        assert_eq!(one_of[0]["properties"]["petType"]["default"], "cat");
        assert_eq!(
            one_of[0]["properties"]["petType"]["description"],
            "Always set to 'cat'."
        );
        assert_eq!(one_of[0]["properties"]["meows"]["type"], "boolean");
        assert_eq!(one_of[0]["required"], json!(["petType"]));
        assert_eq!(one_of[1]["properties"]["petType"]["enum"], json!(["dog"]));
        assert_eq!(schema(&d, "Cat")["properties"]["petType"], json!({"type": "string"}));
        assert_no_discriminators(&d);
    }

    #[test]
    fn all_of_targets_narrow_only_the_declaring_branch() {
        let mut d = doc(r##"
openapi: 3.0.3
info: {title: t, version: "1"}
paths: {}
components:
  schemas:
    Pet:
      type: object
      required: [petType]
      properties:
        petType: {type: string}
        name: {type: string}
      discriminator:
        propertyName: petType
        mapping:
          cat: Cat
    Cat:
      allOf:
        - $ref: "#/components/schemas/Pet"
        - type: object
          properties:
            meows: {type: boolean}
"##);

        DiscriminatorFlattener.filter(&mut d).unwrap();

        let cat = schema(&d, "Cat");
        let all_of = cat["allOf"].as_array().unwrap();
        assert_eq!(all_of.len(), 2);
        assert!(all_of[0].get("$ref").is_none());
        assert_eq!(all_of[0]["properties"]["petType"]["enum"], json!(["cat"]));
        assert_eq!(all_of[0]["properties"]["name"]["type"], "string");
        assert_eq!(all_of[1]["properties"]["meows"]["type"], "boolean");

        let pet = schema(&d, "Pet");
        assert_eq!(pet["oneOf"].as_array().unwrap().len(), 1);
        assert_eq!(pet["oneOf"][0], *cat);
        assert!(pet.get("properties").is_none());
        assert_no_discriminators(&d);
    }

    #[test]
    fn second_declaring_all_of_branch_is_left_alone() {
        let mut d = doc(r#"
openapi: 3.1.0
info: {title: t, version: "1"}
components:
  schemas:
    Base:
      discriminator:
        propertyName: kind
        mapping: {a: A}
    A:
      allOf:
        - properties: {kind: {type: string}, x: {type: integer}}
        - properties: {kind: {type: string}}
"#);
        DiscriminatorFlattener.filter(&mut d).unwrap();
        let all_of = schema(&d, "A")["allOf"].as_array().unwrap();
        assert_eq!(all_of[0]["properties"]["kind"]["enum"], json!(["a"]));
        assert_eq!(all_of[1]["properties"]["kind"], json!({"type": "string"}));
    }

    #[test]
    fn missing_targets_and_missing_property_are_tolerated() {
        let mut d = doc(r#"
openapi: 3.1.0
info: {title: t, version: "1"}
components:
  schemas:
    Shape:
      properties:
        kind: {type: string}
      discriminator:
        propertyName: kind
        mapping:
          circle: Circle
          ghost: Ghost
    Circle:
      type: object
      properties:
        radius: {type: number}
    NoMapping:
      properties:
        kind: {type: string}
      discriminator:
        propertyName: kind
"#);

        DiscriminatorFlattener.filter(&mut d).unwrap();

        let shape = schema(&d, "Shape");
        let one_of = shape["oneOf"].as_array().unwrap();
        assert_eq!(one_of.len(), 1);
        assert_eq!(one_of[0], *schema(&d, "Circle"));

        let no_mapping = schema(&d, "NoMapping");
        assert_eq!(no_mapping["properties"]["kind"]["type"], "string");
        assert_no_discriminators(&d);
    }

    #[test]
    fn nested_and_inline_discriminators_are_flattened() {
        let mut d = doc(r#"
openapi: 3.1.0
info: {title: t, version: "1"}
paths:
  /orders:
    post:
      requestBody:
        content:
          application/json:
            schema:
              type: object
              properties:
                payment:
                  discriminator:
                    propertyName: method
                    mapping: {card: Card}
      responses: {}
components:
  schemas:
    Card:
      type: object
      properties:
        method: {type: string}
        owner:
          type: object
          properties:
            kind: {type: string}
          discriminator:
            propertyName: kind
            mapping: {person: Person}
    Person:
      properties:
        kind: {type: string}
        name: {type: string}
"#);

        DiscriminatorFlattener.filter(&mut d).unwrap();

        let payment = d
            .value()
            .pointer("/paths/~1orders/post/requestBody/content/application~1json/schema/properties/payment")
            .unwrap();
        let card = &payment["oneOf"][0];
        assert_eq!(card["properties"]["method"]["enum"], json!(["card"]));
        assert_eq!(
            card["properties"]["owner"]["oneOf"][0]["properties"]["kind"]["enum"],
            json!(["person"])
        );
        assert_no_discriminators(&d);
    }
}
