//! Reads an `OpenAPI` document without resolving references.

use crate::config::HashPolicy;
use crate::document::{HTTP_METHODS, SpecDocument};
use crate::error::{OpenApiToolsError, Result};
use crate::resolver::{DocId, DocumentLoader, parse_document_text};
use serde_json::Value;
use sha2::{Digest as _, Sha256};

/// Parser findings for one document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    /// Problems that prevent a usable document.
    pub fatal: Vec<String>,
    /// Problems that are logged but tolerated.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OpenApiReader {
    loader: DocumentLoader,
    spec_hash: Option<String>,
    spec_hash_policy: HashPolicy,
}

impl OpenApiReader {
    #[must_use]
    pub fn new(loader: DocumentLoader) -> Self {
        Self {
            loader,
            spec_hash: None,
            spec_hash_policy: HashPolicy::Ignore,
        }
    }

    #[must_use]
    pub fn with_spec_hash(mut self, spec_hash: Option<String>, policy: HashPolicy) -> Self {
        self.spec_hash = spec_hash;
        self.spec_hash_policy = policy;
        self
    }

    #[must_use]
    pub fn loader(&self) -> &DocumentLoader {
        &self.loader
    }

    /// Fetch and parse the document at `location`. `$ref` nodes are left untouched.
    ///
    /// # Errors
    ///
    /// Returns a fetch error, or [`OpenApiToolsError::InvalidSpecification`] with every fatal
    /// diagnostic when no usable document could be produced.
    pub async fn read(&self, location: &str) -> Result<SpecDocument> {
        let doc_id = DocId::parse(location)?;
        tracing::info!("Reading OpenAPI spec from {}", doc_id.display());
        let content = self.loader.fetch_text(&doc_id).await?;
        self.verify_hash(location, &content)?;
        parse_spec(location, &content)
    }

    fn verify_hash(&self, location: &str, content: &str) -> Result<()> {
        let Some(expected) = &self.spec_hash else {
            return Ok(());
        };
        let actual = format!("sha256:{}", hex::encode(Sha256::digest(content.as_bytes())));
        if actual == *expected {
            return Ok(());
        }
        match self.spec_hash_policy {
            HashPolicy::Fail => Err(OpenApiToolsError::invalid_spec(
                location,
                format!("Spec hash mismatch. Expected: {expected}, Got: {actual}"),
            )),
            HashPolicy::Warn => {
                tracing::warn!(
                    "Spec hash mismatch for '{}'. Expected: {}, Got: {}",
                    location,
                    expected,
                    actual
                );
                Ok(())
            }
            HashPolicy::Ignore => Ok(()),
        }
    }
}

/// Parse and validate document text. Non-fatal diagnostics are logged.
///
/// # Errors
///
/// Returns [`OpenApiToolsError::InvalidSpecification`] if the text is not JSON/YAML or the
/// document misses required structure.
pub fn parse_spec(location: &str, content: &str) -> Result<SpecDocument> {
    let root = parse_document_text(content).map_err(|e| {
        OpenApiToolsError::invalid_spec(location, format!("Failed to parse document: {e}"))
    })?;

    let diagnostics = diagnose(&root);
    if !diagnostics.fatal.is_empty() {
        return Err(OpenApiToolsError::InvalidSpecification {
            location: location.to_string(),
            messages: diagnostics.fatal,
        });
    }
    for warning in &diagnostics.warnings {
        tracing::warn!(spec = %location, "OpenAPI spec warning: {warning}");
    }
    Ok(SpecDocument::new(root))
}

/// Structural checks on a parsed (unresolved) document.
#[must_use]
pub fn diagnose(root: &Value) -> Diagnostics {
    let mut d = Diagnostics::default();

    let Some(obj) = root.as_object() else {
        d.fatal.push("document root is not a mapping".into());
        return d;
    };

    match obj.get("openapi").and_then(Value::as_str) {
        Some(v) if v.starts_with("3.") => {}
        Some(v) => d.fatal.push(format!("unsupported openapi version '{v}'")),
        None => d.fatal.push("attribute openapi is missing".into()),
    }

    match obj.get("info") {
        Some(Value::Object(info)) => match info.get("version") {
            Some(Value::String(_)) => {}
            Some(_) => d.fatal.push("attribute info.version is not a string".into()),
            None => d.fatal.push("attribute info.version is missing".into()),
        },
        Some(_) => d.fatal.push("attribute info is not a mapping".into()),
        None => d.fatal.push("attribute info is missing".into()),
    }

    match obj.get("paths") {
        None => d.warnings.push("attribute paths is missing".into()),
        Some(Value::Object(paths)) => {
            for (path, item) in paths {
                let Some(item) = item.as_object() else {
                    d.warnings.push(format!("path item '{path}' is not a mapping"));
                    continue;
                };
                for method in HTTP_METHODS {
                    if let Some(op) = item.get(method)
                        && op.get("responses").is_none()
                    {
                        d.warnings
                            .push(format!("operation {} {path} has no responses", method.to_uppercase()));
                    }
                }
            }
        }
        Some(_) => d.fatal.push("attribute paths is not a mapping".into()),
    }

    // The typed model only covers 3.0; its complaints are advisory.
    if d.fatal.is_empty()
        && obj
            .get("openapi")
            .and_then(Value::as_str)
            .is_some_and(|v| v.starts_with("3.0"))
        && let Err(e) = serde_json::from_value::<openapiv3::OpenAPI>(root.clone())
    {
        d.warnings.push(format!("document does not match the OpenAPI 3.0 model: {e}"));
    }

    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use std::fs;
    use tempfile::tempdir;

    const PETSTORE: &str = r#"
openapi: 3.0.3
info:
  title: Pets
  version: "1.0.0"
paths:
  /pets:
    get:
      operationId: listPets
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema:
                $ref: '#/components/schemas/Pet'
components:
  schemas:
    Pet:
      type: object
"#;

    #[test]
    fn parse_keeps_refs_untouched() {
        let doc = parse_spec("inline", PETSTORE).unwrap();
        assert_eq!(doc.version(), Some("1.0.0"));
        let schema = doc
            .value()
            .pointer("/paths/~1pets/get/responses/200/content/application~1json/schema/$ref");
        assert_eq!(schema.and_then(Value::as_str), Some("#/components/schemas/Pet"));
    }

    #[test]
    fn parse_accepts_json() {
        let doc = parse_spec(
            "inline.json",
            r#"{"openapi":"3.1.0","info":{"title":"x","version":"2"},"paths":{}}"#,
        )
        .unwrap();
        assert_eq!(doc.openapi_version(), Some("3.1.0"));
    }

    #[test]
    fn fatal_diagnostics_are_all_reported() {
        let err = parse_spec("bad", "swagger: '2.0'\ninfo: {}\npaths: []\n").unwrap_err();
        let OpenApiToolsError::InvalidSpecification { messages, .. } = err else {
            panic!("expected InvalidSpecification");
        };
        assert_eq!(messages.len(), 3, "{messages:?}");
        assert!(messages.iter().any(|m| m.contains("openapi")));
        assert!(messages.iter().any(|m| m.contains("info.version")));
        assert!(messages.iter().any(|m| m.contains("paths")));
    }

    #[test]
    fn unparsable_text_is_invalid_specification() {
        let err = parse_spec("bad", "{ not yaml: [").unwrap_err();
        assert!(matches!(err, OpenApiToolsError::InvalidSpecification { .. }));
    }

    #[test]
    fn missing_responses_is_only_a_warning() {
        let d = diagnose(&serde_yaml::from_str::<Value>(
            "openapi: 3.1.0\ninfo: {title: t, version: '1'}\npaths:\n  /a:\n    get: {}\n",
        )
        .unwrap());
        assert!(d.fatal.is_empty());
        assert_eq!(d.warnings, vec!["operation GET /a has no responses".to_string()]);
    }

    #[tokio::test]
    async fn read_from_file_and_verify_hash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spec.yaml");
        fs::write(&path, PETSTORE).unwrap();
        let location = path.to_str().unwrap();

        let reader = OpenApiReader::new(DocumentLoader::new(Client::new()));
        assert_eq!(reader.read(location).await.unwrap().version(), Some("1.0.0"));

        let expected = format!("sha256:{}", hex::encode(Sha256::digest(PETSTORE.as_bytes())));
        let strict = OpenApiReader::new(DocumentLoader::new(Client::new()))
            .with_spec_hash(Some(expected), HashPolicy::Fail);
        strict.read(location).await.unwrap();

        let mismatched = OpenApiReader::new(DocumentLoader::new(Client::new()))
            .with_spec_hash(Some("sha256:00".into()), HashPolicy::Fail);
        assert!(mismatched.read(location).await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let reader = OpenApiReader::new(DocumentLoader::new(Client::new()));
        let err = reader.read("/definitely/not/here.yaml").await.unwrap_err();
        assert!(matches!(err, OpenApiToolsError::OpenApiSpecReadFile { .. }));
    }
}
