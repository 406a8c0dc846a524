use super::OpenApiFilter;
use crate::document::SpecDocument;
use crate::error::Result;
use crate::walker::{SchemaWalker, Visit};
use serde_json::{Map, Value};

/// Strips the `pattern` keyword from every schema. Properties that happen to be named
/// `pattern` are untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternPropertyRemover;

impl OpenApiFilter for PatternPropertyRemover {
    fn name(&self) -> &'static str {
        "PatternPropertyRemover"
    }

    fn filter(&self, document: &mut SpecDocument) -> Result<()> {
        let mut removed = 0usize;
        SchemaWalker::new(|node: &mut Map<String, Value>| {
            if matches!(node.get("pattern"), Some(Value::String(_))) {
                node.remove("pattern");
                removed += 1;
            }
            Visit::Descend
        })
        .walk_document(document.value_mut());
        tracing::debug!(removed, "removed pattern keywords");
        Ok(())
    }
}
