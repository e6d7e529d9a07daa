//! A minimal stand-in for DFXML `fileobject` records: an ordered list of
//! named fields rendered as `key=value` pairs. This is not a general DFXML
//! writer — scanners don't need XML, just a stable, readable context
//! string for the feature file — but the field names and ordering mirror
//! what a `fileobject` element would carry for the same artifact.

use std::fmt;

#[derive(Debug, Default)]
pub struct FileObjectBuilder {
    fields: Vec<(String, String)>,
}

impl FileObjectBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.fields.push((key.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn build(self) -> String {
        self.fields.into_iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_render_in_insertion_order() {
        let s = FileObjectBuilder::new().field("name", "FOO.TXT").field("size", 1024).build();
        assert_eq!(s, "name=FOO.TXT, size=1024");
    }

    #[test]
    fn empty_builder_renders_empty_string() {
        assert_eq!(FileObjectBuilder::new().build(), "");
    }
}
