//! Tool descriptors and the immutable routing table built from them.
//!
//! A descriptor is pure data: which program to run, how to feed it input and
//! how to label its output. The registry is built once at startup and shared
//! read-only by every request.

use std::{collections::BTreeMap, collections::HashSet, sync::Arc};

use serde::Deserialize;
use thiserror::Error;

/// Content type used when a descriptor does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "image/svg+xml";

/// How the captured stdout is transformed before it reaches the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputEncoding {
    #[default]
    Raw,
    Base64,
}

/// Static definition of one external renderer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(rename = "Cmd")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub needs_file: bool,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub suffix: String,
    #[serde(default)]
    pub output_encoding: OutputEncoding,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub documentation: BTreeMap<String, String>,
    #[serde(default)]
    pub example: String,
    #[serde(default)]
    pub bg_color: String,
}

impl ToolDescriptor {
    /// Response content type, falling back to SVG when unset or blank.
    pub fn content_type(&self) -> &str {
        match self.content_type.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => value,
            _ => DEFAULT_CONTENT_TYPE,
        }
    }

    /// File name of the snippet saved under `id`.
    pub fn snippet_file_name(&self, id: &str) -> String {
        format!("{id}{}", self.suffix)
    }

    /// File name of the cached render for the snippet saved under `id`.
    pub fn artifact_file_name(&self, id: &str) -> String {
        format!("{id}{}.out", self.suffix)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolValidationError {
    #[error("no tools configured")]
    Empty,
    #[error("tool #{index} has an empty name")]
    EmptyName { index: usize },
    #[error("tool name `{name}` may only contain ASCII letters, digits, `-` and `_`")]
    InvalidName { name: String },
    #[error("tool name `{name}` is reserved")]
    Reserved { name: String },
    #[error("tool `{name}` is declared more than once")]
    Duplicate { name: String },
    #[error("tool `{name}` has an empty command")]
    EmptyCommand { name: String },
}

/// Top-level path segments served by the gateway itself.
const RESERVED_NAMES: &[&str] = &["static"];

/// Ordered, read-only set of configured tools.
///
/// Order is the configuration order; the first entry is the landing tool.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Arc<[Arc<ToolDescriptor>]>,
}

impl ToolRegistry {
    pub fn new(descriptors: Vec<ToolDescriptor>) -> Result<Self, ToolValidationError> {
        if descriptors.is_empty() {
            return Err(ToolValidationError::Empty);
        }

        let mut seen = HashSet::with_capacity(descriptors.len());
        for (index, tool) in descriptors.iter().enumerate() {
            if tool.name.is_empty() {
                return Err(ToolValidationError::EmptyName { index });
            }
            if !is_route_safe(&tool.name) {
                return Err(ToolValidationError::InvalidName {
                    name: tool.name.clone(),
                });
            }
            if RESERVED_NAMES.contains(&tool.name.as_str()) {
                return Err(ToolValidationError::Reserved {
                    name: tool.name.clone(),
                });
            }
            if !seen.insert(tool.name.as_str()) {
                return Err(ToolValidationError::Duplicate {
                    name: tool.name.clone(),
                });
            }
            if tool.command.trim().is_empty() {
                return Err(ToolValidationError::EmptyCommand {
                    name: tool.name.clone(),
                });
            }
        }

        let tools = descriptors.into_iter().map(Arc::new).collect();
        Ok(Self { tools })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.tools.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ToolDescriptor>> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    /// The tool `/` redirects to. Never absent: construction rejects empty sets.
    pub fn first(&self) -> &Arc<ToolDescriptor> {
        &self.tools[0]
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn is_route_safe(name: &str) -> bool {
    name.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Vec<ToolDescriptor> {
        serde_json::from_str(json).expect("valid descriptor json")
    }

    #[test]
    fn parses_pascal_case_descriptor() {
        let tools = parse(
            r##"[{
                "Name": "dot",
                "Cmd": "dot",
                "Args": ["-Tsvg"],
                "Suffix": ".dot",
                "Documentation": {"manual": "https://graphviz.org"},
                "BgColor": "#fff"
            }]"##,
        );
        let tool = &tools[0];
        assert_eq!(tool.name, "dot");
        assert_eq!(tool.command, "dot");
        assert_eq!(tool.args, vec!["-Tsvg".to_string()]);
        assert!(!tool.needs_file);
        assert_eq!(tool.output_encoding, OutputEncoding::Raw);
        assert_eq!(tool.content_type(), DEFAULT_CONTENT_TYPE);
        assert_eq!(tool.bg_color, "#fff");
        assert_eq!(
            tool.documentation.get("manual").map(String::as_str),
            Some("https://graphviz.org")
        );
    }

    #[test]
    fn explicit_content_type_and_encoding_are_kept() {
        let tools = parse(
            r#"[{"Name": "pic", "Cmd": "pic2png", "NeedsFile": true,
                 "ContentType": "image/png", "OutputEncoding": "base64", "Suffix": ".pic"}]"#,
        );
        assert!(tools[0].needs_file);
        assert_eq!(tools[0].content_type(), "image/png");
        assert_eq!(tools[0].output_encoding, OutputEncoding::Base64);
    }

    #[test]
    fn blank_content_type_falls_back_to_svg() {
        let tools = parse(r#"[{"Name": "a", "Cmd": "a", "ContentType": "  "}]"#);
        assert_eq!(tools[0].content_type(), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn file_names_append_suffix() {
        let tools = parse(r#"[{"Name": "dot", "Cmd": "dot", "Suffix": ".dot"}]"#);
        assert_eq!(tools[0].snippet_file_name("abc"), "abc.dot");
        assert_eq!(tools[0].artifact_file_name("abc"), "abc.dot.out");
    }

    #[test]
    fn registry_rejects_empty_and_duplicates() {
        assert_eq!(
            ToolRegistry::new(Vec::new()).unwrap_err(),
            ToolValidationError::Empty
        );

        let dup = parse(r#"[{"Name": "a", "Cmd": "x"}, {"Name": "a", "Cmd": "y"}]"#);
        assert_eq!(
            ToolRegistry::new(dup).unwrap_err(),
            ToolValidationError::Duplicate {
                name: "a".to_string()
            }
        );
    }

    #[test]
    fn registry_rejects_names_that_cannot_be_routed() {
        let bad = parse(r#"[{"Name": "a/b", "Cmd": "x"}]"#);
        assert!(matches!(
            ToolRegistry::new(bad),
            Err(ToolValidationError::InvalidName { .. })
        ));

        let reserved = parse(r#"[{"Name": "static", "Cmd": "x"}]"#);
        assert!(matches!(
            ToolRegistry::new(reserved),
            Err(ToolValidationError::Reserved { .. })
        ));

        let empty_cmd = parse(r#"[{"Name": "ok", "Cmd": " "}]"#);
        assert!(matches!(
            ToolRegistry::new(empty_cmd),
            Err(ToolValidationError::EmptyCommand { .. })
        ));
    }

    #[test]
    fn registry_keeps_configuration_order() {
        let tools = parse(r#"[{"Name": "b", "Cmd": "x"}, {"Name": "a", "Cmd": "y"}]"#);
        let registry = ToolRegistry::new(tools).expect("valid registry");
        assert_eq!(registry.first().name, "b");
        assert_eq!(registry.len(), 2);
        assert!(registry.get("a").is_some());
        assert!(registry.get("c").is_none());
    }
}
