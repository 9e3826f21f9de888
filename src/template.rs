//! Prompt templates with a single `{prompt}` substitution point.

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Placeholder consumed by the server (or by [`Template::render`]).
pub const PLACEHOLDER: &str = "{prompt}";

/// A validated prompt template.
///
/// The server wraps the raw prompt in the model's instruction format, e.g.
/// `"<s>[INST] {prompt} [/INST]"` for Mistral-style models. A template must
/// contain exactly one `{prompt}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Template(String);

impl Template {
    /// Validate and wrap a template string.
    pub fn new(template: impl Into<String>) -> Result<Self, Error> {
        let template = template.into();
        match template.matches(PLACEHOLDER).count() {
            1 => Ok(Self(template)),
            0 => Err(Error::InvalidTemplate(format!(
                "missing {PLACEHOLDER} placeholder"
            ))),
            n => Err(Error::InvalidTemplate(format!(
                "expected one {PLACEHOLDER} placeholder, found {n}"
            ))),
        }
    }

    /// The raw template string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitute the prompt into the placeholder.
    ///
    /// The server performs this substitution itself when the template is
    /// sent along with the request; this helper is for callers that resolve
    /// the prompt locally instead.
    pub fn render(&self, prompt: &str) -> String {
        self.0.replacen(PLACEHOLDER, prompt, 1)
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Template::new(raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_template() {
        let t = Template::new("<s>[INST] {prompt} [/INST]").unwrap();
        assert_eq!(t.as_str(), "<s>[INST] {prompt} [/INST]");
    }

    #[test]
    fn test_render() {
        let t = Template::new("### Instruction: {prompt}\n\n### Response:").unwrap();
        assert_eq!(
            t.render("list the planets"),
            "### Instruction: list the planets\n\n### Response:"
        );
    }

    #[test]
    fn test_missing_placeholder() {
        let err = Template::new("no placeholder here").unwrap_err();
        assert!(matches!(err, Error::InvalidTemplate(_)));
    }

    #[test]
    fn test_multiple_placeholders() {
        let err = Template::new("{prompt} and {prompt}").unwrap_err();
        assert!(matches!(err, Error::InvalidTemplate(_)));
    }

    #[test]
    fn test_serde_transparent() {
        let t = Template::new("[INST] {prompt} [/INST]").unwrap();
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"[INST] {prompt} [/INST]\"");

        let back: Template = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);

        assert!(serde_json::from_str::<Template>("\"broken\"").is_err());
    }
}
