//! Annotation form configuration: the closed sets of labels and categories.
//!
//! Loaded once at process start from TOML, or the built-in defaults:
//!
//! ```toml
//! [form]
//! labels = ["hate", "non-hate"]
//! categories = ["none", "religion", "race"]
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

const DEFAULT_LABELS: &[&str] = &["hate", "non-hate"];

const DEFAULT_CATEGORIES: &[&str] = &[
    "none",
    "religion",
    "race",
    "caste",
    "regionalism",
    "language",
    "body shaming",
    "disability",
    "age",
    "gender",
    "sexual",
    "political",
    "privacy",
    "cyber bully",
];

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct FormFile {
    form: FormConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FormConfig {
    pub labels: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
            categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FormConfig {
    /// Load and check a form config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read form config {}: {e}", path.display()))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("bad form config {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: FormFile = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        file.form.check()?;
        Ok(file.form)
    }

    fn check(&self) -> Result<()> {
        if self.labels.is_empty() {
            return Err(Error::Config("at least one label is required".to_string()));
        }
        if let Some(blank) = self.labels.iter().find(|l| l.trim().is_empty()) {
            return Err(Error::Config(format!("blank label {blank:?}")));
        }
        ensure_distinct("label", &self.labels)?;
        ensure_distinct("category", &self.categories)
    }

    /// Reject a decision whose label or categories fall outside the closed sets.
    pub fn validate(&self, label: &str, categories: &[String]) -> Result<()> {
        if label.trim().is_empty() {
            return Err(Error::InvalidInput("label is required".to_string()));
        }
        if !self.labels.iter().any(|l| l == label) {
            return Err(Error::InvalidInput(format!(
                "unknown label '{label}' (expected one of: {})",
                self.labels.join(", ")
            )));
        }
        if let Some(unknown) = categories
            .iter()
            .find(|c| !self.categories.iter().any(|known| known == *c))
        {
            return Err(Error::InvalidInput(format!("unknown category '{unknown}'")));
        }
        Ok(())
    }
}

fn ensure_distinct(what: &str, values: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    match values.iter().find(|v| !seen.insert(v.as_str())) {
        Some(dup) => Err(Error::Config(format!("duplicate {what} '{dup}'"))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_accept_known_values() {
        let form = FormConfig::default();
        assert!(form.validate("hate", &["religion".to_string()]).is_ok());
        assert!(form.validate("non-hate", &[]).is_ok());
    }

    #[test]
    fn rejects_blank_and_unknown_labels() {
        let form = FormConfig::default();
        assert!(matches!(form.validate("  ", &[]), Err(Error::InvalidInput(_))));
        assert!(matches!(form.validate("spam", &[]), Err(Error::InvalidInput(_))));
        assert!(matches!(
            form.validate("hate", &["weather".to_string()]),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn parses_toml_and_rejects_duplicates() {
        let form = FormConfig::parse(
            r#"
            [form]
            labels = ["spam", "ham"]
            "#,
        )
        .unwrap();
        assert_eq!(form.labels, vec!["spam", "ham"]);
        assert!(form.categories.is_empty());

        let dup = FormConfig::parse(
            r#"
            [form]
            labels = ["spam", "spam"]
            "#,
        );
        assert!(matches!(dup, Err(Error::Config(_))));

        let empty = FormConfig::parse("[form]\nlabels = []\n");
        assert!(matches!(empty, Err(Error::Config(_))));
    }
}
