use crate::config::ReplaceRule;
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

/// Boilerplate stripped after the custom rules
static DEFAULT_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"\s+(class|id)=".*?""#,
        r"<script.*?</script>",
        r"<a .*?>|</a>",
        r"<h\d.*</h\d>",
    ]
    .iter()
    .map(|pattern| compile(pattern).expect("default refine rule is valid"))
    .collect()
});

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Substitution rules applied to extracted field values
#[derive(Debug, Clone, Default)]
pub struct Refiner {
    rules: Vec<(Regex, String)>,
}

impl Refiner {
    /// Compiles a collector's replace rules
    ///
    /// Rules that fail to compile are logged and skipped.
    pub fn new(rules: &[ReplaceRule]) -> Self {
        let rules = rules
            .iter()
            .filter_map(|rule| match compile(&rule.pattern) {
                Ok(regex) => Some((regex, rule.replacement.clone())),
                Err(e) => {
                    tracing::warn!("Skipping replace rule '{}': {}", rule.pattern, e);
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// True when at least one custom rule is configured
    pub fn is_active(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Refines one value
    ///
    /// Without custom rules the value is returned unchanged. Otherwise
    /// newlines are removed, the value is trimmed, the custom rules run in
    /// order and the boilerplate rules (class/id attributes, scripts, anchor
    /// tags, headings) run last.
    pub fn refine(&self, value: &str) -> String {
        if !self.is_active() {
            return value.to_string();
        }

        let mut content = value.replace('\n', "").trim().to_string();
        for (regex, replacement) in &self.rules {
            content = regex.replace_all(&content, replacement.as_str()).into_owned();
        }
        for regex in DEFAULT_RULES.iter() {
            content = regex.replace_all(&content, "").into_owned();
        }
        content
    }

    pub fn refine_all(&self, values: Vec<String>) -> Vec<String> {
        if !self.is_active() {
            return values;
        }
        values.iter().map(|v| self.refine(v)).collect()
    }
}
