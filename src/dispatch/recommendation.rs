//! Label -> recommendation text mapping
//!
//! The table is plain data loaded from the `[recommendations]` section of the
//! service config. Without configuration it has exactly two branches: the
//! healthy label gets a no-action message, everything else gets a templated
//! message naming the condition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label the bundled models use for healthy leaves
pub const HEALTHY_LABEL: &str = "Healthy";

/// No-action message for healthy plants
pub const HEALTHY_TEXT: &str = "لا يوجد مرض ملحوظ. استمر في رعاية النباتات جيدا.";

/// Placeholder replaced by the diagnosed label in [`DISEASE_TEMPLATE`]
pub const DISEASE_PLACEHOLDER: &str = "{disease}";

/// Message for any diagnosed condition, advising expert consultation
pub const DISEASE_TEMPLATE: &str =
    "تم تشخيص المرض كـ {disease}. يرجى مراجعة الخبراء الزراعيين وتطبيق العلاجات الموصى بها لهذا المرض.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecommendationTable {
    pub healthy_label: String,
    pub healthy_text: String,
    pub disease_template: String,
    /// Per-label texts that take precedence over both branches
    pub overrides: BTreeMap<String, String>,
}

impl Default for RecommendationTable {
    fn default() -> Self {
        Self {
            healthy_label: HEALTHY_LABEL.to_string(),
            healthy_text: HEALTHY_TEXT.to_string(),
            disease_template: DISEASE_TEMPLATE.to_string(),
            overrides: BTreeMap::new(),
        }
    }
}

impl RecommendationTable {
    /// Add or replace the text for one label
    pub fn with_override(mut self, label: &str, text: &str) -> Self {
        self.overrides.insert(label.to_string(), text.to_string());
        self
    }

    /// Recommendation text for a diagnosed label
    pub fn recommend(&self, label: &str) -> String {
        if let Some(text) = self.overrides.get(label) {
            return text.clone();
        }
        if label == self.healthy_label {
            return self.healthy_text.clone();
        }
        self.disease_template.replace(DISEASE_PLACEHOLDER, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_gets_no_action_message() {
        let table = RecommendationTable::default();
        assert_eq!(table.recommend("Healthy"), HEALTHY_TEXT);
    }

    #[test]
    fn test_disease_is_named_in_text() {
        let table = RecommendationTable::default();
        let text = table.recommend("Powdery Mildew");
        assert!(text.contains("Powdery Mildew"));
        assert!(!text.contains(DISEASE_PLACEHOLDER));
        assert_ne!(text, HEALTHY_TEXT);
    }

    #[test]
    fn test_label_matching_is_exact() {
        let table = RecommendationTable::default();
        assert_ne!(table.recommend("healthy"), HEALTHY_TEXT);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let table = RecommendationTable::default().with_override("Leaf Rust", "Apply fungicide.");
        assert_eq!(table.recommend("Leaf Rust"), "Apply fungicide.");
        assert!(table.recommend("Stem Rust").contains("Stem Rust"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let table: RecommendationTable = toml::from_str(
            r#"
disease_template = "Detected {disease}. Contact your local extension office."

[overrides]
"Sooty Mould" = "Control the insects producing honeydew."
"#,
        )
        .unwrap();

        assert_eq!(table.healthy_text, HEALTHY_TEXT);
        assert_eq!(
            table.recommend("Die Back"),
            "Detected Die Back. Contact your local extension office."
        );
        assert_eq!(
            table.recommend("Sooty Mould"),
            "Control the insects producing honeydew."
        );
    }
}
