//! Selector configuration for listing pages
//!
//! Every field carries an ordered list of fallback strategies. Sites are
//! rebuilt often, so the lists are data rather than code and can be replaced
//! from a config file without touching the parser.

use serde::{Deserialize, Serialize};

use super::strategy::StrategySpec;

/// Ordered fallback strategies for each record field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelectors {
    /// Required; an empty list is a configuration error
    pub name: Vec<StrategySpec>,
    #[serde(default)]
    pub price: Vec<StrategySpec>,
    #[serde(default)]
    pub rating: Vec<StrategySpec>,
    #[serde(default)]
    pub review_count: Vec<StrategySpec>,
    #[serde(default)]
    pub image_url: Vec<StrategySpec>,
    #[serde(default)]
    pub detail_url: Vec<StrategySpec>,
}

/// Predicate that drops a candidate which is not a real product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionSpec {
    /// Case-insensitive regex tested against the extracted name
    NameContains { pattern: String },
    /// CSS selector matching the candidate or one of its descendants
    NodeMatches { selector: String },
}

/// Everything the listing parser needs to turn one page into records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSelectors {
    /// Candidate item selectors; the first one with any match wins
    pub candidates: Vec<String>,
    pub fields: FieldSelectors,
    #[serde(default)]
    pub exclusions: Vec<ExclusionSpec>,
    /// Names shorter than this (in characters) are rejected
    #[serde(default = "default_min_name_length")]
    pub min_name_length: usize,
    /// Case-insensitive body substrings that signal a captcha or bot wall
    #[serde(default)]
    pub blocked_markers: Vec<String>,
    /// Case-insensitive body substrings that signal "no results"
    #[serde(default)]
    pub end_markers: Vec<String>,
    /// Present when the current page is the last one (e.g. a disabled next button)
    #[serde(default)]
    pub last_page: Vec<String>,
}

const fn default_min_name_length() -> usize {
    3
}

impl ListingSelectors {
    pub fn new(candidates: &[&str], fields: FieldSelectors) -> Self {
        Self {
            candidates: candidates.iter().map(|s| (*s).to_string()).collect(),
            fields,
            min_name_length: default_min_name_length(),
            ..Self::default()
        }
    }
}

/// Default markers shared by every built-in site
pub fn default_blocked_markers() -> Vec<String> {
    [
        "captcha",
        "robot check",
        "are you a human",
        "verify you are human",
        "unusual traffic",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_default_to_empty() {
        let fields: FieldSelectors = serde_json::from_str(
            r#"{"name":[{"kind":"text","selector":"h3"}]}"#,
        )
        .unwrap();
        assert_eq!(fields.name.len(), 1);
        assert!(fields.price.is_empty());
        assert!(fields.detail_url.is_empty());
    }

    #[test]
    fn listing_selectors_default_min_length() {
        let listing: ListingSelectors = serde_json::from_str(
            r#"{"candidates":[".card"],"fields":{"name":[{"kind":"own_text"}]}}"#,
        )
        .unwrap();
        assert_eq!(listing.min_name_length, 3);
        assert!(listing.blocked_markers.is_empty());
    }

    #[test]
    fn exclusions_are_tagged() {
        let rule: ExclusionSpec =
            serde_json::from_str(r#"{"kind":"name_contains","pattern":"Shop on eBay"}"#).unwrap();
        assert_eq!(
            rule,
            ExclusionSpec::NameContains {
                pattern: "Shop on eBay".to_string()
            }
        );
    }
}
