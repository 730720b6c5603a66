//! Selector strategies: one concrete rule for pulling a value out of a
//! candidate node.
//!
//! Strategies are declared as serializable [`StrategySpec`] data and compiled
//! once into [`SelectorStrategy`] when a site is configured.

use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};

use crate::infrastructure::scrape_error::{ScrapeError, ScrapeResult};

/// Declarative form of a strategy, as written in site definitions and config files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategySpec {
    /// Text content of the first descendant matching `selector`
    Text {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
    },
    /// Attribute value of the first descendant matching `selector`
    Attr {
        selector: String,
        attr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
    },
    /// Attribute of the candidate node itself
    OwnAttr { attr: String },
    /// Text content of the candidate node itself
    OwnText,
}

impl StrategySpec {
    pub fn text(selector: &str) -> Self {
        Self::Text {
            selector: selector.to_string(),
            prefix: None,
        }
    }

    pub fn attr(selector: &str, attr: &str) -> Self {
        Self::Attr {
            selector: selector.to_string(),
            attr: attr.to_string(),
            prefix: None,
        }
    }

    pub fn own_attr(attr: &str) -> Self {
        Self::OwnAttr {
            attr: attr.to_string(),
        }
    }

    /// Prepend `prefix` to a successful match (e.g. `$` before a bare amount)
    #[must_use]
    pub fn with_prefix(self, value: &str) -> Self {
        match self {
            Self::Text { selector, .. } => Self::Text {
                selector,
                prefix: Some(value.to_string()),
            },
            Self::Attr { selector, attr, .. } => Self::Attr {
                selector,
                attr,
                prefix: Some(value.to_string()),
            },
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
enum StrategyKind {
    Text(Selector),
    Attr(Selector, String),
    OwnAttr(String),
    OwnText,
}

/// Compiled strategy; a pure function of a node to an optional string
#[derive(Debug, Clone)]
pub struct SelectorStrategy {
    kind: StrategyKind,
    prefix: Option<String>,
    description: String,
}

impl SelectorStrategy {
    pub fn compile(spec: &StrategySpec, site_id: &str) -> ScrapeResult<Self> {
        let (kind, prefix, description) = match spec {
            StrategySpec::Text { selector, prefix } => (
                StrategyKind::Text(compile_selector(selector, site_id)?),
                prefix.clone(),
                format!("text({selector})"),
            ),
            StrategySpec::Attr {
                selector,
                attr,
                prefix,
            } => (
                StrategyKind::Attr(compile_selector(selector, site_id)?, attr.clone()),
                prefix.clone(),
                format!("attr({selector}@{attr})"),
            ),
            StrategySpec::OwnAttr { attr } => (
                StrategyKind::OwnAttr(attr.clone()),
                None,
                format!("own_attr(@{attr})"),
            ),
            StrategySpec::OwnText => (StrategyKind::OwnText, None, "own_text".to_string()),
        };

        Ok(Self {
            kind,
            prefix,
            description,
        })
    }

    pub fn compile_all(specs: &[StrategySpec], site_id: &str) -> ScrapeResult<Vec<Self>> {
        specs.iter().map(|spec| Self::compile(spec, site_id)).collect()
    }

    /// Apply to one node. Blank results count as no match.
    pub fn apply(&self, node: ElementRef<'_>) -> Option<String> {
        let raw = match &self.kind {
            StrategyKind::Text(selector) => node.select(selector).next().map(element_text),
            StrategyKind::Attr(selector, attr) => node
                .select(selector)
                .find_map(|el| el.value().attr(attr).map(str::to_string)),
            StrategyKind::OwnAttr(attr) => node.value().attr(attr).map(str::to_string),
            StrategyKind::OwnText => Some(element_text(node)),
        }?;

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        Some(match &self.prefix {
            Some(prefix) if !trimmed.starts_with(prefix.as_str()) => format!("{prefix}{trimmed}"),
            _ => trimmed.to_string(),
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Parse a CSS selector, mapping failures to a configuration error
pub fn compile_selector(selector: &str, site_id: &str) -> ScrapeResult<Selector> {
    Selector::parse(selector)
        .map_err(|e| ScrapeError::invalid_selector(site_id, selector, &e.to_string()))
}

/// Visible text of an element with whitespace runs collapsed
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
