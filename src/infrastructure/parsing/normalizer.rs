//! Item normalization: candidate node to canonical [`Record`]

use regex::{Regex, RegexBuilder};
use scraper::{ElementRef, Selector};
use thiserror::Error;
use tracing::trace;
use url::Url;

use super::config::{ExclusionSpec, FieldSelectors};
use super::extractor::extract;
use super::strategy::{compile_selector, SelectorStrategy};
use crate::domain::{Clock, FieldValue, Record};
use crate::infrastructure::scrape_error::{ScrapeError, ScrapeResult};

/// Why a candidate node did not become a record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("no name strategy matched")]
    MissingName,

    #[error("name '{name}' is shorter than {min} characters")]
    NameTooShort { name: String, min: usize },

    #[error("excluded by {rule}")]
    Excluded { rule: String },
}

impl Rejection {
    pub fn into_error(self, site_id: &str) -> ScrapeError {
        ScrapeError::ItemRejected {
            site_id: site_id.to_string(),
            reason: self.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
enum ExclusionRule {
    NameMatches { regex: Regex, pattern: String },
    NodeMatches { selector: Selector, source: String },
}

impl ExclusionRule {
    fn compile(spec: &ExclusionSpec, site_id: &str) -> ScrapeResult<Self> {
        match spec {
            ExclusionSpec::NameContains { pattern } => {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        ScrapeError::fatal_config(
                            site_id,
                            format!("invalid exclusion pattern '{pattern}': {e}"),
                        )
                    })?;
                Ok(Self::NameMatches {
                    regex,
                    pattern: pattern.clone(),
                })
            }
            ExclusionSpec::NodeMatches { selector } => Ok(Self::NodeMatches {
                selector: compile_selector(selector, site_id)?,
                source: selector.clone(),
            }),
        }
    }

    fn matches(&self, node: ElementRef<'_>, name: &str) -> bool {
        match self {
            Self::NameMatches { regex, .. } => regex.is_match(name),
            Self::NodeMatches { selector, .. } => {
                selector.matches(&node) || node.select(selector).next().is_some()
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::NameMatches { pattern, .. } => format!("name pattern '{pattern}'"),
            Self::NodeMatches { source, .. } => format!("node selector '{source}'"),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledFields {
    name: Vec<SelectorStrategy>,
    price: Vec<SelectorStrategy>,
    rating: Vec<SelectorStrategy>,
    review_count: Vec<SelectorStrategy>,
    image_url: Vec<SelectorStrategy>,
    detail_url: Vec<SelectorStrategy>,
}

/// Turns candidate nodes of one site into records or rejections
#[derive(Debug, Clone)]
pub struct ItemNormalizer {
    site_id: String,
    fields: CompiledFields,
    exclusions: Vec<ExclusionRule>,
    min_name_length: usize,
}

impl ItemNormalizer {
    pub fn compile(
        site_id: &str,
        fields: &FieldSelectors,
        exclusions: &[ExclusionSpec],
        min_name_length: usize,
    ) -> ScrapeResult<Self> {
        if fields.name.is_empty() {
            return Err(ScrapeError::fatal_config(
                site_id,
                "name field has no extraction strategies",
            ));
        }

        let compiled = CompiledFields {
            name: SelectorStrategy::compile_all(&fields.name, site_id)?,
            price: SelectorStrategy::compile_all(&fields.price, site_id)?,
            rating: SelectorStrategy::compile_all(&fields.rating, site_id)?,
            review_count: SelectorStrategy::compile_all(&fields.review_count, site_id)?,
            image_url: SelectorStrategy::compile_all(&fields.image_url, site_id)?,
            detail_url: SelectorStrategy::compile_all(&fields.detail_url, site_id)?,
        };

        let exclusions = exclusions
            .iter()
            .map(|spec| ExclusionRule::compile(spec, site_id))
            .collect::<ScrapeResult<Vec<_>>>()?;

        Ok(Self {
            site_id: site_id.to_string(),
            fields: compiled,
            exclusions,
            min_name_length: min_name_length.max(1),
        })
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// Extract every field of one candidate.
    ///
    /// Relative image and detail links are resolved against `page_url`.
    /// Missing optional fields degrade to `Unavailable`; only the name can
    /// reject the item.
    pub fn normalize(
        &self,
        node: ElementRef<'_>,
        page_url: Option<&Url>,
        clock: &dyn Clock,
    ) -> Result<Record, Rejection> {
        let name = extract(node, &self.fields.name)
            .into_option()
            .ok_or(Rejection::MissingName)?;

        if let Some(rule) = self.exclusions.iter().find(|rule| rule.matches(node, &name)) {
            return Err(Rejection::Excluded {
                rule: rule.describe(),
            });
        }

        if name.chars().count() < self.min_name_length {
            return Err(Rejection::NameTooShort {
                name,
                min: self.min_name_length,
            });
        }

        let record = Record {
            source: self.site_id.clone(),
            name,
            price: self.optional("price", node, &self.fields.price),
            rating: self.optional("rating", node, &self.fields.rating),
            review_count: self.optional("review_count", node, &self.fields.review_count),
            image_url: resolve(self.optional("image_url", node, &self.fields.image_url), page_url),
            detail_url: resolve(
                self.optional("detail_url", node, &self.fields.detail_url),
                page_url,
            ),
            retrieved_at: clock.now(),
        };

        Ok(record)
    }

    fn optional(
        &self,
        field: &str,
        node: ElementRef<'_>,
        strategies: &[SelectorStrategy],
    ) -> FieldValue {
        let value = extract(node, strategies);
        if !value.is_available() {
            trace!(
                "{}",
                ScrapeError::FieldUnavailable {
                    site_id: self.site_id.clone(),
                    field: field.to_string(),
                }
            );
        }
        value
    }
}

/// Resolve a possibly relative link; unresolvable links become `Unavailable`
fn resolve(value: FieldValue, base: Option<&Url>) -> FieldValue {
    let FieldValue::Present(href) = value else {
        return FieldValue::Unavailable;
    };
    let resolved = match base {
        Some(base) => base.join(&href),
        None => Url::parse(&href),
    };
    resolved.map_or(FieldValue::Unavailable, |url| FieldValue::Present(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FixedClock;
    use crate::infrastructure::parsing::strategy::StrategySpec;
    use chrono::{TimeZone, Utc};
    use scraper::Html;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    fn fields() -> FieldSelectors {
        FieldSelectors {
            name: vec![StrategySpec::text(".title"), StrategySpec::text("h3")],
            price: vec![StrategySpec::text(".price")],
            rating: vec![StrategySpec::text(".rating")],
            review_count: vec![],
            image_url: vec![StrategySpec::attr("img", "src"), StrategySpec::attr("img", "data-src")],
            detail_url: vec![StrategySpec::attr("a", "href")],
        }
    }

    fn normalizer(exclusions: &[ExclusionSpec], min: usize) -> ItemNormalizer {
        ItemNormalizer::compile("shop", &fields(), exclusions, min).unwrap()
    }

    fn run(normalizer: &ItemNormalizer, fragment: &str) -> Result<Record, Rejection> {
        let html = Html::parse_fragment(fragment);
        let item = Selector::parse(".item").unwrap();
        let node = html.select(&item).next().unwrap();
        let base = Url::parse("https://shop.example/search?q=shirt").unwrap();
        normalizer.normalize(node, Some(&base), &clock())
    }

    #[test]
    fn builds_record_with_resolved_links() {
        let record = run(
            &normalizer(&[], 1),
            r#"<div class="item"><h3>Blue Shirt</h3><span class="price">$19.99</span>
               <img data-src="//cdn.shop.example/1.jpg"><a href="/p/1">view</a></div>"#,
        )
        .unwrap();

        assert_eq!(record.source, "shop");
        assert_eq!(record.name, "Blue Shirt");
        assert_eq!(record.price.as_deref(), Some("$19.99"));
        assert_eq!(record.rating, FieldValue::Unavailable);
        assert_eq!(record.review_count, FieldValue::Unavailable);
        assert_eq!(record.image_url.as_deref(), Some("https://cdn.shop.example/1.jpg"));
        assert_eq!(record.detail_url.as_deref(), Some("https://shop.example/p/1"));
        assert_eq!(record.retrieved_at, clock().0);
    }

    #[test]
    fn relative_link_without_base_is_unavailable() {
        let html = Html::parse_fragment(r#"<div class="item"><h3>Blue Shirt</h3><a href="/p/1">x</a></div>"#);
        let item = Selector::parse(".item").unwrap();
        let node = html.select(&item).next().unwrap();
        let record = normalizer(&[], 1).normalize(node, None, &clock()).unwrap();
        assert_eq!(record.detail_url, FieldValue::Unavailable);
    }

    #[test]
    fn normalization_is_idempotent() {
        let fragment = r#"<div class="item"><h3>Blue Shirt</h3><a href="/p/1">x</a></div>"#;
        let n = normalizer(&[], 1);
        assert_eq!(run(&n, fragment), run(&n, fragment));
    }

    #[test]
    fn missing_name_rejects() {
        let result = run(&normalizer(&[], 1), r#"<div class="item"><span class="price">$5</span></div>"#);
        assert_eq!(result, Err(Rejection::MissingName));
    }

    #[test]
    fn short_name_rejects() {
        let result = run(&normalizer(&[], 6), r#"<div class="item"><h3>Tee</h3></div>"#);
        assert!(matches!(result, Err(Rejection::NameTooShort { min: 6, .. })));
    }

    #[test]
    fn name_exclusion_rejects_promotional_tiles() {
        let rules = [ExclusionSpec::NameContains {
            pattern: "shop on ebay".to_string(),
        }];
        let result = run(&normalizer(&rules, 1), r#"<div class="item"><h3>Shop on eBay</h3></div>"#);
        assert!(matches!(result, Err(Rejection::Excluded { .. })));
    }

    #[test]
    fn node_exclusion_checks_descendants() {
        let rules = [ExclusionSpec::NodeMatches {
            selector: ".sponsored".to_string(),
        }];
        let result = run(
            &normalizer(&rules, 1),
            r#"<div class="item"><h3>Ad Shirt</h3><span class="sponsored">Ad</span></div>"#,
        );
        assert!(matches!(result, Err(Rejection::Excluded { .. })));
    }

    #[test]
    fn empty_name_strategies_are_fatal() {
        let fields = FieldSelectors::default();
        let err = ItemNormalizer::compile("shop", &fields, &[], 1).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn rejection_converts_to_item_rejected() {
        let err = Rejection::MissingName.into_error("asos");
        assert!(matches!(err, ScrapeError::ItemRejected { ref site_id, .. } if site_id == "asos"));
    }
}
