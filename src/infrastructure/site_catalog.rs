//! Built-in site definitions
//!
//! Selector lists are ordered from the most specific, stable hook to the most
//! generic one. Sites rework their markup often; a config file can replace any
//! entry by reusing its id under `custom_sites`.

use indexmap::IndexMap;

use super::parsing::config::default_blocked_markers;
use super::parsing::{ExclusionSpec, FieldSelectors, ListingSelectors, StrategySpec};
use super::scrape_error::{ScrapeError, ScrapeResult};
use super::site_config::{PaginationSpec, QueryEncoding, SiteConfig, SiteDefinition, SiteLimits};

fn text(selector: &str) -> StrategySpec {
    StrategySpec::text(selector)
}

fn attr(selector: &str, attr: &str) -> StrategySpec {
    StrategySpec::attr(selector, attr)
}

fn image(selector: &str) -> Vec<StrategySpec> {
    vec![attr(selector, "src"), attr(selector, "data-src")]
}

fn selectors(candidates: &[&str], fields: FieldSelectors) -> ListingSelectors {
    ListingSelectors {
        blocked_markers: default_blocked_markers(),
        ..ListingSelectors::new(candidates, fields)
    }
}

fn definition(
    id: &str,
    display_name: &str,
    search_url: &str,
    query_encoding: QueryEncoding,
    pagination: PaginationSpec,
    listing: ListingSelectors,
) -> SiteDefinition {
    SiteDefinition {
        id: id.to_string(),
        display_name: display_name.to_string(),
        search_url: search_url.to_string(),
        query_encoding,
        pagination,
        listing,
    }
}

fn amazon() -> SiteDefinition {
    let mut listing = selectors(
        &[r#"[data-component-type="s-search-result"]"#],
        FieldSelectors {
            name: vec![text("h2 a span"), text("h2 span"), text("h2")],
            price: vec![
                text(".a-price .a-offscreen"),
                text(".a-price-whole").with_prefix("$"),
            ],
            rating: vec![text(".a-icon-alt")],
            review_count: vec![
                text(r#"[aria-label*="stars"] + span"#),
                text("span.s-underline-text"),
            ],
            image_url: image(".s-image"),
            detail_url: vec![attr("h2 a", "href"), attr("a.a-link-normal", "href")],
        },
    );
    listing.last_page = vec![".s-pagination-next.s-pagination-disabled".to_string()];
    listing.end_markers = vec!["No results for".to_string()];
    listing
        .blocked_markers
        .push("Enter the characters you see below".to_string());

    definition(
        "amazon",
        "Amazon",
        "https://www.amazon.com/s?k={query}&i=fashion",
        QueryEncoding::Plus,
        PaginationSpec::next_control(&["a.s-pagination-next"]),
        listing,
    )
}

fn ebay() -> SiteDefinition {
    let mut listing = selectors(
        &[".s-item", "li.s-card"],
        FieldSelectors {
            name: vec![text(".s-item__title"), text(".s-card__title")],
            price: vec![text(".s-item__price"), text(".s-card__price")],
            rating: vec![text(".x-star-rating .clipped")],
            review_count: vec![text(".s-item__reviews-count span")],
            image_url: vec![
                attr(".s-item__image-img", "src"),
                attr(".s-item__image img", "src"),
                attr("img", "data-src"),
                attr("img", "src"),
            ],
            detail_url: vec![attr(".s-item__link", "href"), attr("a", "href")],
        },
    );
    listing.exclusions = vec![ExclusionSpec::NameContains {
        pattern: "Shop on eBay".to_string(),
    }];
    listing.end_markers = vec!["No exact matches found".to_string()];

    definition(
        "ebay",
        "eBay",
        "https://www.ebay.com/sch/i.html?_nkw={query}&_sacat=11450",
        QueryEncoding::Plus,
        PaginationSpec::query_param("_pgn"),
        listing,
    )
}

fn etsy() -> SiteDefinition {
    let mut listing = selectors(
        &["[data-listing-id]"],
        FieldSelectors {
            name: vec![text("h3"), text(r#"[class*="title"]"#)],
            price: vec![text(".currency-value").with_prefix("$"), text(r#"[class*="price"]"#)],
            rating: vec![attr(r#"input[name="rating"]"#, "value")],
            review_count: vec![],
            image_url: image("img"),
            detail_url: vec![attr("a", "href")],
        },
    );
    listing.end_markers = vec!["We couldn't find any results".to_string()];

    definition(
        "etsy",
        "Etsy",
        "https://www.etsy.com/search?q={query}&explicit=1&category_id=1&ship_to=US",
        QueryEncoding::Plus,
        PaginationSpec::query_param_after_first("page"),
        listing,
    )
}

fn aliexpress() -> SiteDefinition {
    let mut listing = selectors(
        &[r#"[class*="search-card-item"]"#, r#"[class*="product-card"]"#],
        FieldSelectors {
            name: vec![text("h3"), text(r#"[class*="title"]"#)],
            price: vec![text(r#"[class*="price-sale"]"#), text(r#"[class*="price"]"#)],
            rating: vec![text(r#"[class*="evaluation"]"#)],
            review_count: vec![],
            image_url: image("img"),
            detail_url: vec![StrategySpec::own_attr("href"), attr("a", "href")],
        },
    );
    listing.min_name_length = 6;

    definition(
        "aliexpress",
        "AliExpress",
        "https://www.aliexpress.com/w/wholesale-{query}.html?catId=200000343",
        QueryEncoding::Hyphen,
        PaginationSpec::query_param_after_first("page"),
        listing,
    )
}

fn asos() -> SiteDefinition {
    let mut listing = selectors(
        &[r#"article[data-auto-id="productTile"]"#, r#"[class*="productTile"]"#],
        FieldSelectors {
            name: vec![text(r#"[class*="productDescription"]"#), text("h2"), text("p")],
            price: vec![
                text(r#"[data-auto-id="productTilePrice"]"#),
                text(r#"[class*="price"]"#),
            ],
            rating: vec![],
            review_count: vec![],
            image_url: image("img"),
            detail_url: vec![attr("a", "href")],
        },
    );
    listing.end_markers = vec!["NOTHING MATCHES YOUR SEARCH".to_string()];

    definition(
        "asos",
        "ASOS",
        "https://www.asos.com/us/search/?q={query}",
        QueryEncoding::Plus,
        PaginationSpec::query_param_after_first("page"),
        listing,
    )
}

fn hm() -> SiteDefinition {
    definition(
        "hm",
        "H&M",
        "https://www2.hm.com/en_us/search-results.html?q={query}",
        QueryEncoding::Plus,
        PaginationSpec::query_param_after_first("page"),
        selectors(
            &[
                r#"[data-item-type="product"]"#,
                "article.product-item",
                ".product-item",
                r#"[class*="ProductItem"]"#,
            ],
            FieldSelectors {
                name: vec![text("a.link"), text(r#"[class*="ProductName"]"#), text("h2")],
                price: vec![text(r#"[class*="price"]"#), text("span.price")],
                rating: vec![],
                review_count: vec![],
                image_url: image("img"),
                detail_url: vec![attr("a", "href")],
            },
        ),
    )
}

fn shein() -> SiteDefinition {
    definition(
        "shein",
        "Shein",
        "https://us.shein.com/pdsearch/{query}/",
        QueryEncoding::Percent,
        PaginationSpec::query_param_after_first("page"),
        selectors(
            &[".product-card", r#"[class*="productCard"]"#, ".S-product-item"],
            FieldSelectors {
                name: vec![
                    text(r#"[class*="title"]"#),
                    text(r#"[class*="name"]"#),
                    attr("a[title]", "title"),
                ],
                price: vec![text(r#"[class*="price"]"#)],
                rating: vec![],
                review_count: vec![],
                image_url: image("img"),
                detail_url: vec![attr("a", "href")],
            },
        ),
    )
}

fn depop() -> SiteDefinition {
    definition(
        "depop",
        "Depop",
        "https://www.depop.com/search/?q={query}",
        QueryEncoding::Percent,
        PaginationSpec::query_param_after_first("page"),
        selectors(
            &[r#"[data-testid="product__item"]"#, r#"a[href*="/products/"]"#],
            FieldSelectors {
                name: vec![text(r#"[class*="ProductCard"]"#), text("p")],
                price: vec![text(r#"[aria-label="Price"]"#), text(r#"[class*="price"]"#)],
                rating: vec![],
                review_count: vec![],
                image_url: image("img"),
                detail_url: vec![StrategySpec::own_attr("href"), attr("a", "href")],
            },
        ),
    )
}

fn nordstrom() -> SiteDefinition {
    definition(
        "nordstrom",
        "Nordstrom",
        "https://www.nordstrom.com/sr?keyword={query}",
        QueryEncoding::Plus,
        PaginationSpec::query_param_after_first("page"),
        selectors(
            &["article[data-element]", r#"[class*="ProductCard"]"#],
            FieldSelectors {
                name: vec![text("h2"), text(r#"[class*="ProductName"]"#), text("h3")],
                price: vec![text(r#"[class*="Price"]"#)],
                rating: vec![],
                review_count: vec![],
                image_url: image("img"),
                detail_url: vec![attr("a", "href")],
            },
        ),
    )
}

fn forever21() -> SiteDefinition {
    definition(
        "forever21",
        "Forever 21",
        "https://www.forever21.com/us/shop/search/{query}",
        QueryEncoding::Percent,
        PaginationSpec::query_param_after_first("page"),
        selectors(
            &[".product-tile", r#"[class*="ProductCard"]"#],
            FieldSelectors {
                name: vec![
                    text(r#"[class*="product-name"]"#),
                    text(r#"[class*="title"]"#),
                    text("h3"),
                ],
                price: vec![text(r#"[class*="price"]"#)],
                rating: vec![],
                review_count: vec![],
                image_url: image("img"),
                detail_url: vec![attr("a", "href")],
            },
        ),
    )
}

fn zara() -> SiteDefinition {
    definition(
        "zara",
        "Zara",
        "https://www.zara.com/us/en/search?searchTerm={query}&section=MAN",
        QueryEncoding::Percent,
        PaginationSpec::query_param_after_first("page"),
        selectors(
            &[r#"[class*="product-grid-product"]"#, r#"li[class*="product"]"#],
            FieldSelectors {
                name: vec![
                    text(r#"[class*="product-name"]"#),
                    text(r#"[class*="name"]"#),
                    text("h2"),
                ],
                price: vec![text(r#"[class*="price"]"#)],
                rating: vec![],
                review_count: vec![],
                image_url: image("img"),
                detail_url: vec![attr("a", "href")],
            },
        ),
    )
}

/// Every built-in site in catalog order
pub fn builtin_sites() -> Vec<SiteDefinition> {
    vec![
        amazon(),
        ebay(),
        etsy(),
        aliexpress(),
        asos(),
        hm(),
        shein(),
        depop(),
        nordstrom(),
        forever21(),
        zara(),
    ]
}

/// Known site definitions keyed by id
#[derive(Debug, Clone)]
pub struct SiteCatalog {
    definitions: IndexMap<String, SiteDefinition>,
}

impl Default for SiteCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SiteCatalog {
    pub fn builtin() -> Self {
        Self::from_definitions(builtin_sites())
    }

    pub fn from_definitions(definitions: Vec<SiteDefinition>) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|d| (d.id.to_lowercase(), d))
                .collect(),
        }
    }

    /// Add user-defined sites; an existing id is replaced in place
    #[must_use]
    pub fn with_custom(mut self, custom: &[SiteDefinition]) -> Self {
        for site in custom {
            self.definitions.insert(site.id.to_lowercase(), site.clone());
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<&SiteDefinition> {
        self.definitions.get(&id.trim().to_lowercase())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &SiteDefinition> {
        self.definitions.values()
    }

    /// Compile the requested sites in the requested order.
    ///
    /// Unknown ids and invalid definitions fail before any fetch happens.
    /// Repeated ids are compiled once.
    pub fn compile(&self, ids: &[String], limits: SiteLimits) -> ScrapeResult<Vec<SiteConfig>> {
        let mut seen = Vec::with_capacity(ids.len());
        let mut sites = Vec::with_capacity(ids.len());

        for id in ids {
            let key = id.trim().to_lowercase();
            if seen.contains(&key) {
                continue;
            }
            let definition = self.get(&key).ok_or_else(|| {
                ScrapeError::fatal_config(
                    &key,
                    format!(
                        "unknown site (known: {})",
                        self.ids().collect::<Vec<_>>().join(", ")
                    ),
                )
            })?;
            sites.push(SiteConfig::compile(definition, limits)?);
            seen.push(key);
        }

        Ok(sites)
    }
}
