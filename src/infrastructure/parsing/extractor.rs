//! Ordered-fallback field extraction

use scraper::ElementRef;
use tracing::trace;

use super::strategy::SelectorStrategy;
use crate::domain::FieldValue;

/// Evaluate `strategies` in order and return the first non-empty match.
///
/// A match that only repeats the unavailable marker ("N/A") counts as a miss.
///
/// Later strategies are never evaluated once one matches. Returns
/// [`FieldValue::Unavailable`] when every strategy misses (or the list is
/// empty); this function has no failure path.
pub fn extract(node: ElementRef<'_>, strategies: &[SelectorStrategy]) -> FieldValue {
    strategies
        .iter()
        .enumerate()
        .find_map(|(index, strategy)| {
            let matched = strategy
                .apply(node)
                .filter(|value| !FieldValue::is_marker(value));
            if matched.is_none() {
                trace!("strategy #{} {} missed", index, strategy.description());
            }
            matched
        })
        .map_or(FieldValue::Unavailable, FieldValue::Present)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::parsing::strategy::StrategySpec;
    use proptest::prelude::*;
    use rstest::rstest;
    use scraper::{Html, Selector};

    fn compile(specs: &[StrategySpec]) -> Vec<SelectorStrategy> {
        SelectorStrategy::compile_all(specs, "test").unwrap()
    }

    fn extract_from(fragment: &str, specs: &[StrategySpec]) -> FieldValue {
        let html = Html::parse_fragment(fragment);
        let item = Selector::parse(".item").unwrap();
        let node = html.select(&item).next().unwrap();
        extract(node, &compile(specs))
    }

    #[test]
    fn falls_back_to_later_strategy() {
        let value = extract_from(
            r#"<div class="item"><h2>Blue Shirt</h2></div>"#,
            &[StrategySpec::text(".title"), StrategySpec::text("h2")],
        );
        assert_eq!(value, FieldValue::Present("Blue Shirt".to_string()));
    }

    #[rstest]
    #[case::first_wins(r#"<div class="item"><span class="a">A</span><span class="b">B</span></div>"#, "A")]
    #[case::second_when_first_blank(r#"<div class="item"><span class="a"> </span><span class="b">B</span></div>"#, "B")]
    #[case::second_when_first_absent(r#"<div class="item"><span class="b">B</span></div>"#, "B")]
    fn order_decides(#[case] fragment: &str, #[case] expected: &str) {
        let value = extract_from(fragment, &[StrategySpec::text(".a"), StrategySpec::text(".b")]);
        assert_eq!(value.as_deref(), Some(expected));
    }

    #[test]
    fn all_miss_is_unavailable() {
        let value = extract_from(
            r#"<div class="item"><p>nothing here</p></div>"#,
            &[
                StrategySpec::text(".price"),
                StrategySpec::attr("img", "src"),
                StrategySpec::own_attr("data-price"),
            ],
        );
        assert_eq!(value, FieldValue::Unavailable);
    }

    #[test]
    fn printed_marker_falls_through() {
        let strategies = [StrategySpec::text(".price"), StrategySpec::own_attr("data-price")];
        let value = extract_from(
            r#"<div class="item" data-price="$14.50"><span class="price">N/A</span></div>"#,
            &strategies,
        );
        assert_eq!(value.as_deref(), Some("$14.50"));

        let value = extract_from(
            r#"<div class="item"><span class="price">n/a</span></div>"#,
            &strategies,
        );
        assert_eq!(value, FieldValue::Unavailable);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(serde_json::from_str::<FieldValue>(&json).unwrap(), value);
    }

    #[test]
    fn empty_strategy_list_is_unavailable() {
        assert_eq!(
            extract_from(r#"<div class="item">x</div>"#, &[]),
            FieldValue::Unavailable
        );
    }

    proptest! {
        #[test]
        fn first_successful_strategy_short_circuits(
            first in "[A-Za-z][A-Za-z0-9 ]{0,20}",
            rest in proptest::collection::vec("[A-Za-z][A-Za-z0-9]{0,10}", 0..4),
        ) {
            let mut body = format!(r#"<span class="s0">{first}</span>"#);
            let mut specs = vec![StrategySpec::text(".s0")];
            for (i, text) in rest.iter().enumerate() {
                body.push_str(&format!(r#"<span class="s{}">{}</span>"#, i + 1, text));
                specs.push(StrategySpec::text(&format!(".s{}", i + 1)));
            }
            let value = extract_from(&format!(r#"<div class="item">{body}</div>"#), &specs);
            let expected = first.split_whitespace().collect::<Vec<_>>().join(" ");
            prop_assert_eq!(value, FieldValue::Present(expected));
        }

        #[test]
        fn missing_selectors_never_produce_values(
            classes in proptest::collection::vec("[a-z]{3,8}", 1..6),
        ) {
            let specs: Vec<StrategySpec> = classes
                .iter()
                .map(|c| StrategySpec::text(&format!(".missing-{c}")))
                .collect();
            let value = extract_from(r#"<div class="item"><b>present</b></div>"#, &specs);
            prop_assert_eq!(value, FieldValue::Unavailable);
        }
    }
}
