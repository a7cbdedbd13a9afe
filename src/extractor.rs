//! Table extractor (component E): a deliberately conservative regex-level
//! extractor of `FROM`/`JOIN` table names, grounded in the `extract_tables_
//! from_sql` pattern seen in query-cache implementations across the pack
//! (e.g. rustpress's `query_cache.rs`), extended to unwrap one schema
//! prefix and one level of bracket/quote quoting per the specification.

use crate::model::Tag;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static FROM_JOIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:FROM|JOIN)\s+([\[\]"'.\w]+)"#).expect("static regex is valid")
});

/// Strip one optional schema prefix (`schema.table`) and one level of
/// bracket/double-quote quoting, yielding the bare table name.
/// `[dbo].[Orders]`, `"Products"`, and `Products AS p` (regex already
/// stops before `AS`) all yield their bare name.
fn unwrap_identifier(raw: &str) -> Option<String> {
    // Take the last dot-separated segment to unwrap one schema prefix,
    // e.g. "[dbo].[Orders]" -> "[Orders]", "public.products" -> "products".
    let last_segment = raw.rsplit('.').next().unwrap_or(raw);
    let trimmed = last_segment.trim_matches(|c| c == '[' || c == ']' || c == '"' || c == '\'');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Extract the case-insensitive set of table names referenced by `FROM`
/// or `JOIN` clauses. A missed name causes staleness bugs; a spurious
/// extra name only causes unnecessary invalidation — so this stays
/// conservative on purpose rather than parsing full SQL grammar.
pub fn extract_tables(sql: &str) -> BTreeSet<Tag> {
    let mut tables = BTreeSet::new();
    for cap in FROM_JOIN_RE.captures_iter(sql) {
        if let Some(m) = cap.get(1) {
            if let Some(name) = unwrap_identifier(m.as_str()) {
                tables.insert(Tag::new(name));
            }
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_simple_from_clause() {
        let tables = extract_tables("SELECT * FROM Products");
        assert_eq!(tables, BTreeSet::from([Tag::new("products")]));
    }

    #[test]
    fn extracts_join_clauses() {
        let tables = extract_tables(
            "SELECT * FROM Orders o JOIN Customers c ON o.customer_id = c.id",
        );
        assert_eq!(
            tables,
            BTreeSet::from([Tag::new("orders"), Tag::new("customers")])
        );
    }

    #[test]
    fn unwraps_schema_prefix_and_brackets() {
        let tables = extract_tables("SELECT * FROM [dbo].[Orders]");
        assert_eq!(tables, BTreeSet::from([Tag::new("orders")]));
    }

    #[test]
    fn unwraps_double_quotes() {
        let tables = extract_tables(r#"SELECT * FROM "Products""#);
        assert_eq!(tables, BTreeSet::from([Tag::new("products")]));
    }

    #[test]
    fn table_alias_does_not_pollute_tag() {
        let tables = extract_tables("SELECT * FROM Products AS p");
        assert_eq!(tables, BTreeSet::from([Tag::new("products")]));
    }

    #[test]
    fn extraction_is_case_insensitive_in_tag_comparison() {
        let tables = extract_tables("select * from PRODUCTS");
        assert!(tables.contains(&Tag::new("products")));
    }

    #[test]
    fn no_tables_for_non_select_text() {
        let tables = extract_tables("this is not sql");
        assert!(tables.is_empty());
    }
}
