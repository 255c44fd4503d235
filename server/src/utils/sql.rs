//! SQL utility functions

use regex::Regex;

/// Quote an identifier (table, column, index or constraint name)
///
/// Embedded double quotes are doubled, so any caller-supplied name is safe to
/// splice into DDL text.
///
/// # Example
///
/// ```
/// use metricstore_server::utils::sql::quote_ident;
///
/// assert_eq!(quote_ident("market_time_series"), "\"market_time_series\"");
/// assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
/// ```
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote and comma-join a list of identifiers: `"a", "b"`
pub fn quote_ident_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Match a name against a SQL LIKE pattern (`%` any run, `_` one character)
///
/// Used to recognise constraints that earlier migrations created under
/// generated or since-renamed names.
pub fn like_matches(pattern: &str, value: &str) -> bool {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    re.push_str(&regex::escape(&next.to_string()));
                }
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');

    match Regex::new(&re) {
        Ok(compiled) => compiled.is_match(value),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "Invalid LIKE pattern");
            false
        }
    }
}

/// Collapse whitespace and lowercase an SQL fragment for textual comparison
pub fn normalize_sql_fragment(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_plain() {
        assert_eq!(quote_ident("date"), "\"date\"");
    }

    #[test]
    fn test_quote_ident_embedded_quote() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_quote_literal_escapes_single_quote() {
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
    }

    #[test]
    fn test_quote_ident_list() {
        let cols = vec!["region_id".to_string(), "date".to_string()];
        assert_eq!(quote_ident_list(&cols), "\"region_id\", \"date\"");
    }

    #[test]
    fn test_like_matches_percent() {
        assert!(like_matches(
            "market_time_series_%_key",
            "market_time_series_region_id_date_metric_name_key"
        ));
        assert!(!like_matches("market_time_series_%_key", "market_time_series_pkey"));
    }

    #[test]
    fn test_like_matches_underscore_is_single_char() {
        assert!(like_matches("uq_mts_v_", "uq_mts_v2"));
        assert!(!like_matches("uq_mts_v_", "uq_mts_v10"));
    }

    #[test]
    fn test_like_matches_escaped_wildcard() {
        assert!(like_matches("100\\%", "100%"));
        assert!(!like_matches("100\\%", "1000"));
    }

    #[test]
    fn test_like_matches_regex_metacharacters_are_literal() {
        assert!(like_matches("a.b", "a.b"));
        assert!(!like_matches("a.b", "axb"));
    }

    #[test]
    fn test_normalize_sql_fragment() {
        assert_eq!(
            normalize_sql_fragment("  metric_value   >=\n 0 "),
            "metric_value >= 0"
        );
        assert_eq!(normalize_sql_fragment("X IS NOT NULL"), "x is not null");
    }
}
