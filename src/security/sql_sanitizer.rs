//! Extracts one executable statement from free-form model output.
//!
//! This is a boundary heuristic, not a parser. It never judges whether the statement is
//! meaningful, only where it starts and ends. Output always ends in exactly one `;`.

use regex::Regex;
use std::sync::LazyLock;

/// Substituted when no statement can be isolated; valid SQL that returns nothing.
pub const EMPTY_RESULT_SQL: &str = "SELECT NULL AS result WHERE 1=0;";

const STATEMENT_KEYWORDS: [&str; 8] = [
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP",
];

const CLAUSE_MARKERS: [&str; 7] = [
    "LIMIT",
    "ORDER BY",
    "GROUP BY",
    "HAVING",
    "UNION",
    "EXCEPT",
    "INTERSECT",
];

const COMMENT_PREFIXES: [&str; 5] = ["--", "/*", "//", "#", "-"];

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

// Word-bounded so `Selected` in prose and `SELECT(` subqueries are handled.
static SELECT_STATEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bSELECT\b.*?;").expect("valid regex"));

static ENGLISH_DISCOURSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(however|note that|this query|here is|here's|explanation|but)\b")
        .expect("valid regex")
});

const CJK_DISCOURSE: [&str; 5] = ["但是", "这里", "问题", "注意", "解释"];

/// Runs the full extraction. See the module docs for the contract.
pub fn sanitize(raw: &str) -> String {
    let unfenced = strip_code_fences(raw);

    let Some(start) = find_statement_start(unfenced) else {
        return EMPTY_RESULT_SQL.to_string();
    };
    let candidate = cut_statement_end(&unfenced[start..]);

    // Terminated before the SELECT extraction so a second pass sees the same `;`.
    let mut statement = terminate(&filter_lines(candidate));

    // Only statements that open with SELECT; `WITH` and `INSERT ... SELECT` stay whole.
    if statement.to_ascii_uppercase().starts_with("SELECT") {
        if let Some(m) = SELECT_STATEMENT.find(&statement) {
            statement = m.as_str().to_string();
        }
    }

    if has_discourse_markers(&statement) {
        if let Some(last) = statement.rfind(';') {
            statement.truncate(last + 1);
        }
    }

    terminate(&statement)
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let lowered = trimmed.get(..6).map(|p| p.to_ascii_lowercase());
    let trimmed = if lowered.as_deref() == Some("```sql") {
        &trimmed[6..]
    } else {
        trimmed.strip_prefix("```").unwrap_or(trimmed)
    };
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Byte offset of the earliest statement keyword, matched case-insensitively.
fn find_statement_start(text: &str) -> Option<usize> {
    let upper = text.to_ascii_uppercase();
    STATEMENT_KEYWORDS
        .iter()
        .filter_map(|keyword| upper.find(keyword))
        .min()
}

/// Cuts at the earliest `;` or clause keyword. After a clause keyword the statement runs to the
/// next `;`, or ends right after the keyword when none follows.
fn cut_statement_end(text: &str) -> &str {
    let upper = text.to_ascii_uppercase();

    let semicolon = upper.find(';').map(|pos| (pos, 1, true));
    let clause = CLAUSE_MARKERS
        .iter()
        .filter_map(|marker| upper.find(marker).map(|pos| (pos, marker.len(), false)))
        .min_by_key(|(pos, _, _)| *pos);

    let earliest = match (semicolon, clause) {
        (Some(s), Some(c)) => Some(if s.0 <= c.0 { s } else { c }),
        (s, c) => s.or(c),
    };

    match earliest {
        None => text,
        Some((pos, len, true)) => &text[..pos + len],
        Some((pos, len, false)) => {
            let after = pos + len;
            match text[after..].find(';') {
                Some(rel) => &text[..after + rel + 1],
                None => &text[..after],
            }
        }
    }
}

/// Drops comment and bullet lines, then joins the rest on single spaces.
fn filter_lines(text: &str) -> String {
    let kept: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !COMMENT_PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect();
    WHITESPACE
        .replace_all(&kept.join(" "), " ")
        .trim()
        .to_string()
}

fn has_discourse_markers(text: &str) -> bool {
    ENGLISH_DISCOURSE.is_match(text) || CJK_DISCOURSE.iter().any(|m| text.contains(m))
}

fn terminate(statement: &str) -> String {
    let body = statement.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if body.is_empty() {
        return EMPTY_RESULT_SQL.to_string();
    }
    format!("{body};")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ends_with_one_semicolon(s: &str) -> bool {
        s.ends_with(';') && !s.ends_with(";;")
    }

    #[test]
    fn test_plain_statement_passes_through() {
        assert_eq!(
            sanitize("SELECT product_id, quantity FROM inventory;"),
            "SELECT product_id, quantity FROM inventory;"
        );
    }

    #[test]
    fn test_strips_code_fences_and_prose() {
        let raw = "```sql\nSELECT * FROM doctors WHERE department = 'Cardiology';\n```";
        assert_eq!(
            sanitize(raw),
            "SELECT * FROM doctors WHERE department = 'Cardiology';"
        );

        let raw = "Sure! Here is the query you asked for:\n\nSELECT doctor_name FROM doctors;\n\nThis lists every doctor.";
        assert_eq!(sanitize(raw), "SELECT doctor_name FROM doctors;");
    }

    #[test]
    fn test_no_statement_falls_back_to_empty_query() {
        assert_eq!(sanitize(""), EMPTY_RESULT_SQL);
        assert_eq!(sanitize("I cannot answer that."), EMPTY_RESULT_SQL);
        assert_eq!(sanitize("```\n```"), EMPTY_RESULT_SQL);
    }

    #[test]
    fn test_first_of_multiple_statements() {
        assert_eq!(
            sanitize("SELECT 1 FROM doctors; SELECT 2 FROM patients;"),
            "SELECT 1 FROM doctors;"
        );
    }

    #[test]
    fn test_clause_keyword_runs_to_next_semicolon() {
        let raw = "SELECT p.product_name, i.quantity\nFROM products p JOIN inventory i ON p.product_id = i.product_id\nORDER BY i.quantity DESC\nLIMIT 10;\nThat returns the top ten.";
        assert_eq!(
            sanitize(raw),
            "SELECT p.product_name, i.quantity FROM products p JOIN inventory i ON p.product_id = i.product_id ORDER BY i.quantity DESC LIMIT 10;"
        );
    }

    #[test]
    fn test_clause_keyword_without_semicolon_cuts_after_keyword() {
        assert_eq!(
            sanitize("SELECT * FROM products ORDER BY price"),
            "SELECT * FROM products ORDER BY;"
        );
    }

    #[test]
    fn test_comment_and_bullet_lines_are_dropped() {
        let raw = "-- all stock\nSELECT quantity\n# note\n- bullet\nFROM inventory;";
        assert_eq!(sanitize(raw), "SELECT quantity FROM inventory;");
    }

    #[test]
    fn test_appends_missing_terminator() {
        assert_eq!(sanitize("select * from doctors"), "select * from doctors;");
        assert_eq!(sanitize("SELECT 1 ; ;"), "SELECT 1;");
    }

    #[test]
    fn test_non_select_statements_are_kept_whole() {
        assert_eq!(
            sanitize("WITH s AS (SELECT product_id FROM inventory) SELECT * FROM s"),
            "WITH s AS (SELECT product_id FROM inventory) SELECT * FROM s;"
        );
        assert_eq!(
            sanitize("UPDATE inventory SET quantity = 0 WHERE product_id = 'P1'"),
            "UPDATE inventory SET quantity = 0 WHERE product_id = 'P1';"
        );
    }

    #[test]
    fn test_discourse_truncates_to_last_semicolon() {
        let raw = "SELECT * FROM doctors; 但是这里需要注意";
        assert_eq!(sanitize(raw), "SELECT * FROM doctors;");
    }

    #[test]
    fn test_prose_before_select_is_dropped() {
        assert_eq!(
            sanitize("Selected query: SELECT * FROM doctors"),
            "SELECT * FROM doctors;"
        );
        assert_eq!(
            sanitize("selection below\nselect doctor_name from doctors"),
            "select doctor_name from doctors;"
        );
    }

    #[test]
    fn test_subquery_without_space_is_kept_whole() {
        assert_eq!(
            sanitize("SELECT(SELECT COUNT(*) FROM doctors) AS n"),
            "SELECT(SELECT COUNT(*) FROM doctors) AS n;"
        );
    }

    #[test]
    fn test_generated_inputs_are_idempotent_and_total() {
        let tokens = [
            "SELECT", "select", "Selected", "SELECTselect", "WITH", "delete", "(", ")", ";", "*",
            "FROM t", "ORDER BY", "LIMIT", "here is", "但是", "--", "#", "- ", "```", "```sql",
            "'", "x",
        ];
        let separators = [" ", "", "\n"];
        let mut checked = 0;
        for a in tokens {
            for b in tokens {
                for c in tokens {
                    for sep in separators {
                        let input = [a, b, c].join(sep);
                        let once = sanitize(&input);
                        assert!(ends_with_one_semicolon(&once), "bad terminator {once:?} for {input:?}");
                        assert_eq!(sanitize(&once), once, "not idempotent for {input:?}");
                        checked += 1;
                    }
                }
            }
        }
        assert_eq!(checked, tokens.len().pow(3) * separators.len());
    }

    #[test]
    fn test_idempotent_and_total() {
        let inputs = [
            "",
            "   ",
            "just words",
            ";",
            ";;;",
            "```sql\nSELECT 1;\n```",
            "SELECT * FROM products ORDER BY price",
            "SELECT a FROM t ORDER\nBY x",
            "WITH x AS (SELECT 1) SELECT * FROM x",
            "INSERT INTO t SELECT * FROM s",
            "select 1; select 2;",
            "Here is the query: SELECT * FROM doctors; however it may be slow",
            "SELECT name -- trailing\nFROM doctors",
            "delete from shipments",
            "查询所有商品的库存数量",
            "SELECT 'a;b' FROM t",
            "Die Abfrage: SELECT ß FROM straße;",
            "Selected query: SELECT * FROM doctors",
            "SELECT(SELECT COUNT(*) FROM doctors) AS n",
            "SELECTselect here is",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert!(!once.is_empty(), "empty output for {input:?}");
            assert!(ends_with_one_semicolon(&once), "bad terminator {once:?}");
            assert_eq!(sanitize(&once), once, "not idempotent for {input:?}");
        }
    }
}
