//! Fragment Hazard Checks
//!
//! The query builder splices caller text straight into SQL. This module
//! inspects each fragment before a statement is sent and reports anything
//! that looks like an attempt to escape the fragment's clause:
//!
//! - a statement terminator (`;`) outside a quoted literal or identifier
//! - a comment opener outside quotes (`--`, `/*`, and `#` on `MySQL`)
//! - a table name with characters an identifier does not use
//!
//! Quoting follows the target engine ([`QuoteRules`]): `'...'` literals
//! with `''` escapes everywhere, `"..."` identifiers on `PostgreSQL` and
//! `SQLite`, and on `MySQL` backslash escapes, `"..."` string literals and
//! `` `...` `` identifiers. `SQLite` also accepts backtick identifiers.
//!
//! Hazards are always logged. In strict mode they also fail the read before
//! a connection is opened.

use serde::Serialize;
use std::fmt;

use crate::engine::DatabaseType;
use crate::error::{ReaderError, Result};
use crate::query::SelectQuery;

/// Which part of the statement a hazard was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fragment {
    Table,
    Columns,
    Filter,
    OrderBy,
}

impl Fragment {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table name",
            Self::Columns => "column list",
            Self::Filter => "filter",
            Self::OrderBy => "order clause",
        }
    }
}

/// What was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    StatementTerminator,
    Comment,
    SuspiciousIdentifier,
}

/// A single finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Hazard {
    pub fragment: Fragment,
    pub kind: HazardKind,
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            HazardKind::StatementTerminator => "contains a statement terminator",
            HazardKind::Comment => "contains a comment opener",
            HazardKind::SuspiciousIdentifier => "is not a plain identifier",
        };
        write!(f, "{} {what}", self.fragment.as_str())
    }
}

/// How an engine quotes literals and identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteRules {
    /// Delimiters of string literals
    pub literal_quotes: &'static [char],
    /// Delimiters of quoted identifiers
    pub identifier_quotes: &'static [char],
    /// `\` escapes the next character inside a string literal
    pub backslash_escapes: bool,
    /// `#` starts a comment
    pub hash_comments: bool,
}

impl QuoteRules {
    #[must_use]
    pub const fn for_engine(engine: DatabaseType) -> Self {
        match engine {
            DatabaseType::Postgres => Self {
                literal_quotes: &['\''],
                identifier_quotes: &['"'],
                backslash_escapes: false,
                hash_comments: false,
            },
            DatabaseType::SQLite => Self {
                literal_quotes: &['\''],
                identifier_quotes: &['"', '`'],
                backslash_escapes: false,
                hash_comments: false,
            },
            DatabaseType::MySQL => Self {
                literal_quotes: &['\'', '"'],
                identifier_quotes: &['`'],
                backslash_escapes: true,
                hash_comments: true,
            },
        }
    }

    fn is_quote(&self, ch: char) -> bool {
        self.literal_quotes.contains(&ch) || self.identifier_quotes.contains(&ch)
    }
}

/// Inspect every fragment of a built query for `engine`
#[must_use]
pub fn assess(query: &SelectQuery, engine: DatabaseType) -> Vec<Hazard> {
    let rules = QuoteRules::for_engine(engine);
    let mut hazards = Vec::new();

    let fragments = [
        (Fragment::Table, Some(query.table_name())),
        (Fragment::Columns, Some(query.column_spec())),
        (Fragment::Filter, query.filter_text()),
        (Fragment::OrderBy, query.order_text()),
    ];

    for (fragment, text) in fragments {
        let Some(text) = text else { continue };
        let scan = scan_fragment(text, rules);
        if scan.terminator {
            hazards.push(Hazard { fragment, kind: HazardKind::StatementTerminator });
        }
        if scan.comment {
            hazards.push(Hazard { fragment, kind: HazardKind::Comment });
        }
    }

    if !is_plain_identifier(query.table_name(), rules) {
        hazards.push(Hazard { fragment: Fragment::Table, kind: HazardKind::SuspiciousIdentifier });
    }

    hazards
}

/// Log every hazard; in strict mode, turn the first one into a validation error
pub fn enforce(query: &SelectQuery, engine: DatabaseType, strict: bool) -> Result<()> {
    let hazards = assess(query, engine);

    for hazard in &hazards {
        tracing::warn!(
            fragment = hazard.fragment.as_str(),
            kind = ?hazard.kind,
            %engine,
            "unescaped SQL fragment {hazard}"
        );
    }

    match hazards.first() {
        Some(hazard) if strict => Err(ReaderError::invalid_input(format!(
            "Rejected unsafe query fragment: {hazard}"
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Default)]
struct Scan {
    terminator: bool,
    comment: bool,
}

/// Walk a fragment, ignoring anything inside quotes
///
/// A doubled quote closes and reopens, so `''` stays inside the literal.
fn scan_fragment(text: &str, rules: QuoteRules) -> Scan {
    let mut scan = Scan::default();
    let mut open: Option<char> = None;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if let Some(quote) = open {
            if ch == quote {
                open = None;
            } else if ch == '\\' && rules.backslash_escapes && rules.literal_quotes.contains(&quote)
            {
                chars.next();
            }
            continue;
        }

        match ch {
            c if rules.is_quote(c) => open = Some(c),
            ';' => scan.terminator = true,
            '-' if chars.peek() == Some(&'-') => scan.comment = true,
            '/' if chars.peek() == Some(&'*') => scan.comment = true,
            '#' if rules.hash_comments => scan.comment = true,
            _ => {}
        }
    }

    scan
}

/// Schema-qualified names, `$`/`#` and quoted identifiers are fine
fn is_plain_identifier(name: &str, rules: QuoteRules) -> bool {
    if name.trim().is_empty() {
        return false;
    }

    let mut open: Option<char> = None;
    for ch in name.chars() {
        match open {
            Some(quote) if ch == quote => open = None,
            Some(_) => {}
            None if rules.identifier_quotes.contains(&ch) => open = Some(ch),
            None if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '$') => {}
            None if ch == '#' && !rules.hash_comments => {}
            None => return false,
        }
    }

    open.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PG: DatabaseType = DatabaseType::Postgres;

    fn kinds_for(query: &SelectQuery, engine: DatabaseType) -> Vec<(Fragment, HazardKind)> {
        assess(query, engine).into_iter().map(|h| (h.fragment, h.kind)).collect()
    }

    fn kinds(query: &SelectQuery) -> Vec<(Fragment, HazardKind)> {
        kinds_for(query, PG)
    }

    #[test]
    fn test_clean_query_has_no_hazards() {
        let query = SelectQuery::new("SALES.CUSTOMERS")
            .columns("ID, NAME")
            .filter(Some("STATUS = 'ACTIVE' AND CREATED > '2024-01-01'"))
            .order_by(Some("NAME ASC"));
        assert!(assess(&query, PG).is_empty());
    }

    #[test]
    fn test_terminator_in_filter() {
        let query = SelectQuery::new("T").filter(Some("1=1; DROP TABLE T"));
        assert_eq!(kinds(&query), vec![(Fragment::Filter, HazardKind::StatementTerminator)]);
    }

    #[test]
    fn test_comment_in_order() {
        let query = SelectQuery::new("T").order_by(Some("ID -- trailing"));
        assert_eq!(kinds(&query), vec![(Fragment::OrderBy, HazardKind::Comment)]);

        let query = SelectQuery::new("T").order_by(Some("ID /* x */"));
        assert_eq!(kinds(&query), vec![(Fragment::OrderBy, HazardKind::Comment)]);
    }

    #[test]
    fn test_literals_are_ignored() {
        let query = SelectQuery::new("T").filter(Some("NOTE = 'a; b -- c /* d'"));
        assert!(assess(&query, PG).is_empty());

        let query = SelectQuery::new("T").filter(Some("NOTE = 'it''s; fine'"));
        assert!(assess(&query, PG).is_empty());
    }

    #[test]
    fn test_suspicious_table_name() {
        let query = SelectQuery::new("T WHERE 1=1");
        assert_eq!(kinds(&query), vec![(Fragment::Table, HazardKind::SuspiciousIdentifier)]);
    }

    #[test]
    fn test_quoted_identifier_allowed() {
        let query = SelectQuery::new("\"MY SCHEMA\".\"Order Lines\"");
        assert!(assess(&query, PG).is_empty());

        let query = SelectQuery::new("\"UNTERMINATED");
        assert!(!assess(&query, PG).is_empty());
    }

    #[test]
    fn test_enforce_lenient_only_warns() {
        let query = SelectQuery::new("T").filter(Some("1=1; DELETE FROM T"));
        assert!(enforce(&query, PG, false).is_ok());
    }

    #[test]
    fn test_enforce_strict_rejects() {
        let query = SelectQuery::new("T").filter(Some("1=1; DELETE FROM T"));
        let err = enforce(&query, PG, true).unwrap_err();
        assert!(matches!(err, ReaderError::InvalidInput(_)));
        assert!(err.message().contains("filter contains a statement terminator"));
    }

    #[test]
    fn test_mysql_backslash_escape_stays_in_literal() {
        let query = SelectQuery::new("T").filter(Some(r"NOTE = 'it\'s; x'"));
        assert!(kinds_for(&query, DatabaseType::MySQL).is_empty());

        let query = SelectQuery::new("T").filter(Some(r#"NOTE = "a \" -- b""#));
        assert!(kinds_for(&query, DatabaseType::MySQL).is_empty());

        // Without backslash escapes the literal closes early
        let query = SelectQuery::new("T").filter(Some(r"NOTE = 'it\'s; x'"));
        assert_eq!(kinds(&query), vec![(Fragment::Filter, HazardKind::StatementTerminator)]);
    }

    #[test]
    fn test_mysql_backtick_identifiers() {
        let query = SelectQuery::new("`shop`.`order lines`").order_by(Some("`line;no` DESC"));
        assert!(kinds_for(&query, DatabaseType::MySQL).is_empty());

        let query = SelectQuery::new("`order lines`");
        assert_eq!(kinds(&query), vec![(Fragment::Table, HazardKind::SuspiciousIdentifier)]);
    }

    #[test]
    fn test_mysql_hash_comment() {
        let query = SelectQuery::new("T").filter(Some("ID = 1 # rest"));
        assert_eq!(
            kinds_for(&query, DatabaseType::MySQL),
            vec![(Fragment::Filter, HazardKind::Comment)]
        );
        assert!(kinds(&query).is_empty());
    }

    #[test]
    fn test_sqlite_accepts_both_identifier_quotes() {
        let query = SelectQuery::new("\"Order Lines\"").columns("`unit price`, \"qty;\"");
        assert!(kinds_for(&query, DatabaseType::SQLite).is_empty());
    }
}
