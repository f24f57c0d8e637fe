//! Statement classification

use deskdb_core::Value;
use serde::{Deserialize, Serialize};

/// What a statement does, decided from its leading keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// `SELECT`, `WITH`, `VALUES`: returns rows, safe to cache
    Read,
    /// `PRAGMA`, `EXPLAIN`: returns rows but reflects engine state, never cached
    Introspection,
    /// Everything else: returns an affected-row count, never cached
    Write,
}

impl StatementKind {
    /// Classify a statement by its first keyword, skipping leading whitespace,
    /// comments and opening parentheses.
    pub fn classify(sql: &str) -> Self {
        let keyword: String = leading_keyword(sql).to_ascii_uppercase();
        match keyword.as_str() {
            "SELECT" | "WITH" | "VALUES" => StatementKind::Read,
            "PRAGMA" | "EXPLAIN" => StatementKind::Introspection,
            _ => StatementKind::Write,
        }
    }

    pub fn returns_rows(&self) -> bool {
        !matches!(self, StatementKind::Write)
    }

    pub fn is_cacheable(&self) -> bool {
        matches!(self, StatementKind::Read)
    }
}

fn leading_keyword(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(line_comment) = rest.strip_prefix("--") {
            rest = match line_comment.find('\n') {
                Some(end) => &line_comment[end + 1..],
                None => "",
            };
        } else if let Some(block_comment) = rest.strip_prefix("/*") {
            rest = match block_comment.find("*/") {
                Some(end) => &block_comment[end + 2..],
                None => "",
            };
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    &rest[..end]
}

/// One statement of a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn kind(&self) -> StatementKind {
        StatementKind::classify(&self.sql)
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Self::new(sql, Vec::new())
    }
}
