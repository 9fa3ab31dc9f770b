//! Heuristic extraction of table and column references from SQL text.
//!
//! This is a cheap signal source for schema learning, not a SQL front end.
//! Table names are taken from the first identifier after `FROM` and `JOIN`;
//! column names only from qualified `table.column` occurrences in the SELECT
//! list, JOIN conditions and WHERE clause. Simple aliases declared right after
//! a table name are resolved. Malformed SQL never fails: the worst case is an
//! empty result.

use regex::Regex;
use std::sync::OnceLock;

/// Identifier: bare, double-quoted, backquoted or bracketed.
const IDENT: &str = r#"(?:"[^"]+"|`[^`]+`|\[[^\]]+\]|[A-Za-z_][A-Za-z0-9_$]*)"#;

/// Words that can follow a table name but are never aliases or table names.
const RESERVED: &[&str] = &[
    "as", "on", "using", "where", "join", "inner", "left", "right", "full", "outer", "cross",
    "natural", "group", "order", "limit", "offset", "having", "union", "intersect", "except",
    "window", "select", "lateral", "set", "values", "with", "fetch", "for", "into", "when",
    "then", "else", "end", "and", "or", "not", "returning",
];

/// One referenced table and the columns referenced on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReference {
    /// Table name as first recognized
    pub name: String,
    /// Column names in order of first appearance
    pub columns: Vec<String>,
}

/// Tables and qualified columns referenced by one SQL statement.
///
/// Names are matched case-insensitively but stored as first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableReferences {
    entries: Vec<TableReference>,
    aliases: Vec<(String, String)>,
}

impl TableReferences {
    /// Creates an empty reference set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a table, returning its index.
    pub fn add_table(&mut self, name: &str) -> usize {
        if let Some(index) = self.position(name) {
            return index;
        }
        self.entries.push(TableReference {
            name: name.to_string(),
            columns: Vec::new(),
        });
        self.entries.len().saturating_sub(1)
    }

    /// Records a column on a table, adding the table if needed.
    pub fn add_column(&mut self, table: &str, column: &str) {
        let index = self.add_table(table);
        if let Some(entry) = self.entries.get_mut(index)
            && !entry
                .columns
                .iter()
                .any(|c| c.eq_ignore_ascii_case(column))
        {
            entry.columns.push(column.to_string());
        }
    }

    /// Records `alias` as another name for `table`.
    pub fn add_alias(&mut self, alias: &str, table: &str) {
        if self.alias_target(alias).is_none() {
            self.aliases.push((alias.to_string(), table.to_string()));
        }
    }

    /// Returns true if the statement declared any table alias.
    pub fn has_aliases(&self) -> bool {
        !self.aliases.is_empty()
    }

    /// Resolves a column qualifier to a referenced table name.
    ///
    /// Aliases win over table names. Returns `None` when the qualifier names
    /// neither an alias nor a referenced table.
    pub fn resolve(&self, qualifier: &str) -> Option<&str> {
        if let Some(table) = self.alias_target(qualifier) {
            return Some(table);
        }
        self.position(qualifier)
            .and_then(|i| self.entries.get(i))
            .map(|e| e.name.as_str())
    }

    fn alias_target(&self, alias: &str) -> Option<&str> {
        self.aliases
            .iter()
            .find(|(a, _)| a.eq_ignore_ascii_case(alias))
            .map(|(_, table)| table.as_str())
    }

    /// Looks up a table reference by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&TableReference> {
        self.position(name).and_then(|i| self.entries.get(i))
    }

    /// Returns true if the table was referenced.
    pub fn contains_table(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Iterates over referenced tables in order of first appearance.
    pub fn iter(&self) -> impl Iterator<Item = &TableReference> {
        self.entries.iter()
    }

    /// Names of all referenced tables.
    pub fn table_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Number of referenced tables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was referenced.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
    }
}

impl IntoIterator for TableReferences {
    type Item = TableReference;
    type IntoIter = std::vec::IntoIter<TableReference>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Pre-compiled patterns, built once per process.
struct Patterns {
    block_comment: Regex,
    line_comment: Regex,
    string_literal: Regex,
    whitespace: Regex,
    table_clause: Regex,
    alias: Regex,
    ident: Regex,
    qualified: Regex,
    select_list: Regex,
    on_clause: Regex,
    where_clause: Regex,
    boolean_split: Regex,
}

impl Patterns {
    fn instance() -> Option<&'static Self> {
        static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
        PATTERNS
            .get_or_init(|| match Self::compile() {
                Ok(patterns) => Some(patterns),
                Err(e) => {
                    tracing::warn!("SQL reference patterns failed to compile: {}", e);
                    None
                }
            })
            .as_ref()
    }

    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            block_comment: Regex::new(r"(?s)/\*.*?\*/")?,
            line_comment: Regex::new(r"--[^\n]*")?,
            string_literal: Regex::new(r"'(?:[^']|'')*'")?,
            whitespace: Regex::new(r"\s+")?,
            table_clause: Regex::new(&format!(
                r"(?i)\b(?:from|join)\s+({IDENT}(?:\s*\.\s*{IDENT})*)"
            ))?,
            alias: Regex::new(&format!(r"(?i)^\s+(?:as\s+)?({IDENT})"))?,
            ident: Regex::new(IDENT)?,
            qualified: Regex::new(&format!(r"{IDENT}(?:\.{IDENT})+"))?,
            select_list: Regex::new(r"(?is)\bselect\s+(?:distinct\s+)?(.*?)\s+from\b")?,
            on_clause: Regex::new(
                r"(?is)\bon\s+(.*?)(?:\s+(?:inner|left|right|full|cross|natural|join|where|group|order|limit|having|union)\b|$)",
            )?,
            where_clause: Regex::new(
                r"(?is)\bwhere\s+(.*?)(?:\s+(?:group\s+by|order\s+by|limit|having|union|window)\b|$)",
            )?,
            boolean_split: Regex::new(r"(?i)\s+(?:and|or)\s+")?,
        })
    }
}

/// Removes surrounding identifier quotes.
fn unquote(ident: &str) -> &str {
    let trimmed = ident.trim();
    let quoted = (trimmed.starts_with('"') && trimmed.ends_with('"'))
        || (trimmed.starts_with('`') && trimmed.ends_with('`'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if quoted && trimmed.len() >= 2 {
        trimmed.get(1..trimmed.len().saturating_sub(1)).unwrap_or(trimmed)
    } else {
        trimmed
    }
}

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

/// Splits `table.column` (or `schema.table.column`) into its last two parts.
///
/// Returns `None` for unqualified names.
pub fn parse_qualified_name(name: &str) -> Option<(String, String)> {
    let patterns = Patterns::instance()?;
    let parts: Vec<&str> = patterns
        .ident
        .find_iter(name)
        .map(|m| unquote(m.as_str()))
        .collect();
    if parts.len() < 2 || !name.contains('.') {
        return None;
    }
    let column = parts.last()?;
    let table = parts.get(parts.len().saturating_sub(2))?;
    Some(((*table).to_string(), (*column).to_string()))
}

/// Keywords that may directly precede a parenthesized subquery or join group.
const GROUPING_KEYWORDS: &[&str] = &[
    "in", "exists", "any", "all", "some", "from", "join", "lateral", "as", "on", "using", "and",
    "or", "not", "where", "select", "union", "intersect", "except", "with",
];

/// Returns true if byte offset `at` sits inside the argument list of a
/// function call, as in `EXTRACT(YEAR FROM created_at)`.
fn in_function_call(sql: &str, at: usize) -> bool {
    let Some(before) = sql.get(..at) else {
        return false;
    };
    let mut open: Vec<usize> = Vec::new();
    for (index, c) in before.char_indices() {
        match c {
            '(' => open.push(index),
            ')' => {
                open.pop();
            }
            _ => {}
        }
    }
    let Some(&paren) = open.last() else {
        return false;
    };

    let inner = before.get(paren.saturating_add(1)..).unwrap_or_default().trim_start();
    let starts_query = ["select", "with"].iter().any(|k| {
        inner
            .get(..k.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(k))
    });
    if starts_query {
        return false;
    }

    let prefix = before.get(..paren).unwrap_or_default().trim_end();
    let word_start = prefix
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
        .last()
        .map(|(i, _)| i);
    let Some(word) = word_start.and_then(|i| prefix.get(i..)) else {
        return false;
    };
    !GROUPING_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// Normalizes SQL for matching: strips comments, blanks string literals and
/// collapses whitespace.
fn normalize(patterns: &Patterns, sql: &str) -> String {
    let without_blocks = patterns.block_comment.replace_all(sql, " ");
    let without_lines = patterns.line_comment.replace_all(&without_blocks, " ");
    let without_strings = patterns.string_literal.replace_all(&without_lines, "''");
    patterns
        .whitespace
        .replace_all(&without_strings, " ")
        .trim()
        .to_string()
}

/// Extracts referenced tables and qualified columns from a SQL string.
///
/// # Example
/// ```rust
/// use schemalens_core::references::extract_references;
///
/// let refs = extract_references("SELECT users.email FROM users WHERE users.id = 1");
/// let users = refs.get("users").expect("users referenced");
/// assert_eq!(users.columns, vec!["email", "id"]);
/// ```
pub fn extract_references(sql: &str) -> TableReferences {
    let mut references = TableReferences::new();
    if sql.trim().is_empty() {
        return references;
    }
    let Some(patterns) = Patterns::instance() else {
        return references;
    };

    let cleaned = normalize(patterns, sql);

    for caps in patterns.table_clause.captures_iter(&cleaned) {
        let (Some(clause), Some(token)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if in_function_call(&cleaned, clause.start()) {
            continue;
        }
        let Some(last) = patterns.ident.find_iter(token.as_str()).last() else {
            continue;
        };
        let table = unquote(last.as_str());
        if table.is_empty() || is_reserved(table) {
            continue;
        }
        references.add_table(table);

        let rest = cleaned.get(token.end()..).unwrap_or_default();
        if let Some(alias) = patterns
            .alias
            .captures(rest)
            .and_then(|c| c.get(1))
            .map(|m| unquote(m.as_str()))
            && !is_reserved(alias)
            && !alias.eq_ignore_ascii_case(table)
        {
            references.add_alias(alias, table);
        }
    }

    let clauses = [
        &patterns.select_list,
        &patterns.on_clause,
        &patterns.where_clause,
    ];
    for clause in clauses {
        for caps in clause.captures_iter(&cleaned) {
            let Some(body) = caps.get(1) else { continue };
            for condition in patterns.boolean_split.split(body.as_str()) {
                for qualified in patterns.qualified.find_iter(condition) {
                    let Some((qualifier, column)) = parse_qualified_name(qualified.as_str())
                    else {
                        continue;
                    };
                    let table = references
                        .resolve(&qualifier)
                        .map(str::to_string)
                        .unwrap_or(qualifier);
                    references.add_column(&table, &column);
                }
            }
        }
    }

    tracing::trace!(
        tables = references.len(),
        "Extracted SQL references"
    );
    references
}
