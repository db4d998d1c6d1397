//! Candidate SQL clean-up
//!
//! Completions often wrap SQL in markdown fences. Only what remains after
//! removing them is checked and validated.
//!
//! Two gates: `screen_generated` turns away empty output, prose, and statements
//! that are recognisably not queries, leaving misspelled SELECTs to the store's
//! syntax check and repair. `normalize_candidate` requires the SELECT keyword
//! and is what stands in front of execution. Both accept a single statement.

use crate::error::WorkflowError;
use regex::Regex;
use std::sync::OnceLock;
use strsim::levenshtein;

/// Leading words this close to SELECT are treated as misspellings of it.
const SELECT_TYPO_DISTANCE: usize = 2;

fn opening_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```(?:[A-Za-z0-9_+-]*[ \t]*\r?\n|(?i:sql)\b)?").expect("valid fence pattern"))
}

fn closing_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\r?\n?[ \t]*```$").expect("valid fence pattern"))
}

fn select_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^select\b").expect("valid keyword pattern"))
}

/// Remove surrounding code-fence markers and whitespace.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let without_open = opening_fence().replace(trimmed, "");
    let without_close = closing_fence().replace(&without_open, "");
    without_close.trim().to_string()
}

/// Leading keywords of statements that are never read-only queries.
const NON_QUERY_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "REPLACE", "UPSERT", "MERGE", "DROP", "CREATE", "ALTER", "TRUNCATE",
    "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX", "ANALYZE", "BEGIN", "COMMIT", "ROLLBACK",
    "SAVEPOINT", "RELEASE", "GRANT", "REVOKE", "WITH", "EXPLAIN", "VALUES",
];

fn leading_word(sql: &str) -> &str {
    let sql = sql.trim_start();
    let end = sql
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(sql.len());
    &sql[..end]
}

/// True when the statement starts with the SELECT keyword.
pub fn is_select_shaped(sql: &str) -> bool {
    select_keyword().is_match(sql.trim_start())
}

/// Byte offset of the first `;` outside quotes and `--` comments.
fn statement_end(sql: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut chars = sql.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '[') => quote = Some(']'),
            (None, '-') if matches!(chars.peek(), Some((_, '-'))) => {
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            (None, ';') => return Some(i),
            _ => {}
        }
    }
    None
}

/// Reject text carrying more than one statement. A trailing `;` and
/// trailing line comments are fine.
fn single_statement(sql: String) -> Result<String, WorkflowError> {
    let trailing_statement = |rest: &str| {
        rest.lines()
            .map(str::trim)
            .any(|line| !line.is_empty() && !line.starts_with("--"))
    };
    match statement_end(&sql) {
        Some(end) if trailing_statement(&sql[end + 1..]) => Err(WorkflowError::InvalidGenerationOutput(format!(
            "expected a single statement: {}",
            sql
        ))),
        _ => Ok(sql),
    }
}

fn empty_response() -> WorkflowError {
    WorkflowError::InvalidGenerationOutput("the model returned an empty response".to_string())
}

/// SELECT itself or a near miss, followed by something a select list can start with.
fn looks_like_select(sql: &str) -> bool {
    let sql = sql.trim_start();
    let keyword = leading_word(sql);
    if keyword.is_empty() || levenshtein(&keyword.to_ascii_uppercase(), "SELECT") > SELECT_TYPO_DISTANCE {
        return false;
    }
    match sql[keyword.len()..].trim_start().chars().next() {
        Some(c) => c.is_alphanumeric() || matches!(c, '_' | '*' | '(' | '\'' | '"' | '`' | '[' | '-'),
        None => false,
    }
}

/// Strip fences from a first generation and reject empty output, prose,
/// non-query statements and multiple statements.
pub fn screen_generated(raw: &str) -> Result<String, WorkflowError> {
    let sql = strip_code_fences(raw);
    if sql.is_empty() {
        return Err(empty_response());
    }
    let keyword = leading_word(&sql);
    if NON_QUERY_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(keyword)) || !looks_like_select(&sql) {
        return Err(WorkflowError::InvalidGenerationOutput(sql));
    }
    single_statement(sql)
}

/// Strip fences and require a single SELECT statement.
pub fn normalize_candidate(raw: &str) -> Result<String, WorkflowError> {
    let sql = strip_code_fences(raw);
    if sql.is_empty() {
        return Err(empty_response());
    }
    if !is_select_shaped(&sql) {
        return Err(WorkflowError::InvalidGenerationOutput(sql));
    }
    single_statement(sql)
}
