use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Structured mailbox filter. Every field is optional; an empty filter matches
/// the whole mailbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub before: Option<NaiveDate>,
    pub since: Option<NaiveDate>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub text: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub is_unread: Option<bool>,
    pub is_flagged: Option<bool>,
}

/// One element of an IMAP SEARCH query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchToken {
    /// Keyword or date, sent verbatim.
    Atom(String),
    /// User supplied text, sent as a quoted string.
    Quoted(String),
}

impl SearchToken {
    pub fn atom(value: impl Into<String>) -> Self {
        SearchToken::Atom(value.into())
    }

    pub fn quoted(value: impl Into<String>) -> Self {
        SearchToken::Quoted(value.into())
    }
}

impl fmt::Display for SearchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchToken::Atom(atom) => f.write_str(atom),
            SearchToken::Quoted(text) => {
                f.write_str("\"")?;
                for c in text.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                f.write_str("\"")
            }
        }
    }
}

// IMAP dates look like 05-JAN-2024
fn imap_date(date: &NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string().to_uppercase()
}

fn push_text(tokens: &mut Vec<SearchToken>, key: &str, value: &Option<String>) {
    if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
        tokens.push(SearchToken::atom(key));
        tokens.push(SearchToken::quoted(value));
    }
}

fn push_flag(tokens: &mut Vec<SearchToken>, wanted: Option<bool>, set: &str, unset: &str) {
    match wanted {
        Some(true) => tokens.push(SearchToken::atom(set)),
        Some(false) => tokens.push(SearchToken::atom(unset)),
        None => {}
    }
}

/// Translates a filter into UID SEARCH tokens.
pub fn build_search_criteria(filter: &SearchFilter) -> Vec<SearchToken> {
    let mut tokens = Vec::new();

    if let Some(before) = &filter.before {
        tokens.push(SearchToken::atom("BEFORE"));
        tokens.push(SearchToken::atom(imap_date(before)));
    }
    if let Some(since) = &filter.since {
        tokens.push(SearchToken::atom("SINCE"));
        tokens.push(SearchToken::atom(imap_date(since)));
    }
    push_text(&mut tokens, "SUBJECT", &filter.subject);
    push_text(&mut tokens, "BODY", &filter.body);
    push_text(&mut tokens, "TEXT", &filter.text);
    push_text(&mut tokens, "FROM", &filter.from_address);
    push_text(&mut tokens, "TO", &filter.to_address);

    push_flag(&mut tokens, filter.is_unread, "UNSEEN", "SEEN");
    push_flag(&mut tokens, filter.is_flagged, "FLAGGED", "UNFLAGGED");

    if tokens.is_empty() {
        tokens.push(SearchToken::atom("ALL"));
    }
    tokens
}

/// Joins tokens into the query string sent after `UID SEARCH`.
pub fn render_query(tokens: &[SearchToken]) -> String {
    tokens
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
