use serde::{Deserialize, Serialize};

const FLAGS_MARKER: &[u8] = b"FLAGS (";

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Pulls the flag list out of a FETCH response line such as
/// `1 FETCH (FLAGS (\Seen \Answered) BODY[] {2048}`.
///
/// Returns `None` when the fragment carries no `FLAGS (` list at all, and an
/// empty list for `FLAGS ()`.
pub fn extract_flags(fragment: &[u8]) -> Option<Vec<String>> {
    let start = find(fragment, FLAGS_MARKER)? + FLAGS_MARKER.len();
    let len = fragment[start..].iter().position(|&b| b == b')')?;
    let list = String::from_utf8_lossy(&fragment[start..start + len]);

    let mut flags: Vec<String> = Vec::new();
    for token in list.split_whitespace() {
        if !flags.iter().any(|f| f == token) {
            flags.push(token.to_string());
        }
    }
    Some(flags)
}

/// The six system flags as booleans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    pub is_read: bool,
    pub is_answered: bool,
    pub is_flagged: bool,
    pub is_deleted: bool,
    pub is_draft: bool,
    pub is_recent: bool,
}

impl MessageFlags {
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        let has = |name: &str| tokens.iter().any(|t| t.as_ref().eq_ignore_ascii_case(name));
        MessageFlags {
            is_read: has("\\Seen"),
            is_answered: has("\\Answered"),
            is_flagged: has("\\Flagged"),
            is_deleted: has("\\Deleted"),
            is_draft: has("\\Draft"),
            is_recent: has("\\Recent"),
        }
    }
}
