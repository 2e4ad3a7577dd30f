use crate::diagnostics::EventSink;
use crate::error::{MailError, Result};
use crate::mail_reader::flags::extract_flags;
use crate::mail_reader::session::MailboxClient;
use crate::mail_reader::Uid;

/// Request encodings, tried in order. Servers disagree on which of these they
/// accept; the PEEK forms come first so a fetch never marks mail as read
/// unless nothing else works.
pub const FETCH_ENCODINGS: [&str; 4] = [
    "(BODY.PEEK[] FLAGS)",
    "BODY.PEEK[] FLAGS",
    "(BODY[] FLAGS)",
    "(RFC822 FLAGS)",
];

/// Anything shorter is protocol chatter, not a message.
pub const MIN_CONTENT_LEN: usize = 100;

/// What a single response fragment turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFragment<'a> {
    MetadataOnly,
    Flags(Vec<String>),
    Content(&'a [u8]),
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn has_header_markers(fragment: &[u8]) -> bool {
    contains(fragment, b"From:") || contains(fragment, b"Subject:")
}

pub fn classify_fragment(fragment: &[u8]) -> FetchFragment<'_> {
    let protocol_line = contains(fragment, b"FETCH") && !has_header_markers(fragment);
    if !protocol_line && fragment.len() > MIN_CONTENT_LEN {
        return FetchFragment::Content(fragment);
    }
    match extract_flags(fragment) {
        Some(flags) => FetchFragment::Flags(flags),
        None => FetchFragment::MetadataOnly,
    }
}

/// Raw bytes and flags of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    pub raw: Vec<u8>,
    pub flags: Vec<String>,
}

fn merge_flags(into: &mut Vec<String>, flags: Vec<String>) {
    for flag in flags {
        if !into.contains(&flag) {
            into.push(flag);
        }
    }
}

/// Picks the message content and flags out of one fetch response. `None`
/// when no fragment carries content, even if flags were present.
pub fn extract_message(fragments: &[Vec<u8>]) -> Option<FetchedMessage> {
    let mut raw: Option<&[u8]> = None;
    let mut flags = Vec::new();

    for fragment in fragments {
        match classify_fragment(fragment) {
            FetchFragment::Content(content) => {
                if raw.is_none() {
                    raw = Some(content);
                }
            }
            FetchFragment::Flags(found) => merge_flags(&mut flags, found),
            FetchFragment::MetadataOnly => {}
        }
    }

    raw.map(|raw| FetchedMessage {
        raw: raw.to_vec(),
        flags,
    })
}

/// Fetches one message, walking [`FETCH_ENCODINGS`] until a response carries
/// content.
pub async fn fetch_message(client: &mut dyn MailboxClient, uid: Uid, sink: &dyn EventSink) -> Result<FetchedMessage> {
    for encoding in FETCH_ENCODINGS {
        let fragments = match client.fetch(uid, encoding).await {
            Ok(fragments) => fragments,
            Err(e) => {
                sink.debug(format_args!("Fetch format {} failed: {}", encoding, e));
                continue;
            }
        };

        sink.debug(format_args!("IMAP response for UID {}: {} items", uid, fragments.len()));
        if let Some(message) = extract_message(&fragments) {
            sink.debug(format_args!("Parsed flags from IMAP: {:?}", message.flags));
            return Ok(message);
        }
    }

    Err(MailError::Fetch {
        uid,
        reason: "no fetch format returned message content".to_string(),
    })
}
