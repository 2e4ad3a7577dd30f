use std::borrow::Cow;

use charset::Charset;
use chrono::{DateTime, Utc};
use mailparse::{parse_mail, DispositionType, MailHeaderMap, ParsedMail};
use serde::{Deserialize, Serialize};

use crate::diagnostics::EventSink;
use crate::mail_reader::flags::MessageFlags;

/// One retrieved message, as handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub date: DateTime<Utc>,
    pub attachments: Vec<String>,
    pub flags: Vec<String>,
    #[serde(flatten)]
    pub status: MessageFlags,
}

impl EmailRecord {
    pub fn new(parsed: ParsedEmail, flags: Vec<String>) -> Self {
        let status = MessageFlags::from_tokens(&flags);
        EmailRecord {
            subject: parsed.subject,
            sender: parsed.sender,
            body: parsed.body,
            date: parsed.date,
            attachments: parsed.attachments,
            flags,
            status,
        }
    }
}

/// Fields decoded from the raw RFC 5322 bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEmail {
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub date: DateTime<Utc>,
    pub attachments: Vec<String>,
}

/// Decodes with the declared charset, or lossy UTF-8 if the label is unknown
/// or the bytes are not valid in that charset. ASCII labels decode as UTF-8.
pub fn decode_text(bytes: &[u8], charset: &str) -> String {
    let label = charset.trim();
    let label = if is_ascii_label(label) { "utf-8" } else { label };
    Charset::for_label(label.as_bytes())
        .and_then(|cs| {
            let (text, had_errors) = cs.decode_without_bom_handling(bytes);
            (!had_errors).then(|| Cow::into_owned(text))
        })
        .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned())
}

// WHATWG maps these to windows-1252, which garbles undeclared 8-bit UTF-8.
fn is_ascii_label(label: &str) -> bool {
    ["us-ascii", "ascii", "ansi_x3.4-1968"]
        .iter()
        .any(|ascii| label.eq_ignore_ascii_case(ascii))
}

// mailparse reports "us-ascii" when the part declares nothing.
fn declared_charset<'a>(part: &'a ParsedMail) -> &'a str {
    if part.ctype.params.contains_key("charset") {
        &part.ctype.charset
    } else {
        "utf-8"
    }
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

fn attachment_name(part: &ParsedMail) -> Option<String> {
    let disposition = part.get_content_disposition();
    disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

fn part_text(part: &ParsedMail, sink: &dyn EventSink) -> String {
    match part.get_body_raw() {
        Ok(raw) => decode_text(&raw, declared_charset(part)),
        Err(e) => {
            sink.warn(format_args!("Cannot decode {} part: {}", part.ctype.mimetype, e));
            String::new()
        }
    }
}

// Depth-first over every part, the root included.
fn walk_parts(part: &ParsedMail, body: &mut String, attachments: &mut Vec<String>, sink: &dyn EventSink) {
    let disposition = part.get_content_disposition().disposition;

    if matches!(disposition, DispositionType::Attachment) {
        if let Some(name) = attachment_name(part) {
            attachments.push(name);
        }
    } else if part.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
        body.push_str(&part_text(part, sink));
    }

    for subpart in &part.subparts {
        walk_parts(subpart, body, attachments, sink);
    }
}

fn header_or_empty(mail: &ParsedMail, name: &str) -> String {
    mail.headers.get_first_value(name).unwrap_or_default()
}

/// Decodes raw message bytes. Malformed input never fails: unparseable
/// dates become the current time, undecodable text is replaced lossily and
/// a message that cannot be parsed at all keeps its bytes as the body.
///
/// Only `text/plain` content reaches the body; HTML alternatives and
/// non-text parts without an `attachment` disposition are dropped.
pub fn parse_email(raw: &[u8], sink: &dyn EventSink) -> ParsedEmail {
    let mail = match parse_mail(raw) {
        Ok(mail) => mail,
        Err(e) => {
            sink.warn(format_args!("Unparseable message, keeping raw text: {}", e));
            return ParsedEmail {
                subject: String::new(),
                sender: String::new(),
                body: String::from_utf8_lossy(raw).into_owned(),
                date: Utc::now(),
                attachments: Vec::new(),
            };
        }
    };

    let subject = header_or_empty(&mail, "Subject");
    let sender = header_or_empty(&mail, "From");
    let date = match mail.headers.get_first_value("Date") {
        Some(header) => parse_date(&header).unwrap_or_else(|| {
            sink.debug(format_args!("Unparseable Date header {:?}, using now", header));
            Utc::now()
        }),
        None => {
            sink.debug(format_args!("No Date header, using now"));
            Utc::now()
        }
    };

    let mut body = String::new();
    let mut attachments = Vec::new();
    if mail.ctype.mimetype.to_ascii_lowercase().starts_with("multipart/") {
        walk_parts(&mail, &mut body, &mut attachments, sink);
    } else {
        body = part_text(&mail, sink);
    }

    ParsedEmail {
        subject,
        sender,
        body,
        date,
        attachments,
    }
}
