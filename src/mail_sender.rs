use std::sync::Arc;

use lettre::address::{Address, Envelope};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::Message;
use serde::{Deserialize, Serialize};

use crate::diagnostics::EventSink;
use crate::error::{MailError, Result};

pub mod smtp;

use smtp::SubmissionConnector;

/// What the caller wants sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
}

fn parse_mailbox(value: &str) -> Result<Mailbox> {
    value
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| MailError::Delivery(format!("invalid address {:?}: {}", value, e)))
}

fn parse_mailboxes(values: &[String]) -> Result<Vec<Mailbox>> {
    values.iter().map(|value| parse_mailbox(value)).collect()
}

/// Builds the plain-text message and its SMTP envelope.
///
/// To and Cc appear as headers. Bcc addresses are only added to the envelope,
/// so no recipient, Bcc or otherwise, can see them.
pub fn compose(sender: &Mailbox, email: &OutgoingEmail) -> Result<(Message, Envelope)> {
    let to = parse_mailboxes(&email.recipients)?;
    let cc = parse_mailboxes(&email.cc)?;
    let bcc = parse_mailboxes(&email.bcc)?;

    let delivery: Vec<Address> = to
        .iter()
        .chain(&cc)
        .chain(&bcc)
        .map(|mailbox| mailbox.email.clone())
        .collect();
    let envelope = Envelope::new(Some(sender.email.clone()), delivery)
        .map_err(|e| MailError::Delivery(format!("no usable recipients: {}", e)))?;

    let mut builder = Message::builder()
        .from(sender.clone())
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .envelope(envelope.clone());
    for mailbox in to {
        builder = builder.to(mailbox);
    }
    for mailbox in cc {
        builder = builder.cc(mailbox);
    }

    let message = builder
        .body(email.body.clone())
        .map_err(|e| MailError::Delivery(format!("cannot build message: {}", e)))?;
    Ok((message, envelope))
}

/// Write side: composes and submits outgoing mail.
#[derive(Clone)]
pub struct EmailSender {
    connector: Arc<dyn SubmissionConnector>,
    sender: Mailbox,
    sink: Arc<dyn EventSink>,
}

impl EmailSender {
    pub fn new(connector: Arc<dyn SubmissionConnector>, sender: Mailbox, sink: Arc<dyn EventSink>) -> Self {
        EmailSender {
            connector,
            sender,
            sink,
        }
    }

    /// "Full Name <address>" as the From header.
    pub fn from_parts(
        connector: Arc<dyn SubmissionConnector>,
        full_name: &str,
        address: &str,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let address: Address = address
            .parse()
            .map_err(|e| MailError::Delivery(format!("invalid sender address {:?}: {}", address, e)))?;
        let name = Some(full_name.to_string()).filter(|name| !name.is_empty());
        Ok(Self::new(connector, Mailbox::new(name, address), sink))
    }

    /// Submits `email` over a connection opened for this send only and closed
    /// afterwards, whatever the outcome.
    pub async fn send_email(&self, email: &OutgoingEmail) -> Result<()> {
        let (message, envelope) = compose(&self.sender, email)?;
        let client = self.connector.connect()?;

        let result = client.submit(&envelope, &message.formatted()).await;
        client.close().await;

        match &result {
            Ok(()) => self.sink.info(format_args!(
                "Email sent to {} recipient(s)",
                envelope.to().len()
            )),
            Err(e) => self.sink.error(format_args!("Failed to send email: {}", e)),
        }
        result
    }
}
