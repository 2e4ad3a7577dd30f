use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::message::Mailbox;

use crate::diagnostics::{EventSink, MemorySink};
use crate::error::{MailError, Result};
use crate::mail_sender::smtp::{credentials, SmtpConnector, SubmissionClient, SubmissionConnector};
use crate::settings::ServerConfig;
use crate::mail_sender::{compose, EmailSender, OutgoingEmail};

#[derive(Debug, Default)]
struct Submissions {
    delivered: Vec<(Vec<String>, String)>,
    closes: usize,
}

#[derive(Clone, Default)]
struct RecordingSmtp {
    reject: bool,
    log: Arc<Mutex<Submissions>>,
}

#[async_trait]
impl SubmissionClient for RecordingSmtp {
    async fn submit(&self, envelope: &Envelope, message: &[u8]) -> Result<()> {
        if self.reject {
            return Err(MailError::Delivery("535 authentication failed".to_string()));
        }
        let to = envelope.to().iter().map(ToString::to_string).collect();
        let text = String::from_utf8_lossy(message).into_owned();
        self.log.lock().unwrap().delivered.push((to, text));
        Ok(())
    }

    async fn close(&self) {
        self.log.lock().unwrap().closes += 1;
    }
}

impl SubmissionConnector for RecordingSmtp {
    fn connect(&self) -> Result<Box<dyn SubmissionClient>> {
        Ok(Box::new(self.clone()))
    }
}

fn sender_mailbox() -> Mailbox {
    "Jane Doe <jane@example.com>".parse().unwrap()
}

fn headers(formatted: &[u8]) -> String {
    let text = String::from_utf8_lossy(formatted);
    text.split("\r\n\r\n").next().unwrap_or_default().to_string()
}

#[test]
fn test_bcc_stays_out_of_headers() {
    let email = OutgoingEmail {
        recipients: vec!["alice@example.com".to_string()],
        subject: "Quarterly numbers".to_string(),
        body: "See attached.".to_string(),
        cc: Vec::new(),
        bcc: vec!["bob@example.com".to_string()],
    };

    let (message, envelope) = compose(&sender_mailbox(), &email).unwrap();
    let formatted = message.formatted();
    let text = String::from_utf8_lossy(&formatted);

    assert!(!text.contains("bob@example.com"));
    assert!(!headers(&formatted).to_ascii_lowercase().contains("bcc"));
    assert!(headers(&formatted).contains("To: alice@example.com"));

    let delivery: Vec<String> = envelope.to().iter().map(ToString::to_string).collect();
    assert_eq!(delivery, vec!["alice@example.com", "bob@example.com"]);
    assert_eq!(envelope.from().map(ToString::to_string).as_deref(), Some("jane@example.com"));
}

#[test]
fn test_cc_is_visible_and_delivered() {
    let email = OutgoingEmail {
        recipients: vec!["alice@example.com".to_string()],
        subject: "Lunch".to_string(),
        body: "Noon?".to_string(),
        cc: vec!["carol@example.com".to_string()],
        bcc: Vec::new(),
    };

    let (message, envelope) = compose(&sender_mailbox(), &email).unwrap();
    let headers = headers(&message.formatted());

    assert!(headers.contains("Cc: carol@example.com"));
    assert!(headers.contains("Subject: Lunch"));
    assert!(headers.contains("From: \"Jane Doe\" <jane@example.com>") || headers.contains("From: Jane Doe <jane@example.com>"));
    assert_eq!(envelope.to().len(), 2);
}

#[test]
fn test_invalid_recipient_is_rejected() {
    let email = OutgoingEmail {
        recipients: vec!["not an address".to_string()],
        subject: "x".to_string(),
        body: "y".to_string(),
        ..Default::default()
    };
    assert!(matches!(compose(&sender_mailbox(), &email), Err(MailError::Delivery(_))));

    let nobody = OutgoingEmail::default();
    assert!(matches!(compose(&sender_mailbox(), &nobody), Err(MailError::Delivery(_))));
}

#[tokio::test]
async fn test_send_submits_and_closes() {
    let smtp = RecordingSmtp::default();
    let sink = Arc::new(MemorySink::new());
    let sender = EmailSender::from_parts(
        Arc::new(smtp.clone()),
        "Jane Doe",
        "jane@example.com",
        sink.clone() as Arc<dyn EventSink>,
    )
    .unwrap();

    sender
        .send_email(&OutgoingEmail {
            recipients: vec!["alice@example.com".to_string()],
            subject: "Hi".to_string(),
            body: "Hello Alice".to_string(),
            cc: Vec::new(),
            bcc: vec!["bob@example.com".to_string()],
        })
        .await
        .unwrap();

    let log = smtp.log.lock().unwrap();
    assert_eq!(log.closes, 1);
    assert_eq!(log.delivered.len(), 1);
    let (to, text) = &log.delivered[0];
    assert_eq!(to, &vec!["alice@example.com".to_string(), "bob@example.com".to_string()]);
    assert!(text.contains("Hello Alice"));
    assert!(!text.contains("bob@example.com"));
}

#[tokio::test]
async fn test_rejected_submission_is_a_delivery_error() {
    let smtp = RecordingSmtp {
        reject: true,
        ..Default::default()
    };
    let sink = Arc::new(MemorySink::new());
    let sender = EmailSender::new(Arc::new(smtp.clone()), sender_mailbox(), sink.clone());

    let result = sender
        .send_email(&OutgoingEmail {
            recipients: vec!["alice@example.com".to_string()],
            subject: "Hi".to_string(),
            body: "Hello".to_string(),
            ..Default::default()
        })
        .await;

    assert!(matches!(result, Err(MailError::Delivery(_))));
    assert_eq!(smtp.log.lock().unwrap().closes, 1);
    assert!(sink.contains(log::Level::Error, "Failed to send email"));
}

#[tokio::test]
async fn test_smtp_auth_only_with_password() {
    let mut server = ServerConfig {
        host: "localhost".to_string(),
        port: 2525,
        user_name: "jane".to_string(),
        password: None,
        use_ssl: false,
        start_ssl: false,
    };
    assert!(credentials(&server).is_none());
    assert!(SmtpConnector::new(server.clone()).connect().is_ok());

    server.password = Some("hunter2".to_string());
    assert!(credentials(&server).is_some());
}
