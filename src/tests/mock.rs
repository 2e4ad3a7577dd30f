use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{MailError, Result};
use crate::mail_reader::search::{render_query, SearchToken};
use crate::mail_reader::session::{MailboxClient, MailboxConnector};
use crate::mail_reader::Uid;

pub type FetchHandler = Arc<dyn Fn(Uid, &str) -> Result<Vec<Vec<u8>>> + Send + Sync>;

#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub connects: usize,
    pub logins: usize,
    pub identifies: usize,
    pub selects: Vec<String>,
    pub searches: Vec<String>,
    pub fetches: Vec<(Uid, String)>,
    pub logouts: usize,
}

/// Scripted IMAP server: acts as its own connector, and every connection
/// records into the same [`Calls`].
#[derive(Clone)]
pub struct ScriptedMailbox {
    pub uids: Vec<Uid>,
    pub fail_connect: bool,
    pub reject_login: bool,
    pub fail_identify: bool,
    pub fail_search: bool,
    pub fetch: FetchHandler,
    pub calls: Arc<Mutex<Calls>>,
}

impl ScriptedMailbox {
    pub fn new(uids: Vec<Uid>) -> Self {
        ScriptedMailbox {
            uids,
            fail_connect: false,
            reject_login: false,
            fail_identify: false,
            fail_search: false,
            fetch: Arc::new(|uid, _| Ok(standard_response(uid, "\\Seen", &raw_message(uid)))),
            calls: Arc::new(Mutex::new(Calls::default())),
        }
    }

    pub fn with_fetch<F>(mut self, fetch: F) -> Self
    where
        F: Fn(Uid, &str) -> Result<Vec<Vec<u8>>> + Send + Sync + 'static,
    {
        self.fetch = Arc::new(fetch);
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailboxConnector for ScriptedMailbox {
    async fn connect(&self) -> Result<Box<dyn MailboxClient>> {
        if self.fail_connect {
            return Err(MailError::Connection("connection refused".to_string()));
        }
        self.calls.lock().unwrap().connects += 1;
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl MailboxClient for ScriptedMailbox {
    async fn login(&mut self, _username: &str, _password: &str) -> Result<()> {
        self.calls.lock().unwrap().logins += 1;
        if self.reject_login {
            return Err(MailError::Auth("invalid credentials".to_string()));
        }
        Ok(())
    }

    async fn identify(&mut self, _name: &str, _version: &str) -> Result<()> {
        self.calls.lock().unwrap().identifies += 1;
        if self.fail_identify {
            return Err(MailError::Protocol("BAD unknown command ID".to_string()));
        }
        Ok(())
    }

    async fn select(&mut self, mailbox: &str) -> Result<()> {
        self.calls.lock().unwrap().selects.push(mailbox.to_string());
        Ok(())
    }

    async fn search(&mut self, criteria: &[SearchToken]) -> Result<Vec<Uid>> {
        self.calls.lock().unwrap().searches.push(render_query(criteria));
        if self.fail_search {
            return Err(MailError::Protocol("BAD search".to_string()));
        }
        // Servers make no ordering promise.
        let mut uids = self.uids.clone();
        uids.reverse();
        Ok(uids)
    }

    async fn fetch(&mut self, uid: Uid, encoding: &str) -> Result<Vec<Vec<u8>>> {
        self.calls.lock().unwrap().fetches.push((uid, encoding.to_string()));
        (self.fetch)(uid, encoding)
    }

    async fn logout(&mut self) -> Result<()> {
        self.calls.lock().unwrap().logouts += 1;
        Ok(())
    }
}

/// A small plain-text message, comfortably over the content threshold.
pub fn raw_message(uid: Uid) -> Vec<u8> {
    format!(
        "From: Sender {uid} <sender{uid}@example.com>\r\n\
         To: me@example.com\r\n\
         Subject: Message {uid}\r\n\
         Date: Tue, 02 Jan 2024 10:00:00 +0000\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         Body of message {uid}"
    )
    .into_bytes()
}

/// Fragments the way most servers answer `UID FETCH n (BODY.PEEK[] FLAGS)`.
pub fn standard_response(uid: Uid, flags: &str, raw: &[u8]) -> Vec<Vec<u8>> {
    vec![
        format!("{uid} FETCH (UID {uid} FLAGS ({flags}) BODY[] {{{}}}", raw.len()).into_bytes(),
        raw.to_vec(),
        b")".to_vec(),
    ]
}
