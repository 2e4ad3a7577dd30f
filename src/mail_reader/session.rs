use std::sync::Arc;

use async_trait::async_trait;

use crate::diagnostics::EventSink;
use crate::error::{MailError, Result};
use crate::mail_reader::search::SearchToken;
use crate::mail_reader::Uid;

/// A connected mailbox-access client. Implemented over async-imap in
/// production and by scripted clients in tests.
#[async_trait]
pub trait MailboxClient: Send {
    async fn login(&mut self, username: &str, password: &str) -> Result<()>;

    /// IMAP `ID` (RFC 2971).
    async fn identify(&mut self, name: &str, version: &str) -> Result<()>;

    async fn select(&mut self, mailbox: &str) -> Result<()>;

    /// UID SEARCH. Order of the result is unspecified.
    async fn search(&mut self, criteria: &[SearchToken]) -> Result<Vec<Uid>>;

    /// UID FETCH with the given request encoding, returned as the raw
    /// response fragments (protocol lines and literals) in arrival order.
    async fn fetch(&mut self, uid: Uid, encoding: &str) -> Result<Vec<Vec<u8>>>;

    async fn logout(&mut self) -> Result<()>;
}

/// Opens a fresh transport to the mailbox server.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn MailboxClient>>;
}

#[derive(Debug, Clone)]
pub struct Login {
    pub username: String,
    pub password: String,
}

/// Sent with the `ID` command after login.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub name: String,
    pub version: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        ClientIdentity {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Authenticated,
    Selected,
    Closed,
}

/// One authenticated connection with a selected mailbox, owned by a single
/// operation.
///
/// Logout happens exactly once: either through [`MailboxSession::close`] or,
/// if the session is dropped while still open, on a task spawned onto the
/// current tokio runtime.
pub struct MailboxSession {
    client: Option<Box<dyn MailboxClient>>,
    state: SessionState,
    sink: Arc<dyn EventSink>,
}

impl MailboxSession {
    /// Connects, logs in, identifies (best effort) and selects `mailbox`.
    ///
    /// If anything after the connect step fails, the half-open connection is
    /// logged out before the error is returned.
    pub async fn open(
        connector: &dyn MailboxConnector,
        login: &Login,
        identity: Option<&ClientIdentity>,
        mailbox: &str,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let client = connector.connect().await?;
        let mut session = MailboxSession {
            client: Some(client),
            state: SessionState::Closed,
            sink,
        };

        match session.start(login, identity, mailbox).await {
            Ok(()) => Ok(session),
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    async fn start(&mut self, login: &Login, identity: Option<&ClientIdentity>, mailbox: &str) -> Result<()> {
        let sink = Arc::clone(&self.sink);
        let client = self.client()?;

        client.login(&login.username, &login.password).await?;
        self.state = SessionState::Authenticated;
        sink.info(format_args!("-- logged in as {}", login.username));

        if let Some(identity) = identity {
            if let Err(e) = self.client()?.identify(&identity.name, &identity.version).await {
                sink.warn(format_args!("IMAP ID command failed: {}", e));
            }
        }

        self.client()?.select(mailbox).await?;
        self.state = SessionState::Selected;
        sink.info(format_args!("-- {} selected", mailbox));
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// The underlying client, while the session is open.
    pub fn client(&mut self) -> Result<&mut (dyn MailboxClient + 'static)> {
        self.client
            .as_deref_mut()
            .ok_or_else(|| MailError::Connection("mailbox session is closed".to_string()))
    }

    /// Matching UIDs, ascending.
    pub async fn search(&mut self, criteria: &[SearchToken]) -> Result<Vec<Uid>> {
        let mut uids = self.client()?.search(criteria).await?;
        if uids.is_empty() {
            self.sink.warn(format_args!("No messages returned from search"));
        } else {
            self.sink.info(format_args!("Found {} message IDs", uids.len()));
        }
        uids.sort_unstable();
        uids.dedup();
        Ok(uids)
    }

    /// Logs out. Errors are reported to the sink and otherwise ignored;
    /// calling this on a closed session does nothing.
    pub async fn close(&mut self) {
        if let Some(mut client) = self.client.take() {
            self.state = SessionState::Closed;
            if let Err(e) = client.logout().await {
                self.sink.info(format_args!("Error during logout: {}", e));
            }
        }
    }
}

impl Drop for MailboxSession {
    fn drop(&mut self) {
        let Some(mut client) = self.client.take() else {
            return;
        };
        let sink = Arc::clone(&self.sink);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.logout().await {
                        sink.info(format_args!("Error during logout: {}", e));
                    }
                });
            }
            Err(_) => sink.warn(format_args!("No runtime to log out on, dropping the mailbox connection")),
        }
    }
}
