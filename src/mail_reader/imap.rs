use std::fmt;
use std::sync::Arc;

use async_imap::types::{Fetch, Flag};
use async_imap::{Client, Session};
use async_trait::async_trait;
use futures::{AsyncRead, AsyncWrite, TryStreamExt};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncReadCompatExt;

use crate::diagnostics::EventSink;
use crate::error::{MailError, Result};
use crate::mail_reader::search::{render_query, SearchToken};
use crate::mail_reader::session::{MailboxClient, MailboxConnector};
use crate::mail_reader::Uid;
use crate::settings::ServerConfig;

/// Opens IMAP connections, over implicit TLS when `use_ssl` is set.
#[derive(Clone)]
pub struct ImapConnector {
    server: ServerConfig,
    sink: Arc<dyn EventSink>,
}

impl ImapConnector {
    pub fn new(server: ServerConfig, sink: Arc<dyn EventSink>) -> Self {
        ImapConnector { server, sink }
    }
}

// Establish a TLS-encrypted connection to the IMAP server
async fn connect_tls(server: &str, port: u16) -> Result<tokio_native_tls::TlsStream<TcpStream>> {
    let tcp_stream = connect_plain(server, port).await?;
    let connector = native_tls::TlsConnector::new().map_err(|e| MailError::Connection(e.to_string()))?;
    let tls = tokio_native_tls::TlsConnector::from(connector);
    tls.connect(server, tcp_stream)
        .await
        .map_err(|e| MailError::Connection(format!("TLS handshake with {} failed: {}", server, e)))
}

async fn connect_plain(server: &str, port: u16) -> Result<TcpStream> {
    TcpStream::connect((server, port))
        .await
        .map_err(|e| MailError::Connection(format!("{}:{}: {}", server, port, e)))
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn connect(&self) -> Result<Box<dyn MailboxClient>> {
        let ServerConfig { host, port, .. } = &self.server;
        let client: Box<dyn MailboxClient> = if self.server.use_ssl {
            let stream = connect_tls(host, *port).await?;
            Box::new(ImapClient::greet(stream.compat()).await?)
        } else {
            let stream = connect_plain(host, *port).await?;
            Box::new(ImapClient::greet(stream.compat()).await?)
        };
        self.sink.info(format_args!("-- connected to {}:{}", host, port));
        Ok(client)
    }
}

enum Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + fmt::Debug + Send,
{
    Greeted(Client<T>),
    Authenticated(Session<T>),
    Closed,
}

/// [`MailboxClient`] over an async-imap connection.
pub struct ImapClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin + fmt::Debug + Send,
{
    connection: Connection<T>,
}

impl<T> ImapClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin + fmt::Debug + Send,
{
    /// Waits for the server greeting on a freshly opened stream.
    pub async fn greet(stream: T) -> Result<Self> {
        let mut client = Client::new(stream);
        match client.read_response().await {
            Some(Ok(_greeting)) => Ok(ImapClient {
                connection: Connection::Greeted(client),
            }),
            None => Err(MailError::Connection("connection closed before greeting".to_string())),
            Some(Err(e)) => Err(MailError::Connection(format!("reading greeting: {}", e))),
        }
    }

    fn session(&mut self) -> Result<&mut Session<T>> {
        match &mut self.connection {
            Connection::Authenticated(session) => Ok(session),
            Connection::Greeted(_) => Err(MailError::Protocol("not logged in".to_string())),
            Connection::Closed => Err(MailError::Connection("connection closed".to_string())),
        }
    }
}

fn flag_token(flag: &Flag<'_>) -> String {
    match flag {
        Flag::Seen => "\\Seen".to_string(),
        Flag::Answered => "\\Answered".to_string(),
        Flag::Flagged => "\\Flagged".to_string(),
        Flag::Deleted => "\\Deleted".to_string(),
        Flag::Draft => "\\Draft".to_string(),
        Flag::Recent => "\\Recent".to_string(),
        Flag::Custom(name) => name.to_string(),
        _ => "\\*".to_string(),
    }
}

/// Turns a parsed FETCH back into the fragments the server sent: the
/// response line, then the body literal if there was one.
fn fetch_fragments(fetch: &Fetch) -> Vec<Vec<u8>> {
    let flags = fetch
        .flags()
        .map(|flag| flag_token(&flag))
        .collect::<Vec<_>>()
        .join(" ");
    let uid = fetch.uid.map(|uid| format!("UID {} ", uid)).unwrap_or_default();

    let mut line = format!("{} FETCH ({}FLAGS ({})", fetch.message, uid, flags);
    let body = fetch.body();
    if let Some(body) = body {
        line.push_str(&format!(" BODY[] {{{}}}", body.len()));
    } else {
        line.push(')');
    }

    let mut fragments = vec![line.into_bytes()];
    if let Some(body) = body {
        fragments.push(body.to_vec());
    }
    fragments
}

#[async_trait]
impl<T> MailboxClient for ImapClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin + fmt::Debug + Send,
{
    async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        match std::mem::replace(&mut self.connection, Connection::Closed) {
            Connection::Greeted(client) => match client.login(username, password).await {
                Ok(session) => {
                    self.connection = Connection::Authenticated(session);
                    Ok(())
                }
                Err((e, client)) => {
                    self.connection = Connection::Greeted(client);
                    Err(MailError::Auth(e.to_string()))
                }
            },
            other => {
                self.connection = other;
                Err(MailError::Protocol("login on a session that is not fresh".to_string()))
            }
        }
    }

    async fn identify(&mut self, name: &str, version: &str) -> Result<()> {
        self.session()?
            .id([("name", Some(name)), ("version", Some(version))])
            .await
            .map(|_| ())
            .map_err(|e| MailError::Protocol(e.to_string()))
    }

    async fn select(&mut self, mailbox: &str) -> Result<()> {
        self.session()?
            .select(mailbox)
            .await
            .map(|_| ())
            .map_err(|e| MailError::Protocol(format!("SELECT {}: {}", mailbox, e)))
    }

    async fn search(&mut self, criteria: &[SearchToken]) -> Result<Vec<Uid>> {
        let query = render_query(criteria);
        let uids = self
            .session()?
            .uid_search(&query)
            .await
            .map_err(|e| MailError::Protocol(format!("UID SEARCH {}: {}", query, e)))?;
        Ok(uids.into_iter().collect())
    }

    async fn fetch(&mut self, uid: Uid, encoding: &str) -> Result<Vec<Vec<u8>>> {
        let to_fetch_error = move |e: async_imap::error::Error| MailError::Fetch {
            uid,
            reason: e.to_string(),
        };
        let fetches: Vec<Fetch> = self
            .session()?
            .uid_fetch(uid.to_string(), encoding)
            .await
            .map_err(to_fetch_error)?
            .try_collect()
            .await
            .map_err(to_fetch_error)?;

        // Unsolicited FETCH updates for other messages share the response.
        Ok(fetches
            .iter()
            .filter(|fetch| fetch.uid == Some(uid))
            .flat_map(fetch_fragments)
            .collect())
    }

    async fn logout(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.connection, Connection::Closed) {
            Connection::Authenticated(mut session) => session
                .logout()
                .await
                .map_err(|e| MailError::Connection(e.to_string())),
            // Never authenticated: dropping the client closes the socket.
            Connection::Greeted(_) | Connection::Closed => Ok(()),
        }
    }
}
