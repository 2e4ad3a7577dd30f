use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::diagnostics::EventSink;
use crate::error::Result;

pub mod fetch;
pub mod flags;
pub mod imap;
pub mod message;
pub mod search;
pub mod session;

use message::{parse_email, EmailRecord};
use search::{build_search_criteria, SearchFilter};
use session::{ClientIdentity, Login, MailboxConnector, MailboxSession};

/// IMAP unique identifier, stable across sessions.
pub type Uid = u32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[serde(rename = "asc")]
    Ascending,
    #[default]
    #[serde(rename = "desc")]
    Descending,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Ascending),
            "desc" | "descending" => Ok(SortOrder::Descending),
            other => Err(format!("unknown order {:?}, expected asc or desc", other)),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        })
    }
}

/// UIDs of the requested page. Search results come back ascending, which
/// approximates arrival order; `Descending` puts the newest first. Pages are
/// 1-based and are not validated: past the end, or page 0, is empty.
pub fn paginate(mut uids: Vec<Uid>, page: usize, page_size: usize, order: SortOrder) -> Vec<Uid> {
    if order == SortOrder::Descending {
        uids.reverse();
    }
    let Some(start) = page.checked_sub(1).and_then(|p| p.checked_mul(page_size)) else {
        return Vec::new();
    };
    let end = start.saturating_add(page_size).min(uids.len());
    uids.get(start..end).map(<[Uid]>::to_vec).unwrap_or_default()
}

/// One page request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQuery {
    pub page: usize,
    pub page_size: usize,
    #[serde(flatten)]
    pub filter: SearchFilter,
    pub order: SortOrder,
}

impl Default for PageQuery {
    fn default() -> Self {
        PageQuery {
            page: 1,
            page_size: 10,
            filter: SearchFilter::default(),
            order: SortOrder::Descending,
        }
    }
}

/// A page of messages plus the size of the whole filtered set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub page: usize,
    pub page_size: usize,
    #[serde(flatten)]
    pub filter: SearchFilter,
    pub emails: Vec<EmailRecord>,
    pub total: usize,
}

/// Messages of one page, fetched one at a time as the stream is polled.
///
/// The stream owns its mailbox session. The session logs out when the last
/// message has been yielded, or when the stream is dropped before that.
pub struct EmailStream {
    inner: BoxStream<'static, EmailRecord>,
}

impl Stream for EmailStream {
    type Item = EmailRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

struct PageCursor {
    session: MailboxSession,
    pending: VecDeque<Uid>,
}

impl PageCursor {
    async fn next_record(&mut self) -> Option<EmailRecord> {
        let sink = Arc::clone(self.session.sink());
        while let Some(uid) = self.pending.pop_front() {
            let fetched = match self.session.client() {
                Ok(client) => fetch::fetch_message(client, uid, sink.as_ref()).await,
                Err(e) => Err(e),
            };
            match fetched {
                Ok(fetched) => {
                    let parsed = parse_email(&fetched.raw, sink.as_ref());
                    return Some(EmailRecord::new(parsed, fetched.flags));
                }
                Err(e) => {
                    sink.error(format_args!("Error fetching message {}: {}", uid, e));
                }
            }
        }
        self.session.close().await;
        None
    }
}

/// Read side of the mailbox: paged retrieval and counting.
#[derive(Clone)]
pub struct EmailReader {
    connector: Arc<dyn MailboxConnector>,
    login: Login,
    mailbox: String,
    identity: Option<ClientIdentity>,
    sink: Arc<dyn EventSink>,
}

impl EmailReader {
    pub fn new(connector: Arc<dyn MailboxConnector>, login: Login, sink: Arc<dyn EventSink>) -> Self {
        EmailReader {
            connector,
            login,
            mailbox: "INBOX".to_string(),
            identity: Some(ClientIdentity::default()),
            sink,
        }
    }

    pub fn with_mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = mailbox.into();
        self
    }

    /// `None` skips the `ID` command.
    pub fn with_identity(mut self, identity: Option<ClientIdentity>) -> Self {
        self.identity = identity;
        self
    }

    async fn open_session(&self, identity: Option<&ClientIdentity>) -> Result<MailboxSession> {
        MailboxSession::open(
            self.connector.as_ref(),
            &self.login,
            identity,
            &self.mailbox,
            Arc::clone(&self.sink),
        )
        .await
    }

    /// Searches with `filter` and streams one page of matches.
    ///
    /// Connection, login, select and search failures are returned here.
    /// Once the stream exists, a message that cannot be fetched is logged and
    /// skipped, so a page may come out shorter than `page_size`.
    pub async fn stream_emails(
        &self,
        filter: &SearchFilter,
        page: usize,
        page_size: usize,
        order: SortOrder,
    ) -> Result<EmailStream> {
        let mut session = self.open_session(self.identity.as_ref()).await?;

        let criteria = build_search_criteria(filter);
        self.sink.info(format_args!("Get: Search criteria: {}", search::render_query(&criteria)));

        let uids = match session.search(&criteria).await {
            Ok(uids) => uids,
            Err(e) => {
                session.close().await;
                return Err(e);
            }
        };

        let cursor = PageCursor {
            session,
            pending: paginate(uids, page, page_size, order).into(),
        };
        let inner = stream::unfold(cursor, |mut cursor| async move {
            let record = cursor.next_record().await?;
            Some((record, cursor))
        })
        .fuse()
        .boxed();

        Ok(EmailStream { inner })
    }

    /// Number of messages matching `filter`, from a session of its own.
    pub async fn count_emails(&self, filter: &SearchFilter) -> Result<usize> {
        let mut session = self.open_session(None).await?;

        let criteria = build_search_criteria(filter);
        self.sink.info(format_args!("Count: Search criteria: {}", search::render_query(&criteria)));

        let result = session.search(&criteria).await;
        session.close().await;
        result.map(|uids| uids.len())
    }

    /// Collects one page and pairs it with the total count. The two use
    /// separate sessions, so `total` can drift if the mailbox changes between
    /// them.
    pub async fn get_emails(&self, query: &PageQuery) -> Result<PageResult> {
        let emails: Vec<EmailRecord> = self
            .stream_emails(&query.filter, query.page, query.page_size, query.order)
            .await?
            .collect()
            .await;
        let total = self.count_emails(&query.filter).await?;

        Ok(PageResult {
            page: query.page,
            page_size: query.page_size,
            filter: query.filter.clone(),
            emails,
            total,
        })
    }
}
