use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use crate::error::{MailError, Result};
use crate::settings::ServerConfig;

/// A mail-submission connection.
#[async_trait]
pub trait SubmissionClient: Send + Sync {
    /// Authenticates if needed and hands `message` over for delivery to every
    /// address in `envelope`.
    async fn submit(&self, envelope: &Envelope, message: &[u8]) -> Result<()>;

    async fn close(&self);
}

/// Builds a fresh [`SubmissionClient`] for each send.
pub trait SubmissionConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn SubmissionClient>>;
}

/// SMTP over lettre: implicit TLS with `use_ssl`, STARTTLS with `start_ssl`,
/// plain text otherwise.
#[derive(Debug, Clone)]
pub struct SmtpConnector {
    server: ServerConfig,
}

impl SmtpConnector {
    pub fn new(server: ServerConfig) -> Self {
        SmtpConnector { server }
    }
}

impl SubmissionConnector for SmtpConnector {
    fn connect(&self) -> Result<Box<dyn SubmissionClient>> {
        let host = self.server.host.as_str();
        let builder = if self.server.use_ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| MailError::Connection(format!("invalid SMTP host {}: {}", host, e)))?
        } else if self.server.start_ssl {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| MailError::Connection(format!("invalid SMTP host {}: {}", host, e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };

        let mut builder = builder.port(self.server.port);
        if let Some(credentials) = credentials(&self.server) {
            builder = builder.credentials(credentials);
        }
        Ok(Box::new(SmtpClient {
            transport: builder.build(),
        }))
    }
}

/// SMTP AUTH credentials, only when a password is configured.
pub fn credentials(server: &ServerConfig) -> Option<Credentials> {
    let password = server.password.as_ref()?;
    Some(Credentials::new(server.user_name.clone(), password.clone()))
}

struct SmtpClient {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

#[async_trait]
impl SubmissionClient for SmtpClient {
    async fn submit(&self, envelope: &Envelope, message: &[u8]) -> Result<()> {
        self.transport
            .send_raw(envelope, message)
            .await
            .map(|_| ())
            .map_err(|e| MailError::Delivery(e.to_string()))
    }

    async fn close(&self) {
        self.transport.shutdown().await;
    }
}
