pub mod credentials;
pub mod diagnostics;
pub mod display;
pub mod error;
pub mod mail_reader;
pub mod mail_sender;
pub mod settings;

#[cfg(test)]
mod tests;

pub use error::{MailError, Result};
pub use mail_reader::{EmailReader, EmailStream, PageQuery, PageResult, SortOrder};
pub use mail_sender::{EmailSender, OutgoingEmail};
