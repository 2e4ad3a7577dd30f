use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use log::LevelFilter;

use mailsift::credentials::CredentialStore;
use mailsift::diagnostics::{EventSink, LogSink};
use mailsift::mail_reader::imap::ImapConnector;
use mailsift::mail_reader::search::SearchFilter;
use mailsift::mail_reader::session::{ClientIdentity, Login};
use mailsift::mail_sender::smtp::SmtpConnector;
use mailsift::settings::{self, Config, DEFAULT_SETTINGS_PATH};
use mailsift::{display, EmailReader, EmailSender, OutgoingEmail, PageQuery, SortOrder};

#[derive(Debug, Parser)]
#[command(name = "mailsift", version, about = "Page through, count and send mail over IMAP/SMTP")]
struct Cli {
    #[arg(short, long, default_value = DEFAULT_SETTINGS_PATH)]
    config: PathBuf,

    /// Directory holding the encrypted password store
    #[arg(long, default_value = ".")]
    secrets: PathBuf,

    /// -v for debug, -vv for trace
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print one page of messages as JSON
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        page_size: usize,
        #[arg(long, default_value_t = SortOrder::Descending)]
        order: SortOrder,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Print the number of matching messages
    Count {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Send a plain-text message
    Send {
        #[arg(long = "to", required = true)]
        recipients: Vec<String>,
        #[arg(long)]
        cc: Vec<String>,
        #[arg(long)]
        bcc: Vec<String>,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
    },
}

#[derive(Debug, Args)]
struct FilterArgs {
    /// YYYY-MM-DD
    #[arg(long)]
    before: Option<NaiveDate>,
    /// YYYY-MM-DD
    #[arg(long)]
    since: Option<NaiveDate>,
    #[arg(long)]
    subject: Option<String>,
    #[arg(long)]
    body: Option<String>,
    #[arg(long)]
    text: Option<String>,
    #[arg(long = "from")]
    from_address: Option<String>,
    #[arg(long = "to")]
    to_address: Option<String>,
    #[arg(long)]
    unread: Option<bool>,
    #[arg(long)]
    flagged: Option<bool>,
}

impl From<FilterArgs> for SearchFilter {
    fn from(args: FilterArgs) -> Self {
        SearchFilter {
            before: args.before,
            since: args.since,
            subject: args.subject,
            body: args.body,
            text: args.text,
            from_address: args.from_address,
            to_address: args.to_address,
            is_unread: args.unread,
            is_flagged: args.flagged,
        }
    }
}

fn setup_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("async_imap", LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply()
        .context("Cannot install logger")
}

fn reader(config: &Config, sink: Arc<dyn EventSink>) -> EmailReader {
    let incoming = &config.incoming;
    let login = Login {
        username: incoming.user_name.clone(),
        password: incoming.password.clone().unwrap_or_default(),
    };
    let connector = Arc::new(ImapConnector::new(incoming.clone(), Arc::clone(&sink)));
    EmailReader::new(connector, login, sink)
        .with_mailbox(config.mailbox.clone())
        .with_identity(config.identify.then(ClientIdentity::default))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let mut config = settings::load_settings(&cli.config)?;
    let store = CredentialStore::new(&cli.secrets);
    let sink: Arc<dyn EventSink> = Arc::new(LogSink);

    match cli.command {
        Command::List { page, page_size, order, filter } => {
            store.resolve(&mut config.incoming)?;
            let query = PageQuery {
                page,
                page_size,
                filter: filter.into(),
                order,
            };
            let result = reader(&config, sink).get_emails(&query).await?;
            display::display_page(&result);
        }
        Command::Count { filter } => {
            store.resolve(&mut config.incoming)?;
            let total = reader(&config, sink).count_emails(&filter.into()).await?;
            display::display_count(total);
        }
        Command::Send { recipients, cc, bcc, subject, body } => {
            store.resolve(&mut config.outgoing)?;
            let connector = Arc::new(SmtpConnector::new(config.outgoing.clone()));
            let sender = EmailSender::from_parts(connector, &config.full_name, &config.email_address, sink)?;
            sender
                .send_email(&OutgoingEmail {
                    recipients,
                    subject,
                    body,
                    cc,
                    bcc,
                })
                .await?;
        }
    }
    Ok(())
}
