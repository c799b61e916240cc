use std::error::Error as StdError;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::DateTime;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use mailbox_tools::{Config, Error, MailboxFacade, MessageUid, GRAMMAR};

#[derive(Parser, Debug)]
#[command(
    name = "mailbox",
    version,
    about = "Operate on an IMAP mailbox",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    config: Config,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the configured mailbox address
    Whoami,
    /// Print the search grammar reference
    Grammar,
    /// List the folders under BASE matching PATTERN (`*` any depth, `%` one level)
    List {
        #[arg(default_value = "")]
        base: String,
        #[arg(default_value = "*")]
        pattern: String,
    },
    /// Message counts of a folder
    Status { folder: String },
    /// UIDs of the messages of FOLDER matching CRITERIA
    Search { folder: String, criteria: String },
    /// Headers of the given messages
    Headers {
        folder: String,
        #[arg(required = true)]
        uids: Vec<String>,
    },
    /// Plain-text bodies of the given messages
    Text {
        folder: String,
        #[arg(required = true)]
        uids: Vec<String>,
    },
    /// HTML bodies of the given messages
    Html {
        folder: String,
        #[arg(required = true)]
        uids: Vec<String>,
    },
    /// Sizes of the given messages
    Size {
        folder: String,
        #[arg(required = true)]
        uids: Vec<String>,
    },
    /// Append an RFC 822 message to the drafts folder
    Draft {
        /// File holding the message; read from stdin if absent
        #[arg(long)]
        file: Option<PathBuf>,
        /// Internal date of the draft, RFC 3339
        #[arg(long)]
        date: Option<String>,
    },
}

type BoxResult<T> = Result<T, Box<dyn StdError>>;

fn json<T: Serialize>(value: &T) -> BoxResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn uids(values: Vec<String>) -> Vec<MessageUid> {
    values.into_iter().map(MessageUid::new).collect()
}

fn run(cli: Cli) -> BoxResult<String> {
    if let Command::Grammar = cli.command {
        return Ok(GRAMMAR.to_string());
    }
    cli.config.validate()?;
    if let Command::Whoami = cli.command {
        return json(&cli.config.login()?);
    }

    let mailbox = MailboxFacade::open(&cli.config)?;
    let output = operate(&mailbox, cli.command);
    mailbox.shutdown();
    output
}

fn operate(mailbox: &MailboxFacade, command: Command) -> BoxResult<String> {
    match command {
        Command::Whoami => json(&mailbox.who_am_i()),
        Command::Grammar => Ok(GRAMMAR.to_string()),
        Command::List { base, pattern } => json(&mailbox.list_mailboxes(&base, &pattern)?),
        Command::Status { folder } => json(&mailbox.mailbox_status(&folder)?),
        Command::Search { folder, criteria } => json(&mailbox.search(&folder, &criteria)?),
        Command::Headers { folder, uids: u } => json(&mailbox.fetch_headers(&folder, &uids(u))?),
        Command::Text { folder, uids: u } => json(&mailbox.fetch_text(&folder, &uids(u))?),
        Command::Html { folder, uids: u } => json(&mailbox.fetch_html(&folder, &uids(u))?),
        Command::Size { folder, uids: u } => json(&mailbox.fetch_size(&folder, &uids(u))?),
        Command::Draft { file, date } => {
            let content = match file {
                Some(path) => std::fs::read(path)?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            let date = date
                .map(|d| DateTime::parse_from_rfc3339(&d))
                .transpose()?;
            json(&mailbox.create_draft_message(&content, date)?)
        }
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            match e.downcast_ref::<Error>() {
                Some(Error::Configuration(_)) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}
