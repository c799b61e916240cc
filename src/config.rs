//! Connection settings, read from the command line or the environment.

use clap::Parser;
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Where and how to reach the mailbox.
///
/// Every field falls back to an `IMAP_*` environment variable; [`Config::from_env`] also loads a
/// `.env` file from the working directory first.
#[derive(Clone, Parser)]
#[command(name = "mailbox", version, about = "Operate on an IMAP mailbox")]
pub struct Config {
    /// IMAP server host name.
    #[arg(long, env = "IMAP_HOST", global = true)]
    pub host: Option<String>,

    /// IMAPS port.
    #[arg(long, env = "IMAP_PORT", default_value_t = 993, global = true)]
    pub port: u16,

    /// Login identity, usually the mailbox address.
    #[arg(long, env = "IMAP_LOGIN", global = true)]
    pub login: Option<String>,

    /// Password for LOGIN. Takes precedence over the token.
    #[arg(long, env = "IMAP_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// OAuth2 access token for XOAUTH2.
    #[arg(long, env = "IMAP_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Connect and I/O timeout, in seconds.
    #[arg(long, env = "IMAP_TIMEOUT", default_value_t = 30, global = true)]
    pub timeout: u64,

    /// Folder drafts are appended to.
    #[arg(
        long,
        env = "IMAP_DRAFTS_FOLDER",
        default_value = "Drafts",
        global = true
    )]
    pub drafts_folder: String,

    /// Folder selected right after authenticating.
    #[arg(
        long,
        env = "IMAP_INITIAL_FOLDER",
        default_value = "INBOX",
        global = true
    )]
    pub initial_folder: String,
}

/// The one credential used to authenticate, for the whole life of the process.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// `LOGIN user password`.
    Password(String),
    /// `AUTHENTICATE XOAUTH2` with a bearer token.
    Token(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(..)"),
            Credential::Token(_) => f.write_str("Token(..)"),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("credential", &self.credential().ok())
            .field("timeout", &self.timeout)
            .field("drafts_folder", &self.drafts_folder)
            .field("initial_folder", &self.initial_folder)
            .finish()
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    /// Build a configuration from the environment only, after loading `.env`.
    pub fn from_env() -> Result<Config> {
        dotenvy::dotenv().ok();
        Config::try_parse_from(["mailbox"]).map_err(|e| Error::Configuration(e.to_string()))
    }

    pub fn host(&self) -> Result<&str> {
        present(&self.host).ok_or_else(|| Error::Configuration("IMAP_HOST is not set".into()))
    }

    pub fn login(&self) -> Result<&str> {
        present(&self.login).ok_or_else(|| Error::Configuration("IMAP_LOGIN is not set".into()))
    }

    /// The configured credential: the password if there is one, else the token.
    pub fn credential(&self) -> Result<Credential> {
        if let Some(password) = present(&self.password) {
            return Ok(Credential::Password(password.to_string()));
        }
        if let Some(token) = present(&self.token) {
            return Ok(Credential::Token(token.to_string()));
        }
        Err(Error::Configuration(
            "neither IMAP_PASSWORD nor IMAP_TOKEN is set".into(),
        ))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }

    /// Check everything needed to connect, so that a bad configuration fails at startup.
    pub fn validate(&self) -> Result<()> {
        self.host()?;
        self.login()?;
        self.credential()?;
        Ok(())
    }
}
