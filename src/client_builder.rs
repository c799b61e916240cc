use native_tls::{TlsConnector, TlsStream};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::authenticator::XOAuth2;
use crate::client::ImapStore;
use crate::config::{Config, Credential};
use crate::error::Result;
use crate::store::{Connector, MailStore, StoreError};

/// Opens authenticated IMAPS connections.
///
/// ```no_run
/// # use mailbox_tools::{Credential, ImapConnector, Connector};
/// # use std::time::Duration;
/// let connector = ImapConnector::new(
///     "imap.example.com",
///     "me@example.com",
///     Credential::Password("secret".into()),
/// )
/// .timeout(Duration::from_secs(10));
/// let store = connector.connect().unwrap();
/// ```
///
/// Every socket carries the timeout for connecting, reading and writing, so a stalled server
/// surfaces as a [`StoreError::Connection`] rather than blocking forever.
pub struct ImapConnector {
    host: String,
    port: u16,
    login: String,
    credential: Credential,
    timeout: Duration,
    initial_folder: String,
}

impl ImapConnector {
    pub fn new(host: impl Into<String>, login: impl Into<String>, credential: Credential) -> Self {
        ImapConnector {
            host: host.into(),
            port: 993,
            login: login.into(),
            credential,
            timeout: Duration::from_secs(30),
            initial_folder: "INBOX".to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(ImapConnector::new(config.host()?, config.login()?, config.credential()?)
            .port(config.port)
            .timeout(config.timeout())
            .initial_folder(&config.initial_folder))
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Folder to select right after authenticating.
    pub fn initial_folder(mut self, folder: &str) -> Self {
        self.initial_folder = folder.to_string();
        self
    }

    // Resolve and try each address in turn, like `TcpStream::connect` does, but with a timeout.
    fn tcp(&self) -> std::result::Result<TcpStream, StoreError> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                StoreError::Connection(format!("resolving {}: {}", self.host, e))
            })?;

        let mut last = StoreError::Connection(format!("{} has no addresses", self.host));
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(tcp) => {
                    tcp.set_read_timeout(Some(self.timeout))
                        .and_then(|_| tcp.set_write_timeout(Some(self.timeout)))
                        .map_err(|e| StoreError::Connection(e.to_string()))?;
                    return Ok(tcp);
                }
                Err(e) => {
                    debug!(%addr, error = %e, "could not connect");
                    last = StoreError::Connection(format!("connecting to {}: {}", addr, e));
                }
            }
        }
        Err(last)
    }

    fn handshake(&self) -> std::result::Result<imap::Client<TlsStream<TcpStream>>, StoreError> {
        let tcp = self.tcp()?;
        let tls = TlsConnector::new().map_err(|e| StoreError::Connection(e.to_string()))?;
        let stream = tls
            .connect(&self.host, tcp)
            .map_err(|e| {
                StoreError::Connection(format!("TLS handshake failed: {}", e))
            })?;

        let mut client = imap::Client::new(stream);
        client.read_greeting()?;
        Ok(client)
    }
}

fn authentication_error(err: imap::Error) -> StoreError {
    match StoreError::from(err) {
        StoreError::Protocol(message) => StoreError::Authentication(message),
        other => other,
    }
}

impl ImapConnector {
    /// Authenticate on a client whose greeting has been read, then select the initial folder.
    fn establish<T>(&self, client: imap::Client<T>) -> std::result::Result<ImapStore<T>, StoreError>
    where
        T: Read + Write + Send,
    {
        let session = match &self.credential {
            Credential::Password(password) => client
                .login(&self.login, password)
                .map_err(|(e, _)| authentication_error(e))?,
            Credential::Token(token) => client
                .authenticate(XOAuth2::MECHANISM, &XOAuth2::new(&self.login, token))
                .map_err(|(e, _)| authentication_error(e))?,
        };
        info!(host = %self.host, login = %self.login, "authenticated");

        let mut store = ImapStore::new(session);
        match store.select(&self.initial_folder) {
            Ok(()) => {}
            Err(e) if e.is_connection_failure() => return Err(e),
            Err(e) => warn!(
                folder = %self.initial_folder,
                error = %e,
                "initial folder not selected"
            ),
        }
        Ok(store)
    }
}

impl Connector for ImapConnector {
    fn connect(&self) -> std::result::Result<Box<dyn MailStore>, StoreError> {
        let client = self.handshake()?;
        Ok(Box::new(self.establish(client)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_stream::MockStream;

    fn connector(credential: Credential) -> ImapConnector {
        ImapConnector::new("imap.example.com", "me@example.com", credential).initial_folder("Work")
    }

    #[test]
    fn logs_in_and_selects_the_initial_folder() {
        let stream = MockStream::new(
            "a1 OK Logged in\r\n* 2 EXISTS\r\n* 0 RECENT\r\na2 OK [READ-WRITE] done\r\n",
        );
        let written = stream.written();
        let store = connector(Credential::Password("secret".into()))
            .establish(imap::Client::new(stream))
            .unwrap();
        assert_eq!(store.selected().as_deref(), Some("Work"));
        assert_eq!(
            written.text(),
            "a1 LOGIN \"me@example.com\" \"secret\"\r\na2 SELECT \"Work\"\r\n"
        );
    }

    #[test]
    fn token_uses_xoauth2() {
        let stream = MockStream::new(
            "+\r\na1 OK Success\r\n* 0 EXISTS\r\n* 0 RECENT\r\na2 OK [READ-WRITE] done\r\n",
        );
        let written = stream.written();
        connector(Credential::Token("ya29.token".into()))
            .establish(imap::Client::new(stream))
            .unwrap();
        assert!(written.text().starts_with("a1 AUTHENTICATE XOAUTH2\r\n"));
    }

    #[test]
    fn rejected_login_is_an_authentication_failure() {
        let stream = MockStream::new("a1 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n");
        let err = connector(Credential::Password("wrong".into()))
            .establish(imap::Client::new(stream))
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Authentication(_)));
    }

    #[test]
    fn missing_initial_folder_is_not_fatal() {
        let stream = MockStream::new("a1 OK Logged in\r\na2 NO [NONEXISTENT] Unknown Mailbox\r\n");
        let store = connector(Credential::Password("secret".into()))
            .establish(imap::Client::new(stream))
            .unwrap();
        assert_eq!(store.selected(), None);
    }
}
