/// SASL `XOAUTH2` for bearer-token logins (Gmail, Outlook).
///
/// The initial response is `user=<login>^Aauth=Bearer <token>^A^A`; the `imap` client
/// base64-encodes it on the wire.
pub struct XOAuth2 {
    user: String,
    access_token: String,
}

impl XOAuth2 {
    pub const MECHANISM: &'static str = "XOAUTH2";

    pub fn new(user: impl Into<String>, access_token: impl Into<String>) -> Self {
        XOAuth2 {
            user: user.into(),
            access_token: access_token.into(),
        }
    }
}

impl imap::Authenticator for XOAuth2 {
    type Response = String;

    // The server only sends a challenge after a failure, and that challenge is answered with
    // the same response (which the server then rejects).
    fn process(&self, _challenge: &[u8]) -> Self::Response {
        format!(
            "user={}\x01auth=Bearer {}\x01\x01",
            self.user, self.access_token
        )
    }
}
