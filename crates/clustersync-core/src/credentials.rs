// ── Credential source ──
//
// The sync layer never reaches for a global auth singleton. Components are
// handed a `CredentialSource`; `SessionCredentials` is the stock
// implementation, backed by a `watch` channel so holders can react when
// the token disappears (logout, expiry).

use secrecy::SecretString;
use tokio::sync::watch;

/// Supplies the bearer credential used for aggregator and live channel calls.
pub trait CredentialSource: Send + Sync {
    /// Current bearer token, if authenticated.
    fn token(&self) -> Option<SecretString>;

    fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

/// Observable session token.
///
/// Every change is broadcast to [`subscribe`](Self::subscribe)rs, which is
/// how the live channel learns that the credential went away.
#[derive(Debug)]
pub struct SessionCredentials {
    token: watch::Sender<Option<SecretString>>,
}

impl SessionCredentials {
    /// An unauthenticated session.
    pub fn new() -> Self {
        let (token, _) = watch::channel(None);
        Self { token }
    }

    /// A session that starts authenticated with `token`.
    pub fn with_token(token: SecretString) -> Self {
        let (token, _) = watch::channel(Some(token));
        Self { token }
    }

    /// Install or rotate the token.
    pub fn set_token(&self, token: SecretString) {
        self.token.send_replace(Some(token));
    }

    /// Drop the token (logout).
    pub fn clear(&self) {
        self.token.send_replace(None);
    }

    /// Watch token changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<SecretString>> {
        self.token.subscribe()
    }
}

impl Default for SessionCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialSource for SessionCredentials {
    fn token(&self) -> Option<SecretString> {
        self.token.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn new_session_is_unauthenticated() {
        let session = SessionCredentials::new();
        assert!(!session.is_authenticated());
        assert!(session.token().is_none());
    }

    #[test]
    fn set_and_clear_token() {
        let session = SessionCredentials::new();
        session.set_token(SecretString::from("abc".to_string()));
        assert!(session.is_authenticated());
        let token = session.token().map(|t| t.expose_secret().to_owned());
        assert_eq!(token.as_deref(), Some("abc"));

        session.clear();
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn subscribers_see_logout() {
        let session = SessionCredentials::with_token(SecretString::from("abc".to_string()));
        let mut rx = session.subscribe();
        session.clear();
        assert!(rx.changed().await.is_ok());
        assert!(rx.borrow().is_none());
    }
}
