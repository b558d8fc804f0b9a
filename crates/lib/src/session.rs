//! Conversation session for the relay.
//!
//! One session per store: opened against `POST /conversations`, holding the
//! service-assigned conversation id and the poll cursor for that conversation.

use crate::codec::{self, CodecError};
use crate::connection::{Connection, TransportError};
use std::collections::HashSet;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("direct line secret not configured")]
    MissingSecret,
    #[error("start conversation failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("start conversation timed out")]
    Timeout,
    #[error("start conversation failed: {status} {body}")]
    Api { status: u16, body: String },
    #[error("start conversation response: {0}")]
    Parse(#[from] CodecError),
    #[error("service returned an empty conversation id")]
    EmptyConversationId,
}

impl SessionError {
    /// Connect failures, timeouts and 5xx responses; worth one more attempt.
    fn is_transient(&self) -> bool {
        match self {
            SessionError::Request(_) | SessionError::Timeout => true,
            SessionError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout(_) => SessionError::Timeout,
            TransportError::Request(e) => SessionError::Request(e),
        }
    }
}

/// An open conversation. The id never changes once assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub conversation_id: String,
    pub started: bool,
    /// Direct Line watermark of the last poll, if the service sent one.
    pub watermark: Option<String>,
    /// Set once the service accepted the conversationUpdate that requests the greeting.
    pub greeted: bool,
}

/// Holds the current session and the activity ids of the latest poll batch.
pub struct SessionStore {
    connection: Connection,
    session: Option<Session>,
    seen: HashSet<String>,
}

impl SessionStore {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            session: None,
            seen: HashSet::new(),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Start a conversation, or return the current one without a request.
    /// A transient failure is retried once before it is returned.
    pub async fn open(&mut self) -> Result<Session, SessionError> {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }
        if !self.connection.has_secret() {
            return Err(SessionError::MissingSecret);
        }
        let conversation_id = match self.request_conversation().await {
            Err(e) if e.is_transient() => {
                log::warn!("start conversation failed ({}), retrying once", e);
                self.request_conversation().await?
            }
            other => other?,
        };
        let session = Session {
            conversation_id,
            started: true,
            watermark: None,
            greeted: false,
        };
        log::info!("conversation started: {}", session.conversation_id);
        self.seen.clear();
        self.session = Some(session.clone());
        Ok(session)
    }

    async fn request_conversation(&self) -> Result<String, SessionError> {
        let url = self.connection.conversations_url();
        log::debug!("POST {}", url);
        let res = self
            .connection
            .execute(self.connection.post(&url).body(""))
            .await?;
        if !res.is_success() {
            return Err(SessionError::Api {
                status: res.status.as_u16(),
                body: res.body_text(),
            });
        }
        let conversation = codec::decode_conversation(&res.body)?;
        let id = conversation.conversation_id.trim().to_string();
        if id.is_empty() {
            return Err(SessionError::EmptyConversationId);
        }
        Ok(id)
    }

    pub fn current(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.conversation_id.as_str())
    }

    pub fn watermark(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.watermark.as_deref())
    }

    /// Store the cursor from the latest poll. Ignored when no session is open.
    pub fn advance_watermark(&mut self, watermark: Option<String>) {
        if let (Some(session), Some(w)) = (self.session.as_mut(), watermark) {
            session.watermark = Some(w);
        }
    }

    pub fn mark_greeted(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.greeted = true;
        }
    }

    /// True if the id was in the previous poll batch.
    pub fn is_seen(&self, activity_id: &str) -> bool {
        self.seen.contains(activity_id)
    }

    /// Replace the remembered ids with those of the latest batch. With a watermark the service
    /// only replays within that window, so older ids are not kept.
    pub fn remember_batch(&mut self, ids: impl IntoIterator<Item = String>) {
        self.seen = ids.into_iter().collect();
    }

    /// Abandon the session; the next `open` starts a new conversation.
    pub fn reset(&mut self) {
        if let Some(s) = self.session.take() {
            log::info!("conversation abandoned: {}", s.conversation_id);
        }
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectLineConfig;

    fn store(secret: Option<&str>) -> SessionStore {
        let config = DirectLineConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            secret: secret.map(String::from),
            ..DirectLineConfig::default()
        };
        SessionStore::new(Connection::new(&config))
    }

    #[tokio::test]
    async fn open_without_secret_fails_before_any_request() {
        let mut s = store(None);
        assert!(matches!(s.open().await, Err(SessionError::MissingSecret)));
        assert!(s.current().is_none());
    }

    #[test]
    fn cursor_is_ignored_without_session() {
        let mut s = store(Some("ABC"));
        s.advance_watermark(Some("3".to_string()));
        assert!(s.watermark().is_none());
        assert!(s.conversation_id().is_none());
    }

    #[test]
    fn seen_ids_cover_only_the_latest_batch() {
        let mut s = store(Some("ABC"));
        s.remember_batch(vec!["c|1".to_string(), "c|2".to_string()]);
        assert!(s.is_seen("c|1"));
        s.remember_batch(vec!["c|3".to_string()]);
        assert!(!s.is_seen("c|1"));
        assert!(s.is_seen("c|3"));
        s.reset();
        assert!(!s.is_seen("c|3"));
    }

    #[test]
    fn greeted_needs_a_session() {
        let mut s = store(Some("ABC"));
        s.mark_greeted();
        assert!(s.current().is_none());
    }

    #[test]
    fn transient_classification() {
        assert!(SessionError::Timeout.is_transient());
        assert!(SessionError::Api { status: 502, body: String::new() }.is_transient());
        assert!(!SessionError::Api { status: 403, body: String::new() }.is_transient());
        assert!(!SessionError::EmptyConversationId.is_transient());
    }
}
