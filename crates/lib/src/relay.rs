//! Relay client: session start, activity submission and reply polling against Direct Line.
//!
//! States move `Idle → SessionPending → SessionReady → Sending → AwaitingReply → SessionReady`.
//! One request chain runs at a time; a call that finds the chain taken fails with
//! [`RelayError::Busy`]. Failures while sending or polling leave the client in
//! `SessionReady` so the caller can resubmit.

use crate::codec::{self, Activity, ActivityType, ChannelAccount, CodecError};
use crate::config::DirectLineConfig;
use crate::connection::{Connection, TransportError};
use crate::playback::PlaybackDispatcher;
use crate::session::{SessionError, SessionStore};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    SessionPending,
    SessionReady,
    Sending,
    AwaitingReply,
}

impl RelayState {
    fn as_u8(self) -> u8 {
        match self {
            RelayState::Idle => 0,
            RelayState::SessionPending => 1,
            RelayState::SessionReady => 2,
            RelayState::Sending => 3,
            RelayState::AwaitingReply => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => RelayState::SessionPending,
            2 => RelayState::SessionReady,
            3 => RelayState::Sending,
            4 => RelayState::AwaitingReply,
            _ => RelayState::Idle,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("session not ready")]
    Precedence,
    #[error("relay busy: another request is in flight")]
    Busy,
    #[error("bot service request timed out")]
    Timeout,
    #[error("bot service unreachable: {0}")]
    NetworkFailure(#[source] reqwest::Error),
    #[error("bot service error: {status} {body}")]
    Api { status: u16, body: String },
    #[error(transparent)]
    Session(SessionError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<TransportError> for RelayError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout(_) => RelayError::Timeout,
            TransportError::Request(e) => RelayError::NetworkFailure(e),
        }
    }
}

impl From<SessionError> for RelayError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Timeout => RelayError::Timeout,
            other => RelayError::Session(other),
        }
    }
}

/// Puts the state back to `fallback` when dropped, unless disarmed. Covers callers
/// dropping a request future mid-flight (`timeout`, `select!`).
struct StateGuard<'a> {
    state: &'a AtomicU8,
    fallback: RelayState,
    armed: bool,
}

impl<'a> StateGuard<'a> {
    fn new(state: &'a AtomicU8, fallback: RelayState) -> Self {
        Self {
            state,
            fallback,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let prev = self.state.swap(self.fallback.as_u8(), Ordering::SeqCst);
            if prev != self.fallback.as_u8() {
                log::debug!(
                    "relay state {:?} -> {:?}",
                    RelayState::from_u8(prev),
                    self.fallback
                );
            }
        }
    }
}

/// Client for one conversation with a Direct Line bot.
pub struct RelayClient {
    store: Mutex<SessionStore>,
    state: AtomicU8,
    from: ChannelAccount,
    channel_id: String,
    dispatcher: Arc<dyn PlaybackDispatcher>,
}

impl RelayClient {
    pub fn new(config: &DirectLineConfig, dispatcher: Arc<dyn PlaybackDispatcher>) -> Self {
        Self::with_connection(Connection::new(config), config, dispatcher)
    }

    pub fn with_connection(
        connection: Connection,
        config: &DirectLineConfig,
        dispatcher: Arc<dyn PlaybackDispatcher>,
    ) -> Self {
        let id = config
            .user_id
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("user-{}", uuid::Uuid::new_v4()));
        Self {
            store: Mutex::new(SessionStore::new(connection)),
            state: AtomicU8::new(RelayState::Idle.as_u8()),
            from: ChannelAccount {
                id,
                name: Some(config.user_name.clone()),
            },
            channel_id: config.channel_id.clone(),
            dispatcher,
        }
    }

    pub fn state(&self) -> RelayState {
        RelayState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: RelayState) {
        let prev = RelayState::from_u8(self.state.swap(state.as_u8(), Ordering::SeqCst));
        if prev != state {
            log::debug!("relay state {:?} -> {:?}", prev, state);
        }
    }

    /// `from` account stamped on outgoing activities.
    pub fn user(&self) -> &ChannelAccount {
        &self.from
    }

    /// Current conversation id; waits for an in-flight request chain to finish.
    pub async fn conversation_id(&self) -> Option<String> {
        self.store.lock().await.conversation_id().map(String::from)
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionStore>, RelayError> {
        self.store.try_lock().map_err(|_| RelayError::Busy)
    }

    /// Open the conversation and fetch the bot's greeting. Returns the conversation id;
    /// when a session exists and its conversationUpdate was accepted, no request is made.
    pub async fn start_conversation(&self) -> Result<String, RelayError> {
        let mut store = self.lock()?;
        self.ensure_session(&mut store).await
    }

    /// Post one activity. Fails with `Precedence` (and sends nothing) when no session is open.
    /// Returns the activity id from the service's acknowledgement, if any.
    pub async fn submit(&self, text: &str, typ: ActivityType) -> Result<Option<String>, RelayError> {
        let mut store = self.lock()?;
        self.submit_locked(&mut store, text, typ).await
    }

    /// Fetch new activities and dispatch each reply's text in service order.
    /// Returns the number of replies dispatched.
    pub async fn poll(&self) -> Result<usize, RelayError> {
        let mut store = self.lock()?;
        self.poll_locked(&mut store).await
    }

    /// Send a user utterance: starts the conversation on first use, then submits and polls.
    pub async fn send_message(&self, text: &str) -> Result<usize, RelayError> {
        let mut store = self.lock()?;
        self.ensure_session(&mut store).await?;
        self.submit_locked(&mut store, text, ActivityType::Message).await?;
        self.poll_locked(&mut store).await
    }

    /// Abandon the conversation and return to `Idle`.
    pub fn reset(&self) -> Result<(), RelayError> {
        let mut store = self.lock()?;
        store.reset();
        self.set_state(RelayState::Idle);
        Ok(())
    }

    async fn ensure_session(&self, store: &mut SessionStore) -> Result<String, RelayError> {
        let existing = store
            .current()
            .map(|s| (s.conversation_id.clone(), s.greeted));
        let conversation_id = match existing {
            Some((id, true)) => return Ok(id),
            Some((id, false)) => id,
            None => {
                self.set_state(RelayState::SessionPending);
                let pending = StateGuard::new(&self.state, RelayState::Idle);
                let session = store.open().await?;
                pending.disarm();
                self.set_state(RelayState::SessionReady);
                session.conversation_id
            }
        };
        // The service expects a conversationUpdate before it sends its greeting;
        // it is resent on later calls until one is accepted.
        self.submit_locked(store, "", ActivityType::ConversationUpdate)
            .await?;
        store.mark_greeted();
        self.poll_locked(store).await?;
        Ok(conversation_id)
    }

    async fn submit_locked(
        &self,
        store: &mut SessionStore,
        text: &str,
        typ: ActivityType,
    ) -> Result<Option<String>, RelayError> {
        let Some(conversation_id) = store.conversation_id().map(String::from) else {
            return Err(RelayError::Precedence);
        };
        self.set_state(RelayState::Sending);
        let sending = StateGuard::new(&self.state, RelayState::SessionReady);
        let activity = Activity::new(
            self.from.clone(),
            conversation_id,
            text,
            typ,
            self.channel_id.as_str(),
        );
        match post_activity(store.connection(), &activity).await {
            Ok(id) => {
                sending.disarm();
                self.set_state(RelayState::AwaitingReply);
                Ok(id)
            }
            Err(e) => {
                log::debug!("send activity failed: {}", e);
                Err(e)
            }
        }
    }

    async fn poll_locked(&self, store: &mut SessionStore) -> Result<usize, RelayError> {
        let Some(conversation_id) = store.conversation_id().map(String::from) else {
            return Err(RelayError::Precedence);
        };
        self.set_state(RelayState::AwaitingReply);
        let _settle = StateGuard::new(&self.state, RelayState::SessionReady);
        self.fetch_and_dispatch(store, &conversation_id).await
    }

    async fn fetch_and_dispatch(
        &self,
        store: &mut SessionStore,
        conversation_id: &str,
    ) -> Result<usize, RelayError> {
        let connection = store.connection();
        let url = connection.activities_url(conversation_id);
        let mut req = connection.get(&url);
        if let Some(w) = store.watermark() {
            req = req.query(&[("watermark", w)]);
        }
        log::debug!("GET {} (watermark {:?})", url, store.watermark());
        let res = connection.execute(req).await?;
        if !res.is_success() {
            return Err(RelayError::Api {
                status: res.status.as_u16(),
                body: res.body_text(),
            });
        }
        let batch = codec::decode(&res.body)?;
        store.advance_watermark(batch.watermark.clone());

        let mut dispatched = 0;
        for activity in &batch.activities {
            if activity.from.as_ref().is_some_and(|f| f.id == self.from.id) {
                continue;
            }
            if activity.id.as_deref().is_some_and(|id| store.is_seen(id)) {
                continue;
            }
            let Some(text) = activity.text.as_deref() else {
                continue;
            };
            log::info!("bot reply: {}", text);
            self.dispatcher.dispatch(text);
            dispatched += 1;
        }
        store.remember_batch(batch.activities.iter().filter_map(|a| a.id.clone()));
        Ok(dispatched)
    }
}

async fn post_activity(
    connection: &Connection,
    activity: &Activity,
) -> Result<Option<String>, RelayError> {
    let url = connection.activities_url(&activity.conversation.id);
    let body = codec::encode(activity)?;
    log::debug!("POST {} type={:?}", url, activity.typ);
    let req = connection
        .post(&url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body);
    let res = connection.execute(req).await?;
    if !res.is_success() {
        return Err(RelayError::Api {
            status: res.status.as_u16(),
            body: res.body_text(),
        });
    }
    Ok(codec::decode_resource(&res.body)?.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ignore;

    impl PlaybackDispatcher for Ignore {
        fn dispatch(&self, _text: &str) {}
    }

    fn relay() -> RelayClient {
        let config = DirectLineConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            secret: Some("ABC".to_string()),
            user_id: Some("ASLBotId".to_string()),
            ..DirectLineConfig::default()
        };
        RelayClient::new(&config, Arc::new(Ignore))
    }

    #[tokio::test]
    async fn submit_before_open_is_a_precedence_error() {
        let r = relay();
        let err = r.submit("Hello", ActivityType::Message).await.unwrap_err();
        assert!(matches!(err, RelayError::Precedence));
        assert_eq!(r.state(), RelayState::Idle);
    }

    #[tokio::test]
    async fn poll_before_open_is_a_precedence_error() {
        let r = relay();
        assert!(matches!(r.poll().await, Err(RelayError::Precedence)));
    }

    #[tokio::test]
    async fn calls_while_chain_is_held_are_busy() {
        let r = relay();
        let _held = r.store.try_lock().unwrap();
        assert!(matches!(r.submit("x", ActivityType::Message).await, Err(RelayError::Busy)));
        assert!(matches!(r.send_message("x").await, Err(RelayError::Busy)));
        assert!(matches!(r.reset(), Err(RelayError::Busy)));
    }

    #[test]
    fn generated_user_id_when_unset() {
        let config = DirectLineConfig::default();
        let r = RelayClient::new(&config, Arc::new(Ignore));
        assert!(r.user().id.starts_with("user-"));
        assert_eq!(r.user().name.as_deref(), Some("Signbot User"));
    }

    #[test]
    fn session_timeout_maps_to_relay_timeout() {
        assert!(matches!(RelayError::from(SessionError::Timeout), RelayError::Timeout));
        assert!(matches!(
            RelayError::from(SessionError::MissingSecret),
            RelayError::Session(SessionError::MissingSecret)
        ));
    }

    #[test]
    fn state_guard_restores_unless_disarmed() {
        let state = AtomicU8::new(RelayState::AwaitingReply.as_u8());
        drop(StateGuard::new(&state, RelayState::SessionReady));
        assert_eq!(RelayState::from_u8(state.load(Ordering::SeqCst)), RelayState::SessionReady);

        state.store(RelayState::SessionPending.as_u8(), Ordering::SeqCst);
        StateGuard::new(&state, RelayState::Idle).disarm();
        assert_eq!(RelayState::from_u8(state.load(Ordering::SeqCst)), RelayState::SessionPending);
    }

    #[test]
    fn state_round_trips_through_atomic() {
        for s in [
            RelayState::Idle,
            RelayState::SessionPending,
            RelayState::SessionReady,
            RelayState::Sending,
            RelayState::AwaitingReply,
        ] {
            assert_eq!(RelayState::from_u8(s.as_u8()), s);
        }
    }
}
