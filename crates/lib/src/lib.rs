//! Signbot core library: Direct Line relay client, activity codec, session store and
//! gesture playback used by the Signbot front-ends.

pub mod codec;
pub mod config;
pub mod connection;
pub mod init;
pub mod playback;
pub mod relay;
pub mod session;

pub use codec::{Activity, ActivityBatch, ActivityType, CodecError, InboundActivity};
pub use playback::{AnimationMapping, GestureDispatcher, GesturePlayer, PlaybackDispatcher, ReplyDisplay};
pub use relay::{RelayClient, RelayError, RelayState};
pub use session::{Session, SessionError, SessionStore};
