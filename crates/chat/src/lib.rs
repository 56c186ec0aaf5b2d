//! Chat orchestration on top of the browser driver.
//!
//! [`ChatService`] is the entry point. It resolves a [`Session`] through the
//! [`SessionRegistry`], serializes exchanges per session with the
//! [`RequestSerializer`] and drives the tab with the [`ReplyExtractor`].

pub mod auth;
pub mod extractor;
pub mod registry;
pub mod serializer;
pub mod service;
pub mod session;
pub mod site;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use auth::LoginStatus;
pub use extractor::{Exchange, ReplyExtractor};
pub use registry::SessionRegistry;
pub use serializer::RequestSerializer;
pub use service::{ChatReply, ChatService, ChatTimeouts};
pub use session::{Session, SessionInfo, SessionState};
pub use site::SiteProfile;
