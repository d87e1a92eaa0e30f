//! Loopback notification relay.
//!
//! Local clients POST a JSON notification to `127.0.0.1`, authenticated with
//! a bearer token kept in a per-user file. The relay presents it through a
//! [`capabilities::Presenter`] and arms its action buttons; when the user
//! later clicks one, the [`dispatch::ActionDispatcher`] opens a location or
//! runs a command exactly once.

pub mod capabilities;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod framer;
pub mod manager;
pub mod notify;
pub mod payload;
pub mod registry;
pub mod response;
pub mod router;
pub mod server;
pub mod testing;
pub mod token;

pub use capabilities::{LocationOpener, PresentationError, Presenter, ProcessSpawner};
pub use config::{load_file_config, resolve_config, ConfigOverrides, FileConfig, RelayConfig};
pub use dispatch::{
    interaction_channel, spawn_interaction_loop, ActionDispatcher, DispatchOutcome,
    InteractionEvent, Location,
};
pub use error::RelayError;
pub use framer::{FrameLimits, RawRequest, RequestFramer};
pub use manager::{ActionCategory, NotificationManager, PresentableNotification, SoundRef};
pub use notify::NotifyHandler;
pub use payload::{ActionDescriptor, ActionKind, InterruptionLevel, NotificationPayload};
pub use registry::{ActionRegistry, PendingAction};
pub use response::Response;
pub use router::{Route, Router};
pub use server::RelayServer;
pub use token::{AuthToken, TokenStore};
