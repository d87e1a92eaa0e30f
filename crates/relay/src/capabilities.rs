//! Narrow interfaces to the host desktop.
//!
//! The relay never renders, opens or spawns anything itself; the daemon
//! supplies platform adapters and tests use [`crate::testing`].

use std::io;

use async_trait::async_trait;
use thiserror::Error;

use crate::dispatch::Location;
use crate::manager::{ActionCategory, PresentableNotification};

#[derive(Debug, Clone, Error)]
pub enum PresentationError {
    #[error("presentation surface unavailable: {0}")]
    Unavailable(String),

    #[error("action category {category:?} rejected: {reason}")]
    CategoryRejected { category: String, reason: String },

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Whatever displays banners and action buttons.
///
/// `submit` must hand the notification off and return; it must not wait
/// for the user to see or dismiss it.
#[async_trait]
pub trait Presenter: Send + Sync {
    async fn register_category(&self, category: &ActionCategory) -> Result<(), PresentationError>;

    async fn submit(&self, notification: PresentableNotification) -> Result<(), PresentationError>;
}

/// "Open with the default handler". Must return without waiting on the
/// opened application.
pub trait LocationOpener: Send + Sync {
    fn open(&self, location: &Location) -> io::Result<()>;
}

/// Run a command with output discarded. May block until the process exits;
/// callers run it off the interaction path.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, command: &str, args: &[String]) -> io::Result<()>;
}
