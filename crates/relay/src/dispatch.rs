//! Turning user interaction with a notification into its deferred effect.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::capabilities::{LocationOpener, ProcessSpawner};
use crate::payload::ActionKind;
use crate::registry::ActionRegistry;

/// Reported when the notification body itself is clicked.
pub const DEFAULT_ACTION_ID: &str = "default";
/// Reported when the notification is dismissed.
pub const DISMISS_ACTION_ID: &str = "dismiss";

pub const INTERACTION_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionEvent {
    pub notification_id: Option<String>,
    pub action_id: String,
}

impl InteractionEvent {
    pub fn new(action_id: impl Into<String>) -> Self {
        Self {
            notification_id: None,
            action_id: action_id.into(),
        }
    }

    pub fn for_notification(notification_id: impl Into<String>, action_id: impl Into<String>) -> Self {
        Self {
            notification_id: Some(notification_id.into()),
            action_id: action_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Url(Url),
    Path(PathBuf),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Url(url) => write!(f, "{url}"),
            Location::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Scheme-qualified strings become URLs; everything else is a filesystem
/// path. Single-letter schemes are drive letters, not URLs.
pub fn resolve_location(raw: &str) -> Location {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(url) if url.scheme().len() > 1 => Location::Url(url),
        _ => Location::Path(PathBuf::from(trimmed)),
    }
}

#[derive(Debug)]
pub enum DispatchOutcome {
    /// Default tap, dismissal, unknown or already consumed id.
    Ignored,
    Opened(Location),
    OpenFailed(Location),
    /// The command runs on the blocking pool; the handle resolves when the
    /// spawner returns.
    ExecScheduled(JoinHandle<()>),
}

#[derive(Clone)]
pub struct ActionDispatcher {
    registry: ActionRegistry,
    opener: Arc<dyn LocationOpener>,
    spawner: Arc<dyn ProcessSpawner>,
}

impl ActionDispatcher {
    pub fn new(
        registry: ActionRegistry,
        opener: Arc<dyn LocationOpener>,
        spawner: Arc<dyn ProcessSpawner>,
    ) -> Self {
        Self {
            registry,
            opener,
            spawner,
        }
    }

    /// Consume the action named by `event` and run it.
    ///
    /// Must be called from within a tokio runtime: `exec` actions are moved
    /// to the blocking pool so a hanging command never stalls further
    /// interaction events.
    pub fn dispatch(&self, event: &InteractionEvent) -> DispatchOutcome {
        let action_id = event.action_id.as_str();
        let reported_by = event.notification_id.as_deref().unwrap_or("-");
        if action_id == DEFAULT_ACTION_ID || action_id == DISMISS_ACTION_ID {
            debug!(%action_id, %reported_by, "interaction without follow-up action");
            return DispatchOutcome::Ignored;
        }

        let Some(pending) = self.registry.consume(action_id) else {
            debug!(%action_id, %reported_by, "no pending action for interaction");
            return DispatchOutcome::Ignored;
        };
        if event
            .notification_id
            .as_deref()
            .is_some_and(|reported| reported != pending.notification_id)
        {
            // Ids are not scoped per notification; a later registration won.
            debug!(
                %action_id,
                %reported_by,
                owner = %pending.notification_id,
                "interaction reported by a notification that no longer owns the action"
            );
        }

        let notification_id = pending.notification_id;
        match pending.kind {
            ActionKind::Open { location } => {
                let target = resolve_location(&location);
                match self.opener.open(&target) {
                    Ok(()) => {
                        info!(%action_id, %notification_id, location = %target, "opened location");
                        DispatchOutcome::Opened(target)
                    }
                    Err(err) => {
                        warn!(%action_id, location = %target, "failed to open location: {}", err);
                        DispatchOutcome::OpenFailed(target)
                    }
                }
            }
            ActionKind::Exec { command, args } => {
                info!(%action_id, %notification_id, %command, "scheduling command");
                let spawner = self.spawner.clone();
                let action_id = action_id.to_string();
                let handle = tokio::task::spawn_blocking(move || {
                    if let Err(err) = spawner.spawn(&command, &args) {
                        warn!(%action_id, %command, "command failed to run: {}", err);
                    }
                });
                DispatchOutcome::ExecScheduled(handle)
            }
        }
    }
}

/// Channel carrying interaction events from the presentation surface.
pub fn interaction_channel() -> (mpsc::Sender<InteractionEvent>, mpsc::Receiver<InteractionEvent>) {
    mpsc::channel(INTERACTION_CHANNEL_CAPACITY)
}

/// Drain interaction events until every sender is dropped.
pub fn spawn_interaction_loop(
    dispatcher: ActionDispatcher,
    mut events: mpsc::Receiver<InteractionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            dispatcher.dispatch(&event);
        }
        debug!("interaction channel closed");
    })
}
