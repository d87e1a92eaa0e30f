//! From a validated payload to a displayed notification plus its pending
//! actions.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capabilities::{PresentationError, Presenter};
use crate::payload::{ActionDescriptor, InterruptionLevel, NotificationPayload};
use crate::registry::{ActionRegistry, PendingAction};

/// Typical platform limit on action buttons per notification.
pub const MAX_ACTIONS: usize = 4;
pub const CATEGORY_PREFIX: &str = "ACTIONABLE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundRef {
    Default,
    Named(String),
}

impl SoundRef {
    /// Absent or blank means the default sound; a path is reduced to its
    /// file name, which is how system sounds are looked up by name.
    pub fn from_payload(sound: Option<&str>) -> Self {
        let Some(raw) = sound.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return SoundRef::Default;
        };
        let name = Path::new(raw)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(raw);
        SoundRef::Named(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionButton {
    pub id: String,
    pub label: String,
}

impl From<&ActionDescriptor> for ActionButton {
    fn from(action: &ActionDescriptor) -> Self {
        Self {
            id: action.id.clone(),
            label: action.label.clone(),
        }
    }
}

/// A named bundle of action buttons a notification can refer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCategory {
    pub identifier: String,
    pub actions: Vec<ActionButton>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentableNotification {
    pub id: String,
    pub title: String,
    pub body: String,
    pub subtitle: Option<String>,
    pub sound: SoundRef,
    pub thread_id: Option<String>,
    pub interruption_level: InterruptionLevel,
    pub category: Option<String>,
}

#[derive(Clone)]
pub struct NotificationManager {
    presenter: Arc<dyn Presenter>,
    registry: ActionRegistry,
}

impl NotificationManager {
    pub fn new(presenter: Arc<dyn Presenter>, registry: ActionRegistry) -> Self {
        Self {
            presenter,
            registry,
        }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Present `payload` and arm its actions. Returns the notification id.
    ///
    /// Completes once the presentation surface has accepted the
    /// notification; display itself happens asynchronously.
    pub async fn show_notification(
        &self,
        payload: NotificationPayload,
    ) -> Result<String, PresentationError> {
        let notification_id = Uuid::new_v4().to_string();
        let NotificationPayload {
            title,
            message,
            subtitle,
            group,
            sound,
            interruption_level,
            mut actions,
        } = payload;

        if actions.len() > MAX_ACTIONS {
            debug!(
                %notification_id,
                dropped = actions.len() - MAX_ACTIONS,
                "truncating actions to platform limit"
            );
            actions.truncate(MAX_ACTIONS);
        }

        let category = if actions.is_empty() {
            None
        } else {
            Some(ActionCategory {
                identifier: format!("{CATEGORY_PREFIX}-{notification_id}"),
                actions: actions.iter().map(ActionButton::from).collect(),
            })
        };

        if let Some(category) = &category {
            self.presenter.register_category(category).await?;
        }

        let notification = PresentableNotification {
            id: notification_id.clone(),
            title,
            body: message,
            subtitle,
            sound: SoundRef::from_payload(sound.as_deref()),
            thread_id: group,
            interruption_level,
            category: category.map(|category| category.identifier),
        };

        let action_ids: Vec<String> = actions.iter().map(|action| action.id.clone()).collect();
        for action in actions {
            self.registry
                .register(PendingAction::from_descriptor(action, &notification_id));
        }

        if let Err(err) = self.presenter.submit(notification).await {
            for id in &action_ids {
                self.registry.remove_owned(id, &notification_id);
            }
            warn!(%notification_id, "presentation failed: {}", err);
            return Err(err);
        }

        info!(
            %notification_id,
            actions = action_ids.len(),
            level = interruption_level.as_str(),
            "notification submitted"
        );
        Ok(notification_id)
    }
}
