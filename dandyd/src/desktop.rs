//! Host desktop adapters for the relay capabilities.
//!
//! Linux uses `notify-send` (libnotify) and `xdg-open`; macOS uses
//! `osascript` and `open`. Everything shells out, so a missing tool surfaces
//! as a spawn error rather than a link failure.

use std::collections::HashMap;
use std::io;
use std::process::{Command as StdCommand, Stdio};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use dandy_relay::manager::ActionButton;
use dandy_relay::{
    ActionCategory, InteractionEvent, InterruptionLevel, Location, LocationOpener,
    PresentableNotification, PresentationError, Presenter, ProcessSpawner, SoundRef,
};

const APP_NAME: &str = "dandy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    NotifySend,
    Osascript,
}

pub struct CommandPresenter {
    backend: Backend,
    categories: Mutex<HashMap<String, Vec<ActionButton>>>,
    interactions: mpsc::Sender<InteractionEvent>,
}

impl CommandPresenter {
    pub fn detect(interactions: mpsc::Sender<InteractionEvent>) -> Self {
        let backend = if cfg!(target_os = "macos") {
            Backend::Osascript
        } else {
            Backend::NotifySend
        };
        Self {
            backend,
            categories: Mutex::new(HashMap::new()),
            interactions,
        }
    }

    fn submit_notify_send(
        &self,
        notification: PresentableNotification,
        actions: Vec<ActionButton>,
    ) -> Result<(), PresentationError> {
        let args = notify_send_args(&notification, &actions);
        let mut command = Command::new("notify-send");
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let child = command
            .spawn()
            .map_err(|err| PresentationError::Unavailable(format!("notify-send: {err}")))?;

        let notification_id = notification.id;
        let interactions = self.interactions.clone();
        tokio::spawn(async move {
            let output = match child.wait_with_output().await {
                Ok(output) => output,
                Err(err) => {
                    warn!(%notification_id, "notify-send did not complete: {}", err);
                    return;
                }
            };
            if !output.status.success() {
                warn!(%notification_id, status = %output.status, "notify-send failed");
                return;
            }
            if actions.is_empty() {
                return;
            }

            let reported = String::from_utf8_lossy(&output.stdout);
            let Some(action_id) = chosen_action(&actions, &reported) else {
                debug!(%notification_id, "notification closed without action");
                return;
            };
            let event = InteractionEvent::for_notification(notification_id, action_id);
            if interactions.send(event).await.is_err() {
                debug!("interaction loop stopped; dropping event");
            }
        });
        Ok(())
    }

    fn submit_osascript(&self, notification: PresentableNotification) -> Result<(), PresentationError> {
        let mut child = Command::new("osascript")
            .arg("-e")
            .arg(osascript_source(&notification))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| PresentationError::Unavailable(format!("osascript: {err}")))?;

        let notification_id = notification.id;
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => warn!(%notification_id, %status, "osascript failed"),
                Err(err) => warn!(%notification_id, "osascript did not complete: {}", err),
            }
        });
        Ok(())
    }

    fn take_category(&self, identifier: Option<&str>) -> Vec<ActionButton> {
        let Some(identifier) = identifier else {
            return Vec::new();
        };
        self.categories
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(identifier)
            .unwrap_or_default()
    }
}

#[async_trait]
impl Presenter for CommandPresenter {
    async fn register_category(&self, category: &ActionCategory) -> Result<(), PresentationError> {
        if self.backend == Backend::Osascript {
            debug!(
                category = %category.identifier,
                "osascript notifications carry no buttons; actions stay pending"
            );
        }
        self.categories
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(category.identifier.clone(), category.actions.clone());
        Ok(())
    }

    async fn submit(&self, notification: PresentableNotification) -> Result<(), PresentationError> {
        let actions = self.take_category(notification.category.as_deref());
        match self.backend {
            Backend::NotifySend => self.submit_notify_send(notification, actions),
            Backend::Osascript => self.submit_osascript(notification),
        }
    }
}

fn urgency(level: InterruptionLevel) -> &'static str {
    match level {
        InterruptionLevel::Passive => "low",
        InterruptionLevel::Active => "normal",
        InterruptionLevel::TimeSensitive | InterruptionLevel::Critical => "critical",
    }
}

fn notify_send_args(notification: &PresentableNotification, actions: &[ActionButton]) -> Vec<String> {
    let mut args = vec![
        format!("--app-name={APP_NAME}"),
        format!("--urgency={}", urgency(notification.interruption_level)),
    ];
    if let SoundRef::Named(name) = &notification.sound {
        args.push(format!("--hint=string:sound-name:{name}"));
    }
    if let Some(thread) = &notification.thread_id {
        args.push(format!("--hint=string:x-dunst-stack-tag:{thread}"));
    }
    // notify-send splits on the first '=', so buttons are keyed by position
    // and mapped back with `chosen_action`.
    for (index, action) in actions.iter().enumerate() {
        args.push(format!("--action={}={}", index, action.label));
    }
    if !actions.is_empty() {
        args.push("--wait".to_string());
    }

    let body = match &notification.subtitle {
        Some(subtitle) => format!("{subtitle}\n{}", notification.body),
        None => notification.body.clone(),
    };
    args.push("--".to_string());
    args.push(notification.title.clone());
    args.push(body);
    args
}

/// Map notify-send's reported action key back to the action id.
fn chosen_action(actions: &[ActionButton], reported: &str) -> Option<String> {
    reported
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|index| actions.get(index))
        .map(|action| action.id.clone())
}

fn applescript_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

fn osascript_source(notification: &PresentableNotification) -> String {
    let mut script = format!(
        "display notification {} with title {}",
        applescript_string(&notification.body),
        applescript_string(&notification.title)
    );
    if let Some(subtitle) = &notification.subtitle {
        script.push_str(&format!(" subtitle {}", applescript_string(subtitle)));
    }
    let sound = match &notification.sound {
        SoundRef::Default => "default".to_string(),
        SoundRef::Named(name) => name
            .rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or_else(|| name.clone()),
    };
    script.push_str(&format!(" sound name {}", applescript_string(&sound)));
    script
}

/// `xdg-open` or `open`, detached. The child is reaped on a helper thread.
pub struct DesktopOpener {
    program: &'static str,
}

impl DesktopOpener {
    pub fn detect() -> Self {
        let program = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
        Self { program }
    }
}

impl LocationOpener for DesktopOpener {
    fn open(&self, location: &Location) -> io::Result<()> {
        let target = match location {
            Location::Url(url) => url.as_str().to_string(),
            Location::Path(path) => path.display().to_string(),
        };
        let mut child = StdCommand::new(self.program)
            .arg(&target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        std::thread::spawn(move || {
            if let Err(err) = child.wait() {
                debug!("failed to reap opener: {}", err);
            }
        });
        Ok(())
    }
}

/// Runs the command to completion with all stdio discarded.
pub struct DesktopSpawner;

impl ProcessSpawner for DesktopSpawner {
    fn spawn(&self, command: &str, args: &[String]) -> io::Result<()> {
        let status = StdCommand::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{command} exited with {status}"),
            ))
        }
    }
}
