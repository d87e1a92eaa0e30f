//! In-memory capability fakes that record every call.

use std::io;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::capabilities::{LocationOpener, PresentationError, Presenter, ProcessSpawner};
use crate::dispatch::Location;
use crate::manager::{ActionCategory, PresentableNotification};

#[derive(Debug, Default)]
pub struct RecordingPresenter {
    categories: Mutex<Vec<ActionCategory>>,
    notifications: Mutex<Vec<PresentableNotification>>,
    submit_failure: Option<String>,
    reject_categories: bool,
}

impl RecordingPresenter {
    /// Accepts categories but fails every submission with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            submit_failure: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn rejecting_categories() -> Self {
        Self {
            reject_categories: true,
            ..Self::default()
        }
    }

    pub fn categories(&self) -> Vec<ActionCategory> {
        lock(&self.categories).clone()
    }

    pub fn notifications(&self) -> Vec<PresentableNotification> {
        lock(&self.notifications).clone()
    }
}

#[async_trait]
impl Presenter for RecordingPresenter {
    async fn register_category(&self, category: &ActionCategory) -> Result<(), PresentationError> {
        if self.reject_categories {
            return Err(PresentationError::CategoryRejected {
                category: category.identifier.clone(),
                reason: "categories disabled".to_string(),
            });
        }
        lock(&self.categories).push(category.clone());
        Ok(())
    }

    async fn submit(&self, notification: PresentableNotification) -> Result<(), PresentationError> {
        if let Some(reason) = &self.submit_failure {
            return Err(PresentationError::Rejected(reason.clone()));
        }
        lock(&self.notifications).push(notification);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingOpener {
    opened: Mutex<Vec<Location>>,
    fail: bool,
}

impl RecordingOpener {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> Vec<Location> {
        lock(&self.opened).clone()
    }
}

impl LocationOpener for RecordingOpener {
    fn open(&self, location: &Location) -> io::Result<()> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no handler for location"));
        }
        lock(&self.opened).push(location.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingSpawner {
    spawned: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingSpawner {
    pub fn spawned(&self) -> Vec<(String, Vec<String>)> {
        lock(&self.spawned).clone()
    }
}

impl ProcessSpawner for RecordingSpawner {
    fn spawn(&self, command: &str, args: &[String]) -> io::Result<()> {
        lock(&self.spawned).push((command.to_string(), args.to_vec()));
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
