//! Observer trait for manifest edit notifications
//!
//! Edit commands report every attribute they create or change, and every
//! capability they add, without knowing whether the host logs them, shows
//! them in a UI, or collects them for a report.

use std::sync::{Mutex, PoisonError};

/// A value written by an edit command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueChange {
    /// The value did not exist before.
    Created {
        /// Attribute or metadata key.
        key: String,
        /// Value written.
        value: String,
    },
    /// An existing value was overwritten.
    Changed {
        /// Attribute or metadata key.
        key: String,
        /// Value before the edit.
        old: String,
        /// Value after the edit.
        new: String,
    },
}

impl ValueChange {
    /// Build a creation or change record depending on whether a previous
    /// value existed.
    pub fn from_previous(key: &str, previous: Option<String>, value: &str) -> Self {
        match previous {
            Some(old) => Self::Changed {
                key: key.to_string(),
                old,
                new: value.to_string(),
            },
            None => Self::Created {
                key: key.to_string(),
                value: value.to_string(),
            },
        }
    }

    /// The key that was written.
    pub fn key(&self) -> &str {
        match self {
            Self::Created { key, .. } | Self::Changed { key, .. } => key,
        }
    }

    /// The value after the edit.
    pub fn new_value(&self) -> &str {
        match self {
            Self::Created { value, .. } => value,
            Self::Changed { new, .. } => new,
        }
    }
}

/// A capability inserted into `<Capabilities>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityAdded {
    /// Capability name, as given.
    pub name: String,
    /// Whether it was declared as a restricted capability.
    pub is_restricted: bool,
    /// Whether it was declared as a custom capability.
    pub is_custom: bool,
}

/// Receives edit notifications synchronously during command execution.
pub trait EditObserver: Send + Sync {
    /// An attribute or metadata value was created or changed.
    fn value_changed(&self, change: &ValueChange);

    /// A capability element was inserted.
    fn capability_added(&self, added: &CapabilityAdded);
}

impl<T: EditObserver + ?Sized> EditObserver for std::sync::Arc<T> {
    fn value_changed(&self, change: &ValueChange) {
        (**self).value_changed(change);
    }
    fn capability_added(&self, added: &CapabilityAdded) {
        (**self).capability_added(added);
    }
}

/// An observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl EditObserver for NullObserver {
    fn value_changed(&self, _: &ValueChange) {}
    fn capability_added(&self, _: &CapabilityAdded) {}
}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditEvent {
    /// See [`EditObserver::value_changed`].
    Value(ValueChange),
    /// See [`EditObserver::capability_added`].
    Capability(CapabilityAdded),
}

/// An observer that keeps every notification in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<EditEvent>>,
}

impl RecordingObserver {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far.
    pub fn events(&self) -> Vec<EditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Only the value changes, in order.
    pub fn value_changes(&self) -> Vec<ValueChange> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                EditEvent::Value(change) => Some(change),
                EditEvent::Capability(_) => None,
            })
            .collect()
    }

    fn push(&self, event: EditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl EditObserver for RecordingObserver {
    fn value_changed(&self, change: &ValueChange) {
        self.push(EditEvent::Value(change.clone()));
    }

    fn capability_added(&self, added: &CapabilityAdded) {
        self.push(EditEvent::Capability(added.clone()));
    }
}
