//! Mailboxes (answerboxes) and non-owning references to them

use crate::notification::Notification;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MailboxId(Uuid);

impl MailboxId {
    /// Creates a new random mailbox ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a mailbox ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MailboxId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mailbox({})", self.0)
    }
}

/// Why a notification could not be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The mailbox has been torn down
    #[error("mailbox is gone")]
    Gone,

    /// The owner closed the mailbox
    #[error("mailbox is closed")]
    Closed,

    /// The mailbox is at capacity
    #[error("mailbox is full")]
    Full,
}

#[derive(Debug)]
struct MailboxState {
    queue: VecDeque<Notification>,
    closed: bool,
}

/// Bounded notification queue owned by a receiving task
#[derive(Debug)]
pub struct Mailbox {
    id: MailboxId,
    capacity: usize,
    state: spin::Mutex<MailboxState>,
}

impl Mailbox {
    /// Creates a mailbox holding at most `capacity` notifications
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            id: MailboxId::new(),
            capacity,
            state: spin::Mutex::new(MailboxState {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
            }),
        })
    }

    /// Returns the mailbox ID
    pub fn id(&self) -> MailboxId {
        self.id
    }

    /// Returns the configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a non-owning reference for notification senders
    pub fn downgrade(self: &Arc<Self>) -> MailboxRef {
        MailboxRef {
            id: self.id,
            inner: Arc::downgrade(self),
        }
    }

    /// Enqueues a notification without blocking
    pub fn try_deliver(&self, notification: Notification) -> Result<(), DeliveryError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(DeliveryError::Closed);
        }
        if state.queue.len() >= self.capacity {
            return Err(DeliveryError::Full);
        }
        state.queue.push_back(notification);
        Ok(())
    }

    /// Takes the oldest pending notification
    pub fn receive(&self) -> Option<Notification> {
        self.state.lock().queue.pop_front()
    }

    /// Takes every pending notification, oldest first
    pub fn drain(&self) -> Vec<Notification> {
        self.state.lock().queue.drain(..).collect()
    }

    /// Stops accepting notifications; pending ones stay receivable
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Returns whether the mailbox was closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Returns the number of pending notifications
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Returns whether no notification is pending
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }
}

/// Non-owning reference to a [`Mailbox`]
///
/// Holding one does not keep the mailbox alive.
#[derive(Debug, Clone)]
pub struct MailboxRef {
    id: MailboxId,
    inner: Weak<Mailbox>,
}

impl MailboxRef {
    /// Returns the ID of the referenced mailbox
    pub fn id(&self) -> MailboxId {
        self.id
    }

    /// Returns the mailbox if it still exists
    pub fn upgrade(&self) -> Option<Arc<Mailbox>> {
        self.inner.upgrade()
    }

    /// Returns whether the mailbox still exists and accepts notifications
    pub fn is_reachable(&self) -> bool {
        self.upgrade().is_some_and(|mailbox| !mailbox.is_closed())
    }

    /// Delivers a notification if the mailbox still exists
    pub fn send(&self, notification: Notification) -> Result<(), DeliveryError> {
        let mailbox = self.upgrade().ok_or(DeliveryError::Gone)?;
        mailbox.try_deliver(notification)
    }
}
