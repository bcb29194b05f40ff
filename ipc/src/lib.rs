//! # Inter-Process Communication (IPC)
//!
//! The slice of the messaging layer that interrupt notifications are
//! handed to.
//!
//! ## Architecture
//!
//! - A [`Mailbox`] (answerbox) is a bounded queue owned by the receiving
//!   task. It is created and torn down by its owner.
//! - A [`MailboxRef`] is a non-owning reference to a mailbox. Interrupt
//!   entries hold one; the mailbox may disappear underneath it.
//! - A [`Notification`] is the asynchronous message: a method id plus a
//!   fixed number of argument words.
//!
//! Delivery never blocks. A full, closed or vanished mailbox makes
//! delivery fail immediately and the sender decides what to do.

pub mod mailbox;
pub mod notification;

pub use mailbox::{DeliveryError, Mailbox, MailboxId, MailboxRef};
pub use notification::{MethodId, Notification, NOTIFY_ARGS};
