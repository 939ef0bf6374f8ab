//! Message passing and timing for thread-bound objects.
//!
//! Objects receive messages one at a time on the thread they are bound to.
//! Each thread pulls from a bounded [`Mailbox`] through a [`ReplayBuffer`],
//! which lets a handler defer the current message until something new
//! arrives. Dispatch is table-driven, either flat ([`DispatchTable`]) or per
//! state ([`MachineTable`]) with declarative save-for-later. A per-runtime
//! timer service delivers delayed self-messages.

/// Hierarchical object addresses.
pub mod address;
/// Synchronous endpoint for non-object threads.
pub mod channel;
mod class;
/// Runtime configuration.
pub mod config;
mod context;
/// Stateless handler tables.
pub mod dispatch;
/// Messages in flight.
pub mod envelope;
/// Runtime and configuration errors.
pub mod error;
/// State-machine handler tables.
pub mod machine;
/// Bounded blocking queues.
pub mod mailbox;
/// Message typing.
pub mod message;
mod object;
mod registry;
/// Deferral and replay over one mailbox.
pub mod replay;
mod runtime;
mod spawn;
/// The timer service.
pub mod timer;

pub use address::Address;
pub use channel::{Channel, Saving};
pub use config::{MailboxConfig, ReplayConfig, RuntimeConfig, TimerConfig};
pub use context::Context;
pub use dispatch::{DispatchBuilder, DispatchTable, Stateless};
pub use envelope::{Envelope, Header};
pub use error::{ConfigError, RuntimeError};
pub use machine::{MachineBuilder, MachineError, MachineTable, Scope, StateMachine, Transitions};
pub use mailbox::{Mailbox, MailboxPolicy, MailboxReceiver, MailboxSendError, MailboxSendOutcome, MailboxSender, MailboxSpec};
pub use message::{Completed, Message, MessageType, Start, Stop, Unknown, downcast};
pub use object::Object;
pub use replay::{Deferral, MAXIMUM_REPLAYS, ReplayBuffer};
pub use runtime::Runtime;
pub use timer::{ArmedTimer, CancelTimer, Expired, SelectTimer, StartTimer, T1, T2, T3, T4, Tick, TimerKind, TimerService};
