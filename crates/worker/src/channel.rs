//! Synchronous endpoint for threads that are not objects.
//!
//! A [`Channel`] owns an address and a mailbox like any object, but the
//! thread holding it pulls explicitly. [`Channel::select`] waits for a chosen
//! set of message types, deferring or dropping everything else, with an
//! optional timeout armed through the timer service.

use std::time::Duration;

use crate::address::Address;
use crate::envelope::Envelope;
use crate::mailbox::{MailboxReceiver, MailboxSender};
use crate::message::{Message, MessageType};
use crate::replay::{Deferral, ReplayBuffer};
use crate::runtime::Runtime;
use crate::timer::{CancelTimer, SelectTimer, StartTimer, TimerKind};

/// What [`Channel::select`] and [`Context::select`](crate::Context::select)
/// keep for later instead of dropping.
#[derive(Debug, Clone, Copy)]
pub enum Saving<'a> {
	/// Drop every unmatched message.
	Nothing,
	/// Defer every unmatched message.
	Any,
	/// Defer unmatched messages of these types or their subtypes.
	Only(&'a [MessageType]),
}

impl Saving<'_> {
	fn covers(&self, message: &dyn Message) -> bool {
		match self {
			Self::Nothing => false,
			Self::Any => true,
			Self::Only(types) => types.iter().any(|ty| message.is_kind_of(*ty)),
		}
	}
}

pub struct Channel {
	runtime: Runtime,
	address: Address,
	sender: MailboxSender<Envelope>,
	receiver: MailboxReceiver<Envelope>,
	buffer: ReplayBuffer,
}

impl Channel {
	pub(crate) fn new(runtime: Runtime, address: Address, sender: MailboxSender<Envelope>, receiver: MailboxReceiver<Envelope>) -> Self {
		let buffer = ReplayBuffer::new(runtime.config().replay.maximum_replays);
		Self {
			runtime,
			address,
			sender,
			receiver,
			buffer,
		}
	}

	pub fn address(&self) -> &Address {
		&self.address
	}

	pub fn runtime(&self) -> &Runtime {
		&self.runtime
	}

	/// Sends with this channel as the return address.
	pub fn send(&self, message: impl Message, to: &Address) {
		self.runtime.send(message, to, &self.address);
	}

	pub fn start_timer(&self, kind: TimerKind, period: Duration, repeating: bool) {
		self.send(StartTimer { kind, period, repeating }, self.runtime.timer_address());
	}

	pub fn cancel_timer(&self, kind: TimerKind) {
		self.send(CancelTimer { kind }, self.runtime.timer_address());
	}

	/// Next envelope: pending replays first, otherwise blocks for a fresh one.
	/// Returns `None` once the runtime has shut down.
	pub fn input(&mut self) -> Option<Envelope> {
		self.buffer.pull(&self.receiver)
	}

	/// Defers the envelope most recently returned by [`input`](Self::input).
	pub fn save(&mut self, envelope: Envelope) -> Deferral {
		self.buffer.defer(envelope)
	}

	/// Blocks until a message of one of `matching` (or a subtype) arrives.
	///
	/// Unmatched messages covered by `saving` are deferred; the rest are
	/// logged and dropped. With a `timeout`, a [`SelectTimer`] is armed and
	/// returned like any matched message if it fires first. Periods below the
	/// timer service's minimum fire on the service's next turn.
	pub fn select(&mut self, matching: &[MessageType], saving: Saving<'_>, timeout: Option<Duration>) -> Option<Envelope> {
		Selection {
			runtime: &self.runtime,
			address: &self.address,
			buffer: &mut self.buffer,
			receiver: &self.receiver,
		}
		.select(matching, saving, timeout)
	}

	/// Sends `message` to `to` and waits for a reply of one of `matching`,
	/// keeping everything else for later.
	pub fn ask(&mut self, message: impl Message, to: &Address, matching: &[MessageType], timeout: Option<Duration>) -> Option<Envelope> {
		self.send(message, to);
		self.select(matching, Saving::Any, timeout)
	}
}

/// One mailbox consumer waiting on [`select`](Selection::select).
///
/// Envelopes for other destinations sharing the mailbox are held aside and
/// put back at the head of the replay queue once the wait ends.
pub(crate) struct Selection<'a> {
	pub(crate) runtime: &'a Runtime,
	pub(crate) address: &'a Address,
	pub(crate) buffer: &'a mut ReplayBuffer,
	pub(crate) receiver: &'a MailboxReceiver<Envelope>,
}

impl Selection<'_> {
	pub(crate) fn select(self, matching: &[MessageType], saving: Saving<'_>, timeout: Option<Duration>) -> Option<Envelope> {
		let timer = TimerKind::of::<SelectTimer>();
		let timers = self.runtime.timer_address();
		if let Some(period) = timeout {
			self.runtime.send(StartTimer { kind: timer, period, repeating: false }, timers, self.address);
		}
		let mut held = Vec::new();
		let selected = loop {
			let Some(envelope) = self.buffer.pull(self.receiver) else {
				break None;
			};
			if envelope.to() != self.address {
				held.push(envelope);
				continue;
			}
			if timeout.is_some() && envelope.is::<SelectTimer>() {
				break Some(envelope);
			}
			if matching.iter().any(|ty| envelope.message().is_kind_of(*ty)) {
				if timeout.is_some() {
					self.runtime.send(CancelTimer { kind: timer }, timers, self.address);
				}
				break Some(envelope);
			}
			if saving.covers(envelope.message()) {
				self.buffer.defer(envelope);
			} else {
				tracing::debug!(
					to = %self.address,
					from = %envelope.return_address(),
					kind = %envelope.message_type(),
					reason = "not selected",
					"dropped"
				);
			}
		};
		self.buffer.restore(held);
		selected
	}
}

impl Drop for Channel {
	fn drop(&mut self) {
		self.runtime.unregister(&self.address);
		self.sender.close();
	}
}
