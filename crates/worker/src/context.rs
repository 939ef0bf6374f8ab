use std::time::Duration;

use crate::address::Address;
use crate::channel::{Saving, Selection};
use crate::envelope::{Envelope, Header};
use crate::error::RuntimeError;
use crate::mailbox::MailboxReceiver;
use crate::message::{Message, MessageType};
use crate::object::Object;
use crate::replay::{Deferral, ReplayBuffer};
use crate::runtime::Runtime;
use crate::timer::{CancelTimer, StartTimer, TimerKind};

/// Handler-side view of the runtime while one message is being dispatched.
pub struct Context<'a> {
	runtime: &'a Runtime,
	address: &'a Address,
	parent: &'a Address,
	header: Header,
	kind: MessageType,
	buffer: &'a mut ReplayBuffer,
	receiver: &'a MailboxReceiver<Envelope>,
	completed: bool,
}

impl<'a> Context<'a> {
	pub(crate) fn new(
		runtime: &'a Runtime,
		address: &'a Address,
		parent: &'a Address,
		header: Header,
		kind: MessageType,
		buffer: &'a mut ReplayBuffer,
		receiver: &'a MailboxReceiver<Envelope>,
	) -> Self {
		Self {
			runtime,
			address,
			parent,
			header,
			kind,
			buffer,
			receiver,
			completed: false,
		}
	}

	/// Address of the object handling the message.
	pub fn address(&self) -> &Address {
		self.address
	}

	/// Address of the object that created this one.
	pub fn parent(&self) -> &Address {
		self.parent
	}

	/// Where replies to the current message go.
	pub fn return_address(&self) -> &Address {
		&self.header.return_address
	}

	/// Times the current message has already been deferred.
	pub fn replays(&self) -> u32 {
		self.header.replays
	}

	pub fn runtime(&self) -> &Runtime {
		self.runtime
	}

	pub fn send(&self, message: impl Message, to: &Address) {
		self.runtime.send(message, to, self.address);
	}

	/// Sends to the return address of the current message.
	pub fn reply(&self, message: impl Message) {
		self.runtime.send(message, &self.header.return_address, self.address);
	}

	/// Sends on behalf of another address.
	pub fn forward(&self, message: impl Message, to: &Address, return_address: &Address) {
		self.runtime.send(message, to, return_address);
	}

	pub fn forward_boxed(&self, message: Box<dyn Message>, to: &Address, return_address: &Address) {
		self.runtime.send_boxed(message, to, return_address);
	}

	/// Sends to the parent.
	pub fn advise(&self, message: impl Message) {
		self.runtime.send(message, self.parent, self.address);
	}

	/// Creates a child object on its own thread.
	pub fn spawn(&self, object: impl Object) -> Result<Address, RuntimeError> {
		self.runtime.spawn(object, self.address)
	}

	/// Creates a child object inside a thread-dispatch group.
	pub fn spawn_in(&self, group: &Address, object: impl Object) -> Result<Address, RuntimeError> {
		self.runtime.spawn_in(group, object, self.address)
	}

	/// Asks the timer service to deliver `kind` to this object after `period`.
	pub fn start_timer(&self, kind: TimerKind, period: Duration, repeating: bool) {
		self.runtime.send(StartTimer { kind, period, repeating }, self.runtime.timer_address(), self.address);
	}

	pub fn cancel_timer(&self, kind: TimerKind) {
		self.runtime.send(CancelTimer { kind }, self.runtime.timer_address(), self.address);
	}

	/// Defers the message being handled until something new arrives for this
	/// object. Only the current message can be saved, and only once.
	pub fn save(&mut self, message: impl Message) -> Deferral {
		self.save_boxed(Box::new(message))
	}

	pub fn save_boxed(&mut self, message: Box<dyn Message>) -> Deferral {
		if message.message_type() != self.kind {
			tracing::trace!(to = %self.address, kind = %message.message_type(), "worker.replay.foreign_save");
			return Deferral::Stale;
		}
		self.buffer.defer(self.header.clone().rejoin(message))
	}

	/// Blocks this object's thread until a message of one of `matching` (or a
	/// subtype) arrives for it, as [`Channel::select`](crate::Channel::select)
	/// does.
	///
	/// In a group the whole group thread waits; traffic for the other members
	/// is held and delivered after the handler returns. The message being
	/// handled can no longer be saved once this has pulled anything.
	pub fn select(&mut self, matching: &[MessageType], saving: Saving<'_>, timeout: Option<Duration>) -> Option<Envelope> {
		Selection {
			runtime: self.runtime,
			address: self.address,
			buffer: &mut *self.buffer,
			receiver: self.receiver,
		}
		.select(matching, saving, timeout)
	}

	/// Sends `message` to `to` and waits for a reply of one of `matching`,
	/// keeping everything else for later. Asking an object bound to the same
	/// thread can only end in the timeout.
	pub fn ask(&mut self, message: impl Message, to: &Address, matching: &[MessageType], timeout: Option<Duration>) -> Option<Envelope> {
		self.send(message, to);
		self.select(matching, Saving::Any, timeout)
	}

	/// Leaves the dispatch loop once the current handler returns.
	pub fn complete(&mut self) {
		self.completed = true;
	}

	pub(crate) fn is_completed(&self) -> bool {
		self.completed
	}
}
