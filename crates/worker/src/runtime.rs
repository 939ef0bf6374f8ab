//! Thread-bound object runtime.
//!
//! Every object is bound to one OS thread for its whole life. The thread loops
//! pull, dispatch, repeat over a [`ReplayBuffer`] layered on the object's
//! mailbox. A thread-dispatch group runs the same loop over one shared mailbox
//! and hands each envelope to whichever member it is addressed to.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;

use crate::address::{Address, AddressSpace};
use crate::channel::Channel;
use crate::class::ThreadClass;
use crate::config::RuntimeConfig;
use crate::context::Context;
use crate::envelope::Envelope;
use crate::error::RuntimeError;
use crate::mailbox::{MailboxReceiver, MailboxSendError, MailboxSendOutcome, MailboxSpec};
use crate::message::{Completed, Message, Start, Stop};
use crate::object::Object;
use crate::registry::{Directory, Residence};
use crate::replay::ReplayBuffer;
use crate::spawn::spawn_named_thread;
use crate::timer::{Tick, timer_object};

static NO_ADDRESS: Address = Address::NONE;

/// Handle to one runtime. Cheap to clone; every clone refers to the same
/// directory, timer service and threads.
#[derive(Clone)]
pub struct Runtime {
	inner: Arc<Inner>,
}

struct Inner {
	config: RuntimeConfig,
	addresses: AddressSpace,
	directory: Directory,
	timer: OnceLock<Address>,
	ticker: Mutex<Option<Ticker>>,
	threads: Mutex<Vec<JoinHandle<()>>>,
}

struct Ticker {
	stop: Arc<AtomicBool>,
	handle: JoinHandle<()>,
}

/// Object handed to a group thread on `spawn_in`.
struct Adopt {
	address: Address,
	parent: Address,
	object: Box<dyn Object>,
}

impl fmt::Debug for Adopt {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Adopt").field("address", &self.address).field("parent", &self.parent).finish_non_exhaustive()
	}
}

crate::message!(Adopt);

impl fmt::Debug for Runtime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Runtime")
			.field("live", &self.inner.directory.addresses().len())
			.field("timer", &self.inner.timer.get())
			.finish_non_exhaustive()
	}
}

impl Runtime {
	/// Starts a runtime with its timer service and tick thread.
	pub fn start(config: RuntimeConfig) -> Result<Self, RuntimeError> {
		config.validate()?;
		let runtime = Self::bare(config);
		let timer = runtime.spawn(timer_object(runtime.config().timer.minimum_period()), &Address::NONE)?;
		let _ = runtime.inner.timer.set(timer.clone());
		runtime.start_ticker(timer)?;
		tracing::debug!(prefix = %runtime.config().thread_prefix, "worker.runtime.start");
		Ok(runtime)
	}

	/// A runtime without timer service or tick thread. Timer requests are dropped.
	pub(crate) fn bare(config: RuntimeConfig) -> Self {
		Self {
			inner: Arc::new(Inner {
				config,
				addresses: AddressSpace::new(),
				directory: Directory::default(),
				timer: OnceLock::new(),
				ticker: Mutex::new(None),
				threads: Mutex::new(Vec::new()),
			}),
		}
	}

	pub fn config(&self) -> &RuntimeConfig {
		&self.inner.config
	}

	/// Well-known address of the timer service.
	pub fn timer_address(&self) -> &Address {
		self.inner.timer.get().unwrap_or(&NO_ADDRESS)
	}

	/// True while `address` can receive messages.
	pub fn is_live(&self, address: &Address) -> bool {
		self.inner.directory.contains(address)
	}

	/// Every live address, sorted.
	pub fn live(&self) -> Vec<Address> {
		self.inner.directory.addresses()
	}

	pub fn send(&self, message: impl Message, to: &Address, from: &Address) {
		self.send_boxed(Box::new(message), to, from);
	}

	/// Enqueues `message` for `to`. Unknown destinations and full or closed
	/// mailboxes drop the message.
	pub fn send_boxed(&self, message: Box<dyn Message>, to: &Address, from: &Address) {
		let Some(sender) = self.inner.directory.sender(to) else {
			tracing::trace!(to = %to, from = %from, kind = %message.message_type(), reason = "unknown address", "dropped");
			return;
		};
		let kind = message.message_type();
		match sender.send(Envelope::from_boxed(message, to.clone(), from.clone())) {
			Ok(MailboxSendOutcome::Enqueued) => {}
			Ok(MailboxSendOutcome::DroppedNewest) | Err(MailboxSendError::Full) => {
				tracing::debug!(to = %to, from = %from, kind = %kind, reason = "mailbox full", "dropped");
			}
			Err(MailboxSendError::Closed) => {
				tracing::trace!(to = %to, from = %from, kind = %kind, reason = "mailbox closed", "dropped");
			}
		}
	}

	/// Binds `object` to a new thread with the configured mailbox.
	///
	/// The object receives [`Start`] from `parent` before anything else.
	pub fn spawn(&self, object: impl Object, parent: &Address) -> Result<Address, RuntimeError> {
		self.spawn_with(self.config().mailbox.spec(), object, parent)
	}

	/// Binds `object` to a new thread with a mailbox of the given shape.
	pub fn spawn_with(&self, mailbox: MailboxSpec, object: impl Object, parent: &Address) -> Result<Address, RuntimeError> {
		let address = Address::root(self.inner.addresses.allocate());
		let (sender, receiver) = mailbox.build().split();
		self.inner.directory.register(address.clone(), sender.clone(), Residence::Thread);
		let _ = sender.send(Envelope::new(Start, address.clone(), parent.clone()));

		let name = format!("{}-{}", self.config().thread_prefix, address.last().unwrap_or_default());
		let runtime = self.clone();
		let object: Box<dyn Object> = Box::new(object);
		let (bound, parent) = (address.clone(), parent.clone());
		let spawned = spawn_named_thread(ThreadClass::Object, name.clone(), move || run_object(runtime, bound, parent, object, receiver));
		match spawned {
			Ok(handle) => {
				self.inner.threads.lock().push(handle);
				tracing::trace!(address = %address, thread = %name, "worker.runtime.spawn");
				Ok(address)
			}
			Err(error) => {
				self.inner.directory.remove(&address);
				Err(RuntimeError::Spawn { name, error })
			}
		}
	}

	/// Starts a thread-dispatch group: one thread and one mailbox shared by
	/// every member later added with [`spawn_in`](Self::spawn_in).
	///
	/// Sending [`Stop`] to the group address ends the group and every member.
	pub fn spawn_group(&self, name: &str) -> Result<Address, RuntimeError> {
		let address = Address::root(self.inner.addresses.allocate());
		let (sender, receiver) = self.config().mailbox.spec().build().split();
		self.inner.directory.register(address.clone(), sender, Residence::Group);

		let name = format!("{}-{}", self.config().thread_prefix, name);
		let runtime = self.clone();
		let bound = address.clone();
		match spawn_named_thread(ThreadClass::Group, name.clone(), move || run_group(runtime, bound, receiver)) {
			Ok(handle) => {
				self.inner.threads.lock().push(handle);
				Ok(address)
			}
			Err(error) => {
				self.inner.directory.remove(&address);
				Err(RuntimeError::Spawn { name, error })
			}
		}
	}

	/// Adds `object` to `group`. Its address nests under the group's.
	pub fn spawn_in(&self, group: &Address, object: impl Object, parent: &Address) -> Result<Address, RuntimeError> {
		if self.inner.directory.residence(group) != Some(Residence::Group) {
			return Err(RuntimeError::UnknownGroup(group.clone()));
		}
		let sender = self.inner.directory.sender(group).ok_or_else(|| RuntimeError::UnknownGroup(group.clone()))?;
		let address = group.child(self.inner.addresses.allocate());
		self.inner.directory.register(address.clone(), sender.clone(), Residence::Member);

		let adopt = Adopt {
			address: address.clone(),
			parent: parent.clone(),
			object: Box::new(object),
		};
		// Same sender, so the group sees Adopt before Start.
		match sender.send(Envelope::new(adopt, group.clone(), parent.clone())) {
			Ok(MailboxSendOutcome::Enqueued) => {
				let _ = sender.send(Envelope::new(Start, address.clone(), parent.clone()));
				Ok(address)
			}
			Ok(MailboxSendOutcome::DroppedNewest) | Err(_) => {
				self.inner.directory.remove(&address);
				Err(RuntimeError::GroupUnavailable(group.clone()))
			}
		}
	}

	/// Opens a channel for a thread outside the runtime.
	pub fn channel(&self) -> Channel {
		let address = Address::root(self.inner.addresses.allocate());
		let (sender, receiver) = self.config().mailbox.spec().build().split();
		self.inner.directory.register(address.clone(), sender.clone(), Residence::Channel);
		Channel::new(self.clone(), address, sender, receiver)
	}

	pub(crate) fn unregister(&self, address: &Address) {
		self.inner.directory.remove(address);
	}

	/// Stops the tick thread and the timer service, closes every mailbox and
	/// joins every runtime thread other than the caller's.
	pub fn shutdown(&self) {
		let ticker = self.inner.ticker.lock().take();
		if let Some(ticker) = ticker {
			ticker.stop.store(true, Ordering::Release);
			ticker.handle.thread().unpark();
			let _ = ticker.handle.join();
		}
		if let Some(timer) = self.inner.timer.get() {
			self.send(Stop, timer, &Address::NONE);
		}
		for sender in self.inner.directory.drain() {
			sender.close();
		}

		let current = thread::current().id();
		let threads = std::mem::take(&mut *self.inner.threads.lock());
		for handle in threads {
			if handle.thread().id() == current {
				continue;
			}
			if handle.join().is_err() {
				tracing::warn!("worker.runtime.thread_panicked");
			}
		}
		tracing::debug!("worker.runtime.shutdown");
	}

	fn start_ticker(&self, timer: Address) -> Result<(), RuntimeError> {
		let interval = self.config().timer.tick_interval();
		let stop = Arc::new(AtomicBool::new(false));
		let name = format!("{}-ticker", self.config().thread_prefix);
		let runtime = self.clone();
		let flag = Arc::clone(&stop);
		let handle = spawn_named_thread(ThreadClass::Ticker, name.clone(), move || {
			let mut next = Instant::now() + interval;
			while !flag.load(Ordering::Acquire) {
				let now = Instant::now();
				if now < next {
					thread::park_timeout(next - now);
					continue;
				}
				next = now + interval;
				runtime.send(Tick, &timer, &timer);
			}
		})
		.map_err(|error| RuntimeError::Spawn { name, error })?;
		*self.inner.ticker.lock() = Some(Ticker { stop, handle });
		Ok(())
	}

	/// Takes an object out of the directory and tells its parent.
	fn retire(&self, address: &Address, parent: &Address) {
		self.inner.directory.remove(address);
		tracing::trace!(address = %address, "worker.runtime.completed");
		self.send(Completed { address: address.clone() }, parent, address);
	}
}

/// Hands one envelope to `object`. Returns whether the object completed.
pub(crate) fn deliver(
	runtime: &Runtime,
	address: &Address,
	parent: &Address,
	object: &mut dyn Object,
	buffer: &mut ReplayBuffer,
	receiver: &MailboxReceiver<Envelope>,
	envelope: Envelope,
) -> bool {
	let (message, header) = envelope.into_parts();
	let kind = message.message_type();
	tracing::trace!(to = %address, from = %header.return_address, kind = %kind, replays = header.replays, "received");
	let mut ctx = Context::new(runtime, address, parent, header, kind, buffer, receiver);
	object.received(&mut ctx, message);
	ctx.is_completed()
}

fn run_object(runtime: Runtime, address: Address, parent: Address, mut object: Box<dyn Object>, receiver: MailboxReceiver<Envelope>) {
	let mut buffer = ReplayBuffer::new(runtime.config().replay.maximum_replays);
	while let Some(envelope) = buffer.pull(&receiver) {
		if envelope.to() != &address {
			tracing::debug!(to = %envelope.to(), from = %envelope.return_address(), kind = %envelope.message_type(), reason = "misrouted", "dropped");
			continue;
		}
		if deliver(&runtime, &address, &parent, object.as_mut(), &mut buffer, &receiver, envelope) {
			receiver.close();
			break;
		}
	}
	runtime.retire(&address, &parent);
}

struct Member {
	object: Box<dyn Object>,
	parent: Address,
}

fn run_group(runtime: Runtime, group: Address, receiver: MailboxReceiver<Envelope>) {
	let mut members: HashMap<Address, Member> = HashMap::new();
	let mut buffer = ReplayBuffer::new(runtime.config().replay.maximum_replays);
	while let Some(envelope) = buffer.pull(&receiver) {
		if envelope.to() == &group {
			match envelope.downcast::<Adopt>() {
				Ok((Adopt { address, parent, object }, _)) => {
					members.insert(address, Member { object, parent });
				}
				Err(envelope) if envelope.is::<Stop>() => break,
				Err(envelope) => {
					tracing::debug!(to = %group, from = %envelope.return_address(), kind = %envelope.message_type(), reason = "no handler", "dropped");
				}
			}
			continue;
		}

		let to = envelope.to().clone();
		let Some(member) = members.get_mut(&to) else {
			tracing::debug!(to = %to, from = %envelope.return_address(), kind = %envelope.message_type(), reason = "unknown member", "dropped");
			continue;
		};
		if deliver(&runtime, &to, &member.parent, member.object.as_mut(), &mut buffer, &receiver, envelope) {
			let parent = member.parent.clone();
			members.remove(&to);
			buffer.discard(&to);
			runtime.retire(&to, &parent);
		}
	}

	receiver.close();
	for (address, member) in members {
		runtime.retire(&address, &member.parent);
	}
	runtime.unregister(&group);
	tracing::trace!(group = %group, "worker.runtime.group_stopped");
}
