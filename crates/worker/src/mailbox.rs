use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

/// Default bound for mailboxes that drop on overflow.
pub const DEFAULT_CAPACITY: usize = 8192;
/// Default bound for mailboxes that block senders on overflow.
pub const DEFAULT_BLOCKING_CAPACITY: usize = 32768;

/// Overflow policy for a bounded mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MailboxPolicy {
	/// Block the sending thread until capacity frees up.
	Backpressure,
	/// Silently discard the incoming message when full.
	#[default]
	DropNewest,
}

/// Outcome from enqueueing a mailbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxSendOutcome {
	/// Message was enqueued.
	Enqueued,
	/// Message was dropped because policy is drop-newest and queue was full.
	DroppedNewest,
}

/// Mailbox send error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxSendError {
	/// Mailbox is closed.
	Closed,
	/// Queue is full and non-blocking send was used.
	Full,
}

/// Shape of a mailbox to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxSpec {
	pub capacity: usize,
	pub policy: MailboxPolicy,
}

impl MailboxSpec {
	/// The default bound for `policy`.
	pub const fn for_policy(policy: MailboxPolicy) -> Self {
		let capacity = match policy {
			MailboxPolicy::Backpressure => DEFAULT_BLOCKING_CAPACITY,
			MailboxPolicy::DropNewest => DEFAULT_CAPACITY,
		};
		Self { capacity, policy }
	}

	pub fn build<T>(self) -> Mailbox<T> {
		Mailbox::new(self.capacity, self.policy)
	}
}

impl Default for MailboxSpec {
	fn default() -> Self {
		Self::for_policy(MailboxPolicy::default())
	}
}

struct MailboxState<T> {
	queue: VecDeque<T>,
	closed: bool,
}

struct MailboxInner<T> {
	capacity: usize,
	policy: MailboxPolicy,
	state: Mutex<MailboxState<T>>,
	readable: Condvar,
	writable: Condvar,
	drops: AtomicU64,
}

/// Multi-producer mailbox sender, usable from any thread.
pub struct MailboxSender<T> {
	inner: Arc<MailboxInner<T>>,
}

/// Mailbox receiver, owned by the consuming thread.
pub struct MailboxReceiver<T> {
	inner: Arc<MailboxInner<T>>,
}

/// Bounded FIFO queue between arbitrary sending threads and one consumer.
pub struct Mailbox<T> {
	inner: Arc<MailboxInner<T>>,
}

impl<T> Clone for MailboxSender<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> Mailbox<T> {
	/// Creates a bounded mailbox. A zero capacity is raised to one.
	pub fn new(capacity: usize, policy: MailboxPolicy) -> Self {
		let capacity = capacity.max(1);
		Self {
			inner: Arc::new(MailboxInner {
				capacity,
				policy,
				state: Mutex::new(MailboxState {
					queue: VecDeque::new(),
					closed: false,
				}),
				readable: Condvar::new(),
				writable: Condvar::new(),
				drops: AtomicU64::new(0),
			}),
		}
	}

	/// Creates a mailbox sized with the default bound for `policy`.
	pub fn with_policy(policy: MailboxPolicy) -> Self {
		MailboxSpec::for_policy(policy).build()
	}

	/// Returns a sender handle.
	pub fn sender(&self) -> MailboxSender<T> {
		MailboxSender {
			inner: Arc::clone(&self.inner),
		}
	}

	/// Splits into the sending and receiving halves.
	pub fn split(self) -> (MailboxSender<T>, MailboxReceiver<T>) {
		let sender = self.sender();
		(sender, MailboxReceiver { inner: self.inner })
	}

	/// Returns mailbox policy.
	pub fn policy(&self) -> MailboxPolicy {
		self.inner.policy
	}
}

impl<T> MailboxSender<T> {
	/// Requests mailbox closure. The receiver drains existing items then sees `None`.
	pub fn close(&self) {
		self.inner.close();
	}

	/// Non-blocking enqueue.
	pub fn try_send(&self, msg: T) -> Result<MailboxSendOutcome, MailboxSendError> {
		let mut state = self.inner.state.lock();
		self.inner.enqueue(&mut state, msg)
	}

	/// Enqueue honoring policy (`Backpressure` waits for capacity).
	///
	/// For `Backpressure`, the calling thread parks on the mailbox until the
	/// consumer frees a slot or the mailbox closes. `DropNewest` never blocks.
	pub fn send(&self, msg: T) -> Result<MailboxSendOutcome, MailboxSendError> {
		let mut state = self.inner.state.lock();
		if self.inner.policy == MailboxPolicy::Backpressure {
			while !state.closed && state.queue.len() >= self.inner.capacity {
				self.inner.writable.wait(&mut state);
			}
		}
		self.inner.enqueue(&mut state, msg)
	}

	/// Returns current queue length.
	pub fn len(&self) -> usize {
		self.inner.state.lock().queue.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns queue capacity.
	pub fn capacity(&self) -> usize {
		self.inner.capacity
	}

	/// Messages discarded by the drop-newest policy so far.
	pub fn dropped(&self) -> u64 {
		self.inner.drops.load(Ordering::Relaxed)
	}

	pub fn is_closed(&self) -> bool {
		self.inner.state.lock().closed
	}
}

impl<T> MailboxReceiver<T> {
	/// Receives one message, blocking while empty. Returns `None` once the
	/// mailbox is closed and drained.
	pub fn recv(&self) -> Option<T> {
		let mut state = self.inner.state.lock();
		loop {
			if let Some(msg) = state.queue.pop_front() {
				drop(state);
				self.inner.writable.notify_one();
				return Some(msg);
			}
			if state.closed {
				return None;
			}
			self.inner.readable.wait(&mut state);
		}
	}

	/// Like [`recv`](Self::recv) but gives up after `timeout`.
	pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
		let deadline = Instant::now() + timeout;
		let mut state = self.inner.state.lock();
		loop {
			if let Some(msg) = state.queue.pop_front() {
				drop(state);
				self.inner.writable.notify_one();
				return Some(msg);
			}
			if state.closed {
				return None;
			}
			if self.inner.readable.wait_until(&mut state, deadline).timed_out() {
				return None;
			}
		}
	}

	/// Stops further sends. Queued items can still be received.
	pub fn close(&self) {
		self.inner.close();
	}

	/// Receives one message if immediately available.
	pub fn try_recv(&self) -> Option<T> {
		let msg = self.inner.state.lock().queue.pop_front();
		if msg.is_some() {
			self.inner.writable.notify_one();
		}
		msg
	}

	/// Returns current queue length.
	pub fn len(&self) -> usize {
		self.inner.state.lock().queue.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl<T> MailboxInner<T> {
	fn close(&self) {
		self.state.lock().closed = true;
		self.readable.notify_all();
		self.writable.notify_all();
	}

	/// Non-blocking enqueue for all policies.
	///
	/// `Backpressure` returns `Full` when at capacity (the blocking wait lives
	/// in `MailboxSender::send`, which calls this with the lock still held).
	fn enqueue(&self, state: &mut MailboxState<T>, msg: T) -> Result<MailboxSendOutcome, MailboxSendError> {
		if state.closed {
			return Err(MailboxSendError::Closed);
		}
		if state.queue.len() < self.capacity {
			state.queue.push_back(msg);
			self.readable.notify_one();
			return Ok(MailboxSendOutcome::Enqueued);
		}
		match self.policy {
			MailboxPolicy::Backpressure => Err(MailboxSendError::Full),
			MailboxPolicy::DropNewest => {
				let count = self.drops.fetch_add(1, Ordering::Relaxed);
				if count % 1024 == 0 {
					tracing::warn!(drops = count + 1, capacity = self.capacity, "mailbox full, dropping message");
				}
				Ok(MailboxSendOutcome::DroppedNewest)
			}
		}
	}
}
