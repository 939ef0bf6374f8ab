//! The timer service.
//!
//! One object per runtime owns every armed timer. Owners talk to it with
//! [`StartTimer`] and [`CancelTimer`]; a tick thread sends [`Tick`] at a fixed
//! quantum and each tick scans the armed list, delivering a fresh instance of
//! the timer's message to the owner of every expired entry. Deadlines use the
//! monotonic [`Instant`] clock.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::address::Address;
use crate::context::Context;
use crate::dispatch::{DispatchTable, Stateless};
use crate::message::{Message, MessageType, Start, Stop};

/// Default timer-service tick quantum.
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);
/// Periods shorter than this fire immediately instead of being armed.
pub const MINIMUM_PERIOD: Duration = Duration::from_millis(200);

/// Which message a timer delivers, and how to make a fresh one.
#[derive(Clone, Copy)]
pub struct TimerKind {
	ty: MessageType,
	make: fn() -> Box<dyn Message>,
}

fn make_default<T: Message + Default>() -> Box<dyn Message> {
	Box::new(T::default())
}

impl TimerKind {
	pub fn of<T: Message + Default>() -> Self {
		Self {
			ty: MessageType::of::<T>(),
			make: make_default::<T>,
		}
	}

	pub fn message_type(&self) -> MessageType {
		self.ty
	}

	/// A new instance of the timer message.
	pub fn instantiate(&self) -> Box<dyn Message> {
		(self.make)()
	}
}

impl PartialEq for TimerKind {
	fn eq(&self, other: &Self) -> bool {
		self.ty == other.ty
	}
}

impl Eq for TimerKind {}

impl fmt::Debug for TimerKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "TimerKind({})", self.ty)
	}
}

macro_rules! timer_messages {
	($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
		$(
			$(#[$meta])*
			#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
			pub struct $name;
			crate::message!($name);
		)+
	};
}

timer_messages! {
	/// General purpose timer.
	T1,
	/// General purpose timer.
	T2,
	/// General purpose timer.
	T3,
	/// General purpose timer.
	T4,
	/// Timeout of a [`Channel::select`](crate::Channel::select).
	SelectTimer,
}

/// Arms (or re-arms) the sender's timer of `kind`.
#[derive(Debug, Clone)]
pub struct StartTimer {
	pub kind: TimerKind,
	pub period: Duration,
	pub repeating: bool,
}

/// Disarms the sender's timer of `kind`, if any.
#[derive(Debug, Clone)]
pub struct CancelTimer {
	pub kind: TimerKind,
}

/// Heartbeat from the tick thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tick;

crate::message!(StartTimer);
crate::message!(CancelTimer);
crate::message!(Tick);

/// One scheduled delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedTimer {
	pub owner: Address,
	pub kind: TimerKind,
	pub period: Duration,
	pub repeating: bool,
	pub deadline: Instant,
}

/// A timer message due for delivery to `owner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired {
	pub owner: Address,
	pub kind: TimerKind,
}

/// Armed-timer bookkeeping, independent of threads and mailboxes.
#[derive(Debug)]
pub struct TimerService {
	armed: Vec<ArmedTimer>,
	minimum_period: Duration,
}

impl Default for TimerService {
	fn default() -> Self {
		Self::new(MINIMUM_PERIOD)
	}
}

impl TimerService {
	pub fn new(minimum_period: Duration) -> Self {
		Self {
			armed: Vec::new(),
			minimum_period,
		}
	}

	pub fn armed(&self) -> &[ArmedTimer] {
		&self.armed
	}

	/// Arms a timer for `(owner, kind)`.
	///
	/// An existing entry for the pair is re-armed in place from `now`. A new
	/// request below the minimum period is returned for immediate delivery
	/// and never armed. A period too long for the clock to represent never
	/// comes due, so any entry for the pair is disarmed instead.
	pub fn start(&mut self, owner: &Address, kind: TimerKind, period: Duration, repeating: bool, now: Instant) -> Option<Expired> {
		let existing = self.armed.iter().position(|timer| timer.owner == *owner && timer.kind == kind);
		let Some(deadline) = now.checked_add(period) else {
			tracing::debug!(owner = %owner, kind = %kind.message_type(), period = ?period, "worker.timer.never_due");
			if let Some(index) = existing {
				self.armed.remove(index);
			}
			return None;
		};
		if let Some(index) = existing {
			let timer = &mut self.armed[index];
			timer.period = period;
			timer.repeating = repeating;
			timer.deadline = deadline;
			return None;
		}
		if period < self.minimum_period {
			return Some(Expired { owner: owner.clone(), kind });
		}
		self.armed.push(ArmedTimer {
			owner: owner.clone(),
			kind,
			period,
			repeating,
			deadline,
		});
		None
	}

	/// Removes the first entry for `(owner, kind)`. Returns whether one existed.
	pub fn cancel(&mut self, owner: &Address, kind: TimerKind) -> bool {
		match self.armed.iter().position(|timer| timer.owner == *owner && timer.kind == kind) {
			Some(index) => {
				self.armed.remove(index);
				true
			}
			None => false,
		}
	}

	/// Collects every entry due at `now`. Repeating entries are re-armed from
	/// `now`; one-shot entries are removed, as are repeating ones whose next
	/// deadline is past the end of the clock.
	pub fn expire(&mut self, now: Instant) -> Vec<Expired> {
		let mut expired = Vec::new();
		self.armed.retain_mut(|timer| {
			if timer.deadline > now {
				return true;
			}
			expired.push(Expired {
				owner: timer.owner.clone(),
				kind: timer.kind,
			});
			if !timer.repeating {
				return false;
			}
			match now.checked_add(timer.period) {
				Some(deadline) => {
					timer.deadline = deadline;
					true
				}
				None => false,
			}
		});
		expired
	}
}

fn deliver(ctx: &Context<'_>, expired: Expired) {
	// The owner sees the timer as a message from itself.
	ctx.forward_boxed(expired.kind.instantiate(), &expired.owner, &expired.owner);
}

pub(crate) fn timer_table() -> DispatchTable<TimerService> {
	DispatchTable::<TimerService>::builder()
		.on::<Start>(|_, _, _| {})
		.on::<StartTimer>(|service, ctx, start| {
			let owner = ctx.return_address().clone();
			tracing::trace!(owner = %owner, kind = %start.kind.message_type(), period = ?start.period, repeating = start.repeating, "worker.timer.start");
			if let Some(expired) = service.start(&owner, start.kind, start.period, start.repeating, Instant::now()) {
				deliver(ctx, expired);
			}
		})
		.on::<CancelTimer>(|service, ctx, cancel| {
			if !service.cancel(ctx.return_address(), cancel.kind) {
				tracing::trace!(owner = %ctx.return_address(), kind = %cancel.kind.message_type(), "worker.timer.cancel_unarmed");
			}
		})
		.on::<Tick>(|service, ctx, _| {
			for expired in service.expire(Instant::now()) {
				deliver(ctx, expired);
			}
		})
		.on::<Stop>(|service, ctx, _| {
			tracing::debug!(armed = service.armed().len(), "worker.timer.stop");
			ctx.complete();
		})
		.build()
}

/// The timer service as a dispatchable object.
pub(crate) fn timer_object(minimum_period: Duration) -> Stateless<TimerService> {
	Stateless::new(TimerService::new(minimum_period), Arc::new(timer_table()))
}
