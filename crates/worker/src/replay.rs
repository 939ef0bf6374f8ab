//! Deferral and replay on top of one mailbox.
//!
//! A handler that cannot act on a message yet hands it back with
//! [`ReplayBuffer::defer`]. Deferred envelopes wait in `pending` until a
//! fresh envelope arrives for the same destination, at which point they are
//! moved, in order, to `replaying` and delivered ahead of any further fresh
//! input. Envelopes for other destinations sharing the mailbox stay put, so
//! one object's deferrals never hold back another's traffic.

use std::collections::VecDeque;

use crate::address::Address;
use crate::envelope::Envelope;
use crate::mailbox::MailboxReceiver;

/// How many times one envelope may be deferred before it is discarded.
pub const MAXIMUM_REPLAYS: u32 = 8;

/// Result of a deferral request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferral {
	/// Parked until the next fresh envelope for the same destination.
	Saved,
	/// Replay limit reached; the envelope was discarded.
	Exhausted,
	/// Not the envelope most recently pulled; ignored.
	Stale,
}

/// Per-mailbox replay state. Touched only by the consuming thread.
#[derive(Debug)]
pub struct ReplayBuffer {
	pending: VecDeque<Envelope>,
	replaying: VecDeque<Envelope>,
	maximum_replays: u32,
	tickets: u64,
	current: Option<u64>,
}

impl Default for ReplayBuffer {
	fn default() -> Self {
		Self::new(MAXIMUM_REPLAYS)
	}
}

impl ReplayBuffer {
	pub fn new(maximum_replays: u32) -> Self {
		Self {
			pending: VecDeque::new(),
			replaying: VecDeque::new(),
			maximum_replays,
			tickets: 0,
			current: None,
		}
	}

	/// Next envelope to dispatch.
	///
	/// Replays drain first. Otherwise blocks on `mailbox`; the fresh envelope
	/// is returned and every pending envelope addressed to the same
	/// destination becomes eligible for replay behind it. Returns `None` once
	/// the mailbox is closed and drained.
	pub fn pull(&mut self, mailbox: &MailboxReceiver<Envelope>) -> Option<Envelope> {
		if let Some(envelope) = self.replaying.pop_front() {
			return Some(self.stamp(envelope));
		}
		let fresh = mailbox.recv()?;
		if !self.pending.is_empty() {
			let (matching, rest): (VecDeque<_>, VecDeque<_>) = self.pending.drain(..).partition(|parked| parked.to() == fresh.to());
			self.pending = rest;
			self.replaying = matching;
		}
		Some(self.stamp(fresh))
	}

	/// Parks the envelope most recently returned by [`pull`](Self::pull).
	///
	/// Anything else is ignored, as is a second deferral of the same pull.
	pub fn defer(&mut self, mut envelope: Envelope) -> Deferral {
		if self.current.is_none() || self.current != Some(envelope.header().ticket) {
			tracing::trace!(to = %envelope.to(), kind = %envelope.message_type(), "worker.replay.stale_defer");
			return Deferral::Stale;
		}
		self.current = None;

		if envelope.replays() >= self.maximum_replays {
			tracing::debug!(
				to = %envelope.to(),
				from = %envelope.return_address(),
				kind = %envelope.message_type(),
				replays = envelope.replays(),
				reason = "replay limit",
				"dropped"
			);
			return Deferral::Exhausted;
		}
		envelope.header_mut().replays += 1;
		self.pending.push_back(envelope);
		Deferral::Saved
	}

	/// Drops every parked or replaying envelope addressed to `address`.
	/// Returns how many were dropped.
	pub fn discard(&mut self, address: &Address) -> usize {
		let before = self.pending.len() + self.replaying.len();
		self.pending.retain(|envelope| envelope.to() != address);
		self.replaying.retain(|envelope| envelope.to() != address);
		let discarded = before - self.pending.len() - self.replaying.len();
		if discarded > 0 {
			tracing::debug!(to = %address, count = discarded, reason = "retired", "dropped");
		}
		discarded
	}

	/// Puts envelopes pulled on behalf of other destinations back at the head
	/// of the replay queue, in their original order. Their replay counts are
	/// untouched.
	pub(crate) fn restore(&mut self, held: Vec<Envelope>) {
		for envelope in held.into_iter().rev() {
			self.replaying.push_front(envelope);
		}
	}

	/// Envelopes parked and waiting for a fresh arrival.
	pub fn pending(&self) -> usize {
		self.pending.len()
	}

	/// Envelopes released for replay and not yet pulled.
	pub fn replaying(&self) -> usize {
		self.replaying.len()
	}

	fn stamp(&mut self, mut envelope: Envelope) -> Envelope {
		self.tickets += 1;
		envelope.header_mut().ticket = self.tickets;
		self.current = Some(self.tickets);
		envelope
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::mailbox::{Mailbox, MailboxPolicy, MailboxSender};

	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	struct Tagged(u32);
	#[derive(Debug)]
	struct Deferrable(u32);

	crate::message!(Tagged);
	crate::message!(Deferrable);

	fn setup() -> (MailboxSender<Envelope>, MailboxReceiver<Envelope>, ReplayBuffer) {
		let (tx, rx) = Mailbox::new(64, MailboxPolicy::DropNewest).split();
		(tx, rx, ReplayBuffer::default())
	}

	fn post(tx: &MailboxSender<Envelope>, message: impl crate::Message, to: &Address) {
		let _ = tx.send(Envelope::new(message, to.clone(), Address::NONE));
	}

	fn tag(envelope: &Envelope) -> Option<u32> {
		envelope.message().downcast_ref::<Tagged>().map(|t| t.0)
	}

	#[test]
	fn pull_without_deferrals_is_fifo() {
		let (tx, rx, mut buffer) = setup();
		let a = Address::root(1);
		for n in 0..5 {
			post(&tx, Tagged(n), &a);
		}
		let seen: Vec<_> = (0..5).map(|_| tag(&buffer.pull(&rx).unwrap()).unwrap()).collect();
		assert_eq!(seen, vec![0, 1, 2, 3, 4]);
	}

	#[test]
	fn deferred_messages_replay_after_next_fresh_arrival_in_order() {
		let (tx, rx, mut buffer) = setup();
		let a = Address::root(1);
		post(&tx, Tagged(1), &a);
		post(&tx, Tagged(2), &a);
		post(&tx, Tagged(3), &a);

		let first = buffer.pull(&rx).unwrap();
		assert_eq!(buffer.defer(first), Deferral::Saved);
		let second = buffer.pull(&rx).unwrap();
		// The fresh arrival is delivered first; 1 is now queued for replay.
		assert_eq!(tag(&second), Some(2));
		assert_eq!(buffer.replaying(), 1);
		assert_eq!(buffer.defer(second), Deferral::Saved);

		let replayed = buffer.pull(&rx).unwrap();
		assert_eq!(tag(&replayed), Some(1));
		assert_eq!(replayed.replays(), 1);

		let fresh = buffer.pull(&rx).unwrap();
		assert_eq!(tag(&fresh), Some(3));
		let replayed = buffer.pull(&rx).unwrap();
		assert_eq!(tag(&replayed), Some(2));
		assert_eq!(buffer.pending(), 0);
		assert_eq!(buffer.replaying(), 0);
	}

	#[test]
	fn replay_bound_drops_on_ninth_deferral() {
		let (tx, rx, mut buffer) = setup();
		let a = Address::root(1);
		post(&tx, Deferrable(7), &a);

		let mut envelope = buffer.pull(&rx).unwrap();
		for round in 1..=MAXIMUM_REPLAYS {
			assert_eq!(buffer.defer(envelope), Deferral::Saved, "round {round}");
			post(&tx, Tagged(round), &a);
			let fresh = buffer.pull(&rx).unwrap();
			assert_eq!(tag(&fresh), Some(round));
			envelope = buffer.pull(&rx).unwrap();
			assert!(envelope.is::<Deferrable>());
			assert_eq!(envelope.replays(), round);
		}

		assert_eq!(buffer.defer(envelope), Deferral::Exhausted);
		post(&tx, Tagged(99), &a);
		let fresh = buffer.pull(&rx).unwrap();
		assert_eq!(tag(&fresh), Some(99));
		assert_eq!(buffer.replaying(), 0);
		assert_eq!(buffer.pending(), 0);
		assert!(rx.try_recv().is_none());
	}

	#[test]
	fn foreign_and_repeated_deferrals_are_ignored() {
		let (tx, rx, mut buffer) = setup();
		let a = Address::root(1);
		post(&tx, Tagged(1), &a);

		let foreign = Envelope::new(Tagged(5), a.clone(), Address::NONE);
		assert_eq!(buffer.defer(foreign), Deferral::Stale);

		let pulled = buffer.pull(&rx).unwrap();
		let ticket = pulled.header().ticket;
		assert_eq!(buffer.defer(pulled), Deferral::Saved);

		let mut lookalike = Envelope::new(Tagged(1), a, Address::NONE);
		lookalike.header_mut().ticket = ticket;
		assert_eq!(buffer.defer(lookalike), Deferral::Stale);
		assert_eq!(buffer.pending(), 1);
	}

	#[test]
	fn deferral_of_older_pull_is_stale() {
		let (tx, rx, mut buffer) = setup();
		let a = Address::root(1);
		post(&tx, Tagged(1), &a);
		post(&tx, Tagged(2), &a);
		let older = buffer.pull(&rx).unwrap();
		let _newer = buffer.pull(&rx).unwrap();
		assert_eq!(buffer.defer(older), Deferral::Stale);
	}

	#[test]
	fn discard_forgets_a_retired_destination() {
		let (tx, rx, mut buffer) = setup();
		let gone = Address::root(1).child(1);
		let kept = Address::root(1).child(2);
		post(&tx, Deferrable(1), &gone);
		post(&tx, Deferrable(2), &kept);
		post(&tx, Deferrable(3), &gone);

		for _ in 0..3 {
			let envelope = buffer.pull(&rx).unwrap();
			assert_eq!(buffer.defer(envelope), Deferral::Saved);
		}
		assert_eq!(buffer.pending(), 3);

		assert_eq!(buffer.discard(&gone), 2);
		assert_eq!(buffer.pending(), 1);
		assert_eq!(buffer.discard(&gone), 0);

		post(&tx, Tagged(9), &kept);
		assert_eq!(tag(&buffer.pull(&rx).unwrap()), Some(9));
		let replayed = buffer.pull(&rx).unwrap();
		assert_eq!(replayed.to(), &kept);
		assert!(replayed.is::<Deferrable>());
		assert_eq!(buffer.pending(), 0);
		assert_eq!(buffer.replaying(), 0);
	}

	#[test]
	fn restored_envelopes_come_back_first_in_order() {
		let (tx, rx, mut buffer) = setup();
		let a = Address::root(1);
		post(&tx, Tagged(1), &a);
		post(&tx, Tagged(2), &a);
		post(&tx, Tagged(3), &a);
		let held = vec![buffer.pull(&rx).unwrap(), buffer.pull(&rx).unwrap()];
		buffer.restore(held);

		let seen: Vec<_> = (0..3).map(|_| tag(&buffer.pull(&rx).unwrap()).unwrap()).collect();
		assert_eq!(seen, vec![1, 2, 3]);
	}

	#[test]
	fn shared_mailbox_deferrals_do_not_delay_other_destination() {
		let (tx, rx, mut buffer) = setup();
		let a = Address::root(1).child(1);
		let b = Address::root(1).child(2);

		// A defers everything of type Deferrable; B's stream must arrive untouched.
		post(&tx, Deferrable(0), &a);
		post(&tx, Tagged(10), &b);
		post(&tx, Deferrable(1), &a);
		post(&tx, Tagged(11), &b);
		post(&tx, Tagged(12), &b);
		post(&tx, Tagged(0), &a);
		post(&tx, Tagged(13), &b);

		let describe = |envelope: &Envelope| match envelope.message().downcast_ref::<Deferrable>() {
			Some(Deferrable(n)) => format!("D{n}"),
			None => format!("T{}", tag(envelope).unwrap()),
		};
		let mut b_seen = Vec::new();
		let mut a_seen = Vec::new();
		// Seven fresh arrivals plus two replays.
		for _ in 0..9 {
			let envelope = buffer.pull(&rx).unwrap();
			if envelope.to() == &b {
				b_seen.push(tag(&envelope).unwrap());
			} else if envelope.is::<Deferrable>() && envelope.replays() == 0 {
				assert_eq!(buffer.defer(envelope), Deferral::Saved);
			} else {
				a_seen.push(describe(&envelope));
			}
		}

		assert_eq!(b_seen, vec![10, 11, 12, 13]);
		assert_eq!(a_seen, vec!["D0", "T0", "D1"]);
		assert!(rx.is_empty());
		assert_eq!(buffer.replaying(), 0);
		assert_eq!(buffer.pending(), 0);
	}
}
