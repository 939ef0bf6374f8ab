use std::collections::HashMap;

use parking_lot::RwLock;

use crate::address::Address;
use crate::envelope::Envelope;
use crate::mailbox::MailboxSender;

/// How a live address is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Residence {
	/// Sole consumer of its own mailbox.
	Thread,
	/// A thread-dispatch group accepting members.
	Group,
	/// Member of a group, sharing the group's mailbox.
	Member,
	/// A channel read by an arbitrary thread.
	Channel,
}

struct Entry {
	sender: MailboxSender<Envelope>,
	residence: Residence,
}

/// Live addresses and the mailboxes that feed them.
#[derive(Default)]
pub(crate) struct Directory {
	entries: RwLock<HashMap<Address, Entry>>,
}

impl Directory {
	pub(crate) fn register(&self, address: Address, sender: MailboxSender<Envelope>, residence: Residence) {
		self.entries.write().insert(address, Entry { sender, residence });
	}

	/// Removes one address, returning its sender.
	pub(crate) fn remove(&self, address: &Address) -> Option<MailboxSender<Envelope>> {
		self.entries.write().remove(address).map(|entry| entry.sender)
	}

	/// Sender feeding `address`. The lock is released before the caller sends.
	pub(crate) fn sender(&self, address: &Address) -> Option<MailboxSender<Envelope>> {
		self.entries.read().get(address).map(|entry| entry.sender.clone())
	}

	pub(crate) fn residence(&self, address: &Address) -> Option<Residence> {
		self.entries.read().get(address).map(|entry| entry.residence)
	}

	pub(crate) fn contains(&self, address: &Address) -> bool {
		self.entries.read().contains_key(address)
	}

	/// Live addresses, sorted.
	pub(crate) fn addresses(&self) -> Vec<Address> {
		let mut addresses: Vec<_> = self.entries.read().keys().cloned().collect();
		addresses.sort();
		addresses
	}

	/// Empties the directory, returning every sender.
	pub(crate) fn drain(&self) -> Vec<MailboxSender<Envelope>> {
		self.entries.write().drain().map(|(_, entry)| entry.sender).collect()
	}
}
