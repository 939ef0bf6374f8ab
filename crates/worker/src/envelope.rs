use crate::address::Address;
use crate::message::{self, Message, MessageType};

/// One message in flight, with its routing.
#[derive(Debug)]
pub struct Envelope {
	message: Box<dyn Message>,
	header: Header,
}

/// Routing and replay bookkeeping carried alongside a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
	pub to: Address,
	pub return_address: Address,
	/// Number of times the message has been deferred.
	pub replays: u32,
	/// Stamp of the pull that last delivered this envelope. Zero until pulled.
	pub(crate) ticket: u64,
}

impl Envelope {
	pub fn new(message: impl Message, to: Address, return_address: Address) -> Self {
		Self::from_boxed(Box::new(message), to, return_address)
	}

	pub fn from_boxed(message: Box<dyn Message>, to: Address, return_address: Address) -> Self {
		Self {
			message,
			header: Header {
				to,
				return_address,
				replays: 0,
				ticket: 0,
			},
		}
	}

	pub fn to(&self) -> &Address {
		&self.header.to
	}

	pub fn return_address(&self) -> &Address {
		&self.header.return_address
	}

	pub fn replays(&self) -> u32 {
		self.header.replays
	}

	pub fn message(&self) -> &dyn Message {
		self.message.as_ref()
	}

	pub fn message_type(&self) -> MessageType {
		self.message.message_type()
	}

	pub fn header(&self) -> &Header {
		&self.header
	}

	pub fn is<T: Message>(&self) -> bool {
		self.message.is::<T>()
	}

	/// Unwraps a message of type `T`, or returns the envelope untouched.
	pub fn downcast<T: Message>(self) -> Result<(T, Header), Self> {
		let Self { message, header } = self;
		match message::downcast::<T>(message) {
			Ok(value) => Ok((value, header)),
			Err(message) => Err(Self { message, header }),
		}
	}

	pub fn into_parts(self) -> (Box<dyn Message>, Header) {
		(self.message, self.header)
	}

	pub(crate) fn header_mut(&mut self) -> &mut Header {
		&mut self.header
	}
}

impl Header {
	/// Rebuilds the envelope this header was split from.
	pub fn rejoin(self, message: Box<dyn Message>) -> Envelope {
		Envelope { message, header: self }
	}
}
