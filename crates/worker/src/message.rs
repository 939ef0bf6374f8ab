//! Message typing for dispatch.
//!
//! Every message is a plain Rust value implementing [`Message`]. Dispatch keys
//! on [`MessageType`], and "nearest supertype" lookup walks the explicit chain
//! a message declares with [`message!`](crate::message). Supertypes are marker
//! types that never need to be instantiated.

use std::any::{Any, TypeId, type_name};
use std::fmt;

use crate::address::Address;

/// Runtime identity of a message type.
#[derive(Clone, Copy)]
pub struct MessageType {
	id: TypeId,
	name: &'static str,
}

impl MessageType {
	pub fn of<T: ?Sized + 'static>() -> Self {
		Self {
			id: TypeId::of::<T>(),
			name: type_name::<T>(),
		}
	}

	/// Type name without its module path.
	pub fn name(&self) -> &'static str {
		let head = self.name.split('<').next().unwrap_or(self.name);
		let start = head.rfind("::").map_or(0, |at| at + 2);
		&self.name[start..]
	}
}

impl PartialEq for MessageType {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for MessageType {}

impl std::hash::Hash for MessageType {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl fmt::Debug for MessageType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl fmt::Display for MessageType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// A value that can travel in an [`Envelope`](crate::Envelope).
///
/// Implement it with [`message!`](crate::message), which also declares the
/// supertype chain. The default methods must not be overridden by hand.
pub trait Message: Any + Send + fmt::Debug {
	fn message_type(&self) -> MessageType {
		MessageType::of::<Self>()
	}

	/// Supertypes, nearest first.
	fn supertypes(&self) -> &'static [fn() -> MessageType] {
		&[]
	}
}

impl dyn Message {
	pub fn is<T: Message>(&self) -> bool {
		let any: &dyn Any = self;
		any.is::<T>()
	}

	pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
		let any: &dyn Any = self;
		any.downcast_ref::<T>()
	}

	/// True when the message is of type `ty` or declares it as a supertype.
	pub fn is_kind_of(&self, ty: MessageType) -> bool {
		self.message_type() == ty || self.supertypes().iter().any(|parent| parent() == ty)
	}
}

/// Takes ownership of `T` out of an erased message, or hands it back.
pub fn downcast<T: Message>(message: Box<dyn Message>) -> Result<T, Box<dyn Message>> {
	if !message.is::<T>() {
		return Err(message);
	}
	let any: Box<dyn Any> = message;
	match any.downcast::<T>() {
		Ok(value) => Ok(*value),
		Err(_) => unreachable!("type id checked before downcast"),
	}
}

/// Implements [`Message`] for one or more types.
///
/// ```ignore
/// struct Liveness;
/// #[derive(Debug)]
/// struct Ping;
/// #[derive(Debug)]
/// struct Pong;
///
/// message!(Ping: Liveness);
/// message!(Pong);
/// ```
#[macro_export]
macro_rules! message {
	($ty:ty) => {
		impl $crate::Message for $ty {}
	};
	($ty:ty : $($parent:ty),+ $(,)?) => {
		impl $crate::Message for $ty {
			fn supertypes(&self) -> &'static [fn() -> $crate::MessageType] {
				static CHAIN: &[fn() -> $crate::MessageType] = &[$($crate::MessageType::of::<$parent>),+];
				CHAIN
			}
		}
	};
}

/// Catch-all key for dispatch tables and state declarations.
#[derive(Debug, Clone, Copy)]
pub struct Unknown;

/// First message every object receives from its creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Start;

/// Conventional cooperative shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stop;

/// Sent to the parent once an object has left its dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed {
	pub address: Address,
}

message!(Start);
message!(Stop);
message!(Completed);
