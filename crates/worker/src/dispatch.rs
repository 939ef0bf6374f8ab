//! Handler lookup for objects without states.
//!
//! Lookup order for one message: a handler for its exact type, then the
//! nearest declared supertype that has a family handler, then the
//! [`Unknown`] handler. With none of those the message is logged and dropped.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::context::Context;
use crate::message::{self, Message, MessageType, Unknown};
use crate::object::Object;

/// Type-erased handler returning `R`.
pub(crate) type Handler<A, R> = Box<dyn Fn(&mut A, &mut Context<'_>, Box<dyn Message>) -> R + Send + Sync>;

pub(crate) struct Route<H> {
	pub(crate) target: H,
	/// Typed handlers only accept their own type, never subtypes.
	pub(crate) exact: bool,
}

/// Routes for one scope, keyed by message type.
pub(crate) struct Routes<H> {
	map: HashMap<MessageType, Route<H>>,
}

impl<H> Default for Routes<H> {
	fn default() -> Self {
		Self { map: HashMap::new() }
	}
}

impl<H> Routes<H> {
	/// Inserts a route. Returns `false` when one already exists for `ty`.
	pub(crate) fn insert(&mut self, ty: MessageType, route: Route<H>) -> bool {
		match self.map.entry(ty) {
			Entry::Occupied(_) => false,
			Entry::Vacant(slot) => {
				slot.insert(route);
				true
			}
		}
	}

	pub(crate) fn resolve(&self, message: &dyn Message) -> Option<&H> {
		if let Some(route) = self.map.get(&message.message_type()) {
			return Some(&route.target);
		}
		let inherited = message
			.supertypes()
			.iter()
			.find_map(|parent| self.map.get(&parent()).filter(|route| !route.exact));
		inherited
			.or_else(|| self.map.get(&MessageType::of::<Unknown>()))
			.map(|route| &route.target)
	}
}

/// Wraps a typed handler so it can sit in a route table keyed by `T`.
pub(crate) fn typed<A, T, R>(handler: impl Fn(&mut A, &mut Context<'_>, T) -> R + Send + Sync + 'static) -> Handler<A, R>
where
	A: 'static,
	T: Message,
	R: 'static,
{
	Box::new(move |actor: &mut A, ctx: &mut Context<'_>, message: Box<dyn Message>| match message::downcast::<T>(message) {
		Ok(message) => handler(actor, ctx, message),
		Err(_) => unreachable!("typed routes only resolve on an exact type match"),
	})
}

pub(crate) fn dropped(ctx: &Context<'_>, message: &dyn Message) {
	tracing::debug!(
		to = %ctx.address(),
		from = %ctx.return_address(),
		kind = %message.message_type(),
		reason = "no handler",
		"dropped"
	);
}

/// Immutable handler table for one stateless actor type.
///
/// Build it once with [`DispatchTable::builder`] and share it through an
/// [`Arc`] between every instance.
pub struct DispatchTable<A> {
	routes: Routes<Handler<A, ()>>,
}

impl<A: 'static> DispatchTable<A> {
	pub fn builder() -> DispatchBuilder<A> {
		DispatchBuilder { routes: Routes::default() }
	}

	/// True when some handler would accept `message`.
	pub fn accepts(&self, message: &dyn Message) -> bool {
		self.routes.resolve(message).is_some()
	}
}

/// Builder for [`DispatchTable`]. Registering a second handler for a type
/// keeps the first.
pub struct DispatchBuilder<A> {
	routes: Routes<Handler<A, ()>>,
}

impl<A: 'static> DispatchBuilder<A> {
	/// Handles messages of exactly type `T`.
	#[must_use]
	pub fn on<T: Message>(mut self, handler: impl Fn(&mut A, &mut Context<'_>, T) + Send + Sync + 'static) -> Self {
		self.insert(MessageType::of::<T>(), typed(handler), true);
		self
	}

	/// Handles `family` and every message declaring it as a supertype.
	#[must_use]
	pub fn on_family(mut self, family: MessageType, handler: impl Fn(&mut A, &mut Context<'_>, Box<dyn Message>) + Send + Sync + 'static) -> Self {
		self.insert(family, Box::new(handler), false);
		self
	}

	/// Handles everything no other route accepts.
	#[must_use]
	pub fn on_unknown(self, handler: impl Fn(&mut A, &mut Context<'_>, Box<dyn Message>) + Send + Sync + 'static) -> Self {
		self.on_family(MessageType::of::<Unknown>(), handler)
	}

	pub fn build(self) -> DispatchTable<A> {
		DispatchTable { routes: self.routes }
	}

	fn insert(&mut self, ty: MessageType, target: Handler<A, ()>, exact: bool) {
		if !self.routes.insert(ty, Route { target, exact }) {
			tracing::warn!(kind = %ty, "duplicate handler registration ignored");
		}
	}
}

/// An actor value bound to its dispatch table.
pub struct Stateless<A> {
	actor: A,
	table: Arc<DispatchTable<A>>,
}

impl<A> Stateless<A> {
	pub fn new(actor: A, table: Arc<DispatchTable<A>>) -> Self {
		Self { actor, table }
	}

	pub fn actor(&self) -> &A {
		&self.actor
	}

	pub fn into_inner(self) -> A {
		self.actor
	}
}

impl<A: Send + 'static> Object for Stateless<A> {
	fn received(&mut self, ctx: &mut Context<'_>, message: Box<dyn Message>) {
		match self.table.routes.resolve(message.as_ref()) {
			Some(handler) => handler(&mut self.actor, ctx, message),
			None => dropped(ctx, message.as_ref()),
		}
	}
}
