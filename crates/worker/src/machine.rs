//! Table-driven state machines.
//!
//! A [`MachineTable`] is declared once per actor type: for every state, the
//! message types it handles and the ones it saves for later. Handlers return
//! the next state. Saved messages go back through the replay buffer and are
//! offered again after the next fresh arrival, by which time the state has
//! usually moved on.
//!
//! Lookup for `(state, message)` tries the exact type, the nearest family
//! supertype and [`Unknown`] in the current state, then the same three in the
//! [`Scope::Default`] declarations. A miss is logged and dropped.
//!
//! ```ignore
//! let table = MachineTable::<Door, Phase>::builder()
//!     .state(Phase::Closed, Transitions::new().handle::<Open>().save::<Knock>())
//!     .state(Phase::Opened, Transitions::new().handle::<Close>().handle::<Knock>())
//!     .on::<Open>(Phase::Closed, |door, _, _| Phase::Opened)
//!     .on::<Close>(Phase::Opened, |door, _, _| Phase::Closed)
//!     .on::<Knock>(Phase::Opened, |door, ctx, _| { ctx.reply(Welcome); Phase::Opened })
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use thiserror::Error;

use crate::context::Context;
use crate::dispatch::{Handler, Route, Routes, typed};
use crate::message::{Message, MessageType, Unknown};
use crate::object::Object;

/// Problems found while building a [`MachineTable`].
///
/// Every variant names the offending state and message type so the failure
/// can be fixed without a debugger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
	/// A declared `(state, message)` pair has no registered handler.
	#[error("state {state} declares {message} but registers no handler for it")]
	MissingHandler { state: String, message: &'static str },

	/// A message type appears in both the handle and save sets of one state.
	#[error("state {state} both handles and saves {message}")]
	Overlap { state: String, message: &'static str },

	/// A handler was registered for a pair the declarations never mention.
	#[error("state {state} registers a handler for undeclared {message}")]
	Undeclared { state: String, message: &'static str },

	/// The same `(state, message)` pair was registered twice.
	#[error("state {state} registers {message} more than once")]
	DuplicateHandler { state: String, message: &'static str },

	/// A message type is listed twice in one state's handle or save set.
	#[error("state {state} declares {message} more than once")]
	DuplicateDeclaration { state: String, message: &'static str },

	/// A state was declared more than once.
	#[error("state {state} is declared more than once")]
	DuplicateState { state: String },
}

/// Where a declaration or handler applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope<S> {
	State(S),
	/// Fallback consulted when the current state has no route.
	Default,
}

impl<S> From<S> for Scope<S> {
	fn from(state: S) -> Self {
		Self::State(state)
	}
}

impl<S: fmt::Debug> fmt::Display for Scope<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::State(state) => write!(f, "{state:?}"),
			Self::Default => f.write_str("DEFAULT"),
		}
	}
}

/// Message types one state handles and saves.
#[derive(Debug, Clone, Default)]
pub struct Transitions {
	handle: Vec<MessageType>,
	save: Vec<MessageType>,
}

impl Transitions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Declares `T` (a message or a family marker) as handled.
	#[must_use]
	pub fn handle<T: ?Sized + 'static>(self) -> Self {
		self.handle_type(MessageType::of::<T>())
	}

	#[must_use]
	pub fn handle_type(mut self, ty: MessageType) -> Self {
		self.handle.push(ty);
		self
	}

	/// Declares a catch-all handler for this state.
	#[must_use]
	pub fn handle_unknown(self) -> Self {
		self.handle::<Unknown>()
	}

	/// Declares `T` (a message or a family marker) as saved for replay.
	#[must_use]
	pub fn save<T: ?Sized + 'static>(self) -> Self {
		self.save_type(MessageType::of::<T>())
	}

	#[must_use]
	pub fn save_type(mut self, ty: MessageType) -> Self {
		self.save.push(ty);
		self
	}

	/// Saves everything this state does not handle.
	#[must_use]
	pub fn save_unknown(self) -> Self {
		self.save::<Unknown>()
	}
}

enum Action<A, S> {
	Handle(Handler<A, S>),
	Save,
}

/// Validated `(state, message type) -> handler` table.
pub struct MachineTable<A, S> {
	states: HashMap<S, Routes<Action<A, S>>>,
	fallback: Routes<Action<A, S>>,
}

impl<A, S> MachineTable<A, S>
where
	A: 'static,
	S: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
	pub fn builder() -> MachineBuilder<A, S> {
		MachineBuilder {
			declared: Vec::new(),
			handlers: HashMap::new(),
			error: None,
		}
	}

	fn resolve(&self, state: &S, message: &dyn Message) -> Option<&Action<A, S>> {
		self.states
			.get(state)
			.and_then(|routes| routes.resolve(message))
			.or_else(|| self.fallback.resolve(message))
	}

	/// True when `message` would be handled (not saved, not dropped) in `state`.
	pub fn handles(&self, state: &S, message: &dyn Message) -> bool {
		matches!(self.resolve(state, message), Some(Action::Handle(_)))
	}

	/// True when `message` would be saved in `state`.
	pub fn saves(&self, state: &S, message: &dyn Message) -> bool {
		matches!(self.resolve(state, message), Some(Action::Save))
	}
}

/// Builder for [`MachineTable`]. Errors surface from [`build`](Self::build).
pub struct MachineBuilder<A, S> {
	declared: Vec<(Scope<S>, Transitions)>,
	handlers: HashMap<(Scope<S>, MessageType), Route<Handler<A, S>>>,
	error: Option<MachineError>,
}

impl<A, S> MachineBuilder<A, S>
where
	A: 'static,
	S: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
	/// Declares what one state handles and saves.
	#[must_use]
	pub fn state(mut self, scope: impl Into<Scope<S>>, transitions: Transitions) -> Self {
		let scope = scope.into();
		if self.declared.iter().any(|(seen, _)| *seen == scope) {
			self.fail(MachineError::DuplicateState { state: scope.to_string() });
		}
		self.declared.push((scope, transitions));
		self
	}

	/// Declares the fallback consulted by every state.
	#[must_use]
	pub fn default_state(self, transitions: Transitions) -> Self {
		self.state(Scope::Default, transitions)
	}

	/// Registers the handler for exactly `T` in `scope`.
	#[must_use]
	pub fn on<T: Message>(mut self, scope: impl Into<Scope<S>>, handler: impl Fn(&mut A, &mut Context<'_>, T) -> S + Send + Sync + 'static) -> Self {
		self.register(scope.into(), MessageType::of::<T>(), typed(handler), true);
		self
	}

	/// Registers a handler for `family` and its subtypes in `scope`.
	#[must_use]
	pub fn on_family(
		mut self,
		scope: impl Into<Scope<S>>,
		family: MessageType,
		handler: impl Fn(&mut A, &mut Context<'_>, Box<dyn Message>) -> S + Send + Sync + 'static,
	) -> Self {
		self.register(scope.into(), family, Box::new(handler), false);
		self
	}

	/// Registers the catch-all handler for `scope`.
	#[must_use]
	pub fn on_unknown(
		self,
		scope: impl Into<Scope<S>>,
		handler: impl Fn(&mut A, &mut Context<'_>, Box<dyn Message>) -> S + Send + Sync + 'static,
	) -> Self {
		self.on_family(scope, MessageType::of::<Unknown>(), handler)
	}

	/// Validates declarations against registrations.
	///
	/// States are checked in declaration order; the first problem found is
	/// returned.
	pub fn build(mut self) -> Result<MachineTable<A, S>, MachineError> {
		if let Some(error) = self.error.take() {
			return Err(error);
		}

		let mut states = HashMap::new();
		let mut fallback = Routes::default();
		for (scope, transitions) in self.declared {
			let state = scope.to_string();
			if let Some(ty) = repeated(&transitions.handle).or_else(|| repeated(&transitions.save)) {
				return Err(MachineError::DuplicateDeclaration { state, message: ty.name() });
			}
			let mut routes = Routes::default();
			for ty in &transitions.save {
				if transitions.handle.contains(ty) {
					return Err(MachineError::Overlap { state, message: ty.name() });
				}
				routes.insert(*ty, Route { target: Action::Save, exact: false });
			}
			for ty in &transitions.handle {
				let Some(Route { target, exact }) = self.handlers.remove(&(scope.clone(), *ty)) else {
					return Err(MachineError::MissingHandler { state, message: ty.name() });
				};
				routes.insert(*ty, Route { target: Action::Handle(target), exact });
			}
			match scope {
				Scope::State(state) => {
					states.insert(state, routes);
				}
				Scope::Default => fallback = routes,
			}
		}

		let leftover = self.handlers.into_keys().min_by_key(|(scope, ty)| (scope.to_string(), ty.name()));
		if let Some((scope, ty)) = leftover {
			return Err(MachineError::Undeclared {
				state: scope.to_string(),
				message: ty.name(),
			});
		}
		Ok(MachineTable { states, fallback })
	}

	fn register(&mut self, scope: Scope<S>, ty: MessageType, target: Handler<A, S>, exact: bool) {
		let key = (scope, ty);
		if self.handlers.contains_key(&key) {
			let (scope, ty) = key;
			self.fail(MachineError::DuplicateHandler {
				state: scope.to_string(),
				message: ty.name(),
			});
			return;
		}
		self.handlers.insert(key, Route { target, exact });
	}

	fn fail(&mut self, error: MachineError) {
		self.error.get_or_insert(error);
	}
}

fn repeated(types: &[MessageType]) -> Option<MessageType> {
	types.iter().enumerate().find(|(index, ty)| types[..*index].contains(ty)).map(|(_, ty)| *ty)
}

/// An actor value, its current state and its shared table.
pub struct StateMachine<A, S> {
	actor: A,
	state: S,
	table: Arc<MachineTable<A, S>>,
}

impl<A, S> StateMachine<A, S> {
	pub fn new(actor: A, table: Arc<MachineTable<A, S>>, initial: S) -> Self {
		Self { actor, state: initial, table }
	}

	pub fn state(&self) -> &S {
		&self.state
	}

	pub fn actor(&self) -> &A {
		&self.actor
	}
}

impl<A, S> Object for StateMachine<A, S>
where
	A: Send + 'static,
	S: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
	fn received(&mut self, ctx: &mut Context<'_>, message: Box<dyn Message>) {
		match self.table.resolve(&self.state, message.as_ref()) {
			Some(Action::Handle(handler)) => {
				let next = handler(&mut self.actor, ctx, message);
				if next != self.state {
					tracing::trace!(address = %ctx.address(), from = ?self.state, to = ?next, "worker.machine.transition");
				}
				self.state = next;
			}
			Some(Action::Save) => {
				ctx.save_boxed(message);
			}
			None => tracing::debug!(
				to = %ctx.address(),
				from = %ctx.return_address(),
				kind = %message.message_type(),
				state = ?self.state,
				reason = "no handler",
				"dropped"
			),
		}
	}
}

#[cfg(test)]
mod tests;
