use crate::context::Context;
use crate::message::Message;

/// Something that can be bound to a thread and fed messages.
///
/// [`Stateless`](crate::Stateless) and [`StateMachine`](crate::StateMachine)
/// cover table-driven actors. Implement it directly for hand-written dispatch.
pub trait Object: Send + 'static {
	/// Handles one message. Calls happen one at a time on the owning thread.
	fn received(&mut self, ctx: &mut Context<'_>, message: Box<dyn Message>);
}
