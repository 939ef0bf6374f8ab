use pretty_assertions::assert_eq;

use super::*;
use crate::context::testing::{Script, drive};
use crate::message::Stop;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Phase {
	A,
	B,
}

#[derive(Debug)]
struct M1;
#[derive(Debug)]
struct M2;
#[derive(Debug)]
struct M3(u8);

crate::message!(M1);
crate::message!(M2);
crate::message!(M3);

#[derive(Default)]
struct Trace(Vec<&'static str>);

fn ping_pong() -> Arc<MachineTable<Trace, Phase>> {
	let table = MachineTable::<Trace, Phase>::builder()
		.state(Phase::A, Transitions::new().handle::<M1>().save::<M2>())
		.state(Phase::B, Transitions::new().handle::<M2>())
		.on::<M1>(Phase::A, |trace, _, _| {
			trace.0.push("A:M1");
			Phase::B
		})
		.on::<M2>(Phase::B, |trace, _, _| {
			trace.0.push("B:M2");
			Phase::A
		})
		.build()
		.unwrap();
	Arc::new(table)
}

#[test]
fn saved_message_replays_after_transition() {
	let mut machine = StateMachine::new(Trace::default(), ping_pong(), Phase::A);
	drive(&mut machine, Script::new().push(M2).push(M1));
	assert_eq!(*machine.state(), Phase::A);
	assert_eq!(machine.actor().0, vec!["A:M1", "B:M2"]);
}

#[test]
fn unsaved_order_runs_directly() {
	let mut machine = StateMachine::new(Trace::default(), ping_pong(), Phase::A);
	drive(&mut machine, Script::new().push(M1).push(M2).push(M1));
	assert_eq!(*machine.state(), Phase::B);
	assert_eq!(machine.actor().0, vec!["A:M1", "B:M2", "A:M1"]);
}

#[test]
fn unrouted_message_is_dropped_and_state_kept() {
	let mut machine = StateMachine::new(Trace::default(), ping_pong(), Phase::B);
	drive(&mut machine, Script::new().push(M1).push(M3(1)));
	assert_eq!(*machine.state(), Phase::B);
	assert!(machine.actor().0.is_empty());
}

#[test]
fn table_reports_handle_and_save() {
	let table = ping_pong();
	assert!(table.handles(&Phase::A, &M1));
	assert!(table.saves(&Phase::A, &M2));
	assert!(!table.handles(&Phase::B, &M1));
	assert!(!table.saves(&Phase::B, &M1));
}

#[test]
fn default_scope_is_consulted_after_state() {
	let table = MachineTable::<Trace, Phase>::builder()
		.state(Phase::A, Transitions::new().handle::<M1>())
		.state(Phase::B, Transitions::new().handle_unknown())
		.default_state(Transitions::new().handle::<M1>().handle::<Stop>())
		.on::<M1>(Phase::A, |trace, _, _| {
			trace.0.push("A:M1");
			Phase::B
		})
		.on_unknown(Phase::B, |trace, _, _| {
			trace.0.push("B:unknown");
			Phase::B
		})
		.on::<M1>(Scope::Default, |trace, _, _| {
			trace.0.push("default:M1");
			Phase::A
		})
		.on::<Stop>(Scope::Default, |trace, ctx, _| {
			trace.0.push("default:Stop");
			ctx.complete();
			Phase::A
		})
		.build()
		.unwrap();

	// In B, the state's own Unknown wins over the DEFAULT exact match.
	let mut machine = StateMachine::new(Trace::default(), Arc::new(table), Phase::A);
	let completed = drive(&mut machine, Script::new().push(M1).push(M1).push(M3(0)).push(Stop).push(M1));
	assert!(!completed);
	assert_eq!(machine.actor().0, vec!["A:M1", "B:unknown", "B:unknown", "B:unknown", "B:unknown"]);
}

#[test]
fn default_scope_handles_what_state_lacks() {
	let table = MachineTable::<Trace, Phase>::builder()
		.state(Phase::A, Transitions::new().handle::<M1>())
		.default_state(Transitions::new().handle::<Stop>().save::<M2>())
		.on::<M1>(Phase::A, |trace, _, _| {
			trace.0.push("A:M1");
			Phase::A
		})
		.on::<Stop>(Scope::Default, |trace, ctx, _| {
			trace.0.push("default:Stop");
			ctx.complete();
			Phase::A
		})
		.build()
		.unwrap();

	let mut machine = StateMachine::new(Trace::default(), Arc::new(table), Phase::A);
	let completed = drive(&mut machine, Script::new().push(M2).push(M1).push(Stop).push(M1));
	assert!(completed);
	assert_eq!(machine.actor().0, vec!["A:M1", "default:Stop"]);
}

struct Signal;

#[derive(Debug)]
struct Alarm(u8);

crate::message!(Alarm: Signal);

#[test]
fn family_handler_receives_subtypes() {
	let table = MachineTable::<Vec<u8>, Phase>::builder()
		.state(Phase::A, Transitions::new().handle::<Signal>())
		.on_family(Phase::A, MessageType::of::<Signal>(), |seen, _, message| {
			if let Some(Alarm(level)) = message.downcast_ref::<Alarm>() {
				seen.push(*level);
			}
			Phase::A
		})
		.build()
		.unwrap();

	let mut machine = StateMachine::new(Vec::new(), Arc::new(table), Phase::A);
	drive(&mut machine, Script::new().push(Alarm(4)).push(M1).push(Alarm(9)));
	assert_eq!(machine.actor(), &vec![4, 9]);
}

#[test]
fn save_unknown_holds_everything_until_state_changes() {
	let table = MachineTable::<Trace, Phase>::builder()
		.state(Phase::A, Transitions::new().handle::<M1>().save_unknown())
		.state(Phase::B, Transitions::new().handle::<M2>().handle::<M3>())
		.on::<M1>(Phase::A, |trace, _, _| {
			trace.0.push("A:M1");
			Phase::B
		})
		.on::<M2>(Phase::B, |trace, _, _| {
			trace.0.push("B:M2");
			Phase::B
		})
		.on::<M3>(Phase::B, |trace, _, _| {
			trace.0.push("B:M3");
			Phase::B
		})
		.build()
		.unwrap();

	let mut machine = StateMachine::new(Trace::default(), Arc::new(table), Phase::A);
	drive(&mut machine, Script::new().push(M3(1)).push(M2).push(M1));
	assert_eq!(machine.actor().0, vec!["A:M1", "B:M2", "B:M3"]);
}

// ── Construction-time validation ──

fn noop(_: &mut Trace, _: &mut Context<'_>, _: M1) -> Phase {
	Phase::A
}

#[test]
fn missing_handler_names_state_and_message() {
	let error = MachineTable::<Trace, Phase>::builder()
		.state(Phase::A, Transitions::new().handle::<M1>())
		.state(Phase::B, Transitions::new().handle::<M2>())
		.on::<M1>(Phase::A, noop)
		.build()
		.err()
		.unwrap();
	assert_eq!(
		error,
		MachineError::MissingHandler {
			state: "B".into(),
			message: "M2"
		}
	);
	assert_eq!(error.to_string(), "state B declares M2 but registers no handler for it");
}

#[test]
fn first_missing_handler_follows_declaration_order() {
	let error = MachineTable::<Trace, Phase>::builder()
		.state(Phase::B, Transitions::new().handle::<M3>())
		.state(Phase::A, Transitions::new().handle::<M2>())
		.build()
		.err()
		.unwrap();
	assert_eq!(
		error,
		MachineError::MissingHandler {
			state: "B".into(),
			message: "M3"
		}
	);
}

#[test]
fn overlapping_handle_and_save_is_rejected() {
	let error = MachineTable::<Trace, Phase>::builder()
		.state(Phase::A, Transitions::new().handle::<M1>().save::<M1>())
		.on::<M1>(Phase::A, noop)
		.build()
		.err()
		.unwrap();
	assert_eq!(
		error,
		MachineError::Overlap {
			state: "A".into(),
			message: "M1"
		}
	);
}

#[test]
fn handler_without_declaration_is_rejected() {
	let error = MachineTable::<Trace, Phase>::builder()
		.state(Phase::A, Transitions::new())
		.on::<M1>(Phase::A, noop)
		.build()
		.err()
		.unwrap();
	assert_eq!(
		error,
		MachineError::Undeclared {
			state: "A".into(),
			message: "M1"
		}
	);
}

#[test]
fn duplicate_registrations_are_rejected() {
	let error = MachineTable::<Trace, Phase>::builder()
		.state(Phase::A, Transitions::new().handle::<M1>())
		.on::<M1>(Phase::A, noop)
		.on::<M1>(Phase::A, noop)
		.build()
		.err()
		.unwrap();
	assert!(matches!(error, MachineError::DuplicateHandler { .. }));

	let error = MachineTable::<Trace, Phase>::builder()
		.state(Phase::A, Transitions::new())
		.state(Phase::A, Transitions::new())
		.build()
		.err()
		.unwrap();
	assert_eq!(error, MachineError::DuplicateState { state: "A".into() });
}

#[test]
fn repeated_declaration_is_not_reported_as_missing() {
	let error = MachineTable::<Trace, Phase>::builder()
		.state(Phase::A, Transitions::new().handle::<M1>().handle::<M1>())
		.on::<M1>(Phase::A, noop)
		.build()
		.err()
		.unwrap();
	assert_eq!(
		error,
		MachineError::DuplicateDeclaration {
			state: "A".into(),
			message: "M1"
		}
	);

	let error = MachineTable::<Trace, Phase>::builder()
		.state(Phase::B, Transitions::new().save::<M2>().save::<M2>())
		.build()
		.err()
		.unwrap();
	assert_eq!(error.to_string(), "state B declares M2 more than once");
}

#[test]
fn default_scope_errors_name_default() {
	let error = MachineTable::<Trace, Phase>::builder()
		.default_state(Transitions::new().handle::<Stop>())
		.build()
		.err()
		.unwrap();
	assert_eq!(
		error,
		MachineError::MissingHandler {
			state: "DEFAULT".into(),
			message: "Stop"
		}
	);
}
