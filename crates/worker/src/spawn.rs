use std::thread::JoinHandle;

use crate::class::ThreadClass;

/// Spawns a dedicated named OS thread with thread classification metadata.
pub(crate) fn spawn_named_thread<F, R>(class: ThreadClass, name: impl Into<String>, f: F) -> std::io::Result<JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	let name = name.into();
	tracing::trace!(thread_class = class.as_str(), thread = %name, "worker.spawn_named_thread");
	std::thread::Builder::new().name(name).spawn(f)
}
