/// What a runtime-owned thread is for, used for naming and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ThreadClass {
	/// One object bound to its own mailbox.
	Object,
	/// Several objects sharing one mailbox.
	Group,
	/// The tick source driving the timer service.
	Ticker,
}

impl ThreadClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Object => "object",
			Self::Group => "group",
			Self::Ticker => "ticker",
		}
	}
}
