//! Retry backoff sequences.
//!
//! A [`BackoffPolicy`] describes an explicit run of initial delays, an optional
//! steady delay repeated afterwards, optional jitter, and an optional cap on the
//! number of delays. [`BackoffPolicy::sequence`] turns a policy into a lazy
//! iterator of delays in seconds. The generator knows nothing about actors or
//! timers; callers decide what to do with each delay.

use std::time::Duration;

use rand::Rng;
use rand::rngs::ThreadRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by [`BackoffPolicy::validate`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackoffError {
	/// An entry of `first-steps` is negative or not finite.
	#[error("first step {index} is invalid: {value}")]
	InvalidStep {
		/// Position within `first-steps`.
		index: usize,
		/// Offending value in seconds.
		value: f64,
	},

	/// `regular-steps` is negative or not finite.
	#[error("regular step is invalid: {0}")]
	InvalidRegularStep(f64),

	/// `randomized` must be a positive, finite jitter granularity.
	#[error("jitter granularity must be positive: {0}")]
	InvalidJitter(f64),

	/// `truncated` must be a positive, finite factor.
	#[error("truncation factor must be positive: {0}")]
	InvalidTruncation(f64),
}

/// Shape of a retry delay sequence.
///
/// Values are seconds. The serialized form uses kebab-case keys, so a TOML
/// table reads `first-steps = [1, 2, 4]`, `regular-steps = 8`, and so on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct BackoffPolicy {
	/// Delays yielded first, in order.
	pub first_steps: Vec<f64>,
	/// Delay repeated indefinitely once `first_steps` is exhausted. Without it
	/// the sequence ends after `first_steps`.
	pub regular_steps: Option<f64>,
	/// Maximum number of delays yielded in total.
	pub step_limit: Option<usize>,
	/// Jitter granularity. When set, each delay gains a random whole multiple
	/// of this value.
	pub randomized: Option<f64>,
	/// Scales the jitter range. Without it the range spans the whole delay.
	pub truncated: Option<f64>,
}

impl BackoffPolicy {
	/// Creates a policy that yields `first_steps` and then stops.
	pub fn new(first_steps: impl Into<Vec<f64>>) -> Self {
		Self {
			first_steps: first_steps.into(),
			..Self::default()
		}
	}

	/// Creates a policy that repeats `step` forever.
	pub fn regular(step: f64) -> Self {
		Self::default().with_regular_steps(step)
	}

	#[must_use]
	pub fn with_regular_steps(mut self, step: f64) -> Self {
		self.regular_steps = Some(step);
		self
	}

	#[must_use]
	pub fn with_step_limit(mut self, limit: usize) -> Self {
		self.step_limit = Some(limit);
		self
	}

	#[must_use]
	pub fn with_jitter(mut self, granularity: f64) -> Self {
		self.randomized = Some(granularity);
		self
	}

	#[must_use]
	pub fn with_truncation(mut self, factor: f64) -> Self {
		self.truncated = Some(factor);
		self
	}

	/// Checks that every value can produce a meaningful delay.
	pub fn validate(&self) -> Result<(), BackoffError> {
		if let Some((index, value)) = self.first_steps.iter().copied().enumerate().find(|(_, step)| !is_delay(*step)) {
			return Err(BackoffError::InvalidStep { index, value });
		}
		if let Some(step) = self.regular_steps.filter(|step| !is_delay(*step)) {
			return Err(BackoffError::InvalidRegularStep(step));
		}
		if let Some(jitter) = self.randomized.filter(|jitter| !is_positive(*jitter)) {
			return Err(BackoffError::InvalidJitter(jitter));
		}
		if let Some(factor) = self.truncated.filter(|factor| !is_positive(*factor)) {
			return Err(BackoffError::InvalidTruncation(factor));
		}
		Ok(())
	}

	/// Returns a fresh sequence of delays in seconds, jittered with the thread RNG.
	///
	/// Every call starts again from the first step.
	pub fn sequence(&self) -> BackoffSequence<'_, ThreadRng> {
		self.sequence_with(rand::thread_rng())
	}

	/// Returns a fresh sequence jittered with the supplied random source.
	pub fn sequence_with<R: Rng>(&self, rng: R) -> BackoffSequence<'_, R> {
		BackoffSequence {
			policy: self,
			rng,
			yielded: 0,
		}
	}

	/// Same as [`sequence`](Self::sequence), as [`Duration`]s.
	pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
		self.sequence().map(|seconds| Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO))
	}

	fn base_step(&self, position: usize) -> Option<f64> {
		self.first_steps.get(position).copied().or(self.regular_steps)
	}

	/// Adds `m * jitter` to `step`, with `m` drawn uniformly from
	/// `0..=floor(range / jitter)`.
	fn jittered(&self, step: f64, rng: &mut impl Rng) -> f64 {
		let Some(jitter) = self.randomized.filter(|jitter| is_positive(*jitter)) else {
			return step;
		};
		let range = self.truncated.map_or(step, |factor| step * factor);
		// Negative or NaN ranges saturate to zero slots of extra delay.
		let slots = ((range / jitter).floor().max(0.0) as u64).saturating_add(1);
		let multiplier = rng.gen_range(0..slots);
		step + multiplier as f64 * jitter
	}
}

fn is_delay(value: f64) -> bool {
	value.is_finite() && value >= 0.0
}

fn is_positive(value: f64) -> bool {
	value.is_finite() && value > 0.0
}

/// Lazy iterator over the delays described by a [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct BackoffSequence<'a, R> {
	policy: &'a BackoffPolicy,
	rng: R,
	yielded: usize,
}

impl<R> BackoffSequence<'_, R> {
	/// Number of delays yielded so far.
	pub fn attempts(&self) -> usize {
		self.yielded
	}
}

impl<R: Rng> Iterator for BackoffSequence<'_, R> {
	type Item = f64;

	fn next(&mut self) -> Option<f64> {
		if self.policy.step_limit.is_some_and(|limit| self.yielded >= limit) {
			return None;
		}
		let step = self.policy.base_step(self.yielded)?;
		self.yielded += 1;
		Some(self.policy.jittered(step, &mut self.rng))
	}
}
