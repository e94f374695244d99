use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

#[derive(Debug, PartialEq, Eq)]
pub enum Guarded<T> {
	Completed(T),
	TimedOut,
	Cancelled,
}
impl<T> Guarded<T> {
	pub fn completed(self) -> Option<T> {
		match self {
			Self::Completed(value) => Some(value),
			Self::TimedOut | Self::Cancelled => None,
		}
	}
}

/// Runs `call` with a token that is cancelled when `deadline` elapses or `caller` is cancelled.
///
/// The wrapped future is dropped as soon as either happens.
pub async fn guarded<F, Fut, T>(
	deadline: Duration,
	caller: &CancellationToken,
	call: F,
) -> Guarded<T>
where
	F: FnOnce(CancellationToken) -> Fut,
	Fut: Future<Output = T>,
{
	let token = caller.child_token();
	let work = call(token.clone());
	let outcome = tokio::select! {
		biased;
		_ = caller.cancelled() => Guarded::Cancelled,
		result = tokio::time::timeout(deadline, work) => match result {
			Ok(value) => Guarded::Completed(value),
			Err(_) => Guarded::TimedOut,
		},
	};

	if !matches!(outcome, Guarded::Completed(_)) {
		token.cancel();
	}

	outcome
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use tokio_util::sync::CancellationToken;

	use crate::guard::{Guarded, guarded};

	#[tokio::test(start_paused = true)]
	async fn completes_within_deadline() {
		let caller = CancellationToken::new();
		let outcome = guarded(Duration::from_secs(5), &caller, |_| async {
			tokio::time::sleep(Duration::from_secs(1)).await;

			7
		})
		.await;

		assert_eq!(outcome, Guarded::Completed(7));
	}

	#[tokio::test(start_paused = true)]
	async fn deadline_cancels_the_child_token() {
		let caller = CancellationToken::new();
		let mut child = None;
		let outcome = guarded(Duration::from_secs(5), &caller, |token| {
			child = Some(token.clone());

			async move { token.cancelled().await }
		})
		.await;

		assert_eq!(outcome, Guarded::TimedOut);
		assert!(child.is_some_and(|token| token.is_cancelled()));
		assert!(!caller.is_cancelled());
	}

	#[tokio::test]
	async fn caller_cancellation_wins() {
		let caller = CancellationToken::new();

		caller.cancel();

		let outcome =
			guarded(Duration::from_secs(5), &caller, |_| std::future::pending::<()>()).await;

		assert_eq!(outcome, Guarded::Cancelled);
		assert_eq!(Guarded::<u8>::Cancelled.completed(), None);
	}
}
