use crate::{
  error::{HookError, HookResult},
  log::*,
};
use acmebot_lib::{ActivityError, ActivityName, ActivityResult};
use std::{future::Future, time::Duration};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Bounded retry window of polling activities
pub(crate) struct PollPolicy {
  pub(crate) timeout: Duration,
  pub(crate) interval: Duration,
}

/// Run `attempt` until it succeeds or the window elapses.
/// Non-retryable errors (configuration) fail immediately.
pub(crate) async fn poll_until_success<F, Fut>(activity: ActivityName, policy: PollPolicy, mut attempt: F) -> ActivityResult<()>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = HookResult<String>>,
{
  let started = Instant::now();
  let mut count = 0;

  loop {
    count += 1;
    debug!("[{activity}] Check attempt {count}");

    let error: HookError = match attempt().await {
      Ok(_) => {
        debug!("[{activity}] Check passed after {}ms (attempt {count})", started.elapsed().as_millis());
        return Ok(());
      }
      Err(e) if !e.is_retryable() => return Err(e.into()),
      Err(e) => e,
    };

    let elapsed = started.elapsed();
    if elapsed >= policy.timeout {
      warn!(
        "[{activity}] Check timeout after {}ms (attempt {count}): {error}",
        elapsed.as_millis()
      );
      return Err(ActivityError::TimedOut {
        waited_secs: elapsed.as_secs(),
        reason: error.to_string(),
      });
    }

    let remaining = policy.timeout.saturating_sub(elapsed);
    debug!(
      "[{activity}] Check not passed yet ({error}), waiting {}ms before next attempt ({}s remaining)",
      policy.interval.as_millis(),
      remaining.as_secs()
    );
    tokio::time::sleep(policy.interval.min(remaining)).await;
  }
}
