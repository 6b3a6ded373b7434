use acmebot_lib::{ActivityError, ActivityName};
use thiserror::Error;

pub(crate) type HookResult<T> = std::result::Result<T, HookError>;

#[derive(Error, Debug)]
/// Error type for acmebot-hooks
pub enum HookError {
  /// No program is configured for the activity
  #[error("No hook configured for {0}")]
  MissingHook(ActivityName),
  /// Failed to spawn the hook program
  #[error("Failed to spawn hook of {activity}: {source}")]
  Spawn {
    activity: ActivityName,
    source: std::io::Error,
  },
  /// Hook exited with a failure status
  #[error("Hook of {activity} exited with {status}: {stderr}")]
  Failed {
    activity: ActivityName,
    status: String,
    stderr: String,
  },
  /// Hook did not exit in time and has been killed
  #[error("Hook of {activity} did not exit within {secs}s")]
  TimedOut { activity: ActivityName, secs: u64 },
  /// Hook output is not the expected JSON document
  #[error("Invalid output of {activity} hook: {source}")]
  InvalidOutput {
    activity: ActivityName,
    source: serde_json::Error,
  },
  /// IO error
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  /// Serialization of hook input
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl HookError {
  /// Configuration errors are not worth retrying
  pub(crate) fn is_retryable(&self) -> bool {
    !matches!(self, HookError::MissingHook(_) | HookError::Spawn { .. })
  }
}

impl From<HookError> for ActivityError {
  fn from(e: HookError) -> Self {
    ActivityError::Failed(e.to_string())
  }
}
