use crate::{
  activity::{ActivityError, ActivityName},
  engine::RunId,
};
use thiserror::Error;

pub type AcmebotResult<T> = std::result::Result<T, AcmebotError>;

/// Describes things that can go wrong in an issuance run
#[derive(Debug, Error)]
pub enum AcmebotError {
  // issuance failures, classified from the failed activity
  #[error("Precondition failed ({activity}): {error}")]
  PreconditionFailure { activity: ActivityName, error: ActivityError },
  #[error("Failed to create ACME order: {error}")]
  OrderFailure { error: ActivityError },
  #[error("Authorization failed ({activity}): {error}")]
  AuthorizationFailure { activity: ActivityName, error: ActivityError },
  #[error("Order did not become ready: {error}")]
  VerificationTimeout { error: ActivityError },
  #[error("Failed to finalize order: {error}")]
  CaFinalizeFailure { error: ActivityError },
  #[error("Order did not become valid: {error}")]
  ValidationTimeout { error: ActivityError },
  #[error("Failed to upload certificate: {error}")]
  UploadFailure { error: ActivityError },

  // engine errors
  #[error("Non-deterministic replay at step {seq}: expected {expected}, journal has {recorded}")]
  NonDeterministicReplay {
    seq: usize,
    expected: String,
    recorded: String,
  },
  #[error("Run {0} was started with a different input")]
  InputMismatch(RunId),
  #[error("Run {0} has been started concurrently")]
  ConcurrentStart(RunId),
  #[error("Run not found: {0}")]
  RunNotFound(RunId),
  #[error("Run {run_id} failed: {reason}")]
  RunFailed { run_id: RunId, reason: String },
  #[error("Run cancelled")]
  Cancelled,
  #[error("Run stopped by shutdown")]
  Interrupted,
  #[error("Corrupted journal: {0}")]
  CorruptedJournal(String),
  #[error("Invalid input: {0}")]
  InvalidInput(String),

  // general errors
  #[error("Journal IO error: {0}")]
  Journal(#[from] std::io::Error),
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl AcmebotError {
  /// Classify a final activity failure by the activity that reported it
  pub fn from_activity(activity: ActivityName, error: ActivityError) -> Self {
    match activity {
      ActivityName::Dns01Precondition | ActivityName::Http01Precondition => {
        AcmebotError::PreconditionFailure { activity, error }
      }
      ActivityName::Order => AcmebotError::OrderFailure { error },
      ActivityName::ClubPalAuthorization
      | ActivityName::Dns01Authorization
      | ActivityName::Http01Authorization
      | ActivityName::CheckHttpChallenge
      | ActivityName::CheckDnsChallenge
      | ActivityName::AnswerChallenges
      | ActivityName::CleanupClubPalChallenge
      | ActivityName::CleanupDnsChallenge => AcmebotError::AuthorizationFailure { activity, error },
      ActivityName::CheckIsReady => AcmebotError::VerificationTimeout { error },
      ActivityName::FinalizeOrder => AcmebotError::CaFinalizeFailure { error },
      ActivityName::CheckIsValid => AcmebotError::ValidationTimeout { error },
      ActivityName::UploadCertificate => AcmebotError::UploadFailure { error },
    }
  }

  /// Returns true if the error is a final activity failure, which terminates the run.
  /// Other errors leave the run resumable (journal IO, shutdown) or stop it deliberately (cancellation).
  pub fn is_activity_failure(&self) -> bool {
    matches!(
      self,
      AcmebotError::PreconditionFailure { .. }
        | AcmebotError::OrderFailure { .. }
        | AcmebotError::AuthorizationFailure { .. }
        | AcmebotError::VerificationTimeout { .. }
        | AcmebotError::CaFinalizeFailure { .. }
        | AcmebotError::ValidationTimeout { .. }
        | AcmebotError::UploadFailure { .. }
    )
  }
}
