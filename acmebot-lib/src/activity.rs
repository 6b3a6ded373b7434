use crate::models::{Certificate, ChallengeResult, DomainNameSet, FinalizeInfo, FinalizeOutput, KeyParams, Order, Site};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/* ------------------------------------------------ */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Names of the activities invoked by the certificate orchestrator.
/// The name is recorded in the journal and identifies the step on replay.
pub enum ActivityName {
  Dns01Precondition,
  Http01Precondition,
  Order,
  ClubPalAuthorization,
  Dns01Authorization,
  Http01Authorization,
  CheckHttpChallenge,
  CheckDnsChallenge,
  AnswerChallenges,
  CheckIsReady,
  CleanupClubPalChallenge,
  CleanupDnsChallenge,
  FinalizeOrder,
  CheckIsValid,
  UploadCertificate,
}

impl ActivityName {
  pub const ALL: [ActivityName; 15] = [
    ActivityName::Dns01Precondition,
    ActivityName::Http01Precondition,
    ActivityName::Order,
    ActivityName::ClubPalAuthorization,
    ActivityName::Dns01Authorization,
    ActivityName::Http01Authorization,
    ActivityName::CheckHttpChallenge,
    ActivityName::CheckDnsChallenge,
    ActivityName::AnswerChallenges,
    ActivityName::CheckIsReady,
    ActivityName::CleanupClubPalChallenge,
    ActivityName::CleanupDnsChallenge,
    ActivityName::FinalizeOrder,
    ActivityName::CheckIsValid,
    ActivityName::UploadCertificate,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      ActivityName::Dns01Precondition => "Dns01Precondition",
      ActivityName::Http01Precondition => "Http01Precondition",
      ActivityName::Order => "Order",
      ActivityName::ClubPalAuthorization => "ClubPalAuthorization",
      ActivityName::Dns01Authorization => "Dns01Authorization",
      ActivityName::Http01Authorization => "Http01Authorization",
      ActivityName::CheckHttpChallenge => "CheckHttpChallenge",
      ActivityName::CheckDnsChallenge => "CheckDnsChallenge",
      ActivityName::AnswerChallenges => "AnswerChallenges",
      ActivityName::CheckIsReady => "CheckIsReady",
      ActivityName::CleanupClubPalChallenge => "CleanupClubPalChallenge",
      ActivityName::CleanupDnsChallenge => "CleanupDnsChallenge",
      ActivityName::FinalizeOrder => "FinalizeOrder",
      ActivityName::CheckIsValid => "CheckIsValid",
      ActivityName::UploadCertificate => "UploadCertificate",
    }
  }

  /// Cleanup activities remove challenge artifacts and are best-effort
  pub fn is_cleanup(&self) -> bool {
    matches!(
      self,
      ActivityName::CleanupClubPalChallenge | ActivityName::CleanupDnsChallenge
    )
  }
}

impl fmt::Display for ActivityName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ActivityName {
  type Err = String;
  /// Case-insensitive, accepts `snake_case` as well
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.replace('_', "");
    ActivityName::ALL
      .iter()
      .find(|name| name.as_str().eq_ignore_ascii_case(&normalized))
      .copied()
      .ok_or_else(|| format!("Unknown activity name: {s}"))
  }
}

/* ------------------------------------------------ */
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Failure reported by an activity after its own retries. Journaled and replayed as is.
pub enum ActivityError {
  #[error("{0}")]
  Failed(String),
  #[error("timed out after {waited_secs}s: {reason}")]
  TimedOut { waited_secs: u64, reason: String },
}

pub type ActivityResult<T> = std::result::Result<T, ActivityError>;

/* ------------------------------------------------ */
#[async_trait]
/// Non-deterministic operations invoked by the orchestrator.
///
/// Every method may be executed more than once for the same step (at-least-once semantics):
/// a crash between the invocation and the journal write re-invokes it on resume.
/// Implementations own their retry policy; a returned error is final for the run.
pub trait ActivityCapability: Send + Sync {
  /// Fails if the DNS zones of the given names are not manageable
  async fn dns01_precondition(&self, domain_names: &DomainNameSet) -> ActivityResult<()>;

  /// Fails if the HTTP challenge path of the site is unreachable
  async fn http01_precondition(&self, site: &Site) -> ActivityResult<()>;

  /// Create (or fetch) the ACME order of the given names
  async fn order(&self, domain_names: &DomainNameSet) -> ActivityResult<Order>;

  /// Delegated custom-domain authorization
  async fn club_pal_authorization(&self, site: &Site, authorizations: &[String]) -> ActivityResult<Vec<ChallengeResult>>;

  /// Create TXT records for the authorizations
  async fn dns01_authorization(&self, authorizations: &[String]) -> ActivityResult<Vec<ChallengeResult>>;

  /// Publish challenge files for the authorizations on the site
  async fn http01_authorization(&self, site: &Site, authorizations: &[String]) -> ActivityResult<Vec<ChallengeResult>>;

  /// Fails until every challenge file is observable over HTTP
  async fn check_http_challenge(&self, results: &[ChallengeResult]) -> ActivityResult<()>;

  /// Fails until every TXT record is observable over DNS
  async fn check_dns_challenge(&self, results: &[ChallengeResult]) -> ActivityResult<()>;

  /// Notify the CA that the challenges are ready to be validated
  async fn answer_challenges(&self, results: &[ChallengeResult]) -> ActivityResult<()>;

  /// Bounded wait until the order becomes `ready`
  async fn check_is_ready(&self, order: &Order, results: &[ChallengeResult]) -> ActivityResult<()>;

  async fn cleanup_club_pal_challenge(&self, results: &[ChallengeResult]) -> ActivityResult<()>;

  async fn cleanup_dns_challenge(&self, results: &[ChallengeResult]) -> ActivityResult<()>;

  /// Build the CSR and submit it. Atomic from the orchestrator's point of view.
  async fn finalize_order(&self, domain_names: &DomainNameSet, order: &Order) -> ActivityResult<FinalizeOutput>;

  /// Bounded wait until the order becomes `valid`
  async fn check_is_valid(&self, order: &Order) -> ActivityResult<()>;

  /// Download the certificate and deploy it to the site
  async fn upload_certificate(
    &self,
    site: &Site,
    primary_name: &str,
    force_dns01: bool,
    finalize: &FinalizeInfo,
    key: &KeyParams,
  ) -> ActivityResult<Certificate>;
}
