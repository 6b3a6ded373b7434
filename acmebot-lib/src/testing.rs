//! Test doubles of the activity capability and the journal store
use crate::{
  activity::{ActivityCapability, ActivityError, ActivityName, ActivityResult},
  engine::{JournalEvent, JournalStore, MemoryJournalStore, RunId},
  error::{AcmebotError, AcmebotResult},
  models::*,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rustc_hash::FxHashMap as HashMap;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc, Mutex,
};

/// Activity capability answering with canned values and logging every invocation
pub(crate) struct RecordingActivities {
  order_status: OrderStatus,
  failures: Mutex<HashMap<ActivityName, ActivityError>>,
  calls: Mutex<Vec<ActivityName>>,
}

impl RecordingActivities {
  pub(crate) fn new() -> Self {
    Self {
      order_status: OrderStatus::Pending,
      failures: Mutex::new(HashMap::default()),
      calls: Mutex::new(Vec::new()),
    }
  }

  /// Status of the order snapshot returned by `Order`
  pub(crate) fn with_order_status(mut self, status: OrderStatus) -> Self {
    self.order_status = status;
    self
  }

  /// Make every invocation of the activity fail
  pub(crate) fn failing(self, activity: ActivityName) -> Self {
    self.fail(activity);
    self
  }

  pub(crate) fn fail(&self, activity: ActivityName) {
    self
      .failures
      .lock()
      .unwrap()
      .insert(activity, ActivityError::Failed(format!("injected failure of {activity}")));
  }

  pub(crate) fn recover(&self, activity: ActivityName) {
    self.failures.lock().unwrap().remove(&activity);
  }

  pub(crate) fn calls(&self) -> Vec<ActivityName> {
    self.calls.lock().unwrap().clone()
  }

  fn invoked(&self, activity: ActivityName) -> ActivityResult<()> {
    self.calls.lock().unwrap().push(activity);
    match self.failures.lock().unwrap().get(&activity) {
      Some(error) => Err(error.clone()),
      None => Ok(()),
    }
  }

  fn challenges(authorizations: &[String], dns: bool) -> Vec<ChallengeResult> {
    authorizations
      .iter()
      .map(|authz| {
        let domain = authz.rsplit('/').next().unwrap_or_default().to_string();
        let proof = if dns {
          ChallengeProof::Dns01 {
            record_name: format!("_acme-challenge.{}", domain.trim_start_matches("*.")),
            record_value: "dns-digest".to_string(),
          }
        } else {
          ChallengeProof::Http01 {
            resource_url: format!("http://{domain}/.well-known/acme-challenge/token"),
            resource_path: ".well-known/acme-challenge/token".to_string(),
            resource_value: "token.thumbprint".to_string(),
          }
        };
        ChallengeResult {
          url: format!("{authz}/challenge"),
          domain,
          proof,
        }
      })
      .collect()
  }
}

#[async_trait]
impl ActivityCapability for RecordingActivities {
  async fn dns01_precondition(&self, _domain_names: &DomainNameSet) -> ActivityResult<()> {
    self.invoked(ActivityName::Dns01Precondition)
  }

  async fn http01_precondition(&self, _site: &Site) -> ActivityResult<()> {
    self.invoked(ActivityName::Http01Precondition)
  }

  async fn order(&self, domain_names: &DomainNameSet) -> ActivityResult<Order> {
    self.invoked(ActivityName::Order)?;
    Ok(Order {
      location: "https://acme.test/order/1".to_string(),
      status: self.order_status,
      authorizations: domain_names
        .iter()
        .map(|name| format!("https://acme.test/authz/{name}"))
        .collect(),
      finalize: "https://acme.test/order/1/finalize".to_string(),
    })
  }

  async fn club_pal_authorization(&self, _site: &Site, authorizations: &[String]) -> ActivityResult<Vec<ChallengeResult>> {
    self.invoked(ActivityName::ClubPalAuthorization)?;
    Ok(Self::challenges(authorizations, false))
  }

  async fn dns01_authorization(&self, authorizations: &[String]) -> ActivityResult<Vec<ChallengeResult>> {
    self.invoked(ActivityName::Dns01Authorization)?;
    Ok(Self::challenges(authorizations, true))
  }

  async fn http01_authorization(&self, _site: &Site, authorizations: &[String]) -> ActivityResult<Vec<ChallengeResult>> {
    self.invoked(ActivityName::Http01Authorization)?;
    Ok(Self::challenges(authorizations, false))
  }

  async fn check_http_challenge(&self, _results: &[ChallengeResult]) -> ActivityResult<()> {
    self.invoked(ActivityName::CheckHttpChallenge)
  }

  async fn check_dns_challenge(&self, _results: &[ChallengeResult]) -> ActivityResult<()> {
    self.invoked(ActivityName::CheckDnsChallenge)
  }

  async fn answer_challenges(&self, _results: &[ChallengeResult]) -> ActivityResult<()> {
    self.invoked(ActivityName::AnswerChallenges)
  }

  async fn check_is_ready(&self, _order: &Order, _results: &[ChallengeResult]) -> ActivityResult<()> {
    self.invoked(ActivityName::CheckIsReady)
  }

  async fn cleanup_club_pal_challenge(&self, _results: &[ChallengeResult]) -> ActivityResult<()> {
    self.invoked(ActivityName::CleanupClubPalChallenge)
  }

  async fn cleanup_dns_challenge(&self, _results: &[ChallengeResult]) -> ActivityResult<()> {
    self.invoked(ActivityName::CleanupDnsChallenge)
  }

  async fn finalize_order(&self, _domain_names: &DomainNameSet, order: &Order) -> ActivityResult<FinalizeOutput> {
    self.invoked(ActivityName::FinalizeOrder)?;
    Ok(FinalizeOutput {
      finalize: FinalizeInfo {
        location: order.location.clone(),
        status: OrderStatus::Valid,
        certificate_url: Some("https://acme.test/cert/1".to_string()),
      },
      key: KeyParams {
        key_ref: "key-1".to_string(),
        algorithm: "ES256".to_string(),
      },
    })
  }

  async fn check_is_valid(&self, _order: &Order) -> ActivityResult<()> {
    self.invoked(ActivityName::CheckIsValid)
  }

  async fn upload_certificate(
    &self,
    site: &Site,
    primary_name: &str,
    _force_dns01: bool,
    _finalize: &FinalizeInfo,
    key: &KeyParams,
  ) -> ActivityResult<Certificate> {
    self.invoked(ActivityName::UploadCertificate)?;
    Ok(Certificate {
      name: format!("{}-{}", site.name, primary_name.replace('*', "wildcard")),
      thumbprint: "0123456789ABCDEF".to_string(),
      subject_names: vec![primary_name.to_string()],
      issuer: "Test CA".to_string(),
      expires_on: Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap(),
      key_ref: key.key_ref.clone(),
    })
  }
}

/* ------------------------------------------------ */
/// Journal store losing its backing storage after a number of appends, i.e., a crashing process
pub(crate) struct CrashingStore {
  inner: Arc<MemoryJournalStore>,
  remaining_appends: AtomicUsize,
}

impl CrashingStore {
  pub(crate) fn new(inner: Arc<MemoryJournalStore>, appends: usize) -> Self {
    Self {
      inner,
      remaining_appends: AtomicUsize::new(appends),
    }
  }

  fn write(&self) -> AcmebotResult<()> {
    let remaining = self.remaining_appends.load(Ordering::SeqCst);
    if remaining == 0 {
      return Err(AcmebotError::Journal(std::io::Error::other("crashed")));
    }
    self.remaining_appends.store(remaining - 1, Ordering::SeqCst);
    Ok(())
  }
}

#[async_trait]
impl JournalStore for CrashingStore {
  async fn load(&self, run_id: &RunId) -> AcmebotResult<Option<Vec<JournalEvent>>> {
    self.inner.load(run_id).await
  }

  async fn create(&self, run_id: &RunId, event: &JournalEvent) -> AcmebotResult<bool> {
    self.write()?;
    self.inner.create(run_id, event).await
  }

  async fn append(&self, run_id: &RunId, event: &JournalEvent) -> AcmebotResult<()> {
    self.write()?;
    self.inner.append(run_id, event).await
  }

  async fn list_runs(&self) -> AcmebotResult<Vec<RunId>> {
    self.inner.list_runs().await
  }
}
