use crate::{
  activity::{ActivityCapability, ActivityName},
  constants::DNS_PROPAGATION_DELAY_SECS,
  engine::{Workflow, WorkflowContext},
  error::AcmebotResult,
  log::*,
  models::{Certificate, ChallengeResult, DomainNameSet, FinalizeOutput, Order, OrderStatus, Site},
  strategy::{select_strategy, AuthorizationMode},
};
use async_trait::async_trait;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Input of an issuance run, recorded in the journal at start
pub struct IssueCertificateInput {
  pub site: Site,
  pub domain_names: DomainNameSet,
  #[serde(default)]
  pub force_dns01: bool,
}

#[derive(Builder, Debug, Clone)]
/// Tunables of the issuance workflow
pub struct OrchestratorOptions {
  #[builder(default = "Duration::from_secs(DNS_PROPAGATION_DELAY_SECS)")]
  /// Wait between the creation of DNS-01 records and their verification
  pub dns_propagation_delay: Duration,
  #[builder(default = "true")]
  /// Run the strategy cleanup when a step fails after authorization
  pub compensate_on_failure: bool,
}

impl Default for OrchestratorOptions {
  fn default() -> Self {
    Self {
      dns_propagation_delay: Duration::from_secs(DNS_PROPAGATION_DELAY_SECS),
      compensate_on_failure: true,
    }
  }
}

/* ------------------------------------------------ */
/// Certificate issuance workflow over an activity capability
pub struct IssueCertificate {
  activities: Arc<dyn ActivityCapability>,
  options: OrchestratorOptions,
}

impl IssueCertificate {
  pub fn new(activities: Arc<dyn ActivityCapability>, options: OrchestratorOptions) -> Self {
    Self { activities, options }
  }
}

#[async_trait]
impl Workflow for IssueCertificate {
  type Input = IssueCertificateInput;
  type Output = Certificate;

  async fn run(&self, ctx: &mut WorkflowContext, input: &IssueCertificateInput) -> AcmebotResult<Certificate> {
    issue_certificate(ctx, self.activities.as_ref(), input, &self.options).await
  }
}

/// Body of the issuance workflow.
/// Deterministic: all side effects go through activities and the durable timer of the context.
pub async fn issue_certificate(
  ctx: &mut WorkflowContext,
  activities: &dyn ActivityCapability,
  input: &IssueCertificateInput,
  options: &OrchestratorOptions,
) -> AcmebotResult<Certificate> {
  let IssueCertificateInput {
    site,
    domain_names,
    force_dns01,
  } = input;
  let mode = select_strategy(site, domain_names, *force_dns01);
  if !ctx.is_replaying() {
    info!(
      "[{}] Issue certificate for {:?} of site {} with {mode} authorization",
      ctx.run_id(),
      domain_names.as_slice(),
      site.name
    );
  }

  // custom domains are verified by the external controller
  match mode {
    AuthorizationMode::Dns01 => {
      ctx
        .activity(ActivityName::Dns01Precondition, || activities.dns01_precondition(domain_names))
        .await?
    }
    AuthorizationMode::Http01 => {
      ctx
        .activity(ActivityName::Http01Precondition, || activities.http01_precondition(site))
        .await?
    }
    AuthorizationMode::CustomDomain => (),
  }

  let order: Order = ctx
    .activity(ActivityName::Order, || activities.order(domain_names))
    .await?;

  if order.status == OrderStatus::Ready {
    debug!("[{}] Order is already ready, skip authorization", ctx.run_id());
  } else {
    authorize(ctx, activities, input, mode, &order, options).await?;
  }

  let FinalizeOutput { finalize, key } = ctx
    .activity(ActivityName::FinalizeOrder, || activities.finalize_order(domain_names, &order))
    .await?;

  if order.status != OrderStatus::Valid {
    ctx
      .activity(ActivityName::CheckIsValid, || activities.check_is_valid(&order))
      .await?;
  }

  ctx
    .activity(ActivityName::UploadCertificate, || {
      activities.upload_certificate(site, domain_names.primary(), *force_dns01, &finalize, &key)
    })
    .await
}

/// Authorization phase: authorize, verify, answer, wait for the order to be ready, then clean up
async fn authorize(
  ctx: &mut WorkflowContext,
  activities: &dyn ActivityCapability,
  input: &IssueCertificateInput,
  mode: AuthorizationMode,
  order: &Order,
  options: &OrchestratorOptions,
) -> AcmebotResult<()> {
  let authorizations = order.authorizations.as_slice();
  let results: Vec<ChallengeResult> = match mode {
    AuthorizationMode::CustomDomain => {
      ctx
        .activity(ActivityName::ClubPalAuthorization, || {
          activities.club_pal_authorization(&input.site, authorizations)
        })
        .await?
    }
    AuthorizationMode::Dns01 => {
      ctx
        .activity(ActivityName::Dns01Authorization, || activities.dns01_authorization(authorizations))
        .await?
    }
    AuthorizationMode::Http01 => {
      ctx
        .activity(ActivityName::Http01Authorization, || {
          activities.http01_authorization(&input.site, authorizations)
        })
        .await?
    }
  };

  if let Err(e) = verify_and_answer(ctx, activities, mode, order, &results, options).await {
    if options.compensate_on_failure && e.is_activity_failure() {
      warn!("[{}] Step after authorization failed, clean up challenges", ctx.run_id());
      if let Err(cleanup_error) = cleanup(ctx, activities, mode, &results).await {
        warn!("[{}] Failed to clean up challenges: {cleanup_error}", ctx.run_id());
      }
    }
    return Err(e);
  }

  cleanup(ctx, activities, mode, &results).await
}

async fn verify_and_answer(
  ctx: &mut WorkflowContext,
  activities: &dyn ActivityCapability,
  mode: AuthorizationMode,
  order: &Order,
  results: &[ChallengeResult],
  options: &OrchestratorOptions,
) -> AcmebotResult<()> {
  match mode {
    AuthorizationMode::Dns01 => {
      ctx.timer(options.dns_propagation_delay).await?;
      ctx
        .activity(ActivityName::CheckDnsChallenge, || activities.check_dns_challenge(results))
        .await?
    }
    AuthorizationMode::CustomDomain | AuthorizationMode::Http01 => {
      ctx
        .activity(ActivityName::CheckHttpChallenge, || activities.check_http_challenge(results))
        .await?
    }
  }

  ctx
    .activity(ActivityName::AnswerChallenges, || activities.answer_challenges(results))
    .await?;

  ctx
    .activity(ActivityName::CheckIsReady, || activities.check_is_ready(order, results))
    .await
}

async fn cleanup(
  ctx: &mut WorkflowContext,
  activities: &dyn ActivityCapability,
  mode: AuthorizationMode,
  results: &[ChallengeResult],
) -> AcmebotResult<()> {
  match mode {
    AuthorizationMode::CustomDomain => {
      ctx
        .activity(ActivityName::CleanupClubPalChallenge, || {
          activities.cleanup_club_pal_challenge(results)
        })
        .await
    }
    AuthorizationMode::Dns01 => {
      ctx
        .activity(ActivityName::CleanupDnsChallenge, || activities.cleanup_dns_challenge(results))
        .await
    }
    // challenge files are left to the site
    AuthorizationMode::Http01 => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    engine::{JournalEvent, JournalStore, MemoryJournalStore, RunId, StepKind, WorkflowRuntime},
    error::AcmebotError,
    testing::{CrashingStore, RecordingActivities},
  };
  use ActivityName::{
    AnswerChallenges, CheckDnsChallenge, CheckHttpChallenge, CheckIsReady, CheckIsValid, CleanupClubPalChallenge,
    CleanupDnsChallenge, ClubPalAuthorization, Dns01Authorization, Dns01Precondition, FinalizeOrder, Http01Authorization,
    Http01Precondition, Order, UploadCertificate,
  };

  fn input(kind: &str, names: &[&str], force_dns01: bool) -> IssueCertificateInput {
    IssueCertificateInput {
      site: Site::new("shop", kind),
      domain_names: DomainNameSet::try_new(names).unwrap(),
      force_dns01,
    }
  }

  fn scenario_a() -> IssueCertificateInput {
    input("app,linux", &["*.tenant.clubpal.net"], false)
  }

  async fn issue(
    activities: Arc<RecordingActivities>,
    input: &IssueCertificateInput,
    options: OrchestratorOptions,
  ) -> (AcmebotResult<Certificate>, WorkflowRuntime) {
    let runtime = WorkflowRuntime::new(Arc::new(MemoryJournalStore::new()));
    let workflow = IssueCertificate::new(activities, options);
    let run_id = RunId::first_for(&input).unwrap();
    let res = runtime.start(&workflow, &run_id, input).await;
    (res, runtime)
  }

  #[tokio::test(start_paused = true)]
  async fn wildcard_on_linux_site_uses_dns01() {
    let activities = Arc::new(RecordingActivities::new());
    let input = scenario_a();
    let started = tokio::time::Instant::now();
    let (res, runtime) = issue(activities.clone(), &input, OrchestratorOptions::default()).await;

    let certificate = res.unwrap();
    assert_eq!(certificate.subject_names, vec!["*.tenant.clubpal.net".to_string()]);
    assert!(started.elapsed() >= Duration::from_secs(DNS_PROPAGATION_DELAY_SECS));
    assert_eq!(
      activities.calls(),
      vec![
        Dns01Precondition,
        Order,
        Dns01Authorization,
        CheckDnsChallenge,
        AnswerChallenges,
        CheckIsReady,
        CleanupDnsChallenge,
        FinalizeOrder,
        CheckIsValid,
        UploadCertificate
      ]
    );
    let summary = runtime
      .inspect(&RunId::first_for(&input).unwrap())
      .await
      .unwrap();
    assert_eq!(summary.steps[3], StepKind::Timer { delay_ms: 10_000 });
    assert_eq!(summary.steps.len(), 11);
  }

  #[tokio::test]
  async fn custom_domain_skips_precondition() {
    let activities = Arc::new(RecordingActivities::new());
    let (res, _) = issue(
      activities.clone(),
      &input("app", &["app.contoso.com"], false),
      OrchestratorOptions::default(),
    )
    .await;
    res.unwrap();
    assert_eq!(
      activities.calls(),
      vec![
        Order,
        ClubPalAuthorization,
        CheckHttpChallenge,
        AnswerChallenges,
        CheckIsReady,
        CleanupClubPalChallenge,
        FinalizeOrder,
        CheckIsValid,
        UploadCertificate
      ]
    );
  }

  #[tokio::test]
  async fn custom_domain_overrides_dns01() {
    let activities = Arc::new(RecordingActivities::new());
    let (res, _) = issue(
      activities.clone(),
      &input("app,container", &["*.contoso.com"], true),
      OrchestratorOptions::default(),
    )
    .await;
    res.unwrap();
    let calls = activities.calls();
    assert!(calls.contains(&ClubPalAuthorization));
    assert!(!calls.contains(&Dns01Precondition));
    assert!(!calls.contains(&Dns01Authorization));
  }

  #[tokio::test]
  async fn http01_has_no_cleanup() {
    let activities = Arc::new(RecordingActivities::new());
    let (res, _) = issue(
      activities.clone(),
      &input("app", &["www.shop.clubpal.net", "shop.clubpal.net"], false),
      OrchestratorOptions::default(),
    )
    .await;
    assert_eq!(res.unwrap().subject_names, vec!["www.shop.clubpal.net".to_string()]);
    assert_eq!(
      activities.calls(),
      vec![
        Http01Precondition,
        Order,
        Http01Authorization,
        CheckHttpChallenge,
        AnswerChallenges,
        CheckIsReady,
        FinalizeOrder,
        CheckIsValid,
        UploadCertificate
      ]
    );
  }

  #[tokio::test(start_paused = true)]
  async fn forced_dns01_on_http_site() {
    let activities = Arc::new(RecordingActivities::new());
    let (res, _) = issue(
      activities.clone(),
      &input("app", &["shop.clubpal.net"], true),
      OrchestratorOptions::default(),
    )
    .await;
    res.unwrap();
    assert_eq!(activities.calls()[..3], [Dns01Precondition, Order, Dns01Authorization]);
  }

  #[tokio::test]
  async fn ready_order_skips_authorization() {
    let activities = Arc::new(RecordingActivities::new().with_order_status(OrderStatus::Ready));
    let (res, _) = issue(
      activities.clone(),
      &input("app", &["app.contoso.com"], false),
      OrchestratorOptions::default(),
    )
    .await;
    res.unwrap();
    assert_eq!(activities.calls(), vec![Order, FinalizeOrder, CheckIsValid, UploadCertificate]);
  }

  #[tokio::test]
  async fn valid_order_skips_valid_wait() {
    let activities = Arc::new(RecordingActivities::new().with_order_status(OrderStatus::Valid));
    let (res, _) = issue(
      activities.clone(),
      &input("app", &["shop.clubpal.net"], false),
      OrchestratorOptions::default(),
    )
    .await;
    res.unwrap();
    let calls = activities.calls();
    assert!(!calls.contains(&CheckIsValid));
    assert_eq!(calls[calls.len() - 2..], [FinalizeOrder, UploadCertificate]);
  }

  #[tokio::test]
  async fn precondition_failure_aborts_run() {
    let activities = Arc::new(RecordingActivities::new().failing(Http01Precondition));
    let (res, _) = issue(
      activities.clone(),
      &input("app", &["shop.clubpal.net"], false),
      OrchestratorOptions::default(),
    )
    .await;
    assert!(matches!(
      res,
      Err(AcmebotError::PreconditionFailure {
        activity: Http01Precondition,
        ..
      })
    ));
    assert_eq!(activities.calls(), vec![Http01Precondition]);
  }

  #[tokio::test(start_paused = true)]
  async fn failure_after_authorization_is_compensated() {
    let activities = Arc::new(RecordingActivities::new().failing(CheckIsReady));
    let (res, _) = issue(activities.clone(), &scenario_a(), OrchestratorOptions::default()).await;
    assert!(matches!(res, Err(AcmebotError::VerificationTimeout { .. })));
    assert_eq!(
      activities.calls(),
      vec![
        Dns01Precondition,
        Order,
        Dns01Authorization,
        CheckDnsChallenge,
        AnswerChallenges,
        CheckIsReady,
        CleanupDnsChallenge
      ]
    );
  }

  #[tokio::test]
  async fn failing_compensation_keeps_step_error() {
    let activities = Arc::new(
      RecordingActivities::new()
        .failing(CheckHttpChallenge)
        .failing(CleanupClubPalChallenge),
    );
    let (res, _) = issue(
      activities.clone(),
      &input("app", &["app.contoso.com"], false),
      OrchestratorOptions::default(),
    )
    .await;
    assert!(matches!(
      res,
      Err(AcmebotError::AuthorizationFailure {
        activity: CheckHttpChallenge,
        ..
      })
    ));
    assert_eq!(activities.calls().last(), Some(&CleanupClubPalChallenge));
  }

  #[tokio::test(start_paused = true)]
  async fn compensation_can_be_disabled() {
    let activities = Arc::new(RecordingActivities::new().failing(CheckDnsChallenge));
    let options = OrchestratorOptionsBuilder::default()
      .compensate_on_failure(false)
      .build()
      .unwrap();
    let (res, _) = issue(activities.clone(), &scenario_a(), options).await;
    assert!(matches!(res, Err(AcmebotError::AuthorizationFailure { .. })));
    assert_eq!(activities.calls().last(), Some(&CheckDnsChallenge));
  }

  #[tokio::test(start_paused = true)]
  async fn cancellation_during_propagation_delay_is_not_compensated() {
    let activities = Arc::new(RecordingActivities::new());
    let runtime = Arc::new(WorkflowRuntime::new(Arc::new(MemoryJournalStore::new())));
    let handle = {
      let runtime = runtime.clone();
      let workflow = IssueCertificate::new(activities.clone(), OrchestratorOptions::default());
      tokio::spawn(async move {
        let input = scenario_a();
        let run_id = RunId::first_for(&input).unwrap();
        runtime.start(&workflow, &run_id, &input).await
      })
    };
    tokio::time::sleep(Duration::from_secs(5)).await;
    runtime.cancel();
    assert!(matches!(handle.await.unwrap(), Err(AcmebotError::Cancelled)));
    assert_eq!(activities.calls(), vec![Dns01Precondition, Order, Dns01Authorization]);
  }

  #[tokio::test(start_paused = true)]
  async fn resume_after_crash_reproduces_remaining_sequence() {
    let input = scenario_a();
    let run_id = RunId::first_for(&input).unwrap();

    let fresh = Arc::new(RecordingActivities::new());
    let (res, _) = issue(fresh.clone(), &input, OrchestratorOptions::default()).await;
    let expected_certificate = res.unwrap();
    let fresh_calls = fresh.calls();

    // RunStarted, 10 activities with 2 events each, TimerCreated, TimerFired, RunCompleted
    let total_appends = 24;
    for appends in 1..total_appends {
      let store = Arc::new(MemoryJournalStore::new());
      let crashing = WorkflowRuntime::new(Arc::new(CrashingStore::new(store.clone(), appends)));
      let workflow = IssueCertificate::new(Arc::new(RecordingActivities::new()), OrchestratorOptions::default());
      let res = crashing.start(&workflow, &run_id, &input).await;
      assert!(matches!(res, Err(AcmebotError::Journal(_))), "appends={appends}");

      let events = store.load(&run_id).await.unwrap().unwrap();
      assert_eq!(events.len(), appends);
      let completed = events
        .iter()
        .filter(|e| matches!(e, JournalEvent::ActivityCompleted { .. }))
        .count();

      let resumed = Arc::new(RecordingActivities::new());
      let runtime = WorkflowRuntime::new(store);
      let workflow = IssueCertificate::new(resumed.clone(), OrchestratorOptions::default());
      let certificate = runtime.resume(&workflow, &run_id).await.unwrap();
      assert_eq!(certificate, expected_certificate, "appends={appends}");
      assert_eq!(resumed.calls(), fresh_calls[completed..], "appends={appends}");
    }
  }

  #[tokio::test(start_paused = true)]
  async fn replay_of_failed_step_after_recovery_stays_failed() {
    let activities = Arc::new(RecordingActivities::new().failing(FinalizeOrder));
    let input = input("app", &["app.contoso.com"], false);
    let run_id = RunId::first_for(&input).unwrap();
    let runtime = WorkflowRuntime::new(Arc::new(MemoryJournalStore::new()));
    let workflow = IssueCertificate::new(activities.clone(), OrchestratorOptions::default());
    assert!(matches!(
      runtime.start(&workflow, &run_id, &input).await,
      Err(AcmebotError::CaFinalizeFailure { .. })
    ));

    activities.recover(FinalizeOrder);
    let calls = activities.calls().len();
    assert!(matches!(
      runtime.resume(&workflow, &run_id).await,
      Err(AcmebotError::RunFailed { .. })
    ));
    assert_eq!(activities.calls().len(), calls);
  }
}
