use crate::{
  constants::INVOCATION_TIMEOUT_SECS,
  error::{HookError, HookResult},
  hook::HookCommand,
  log::*,
  retry::{poll_until_success, PollPolicy},
};
use acmebot_lib::{
  ActivityCapability, ActivityName, ActivityResult, Certificate, ChallengeResult, DomainNameSet, FinalizeInfo,
  FinalizeOutput, KeyParams, Order, Site, CHECK_INTERVAL_SECS, CHECK_TIMEOUT_SECS,
};
use async_trait::async_trait;
use derive_builder::Builder;
use rustc_hash::FxHashMap as HashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/* ------------------------------------------------ */
// Hook inputs, written as JSON on stdin

#[derive(Serialize)]
struct DomainNamesInput<'a> {
  domain_names: &'a DomainNameSet,
}

#[derive(Serialize)]
struct SiteInput<'a> {
  site: &'a Site,
}

#[derive(Serialize)]
struct AuthorizationInput<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  site: Option<&'a Site>,
  authorizations: &'a [String],
}

#[derive(Serialize)]
struct ChallengesInput<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  order: Option<&'a Order>,
  results: &'a [ChallengeResult],
}

#[derive(Serialize)]
struct OrderInput<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  domain_names: Option<&'a DomainNameSet>,
  order: &'a Order,
}

#[derive(Serialize)]
struct UploadInput<'a> {
  site: &'a Site,
  primary_name: &'a str,
  force_dns01: bool,
  finalize: &'a FinalizeInfo,
  key: &'a KeyParams,
}

/* ------------------------------------------------ */
#[derive(Builder, Debug, Clone)]
/// Activity capability running one configured program per activity
pub struct HookActivities {
  #[builder(setter(custom), default)]
  hooks: HashMap<ActivityName, HookCommand>,

  #[builder(default = "Duration::from_secs(CHECK_TIMEOUT_SECS)")]
  /// Retry window of polling activities
  check_timeout: Duration,

  #[builder(default = "Duration::from_secs(CHECK_INTERVAL_SECS)")]
  check_interval: Duration,

  #[builder(default = "Duration::from_secs(INVOCATION_TIMEOUT_SECS)")]
  /// Upper bound of a single hook execution
  invocation_timeout: Duration,
}

impl HookActivitiesBuilder {
  pub fn hook(&mut self, activity: ActivityName, command: HookCommand) -> &mut Self {
    self.hooks.get_or_insert_with(HashMap::default).insert(activity, command);
    self
  }
}

impl HookActivities {
  /// Activities without a configured hook
  pub fn missing_hooks(&self) -> Vec<ActivityName> {
    ActivityName::ALL
      .iter()
      .filter(|activity| !self.hooks.contains_key(*activity))
      .copied()
      .collect()
  }

  async fn call<I: Serialize>(&self, activity: ActivityName, input: &I) -> HookResult<String> {
    let command = self.hooks.get(&activity).ok_or(HookError::MissingHook(activity))?;
    let input = serde_json::to_vec(input)?;
    command.run(activity, &input, self.invocation_timeout).await
  }

  /// Single call of an activity without output
  async fn invoke<I: Serialize>(&self, activity: ActivityName, input: &I) -> ActivityResult<()> {
    self.call(activity, input).await?;
    Ok(())
  }

  /// Single call of an activity whose stdout is a JSON document
  async fn invoke_with_output<I, O>(&self, activity: ActivityName, input: &I) -> ActivityResult<O>
  where
    I: Serialize,
    O: DeserializeOwned,
  {
    let stdout = self.call(activity, input).await?;
    let output = serde_json::from_str(&stdout).map_err(|source| HookError::InvalidOutput { activity, source })?;
    Ok(output)
  }

  /// Polling activity, the hook is run again until it succeeds or the check window elapses
  async fn poll<I: Serialize + Sync>(&self, activity: ActivityName, input: &I) -> ActivityResult<()> {
    let policy = PollPolicy {
      timeout: self.check_timeout,
      interval: self.check_interval,
    };
    poll_until_success(activity, policy, || self.call(activity, input)).await
  }

  /// Best-effort cleanup, failures are only logged
  async fn cleanup<I: Serialize + Sync>(&self, activity: ActivityName, input: &I) -> ActivityResult<()> {
    match self.call(activity, input).await {
      Ok(_) => (),
      Err(HookError::MissingHook(_)) => warn!("No hook configured for {activity}, skip cleanup"),
      Err(e) => warn!("Cleanup failed, ignored: {e}"),
    }
    Ok(())
  }
}

#[async_trait]
impl ActivityCapability for HookActivities {
  async fn dns01_precondition(&self, domain_names: &DomainNameSet) -> ActivityResult<()> {
    self
      .invoke(ActivityName::Dns01Precondition, &DomainNamesInput { domain_names })
      .await
  }

  async fn http01_precondition(&self, site: &Site) -> ActivityResult<()> {
    self.invoke(ActivityName::Http01Precondition, &SiteInput { site }).await
  }

  async fn order(&self, domain_names: &DomainNameSet) -> ActivityResult<Order> {
    self
      .invoke_with_output(ActivityName::Order, &DomainNamesInput { domain_names })
      .await
  }

  async fn club_pal_authorization(&self, site: &Site, authorizations: &[String]) -> ActivityResult<Vec<ChallengeResult>> {
    let input = AuthorizationInput {
      site: Some(site),
      authorizations,
    };
    self.invoke_with_output(ActivityName::ClubPalAuthorization, &input).await
  }

  async fn dns01_authorization(&self, authorizations: &[String]) -> ActivityResult<Vec<ChallengeResult>> {
    let input = AuthorizationInput {
      site: None,
      authorizations,
    };
    self.invoke_with_output(ActivityName::Dns01Authorization, &input).await
  }

  async fn http01_authorization(&self, site: &Site, authorizations: &[String]) -> ActivityResult<Vec<ChallengeResult>> {
    let input = AuthorizationInput {
      site: Some(site),
      authorizations,
    };
    self.invoke_with_output(ActivityName::Http01Authorization, &input).await
  }

  async fn check_http_challenge(&self, results: &[ChallengeResult]) -> ActivityResult<()> {
    let input = ChallengesInput { order: None, results };
    self.poll(ActivityName::CheckHttpChallenge, &input).await
  }

  async fn check_dns_challenge(&self, results: &[ChallengeResult]) -> ActivityResult<()> {
    let input = ChallengesInput { order: None, results };
    self.poll(ActivityName::CheckDnsChallenge, &input).await
  }

  async fn answer_challenges(&self, results: &[ChallengeResult]) -> ActivityResult<()> {
    let input = ChallengesInput { order: None, results };
    self.invoke(ActivityName::AnswerChallenges, &input).await
  }

  async fn check_is_ready(&self, order: &Order, results: &[ChallengeResult]) -> ActivityResult<()> {
    let input = ChallengesInput {
      order: Some(order),
      results,
    };
    self.poll(ActivityName::CheckIsReady, &input).await
  }

  async fn cleanup_club_pal_challenge(&self, results: &[ChallengeResult]) -> ActivityResult<()> {
    let input = ChallengesInput { order: None, results };
    self.cleanup(ActivityName::CleanupClubPalChallenge, &input).await
  }

  async fn cleanup_dns_challenge(&self, results: &[ChallengeResult]) -> ActivityResult<()> {
    let input = ChallengesInput { order: None, results };
    self.cleanup(ActivityName::CleanupDnsChallenge, &input).await
  }

  async fn finalize_order(&self, domain_names: &DomainNameSet, order: &Order) -> ActivityResult<FinalizeOutput> {
    let input = OrderInput {
      domain_names: Some(domain_names),
      order,
    };
    self.invoke_with_output(ActivityName::FinalizeOrder, &input).await
  }

  async fn check_is_valid(&self, order: &Order) -> ActivityResult<()> {
    let input = OrderInput {
      domain_names: None,
      order,
    };
    self.poll(ActivityName::CheckIsValid, &input).await
  }

  async fn upload_certificate(
    &self,
    site: &Site,
    primary_name: &str,
    force_dns01: bool,
    finalize: &FinalizeInfo,
    key: &KeyParams,
  ) -> ActivityResult<Certificate> {
    let input = UploadInput {
      site,
      primary_name,
      force_dns01,
      finalize,
      key,
    };
    self.invoke_with_output(ActivityName::UploadCertificate, &input).await
  }
}
