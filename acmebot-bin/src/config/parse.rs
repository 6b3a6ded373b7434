use super::toml::ConfigToml;
use crate::error::{anyhow, ensure};
use acmebot_hooks::{HookActivities, HookActivitiesBuilder};
use acmebot_lib::{
  ActivityName, DomainNameSet, IssueCertificateInput, OrchestratorOptions, OrchestratorOptionsBuilder, Site, JOURNAL_DIR_PATH,
};
use clap::{Arg, ArgAction};
use std::{path::PathBuf, time::Duration};

/// Parsed options
pub struct Opts {
  pub config_file_path: String,
  pub request: Option<String>,
  pub resume: Option<String>,
  pub inspect: bool,
}

/// Parse arg values passed from cli
pub fn parse_opts() -> Result<Opts, anyhow::Error> {
  let _ = include_str!("../../Cargo.toml");
  let options = clap::command!()
    .arg(
      Arg::new("config_file")
        .long("config")
        .short('c')
        .value_name("FILE")
        .required(true)
        .help("Configuration file path like ./config.toml"),
    )
    .arg(
      Arg::new("request")
        .long("request")
        .short('r')
        .value_name("NAME")
        .conflicts_with_all(["resume", "inspect"])
        .help("Issue only the certificate of the named request"),
    )
    .arg(
      Arg::new("resume")
        .long("resume")
        .value_name("RUN_ID")
        .conflicts_with("inspect")
        .help("Resume a recorded run from its journal"),
    )
    .arg(
      Arg::new("inspect")
        .long("inspect")
        .action(ArgAction::SetTrue)
        .help("Print the summaries of the recorded runs and exit"),
    );
  let matches = options.get_matches();

  ///////////////////////////////////
  let config_file_path = matches
    .get_one::<String>("config_file")
    .ok_or(anyhow!("Missing config file"))?
    .to_owned();
  let request = matches.get_one::<String>("request").cloned();
  let resume = matches.get_one::<String>("resume").cloned();
  let inspect = matches.get_flag("inspect");

  Ok(Opts {
    config_file_path,
    request,
    resume,
    inspect,
  })
}

/// Settings built from the config file
pub struct Settings {
  pub journal_dir: PathBuf,
  pub options: OrchestratorOptions,
  pub activities: HookActivities,
  /// Issuance requests sorted by name
  pub requests: Vec<(String, IssueCertificateInput)>,
}

pub fn build_settings(config: &ConfigToml) -> std::result::Result<Settings, anyhow::Error> {
  let journal_dir = PathBuf::from(config.journal_dir.as_deref().unwrap_or(JOURNAL_DIR_PATH));

  // orchestrator options
  let mut options_builder = OrchestratorOptionsBuilder::default();
  if let Some(secs) = config.dns_propagation_delay_secs {
    options_builder.dns_propagation_delay(Duration::from_secs(secs));
  }
  if let Some(compensate) = config.compensate_on_failure {
    options_builder.compensate_on_failure(compensate);
  }
  let options = options_builder.build()?;

  // hooks
  let mut activities_builder = HookActivitiesBuilder::default();
  if let Some(hooks) = config.hooks.as_ref() {
    if let Some(secs) = hooks.check_timeout_secs {
      ensure!(secs > 0, "check_timeout_secs must be positive");
      activities_builder.check_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = hooks.check_interval_secs {
      ensure!(secs > 0, "check_interval_secs must be positive");
      activities_builder.check_interval(Duration::from_secs(secs));
    }
    if let Some(secs) = hooks.invocation_timeout_secs {
      ensure!(secs > 0, "invocation_timeout_secs must be positive");
      activities_builder.invocation_timeout(Duration::from_secs(secs));
    }
    for (name, command) in hooks.commands.iter() {
      let activity = name
        .parse::<ActivityName>()
        .map_err(|e| anyhow!("Invalid hook [hooks.{name}]: {e}"))?;
      ensure!(!command.program.is_empty(), "Empty program of hook {activity}");
      activities_builder.hook(activity, command.clone());
    }
  }
  let activities = activities_builder.build()?;

  // sites and requests
  let sites = config.sites.clone().unwrap_or_default();
  let requests = config.requests.as_ref().ok_or(anyhow!("Missing issuance requests"))?;
  ensure!(!requests.is_empty(), "No issuance request is configured");

  let mut request_list = Vec::with_capacity(requests.len());
  for (request_name, request) in requests.iter() {
    let site_option = sites
      .get(&request.site)
      .ok_or(anyhow!("Request {request_name} refers to unknown site {}", request.site))?;
    ensure!(
      !request.domain_names.is_empty(),
      "Request {request_name} has no domain name"
    );
    let site = Site::new(
      site_option.name.clone().unwrap_or_else(|| request.site.clone()),
      site_option.kind.clone(),
    )
    .with_custom_domains(site_option.custom_domains.clone().unwrap_or_default());
    let domain_names =
      DomainNameSet::try_new(&request.domain_names).map_err(|e| anyhow!("Invalid domain names of request {request_name}: {e}"))?;
    let input = IssueCertificateInput {
      site,
      domain_names,
      force_dns01: request.force_dns01.unwrap_or(false),
    };
    if let Some((other, _)) = request_list.iter().find(|(_, existing)| *existing == input) {
      return Err(anyhow!("Requests {other} and {request_name} are identical"));
    }
    request_list.push((request_name.to_owned(), input));
  }
  request_list.sort_by(|a, b| a.0.cmp(&b.0));

  Ok(Settings {
    journal_dir,
    options,
    activities,
    requests: request_list,
  })
}
