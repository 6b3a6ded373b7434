use crate::error::anyhow;
use acmebot_hooks::HookCommand;
use rustc_hash::FxHashMap as HashMap;
use serde::Deserialize;
use std::fs;

#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct ConfigToml {
  pub journal_dir: Option<String>,
  pub dns_propagation_delay_secs: Option<u64>,
  pub compensate_on_failure: Option<bool>,
  pub hooks: Option<HooksOption>,
  pub sites: Option<HashMap<String, SiteOption>>,
  pub requests: Option<HashMap<String, RequestOption>>,
}

#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct HooksOption {
  pub check_timeout_secs: Option<u64>,
  pub check_interval_secs: Option<u64>,
  pub invocation_timeout_secs: Option<u64>,
  /// One program per activity name, e.g., `[hooks.Order]`
  #[serde(flatten)]
  pub commands: HashMap<String, HookCommand>,
}

#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct SiteOption {
  /// Site name on the hosting platform, the table key if omitted
  pub name: Option<String>,
  pub kind: String,
  pub custom_domains: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct RequestOption {
  pub site: String,
  pub domain_names: Vec<String>,
  pub force_dns01: Option<bool>,
}

impl ConfigToml {
  pub fn new(config_file: &str) -> std::result::Result<Self, anyhow::Error> {
    let config_str = fs::read_to_string(config_file)?;

    toml::from_str(&config_str).map_err(|e| anyhow!(e))
  }
}
