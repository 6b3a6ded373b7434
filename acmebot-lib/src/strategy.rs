use crate::{
  constants::{RESERVED_DOMAIN_MARKERS, SITE_KIND_DNS01_FLAGS},
  models::{DomainNameSet, Site},
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Authorization strategy, chosen once per run and held until cleanup
pub enum AuthorizationMode {
  /// Delegated to the custom-domain controller
  CustomDomain,
  Dns01,
  Http01,
}

impl fmt::Display for AuthorizationMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      AuthorizationMode::CustomDomain => "custom-domain",
      AuthorizationMode::Dns01 => "dns-01",
      AuthorizationMode::Http01 => "http-01",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Raw selector flags. Pure function of the run input, hence identical on every replay.
pub struct StrategySelection {
  pub is_custom_domain: bool,
  pub use_dns01: bool,
}

impl StrategySelection {
  /// Reserved markers are matched case-sensitively against the names as given in the request
  pub fn evaluate(site: &Site, domain_names: &DomainNameSet, force_dns01: bool) -> Self {
    let is_custom_domain = !domain_names
      .iter()
      .any(|name| RESERVED_DOMAIN_MARKERS.iter().any(|marker| name.contains(marker)));
    let use_dns01 = force_dns01
      || domain_names.has_wildcard()
      || SITE_KIND_DNS01_FLAGS.iter().any(|flag| site.kind_contains(flag));
    Self {
      is_custom_domain,
      use_dns01,
    }
  }

  /// Custom domain takes precedence over the DNS-01 / HTTP-01 distinction
  pub fn mode(&self) -> AuthorizationMode {
    if self.is_custom_domain {
      AuthorizationMode::CustomDomain
    } else if self.use_dns01 {
      AuthorizationMode::Dns01
    } else {
      AuthorizationMode::Http01
    }
  }
}

/// Select the authorization strategy of a run
pub fn select_strategy(site: &Site, domain_names: &DomainNameSet, force_dns01: bool) -> AuthorizationMode {
  StrategySelection::evaluate(site, domain_names, force_dns01).mode()
}
