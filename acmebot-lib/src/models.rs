use crate::{
  constants::WILDCARD_PREFIX,
  error::{AcmebotError, AcmebotResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/* ------------------------------------------------ */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Deployment descriptor of a hosted web application. Immutable input of an issuance run.
pub struct Site {
  /// Site name on the hosting platform
  pub name: String,
  /// Platform kind tag, comma separated flags like `app,linux,container`
  pub kind: String,
  /// Custom host names bound to the site
  #[serde(default)]
  pub custom_domains: Vec<String>,
}

impl Site {
  pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      kind: kind.into(),
      custom_domains: Vec::new(),
    }
  }

  pub fn with_custom_domains<I, S>(mut self, domains: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.custom_domains = domains.into_iter().map(Into::into).collect();
    self
  }

  /// Returns true if the kind tag contains the given flag
  pub fn kind_contains(&self, flag: &str) -> bool {
    self.kind.contains(flag)
  }
}

/* ------------------------------------------------ */
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
/// Ordered, non-empty sequence of subject names. The first entry is the primary name.
pub struct DomainNameSet(Vec<String>);

impl DomainNameSet {
  /// Build a set from raw names. Surrounding whitespace is trimmed, otherwise the names are kept as given,
  /// in order: they are passed unchanged to the order and the finalization, and the strategy selection
  /// matches reserved markers against them case-sensitively.
  /// Empty entries and duplicates (compared case-insensitively) are rejected.
  pub fn try_new<I, S>(names: I) -> AcmebotResult<Self>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut inner: Vec<String> = Vec::new();
    for name in names {
      let name = name.as_ref().trim();
      if name.is_empty() {
        return Err(AcmebotError::InvalidInput("empty domain name".to_string()));
      }
      if inner.iter().any(|n| n.eq_ignore_ascii_case(name)) {
        return Err(AcmebotError::InvalidInput(format!("duplicate domain name: {name}")));
      }
      inner.push(name.to_string());
    }
    if inner.is_empty() {
      return Err(AcmebotError::InvalidInput("at least one domain name is required".to_string()));
    }
    Ok(Self(inner))
  }

  /// Primary name, i.e., the first entry
  pub fn primary(&self) -> &str {
    &self.0[0]
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(String::as_str)
  }

  pub fn as_slice(&self) -> &[String] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Returns true if any name is a wildcard name
  pub fn has_wildcard(&self) -> bool {
    self.iter().any(|name| name.starts_with(WILDCARD_PREFIX))
  }
}

impl TryFrom<Vec<String>> for DomainNameSet {
  type Error = AcmebotError;
  fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
    Self::try_new(value)
  }
}

impl From<DomainNameSet> for Vec<String> {
  fn from(value: DomainNameSet) -> Self {
    value.0
  }
}

/* ------------------------------------------------ */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// ACME order status
pub enum OrderStatus {
  Pending,
  Ready,
  Processing,
  Valid,
  Invalid,
}

impl std::fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Ready => "ready",
      OrderStatus::Processing => "processing",
      OrderStatus::Valid => "valid",
      OrderStatus::Invalid => "invalid",
    };
    write!(f, "{s}")
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Point-in-time snapshot of an ACME order, as returned by the `Order` activity
pub struct Order {
  /// Order url
  pub location: String,
  pub status: OrderStatus,
  /// Authorization urls
  pub authorizations: Vec<String>,
  /// Finalize url
  pub finalize: String,
}

/* ------------------------------------------------ */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Per-domain verification record created by an authorization activity
pub struct ChallengeResult {
  /// Challenge url to be answered
  pub url: String,
  /// Domain name under verification
  pub domain: String,
  pub proof: ChallengeProof,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Material published to prove the control of a domain
pub enum ChallengeProof {
  Http01 {
    resource_url: String,
    resource_path: String,
    resource_value: String,
  },
  Dns01 {
    record_name: String,
    record_value: String,
  },
}

/* ------------------------------------------------ */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Order snapshot right after finalization
pub struct FinalizeInfo {
  pub location: String,
  pub status: OrderStatus,
  /// Certificate download url, available once the order is valid
  pub certificate_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Reference to the private key generated for the CSR. Key material itself is never journaled.
pub struct KeyParams {
  pub key_ref: String,
  pub algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Output of the `FinalizeOrder` activity
pub struct FinalizeOutput {
  pub finalize: FinalizeInfo,
  pub key: KeyParams,
}

/* ------------------------------------------------ */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Certificate deployed to the hosting platform
pub struct Certificate {
  /// Certificate name on the hosting platform
  pub name: String,
  pub thumbprint: String,
  pub subject_names: Vec<String>,
  pub issuer: String,
  pub expires_on: DateTime<Utc>,
  pub key_ref: String,
}
