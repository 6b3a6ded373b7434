use crate::error::{AcmebotError, AcmebotResult};
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
/// Identifier of an issuance run: `<key>.<generation>`.
/// The key is derived from the whole request, so that re-triggering a request finds its unfinished run,
/// and two requests differing in any field (e.g., the same names on two sites) never share a journal.
/// The generation distinguishes successive issuances (renewals) of the same request.
pub struct RunId {
  key: String,
  generation: u32,
}

impl RunId {
  pub fn new(key: impl Into<String>, generation: u32) -> Result<Self, AcmebotError> {
    let key = key.into();
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
      return Err(AcmebotError::InvalidInput(format!("Invalid run key: {key}")));
    }
    Ok(Self { key, generation })
  }

  /// Key of the runs serving the given request: base64url SHA-256 of its JSON encoding
  pub fn key_for<T: Serialize>(request: &T) -> AcmebotResult<String> {
    let encoded = serde_json::to_vec(request)?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(encoded)))
  }

  /// First run serving the given request
  pub fn first_for<T: Serialize>(request: &T) -> AcmebotResult<Self> {
    Ok(Self {
      key: Self::key_for(request)?,
      generation: 0,
    })
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn generation(&self) -> u32 {
    self.generation
  }

  /// Run of the next generation for the same key
  pub fn next_generation(&self) -> Self {
    Self {
      key: self.key.clone(),
      generation: self.generation + 1,
    }
  }
}

impl fmt::Display for RunId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.key, self.generation)
  }
}

impl FromStr for RunId {
  type Err = AcmebotError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (key, generation) = s
      .rsplit_once('.')
      .ok_or_else(|| AcmebotError::InvalidInput(format!("Invalid run id: {s}")))?;
    let generation = generation
      .parse::<u32>()
      .map_err(|_| AcmebotError::InvalidInput(format!("Invalid run generation: {s}")))?;
    Self::new(key, generation)
  }
}

impl TryFrom<String> for RunId {
  type Error = AcmebotError;
  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<RunId> for String {
  fn from(value: RunId) -> Self {
    value.to_string()
  }
}
