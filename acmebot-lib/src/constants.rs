/// Substrings identifying platform-managed domain names.
/// A domain set none of whose names contains one of them is handled as a custom domain.
pub const RESERVED_DOMAIN_MARKERS: &[&str] = &["clubpal.", "entrypal."];

/// Site kind flags that require DNS-01 authorization
pub(crate) const SITE_KIND_DNS01_FLAGS: &[&str] = &["container", "linux"];

/// Prefix of wildcard domain names
pub(crate) const WILDCARD_PREFIX: &str = "*";

/// Delay for TXT record propagation before checking DNS-01 challenges
pub const DNS_PROPAGATION_DELAY_SECS: u64 = 10;

/// Bounded window of polling activities (challenge checks, ready / valid waits)
pub const CHECK_TIMEOUT_SECS: u64 = 60;

/// Interval between two attempts of a polling activity
pub const CHECK_INTERVAL_SECS: u64 = 5;

/// Default directory of the persisted run journals
pub const JOURNAL_DIR_PATH: &str = "./acmebot_journal";

/// Journal file naming, `run_<key>.<generation>.jsonl`
pub(crate) const JOURNAL_FILE_PREFIX: &str = "run_";
pub(crate) const JOURNAL_FILE_EXTENSION: &str = "jsonl";
