/// Upper bound of a single hook execution. The child process is killed once it elapses.
pub const INVOCATION_TIMEOUT_SECS: u64 = 120;

/// Environment variable carrying the activity name to the hook program
pub const HOOK_ACTIVITY_ENV: &str = "ACMEBOT_ACTIVITY";
