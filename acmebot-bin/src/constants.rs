/// Name of the worker threads of the runtime
pub const THREAD_NAME: &str = "acmebot";

/// Library crates whose logs are emitted along with the binary's
pub const LOG_TARGET_CRATES: &[&str] = &["acmebot_lib", "acmebot_hooks"];
