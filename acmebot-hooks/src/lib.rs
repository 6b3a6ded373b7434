mod activities;
mod constants;
mod error;
mod hook;
mod retry;

#[allow(unused_imports)]
mod log {
  pub(super) use tracing::{debug, error, info, warn};
}

pub use activities::{HookActivities, HookActivitiesBuilder, HookActivitiesBuilderError};
pub use constants::{HOOK_ACTIVITY_ENV, INVOCATION_TIMEOUT_SECS};
pub use error::HookError;
pub use hook::HookCommand;
