use crate::{
  constants::HOOK_ACTIVITY_ENV,
  error::{HookError, HookResult},
  log::*,
};
use acmebot_lib::ActivityName;
use serde::Deserialize;
use std::{io::ErrorKind, process::Stdio, time::Duration};
use tokio::{io::AsyncWriteExt, process::Command};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
/// External program run for an activity
pub struct HookCommand {
  pub program: String,
  #[serde(default)]
  pub args: Vec<String>,
}

impl HookCommand {
  pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      program: program.into(),
      args: args.into_iter().map(Into::into).collect(),
    }
  }

  /// Run the program with the JSON input on stdin and return its stdout.
  /// The child is killed when the timeout elapses.
  pub(crate) async fn run(&self, activity: ActivityName, input: &[u8], timeout: Duration) -> HookResult<String> {
    debug!("Run hook of {activity}: {} {:?}", self.program, self.args);
    let mut child = Command::new(&self.program)
      .args(&self.args)
      .env(HOOK_ACTIVITY_ENV, activity.as_str())
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|source| HookError::Spawn { activity, source })?;

    let stdin = child.stdin.take();
    let execution = async move {
      if let Some(mut stdin) = stdin {
        // the hook may exit without reading its input
        match stdin.write_all(input).await {
          Err(e) if e.kind() != ErrorKind::BrokenPipe => return Err(HookError::Io(e)),
          _ => (),
        }
      }
      Ok::<_, HookError>(child.wait_with_output().await?)
    };

    let output = match tokio::time::timeout(timeout, execution).await {
      Ok(output) => output?,
      Err(_) => {
        warn!("Hook of {activity} timed out, killed");
        return Err(HookError::TimedOut {
          activity,
          secs: timeout.as_secs(),
        });
      }
    };

    if !output.status.success() {
      return Err(HookError::Failed {
        activity,
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }
}
