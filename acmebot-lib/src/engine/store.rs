use super::{journal::JournalEvent, run_id::RunId};
use crate::{
  constants::{JOURNAL_FILE_EXTENSION, JOURNAL_FILE_PREFIX},
  error::{AcmebotError, AcmebotResult},
  log::*,
};
use async_trait::async_trait;
use blocking::unblock;
use rustc_hash::FxHashMap as HashMap;
use std::{
  io::{ErrorKind, Write},
  path::{Path, PathBuf},
  sync::Mutex,
};

/* ------------------------------------------------ */
#[async_trait]
/// Durable storage of run journals. Appends must be durable once they return.
pub trait JournalStore: Send + Sync {
  /// Load all events of a run, `None` if the run is unknown
  async fn load(&self, run_id: &RunId) -> AcmebotResult<Option<Vec<JournalEvent>>>;

  /// Create the journal of a new run with its first event.
  /// Returns false, writing nothing, if the journal of the run already exists.
  async fn create(&self, run_id: &RunId, event: &JournalEvent) -> AcmebotResult<bool>;

  /// Append an event to the journal of a run
  async fn append(&self, run_id: &RunId, event: &JournalEvent) -> AcmebotResult<()>;

  /// List all known runs
  async fn list_runs(&self) -> AcmebotResult<Vec<RunId>>;
}

/* ------------------------------------------------ */
#[derive(Debug, Default)]
/// Journal store kept in memory, for tests and embedding
pub struct MemoryJournalStore {
  inner: Mutex<HashMap<RunId, Vec<JournalEvent>>>,
}

impl MemoryJournalStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> AcmebotResult<std::sync::MutexGuard<'_, HashMap<RunId, Vec<JournalEvent>>>> {
    self
      .inner
      .lock()
      .map_err(|e| AcmebotError::Journal(std::io::Error::other(e.to_string())))
  }
}

#[async_trait]
impl JournalStore for MemoryJournalStore {
  async fn load(&self, run_id: &RunId) -> AcmebotResult<Option<Vec<JournalEvent>>> {
    Ok(self.lock()?.get(run_id).cloned())
  }

  async fn create(&self, run_id: &RunId, event: &JournalEvent) -> AcmebotResult<bool> {
    let mut inner = self.lock()?;
    if inner.contains_key(run_id) {
      return Ok(false);
    }
    inner.insert(run_id.clone(), vec![event.clone()]);
    Ok(true)
  }

  async fn append(&self, run_id: &RunId, event: &JournalEvent) -> AcmebotResult<()> {
    self.lock()?.entry(run_id.clone()).or_default().push(event.clone());
    Ok(())
  }

  async fn list_runs(&self) -> AcmebotResult<Vec<RunId>> {
    let mut runs = self.lock()?.keys().cloned().collect::<Vec<_>>();
    runs.sort();
    Ok(runs)
  }
}

/* ------------------------------------------------ */
#[derive(Debug, PartialEq, Eq, Clone)]
/// Journal store persisting one JSON-lines file per run in a directory
pub struct DirJournalStore {
  journal_dir: PathBuf,
}

impl DirJournalStore {
  pub fn new<P>(dir: P) -> Self
  where
    P: AsRef<Path>,
  {
    Self {
      journal_dir: dir.as_ref().to_path_buf(),
    }
  }

  pub fn journal_file_name(run_id: &RunId) -> String {
    format!("{JOURNAL_FILE_PREFIX}{run_id}.{JOURNAL_FILE_EXTENSION}")
  }

  fn journal_path(&self, run_id: &RunId) -> PathBuf {
    self.journal_dir.join(Self::journal_file_name(run_id))
  }

  /// Parse journal lines. A last line without its newline is an incomplete write: it is not returned,
  /// and the length of the complete part is returned alongside to truncate the file.
  fn parse_lines(run_id: &RunId, content: &str) -> AcmebotResult<(Vec<JournalEvent>, Option<usize>)> {
    let complete_len = content.rfind('\n').map_or(0, |idx| idx + 1);
    let events = content[..complete_len]
      .lines()
      .enumerate()
      .filter(|(_, line)| !line.trim().is_empty())
      .map(|(idx, line)| {
        serde_json::from_str::<JournalEvent>(line)
          .map_err(|e| AcmebotError::CorruptedJournal(format!("run {run_id}, line {}: {e}", idx + 1)))
      })
      .collect::<AcmebotResult<Vec<_>>>()?;
    let torn = (complete_len < content.len()).then_some(complete_len);
    Ok((events, torn))
  }
}

#[async_trait]
impl JournalStore for DirJournalStore {
  async fn load(&self, run_id: &RunId) -> AcmebotResult<Option<Vec<JournalEvent>>> {
    let file_path = self.journal_path(run_id);
    let content = match unblock(move || std::fs::read_to_string(file_path)).await {
      Ok(content) => content,
      Err(err) => match err.kind() {
        ErrorKind::NotFound => return Ok(None),
        _ => return Err(err.into()),
      },
    };
    let (events, torn) = Self::parse_lines(run_id, &content)?;
    if let Some(complete_len) = torn {
      warn!("Discarding incomplete last journal line of run {run_id}");
      let file_path = self.journal_path(run_id);
      unblock(move || {
        std::fs::OpenOptions::new()
          .write(true)
          .open(file_path)?
          .set_len(complete_len as u64)
      })
      .await?;
    }
    Ok(Some(events))
  }

  async fn create(&self, run_id: &RunId, event: &JournalEvent) -> AcmebotResult<bool> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    let dir = self.journal_dir.clone();
    let file_path = self.journal_path(run_id);
    let created = unblock(move || {
      std::fs::create_dir_all(dir)?;
      // exclusive creation, a concurrent starter of the same run gets AlreadyExists
      let mut file = match std::fs::OpenOptions::new().write(true).create_new(true).open(file_path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => return Err(err),
      };
      file.write_all(&line)?;
      file.sync_data()?;
      Ok(true)
    })
    .await?;
    Ok(created)
  }

  async fn append(&self, run_id: &RunId, event: &JournalEvent) -> AcmebotResult<()> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    let dir = self.journal_dir.clone();
    let file_path = self.journal_path(run_id);
    unblock(move || {
      std::fs::create_dir_all(dir)?;
      let mut file = std::fs::OpenOptions::new().create(true).append(true).open(file_path)?;
      file.write_all(&line)?;
      file.sync_data()
    })
    .await?;
    Ok(())
  }

  async fn list_runs(&self) -> AcmebotResult<Vec<RunId>> {
    let dir = self.journal_dir.clone();
    let entries = match unblock(move || {
      std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().to_string()))
        .collect::<Result<Vec<_>, std::io::Error>>()
    })
    .await
    {
      Ok(entries) => entries,
      Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
      Err(err) => return Err(err.into()),
    };
    let suffix = format!(".{JOURNAL_FILE_EXTENSION}");
    let mut runs = entries
      .iter()
      .filter_map(|name| name.strip_prefix(JOURNAL_FILE_PREFIX)?.strip_suffix(suffix.as_str()))
      .filter_map(|id| id.parse::<RunId>().ok())
      .collect::<Vec<_>>();
    runs.sort();
    Ok(runs)
  }
}
