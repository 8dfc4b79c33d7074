//! Per-page command session
//!
//! A `PageSession` owns everything one automated page needs: its memory,
//! changelog, how many copies of each block it already applied and a status
//! light. The page observer hands it the current HTML after every DOM
//! mutation batch. Each batch re-scans the whole page, so a block is applied
//! only when the page holds more copies of it than were applied before: a
//! re-scan is a no-op while a later reply repeating a command runs it again.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::action::{done, fallback_script, ActionExecutor, ExtensionRequest, ExtensionResponse};
use super::parser::{ActionCommand, ActionKind, Block, CommandScanner};
use crate::core::LongTermMemory;

/// Upper bound on one script-injection fallback
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_millis(5000);

/// Status light shown on the page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Idle, or every action in the last batch worked directly
    #[default]
    Green,
    /// Something degraded: a fallback was used or a block was malformed
    Yellow,
    /// An action failed even after the fallback
    Red,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a mutation batch is already being applied")]
    Busy,
    #[error("session for {0} was torn down")]
    Closed(String),
}

/// How an action was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    /// Handled by the session itself
    Session,
    Direct,
    Script,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub action: ActionKind,
    pub dispatch: Dispatch,
    pub result: Result<Value, String>,
}

/// What one batch did
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub changelog: Vec<String>,
    pub updates: usize,
    pub actions: Vec<ActionOutcome>,
    pub malformed: Vec<String>,
    /// Blocks skipped because an earlier batch applied that copy
    pub duplicates: usize,
    pub status: Status,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.changelog.is_empty()
            && self.updates == 0
            && self.actions.is_empty()
            && self.malformed.is_empty()
    }

    fn status(&self) -> Status {
        if self.actions.iter().any(|a| a.result.is_err()) {
            Status::Red
        } else if !self.malformed.is_empty()
            || self.actions.iter().any(|a| a.dispatch == Dispatch::Script)
        {
            Status::Yellow
        } else {
            Status::Green
        }
    }
}

#[derive(Default)]
struct SessionState {
    memory: LongTermMemory,
    changelog: Vec<String>,
    /// Copies of each block fingerprint applied so far
    applied: HashMap<u64, usize>,
    status: Status,
    closed: bool,
}

/// Clears the busy flag however the batch ends
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Command session for one page
pub struct PageSession {
    url: String,
    executor: Arc<dyn ActionExecutor>,
    state: Mutex<SessionState>,
    busy: AtomicBool,
    fallback_timeout: Duration,
}

impl PageSession {
    pub fn new(url: impl Into<String>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            url: url.into(),
            executor,
            state: Mutex::new(SessionState::default()),
            busy: AtomicBool::new(false),
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
        }
    }

    pub fn with_fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> Status {
        self.state.lock().status
    }

    pub fn memory(&self) -> LongTermMemory {
        self.state.lock().memory.clone()
    }

    pub fn changelog(&self) -> Vec<String> {
        self.state.lock().changelog.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Apply the blocks in one DOM mutation batch.
    ///
    /// Fails with [`SessionError::Busy`] while another batch is running
    /// and with [`SessionError::Closed`] after [`teardown`](Self::teardown).
    pub async fn apply_batch(&self, html: &str) -> Result<BatchReport, SessionError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::Busy);
        }
        let _guard = BusyGuard(&self.busy);
        self.ensure_open()?;

        let mut report = BatchReport::default();
        let mut seen: HashMap<u64, usize> = HashMap::new();
        for block in CommandScanner::scan(html) {
            let key = fingerprint(&block);
            let occurrence = seen.entry(key).or_default();
            *occurrence += 1;
            {
                let mut state = self.state.lock();
                let applied = state.applied.entry(key).or_default();
                if *occurrence <= *applied {
                    report.duplicates += 1;
                    continue;
                }
                *applied = *occurrence;
            }

            match block {
                Block::Changelog(text) => {
                    self.state.lock().changelog.push(text.clone());
                    report.changelog.push(text);
                }
                Block::Update(update) => {
                    self.state.lock().memory.merge(&update.context_update);
                    if let Some(summary) = &update.summary {
                        debug!(url = %self.url, %summary, "context updated");
                    }
                    report.updates += 1;
                }
                Block::Action(command) => {
                    let outcome = self.dispatch(&command).await;
                    report.actions.push(outcome);
                }
                Block::Malformed { kind, reason, .. } => {
                    warn!(url = %self.url, ?kind, %reason, "skipping malformed block");
                    report.malformed.push(format!("{:?}: {}", kind, reason));
                }
            }
        }

        if !report.is_empty() {
            report.status = report.status();
            self.state.lock().status = report.status;
            info!(
                url = %self.url,
                actions = report.actions.len(),
                updates = report.updates,
                status = ?report.status,
                "applied mutation batch"
            );
        }
        Ok(report)
    }

    /// Run one action: context actions stay in the session, the rest go to
    /// the executor with a script fallback
    pub async fn dispatch(&self, command: &ActionCommand) -> ActionOutcome {
        let outcome = |dispatch, result| ActionOutcome {
            action: command.action,
            dispatch,
            result,
        };

        match command.action {
            ActionKind::SaveContext => {
                let update = command
                    .params
                    .get("context")
                    .unwrap_or(&command.params)
                    .clone();
                let result = if self.state.lock().memory.merge_value(&update) {
                    Ok(done(ActionKind::SaveContext))
                } else {
                    Err("save_context needs an object".to_string())
                };
                return outcome(Dispatch::Session, result);
            }
            ActionKind::LoadContext => {
                let memory = Value::Object(self.state.lock().memory.as_map().clone());
                return outcome(Dispatch::Session, Ok(memory));
            }
            _ => {}
        }

        let error = match self.executor.execute(command).await {
            Ok(value) => return outcome(Dispatch::Direct, Ok(value)),
            Err(e) => e,
        };
        warn!(
            url = %self.url,
            action = command.action.as_str(),
            executor = self.executor.name(),
            %error,
            "direct dispatch failed, falling back to script"
        );

        let Some(script) = fallback_script(command) else {
            return outcome(Dispatch::Failed, Err(error));
        };
        match self.inject(&script).await {
            Ok(value) => outcome(Dispatch::Script, Ok(value)),
            Err(fallback) => outcome(
                Dispatch::Failed,
                Err(format!("{}; fallback: {}", error, fallback)),
            ),
        }
    }

    /// Inject a script, giving up after the fallback timeout
    async fn inject(&self, script: &str) -> Result<Value, String> {
        match tokio::time::timeout(self.fallback_timeout, self.executor.inject_script(script)).await
        {
            Ok(result) => result,
            Err(_) => Err(format!(
                "script injection timed out after {} ms",
                self.fallback_timeout.as_millis()
            )),
        }
    }

    /// Answer one extension message
    pub async fn handle(&self, request: ExtensionRequest) -> ExtensionResponse {
        if let Err(e) = self.ensure_open() {
            return ExtensionResponse::failure(e.to_string());
        }
        debug!(url = %self.url, message = request.name(), "extension message");

        match request {
            ExtensionRequest::ExecuteAction(command) => self.dispatch(&command).await.result.into(),
            ExtensionRequest::SaveContext(context) => {
                let mut state = self.state.lock();
                state.memory.merge(&context);
                ExtensionResponse::success(json!({ "keys": state.memory.len() }))
            }
            ExtensionRequest::LoadContext => {
                ExtensionResponse::success(Value::Object(self.state.lock().memory.as_map().clone()))
            }
            ExtensionRequest::InjectScript { script } => self.inject(&script).await.into(),
            ExtensionRequest::GetStatus => {
                let state = self.state.lock();
                ExtensionResponse::success(json!({
                    "url": self.url,
                    "status": state.status,
                    "busy": self.is_busy(),
                    "changelog": state.changelog.len(),
                    "memoryKeys": state.memory.len(),
                }))
            }
        }
    }

    /// Close the session on navigation, returning its memory
    pub fn teardown(&self) -> LongTermMemory {
        let mut state = self.state.lock();
        state.closed = true;
        state.applied.clear();
        state.changelog.clear();
        state.status = Status::Green;
        info!(url = %self.url, "page session torn down");
        std::mem::take(&mut state.memory)
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.state.lock().closed {
            return Err(SessionError::Closed(self.url.clone()));
        }
        Ok(())
    }
}

/// Stable identity of a block's content
fn fingerprint(block: &Block) -> u64 {
    let mut hasher = DefaultHasher::new();
    block.kind().hash(&mut hasher);
    match block {
        Block::Changelog(text) => text.hash(&mut hasher),
        Block::Action(command) => command_key(command).hash(&mut hasher),
        Block::Update(update) => {
            Value::Object(update.context_update.clone())
                .to_string()
                .hash(&mut hasher);
            update.summary.hash(&mut hasher);
        }
        Block::Malformed { raw, .. } => raw.trim().hash(&mut hasher),
    }
    hasher.finish()
}

fn command_key(command: &ActionCommand) -> String {
    format!("{}:{}", command.action.as_str(), command.params)
}
