//! Embedded command protocol
//!
//! Model replies shown on an automated page can carry commands inside HTML
//! comments. This module scans for them, applies them to a per-page
//! session and dispatches page actions to an executor.

mod action;
mod browser;
mod parser;
mod session;

pub use action::{fallback_script, ActionExecutor, ExtensionRequest, ExtensionResponse};
pub use browser::CliExecutor;
pub use parser::{ActionCommand, ActionKind, Block, BlockKind, CommandScanner, ContextUpdate};
pub use session::{
    ActionOutcome, BatchReport, Dispatch, PageSession, SessionError, Status,
    DEFAULT_FALLBACK_TIMEOUT,
};
