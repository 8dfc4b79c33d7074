//! Incremental scanner for command blocks embedded in HTML comments
//!
//! Three delimiter pairs are recognized:
//!
//! ```text
//! <!-- CHANGELOG_START --> free text        <!-- CHANGELOG_END -->
//! <!-- ACTION_START -->    {action, params} <!-- ACTION_END -->
//! <!-- UPDATE_START -->    {context_update, summary} <!-- UPDATE_END -->
//! ```
//!
//! The scanner is a two-state machine over a buffer, so markers split
//! across chunks are found once the rest arrives. Each scanner owns its
//! cursor; independent scans never share state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The three block kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Changelog,
    Action,
    Update,
}

impl BlockKind {
    const ALL: [BlockKind; 3] = [BlockKind::Changelog, BlockKind::Action, BlockKind::Update];

    pub fn start_marker(self) -> &'static str {
        match self {
            BlockKind::Changelog => "<!-- CHANGELOG_START -->",
            BlockKind::Action => "<!-- ACTION_START -->",
            BlockKind::Update => "<!-- UPDATE_START -->",
        }
    }

    pub fn end_marker(self) -> &'static str {
        match self {
            BlockKind::Changelog => "<!-- CHANGELOG_END -->",
            BlockKind::Action => "<!-- ACTION_END -->",
            BlockKind::Update => "<!-- UPDATE_END -->",
        }
    }
}

/// The fixed set of page actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ClickButton,
    InsertText,
    RunCode,
    SaveContext,
    LoadContext,
    InjectScript,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::ClickButton => "click_button",
            ActionKind::InsertText => "insert_text",
            ActionKind::RunCode => "run_code",
            ActionKind::SaveContext => "save_context",
            ActionKind::LoadContext => "load_context",
            ActionKind::InjectScript => "inject_script",
        }
    }
}

/// A parsed action block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCommand {
    pub action: ActionKind,
    #[serde(default = "empty_object")]
    pub params: Value,
}

impl ActionCommand {
    pub fn new(action: ActionKind, params: Value) -> Self {
        Self { action, params }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// A parsed update block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextUpdate {
    pub context_update: Map<String, Value>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// One complete block
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Changelog(String),
    Action(ActionCommand),
    Update(ContextUpdate),
    /// Delimiters matched but the payload did not parse
    Malformed {
        kind: BlockKind,
        raw: String,
        reason: String,
    },
}

impl Block {
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Changelog(_) => BlockKind::Changelog,
            Block::Action(_) => BlockKind::Action,
            Block::Update(_) => BlockKind::Update,
            Block::Malformed { kind, .. } => *kind,
        }
    }

    /// Parse a block payload
    pub fn parse(kind: BlockKind, raw: &str) -> Block {
        let payload = strip_fences(raw.trim());
        let malformed = |reason: String| Block::Malformed {
            kind,
            raw: raw.to_string(),
            reason,
        };

        match kind {
            BlockKind::Changelog => {
                // A JSON string is unwrapped; anything else is taken verbatim.
                let text = serde_json::from_str::<String>(payload)
                    .unwrap_or_else(|_| payload.to_string());
                if text.trim().is_empty() {
                    malformed("empty changelog".to_string())
                } else {
                    Block::Changelog(text.trim().to_string())
                }
            }
            BlockKind::Action => match serde_json::from_str::<ActionCommand>(payload) {
                Ok(command) if command.params.is_object() => Block::Action(command),
                Ok(_) => malformed("params must be an object".to_string()),
                Err(e) => malformed(e.to_string()),
            },
            BlockKind::Update => match serde_json::from_str::<ContextUpdate>(payload) {
                Ok(update) => Block::Update(update),
                Err(e) => malformed(e.to_string()),
            },
        }
    }
}

/// Drop a surrounding Markdown code fence, if any
fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Outside,
    Inside(BlockKind),
}

/// Streaming scanner
#[derive(Debug, Clone)]
pub struct CommandScanner {
    buffer: String,
    state: ScanState,
}

impl Default for CommandScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandScanner {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            state: ScanState::Outside,
        }
    }

    /// Scan a complete text, such as one DOM-mutation batch. Unterminated
    /// blocks are ignored.
    pub fn scan(text: &str) -> Vec<Block> {
        let mut scanner = Self::new();
        scanner.feed(text)
    }

    /// Append a chunk and return the blocks it completed
    pub fn feed(&mut self, chunk: &str) -> Vec<Block> {
        self.buffer.push_str(chunk);
        let mut blocks = Vec::new();

        loop {
            match self.state {
                ScanState::Outside => {
                    let next = BlockKind::ALL
                        .iter()
                        .filter_map(|kind| {
                            self.buffer
                                .find(kind.start_marker())
                                .map(|pos| (pos, *kind))
                        })
                        .min_by_key(|(pos, _)| *pos);

                    match next {
                        Some((pos, kind)) => {
                            self.buffer.drain(..pos + kind.start_marker().len());
                            self.state = ScanState::Inside(kind);
                        }
                        None => {
                            self.keep_marker_prefix();
                            break;
                        }
                    }
                }
                ScanState::Inside(kind) => match self.buffer.find(kind.end_marker()) {
                    Some(pos) => {
                        blocks.push(Block::parse(kind, &self.buffer[..pos]));
                        self.buffer.drain(..pos + kind.end_marker().len());
                        self.state = ScanState::Outside;
                    }
                    None => break,
                },
            }
        }

        blocks
    }

    /// Whether a block has started but not ended
    pub fn in_block(&self) -> bool {
        matches!(self.state, ScanState::Inside(_))
    }

    /// Forget buffered text and any open block
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ScanState::Outside;
    }

    /// Outside a block only a possible partial start marker needs keeping
    fn keep_marker_prefix(&mut self) {
        let longest = BlockKind::ALL
            .iter()
            .map(|k| k.start_marker().len())
            .max()
            .unwrap_or(0);
        let mut cut = self.buffer.len().saturating_sub(longest - 1);
        while !self.buffer.is_char_boundary(cut) {
            cut += 1;
        }
        self.buffer.drain(..cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scan_all_kinds() {
        let html = r##"<p>Done.</p>
            <!-- CHANGELOG_START -->Added login form<!-- CHANGELOG_END -->
            <!-- ACTION_START -->{"action": "click_button", "params": {"selector": "#run"}}<!-- ACTION_END -->
            <!-- UPDATE_START -->{"context_update": {"framework": "react"}, "summary": "uses react"}<!-- UPDATE_END -->"##;

        let blocks = CommandScanner::scan(html);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], Block::Changelog("Added login form".into()));
        assert_eq!(
            blocks[1],
            Block::Action(ActionCommand::new(ActionKind::ClickButton, json!({"selector": "#run"})))
        );
        match &blocks[2] {
            Block::Update(update) => {
                assert_eq!(update.context_update["framework"], "react");
                assert_eq!(update.summary.as_deref(), Some("uses react"));
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_markers_split_across_chunks() {
        let text = r#"xx<!-- ACTION_START -->{"action": "run_code", "params": {"code": "1+1"}}<!-- ACTION_END -->yy"#;
        let mut scanner = CommandScanner::new();
        let mut blocks = Vec::new();
        // Feed in three-byte pieces so every marker is split.
        let bytes: Vec<char> = text.chars().collect();
        for piece in bytes.chunks(3) {
            blocks.extend(scanner.feed(&piece.iter().collect::<String>()));
        }
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind(), BlockKind::Action);
        assert!(!scanner.in_block());
    }

    #[test]
    fn test_unterminated_block_waits() {
        let mut scanner = CommandScanner::new();
        assert!(scanner
            .feed("<!-- UPDATE_START -->{\"context_update\": {}")
            .is_empty());
        assert!(scanner.in_block());
        let blocks = scanner.feed("}<!-- UPDATE_END -->");
        assert_eq!(blocks.len(), 1);
        assert!(matches!(blocks[0], Block::Update(_)));
    }

    #[test]
    fn test_malformed_payloads() {
        let blocks = CommandScanner::scan(
            "<!-- ACTION_START -->{\"action\": \"format_disk\"}<!-- ACTION_END -->\
             <!-- UPDATE_START -->not json<!-- UPDATE_END -->\
             <!-- CHANGELOG_START -->   <!-- CHANGELOG_END -->",
        );
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|b| matches!(b, Block::Malformed { .. })));
        assert_eq!(blocks[1].kind(), BlockKind::Update);
    }

    #[test]
    fn test_fenced_payload() {
        let blocks = CommandScanner::scan(
            "<!-- ACTION_START -->\n```json\n{\"action\": \"load_context\"}\n```\n<!-- ACTION_END -->",
        );
        assert_eq!(
            blocks,
            vec![Block::Action(ActionCommand::new(ActionKind::LoadContext, json!({})))]
        );
    }

    #[test]
    fn test_independent_scans_do_not_share_state() {
        let text = "<!-- CHANGELOG_START -->one<!-- CHANGELOG_END -->";
        assert_eq!(CommandScanner::scan(text), CommandScanner::scan(text));
    }

    #[test]
    fn test_outside_buffer_stays_small() {
        let mut scanner = CommandScanner::new();
        scanner.feed(&"é".repeat(10_000));
        assert!(scanner.buffer.len() < 64);
    }
}
