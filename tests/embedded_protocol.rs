//! Commands embedded in streamed agent replies

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use common::{ada, config, orchestrator, ScriptedProvider};
use roundtable::agent::TurnEvent;
use roundtable::embedded::{
    ActionCommand, ActionExecutor, Block, CommandScanner, Dispatch, ExtensionRequest, PageSession,
    Status,
};

#[derive(Default)]
struct RecordingExecutor {
    actions: Mutex<Vec<String>>,
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, command: &ActionCommand) -> Result<Value, String> {
        self.actions.lock().push(command.action.as_str().to_string());
        Ok(json!({"ok": true}))
    }

    async fn inject_script(&self, _script: &str) -> Result<Value, String> {
        Err("scripts disabled".to_string())
    }
}

#[tokio::test]
async fn test_streamed_reply_drives_page_session() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .chunks(&[
                "Here is the page.<!-- CHANGE",
                "LOG_START -->Added a button<!-- CHANGELOG_END --><!-- ACTION_ST",
                "ART -->{\"action\": \"click_button\", \"params\": {\"selector\": \"#save\"}}",
                "<!-- ACTION_END --><!-- UPDATE_START -->{\"context_update\": {\"page\": \"editor\"}, ",
                "\"summary\": \"editor open\"}<!-- UPDATE_END -->",
            ])
            .reply("Added a save button")
            .reply("Page edits"),
    );
    let mut orch = orchestrator(config(vec![ada()]), &provider);

    let scanner = Mutex::new(CommandScanner::new());
    let streamed = Mutex::new(Vec::new());
    let on_event = |event: TurnEvent<'_>| {
        if let TurnEvent::Token(chunk) = event {
            streamed.lock().extend(scanner.lock().feed(chunk));
        }
    };
    let outcome = orch.process("Add a save button", None, &on_event).await.unwrap();

    let streamed = streamed.into_inner();
    assert_eq!(streamed.len(), 3);
    assert_eq!(streamed[0], Block::Changelog("Added a button".into()));

    // The full reply scans to the same blocks as the stream.
    let reply = &outcome.replies[0].text;
    assert_eq!(CommandScanner::scan(reply), streamed);

    let executor = Arc::new(RecordingExecutor::default());
    let session = PageSession::new("https://studio.test", executor.clone());
    let report = session.apply_batch(reply).await.unwrap();

    assert_eq!(report.changelog, ["Added a button"]);
    assert_eq!(report.actions[0].dispatch, Dispatch::Direct);
    assert_eq!(session.status(), Status::Green);
    assert_eq!(session.memory().get("page"), Some(&json!("editor")));
    assert_eq!(*executor.actions.lock(), ["click_button"]);

    // The next DOM mutation re-scans the same reply plus new text.
    let again = session
        .apply_batch(&format!("{}<p>typing…</p>", reply))
        .await
        .unwrap();
    assert!(again.is_empty());
    assert_eq!(executor.actions.lock().len(), 1);
}

#[tokio::test]
async fn test_extension_messages() {
    let session = PageSession::new("https://studio.test", Arc::new(RecordingExecutor::default()));

    let saved = session
        .handle(ExtensionRequest::SaveContext(
            json!({"draft": 3}).as_object().cloned().unwrap(),
        ))
        .await;
    assert!(saved.ok);

    let loaded = session.handle(ExtensionRequest::LoadContext).await;
    assert_eq!(loaded.result, Some(json!({"draft": 3})));

    let injected = session
        .handle(ExtensionRequest::InjectScript {
            script: "alert(1)".into(),
        })
        .await;
    assert!(!injected.ok);
    assert_eq!(injected.error.as_deref(), Some("scripts disabled"));

    // Wire form as sent by the page.
    let request: ExtensionRequest = serde_json::from_value(json!({
        "type": "EXECUTE_ACTION",
        "payload": {"action": "insert_text", "params": {"selector": "#q", "text": "hi"}}
    }))
    .unwrap();
    let executed = session.handle(request).await;
    assert_eq!(executed.result, Some(json!({"ok": true})));
}
