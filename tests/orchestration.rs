//! End-to-end turns against a scripted provider

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{ada, bob, config, function_responses, ignore_events, orchestrator, EventLog, ScriptedProvider};
use roundtable::agent::{Selection, TurnEvent, TurnDecision};
use roundtable::core::config::TurnStrategy;
use roundtable::core::{Attachment, RoundtableError, Sender};
use roundtable::store::{MemoryStore, PageRequest};

#[tokio::test]
async fn test_calculator_round_trip() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .call("calculator", json!({"expression": "5*7"}))
            .chunks(&["5 * 7 ", "is 35."])
            .reply("Quick multiplication"),
    );
    let mut orch = orchestrator(config(vec![ada()]), &provider);
    let log = EventLog::default();
    let on_event = |e: TurnEvent<'_>| log.record(e);

    let outcome = orch.process("What is 5 * 7?", None, &on_event).await.unwrap();

    assert_eq!(outcome.selection, Selection::Single("ada".into()));
    assert_eq!(outcome.replies.len(), 1);
    assert_eq!(outcome.replies[0].text, "5 * 7 is 35.");
    assert_eq!(outcome.replies[0].sender, Sender::Agent("ada".into()));

    let requests = provider.requests();
    // Tool declarations follow the agent's permissions.
    let declared: Vec<_> = requests[0].config.tools.iter().map(|t| t.name.clone()).collect();
    assert!(declared.contains(&"calculator".to_string()));
    assert!(!declared.contains(&"get_weather".to_string()));

    let responses = function_responses(&requests[1]);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["name"], "calculator");
    assert_eq!(responses[0]["response"], json!({"result": 35}));

    assert_eq!(orch.conversation().title.as_deref(), Some("Quick multiplication"));
    assert_eq!(
        log.events(),
        ["speaker:ada", "token:5 * 7 ", "token:is 35."]
    );
    assert_eq!(provider.remaining(), 0);
}

#[tokio::test]
async fn test_summary_threshold_is_250_characters() {
    let exact = "a".repeat(250);
    let provider = Arc::new(ScriptedProvider::new().reply(&exact).reply("Title"));
    let mut orch = orchestrator(config(vec![ada()]), &provider);

    let outcome = orch.process("go", None, &ignore_events).await.unwrap();
    assert_eq!(outcome.replies[0].summary.as_deref(), Some(exact.as_str()));
    // Reply then title, no summary call.
    assert_eq!(provider.requests().len(), 2);

    let long = "b".repeat(251);
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(&long)
            .reply("A long row of b")
            .reply("Title"),
    );
    let mut orch = orchestrator(config(vec![ada()]), &provider);
    let outcome = orch.process("go", None, &ignore_events).await.unwrap();
    assert_eq!(outcome.replies[0].text, long);
    assert_eq!(outcome.replies[0].summary.as_deref(), Some("A long row of b"));
    assert_eq!(provider.requests().len(), 3);
}

#[tokio::test]
async fn test_missing_credential_fails_before_any_call() {
    let provider = Arc::new(ScriptedProvider::new().reply("never sent"));
    let mut cfg = config(vec![ada()]);
    cfg.api.api_key = None;
    let mut orch = orchestrator(cfg, &provider);

    let err = orch.process("hello", None, &ignore_events).await.unwrap_err();
    assert!(matches!(err, RoundtableError::MissingCredential { .. }));
    assert!(provider.requests().is_empty());
    // The user message is kept so the caller can retry.
    assert_eq!(orch.conversation().len(), 1);
}

#[tokio::test]
async fn test_agent_key_overrides_default() {
    let provider = Arc::new(ScriptedProvider::new().reply("hi").reply("Greeting"));
    let mut cfg = config(vec![ada().with_api_key("ada-key")]);
    cfg.api.api_key = None;
    let mut orch = orchestrator(cfg, &provider);

    orch.process("hello", None, &ignore_events).await.unwrap();
    assert_eq!(provider.requests()[0].api_key, "ada-key");
}

#[tokio::test]
async fn test_manager_picks_speaker_and_topic() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .json(json!({"nextSpeakerId": "bob", "newTopic": "weather"}))
            .reply("Sunny in Paris.")
            .reply("Paris weather"),
    );
    let mut orch = orchestrator(config(vec![ada(), bob()]), &provider);

    let outcome = orch.process("How is Paris today?", None, &ignore_events).await.unwrap();
    match &outcome.selection {
        Selection::Manager(decision) => {
            assert_eq!(decision.next_speaker_id.as_deref(), Some("bob"));
        }
        other => panic!("unexpected selection {:?}", other),
    }
    assert_eq!(outcome.replies[0].sender, Sender::Agent("bob".into()));
    assert_eq!(orch.conversation().recent_topic.as_deref(), Some("weather"));

    let requests = provider.requests();
    assert_eq!(requests[0].config.temperature, Some(0.0));
    assert!(requests[0].config.response_schema.is_some());
    assert_eq!(outcome.trace[0].stage, "decide_next_speaker");
}

#[tokio::test]
async fn test_manager_without_speaker_falls_back_to_first_agent() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .json(json!({"nextSpeakerId": null, "newTopic": null}))
            .reply("Hello!")
            .reply("Hello"),
    );
    let mut orch = orchestrator(config(vec![ada(), bob()]), &provider);

    let outcome = orch.process("hi", None, &ignore_events).await.unwrap();
    assert_eq!(outcome.replies[0].sender, Sender::Agent("ada".into()));
}

#[tokio::test]
async fn test_turn_manager_malformed_output_is_an_error() {
    let provider = Arc::new(ScriptedProvider::new().reply("Bob should answer"));
    let mut orch = orchestrator(config(vec![ada(), bob()]), &provider);

    let err = orch.process("hi", None, &ignore_events).await.unwrap_err();
    match err {
        RoundtableError::StructuredOutput { stage, raw, prompt, .. } => {
            assert_eq!(stage, "decide_next_speaker");
            assert_eq!(raw, "Bob should answer");
            assert!(prompt.contains("hi"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    // Single-shot: nothing was retried.
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn test_provider_failure_is_wrapped_with_stage() {
    let provider = Arc::new(ScriptedProvider::new().fail("503 Service Unavailable"));
    let mut orch = orchestrator(config(vec![ada()]), &provider);

    let err = orch.process("hi", None, &ignore_events).await.unwrap_err();
    assert!(err.to_string().contains("503"));
    assert_eq!(err.prompt(), Some("hi"));
}

#[tokio::test]
async fn test_moderator_missing_field_is_malformed() {
    let provider = Arc::new(ScriptedProvider::new().json(json!({
        "critique": null,
        "decision": "speak",
        "nextSpeakerId": "ada",
        "rationale": "Ada knows math"
    })));
    let mut cfg = config(vec![ada(), bob()]);
    cfg.orchestration.strategy = TurnStrategy::Moderator;
    let mut orch = orchestrator(cfg, &provider);

    let err = orch.process("2+2?", None, &ignore_events).await.unwrap_err();
    assert!(matches!(
        err,
        RoundtableError::StructuredOutput { ref stage, .. } if stage == "moderate_turn"
    ));
}

#[tokio::test]
async fn test_moderator_task_reaches_agent() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .json(json!({
                "critique": null,
                "decision": "speak",
                "nextSpeakerId": "ada",
                "task": "Check the arithmetic",
                "rationale": "Ada knows math"
            }))
            .reply("2+2 is 4.")
            .reply("Arithmetic"),
    );
    let mut cfg = config(vec![ada(), bob()]);
    cfg.orchestration.strategy = TurnStrategy::Moderator;
    let mut orch = orchestrator(cfg, &provider);

    let outcome = orch.process("2+2?", None, &ignore_events).await.unwrap();
    assert_eq!(outcome.replies[0].text, "2+2 is 4.");

    let instruction = provider.requests()[1]
        .config
        .system_instruction
        .clone()
        .unwrap_or_default();
    assert!(instruction.contains("The moderator asked you to: Check the arithmetic"));
}

#[tokio::test]
async fn test_moderator_wait_for_user_produces_no_reply() {
    let provider = Arc::new(ScriptedProvider::new().json(json!({
        "critique": "Bob repeated Ada",
        "decision": "wait_for_user",
        "nextSpeakerId": null,
        "task": null,
        "rationale": "The question was answered"
    })));
    let mut cfg = config(vec![ada(), bob()]);
    cfg.orchestration.strategy = TurnStrategy::Moderator;
    let mut orch = orchestrator(cfg, &provider);
    let log = EventLog::default();
    let on_event = |e: TurnEvent<'_>| log.record(e);

    let outcome = orch.process("thanks", None, &on_event).await.unwrap();
    assert!(outcome.replies.is_empty());
    match outcome.selection {
        Selection::Moderator(decision) => assert_eq!(decision.decision, TurnDecision::WaitForUser),
        other => panic!("unexpected selection {:?}", other),
    }
    assert_eq!(log.events(), ["waiting:The question was answered"]);
    // No title without a reply.
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn test_moderator_consulted_for_lone_agent() {
    let provider = Arc::new(ScriptedProvider::new().json(json!({
        "critique": null,
        "decision": "wait_for_user",
        "nextSpeakerId": null,
        "task": null,
        "rationale": "Nothing to add"
    })));
    let mut cfg = config(vec![ada()]);
    cfg.orchestration.strategy = TurnStrategy::Moderator;
    let mut orch = orchestrator(cfg, &provider);

    let outcome = orch.process("ok", None, &ignore_events).await.unwrap();
    assert!(outcome.replies.is_empty());
    assert!(matches!(outcome.selection, Selection::Moderator(_)));
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn test_plan_runs_valid_steps_in_order() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .json(json!({
                "plan": [
                    {"agentId": "ada", "task": "Compute the total"},
                    {"agentId": "", "task": "dropped"},
                    {"agentId": "ghost", "task": "skipped at run time"},
                    {"agentId": "bob", "task": "Add a weather note"}
                ],
                "rationale": "math then weather"
            }))
            .reply("Total is 12.")
            .reply("And it will rain.")
            .reply("Totals and rain"),
    );
    let mut cfg = config(vec![ada(), bob()]);
    cfg.orchestration.planning = true;
    let mut orch = orchestrator(cfg, &provider);

    let outcome = orch
        .process("Add 5 and 7, then tell me the weather", None, &ignore_events)
        .await
        .unwrap();

    assert_eq!(outcome.selection, Selection::Planned);
    let plan = outcome.plan.unwrap();
    assert_eq!(plan.steps.len(), 3);
    assert_eq!(outcome.replies.len(), 2);
    assert_eq!(outcome.replies[0].sender, Sender::Agent("ada".into()));
    assert_eq!(outcome.replies[1].sender, Sender::Agent("bob".into()));
    assert!(outcome.replies[0].plan.is_some());

    let requests = provider.requests();
    let first_prompt = requests[1].contents.last().unwrap().text();
    assert!(first_prompt.contains("Add 5 and 7"));
    assert!(first_prompt.contains("Compute the total"));
    let second_prompt = requests[2].contents.last().unwrap().text();
    assert!(second_prompt.contains("Add a weather note"));
}

#[tokio::test]
async fn test_empty_plan_falls_back_to_speaker_selection() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .json(json!({"plan": [], "rationale": "one reply is enough"}))
            .json(json!({"nextSpeakerId": "ada", "newTopic": null}))
            .reply("Hi")
            .reply("Hi"),
    );
    let mut cfg = config(vec![ada(), bob()]);
    cfg.orchestration.planning = true;
    let mut orch = orchestrator(cfg, &provider);

    let outcome = orch.process("hello", None, &ignore_events).await.unwrap();
    assert!(matches!(outcome.selection, Selection::Manager(_)));
    assert!(outcome.plan.is_none());
}

#[tokio::test]
async fn test_shell_cursor_survives_across_turns() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .call("shell", json!({"command": "cd /documents"}))
            .reply("Moved.")
            .reply("Shell session")
            .call("shell", json!({"command": "pwd"}))
            .reply("You are in /documents."),
    );
    let mut orch = orchestrator(config(vec![ada()]), &provider);

    orch.process("cd into documents", None, &ignore_events).await.unwrap();
    orch.process("where am I?", None, &ignore_events).await.unwrap();

    let requests = provider.requests();
    let pwd = function_responses(&requests[4]);
    assert_eq!(pwd[0]["response"], json!({"result": "/documents"}));
}

#[tokio::test]
async fn test_tool_failure_does_not_abort_turn() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .call("calculator", json!({"expression": "1/0"}))
            .reply("That cannot be computed.")
            .reply("Division"),
    );
    let mut orch = orchestrator(config(vec![ada()]), &provider);

    let outcome = orch.process("1/0?", None, &ignore_events).await.unwrap();
    assert_eq!(outcome.replies[0].text, "That cannot be computed.");
    let responses = function_responses(&provider.requests()[1]);
    assert!(responses[0]["response"]["error"].is_string());
}

#[tokio::test]
async fn test_memory_extraction_merges_facts() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply("Nice to meet you, Sam.")
            .json(json!({"user": {"name": "Sam"}}))
            .reply("Introductions")
            .reply("Yes, Sam."),
    );
    let mut cfg = config(vec![ada()]);
    cfg.orchestration.memory_interval = 2;
    let mut orch = orchestrator(cfg, &provider);

    let outcome = orch.process("I'm Sam", None, &ignore_events).await.unwrap();
    assert_eq!(
        orch.conversation().memory.get("user"),
        Some(&json!({"name": "Sam"}))
    );
    assert!(outcome.trace.iter().any(|s| s.stage == "extract_memory"));

    orch.process("Remember me?", None, &ignore_events).await.unwrap();
    let instruction = provider.requests()[3]
        .config
        .system_instruction
        .clone()
        .unwrap_or_default();
    assert!(instruction.contains("Sam"));
}

#[tokio::test]
async fn test_failed_memory_extraction_keeps_reply() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply("Hello.")
            .reply("not json")
            .reply("Hello"),
    );
    let mut cfg = config(vec![ada()]);
    cfg.orchestration.memory_interval = 2;
    let mut orch = orchestrator(cfg, &provider);

    let outcome = orch.process("hi", None, &ignore_events).await.unwrap();
    assert_eq!(outcome.replies.len(), 1);
    assert!(orch.conversation().memory.is_empty());
}

#[tokio::test]
async fn test_attachment_sent_inline() {
    let provider = Arc::new(ScriptedProvider::new().reply("A cat.").reply("Cat photo"));
    let mut orch = orchestrator(config(vec![ada()]), &provider);

    let attachment = Attachment::from_bytes(b"\x89PNG", "image/png");
    orch.process("What is this?", Some(attachment), &ignore_events)
        .await
        .unwrap();

    let contents = serde_json::to_value(&provider.requests()[0].contents).unwrap();
    let parts = contents[0]["parts"].as_array().unwrap();
    assert_eq!(parts[0]["text"], "What is this?");
    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
}

#[tokio::test]
async fn test_regenerate_keeps_variant() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply("First answer")
            .reply("Answers")
            .reply("Second answer"),
    );
    let mut orch = orchestrator(config(vec![ada()]), &provider);

    let outcome = orch.process("question", None, &ignore_events).await.unwrap();
    let id = outcome.replies[0].id.clone();

    let message = orch.regenerate(&id, &ignore_events).await.unwrap();
    assert_eq!(message.text, "Second answer");
    assert_eq!(message.variants.len(), 1);
    assert_eq!(message.variants[0].text, "First answer");

    let user_id = outcome.user_message_id;
    assert!(orch.regenerate(&user_id, &ignore_events).await.is_err());
}

#[tokio::test]
async fn test_turns_are_persisted() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply("One")
            .reply("Counting")
            .reply("Two"),
    );
    let mut orch =
        orchestrator(config(vec![ada()]), &provider).with_store(Box::new(MemoryStore::new()));

    orch.process("count", None, &ignore_events).await.unwrap();
    orch.process("again", None, &ignore_events).await.unwrap();

    let store = orch.store().unwrap();
    let conversations = store.conversations().list(PageRequest::default()).await.unwrap();
    assert_eq!(conversations.total, 1);
    let row = &conversations.items[0];
    assert_eq!(row.id, orch.conversation().id);
    assert_eq!(row.title, "Counting");
    assert!(row.token_count > 0);

    let prompts = store.prompts().list(PageRequest::default()).await.unwrap();
    assert_eq!(prompts.total, 2);
    assert!(prompts.items.iter().all(|p| p.responded));

    orch.clear().await;
    let row = orch
        .store()
        .unwrap()
        .conversations()
        .get(&orch.conversation().id)
        .await
        .unwrap()
        .unwrap();
    assert!(row.clear);
}
