//! Conversation orchestrator
//!
//! Owns the configuration, provider, tool registry, conversation and
//! optional store, and runs one user turn end to end:
//! user message → speaker selection (or plan) → agent reply → memory →
//! title → persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::agent::conversation::Conversation;
use crate::agent::generator::{
    GenerationInput, GenerationOutput, GeneratorSettings, ResponseGenerator,
};
use crate::agent::manager::{extract_memory, generate_title, ManagerContext};
use crate::agent::moderator::{moderate_turn, ModeratorDecision};
use crate::agent::pipeline::PipelineTrace;
use crate::agent::planner::generate_dynamic_plan;
use crate::agent::turn::{decide_next_speaker, SpeakerDecision};
use crate::core::config::TurnStrategy;
use crate::core::{
    Agent, Attachment, Config, Message, PipelineStep, Plan, Result, RoundtableError, Sender,
};
use crate::llm::{GeminiClient, LLMProvider};
use crate::store::{self, ConversationRecord, ConversationStore, PromptRecord};
use crate::tools::ToolRegistry;

/// Progress reported while a turn runs
#[derive(Debug, Clone, Copy)]
pub enum TurnEvent<'a> {
    /// An agent is about to answer
    Speaker { agent_id: &'a str, name: &'a str },
    /// Streamed text from the current speaker
    Token(&'a str),
    /// Nobody speaks this turn
    Waiting { rationale: &'a str },
}

/// Receives turn events
pub type EventCallback<'c> = dyn for<'a> Fn(TurnEvent<'a>) + Send + Sync + 'c;

/// How the speaker for a turn was chosen
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Only one agent is enabled under the manager strategy, no call was made
    Single(String),
    Manager(SpeakerDecision),
    Moderator(ModeratorDecision),
    Planned,
}

/// Everything one call to `process` produced
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub user_message_id: String,
    pub selection: Selection,
    /// Agent messages appended this turn, in order
    pub replies: Vec<Message>,
    pub plan: Option<Plan>,
    /// Every call made during the turn, including memory and title
    pub trace: Vec<PipelineStep>,
}

/// Inputs for one agent reply within a turn
struct AgentTurn<'a> {
    /// Number of leading conversation messages used as history
    history_len: usize,
    latest_text: &'a str,
    attachment: Option<&'a Attachment>,
    /// Moderator task appended to the agent's instruction
    task: Option<&'a str>,
    /// Plan recorded on the reply
    plan: Option<&'a Plan>,
}

/// Runs turns for one conversation
pub struct Orchestrator {
    config: Config,
    provider: Arc<dyn LLMProvider>,
    generator: ResponseGenerator,
    conversation: Conversation,
    store: Option<Box<dyn ConversationStore>>,
    /// Creation time of the stored conversation row, once saved
    stored_since: Option<DateTime<Utc>>,
    messages_since_memory: usize,
}

impl Orchestrator {
    /// Create an orchestrator over any provider, with the built-in tools
    pub fn new(config: Config, provider: Arc<dyn LLMProvider>) -> Self {
        let generator = ResponseGenerator::new(
            Arc::clone(&provider),
            Arc::new(ToolRegistry::with_builtins()),
            GeneratorSettings::from(&config.orchestration),
        );
        let conversation = Conversation::new(config.orchestration.max_history);

        Self {
            config,
            provider,
            generator,
            conversation,
            store: None,
            stored_since: None,
            messages_since_memory: 0,
        }
    }

    /// Create an orchestrator talking to the hosted API, with the configured store
    pub fn from_config(config: Config) -> Result<Self> {
        let provider: Arc<dyn LLMProvider> = Arc::new(GeminiClient::from_config(&config)?);
        let store = store::from_config(&config.store)?;
        let mut orchestrator = Self::new(config, provider);
        orchestrator.store = store;
        Ok(orchestrator)
    }

    pub fn with_store(mut self, store: Box<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    pub fn store(&self) -> Option<&dyn ConversationStore> {
        self.store.as_deref()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn set_strategy(&mut self, strategy: TurnStrategy) {
        self.config.orchestration.strategy = strategy;
    }

    /// Enabled agents in roster order
    pub fn enabled_agents(&self) -> Vec<&Agent> {
        self.config.agents.iter().filter(|a| a.enabled).collect()
    }

    fn manager_key(&self) -> Option<String> {
        self.config.credential_for(self.config.manager.api_key.as_deref())
    }

    fn manager_context<'a>(
        &'a self,
        api_key: Option<&'a str>,
        history: &'a [Message],
    ) -> ManagerContext<'a> {
        ManagerContext {
            manager: &self.config.manager,
            api_key,
            agents: &self.config.agents,
            history,
            context_window: self.config.orchestration.context_window,
        }
    }

    /// Handle one user message.
    ///
    /// Model calls are single-shot; on error the user message stays in the
    /// conversation and the caller may retry with `regenerate` or a new
    /// message.
    pub async fn process(
        &mut self,
        text: &str,
        attachment: Option<Attachment>,
        on_event: &EventCallback<'_>,
    ) -> Result<TurnOutcome> {
        if self.enabled_agents().is_empty() {
            return Err(RoundtableError::config("No enabled agents in the roster"));
        }

        let mut user = Message::user(text);
        if let Some(attachment) = attachment.clone() {
            user = user.with_attachment(attachment);
        }
        let user_message_id = self.conversation.push(user).id.clone();
        self.messages_since_memory += 1;
        info!(message = %user_message_id, "processing user message");

        let manager_key = self.manager_key();
        let mut trace = PipelineTrace::new();

        let planned = if self.config.orchestration.planning && self.enabled_agents().len() > 1 {
            let history = self.history_before_last();
            let ctx = self.manager_context(manager_key.as_deref(), history);
            let plan = generate_dynamic_plan(self.provider.as_ref(), &ctx, text, &mut trace).await?;
            (!plan.is_empty()).then_some(plan)
        } else {
            None
        };

        let (selection, replies) = match planned.clone() {
            Some(plan) => {
                let replies = self
                    .run_plan(text, attachment.as_ref(), plan, &mut trace, on_event)
                    .await?;
                (Selection::Planned, replies)
            }
            None => {
                let (selection, speaker) = self
                    .select_speaker(text, manager_key.as_deref(), &mut trace)
                    .await?;
                let replies = match speaker {
                    Some((agent, task)) => {
                        let turn = AgentTurn {
                            history_len: self.conversation.len() - 1,
                            latest_text: text,
                            attachment: attachment.as_ref(),
                            task: task.as_deref(),
                            plan: None,
                        };
                        let reply = self.run_agent(&agent, turn, &mut trace, on_event).await?;
                        vec![reply]
                    }
                    None => {
                        let rationale = match &selection {
                            Selection::Moderator(d) => d.rationale.as_str(),
                            _ => "",
                        };
                        on_event(TurnEvent::Waiting { rationale });
                        Vec::new()
                    }
                };
                (selection, replies)
            }
        };

        self.maybe_extract_memory(manager_key.as_deref(), &mut trace).await;
        if self.conversation.title.is_none() && !replies.is_empty() {
            self.maybe_generate_title(manager_key.as_deref(), &mut trace).await;
        }
        self.persist(text, &replies).await;

        Ok(TurnOutcome {
            user_message_id,
            selection,
            replies,
            plan: planned,
            trace: trace.into_steps(),
        })
    }

    /// Messages before the newest one
    fn history_before_last(&self) -> &[Message] {
        let messages = self.conversation.messages();
        &messages[..messages.len().saturating_sub(1)]
    }

    /// Pick the agent for this turn and an optional task for it
    async fn select_speaker(
        &mut self,
        text: &str,
        manager_key: Option<&str>,
        trace: &mut PipelineTrace,
    ) -> Result<(Selection, Option<(Agent, Option<String>)>)> {
        match self.config.orchestration.strategy {
            // A lone agent needs no turn manager, but the moderator still
            // decides whether it should speak at all.
            TurnStrategy::Manager if self.enabled_agents().len() == 1 => {
                let agent = self.enabled_agents()[0].clone();
                Ok((Selection::Single(agent.id.clone()), Some((agent, None))))
            }
            TurnStrategy::Manager => {
                let ctx = self.manager_context(manager_key, self.history_before_last());
                let decision =
                    decide_next_speaker(self.provider.as_ref(), &ctx, text, None, trace).await?;

                let agent = decision
                    .next_speaker_id
                    .as_deref()
                    .and_then(|id| self.config.agent(id))
                    .or_else(|| self.fallback_speaker())
                    .cloned();
                if let Some(ref topic) = decision.new_topic {
                    info!(topic = %topic, "topic changed");
                    self.conversation.recent_topic = Some(topic.clone());
                }
                Ok((Selection::Manager(decision), agent.map(|a| (a, None))))
            }
            TurnStrategy::Moderator => {
                let ctx = self.manager_context(manager_key, self.conversation.messages());
                let decision = moderate_turn(
                    self.provider.as_ref(),
                    &ctx,
                    &self.config.orchestration.house_rules,
                    trace,
                )
                .await?;

                let speaker = decision
                    .speaker()
                    .and_then(|id| self.config.agent(id))
                    .cloned()
                    .map(|a| (a, decision.task.clone()));
                Ok((Selection::Moderator(decision), speaker))
            }
        }
    }

    /// Last agent that spoke, else the first enabled agent
    fn fallback_speaker(&self) -> Option<&Agent> {
        let last = self
            .conversation
            .messages()
            .iter()
            .rev()
            .find_map(|m| m.sender.agent_id())
            .and_then(|id| self.config.agent(id))
            .filter(|a| a.enabled);
        debug!(fallback = ?last.map(|a| &a.id), "turn manager named no speaker");
        last.or_else(|| self.config.agents.iter().find(|a| a.enabled))
    }

    /// Run each plan step in order; steps for unknown or disabled agents are skipped
    async fn run_plan(
        &mut self,
        text: &str,
        attachment: Option<&Attachment>,
        plan: Plan,
        trace: &mut PipelineTrace,
        on_event: &EventCallback<'_>,
    ) -> Result<Vec<Message>> {
        let mut replies: Vec<Message> = Vec::new();

        for (index, step) in plan.steps.iter().enumerate() {
            let Some(agent) = self.config.agent(&step.agent_id).filter(|a| a.enabled).cloned()
            else {
                warn!(agent = %step.agent_id, "skipping plan step for unknown agent");
                continue;
            };

            let part = format!(
                "Your part of the plan (step {} of {}): {}",
                index + 1,
                plan.steps.len(),
                step.task
            );
            // The first step answers the user message itself; later steps
            // see it, plus earlier replies, in the history.
            let first = replies.is_empty();
            let (history_len, latest) = if first {
                (self.conversation.len() - 1, format!("{}\n\n{}", text, part))
            } else {
                (self.conversation.len(), part)
            };

            let reply = self
                .run_agent(
                    &agent,
                    AgentTurn {
                        history_len,
                        latest_text: &latest,
                        attachment: if first { attachment } else { None },
                        task: None,
                        plan: first.then_some(&plan),
                    },
                    trace,
                    on_event,
                )
                .await?;
            replies.push(reply);
        }

        Ok(replies)
    }

    /// Generate one agent reply over the first `turn.history_len` messages and append it
    async fn run_agent(
        &mut self,
        agent: &Agent,
        turn: AgentTurn<'_>,
        trace: &mut PipelineTrace,
        on_event: &EventCallback<'_>,
    ) -> Result<Message> {
        on_event(TurnEvent::Speaker {
            agent_id: &agent.id,
            name: &agent.name,
        });

        let api_key = self.config.credential_for(agent.api_key.as_deref());
        let instruction = turn.task.map(|task| {
            format!(
                "{}\n\nThe moderator asked you to: {}",
                agent.system_instruction, task
            )
        });
        let forward = |chunk: &str| on_event(TurnEvent::Token(chunk));

        let output: GenerationOutput = self
            .generator
            .generate(
                GenerationInput {
                    latest_text: turn.latest_text,
                    agent,
                    history: &self.conversation.messages()[..turn.history_len],
                    roster: &self.config.agents,
                    attachment: turn.attachment,
                    instruction_override: instruction.as_deref(),
                    memory: &self.conversation.memory,
                    recent_topic: self.conversation.recent_topic.as_deref(),
                    api_key: api_key.as_deref(),
                },
                &forward,
            )
            .await?;

        trace.extend(output.pipeline.clone());
        self.conversation.token_count += u64::from(output.usage.total_tokens);

        let mut message = Message::agent(&agent.id, output.text).with_summary(output.summary);
        message.pipeline = Some(output.pipeline.into_steps());
        message.plan = turn.plan.cloned();
        let message = self.conversation.push(message).clone();
        self.messages_since_memory += 1;
        Ok(message)
    }

    /// Regenerate an agent message; the previous answer is kept as a variant
    pub async fn regenerate(
        &mut self,
        message_id: &str,
        on_event: &EventCallback<'_>,
    ) -> Result<Message> {
        let position = self
            .conversation
            .position(message_id)
            .ok_or_else(|| RoundtableError::UnknownMessage(message_id.to_string()))?;
        let messages = self.conversation.messages();

        let agent_id = match &messages[position].sender {
            Sender::Agent(id) => id.clone(),
            other => {
                return Err(RoundtableError::Other(format!(
                    "Only agent messages can be regenerated, not {} messages",
                    other
                )))
            }
        };
        let agent = self
            .config
            .agent(&agent_id)
            .cloned()
            .ok_or_else(|| RoundtableError::UnknownAgent(agent_id.clone()))?;

        let prompt_index = messages[..position]
            .iter()
            .rposition(|m| m.sender.is_user())
            .ok_or_else(|| {
                RoundtableError::Other("No user message precedes this reply".to_string())
            })?;
        let prompt = messages[prompt_index].clone();

        on_event(TurnEvent::Speaker {
            agent_id: &agent.id,
            name: &agent.name,
        });
        let api_key = self.config.credential_for(agent.api_key.as_deref());
        let forward = |chunk: &str| on_event(TurnEvent::Token(chunk));

        let output = self
            .generator
            .generate(
                GenerationInput {
                    latest_text: &prompt.text,
                    agent: &agent,
                    history: &messages[..prompt_index],
                    roster: &self.config.agents,
                    attachment: prompt.attachment.as_ref(),
                    instruction_override: None,
                    memory: &self.conversation.memory,
                    recent_topic: self.conversation.recent_topic.as_deref(),
                    api_key: api_key.as_deref(),
                },
                &forward,
            )
            .await?;

        self.conversation.token_count += u64::from(output.usage.total_tokens);
        self.conversation.add_variant(
            message_id,
            output.text,
            Some(output.summary),
            output.pipeline.into_steps(),
        )?;

        self.conversation
            .get(message_id)
            .cloned()
            .ok_or_else(|| RoundtableError::UnknownMessage(message_id.to_string()))
    }

    /// Plan a request without running it
    pub async fn plan(&self, text: &str) -> Result<(Plan, Vec<PipelineStep>)> {
        let manager_key = self.manager_key();
        let ctx = self.manager_context(manager_key.as_deref(), self.conversation.messages());
        let mut trace = PipelineTrace::new();
        let plan = generate_dynamic_plan(self.provider.as_ref(), &ctx, text, &mut trace).await?;
        Ok((plan, trace.into_steps()))
    }

    /// Run memory extraction once enough new messages arrived. Failures
    /// are logged and never fail the turn.
    async fn maybe_extract_memory(&mut self, manager_key: Option<&str>, trace: &mut PipelineTrace) {
        let interval = self.config.orchestration.memory_interval;
        if interval == 0 || self.messages_since_memory < interval {
            return;
        }

        let window = self.messages_since_memory;
        let ctx = self.manager_context(manager_key, self.conversation.messages());
        let result = extract_memory(
            self.provider.as_ref(),
            &ctx,
            &self.conversation.memory,
            window,
            trace,
        )
        .await;

        match result {
            Ok(facts) => {
                debug!(facts = facts.len(), "merging extracted memory");
                self.conversation.memory.merge(&facts);
                self.messages_since_memory = 0;
            }
            Err(e) => warn!(error = %e, "memory extraction failed"),
        }
    }

    async fn maybe_generate_title(&mut self, manager_key: Option<&str>, trace: &mut PipelineTrace) {
        let ctx = self.manager_context(manager_key, self.conversation.messages());
        match generate_title(self.provider.as_ref(), &ctx, trace).await {
            Ok(title) => {
                info!(title = %title, "conversation titled");
                self.conversation.title = Some(title);
            }
            Err(e) => warn!(error = %e, "title generation failed"),
        }
    }

    /// Save the conversation row and one prompt row. Failures are logged.
    async fn persist(&mut self, user_text: &str, replies: &[Message]) {
        let Some(store) = self.store.as_deref() else {
            return;
        };

        let mut record = ConversationRecord::new(
            &self.conversation.id,
            self.conversation.title.clone().unwrap_or_default(),
        );
        record.token_count = i64::try_from(self.conversation.token_count).unwrap_or(i64::MAX);
        record.system_instruction = self.config.manager.system_instruction.clone();

        let saved = match self.stored_since {
            Some(created_at) => {
                record.created_at = created_at;
                store.conversations().update(record).await
            }
            None => store.conversations().create(record).await,
        };
        match saved {
            Ok(row) => self.stored_since = Some(row.created_at),
            Err(e) => {
                warn!(store = store.name(), error = %e, "failed to save conversation");
                return;
            }
        }

        let model = replies
            .first()
            .and_then(|m| m.sender.agent_id())
            .and_then(|id| self.config.agent(id))
            .map(|a| a.model.clone())
            .unwrap_or_else(|| self.config.manager.model.clone());
        let mut prompt = PromptRecord::new(user_text, model);
        if !replies.is_empty() {
            let text = replies
                .iter()
                .map(|m| m.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            prompt = prompt.with_response(text);
        }
        if let Err(e) = store.prompts().create(prompt).await {
            warn!(store = store.name(), error = %e, "failed to save prompt");
        }
    }

    /// Clear the conversation and flag the stored row as cleared
    pub async fn clear(&mut self) {
        self.conversation.clear();
        self.messages_since_memory = 0;

        let Some(store) = self.store.as_deref() else {
            return;
        };
        let Some(created_at) = self.stored_since else {
            return;
        };
        let mut record = ConversationRecord::new(&self.conversation.id, String::new());
        record.created_at = created_at;
        record.clear = true;
        record.system_instruction = self.config.manager.system_instruction.clone();
        if let Err(e) = store.conversations().update(record).await {
            warn!(store = store.name(), error = %e, "failed to flag conversation as cleared");
        }
    }
}
