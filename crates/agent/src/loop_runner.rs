//! The agent reasoning loop implementation.

use std::path::PathBuf;
use std::sync::Arc;

use looper_config::AppConfig;
use looper_core::error::{Error, ProviderError, Result, ToolError};
use looper_core::message::ToolCall;
use looper_core::provider::{CompletionRequest, EventStream, Provider, Response};
use looper_core::tool::ToolRegistry;
use looper_core::{CancellationToken, StreamEvent, ToolCallAssembler};
use looper_sandbox::ProcessSandbox;
use looper_skills::SkillDiscovery;
use tracing::{debug, info, warn};

use crate::context::ConversationContext;
use crate::observer::{NoopObserver, StreamObserver};

/// Model requests allowed per session when not configured.
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;

/// One agent session: a provider, its tools, and the conversation so far.
///
/// Turns take `&mut self`; a session is driven by one task at a time.
pub struct Agent {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// Tool registry
    tools: ToolRegistry,

    /// Skill discovery, if skills are enabled for this session
    discovery: Option<SkillDiscovery>,

    /// Conversation state
    context: ConversationContext,

    /// Model override; empty lets the provider choose
    model: String,

    /// Base system prompt (skills are appended per request)
    system_prompt: String,

    /// Model requests allowed until the next reset (0 = unlimited)
    max_iterations: u32,

    /// Max tokens per response (0 = provider default)
    max_tokens: u32,

    /// Temperature (0.0 = provider default)
    temperature: f32,
}

impl Agent {
    /// Create a new agent.
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: ToolRegistry,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provider,
            tools,
            discovery: None,
            context: ConversationContext::new(workspace),
            model: String::new(),
            system_prompt: String::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tokens: 0,
            temperature: 0.0,
        }
    }

    /// Build a full session from configuration.
    ///
    /// Creates the provider, a process sandbox honouring the configured
    /// deny-list, the six built-in tools, and activates every discovered
    /// skill.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        let provider = looper_providers::build_provider(config)?;

        let sandbox_config = config.sandbox_config();
        debug!(
            workspace = %sandbox_config.working_dir.display(),
            blacklist = sandbox_config.blacklist.len(),
            timeout = ?sandbox_config.timeout,
            "Configuring sandbox"
        );
        let sandbox = Arc::new(ProcessSandbox::new(sandbox_config));
        let tools = looper_tools::default_registry(&config.workspace, sandbox)?;

        let discovery =
            SkillDiscovery::new(&config.workspace).with_skills_dir(config.skills_dir());

        let mut agent = Self::new(provider, tools, &config.workspace)
            .with_system_prompt(&config.system_prompt)
            .with_max_iterations(config.max_iterations)
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature)
            .with_skill_discovery(discovery);
        agent.activate_all_skills();

        info!(
            provider = agent.provider.name(),
            tools = agent.tools.len(),
            skills = agent.context.skills().count(),
            "Agent ready"
        );
        Ok(agent)
    }

    /// Set the base system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Request a specific model instead of the provider default.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the request ceiling shared by all turns until the next reset
    /// (0 = unlimited).
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Enable skills from `discovery`. Nothing is activated yet.
    pub fn with_skill_discovery(mut self, discovery: SkillDiscovery) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn skill_discovery(&mut self) -> Option<&mut SkillDiscovery> {
        self.discovery.as_mut()
    }

    /// Load a skill by name and add it to the system prompt.
    pub fn activate_skill(&mut self, name: &str) -> Result<()> {
        let discovery = self
            .discovery
            .as_mut()
            .ok_or_else(|| Error::Skill("skills are not enabled".into()))?;
        let skill = discovery
            .get(name)
            .map_err(|e| Error::Skill(format!("failed to load skill \"{name}\": {e}")))?
            .ok_or_else(|| Error::Skill(format!("skill \"{name}\" not found")))?;
        debug!(skill = %skill.name, path = %skill.path.display(), "Activated skill");
        self.context.activate_skill(skill);
        Ok(())
    }

    /// Activate every discovered skill that loads cleanly.
    pub fn activate_all_skills(&mut self) {
        let Some(discovery) = self.discovery.as_mut() else {
            return;
        };
        for skill in discovery.get_all() {
            self.context.activate_skill(skill);
        }
    }

    /// Clear the conversation and the iteration counter, restoring the
    /// request budget. Activated skills and usage totals remain.
    pub fn reset(&mut self) {
        self.context.reset();
    }

    fn build_request(&self) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: self.context.messages().to_vec(),
            tools: self.tools.definitions(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: format!("{}{}", self.system_prompt, self.context.skill_prompt()),
        }
    }

    /// Enforce the session ceiling, count the request, then honour
    /// cancellation. Only [`reset`](Self::reset) restores the budget.
    fn begin_iteration(&mut self, cancel: &CancellationToken) -> Result<()> {
        let used = self.context.iterations();
        if self.max_iterations > 0 && used >= self.max_iterations {
            warn!(limit = self.max_iterations, "Max iterations reached");
            return Err(Error::IterationLimitExceeded {
                limit: self.max_iterations,
            });
        }
        self.context.next_iteration();
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        debug!(iteration = used + 1, "Agent loop iteration");
        Ok(())
    }

    /// Process a user message and return the final answer.
    ///
    /// Loops request → tools → request until the model answers without
    /// tool calls.
    pub async fn run(&mut self, input: &str, cancel: CancellationToken) -> Result<String> {
        self.run_turn(input, cancel, &mut NoopObserver, false).await
    }

    /// Like [`run`](Self::run), reporting progress to `observer` and
    /// streaming from the provider when it can.
    ///
    /// A provider without streaming support is driven through `complete`,
    /// and its final text reaches `on_text` once.
    pub async fn run_stream(
        &mut self,
        input: &str,
        cancel: CancellationToken,
        observer: &mut dyn StreamObserver,
    ) -> Result<String> {
        let streaming = self.provider.supports_streaming();
        self.run_turn(input, cancel, observer, streaming).await
    }

    async fn run_turn(
        &mut self,
        input: &str,
        cancel: CancellationToken,
        observer: &mut dyn StreamObserver,
        streaming: bool,
    ) -> Result<String> {
        info!(
            provider = self.provider.name(),
            messages = self.context.messages().len(),
            streaming,
            "Processing turn"
        );
        self.context.add_user(input);

        loop {
            self.begin_iteration(&cancel)?;
            let request = self.build_request();

            let response = if streaming {
                let events = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    events = self.provider.complete_stream(request, cancel.clone()) => {
                        events.map_err(provider_error)?
                    }
                };
                consume_stream(events, &cancel, observer).await?
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    response = self.provider.complete(request) => response.map_err(provider_error)?,
                }
            };

            self.context.record_usage(response.usage);
            observer.on_usage(response.usage);

            if response.tool_calls.is_empty() {
                if !response.content.is_empty() {
                    self.context.add_assistant(&response.content);
                }
                if !streaming {
                    observer.on_text(&response.content);
                }
                observer.on_done();
                return Ok(response.content);
            }

            debug!(tool_count = response.tool_calls.len(), "Executing tool calls");
            let calls = response.tool_calls;
            self.context.add_tool_calls(response.content, calls.clone());
            self.execute_tools(&calls, &cancel, observer).await?;
        }
    }

    /// Run each call in order and append its result. On cancellation the
    /// remaining calls are answered with an error so the history stays
    /// well-formed, then `Cancelled` is returned.
    async fn execute_tools(
        &mut self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
        observer: &mut dyn StreamObserver,
    ) -> Result<()> {
        for (i, call) in calls.iter().enumerate() {
            if cancel.is_cancelled() {
                for skipped in &calls[i..] {
                    self.context
                        .add_tool_result(&skipped.id, format!("Error: {}", ToolError::Cancelled));
                }
                return Err(Error::Cancelled);
            }

            observer.on_tool_call_start(call);
            let (output, success) = match self.tools.execute(call, cancel.clone()).await {
                Ok(result) => (result.output, result.success),
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool execution failed");
                    (format!("Error: {e}"), false)
                }
            };
            observer.on_tool_call_end(call, &output, success);
            self.context.add_tool_result(&call.id, output);
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

fn provider_error(e: ProviderError) -> Error {
    match e {
        ProviderError::Cancelled => Error::Cancelled,
        other => Error::Provider(other),
    }
}

/// Drain one event stream into a response.
///
/// Text is forwarded to the observer as it arrives. Tool calls are merged
/// by index; an End's payload wins over accumulated fragments unless it
/// carries no arguments. A stream that closes without a terminal event is
/// treated as interrupted.
async fn consume_stream(
    mut events: EventStream,
    cancel: &CancellationToken,
    observer: &mut dyn StreamObserver,
) -> Result<Response> {
    let mut content = String::new();
    let mut calls = ToolCallAssembler::new();

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            event = events.recv() => event,
        };

        match event {
            Some(StreamEvent::Text(text)) => {
                observer.on_text(&text);
                content.push_str(&text);
            }
            Some(StreamEvent::ToolCallStart { index, id, name }) => {
                calls.start(index, &id, &name);
            }
            Some(StreamEvent::ToolCallDelta { index, fragment }) => {
                calls.append(index, &fragment);
            }
            Some(StreamEvent::ToolCallEnd { index, call }) => {
                calls.complete_with(index, &call);
            }
            Some(StreamEvent::Done { usage, stop_reason }) => {
                return Ok(Response {
                    content,
                    tool_calls: calls.into_calls(),
                    stop_reason,
                    usage,
                });
            }
            Some(StreamEvent::Error(e)) => return Err(provider_error(e)),
            None => {
                return Err(Error::Provider(ProviderError::StreamInterrupted(
                    "stream closed before completion".into(),
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use looper_core::provider::{STREAM_BUFFER, Usage};

    fn stream_of(events: Vec<StreamEvent>) -> EventStream {
        let (tx, rx) = tokio::sync::mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });
        rx
    }

    #[derive(Default)]
    struct Recorder {
        text: String,
    }

    impl StreamObserver for Recorder {
        fn on_text(&mut self, text: &str) {
            self.text.push_str(text);
        }
    }

    #[tokio::test]
    async fn consume_merges_fragments_by_index() {
        let events = stream_of(vec![
            StreamEvent::Text("Let me ".into()),
            StreamEvent::ToolCallStart {
                index: 1,
                id: "b".into(),
                name: "grep".into(),
            },
            StreamEvent::ToolCallStart {
                index: 0,
                id: "a".into(),
                name: "read_file".into(),
            },
            StreamEvent::ToolCallDelta {
                index: 0,
                fragment: "{\"path\":".into(),
            },
            StreamEvent::ToolCallDelta {
                index: 0,
                fragment: "\"a.txt\"}".into(),
            },
            StreamEvent::ToolCallEnd {
                index: 0,
                call: ToolCall::new("a", "read_file", ""),
            },
            StreamEvent::ToolCallEnd {
                index: 1,
                call: ToolCall::new("b", "grep", "{\"pattern\":\"x\"}"),
            },
            StreamEvent::Text("look".into()),
            StreamEvent::Done {
                usage: Usage {
                    input_tokens: 1,
                    output_tokens: 2,
                },
                stop_reason: Some("tool_use".into()),
            },
        ]);

        let mut recorder = Recorder::default();
        let response = consume_stream(events, &CancellationToken::new(), &mut recorder)
            .await
            .unwrap();

        assert_eq!(recorder.text, "Let me look");
        assert_eq!(response.content, "Let me look");
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(response.tool_calls[0].id, "a");
        assert_eq!(response.tool_calls[0].arguments, "{\"path\":\"a.txt\"}");
        assert_eq!(response.tool_calls[1].arguments, "{\"pattern\":\"x\"}");
        assert_eq!(response.usage.output_tokens, 2);
    }

    #[tokio::test]
    async fn consume_reports_stream_error() {
        let events = stream_of(vec![
            StreamEvent::Text("partial".into()),
            StreamEvent::Error(ProviderError::Network("reset".into())),
        ]);
        let err = consume_stream(events, &CancellationToken::new(), &mut NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Network(_))));
    }

    #[tokio::test]
    async fn consume_treats_early_close_as_interrupted() {
        let events = stream_of(vec![StreamEvent::Text("cut".into())]);
        let err = consume_stream(events, &CancellationToken::new(), &mut NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Provider(ProviderError::StreamInterrupted(_))
        ));
    }

    #[tokio::test]
    async fn consume_stops_on_cancel() {
        let (_tx, rx) = tokio::sync::mpsc::channel::<StreamEvent>(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = consume_stream(rx, &cancel, &mut NoopObserver).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn cancelled_provider_error_maps_to_cancelled() {
        assert!(matches!(provider_error(ProviderError::Cancelled), Error::Cancelled));
        assert!(matches!(
            provider_error(ProviderError::Network("x".into())),
            Error::Provider(_)
        ));
    }
}
