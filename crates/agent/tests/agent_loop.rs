//! Agent loop tests driven by scripted providers.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use looper_agent::{Agent, StreamObserver};
use looper_core::error::{Error, ProviderError};
use looper_core::message::{Role, ToolCall};
use looper_core::provider::{
    CompletionRequest, EventStream, Provider, Response, STREAM_BUFFER, Usage,
};
use looper_core::tool::ToolRegistry;
use looper_core::{CancellationToken, StreamEvent};
use looper_skills::SkillDiscovery;
use looper_tools::{ReadFileTool, Workspace};

/// Replays canned responses through `complete` and records every request.
struct ScriptedProvider {
    responses: Mutex<Vec<Response>>,
    requests: Mutex<Vec<CompletionRequest>>,
    repeat_last: bool,
}

impl ScriptedProvider {
    fn new(responses: Vec<Response>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            repeat_last: false,
        })
    }

    /// Answers every request with the same response.
    fn forever(response: Response) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(vec![response]),
            requests: Mutex::new(Vec::new()),
            repeat_last: true,
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, i: usize) -> CompletionRequest {
        self.requests.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Response, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        if self.repeat_last {
            return Ok(responses[0].clone());
        }
        if responses.is_empty() {
            panic!("ScriptedProvider: no more responses");
        }
        Ok(responses.remove(0))
    }
}

/// Replays canned event sequences through `complete_stream`.
struct StreamingProvider {
    scripts: Mutex<Vec<Vec<StreamEvent>>>,
    requests: Mutex<usize>,
}

impl StreamingProvider {
    fn new(scripts: Vec<Vec<StreamEvent>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts),
            requests: Mutex::new(0),
        })
    }
}

#[async_trait]
impl Provider for StreamingProvider {
    fn name(&self) -> &str {
        "streaming"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<Response, ProviderError> {
        panic!("StreamingProvider: complete should not be called");
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn complete_stream(
        &self,
        _request: CompletionRequest,
        _cancel: CancellationToken,
    ) -> Result<EventStream, ProviderError> {
        *self.requests.lock().unwrap() += 1;
        let events = self.scripts.lock().unwrap().remove(0);
        let (tx, rx) = tokio::sync::mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

#[derive(Default)]
struct Recorder {
    text: Vec<String>,
    tool_starts: Vec<String>,
    tool_ends: Vec<(String, bool)>,
    usage: Vec<Usage>,
    done: usize,
}

impl StreamObserver for Recorder {
    fn on_text(&mut self, text: &str) {
        self.text.push(text.to_string());
    }

    fn on_tool_call_start(&mut self, call: &ToolCall) {
        self.tool_starts.push(call.name.clone());
    }

    fn on_tool_call_end(&mut self, call: &ToolCall, _output: &str, success: bool) {
        self.tool_ends.push((call.name.clone(), success));
    }

    fn on_usage(&mut self, usage: Usage) {
        self.usage.push(usage);
    }

    fn on_done(&mut self) {
        self.done += 1;
    }
}

fn text_response(text: &str) -> Response {
    Response {
        content: text.into(),
        tool_calls: vec![],
        stop_reason: Some("end_turn".into()),
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
        },
    }
}

fn tool_response(calls: Vec<ToolCall>) -> Response {
    Response {
        content: String::new(),
        tool_calls: calls,
        stop_reason: Some("tool_use".into()),
        usage: Usage {
            input_tokens: 20,
            output_tokens: 8,
        },
    }
}

fn workspace_with_file() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "hello\n").unwrap();
    dir
}

fn file_tools(dir: &tempfile::TempDir) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(Box::new(ReadFileTool::new(Workspace::new(dir.path()))))
        .unwrap();
    registry
}

#[tokio::test]
async fn tool_call_then_answer() {
    let dir = workspace_with_file();
    let provider = ScriptedProvider::new(vec![
        tool_response(vec![ToolCall::new("c1", "read_file", r#"{"path":"a.txt"}"#)]),
        text_response("done"),
    ]);
    let mut agent = Agent::new(provider.clone(), file_tools(&dir), dir.path());

    let answer = agent.run("read a.txt", CancellationToken::new()).await.unwrap();

    assert_eq!(answer, "done");
    assert_eq!(provider.request_count(), 2);

    let messages = agent.context().messages();
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(messages[2].tool_call_id.as_deref(), Some("c1"));
    assert!(messages[2].content.contains("hello"));

    // The second request carries the tool result.
    let second = provider.request(1);
    assert_eq!(second.messages.len(), 3);
    assert_eq!(second.tools.len(), 1);

    assert_eq!(agent.context().usage().input_tokens, 30);
    assert_eq!(agent.context().iterations(), 2);
}

#[tokio::test]
async fn unknown_tool_is_reported_to_model() {
    let dir = workspace_with_file();
    let provider = ScriptedProvider::new(vec![
        tool_response(vec![ToolCall::new("c1", "frobnicate", "{}")]),
        text_response("sorry"),
    ]);
    let mut agent = Agent::new(provider, file_tools(&dir), dir.path());

    let answer = agent.run("go", CancellationToken::new()).await.unwrap();
    assert_eq!(answer, "sorry");
    let result = &agent.context().messages()[2];
    assert_eq!(result.content, "Error: unknown tool: frobnicate");
}

#[tokio::test]
async fn iteration_limit_stops_after_exact_count() {
    let dir = workspace_with_file();
    let provider = ScriptedProvider::forever(tool_response(vec![ToolCall::new(
        "c1",
        "read_file",
        r#"{"path":"a.txt"}"#,
    )]));
    let mut agent = Agent::new(provider.clone(), file_tools(&dir), dir.path())
        .with_max_iterations(3);

    let err = agent.run("loop", CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, Error::IterationLimitExceeded { limit: 3 }));
    assert_eq!(provider.request_count(), 3);
}

#[tokio::test]
async fn iteration_budget_spans_turns_until_reset() {
    let dir = workspace_with_file();
    let provider = ScriptedProvider::new(vec![
        tool_response(vec![ToolCall::new("c1", "read_file", r#"{"path":"a.txt"}"#)]),
        text_response("one"),
        text_response("two"),
    ]);
    let mut agent =
        Agent::new(provider.clone(), file_tools(&dir), dir.path()).with_max_iterations(2);

    assert_eq!(agent.run("first", CancellationToken::new()).await.unwrap(), "one");
    assert_eq!(agent.context().iterations(), 2);

    let err = agent.run("second", CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::IterationLimitExceeded { limit: 2 }));
    assert_eq!(provider.request_count(), 2);

    agent.reset();
    assert_eq!(agent.run("third", CancellationToken::new()).await.unwrap(), "two");
    assert_eq!(provider.request_count(), 3);
    assert_eq!(agent.context().iterations(), 1);
}

#[tokio::test]
async fn cancelled_before_request() {
    let dir = workspace_with_file();
    let provider = ScriptedProvider::new(vec![text_response("never")]);
    let mut agent = Agent::new(provider.clone(), file_tools(&dir), dir.path());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = agent.run("hi", cancel).await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(provider.request_count(), 0);
}

#[tokio::test]
async fn streamed_text_and_tool_deltas() {
    let dir = workspace_with_file();
    let provider = StreamingProvider::new(vec![
        vec![
            StreamEvent::Text("Reading".into()),
            StreamEvent::ToolCallStart {
                index: 0,
                id: "c1".into(),
                name: "read_file".into(),
            },
            StreamEvent::ToolCallDelta {
                index: 0,
                fragment: r#"{"pa"#.into(),
            },
            StreamEvent::ToolCallDelta {
                index: 0,
                fragment: r#"th":"a.txt"}"#.into(),
            },
            StreamEvent::ToolCallEnd {
                index: 0,
                call: ToolCall::new("c1", "read_file", ""),
            },
            StreamEvent::Done {
                usage: Usage::default(),
                stop_reason: Some("tool_use".into()),
            },
        ],
        vec![
            StreamEvent::Text("Hel".into()),
            StreamEvent::Text("lo".into()),
            StreamEvent::Done {
                usage: Usage {
                    input_tokens: 4,
                    output_tokens: 2,
                },
                stop_reason: Some("end_turn".into()),
            },
        ],
    ]);
    let mut agent = Agent::new(provider.clone(), file_tools(&dir), dir.path());
    let mut recorder = Recorder::default();

    let answer = agent
        .run_stream("read it", CancellationToken::new(), &mut recorder)
        .await
        .unwrap();

    assert_eq!(answer, "Hello");
    assert_eq!(recorder.text, vec!["Reading", "Hel", "lo"]);
    assert_eq!(recorder.tool_starts, vec!["read_file"]);
    assert_eq!(recorder.tool_ends, vec![("read_file".to_string(), true)]);
    assert_eq!(recorder.usage.len(), 2);
    assert_eq!(recorder.done, 1);
    assert_eq!(*provider.requests.lock().unwrap(), 2);

    let call_turn = &agent.context().messages()[1];
    assert_eq!(call_turn.content, "Reading");
    assert_eq!(call_turn.tool_calls[0].arguments, r#"{"path":"a.txt"}"#);
}

#[tokio::test]
async fn stream_error_aborts_turn() {
    let dir = workspace_with_file();
    let provider = StreamingProvider::new(vec![vec![
        StreamEvent::Text("par".into()),
        StreamEvent::Error(ProviderError::Api {
            kind: "overloaded_error".into(),
            message: "Overloaded".into(),
        }),
    ]]);
    let mut agent = Agent::new(provider, file_tools(&dir), dir.path());

    let err = agent
        .run_stream("hi", CancellationToken::new(), &mut Recorder::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("overloaded_error"));
}

#[tokio::test]
async fn non_streaming_provider_falls_back_to_complete() {
    let dir = workspace_with_file();
    let provider = ScriptedProvider::new(vec![text_response("whole answer")]);
    let mut agent = Agent::new(provider, file_tools(&dir), dir.path());
    let mut recorder = Recorder::default();

    let answer = agent
        .run_stream("hi", CancellationToken::new(), &mut recorder)
        .await
        .unwrap();

    assert_eq!(answer, "whole answer");
    assert_eq!(recorder.text, vec!["whole answer"]);
    assert_eq!(recorder.done, 1);
}

#[tokio::test]
async fn reset_is_idempotent() {
    let dir = workspace_with_file();
    let provider = ScriptedProvider::new(vec![text_response("a"), text_response("b")]);
    let mut agent = Agent::new(provider.clone(), file_tools(&dir), dir.path());

    agent.run("one", CancellationToken::new()).await.unwrap();
    agent.reset();
    agent.reset();
    assert!(agent.context().messages().is_empty());
    assert_eq!(agent.context().iterations(), 0);

    agent.run("two", CancellationToken::new()).await.unwrap();
    assert_eq!(provider.request(1).messages.len(), 1);
    assert_eq!(agent.context().usage().input_tokens, 20);
}

#[tokio::test]
async fn system_prompt_includes_activated_skills() {
    let dir = workspace_with_file();
    std::fs::create_dir_all(dir.path().join("skills")).unwrap();
    std::fs::write(
        dir.path().join("skills/git.md"),
        "---\nname: git\ndescription: Git workflow\n---\nUse small commits.\n",
    )
    .unwrap();

    let provider = ScriptedProvider::new(vec![text_response("ok")]);
    let mut agent = Agent::new(provider.clone(), file_tools(&dir), dir.path())
        .with_system_prompt("You are helpful.")
        .with_skill_discovery(SkillDiscovery::new(dir.path()));

    assert!(matches!(agent.activate_skill("missing"), Err(Error::Skill(_))));
    agent.activate_skill("git").unwrap();
    agent.run("hi", CancellationToken::new()).await.unwrap();

    let system = provider.request(0).system;
    assert!(system.starts_with("You are helpful."));
    assert!(system.contains("git"));
    assert!(system.contains("Git workflow"));
}

#[test]
fn invalid_config_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = looper_config::AppConfig {
        workspace: dir.path().to_path_buf(),
        temperature: 5.0,
        ..Default::default()
    };

    let err = Agent::from_config(&config).err().unwrap();
    assert!(matches!(err, Error::Config { ref message } if message.contains("temperature")));
}
