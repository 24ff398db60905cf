//! Conversation state for one session.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use looper_core::message::{Message, Role, ToolCall};
use looper_core::provider::Usage;
use looper_core::skill::{Skill, skills_prompt};

/// History, activated skills, token counters and the iteration counter.
///
/// `reset` clears history and the iteration counter; the workspace,
/// activated skills and cumulative usage survive it.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    messages: Vec<Message>,
    skills: BTreeMap<String, Skill>,
    usage: Usage,
    iterations: u32,
    workspace: PathBuf,
}

impl ConversationContext {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            messages: Vec::new(),
            skills: BTreeMap::new(),
            usage: Usage::default(),
            iterations: 0,
            workspace: workspace.into(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.push(Message::user(content));
    }

    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.push(Message::assistant(content));
    }

    /// Assistant turn that requests tools, keeping any text streamed with it.
    pub fn add_tool_calls(&mut self, content: impl Into<String>, calls: Vec<ToolCall>) {
        let mut message = Message::assistant_tool_calls(calls);
        message.content = content.into();
        self.push(message);
    }

    pub fn add_tool_result(&mut self, call_id: impl Into<String>, content: impl Into<String>) {
        self.push(Message::tool_result(call_id, content));
    }

    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Activate a skill; a skill with the same name is replaced.
    pub fn activate_skill(&mut self, skill: Skill) {
        self.skills.insert(skill.name.clone(), skill);
    }

    pub fn skills(&self) -> impl Iterator<Item = &Skill> {
        self.skills.values()
    }

    pub fn has_skill(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    /// System prompt section listing activated skills by name, description
    /// and path. Empty when none are active.
    pub fn skill_prompt(&self) -> String {
        skills_prompt(self.skills.values())
    }

    pub fn record_usage(&mut self, usage: Usage) {
        self.usage += usage;
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub(crate) fn next_iteration(&mut self) {
        self.iterations += 1;
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Forget the conversation. Idempotent.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.iterations = 0;
    }
}
