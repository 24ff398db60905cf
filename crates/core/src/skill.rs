//! Skill records.
//!
//! A skill is a named instruction document on disk. The model only sees the
//! name, description and path; it reads the body on demand with `read_file`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Heading that introduces the activated skills in the system prompt.
pub const SKILLS_PROMPT_HEADER: &str = "\n\n## Available Skills\nUse `read_file` to view full skill instructions when needed:\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub description: String,
    /// Markdown body following the frontmatter.
    #[serde(default)]
    pub body: String,
    /// File the skill was loaded from.
    pub path: PathBuf,
}

impl Skill {
    /// One prompt line: ``- **name** (`path`): description``.
    pub fn to_prompt(&self) -> String {
        format!(
            "- **{}** (`{}`): {}",
            self.name,
            self.path.display(),
            self.description
        )
    }
}

/// Render the skills section appended to the system prompt.
///
/// Empty when no skills are given.
pub fn skills_prompt<'a>(skills: impl IntoIterator<Item = &'a Skill>) -> String {
    let lines: Vec<String> = skills.into_iter().map(Skill::to_prompt).collect();
    if lines.is_empty() {
        return String::new();
    }
    let mut out = String::from(SKILLS_PROMPT_HEADER);
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
    out
}
