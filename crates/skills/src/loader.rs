//! Skill file parsing.
//!
//! A skill is a markdown file opening with a YAML frontmatter block between
//! `---` fences. Only `name` and `description` are read; other keys are
//! allowed and ignored.

use std::path::{Path, PathBuf};

use looper_core::Skill;
use serde::Deserialize;

const FENCE: &str = "---";

#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("failed to read skill file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("empty skill file")]
    Empty,

    #[error("skill file must start with YAML frontmatter (---)")]
    MissingFrontmatter,

    #[error("unclosed frontmatter (missing closing ---)")]
    UnclosedFrontmatter,

    #[error("failed to parse frontmatter: {0}")]
    Frontmatter(#[from] serde_yaml::Error),

    #[error("skill frontmatter must have a '{0}' field")]
    MissingField(&'static str),
}

#[derive(Debug, Default, Deserialize)]
struct SkillFrontmatter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl SkillFrontmatter {
    fn require(value: Option<String>, field: &'static str) -> Result<String, SkillError> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(SkillError::MissingField(field))
    }
}

/// Parses skill files.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkillLoader;

impl SkillLoader {
    pub fn new() -> Self {
        Self
    }

    /// Read and parse the skill at `path`.
    pub fn load(&self, path: &Path) -> Result<Skill, SkillError> {
        let content = std::fs::read_to_string(path).map_err(|source| SkillError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse(&content, path)
    }

    /// Parse skill text; `path` is recorded as the skill's source.
    pub fn parse(&self, content: &str, path: &Path) -> Result<Skill, SkillError> {
        let (frontmatter, body) = split_frontmatter(content)?;
        let name = SkillFrontmatter::require(frontmatter.name, "name")?;
        let description = SkillFrontmatter::require(frontmatter.description, "description")?;

        Ok(Skill {
            name,
            description,
            body: body.trim_start_matches('\n').to_string(),
            path: path.to_path_buf(),
        })
    }

    /// The frontmatter `name` of skill text, for indexing. Unlike
    /// [`parse`](Self::parse) a missing description is not an error here.
    pub fn read_name(&self, content: &str) -> Result<String, SkillError> {
        let (frontmatter, _) = split_frontmatter(content)?;
        SkillFrontmatter::require(frontmatter.name, "name")
    }
}

/// Deserialize the frontmatter block and return it with the body after the
/// closing fence.
fn split_frontmatter(content: &str) -> Result<(SkillFrontmatter, String), SkillError> {
    let mut lines = content.lines();
    let first = lines.next().ok_or(SkillError::Empty)?;
    if first.trim() != FENCE {
        return Err(SkillError::MissingFrontmatter);
    }

    let mut block = Vec::new();
    let mut closed = false;
    for line in lines.by_ref() {
        if line.trim() == FENCE {
            closed = true;
            break;
        }
        block.push(line);
    }
    if !closed {
        return Err(SkillError::UnclosedFrontmatter);
    }

    let block = block.join("\n");
    let frontmatter = if block.trim().is_empty() {
        SkillFrontmatter::default()
    } else {
        serde_yaml::from_str(&block)?
    };
    let body = lines.collect::<Vec<_>>().join("\n");
    Ok((frontmatter, body))
}
