//! Skills: markdown instruction files the agent can be pointed at.
//!
//! A skill file starts with a `---` frontmatter block carrying `name` and
//! `description`, followed by a markdown body:
//!
//! ```text
//! ---
//! name: git-workflow
//! description: How this repo does branches and commits
//! ---
//! # Git workflow
//! ...
//! ```
//!
//! [`SkillDiscovery`] indexes the files under a skills directory by name and
//! loads them on demand through [`SkillLoader`].

pub mod discovery;
pub mod loader;

pub use discovery::{SkillDiscovery, SkillInfo};
pub use loader::{SkillError, SkillLoader};
pub use looper_core::Skill;
