//! Skill discovery: index skill files by name, load lazily.
//!
//! Discovery walks the skills directory (default `<workspace>/skills`) for
//! `.md` files, skipping hidden directories, and records each file under the
//! `name` in its frontmatter. Files are only fully parsed when a skill is
//! requested, and parsed skills are cached until [`SkillDiscovery::refresh`].

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use looper_core::Skill;
use tracing::{debug, warn};

use crate::loader::{SkillError, SkillLoader};

/// Directory under the workspace searched when none is configured.
pub const DEFAULT_SKILLS_DIR: &str = "skills";

/// Display record for listing skills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillInfo {
    pub name: String,
    pub description: String,
    /// Path relative to the workspace root when possible.
    pub path: String,
}

pub struct SkillDiscovery {
    workspace_root: PathBuf,
    skills_dir: PathBuf,
    loader: SkillLoader,
    index: BTreeMap<String, PathBuf>,
    cache: HashMap<String, Skill>,
    discovered: bool,
}

impl SkillDiscovery {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        let skills_dir = workspace_root.join(DEFAULT_SKILLS_DIR);
        Self {
            workspace_root,
            skills_dir,
            loader: SkillLoader::new(),
            index: BTreeMap::new(),
            cache: HashMap::new(),
            discovered: false,
        }
    }

    /// Use a different skills directory. Clears anything discovered so far.
    pub fn with_skills_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.skills_dir = dir.into();
        self.clear();
        self
    }

    pub fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }

    fn clear(&mut self) {
        self.index.clear();
        self.cache.clear();
        self.discovered = false;
    }

    /// Scan the skills directory and index skill files by name.
    ///
    /// A missing directory yields no skills. Files without a readable name
    /// are ignored; when two files share a name the first in path order wins.
    pub fn discover(&mut self) {
        self.index.clear();
        self.discovered = true;

        if !self.skills_dir.is_dir() {
            debug!(dir = %self.skills_dir.display(), "No skills directory");
            return;
        }

        let mut files = Vec::new();
        collect_markdown(&self.skills_dir, true, &mut files);
        files.sort();

        for path in files {
            let name = match std::fs::read_to_string(&path) {
                Ok(content) => self.loader.read_name(&content),
                Err(source) => Err(SkillError::Io { path: path.clone(), source }),
            };
            let name = match name {
                Ok(name) => name,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping file without skill name");
                    continue;
                }
            };
            if let Some(existing) = self.index.get(&name) {
                warn!(
                    skill = %name,
                    kept = %existing.display(),
                    ignored = %path.display(),
                    "Duplicate skill name"
                );
                continue;
            }
            self.index.insert(name, path);
        }

        debug!(count = self.index.len(), dir = %self.skills_dir.display(), "Discovered skills");
    }

    fn ensure_discovered(&mut self) {
        if !self.discovered {
            self.discover();
        }
    }

    /// Names of all indexed skills, sorted.
    pub fn list(&mut self) -> Vec<String> {
        self.ensure_discovered();
        self.index.keys().cloned().collect()
    }

    /// Load a skill by name. `Ok(None)` if no file declares that name.
    pub fn get(&mut self, name: &str) -> Result<Option<Skill>, SkillError> {
        if let Some(skill) = self.cache.get(name) {
            return Ok(Some(skill.clone()));
        }
        self.ensure_discovered();

        let Some(path) = self.index.get(name) else {
            return Ok(None);
        };
        let skill = self.loader.load(path)?;
        self.cache.insert(name.to_string(), skill.clone());
        Ok(Some(skill))
    }

    /// Load every indexed skill, skipping those that fail to parse.
    pub fn get_all(&mut self) -> Vec<Skill> {
        let mut skills = Vec::new();
        for name in self.list() {
            match self.get(&name) {
                Ok(Some(skill)) => skills.push(skill),
                Ok(None) => {}
                Err(e) => warn!(skill = %name, error = %e, "Failed to load skill"),
            }
        }
        skills
    }

    /// Name, description and workspace-relative path of every skill.
    pub fn list_with_info(&mut self) -> Vec<SkillInfo> {
        let mut out = Vec::new();
        for name in self.list() {
            let path = self.index.get(&name).cloned().unwrap_or_default();
            let description = match self.get(&name) {
                Ok(Some(skill)) => skill.description,
                _ => "(error loading)".to_string(),
            };
            out.push(SkillInfo {
                name,
                description,
                path: self.relative_path(&path),
            });
        }
        out
    }

    fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.workspace_root)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    /// Drop the index and cache and scan again.
    pub fn refresh(&mut self) {
        self.clear();
        self.discover();
    }
}

/// Collect `.md` files under `dir`, skipping hidden subdirectories.
fn collect_markdown(dir: &Path, is_root: bool, out: &mut Vec<PathBuf>) {
    let hidden = dir
        .file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'));
    if hidden && !is_root {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(t) if t.is_dir() => collect_markdown(&path, false, out),
            Ok(_) if path.extension().is_some_and(|e| e == "md") => out.push(path),
            _ => {}
        }
    }
}
