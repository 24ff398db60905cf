//! Workspace path resolution for the file tools.
//!
//! Every path a tool receives is interpreted relative to the workspace root
//! and must stay inside it, both lexically and after resolving symlinks.

use std::path::{Component, Path, PathBuf};

use looper_core::ToolError;

/// The root directory file tools are confined to.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Anchor at `root`, made absolute against the current directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        Self {
            root: normalize(&root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` against the root.
    ///
    /// Relative paths are joined to the root; absolute paths are accepted only
    /// when they already lie inside it. `..` components are folded lexically,
    /// then the deepest existing ancestor of the target is canonicalized and
    /// must still lie under the canonical root. A dangling symlink on the way
    /// is refused, since writing through it would land wherever it points.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let outside = || ToolError::OutsideWorkspace(path.to_string());
        let joined = self.root.join(path);
        let normalized = normalize(&joined);
        if !normalized.starts_with(&self.root) {
            return Err(outside());
        }

        let real_root = self
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone());
        let mut existing = normalized.as_path();
        while existing.starts_with(&self.root) {
            match existing.canonicalize() {
                Ok(real) if real.starts_with(&real_root) => break,
                Ok(_) => return Err(outside()),
                Err(_) if existing.symlink_metadata().is_ok() => return Err(outside()),
                Err(_) => match existing.parent() {
                    Some(parent) => existing = parent,
                    None => break,
                },
            }
        }

        Ok(normalized)
    }

    /// `path` relative to the root with `/` separators, for display.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        display_path(rel)
    }
}

/// Join components with `/` regardless of platform.
pub(crate) fn display_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Fold `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let resolved = ws.resolve("src/main.rs").unwrap();
        assert!(resolved.starts_with(ws.root()));
        assert!(resolved.ends_with("src/main.rs"));
        assert_eq!(ws.relative(&resolved), "src/main.rs");
    }

    #[test]
    fn empty_and_dot_are_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        assert_eq!(ws.resolve("").unwrap(), ws.root());
        assert_eq!(ws.resolve(".").unwrap(), ws.root());
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let err = ws.resolve("../../../etc/passwd").unwrap_err();
        assert!(matches!(err, ToolError::OutsideWorkspace(_)));
        assert!(ws.resolve("a/../../b").is_err());
        assert!(ws.resolve("a/../b").is_ok());
    }

    #[test]
    fn sibling_with_shared_prefix_is_rejected() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("work");
        std::fs::create_dir(&root).unwrap();
        let ws = Workspace::new(&root);
        assert!(ws.resolve("../work-other/file").is_err());
    }

    #[test]
    fn absolute_paths_must_be_inside() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let inside = ws.root().join("x.txt");
        assert!(ws.resolve(inside.to_str().unwrap()).is_ok());
        assert!(ws.resolve("/etc/passwd").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), "s").unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let ws = Workspace::new(dir.path());
        assert!(ws.resolve("link/secret").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn missing_target_under_symlinked_dir_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let ws = Workspace::new(dir.path());
        assert!(ws.resolve("link/new.txt").is_err());
        assert!(ws.resolve("link/deeper/new.txt").is_err());
        assert!(ws.resolve("real/new.txt").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path().join("gone"), dir.path().join("dangling"))
            .unwrap();

        let ws = Workspace::new(dir.path());
        assert!(ws.resolve("dangling").is_err());
    }

    #[test]
    fn missing_root_still_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path().join("not-yet"));
        assert!(ws.resolve("a.txt").is_ok());
    }
}
