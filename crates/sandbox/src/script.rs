//! Script interpreters and Python expression wrapping.

use std::ffi::OsString;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// A supported script interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    Bash,
    Sh,
    Python,
    Node,
    Go,
}

impl Interpreter {
    /// Resolve an interpreter tag. `python`/`python3` and `node`/`nodejs`
    /// are aliases.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "bash" => Some(Self::Bash),
            "sh" => Some(Self::Sh),
            "python" | "python3" => Some(Self::Python),
            "node" | "nodejs" => Some(Self::Node),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    /// Executable that runs the script.
    pub fn program(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Sh => "sh",
            Self::Python => "python3",
            Self::Node => "node",
            Self::Go => "go",
        }
    }

    /// Suffix of the temp file the script is written to.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Bash | Self::Sh => ".sh",
            Self::Python => ".py",
            Self::Node => ".js",
            Self::Go => ".go",
        }
    }

    /// Arguments for running the script at `path`.
    pub fn args(self, path: &Path) -> Vec<OsString> {
        match self {
            Self::Go => vec!["run".into(), path.as_os_str().to_owned()],
            _ => vec![path.as_os_str().to_owned()],
        }
    }

    pub fn is_shell(self) -> bool {
        matches!(self, Self::Bash | Self::Sh)
    }

    /// Apply interpreter-specific source rewriting.
    pub fn prepare(self, script: &str) -> String {
        match self {
            Self::Python => wrap_python_script(script),
            _ => script.to_string(),
        }
    }
}

const STATEMENT_MARKERS: &[&str] = &[
    "print(", "print ", "import ", "def ", "class ", "if ", "for ", "while ", "with ", "try:",
];

/// Make a single bare Python expression print its value like the REPL does.
///
/// Multi-line scripts, scripts with `;` and anything containing a statement
/// keyword are returned unchanged.
pub fn wrap_python_script(script: &str) -> String {
    let trimmed = script.trim();
    let single_line = trimmed.lines().filter(|l| !l.trim().is_empty()).count() == 1;
    if !single_line
        || trimmed.contains(';')
        || STATEMENT_MARKERS.iter().any(|m| trimmed.contains(m))
    {
        return script.to_string();
    }

    let encoded = STANDARD.encode(script.as_bytes());
    format!(
        r#"import base64
_code = base64.b64decode("{encoded}").decode("utf-8")
try:
    _result = eval(compile(_code, '<input>', 'eval'))
    if _result is not None:
        print(repr(_result))
except SyntaxError:
    exec(compile(_code, '<input>', 'exec'))
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_and_aliases() {
        assert_eq!(Interpreter::from_tag("python"), Some(Interpreter::Python));
        assert_eq!(Interpreter::from_tag("python3"), Some(Interpreter::Python));
        assert_eq!(Interpreter::from_tag("nodejs"), Some(Interpreter::Node));
        assert_eq!(Interpreter::from_tag("ruby"), None);
        assert_eq!(Interpreter::Python.program(), "python3");
        assert_eq!(Interpreter::Node.extension(), ".js");
    }

    #[test]
    fn go_uses_run_subcommand() {
        let args = Interpreter::Go.args(Path::new("/tmp/x.go"));
        assert_eq!(args, vec![OsString::from("run"), OsString::from("/tmp/x.go")]);
    }

    #[test]
    fn bare_expression_is_wrapped() {
        let wrapped = wrap_python_script("1 + 2");
        assert!(wrapped.contains("base64.b64decode"));
        assert!(wrapped.contains(&STANDARD.encode("1 + 2")));
        assert!(!wrapped.contains("1 + 2"));
    }

    #[test]
    fn statements_pass_through() {
        for src in [
            "print('hi')",
            "import os",
            "x = 1; x",
            "a = 1\nb = 2",
            "for i in range(3): pass",
        ] {
            assert_eq!(wrap_python_script(src), src, "{src}");
        }
    }

    #[test]
    fn only_python_is_rewritten() {
        assert_eq!(Interpreter::Bash.prepare("1 + 2"), "1 + 2");
        assert_ne!(Interpreter::Python.prepare("1 + 2"), "1 + 2");
    }
}
