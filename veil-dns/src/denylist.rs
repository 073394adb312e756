//! Deny-list file loading
//!
//! One dotted pattern per line; blank lines and lines whose first
//! non-space character is `#` are ignored. Tokens `*` and `**` carry the
//! wildcard semantics of [`Labels::matches`].

use std::path::Path;

use crate::error::Result;
use crate::name::Labels;

/// A list of name patterns for which queries are answered with NXDOMAIN
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    patterns: Vec<Labels>,
}

impl DenyList {
    /// An empty deny-list that matches nothing
    pub fn empty() -> Self {
        DenyList::default()
    }

    /// Load patterns from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Parse patterns from file content.
    pub fn parse(content: &str) -> Self {
        let patterns = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(Labels::from_name)
            .collect();
        DenyList { patterns }
    }

    /// First pattern matching `name`, if any.
    pub fn matched(&self, name: &Labels) -> Option<&Labels> {
        self.patterns.iter().find(|pattern| name.matches(pattern))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# tracker domains
*.ads.net
doubleclick.com

  # indented comment
**.telemetry.example
";

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let list = DenyList::parse(SAMPLE);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_first_match_wins() {
        let list = DenyList::parse("**.net\n*.ads.net\n");
        let name = Labels::from_name("tracker.ads.net");
        assert_eq!(list.matched(&name).unwrap().to_string(), "**.net");
    }

    #[test]
    fn test_matched() {
        let list = DenyList::parse(SAMPLE);
        assert!(list.matched(&Labels::from_name("tracker.ads.net")).is_some());
        assert!(list.matched(&Labels::from_name("doubleclick.com")).is_some());
        assert!(list
            .matched(&Labels::from_name("telemetry.example"))
            .is_some());
        assert!(list
            .matched(&Labels::from_name("deep.telemetry.example"))
            .is_some());
        assert!(list.matched(&Labels::from_name("example.com")).is_none());
    }

    #[test]
    fn test_empty_list() {
        let list = DenyList::empty();
        assert!(list.is_empty());
        assert!(list.matched(&Labels::from_name("example.com")).is_none());
    }
}
