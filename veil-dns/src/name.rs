//! Dotted names as label sequences, with deny-list glob matching
//!
//! A [`Labels`] value is an ordered list of DNS labels. Deny-list patterns
//! use the same shape with two wildcard tokens: `*` matches one or more
//! labels, `**` matches zero or more. Matching is anchored at both ends and
//! compares labels byte-for-byte without case folding.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// An ordered sequence of DNS labels
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Labels(Vec<String>);

impl Labels {
    /// The empty (root) name
    pub fn root() -> Self {
        Labels(Vec::new())
    }

    /// Build a name from a dotted string. A single trailing dot is
    /// accepted; empty components are skipped.
    pub fn from_name(name: &str) -> Self {
        Labels(
            name.split('.')
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn from_vec(labels: Vec<String>) -> Self {
        Labels(labels)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub(crate) fn push(&mut self, label: String) {
        self.0.push(label);
    }

    /// Serialized length in octets: one length octet per label plus the
    /// label bytes, plus the terminating zero label.
    pub fn serialized_len(&self) -> usize {
        self.0.iter().map(|l| 1 + l.len()).sum::<usize>() + 1
    }

    /// Test this name against a deny-list pattern.
    pub fn matches(&self, pattern: &Labels) -> bool {
        glob(&self.0, &pattern.0)
    }
}

/// Recursive glob over label sequences. At most one wildcard token is under
/// consideration at a time; backtracking tries every split point.
fn glob(mut value: &[String], mut pattern: &[String]) -> bool {
    loop {
        let Some(tok) = pattern.first() else {
            return value.is_empty();
        };
        if value.is_empty() {
            return false;
        }
        match tok.as_str() {
            "*" => {
                for i in 1..=value.len() {
                    if glob(&value[i..], &pattern[1..]) {
                        return true;
                    }
                }
                return false;
            }
            "**" => {
                for i in 0..=value.len() {
                    if glob(&value[i..], &pattern[1..]) {
                        return true;
                    }
                }
                return false;
            }
            _ => {
                if tok != &value[0] {
                    return false;
                }
            }
        }
        pattern = &pattern[1..];
        value = &value[1..];
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl FromStr for Labels {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Labels::from_name(s))
    }
}

impl From<&[&str]> for Labels {
    fn from(labels: &[&str]) -> Self {
        Labels(labels.iter().map(|l| l.to_string()).collect())
    }
}
