//! Locations inside the realtime database tree

use super::error::{BackendError, BackendResult};
use std::fmt;

/// Characters the hosted database refuses in a key
const FORBIDDEN_KEY_CHARS: [char; 5] = ['.', '#', '$', '[', ']'];

/// A slash-separated location in the database tree
///
/// The empty path is the root. Segments are not validated on construction;
/// backends call [`DbPath::validate`] before touching storage so that an
/// invalid key is reported as a `BackendError` instead of a panic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DbPath {
    segments: Vec<String>,
}

impl DbPath {
    /// The root of the tree
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path such as `messages/+1555/+1666`
    ///
    /// Leading, trailing and repeated slashes are ignored.
    pub fn parse(raw: &str) -> Self {
        Self {
            segments: raw
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Path of a direct child
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Parent path, `None` at the root
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self { segments })
    }

    /// Last segment, `None` at the root
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when `self` equals `other` or lies above it
    pub fn is_ancestor_of(&self, other: &DbPath) -> bool {
        self.segments.len() <= other.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }

    /// Whether a change at `other` can affect data observed at `self`
    pub fn overlaps(&self, other: &DbPath) -> bool {
        self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }

    /// Reject empty segments and characters the database does not allow in keys
    pub fn validate(&self) -> BackendResult<()> {
        for segment in &self.segments {
            if segment.trim().is_empty() {
                return Err(BackendError::InvalidPath(format!(
                    "{}: empty segment",
                    self
                )));
            }
            if let Some(c) = segment.chars().find(|c| FORBIDDEN_KEY_CHARS.contains(c)) {
                return Err(BackendError::InvalidPath(format!(
                    "{}: segment '{}' contains '{}'",
                    self, segment, c
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for DbPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

impl From<&str> for DbPath {
    fn from(raw: &str) -> Self {
        DbPath::parse(raw)
    }
}
