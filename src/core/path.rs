//! Hierarchical path addressing.
//!
//! A [`TreePath`] identifies a node in the remote tree. Paths are immutable,
//! slash-delimited, and totally ordered by lexicographic comparison of their
//! segment sequences, so every subtree occupies a contiguous range in any
//! ordered map keyed by path. Two paths are equal iff their segment
//! sequences are equal.

use crate::core::error::{CacheError, CacheResult};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An immutable, slash-delimited hierarchical identifier.
///
/// The root path is `/` and has zero segments. Segments are non-empty and
/// may not contain `/` or NUL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreePath {
    segments: Vec<String>,
}

impl TreePath {
    /// The root path `/`.
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parse an absolute path string.
    ///
    /// The string must start with `/`; empty segments (`//`, trailing `/`)
    /// are rejected, except for the bare root `/`.
    pub fn parse(raw: &str) -> CacheResult<Self> {
        let rest = raw.strip_prefix('/').ok_or_else(|| CacheError::InvalidPath {
            message: format!("path must be absolute: {raw:?}"),
        })?;
        if rest.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for segment in rest.split('/') {
            segments.push(validate_segment(segment)?.to_string());
        }
        Ok(Self { segments })
    }

    /// Derive the path of a direct child.
    pub fn child(&self, name: &str) -> CacheResult<Self> {
        let name = validate_segment(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// The final segment, or `None` for the root.
    pub fn node_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The path's segments, root-first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether this path is the root.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment-wise prefix containment.
    ///
    /// Every path starts with the root and with itself.
    pub fn starts_with(&self, prefix: &TreePath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Whether `other` is a direct child of this path.
    pub fn is_parent_of(&self, other: &TreePath) -> bool {
        other.segments.len() == self.segments.len() + 1 && other.starts_with(self)
    }
}

fn validate_segment(segment: &str) -> CacheResult<&str> {
    if segment.is_empty() {
        return Err(CacheError::InvalidPath {
            message: "empty path segment".to_string(),
        });
    }
    if segment.contains(['/', '\0']) {
        return Err(CacheError::InvalidPath {
            message: format!("invalid character in segment {segment:?}"),
        });
    }
    Ok(segment)
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl Serialize for TreePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TreePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TreePath::parse(&raw).map_err(D::Error::custom)
    }
}
