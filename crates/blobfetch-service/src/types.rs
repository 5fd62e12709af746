//! Common types shared by the blob and definition fetchers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A zero-based position inside a file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A range between two [`Position`]s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// Identifies a single file at a specific revision of a repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RepoFile {
    pub repo_name: String,
    pub revision: String,
    pub file_path: String,
}

impl RepoFile {
    pub fn new(
        repo_name: impl Into<String>,
        revision: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            repo_name: repo_name.into(),
            revision: revision.into(),
            file_path: file_path.into(),
        }
    }
}

/// Formats the file as a `git://` URI, used for log output.
impl fmt::Display for RepoFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "git://{}?{}#{}",
            self.repo_name, self.revision, self.file_path
        )
    }
}

/// The format in which highlighted file contents are requested.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HighlightFormat {
    /// HTML without syntax highlighting.
    #[serde(rename = "HTML_PLAINTEXT")]
    Plain,
    /// Syntax highlighted HTML.
    #[default]
    #[serde(rename = "HTML_HIGHLIGHT")]
    Highlight,
    /// Structured highlighting data for rich viewers, without any HTML.
    #[serde(rename = "JSON_SCIP")]
    Structured,
}

impl HighlightFormat {
    /// The name of this format in upstream queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "HTML_PLAINTEXT",
            Self::Highlight => "HTML_HIGHLIGHT",
            Self::Structured => "JSON_SCIP",
        }
    }

    /// Whether responses in this format carry an HTML payload.
    pub fn is_html(&self) -> bool {
        matches!(self, Self::Plain | Self::Highlight)
    }
}

impl fmt::Display for HighlightFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub oid: String,
}

/// The file a [`Location`] points into.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub path: String,
    pub repository: RepositoryRef,
    pub commit: CommitRef,
}

/// A resolved code location, as returned by definition lookups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub resource: Resource,
    pub range: Range,
}
