//! Core data models for content records and their external sources.
//!
//! Two identifier types are kept apart at the type level: [`InternalId`] is
//! the database-local key and never leaves the crate boundary in serialized
//! form, while [`PublicId`] is the immutable identifier handed to clients.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ContentError, ContentResult};

/// The `type` stored for text content.
pub const CONTENT_TYPE_TEXT: &str = "TEXT";

/// Database-local row identifier. Not serializable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternalId(i64);

impl InternalId {
    pub(crate) fn from_row(id: i64) -> Self {
        InternalId(id)
    }

    pub(crate) fn get(self) -> i64 {
        self.0
    }
}

/// Externally visible identifier, assigned once and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicId(Uuid);

impl PublicId {
    pub(crate) fn generate() -> Self {
        PublicId(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> ContentResult<Self> {
        Uuid::parse_str(s)
            .map(PublicId)
            .map_err(|_| ContentError::validation(format!("'{}' is not a valid public id", s)))
    }
}

impl fmt::Display for PublicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PublicId {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PublicId::parse(s)
    }
}

/// Shared identity record underlying every content-bearing row.
#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) internal_id: InternalId,
    pub public_id: PublicId,
    /// Revision counter, bumped on every mutation of a dependent row.
    pub last_updated: i64,
}

/// Where a text record's body comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceType {
    /// Author-supplied text.
    #[default]
    None,
    /// Plain HTTP(S) URL, possibly relative to the configured base.
    Url,
    /// File inside a GitLab-hosted repository.
    Gitlab,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::None => "NONE",
            SourceType::Url => "URL",
            SourceType::Gitlab => "GITLAB",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(SourceType::None),
            "URL" => Ok(SourceType::Url),
            "GITLAB" => Ok(SourceType::Gitlab),
            other => Err(ContentError::UnsupportedSource(other.to_string())),
        }
    }
}

/// A person credited on a content record, as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contributor {
    pub person: PublicId,
    pub display_name: String,
    pub role: String,
    pub credit_order: i64,
}

/// A contributor entry as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewContributor {
    pub person: PublicId,
    pub role: String,
    pub credit_order: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Person {
    pub public_id: PublicId,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentSummary {
    #[serde(skip)]
    pub(crate) id: InternalId,
    pub public_id: PublicId,
    pub last_updated: i64,
    pub title: String,
    pub summary: Option<String>,
    pub namespace: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub content_type: String,
    /// Fingerprint of the last synchronized external state; empty if never synced.
    pub version_cookie: String,
    pub extern_path: Option<String>,
    /// Unix seconds, stamped by the store clock.
    pub last_sync: Option<i64>,
    /// Ordered by credit order, then insertion order.
    pub contributors: Vec<Contributor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentTypeText {
    #[serde(flatten)]
    pub summary: ContentSummary,
    pub format: String,
    pub text: String,
    pub source_type: SourceType,
}

impl ContentTypeText {
    pub fn public_id(&self) -> PublicId {
        self.summary.public_id
    }

    pub(crate) fn internal_id(&self) -> InternalId {
        self.summary.id
    }

    /// True when the body is owned by an external source rather than the author.
    pub fn is_externally_managed(&self) -> bool {
        is_externally_managed(self.summary.extern_path.as_deref(), self.source_type)
    }
}

pub(crate) fn is_externally_managed(extern_path: Option<&str>, source_type: SourceType) -> bool {
    source_type != SourceType::None && extern_path.is_some_and(|p| !p.is_empty())
}

/// Input for creating a text record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextDraft {
    pub namespace: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub extern_path: Option<String>,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub contributors: Vec<NewContributor>,
}

fn default_format() -> String {
    "text".to_string()
}

/// Partial update of a text record's fields. `None` leaves a field untouched.
///
/// `content_type` is only accepted when it equals the stored type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextPatch {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub extern_path: Option<String>,
    pub namespace: Option<String>,
    pub slug: Option<String>,
    pub format: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
}

/// External source descriptor. Many records in one namespace map to it.
#[derive(Debug, Clone, Serialize)]
pub struct ContentSource {
    pub name: String,
    pub source_type: SourceType,
    pub api_host: String,
    #[serde(skip)]
    pub api_token: String,
    pub project_id: String,
    /// Only repository paths starting with this prefix are considered.
    pub content_path_prefix: Option<String>,
    pub namespace: String,
    /// Branch, tag or commit the source tracks.
    pub git_ref: String,
}

impl ContentSource {
    pub fn matches_path(&self, path: &str) -> bool {
        match &self.content_path_prefix {
            Some(prefix) => path.starts_with(prefix.as_str()),
            None => true,
        }
    }
}
