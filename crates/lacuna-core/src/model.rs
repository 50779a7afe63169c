//! Data model shared across the pipeline stages
//!
//! Queue entries instruct the worker which sources to try for a reference;
//! requests are the durable record of one provider response; API keys carry
//! the credential-pool state.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::ids::Reference;

/// The closed set of external bibliographic sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTag {
    #[serde(rename = "DIMENSIONS")]
    Dimensions,
    #[serde(rename = "SCOPUS")]
    Scopus,
    #[serde(rename = "WOS")]
    Wos,
    #[serde(rename = "PUBMED")]
    Pubmed,
    #[serde(rename = "S2")]
    S2,
}

impl SourceTag {
    /// Parse a CLI/config/database string into the tag (case-insensitive).
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DIMENSIONS" => Some(Self::Dimensions),
            "SCOPUS" => Some(Self::Scopus),
            "WOS" => Some(Self::Wos),
            "PUBMED" => Some(Self::Pubmed),
            "S2" => Some(Self::S2),
            _ => None,
        }
    }

    /// Canonical uppercase tag, as stored in `request.wrapper` and the
    /// queue's `sources` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dimensions => "DIMENSIONS",
            Self::Scopus => "SCOPUS",
            Self::Wos => "WOS",
            Self::Pubmed => "PUBMED",
            Self::S2 => "S2",
        }
    }

    /// The reference field this source's own identifier lives in.
    pub fn canonical_id_field(self) -> &'static str {
        match self {
            Self::Dimensions => "dimensions_id",
            Self::Scopus => "scopus_id",
            Self::Wos => "wos_id",
            Self::Pubmed => "pubmed_id",
            Self::S2 => "s2_id",
        }
    }

    /// All known tags.
    pub fn all() -> [SourceTag; 5] {
        [
            Self::Dimensions,
            Self::Scopus,
            Self::Wos,
            Self::Pubmed,
            Self::S2,
        ]
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How hard to try a source for a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePriority {
    /// Definitely request with this source
    Force,
    /// Try this source only while no previous source has found an abstract
    Try,
}

impl SourcePriority {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Force),
            2 => Some(Self::Try),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Force => 1,
            Self::Try => 2,
        }
    }
}

// Wire form is the bare integer: [["DIMENSIONS", 2], ...]
impl Serialize for SourcePriority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for SourcePriority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = u8::deserialize(deserializer)?;
        Self::from_u8(v).ok_or_else(|| D::Error::custom(format!("invalid source priority {v}")))
    }
}

/// Strategy when a queue entry's reference already has rows in the request
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnConflict {
    /// Don't check existing results, work the entry again and add another row
    Force,
    /// When any request for this reference exists with this source, skip
    #[default]
    DoNothing,
    /// When no request for this reference carries an abstract, retry
    RetryAbstract,
    /// When no request from this source carries a raw payload, retry
    RetryRaw,
}

impl OnConflict {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Force),
            2 => Some(Self::DoNothing),
            3 => Some(Self::RetryAbstract),
            4 => Some(Self::RetryRaw),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Force => 1,
            Self::DoNothing => 2,
            Self::RetryAbstract => 3,
            Self::RetryRaw => 4,
        }
    }
}

/// Ordered `(source, priority)` list; the head is the next source to try.
pub type SourceList = Vec<(SourceTag, SourcePriority)>;

/// The default source cascade assigned to entries queued without one.
pub fn default_sources() -> SourceList {
    vec![
        (SourceTag::Dimensions, SourcePriority::Try),
        (SourceTag::Scopus, SourcePriority::Try),
        (SourceTag::Wos, SourcePriority::Try),
        (SourceTag::Pubmed, SourcePriority::Try),
    ]
}

/// A pending instruction to try one or more sources for a reference.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub queue_id: i64,
    pub reference: Reference,
    /// `None` means "use the default source list"
    pub sources: Option<SourceList>,
    pub on_conflict: OnConflict,
    pub time_created: DateTime<Utc>,
}

impl QueueEntry {
    /// A fresh, unsaved entry with default conflict policy and no sources.
    pub fn new(reference: Reference) -> Self {
        Self {
            queue_id: 0,
            reference,
            sources: None,
            on_conflict: OnConflict::DoNothing,
            time_created: Utc::now(),
        }
    }

    /// The next source to attempt, if any.
    pub fn head_source(&self) -> Option<(SourceTag, SourcePriority)> {
        self.sources.as_ref().and_then(|s| s.first().copied())
    }
}

/// Durable record of one provider API response about a work.
#[derive(Debug, Clone)]
pub struct Request {
    pub record_id: String,
    pub wrapper: SourceTag,
    pub api_key_id: Option<String>,
    pub reference: Reference,
    pub queue_id: Option<i64>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    /// The provider's original payload, immutable once written
    pub raw: Option<Value>,
    pub solarized: bool,
    pub time_created: DateTime<Utc>,
}

impl Request {
    /// A fresh request row for one parsed provider record.
    pub fn new(wrapper: SourceTag, reference: Reference) -> Self {
        Self {
            record_id: uuid::Uuid::new_v4().to_string(),
            wrapper,
            api_key_id: None,
            reference,
            queue_id: None,
            title: None,
            abstract_text: None,
            raw: None,
            solarized: false,
            time_created: Utc::now(),
        }
    }

    /// A request with a non-null abstract is considered successful.
    pub fn has_abstract(&self) -> bool {
        self.abstract_text.is_some()
    }
}

/// One credential from the pool, with provider quota feedback.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub api_key_id: String,
    pub owner: Option<String>,
    pub wrapper: Option<SourceTag>,
    pub api_key: String,
    pub proxy: Option<String>,
    pub active: bool,
    pub last_used: Option<DateTime<Utc>>,
    /// Provider-specific quota counters (remaining/limit/reset, JWT, ...)
    pub api_feedback: Option<Value>,
}
