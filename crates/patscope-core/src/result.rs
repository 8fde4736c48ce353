//! Records and results produced by the extraction pipeline.

use crate::types::{EngineFailureKind, EngineId, Query};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One patent-like row extracted from a results page.
///
/// `title` is mandatory; every other field is serialized even when absent
/// so callers always see the same shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// Title of the publication
    pub title: String,
    /// Publication number (e.g. `WO2021123456`)
    #[serde(rename = "publication_number")]
    pub identifier: Option<String>,
    /// Applicant names, joined with `"; "` when several
    pub applicants: Option<String>,
    /// Inventor names, joined with `"; "` when several
    pub inventors: Option<String>,
    /// Publication date as printed on the page
    pub publication_date: Option<String>,
    /// Abstract text
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    /// Legal status label
    pub legal_status: Option<String>,
    /// Patent family identifier
    #[serde(rename = "family")]
    pub family_id: Option<String>,
    /// Absolute link to the record's detail page
    pub link: Option<String>,
}

impl ExtractedRecord {
    /// Create a record with only a title.
    ///
    /// Returns `None` when the title is empty after trimming.
    #[must_use]
    pub fn new(title: impl AsRef<str>) -> Option<Self> {
        let title = title.as_ref().trim();
        if title.is_empty() {
            return None;
        }

        Some(Self {
            title: title.to_string(),
            identifier: None,
            applicants: None,
            inventors: None,
            publication_date: None,
            abstract_text: None,
            legal_status: None,
            family_id: None,
            link: None,
        })
    }
}

/// Which extraction tier produced the records of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    /// The highest-priority selector strategy matched
    StructuredPrimary,
    /// A lower-priority selector strategy matched
    StructuredAlternate,
    /// Approximate records produced by a generative model
    GenerativeFallback,
}

impl fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionSource::StructuredPrimary => "structured_primary",
            ExtractionSource::StructuredAlternate => "structured_alternate",
            ExtractionSource::GenerativeFallback => "generative_fallback",
        };
        f.write_str(name)
    }
}

/// How one engine invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Content was returned and passed validation
    Success {
        /// Size of the returned content in bytes
        bytes: usize,
    },
    /// Content was returned but failed validation (likely a block or redirect page)
    Rejected {
        /// Size of the returned content in bytes
        bytes: usize,
        /// Validation markers that were found
        matched_markers: Vec<String>,
    },
    /// The engine reported an error
    Failure {
        /// Failure category
        kind: EngineFailureKind,
        /// Human-readable reason
        reason: String,
    },
    /// The engine exceeded its overall time budget
    Timeout {
        /// Human-readable reason
        reason: String,
    },
}

impl AttemptOutcome {
    /// Whether this attempt produced validated content.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success { .. })
    }

    /// Short category name used in reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptOutcome::Success { .. } => "success",
            AttemptOutcome::Rejected { .. } => "validation_failure",
            AttemptOutcome::Failure { kind, .. } => kind.as_str(),
            AttemptOutcome::Timeout { .. } => "timeout",
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            AttemptOutcome::Success { bytes } => format!("validated {bytes} bytes"),
            AttemptOutcome::Rejected {
                bytes,
                matched_markers,
            } => format!(
                "{bytes} bytes failed validation (markers found: {})",
                if matched_markers.is_empty() {
                    "none".to_string()
                } else {
                    matched_markers.join(", ")
                }
            ),
            AttemptOutcome::Failure { reason, .. } | AttemptOutcome::Timeout { reason } => {
                reason.clone()
            }
        }
    }
}

/// Diagnostic record of a single engine invocation.
///
/// Kept only for the lifetime of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineAttempt {
    /// Engine that was invoked
    pub engine: EngineId,
    /// 1-based retry cycle
    pub cycle: u32,
    /// When the invocation started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the invocation
    pub elapsed_ms: u64,
    /// How the invocation ended
    pub outcome: AttemptOutcome,
}

/// Final output of one pipeline call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// The search term as accepted
    pub query: String,
    /// Number of records returned
    pub total_results: usize,
    /// Records in source document order
    #[serde(rename = "results")]
    pub records: Vec<ExtractedRecord>,
    /// Tier that produced the records
    pub source: ExtractionSource,
    /// Engine whose content the records came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineId>,
    /// Degradation notice (e.g. why the generative tier returned nothing)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// Engine attempts made for this request
    #[serde(skip)]
    pub attempts: Vec<EngineAttempt>,
}

impl ExtractionResult {
    /// Build a result; `total_results` always equals the record count.
    #[must_use]
    pub fn new(query: &Query, records: Vec<ExtractedRecord>, source: ExtractionSource) -> Self {
        Self {
            query: query.as_str().to_string(),
            total_results: records.len(),
            records,
            source,
            engine: None,
            diagnostic: None,
            attempts: Vec::new(),
        }
    }

    /// Attribute the result to the engine whose content was used.
    #[must_use]
    pub fn with_engine(mut self, engine: EngineId) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Attach a diagnostic message.
    #[must_use]
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    /// Attach the engine attempts made for this request.
    #[must_use]
    pub fn with_attempts(mut self, attempts: Vec<EngineAttempt>) -> Self {
        self.attempts = attempts;
        self
    }
}
