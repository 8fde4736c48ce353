//! Field-extraction strategies for the structured extractor.
//!
//! Result markup drifts between deployments, so records are located through
//! an ordered list of selector sets instead of one hard-coded layout. The
//! built-in list can be replaced from a TOML file:
//!
//! ```toml
//! [[strategies]]
//! name = "result-item"
//! tier = "primary"
//! rows = ".resultItem"
//!
//! [[strategies.fields]]
//! field = "title"
//! locator = { type = "text", selector = ".title" }
//! ```

use crate::error::{Result, ScanError};
use patscope_core::ExtractionSource;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which result tier a strategy reports when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTier {
    /// The current results layout
    Primary,
    /// Older layouts and detail pages
    Alternate,
}

impl StrategyTier {
    /// Extraction source reported for records found by this tier.
    #[must_use]
    pub fn source(self) -> ExtractionSource {
        match self {
            StrategyTier::Primary => ExtractionSource::StructuredPrimary,
            StrategyTier::Alternate => ExtractionSource::StructuredAlternate,
        }
    }
}

/// Record field a rule fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    /// Mandatory title
    Title,
    /// Publication number
    #[serde(alias = "identifier")]
    PublicationNumber,
    /// Applicants
    Applicants,
    /// Inventors
    Inventors,
    /// Publication date
    PublicationDate,
    /// Abstract text
    Abstract,
    /// Legal status
    LegalStatus,
    /// Patent family
    Family,
    /// Detail page link, resolved against the site origin
    Link,
}

/// Where a field's value is found relative to a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldLocator {
    /// Text of the first element matching `selector`
    Text {
        /// CSS selector
        selector: String,
    },
    /// Attribute of the first (or every) element matching `selector`
    Attr {
        /// CSS selector
        selector: String,
        /// Attribute name
        attribute: String,
        /// Join the attribute of all matches with `"; "`
        #[serde(default)]
        all: bool,
    },
    /// Text of the n-th `td` of a table row (0-based)
    Cell {
        /// Cell index
        index: usize,
    },
}

/// One field of a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Field to fill
    pub field: RecordField,
    /// How to find the value
    pub locator: FieldLocator,
    /// Truncate the value to this many characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chars: Option<usize>,
}

impl FieldRule {
    fn new(field: RecordField, locator: FieldLocator) -> Self {
        Self {
            field,
            locator,
            max_chars: None,
        }
    }

    fn text(field: RecordField, selector: &str) -> Self {
        Self::new(
            field,
            FieldLocator::Text {
                selector: selector.to_string(),
            },
        )
    }

    fn attr(field: RecordField, selector: &str, attribute: &str, all: bool) -> Self {
        Self::new(
            field,
            FieldLocator::Attr {
                selector: selector.to_string(),
                attribute: attribute.to_string(),
                all,
            },
        )
    }

    fn cell(field: RecordField, index: usize) -> Self {
        Self::new(field, FieldLocator::Cell { index })
    }

    fn truncated(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }
}

/// A named selector set producing one record per matched row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorStrategy {
    /// Name reported in logs
    pub name: String,
    /// Tier reported when this strategy matches
    pub tier: StrategyTier,
    /// Selector for record rows
    pub rows: String,
    /// Rows containing a match for this selector are skipped (e.g. header rows)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_rows_with: Option<String>,
    /// The strategy only applies to documents containing this selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<String>,
    /// Field rules
    pub fields: Vec<FieldRule>,
}

/// Ordered list of strategies; the first one yielding a titled row wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategySet {
    /// Strategies in priority order
    pub strategies: Vec<SelectorStrategy>,
}

impl Default for StrategySet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl StrategySet {
    /// The built-in strategies for the results page.
    #[must_use]
    pub fn builtin() -> Self {
        use RecordField as F;

        let result_item = SelectorStrategy {
            name: "result-item".to_string(),
            tier: StrategyTier::Primary,
            rows: ".resultItem".to_string(),
            skip_rows_with: None,
            requires: None,
            fields: vec![
                FieldRule::text(F::Title, ".title"),
                FieldRule::text(F::PublicationNumber, ".pubNumber"),
                FieldRule::text(F::Applicants, ".applicant"),
                FieldRule::text(F::Inventors, ".inventor"),
                FieldRule::text(F::PublicationDate, ".pubDate"),
                FieldRule::text(F::Abstract, ".abstract"),
                FieldRule::text(F::LegalStatus, ".legalStatus"),
                FieldRule::text(F::Family, ".family"),
                FieldRule::attr(F::Link, "a[href]", "href", false),
            ],
        };

        let result_table = SelectorStrategy {
            name: "result-table".to_string(),
            tier: StrategyTier::Alternate,
            rows: ".result-table tr, .results-table tr, .resultTable tr".to_string(),
            skip_rows_with: Some("th".to_string()),
            requires: None,
            fields: vec![
                FieldRule::cell(F::Title, 0),
                FieldRule::cell(F::PublicationNumber, 1),
                FieldRule::cell(F::PublicationDate, 2),
                FieldRule::cell(F::Applicants, 3),
                FieldRule::attr(F::Link, "a[href]", "href", false),
            ],
        };

        let document_meta = SelectorStrategy {
            name: "document-meta".to_string(),
            tier: StrategyTier::Alternate,
            rows: "html".to_string(),
            skip_rows_with: None,
            requires: Some(
                "meta[name='DC.identifier'], meta[name='DC.contributor']".to_string(),
            ),
            fields: vec![
                FieldRule::text(F::Title, "title"),
                FieldRule::attr(F::Inventors, "meta[name='DC.contributor']", "content", true),
                FieldRule::attr(F::PublicationDate, "meta[name='DC.date']", "content", false),
                FieldRule::attr(
                    F::PublicationNumber,
                    "meta[name='DC.identifier']",
                    "content",
                    false,
                ),
                FieldRule::text(F::Abstract, "abstract, p").truncated(500),
            ],
        };

        Self {
            strategies: vec![result_item, result_table, document_meta],
        }
    }

    /// Parse strategies from TOML.
    ///
    /// # Errors
    /// Returns [`ScanError::Strategy`] when the TOML is malformed, the list is
    /// empty, or a strategy has no title rule.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let set: Self = toml::from_str(source).map_err(|e| ScanError::Strategy(e.to_string()))?;
        set.validate()?;
        Ok(set)
    }

    /// Load strategies from a TOML file.
    ///
    /// # Errors
    /// Returns [`ScanError::Strategy`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Strategy(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<()> {
        if self.strategies.is_empty() {
            return Err(ScanError::Strategy("no strategies defined".to_string()));
        }
        for strategy in &self.strategies {
            if !strategy.fields.iter().any(|f| f.field == RecordField::Title) {
                return Err(ScanError::Strategy(format!(
                    "strategy {} has no title rule",
                    strategy.name
                )));
            }
        }
        Ok(())
    }

    /// Strategies in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &SelectorStrategy> {
        self.strategies.iter()
    }
}
