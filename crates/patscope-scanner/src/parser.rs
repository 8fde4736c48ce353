//! Structured extraction of records from validated result pages.

use crate::strategy::{FieldLocator, FieldRule, RecordField, SelectorStrategy, StrategySet};
use patscope_core::{ExtractedRecord, ExtractionSource};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Records produced by the first strategy that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredMatch {
    /// Name of the strategy used
    pub strategy: String,
    /// Tier the strategy belongs to
    pub source: ExtractionSource,
    /// Records in document order, every one with a non-empty title
    pub records: Vec<ExtractedRecord>,
}

/// Applies a [`StrategySet`] to page content.
#[derive(Debug, Clone)]
pub struct StructuredExtractor {
    strategies: StrategySet,
    base_url: Url,
}

/// A [`FieldLocator`] with its selectors parsed.
enum CompiledLocator {
    Text(Selector),
    Attr {
        selector: Selector,
        attribute: String,
        all: bool,
    },
    Cell(usize),
}

struct CompiledRule<'a> {
    rule: &'a FieldRule,
    locator: CompiledLocator,
}

impl StructuredExtractor {
    pub fn new(strategies: StrategySet, base_url: Url) -> Self {
        Self {
            strategies,
            base_url,
        }
    }

    /// The strategies in use.
    pub fn strategies(&self) -> &StrategySet {
        &self.strategies
    }

    /// Run the strategies in priority order and return the first non-empty match.
    ///
    /// Strategies are never mixed: once one yields a titled row, the rest of
    /// the document is read with that strategy alone.
    pub fn extract(&self, content: &str) -> Option<StructuredMatch> {
        let document = Html::parse_document(content);

        self.strategies.iter().find_map(|strategy| {
            let records = self.apply(&document, strategy);
            if records.is_empty() {
                tracing::debug!(strategy = %strategy.name, "Strategy matched no rows");
                return None;
            }

            tracing::debug!(
                strategy = %strategy.name,
                records = records.len(),
                "Strategy matched"
            );
            Some(StructuredMatch {
                strategy: strategy.name.clone(),
                source: strategy.tier.source(),
                records,
            })
        })
    }

    fn apply(&self, document: &Html, strategy: &SelectorStrategy) -> Vec<ExtractedRecord> {
        let Some(rows) = parse_selector(&strategy.name, &strategy.rows) else {
            return Vec::new();
        };

        if let Some(required) = &strategy.requires {
            let Some(required) = parse_selector(&strategy.name, required) else {
                return Vec::new();
            };
            if document.select(&required).next().is_none() {
                return Vec::new();
            }
        }

        let skip = match &strategy.skip_rows_with {
            Some(sel) => match parse_selector(&strategy.name, sel) {
                Some(selector) => Some(selector),
                None => return Vec::new(),
            },
            None => None,
        };

        let mut rules = Vec::with_capacity(strategy.fields.len());
        for rule in &strategy.fields {
            let locator = match &rule.locator {
                FieldLocator::Text { selector } => {
                    match parse_selector(&strategy.name, selector) {
                        Some(s) => CompiledLocator::Text(s),
                        None => return Vec::new(),
                    }
                }
                FieldLocator::Attr {
                    selector,
                    attribute,
                    all,
                } => match parse_selector(&strategy.name, selector) {
                    Some(s) => CompiledLocator::Attr {
                        selector: s,
                        attribute: attribute.clone(),
                        all: *all,
                    },
                    None => return Vec::new(),
                },
                FieldLocator::Cell { index } => CompiledLocator::Cell(*index),
            };
            rules.push(CompiledRule { rule, locator });
        }

        let Some(cells) = parse_selector(&strategy.name, "td") else {
            return Vec::new();
        };

        document
            .select(&rows)
            .filter(|row| skip.as_ref().map_or(true, |s| row.select(s).next().is_none()))
            .filter_map(|row| self.record_from_row(row, &rules, &cells))
            .collect()
    }

    fn record_from_row(
        &self,
        row: ElementRef<'_>,
        rules: &[CompiledRule<'_>],
        cells: &Selector,
    ) -> Option<ExtractedRecord> {
        let title = rules
            .iter()
            .find(|r| r.rule.field == RecordField::Title)
            .and_then(|r| read_field(row, r, cells))?;
        let mut record = ExtractedRecord::new(title)?;

        for compiled in rules.iter().filter(|r| r.rule.field != RecordField::Title) {
            let value = read_field(row, compiled, cells);
            match compiled.rule.field {
                RecordField::Title => {}
                RecordField::PublicationNumber => record.identifier = value,
                RecordField::Applicants => record.applicants = value,
                RecordField::Inventors => record.inventors = value,
                RecordField::PublicationDate => record.publication_date = value,
                RecordField::Abstract => record.abstract_text = value,
                RecordField::LegalStatus => record.legal_status = value,
                RecordField::Family => record.family_id = value,
                RecordField::Link => {
                    record.link = value.map(|href| resolve_link(&self.base_url, &href));
                }
            }
        }

        Some(record)
    }
}

fn parse_selector(strategy: &str, selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(strategy, selector, error = %e, "Invalid selector, skipping strategy");
            None
        }
    }
}

fn read_field(row: ElementRef<'_>, compiled: &CompiledRule<'_>, cells: &Selector) -> Option<String> {
    let value = match &compiled.locator {
        CompiledLocator::Text(selector) => row.select(selector).next().map(element_text),
        CompiledLocator::Attr {
            selector,
            attribute,
            all: false,
        } => row
            .select(selector)
            .find_map(|el| el.value().attr(attribute))
            .map(collapse_whitespace),
        CompiledLocator::Attr {
            selector,
            attribute,
            all: true,
        } => {
            let values: Vec<String> = row
                .select(selector)
                .filter_map(|el| el.value().attr(attribute))
                .map(collapse_whitespace)
                .filter(|v| !v.is_empty())
                .collect();
            Some(values.join("; "))
        }
        CompiledLocator::Cell(index) => row.select(cells).nth(*index).map(element_text),
    }?;

    let value = match compiled.rule.max_chars {
        Some(max) => truncate_chars(&value, max).to_string(),
        None => value,
    };
    (!value.is_empty()).then_some(value)
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Collapse runs of whitespace to single spaces and trim.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Longest prefix of `text` with at most `max_chars` characters.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Resolve `href` against the site origin; unparseable links are kept as-is.
pub(crate) fn resolve_link(base_url: &Url, href: &str) -> String {
    base_url
        .join(href.trim())
        .map_or_else(|_| href.trim().to_string(), |url| url.to_string())
}
