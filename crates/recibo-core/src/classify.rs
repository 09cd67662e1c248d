//! Keyword-based receipt classification.
//!
//! The classification table is built once from a CSV with `nome_pagamento`
//! (label) and `codigos` (keywords) columns and is immutable afterwards.
//! Matching is case-insensitive substring containment; the first rule in CSV
//! order with any keyword present wins.

use std::io::Read;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::ConfigError;

/// Label returned when no rule matches. Also used by the eligibility
/// predicate to keep already-labeled files out of the pipeline.
pub const UNIDENTIFIED: &str = "naoidentificado";

/// A single classification rule: a label and its lowercased keywords.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub label: String,
    pub keywords: Vec<String>,
}

/// Ordered, immutable set of classification rules.
#[derive(Debug, Clone)]
pub struct ClassificationTable {
    rules: Vec<ClassificationRule>,
}

impl ClassificationTable {
    /// Build the table from a CSV file on disk.
    pub fn from_csv_path(path: &Path) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path).map_err(|e| {
            ConfigError::Csv(format!("{}: {}", path.display(), e))
        })?;
        Self::from_reader(file)
    }

    /// Build the table from any CSV source.
    ///
    /// Required columns are matched case-insensitively and a UTF-8 BOM on the
    /// first header is tolerated. Blank rows are skipped with a warning; any
    /// structural problem aborts construction.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| ConfigError::Csv(e.to_string()))?
            .clone();

        let find_column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim().eq_ignore_ascii_case(name))
        };

        let label_idx = find_column("nome_pagamento")
            .ok_or_else(|| ConfigError::MissingColumn("nome_pagamento".to_string()))?;
        let keywords_idx = find_column("codigos")
            .ok_or_else(|| ConfigError::MissingColumn("codigos".to_string()))?;

        let mut rules: Vec<ClassificationRule> = Vec::new();

        for (line, record) in csv_reader.records().enumerate() {
            let record = record.map_err(|e| ConfigError::Csv(e.to_string()))?;

            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }

            let label = record
                .get(label_idx)
                .map(|s| s.trim().to_lowercase())
                .unwrap_or_default();
            if label.is_empty() {
                warn!(row = line + 2, "skipping row without label");
                continue;
            }

            // An unquoted JSON array splits its cell at every comma, leaving
            // the record with more fields than the header row. Rejoin exactly
            // the spilled fields; a well-formed record keeps its one cell so
            // later columns never leak into the keywords.
            let raw_keywords = if record.len() > headers.len() {
                record
                    .iter()
                    .skip(keywords_idx)
                    .take(record.len() - headers.len() + 1)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(",")
            } else {
                record.get(keywords_idx).unwrap_or("").trim().to_string()
            };

            if rules.iter().any(|r| r.label == label) {
                return Err(ConfigError::DuplicateLabel(label));
            }

            let keywords = parse_keywords(&label, &raw_keywords)?;
            if keywords.is_empty() {
                return Err(ConfigError::EmptyKeywords(label));
            }

            debug!(label = %label, keywords = ?keywords, "loaded classification rule");
            rules.push(ClassificationRule { label, keywords });
        }

        if rules.is_empty() {
            return Err(ConfigError::EmptyTable);
        }

        info!("classification table loaded with {} rules", rules.len());
        Ok(Self { rules })
    }

    /// Number of rules in the table.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in source CSV order.
    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Classify extracted text against the table.
    ///
    /// First rule with any keyword contained in the lowercased text wins;
    /// rule order is the CSV order. Falls back to [`UNIDENTIFIED`].
    pub fn classify(&self, text: &str) -> &str {
        let normalized = text.to_lowercase();

        for rule in &self.rules {
            if rule.keywords.iter().any(|k| normalized.contains(k.as_str())) {
                debug!(label = %rule.label, "receipt classified");
                return &rule.label;
            }
        }

        debug!("no keyword matched, receipt left unidentified");
        UNIDENTIFIED
    }
}

/// Keyword cell syntax: JSON array of strings first, comma list as fallback.
#[derive(Debug, PartialEq, Eq)]
enum KeywordSyntax {
    JsonArray,
    CommaList,
}

fn parse_keywords(label: &str, raw: &str) -> Result<Vec<String>, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::EmptyKeywords(label.to_string()));
    }

    let (syntax, elements) = match serde_json::from_str::<Vec<String>>(raw) {
        Ok(items) => (KeywordSyntax::JsonArray, items),
        Err(_) if raw.starts_with('[') => {
            // Looked like JSON but did not parse; refuse rather than guess.
            return Err(ConfigError::BadKeywords {
                label: label.to_string(),
                value: raw.to_string(),
            });
        }
        Err(_) => (
            KeywordSyntax::CommaList,
            raw.split(',').map(str::to_string).collect(),
        ),
    };

    debug!(label = %label, ?syntax, "parsed keyword cell");

    Ok(elements
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect())
}
