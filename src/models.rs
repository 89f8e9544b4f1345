use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One collected paper. The collector fills identity/content fields;
/// scoring, classification, and enrichment fill the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub title: String,
    pub abstract_text: String,
    pub doi: String, // may be empty; empty DOIs are never considered duplicates
    pub authors: Vec<String>,
    pub journal: String,
    pub published: DateTime<Utc>,
    pub link: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default)]
    pub field_label: String, // empty = unclassified
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub novelty: String,
    #[serde(default)]
    pub ai_score: i64,
}

impl Paper {
    /// Concatenated title + abstract, the text every analysis step works on.
    pub fn full_text(&self) -> String {
        format!("{} {}", self.title, self.abstract_text)
            .trim()
            .to_string()
    }

    pub fn is_classified(&self) -> bool {
        !self.field_label.is_empty()
    }
}

/// Per-field aggregates over the *entire* collected batch (pre-threshold),
/// answering "how much activity was there in this field today".
#[derive(Debug, Clone, Default, Serialize)]
pub struct FieldStats {
    pub count: usize,
    pub top_journals: Vec<(String, usize)>,
    pub top_phrases: Vec<(String, usize)>,
}

/// Output of the selection pass: one representative per field plus the rest.
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    /// field → best-scoring paper, in taxonomy declaration order.
    pub featured: Vec<(String, Paper)>,
    /// Every retained paper not chosen as a representative, classified or not.
    pub others: Vec<Paper>,
    pub field_stats: BTreeMap<String, FieldStats>,
}

impl Selection {
    pub fn retained(&self) -> usize {
        self.featured.len() + self.others.len()
    }

    /// Non-featured papers sharing a field label with a representative.
    pub fn others_in_field<'a>(&'a self, field: &str) -> Vec<&'a Paper> {
        self.others
            .iter()
            .filter(|p| p.field_label == field)
            .collect()
    }

    /// Retained papers that matched no taxonomy field.
    pub fn unclassified(&self) -> Vec<&Paper> {
        self.others.iter().filter(|p| !p.is_classified()).collect()
    }
}

/// Daily keyword counts over a trailing window; most recent day last.
#[derive(Debug, Clone, Serialize)]
pub struct TrendSeries {
    pub keyword: String,
    pub dates: Vec<NaiveDate>,
    pub counts: Vec<i64>,
    pub total: i64,
}
