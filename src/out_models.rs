//! Strict-JSON shapes the enrichment model must return. Parsed for
//! validation; any deviation is treated as an enrichment failure, never a
//! pipeline failure.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Briefing {
    /// 2-3 sentence narrative over the whole batch.
    #[serde(default)]
    pub overview: String,
    /// One entry per featured paper, keyed by its field label.
    #[serde(default)]
    pub papers: Vec<PaperAnalysis>,
    /// Per-field commentary for the report sections.
    #[serde(default)]
    pub field_analysis: BTreeMap<String, String>,
    #[serde(default)]
    pub trend_keywords: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperAnalysis {
    pub field: String,
    #[serde(default)]
    pub summary: Vec<String>,
    #[serde(default)]
    pub novelty: String,
    /// Model-judged relevance on a 1-10 scale; overrides nothing, shown
    /// alongside the keyword score.
    #[serde(default)]
    pub relevance: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Briefing {
    pub fn analysis_for(&self, field: &str) -> Option<&PaperAnalysis> {
        self.papers.iter().find(|p| p.field == field)
    }
}
