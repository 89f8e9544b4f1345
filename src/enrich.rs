use reqwest::Client;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::api_types::{
    ApiErrorBody, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
};
use crate::config::GeminiConfig;
use crate::models::Selection;
use crate::out_models::Briefing;
use crate::prompts::briefing_prompt;

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const RETRY_BACKOFF_SECS: u64 = 30;

/// Enrichment failures, classified so the caller can branch on outcome
/// instead of matching substrings in error text. Quota exhaustion and a
/// missing key are never retried; everything else gets one more attempt.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("GEMINI_API_KEY is not set")]
    MissingKey,
    #[error("quota exhausted: {0}")]
    Quota(String),
    #[error("enrichment request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("enrichment returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed enrichment response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("empty response from model")]
    Empty,
}

impl EnrichError {
    pub fn is_retryable(&self) -> bool {
        match self {
            EnrichError::MissingKey | EnrichError::Quota(_) | EnrichError::Parse(_) => false,
            EnrichError::Http(_) | EnrichError::Status { .. } | EnrichError::Empty => true,
        }
    }
}

pub struct Enricher {
    client: Client,
    model: String,
    api_key: String,
}

impl Enricher {
    pub fn from_env(client: Client, cfg: &GeminiConfig) -> Result<Self, EnrichError> {
        let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            return Err(EnrichError::MissingKey);
        }
        Ok(Self {
            client,
            model: cfg.model.clone(),
            api_key,
        })
    }

    /// One batched call covering every featured paper; one retry after a
    /// fixed backoff when the failure class allows it.
    pub async fn analyze_featured(
        &self,
        selection: &Selection,
        keywords: &[String],
    ) -> Result<Briefing, EnrichError> {
        let prompt = briefing_prompt(&selection.featured, &selection.field_stats, keywords);
        debug!("Enrichment starting - prompt_length={} chars", prompt.len());

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            match self.call(&prompt).await {
                Ok(text) => {
                    let briefing: Briefing = serde_json::from_str(&text)?;
                    info!(
                        "Enrichment completed - attempt={}, papers_analyzed={}",
                        attempt,
                        briefing.papers.len()
                    );
                    return Ok(briefing);
                }
                Err(e) if attempt == 1 && e.is_retryable() => {
                    warn!(
                        "Enrichment attempt 1 failed ({}) - retrying in {}s",
                        e, RETRY_BACKOFF_SECS
                    );
                    sleep(Duration::from_secs(RETRY_BACKOFF_SECS)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call(&self, prompt: &str) -> Result<String, EnrichError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_BASE, self.model, self.api_key
        );
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: 0.2,
            },
        };

        let start = std::time::Instant::now();
        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let (api_status, api_message) = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| (b.error.status, b.error.message))
                .unwrap_or_default();
            if status.as_u16() == 429 || api_status == "RESOURCE_EXHAUSTED" {
                return Err(EnrichError::Quota(format!(
                    "HTTP {} {}",
                    status.as_u16(),
                    api_status
                )));
            }
            let message = if api_message.is_empty() {
                text.chars().take(200).collect()
            } else {
                api_message
            };
            return Err(EnrichError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = resp.json().await?;
        let answer = parsed.first_text().ok_or(EnrichError::Empty)?.to_string();
        info!(
            "Enrichment API call completed - duration={:.2}s, response_length={} chars",
            start.elapsed().as_secs_f32(),
            answer.len()
        );
        Ok(answer)
    }
}

fn relevance_label(score: f64) -> &'static str {
    if score >= 7.0 {
        "High"
    } else if score >= 4.0 {
        "Medium"
    } else {
        "Low"
    }
}

/// Deterministic non-AI briefing used whenever enrichment is absent or fails.
/// Built purely from keyword scores and batch field stats, so degraded runs
/// still ship a complete digest.
pub fn fallback_briefing(selection: &Selection, total_collected: usize) -> Briefing {
    let mut field_analysis: BTreeMap<String, String> = BTreeMap::new();
    for (field, stats) in &selection.field_stats {
        let journals: Vec<&str> = stats
            .top_journals
            .iter()
            .map(|(j, _)| j.as_str())
            .collect();
        field_analysis.insert(
            field.clone(),
            format!(
                "{} papers today, mainly in {}.",
                stats.count,
                if journals.is_empty() {
                    "various journals".to_string()
                } else {
                    journals.join(", ")
                }
            ),
        );
    }

    let action_items: Vec<String> = selection
        .featured
        .iter()
        .map(|(_, p)| {
            let title: String = p.title.chars().take(65).collect();
            format!(
                "[relevance {}] {}",
                relevance_label(p.relevance_score),
                title
            )
        })
        .collect();

    // most-hit taxonomy phrases stand in for model trend keywords
    let mut phrase_counts: Vec<(String, usize)> = Vec::new();
    for stats in selection.field_stats.values() {
        phrase_counts.extend(stats.top_phrases.iter().cloned());
    }
    phrase_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let trend_keywords: Vec<String> = phrase_counts.into_iter().take(3).map(|(p, _)| p).collect();

    Briefing {
        overview: format!(
            "{} of {} collected papers were selected today. AI analysis was \
             unavailable; relevance is keyword-match based.",
            selection.retained(),
            total_collected
        ),
        papers: Vec::new(),
        field_analysis,
        trend_keywords,
        action_items,
    }
}

/// Copy per-paper model output onto the featured papers (summary, novelty,
/// model score, keyword tags).
pub fn apply_briefing(selection: &mut Selection, briefing: &Briefing) {
    for (field, paper) in selection.featured.iter_mut() {
        if let Some(analysis) = briefing.analysis_for(field) {
            paper.summary = analysis.summary.join("\n");
            paper.novelty = analysis.novelty.clone();
            paper.ai_score = analysis.relevance;
            paper.keywords = analysis.tags.iter().take(3).cloned().collect();
        }
    }
}
