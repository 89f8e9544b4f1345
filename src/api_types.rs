//! Wire types for the external APIs the pipeline talks to: CrossRef for
//! abstract backfill and the Gemini generateContent endpoint for enrichment.

use serde::{Deserialize, Serialize};

/* CrossRef */

#[derive(Debug, Deserialize)]
pub struct CrossrefWork {
    pub message: CrossrefMessage,
}

#[derive(Debug, Default, Deserialize)]
pub struct CrossrefMessage {
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,
}

/* Gemini */

#[derive(Debug, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    pub response_mime_type: String,
    pub temperature: f64,
}

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    /// First text part of the first candidate, the only shape we ever use.
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .map(|p| p.text.as_str())
    }
}

/// Error envelope Gemini returns on non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiError,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    /// e.g. "RESOURCE_EXHAUSTED" on quota exhaustion.
    #[serde(default)]
    pub status: String,
}
