use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

use crate::models::Paper;

/// Vocabulary cap; an engineering bound on vector width, not a semantic limit.
const MAX_FEATURES: usize = 5000;

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "cannot", "could", "did", "do", "does", "doing", "down", "during", "each",
    "few", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "him", "his", "how", "however", "if", "in", "into", "is", "it", "its", "itself", "just",
    "more", "most", "my", "no", "nor", "not", "of", "off", "on", "once", "only", "or", "other",
    "our", "ours", "out", "over", "own", "same", "she", "should", "so", "some", "such", "than",
    "that", "the", "their", "theirs", "them", "then", "there", "these", "they", "this", "those",
    "through", "to", "too", "under", "until", "up", "upon", "us", "very", "was", "we", "were",
    "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would",
    "you", "your", "yours",
];

fn is_stopword(t: &str) -> bool {
    STOPWORDS.contains(&t)
}

/// Lowercased, NFC-normalized word tokens of length >= 2, stopwords removed.
fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text.nfc().collect::<String>().to_lowercase();
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .filter(|t| !is_stopword(t))
        .map(|t| t.to_string())
        .collect()
}

/// Unigrams plus adjacent bigrams ("glucose sensor"-style phrases matter more
/// than either word alone in this corpus).
fn terms(text: &str) -> Vec<String> {
    let tokens = tokenize(text);
    let bigrams: Vec<String> = tokens
        .iter()
        .tuple_windows()
        .map(|(a, b)| format!("{} {}", a, b))
        .collect();
    let mut out = tokens;
    out.extend(bigrams);
    out
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Assign each paper a 0-10 relevance score against the configured keyword
/// set: TF-IDF vectors over [keyword doc] + [title+abstract per paper],
/// cosine similarity, then scaled so the batch maximum is exactly 10.
///
/// The scale is batch-relative; scores from separate calls are not comparable.
pub fn score_papers(papers: &mut [Paper], keywords: &[String]) {
    if papers.is_empty() || keywords.is_empty() {
        return;
    }

    let keyword_doc = keywords.join(" ");
    let mut docs: Vec<Vec<String>> = Vec::with_capacity(papers.len() + 1);
    docs.push(terms(&keyword_doc));
    for p in papers.iter() {
        let text = p.full_text();
        let text = if text.is_empty() { p.title.clone() } else { text };
        docs.push(terms(&text));
    }

    // Vocabulary: top MAX_FEATURES terms by corpus frequency.
    let mut corpus_freq: HashMap<&str, usize> = HashMap::new();
    for doc in &docs {
        for t in doc {
            *corpus_freq.entry(t.as_str()).or_insert(0) += 1;
        }
    }
    if corpus_freq.is_empty() {
        warn!("Vectorization skipped - no usable vocabulary in batch");
        return;
    }
    let mut ranked: Vec<(&str, usize)> = corpus_freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(MAX_FEATURES);
    let vocab: HashMap<&str, usize> = ranked
        .iter()
        .enumerate()
        .map(|(i, (t, _))| (*t, i))
        .collect();

    // Smoothed IDF over all documents, keyword doc included.
    let n_docs = docs.len();
    let mut df: Vec<usize> = vec![0; vocab.len()];
    for doc in &docs {
        let unique: HashSet<&str> = doc.iter().map(|t| t.as_str()).collect();
        for t in unique {
            if let Some(&idx) = vocab.get(t) {
                df[idx] += 1;
            }
        }
    }
    let idf: Vec<f64> = df
        .iter()
        .map(|&d| ((1 + n_docs) as f64 / (1 + d) as f64).ln() + 1.0)
        .collect();

    let vectorize = |doc: &[String]| -> Vec<f64> {
        let mut v = vec![0.0; vocab.len()];
        for t in doc {
            if let Some(&idx) = vocab.get(t.as_str()) {
                v[idx] += idf[idx];
            }
        }
        v
    };

    let keyword_vec = vectorize(&docs[0]);
    let keyword_norm = norm(&keyword_vec);
    if keyword_norm == 0.0 {
        warn!("Vectorization skipped - keyword set has no usable terms");
        return;
    }

    let sims: Vec<f64> = docs[1..]
        .iter()
        .map(|doc| {
            let v = vectorize(doc);
            let n = norm(&v);
            if n == 0.0 {
                0.0
            } else {
                dot(&keyword_vec, &v) / (keyword_norm * n)
            }
        })
        .collect();

    let max_sim = sims.iter().cloned().fold(0.0f64, f64::max);
    if max_sim <= 0.0 {
        debug!("All similarities zero - scores left at default");
        return;
    }

    for (paper, sim) in papers.iter_mut().zip(sims.iter()) {
        paper.relevance_score = ((sim / max_sim) * 10.0 * 100.0).round() / 100.0;
    }
    debug!(
        "Relevance scoring completed - papers={}, max_similarity={:.4}",
        papers.len(),
        max_sim
    );
}
