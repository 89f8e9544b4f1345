use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::classify::Taxonomy;
use crate::config::AnalysisConfig;
use crate::models::{FieldStats, Paper, Selection};

const TOP_JOURNALS: usize = 3;
const TOP_PHRASES: usize = 5;

fn by_score_desc(a: &Paper, b: &Paper) -> Ordering {
    b.relevance_score
        .partial_cmp(&a.relevance_score)
        .unwrap_or(Ordering::Equal)
}

/// Per-field activity over the whole collected batch, before any threshold is
/// applied. This answers "how much happened in field X today", which is a
/// different question from "what do we show".
fn batch_stats(papers: &[Paper], taxonomy: &Taxonomy) -> BTreeMap<String, FieldStats> {
    let labels: Vec<Option<&str>> = papers
        .iter()
        .map(|p| taxonomy.classify(&p.full_text()))
        .collect();

    let mut stats = BTreeMap::new();
    for field in taxonomy.fields() {
        let mut count = 0usize;
        let mut journals: HashMap<&str, usize> = HashMap::new();
        let mut phrases: HashMap<&str, usize> = HashMap::new();

        for (p, label) in papers.iter().zip(labels.iter()) {
            if *label != Some(field.name.as_str()) {
                continue;
            }
            count += 1;
            *journals.entry(p.journal.as_str()).or_insert(0) += 1;
            for (phrase, n) in field.phrase_hits(&p.full_text()) {
                *phrases.entry(phrase).or_insert(0) += n;
            }
        }
        if count == 0 {
            continue;
        }

        let mut top_journals: Vec<(String, usize)> = journals
            .into_iter()
            .map(|(j, n)| (j.to_string(), n))
            .collect();
        top_journals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_journals.truncate(TOP_JOURNALS);

        let mut top_phrases: Vec<(String, usize)> = phrases
            .into_iter()
            .map(|(p, n)| (p.to_string(), n))
            .collect();
        top_phrases.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_phrases.truncate(TOP_PHRASES);

        stats.insert(
            field.name.clone(),
            FieldStats {
                count,
                top_journals,
                top_phrases,
            },
        );
    }
    stats
}

/// Partition scored papers into one featured representative per field plus
/// the rest.
///
/// Papers at or above the relevance threshold are retained; if none clear it
/// the top `fallback_highlights` by score are kept instead, so the digest is
/// never empty when the input batch isn't. Within each field the best-scoring
/// retained paper becomes the representative; everything else, including
/// unclassified papers, lands in `others`.
pub fn select(papers: &[Paper], taxonomy: &Taxonomy, cfg: &AnalysisConfig) -> Selection {
    let field_stats = batch_stats(papers, taxonomy);

    let mut sorted: Vec<Paper> = papers.to_vec();
    sorted.sort_by(by_score_desc);

    let mut retained: Vec<Paper> = sorted
        .iter()
        .filter(|p| p.relevance_score >= cfg.relevance_threshold)
        .cloned()
        .collect();

    if retained.is_empty() && !sorted.is_empty() {
        retained = sorted
            .iter()
            .take(cfg.fallback_highlights)
            .cloned()
            .collect();
        info!(
            "No paper cleared threshold {} - falling back to top {} highlights",
            cfg.relevance_threshold,
            retained.len()
        );
    }

    for p in retained.iter_mut() {
        p.field_label = taxonomy
            .classify(&p.full_text())
            .unwrap_or_default()
            .to_string();
    }

    // retained is score-descending, so the first paper carrying a field label
    // is that field's best.
    let mut featured: Vec<(String, Paper)> = Vec::new();
    let mut used = vec![false; retained.len()];
    for field in taxonomy.field_names() {
        if let Some(i) = retained.iter().position(|p| p.field_label == field) {
            used[i] = true;
            featured.push((field.to_string(), retained[i].clone()));
        }
    }

    let others: Vec<Paper> = retained
        .into_iter()
        .zip(used)
        .filter(|(_, taken)| !taken)
        .map(|(p, _)| p)
        .collect();

    debug!(
        "Selection completed - featured={}, others={}, fields_active={}",
        featured.len(),
        others.len(),
        field_stats.len()
    );

    Selection {
        featured,
        others,
        field_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldDef;
    use chrono::Utc;

    fn paper(title: &str, journal: &str, score: f64) -> Paper {
        Paper {
            title: title.to_string(),
            abstract_text: String::new(),
            doi: String::new(),
            authors: vec![],
            journal: journal.to_string(),
            published: Utc::now(),
            link: String::new(),
            keywords: vec![],
            relevance_score: score,
            field_label: String::new(),
            summary: String::new(),
            novelty: String::new(),
            ai_score: 0,
        }
    }

    fn taxonomy() -> Taxonomy {
        Taxonomy::from_defs(&[
            FieldDef {
                name: "energy".to_string(),
                phrases: vec!["triboelectric".to_string(), "nanogenerator".to_string()],
            },
            FieldDef {
                name: "sensors".to_string(),
                phrases: vec!["biosensor".to_string()],
            },
        ])
        .unwrap()
    }

    fn cfg() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[test]
    fn featured_plus_others_partitions_retained() {
        let papers = vec![
            paper("Triboelectric nanogenerator A", "Nano Energy", 9.0),
            paper("Triboelectric device B", "Nano Energy", 7.0),
            paper("Wearable biosensor C", "Biosensors", 8.0),
            paper("Off-topic D", "Misc", 4.0),
        ];
        let sel = select(&papers, &taxonomy(), &cfg());

        assert_eq!(sel.featured.len() + sel.others.len(), 4);
        // no featured paper also appears in others
        for (_, f) in &sel.featured {
            assert!(!sel.others.iter().any(|o| o.title == f.title));
        }
    }

    #[test]
    fn best_scoring_paper_represents_its_field() {
        let papers = vec![
            paper("Triboelectric low", "J1", 5.0),
            paper("Triboelectric high", "J2", 9.5),
        ];
        let sel = select(&papers, &taxonomy(), &cfg());
        assert_eq!(sel.featured.len(), 1);
        assert_eq!(sel.featured[0].1.title, "Triboelectric high");
        assert_eq!(sel.others.len(), 1);
    }

    #[test]
    fn featured_follows_taxonomy_order() {
        let papers = vec![
            paper("Wearable biosensor", "J1", 9.9),
            paper("Triboelectric harvester", "J2", 5.0),
        ];
        let sel = select(&papers, &taxonomy(), &cfg());
        let fields: Vec<&str> = sel.featured.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(fields, vec!["energy", "sensors"]);
    }

    #[test]
    fn fallback_keeps_top_n_when_nothing_clears_threshold() {
        let papers: Vec<Paper> = (0..8)
            .map(|i| paper(&format!("Paper {i}"), "J", 0.25 * i as f64))
            .collect();
        let sel = select(&papers, &taxonomy(), &cfg());
        assert_eq!(sel.retained(), 5); // fallback_highlights default
        // highest scores kept
        let max_kept = sel
            .others
            .iter()
            .map(|p| p.relevance_score)
            .fold(0.0f64, f64::max);
        assert_eq!(max_kept, 1.75);
    }

    #[test]
    fn unclassified_papers_stay_in_others() {
        let papers = vec![
            paper("Totally unrelated work", "J", 9.0),
            paper("Another unrelated one", "J", 8.0),
        ];
        let sel = select(&papers, &taxonomy(), &cfg());
        assert!(sel.featured.is_empty());
        assert_eq!(sel.others.len(), 2);
        assert_eq!(sel.unclassified().len(), 2);
    }

    #[test]
    fn field_stats_cover_full_batch_not_just_retained() {
        let papers = vec![
            paper("Triboelectric winner", "Nano Energy", 9.0),
            // below threshold, still counted in stats
            paper("Triboelectric minor note", "Small", 1.0),
        ];
        let sel = select(&papers, &taxonomy(), &cfg());
        assert_eq!(sel.field_stats["energy"].count, 2);
        assert_eq!(sel.retained(), 1);
    }

    #[test]
    fn empty_batch_selects_nothing() {
        let sel = select(&[], &taxonomy(), &cfg());
        assert_eq!(sel.retained(), 0);
        assert!(sel.field_stats.is_empty());
    }
}
