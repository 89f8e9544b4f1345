use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::models::{Paper, TrendSeries};

/// Persistent record of every paper ever digested, keyed by DOI, plus the
/// per-day keyword trend counters. All mutations are durable before the call
/// returns; a broken store is fatal to the run since dedup depends on it.
pub struct PaperStore {
    db_path: PathBuf,
}

/// Row shape for lookups; the store keeps derived fields, not full documents.
#[derive(Debug, Clone)]
pub struct StoredPaper {
    pub doi: String,
    pub title: String,
    pub journal: String,
    pub keywords: Vec<String>,
    pub relevance_score: f64,
    pub summary: String,
    pub ai_score: i64,
}

impl PaperStore {
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating store directory {}", parent.display()))?;
        }
        let store = Self { db_path };
        store.init_db()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .with_context(|| format!("opening paper store {}", self.db_path.display()))
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS papers (
                doi TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                journal TEXT,
                date TEXT,
                field_label TEXT,
                keywords TEXT,
                relevance_score REAL,
                summary TEXT,
                ai_score INTEGER DEFAULT 0,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS daily_trends (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                keyword TEXT NOT NULL,
                count INTEGER DEFAULT 1,
                UNIQUE(date, keyword)
            )",
            [],
        )?;
        info!("Paper store ready - path={}", self.db_path.display());
        Ok(())
    }

    /// Empty DOIs are never duplicates; there is nothing stable to match on.
    pub fn is_duplicate(&self, doi: &str) -> Result<bool> {
        if doi.is_empty() {
            return Ok(false);
        }
        let conn = self.connect()?;
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM papers WHERE doi = ?1", params![doi], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    /// Drop papers already known to the store. Papers without a DOI are
    /// conservatively retained rather than silently dropped.
    pub fn filter_new(&self, papers: Vec<Paper>) -> Result<Vec<Paper>> {
        let before = papers.len();
        let mut fresh = Vec::with_capacity(papers.len());
        for p in papers {
            if self.is_duplicate(&p.doi)? {
                debug!("Skipping duplicate - doi={}", p.doi);
            } else {
                fresh.push(p);
            }
        }
        let skipped = before - fresh.len();
        if skipped > 0 {
            info!("Deduplication - removed={}, retained={}", skipped, fresh.len());
        }
        Ok(fresh)
    }

    /// Idempotent upsert keyed by DOI; re-saving overwrites derived fields
    /// (last write wins). Papers without a DOI are skipped.
    pub fn save_papers(&self, papers: &[Paper]) -> Result<usize> {
        let conn = self.connect()?;
        let mut saved = 0usize;
        for p in papers {
            if p.doi.is_empty() {
                continue;
            }
            conn.execute(
                "INSERT OR REPLACE INTO papers
                 (doi, title, journal, date, field_label, keywords, relevance_score, summary, ai_score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    p.doi,
                    p.title,
                    p.journal,
                    p.published.to_rfc3339(),
                    p.field_label,
                    p.keywords.join(","),
                    p.relevance_score,
                    p.summary,
                    p.ai_score,
                ],
            )?;
            saved += 1;
        }
        info!("Saved {} papers to store", saved);
        Ok(saved)
    }

    pub fn get(&self, doi: &str) -> Result<Option<StoredPaper>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT doi, title, journal, keywords, relevance_score, summary, ai_score
                 FROM papers WHERE doi = ?1",
                params![doi],
                |row| {
                    let keywords: String = row.get(3)?;
                    Ok(StoredPaper {
                        doi: row.get(0)?,
                        title: row.get(1)?,
                        journal: row.get(2)?,
                        keywords: keywords
                            .split(',')
                            .filter(|s| !s.is_empty())
                            .map(|s| s.to_string())
                            .collect(),
                        relevance_score: row.get(4)?,
                        summary: row.get(5)?,
                        ai_score: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Increment the (date, keyword) counter for each keyword occurrence.
    /// Occurrences are cumulative within a day, not deduplicated across papers.
    pub fn record_trends(&self, date: NaiveDate, keywords: &[String]) -> Result<()> {
        if keywords.is_empty() {
            return Ok(());
        }
        let conn = self.connect()?;
        let day = date.format("%Y-%m-%d").to_string();
        for kw in keywords {
            if kw.is_empty() {
                continue;
            }
            conn.execute(
                "INSERT INTO daily_trends (date, keyword, count) VALUES (?1, ?2, 1)
                 ON CONFLICT(date, keyword) DO UPDATE SET count = count + 1",
                params![day, kw],
            )?;
        }
        debug!("Recorded {} trend keywords for {}", keywords.len(), day);
        Ok(())
    }

    /// Per-keyword daily counts over the trailing window ending today.
    pub fn query_trends(&self, window_days: u32) -> Result<Vec<TrendSeries>> {
        self.trends_ending(Utc::now().date_naive(), window_days)
    }

    /// Window of `window_days` contiguous days ending on `end` inclusive,
    /// zero-filled, most recent day last, sorted by total descending.
    pub fn trends_ending(&self, end: NaiveDate, window_days: u32) -> Result<Vec<TrendSeries>> {
        let days = window_days.max(1) as i64;
        let start = end - Duration::days(days - 1);
        let conn = self.connect()?;

        let mut stmt = conn.prepare(
            "SELECT keyword, date, count FROM daily_trends
             WHERE date >= ?1 AND date <= ?2
             ORDER BY keyword, date",
        )?;
        let rows = stmt.query_map(
            params![
                start.format("%Y-%m-%d").to_string(),
                end.format("%Y-%m-%d").to_string()
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;

        let mut per_keyword: HashMap<String, HashMap<String, i64>> = HashMap::new();
        for row in rows {
            let (keyword, date, count) = row?;
            per_keyword.entry(keyword).or_default().insert(date, count);
        }

        let dates: Vec<NaiveDate> = (0..days).map(|i| start + Duration::days(i)).collect();
        let date_keys: Vec<String> = dates
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect();

        let mut series: Vec<TrendSeries> = per_keyword
            .into_iter()
            .map(|(keyword, by_date)| {
                let counts: Vec<i64> = date_keys
                    .iter()
                    .map(|d| by_date.get(d).copied().unwrap_or(0))
                    .collect();
                let total = counts.iter().sum();
                TrendSeries {
                    keyword,
                    dates: dates.clone(),
                    counts,
                    total,
                }
            })
            .collect();

        series.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.keyword.cmp(&b.keyword)));
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn paper(doi: &str, title: &str) -> Paper {
        Paper {
            title: title.to_string(),
            abstract_text: String::new(),
            doi: doi.to_string(),
            authors: vec![],
            journal: "J".to_string(),
            published: Utc::now(),
            link: String::new(),
            keywords: vec![],
            relevance_score: 0.0,
            field_label: String::new(),
            summary: String::new(),
            novelty: String::new(),
            ai_score: 0,
        }
    }

    fn open_store(dir: &tempfile::TempDir) -> PaperStore {
        PaperStore::open(dir.path().join("papers.db")).unwrap()
    }

    #[test]
    fn filter_new_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let papers = vec![paper("10.1000/a", "A"), paper("10.1000/b", "B")];

        let first = store.filter_new(papers.clone()).unwrap();
        assert_eq!(first.len(), 2);
        store.save_papers(&first).unwrap();

        let second = store.filter_new(papers).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn empty_doi_always_passes_filter() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let papers = vec![paper("", "No identifier"), paper("", "Another")];

        store.save_papers(&papers).unwrap(); // no-op, nothing to key on
        let kept = store.filter_new(papers).unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn resave_overwrites_derived_fields() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let mut p = paper("10.1000/x", "X");
        p.summary = "first summary".to_string();
        store.save_papers(std::slice::from_ref(&p)).unwrap();

        p.summary = "second summary".to_string();
        p.relevance_score = 8.5;
        store.save_papers(std::slice::from_ref(&p)).unwrap();

        let stored = store.get("10.1000/x").unwrap().unwrap();
        assert_eq!(stored.summary, "second summary");
        assert_eq!(stored.relevance_score, 8.5);
    }

    #[test]
    fn trend_window_is_contiguous_and_zero_filled() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let end = NaiveDate::from_ymd_opt(2026, 8, 27).unwrap();

        store
            .record_trends(end, &["mxene".to_string()])
            .unwrap();
        store
            .record_trends(end - Duration::days(3), &["mxene".to_string()])
            .unwrap();
        // outside the window, must not appear
        store
            .record_trends(end - Duration::days(10), &["mxene".to_string()])
            .unwrap();

        let series = store.trends_ending(end, 7).unwrap();
        assert_eq!(series.len(), 1);
        let s = &series[0];
        assert_eq!(s.dates.len(), 7);
        assert_eq!(s.counts.len(), 7);
        assert_eq!(*s.dates.last().unwrap(), end);
        assert_eq!(s.dates[0], end - Duration::days(6));
        assert_eq!(s.counts, vec![0, 0, 0, 1, 0, 0, 1]);
        assert_eq!(s.total, 2);
    }

    #[test]
    fn repeated_keywords_accumulate_within_a_day() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let day = NaiveDate::from_ymd_opt(2026, 8, 27).unwrap();

        store.record_trends(day, &["perovskite".to_string()]).unwrap();
        store.record_trends(day, &["perovskite".to_string()]).unwrap();
        store.record_trends(day, &["mxene".to_string()]).unwrap();

        let series = store.trends_ending(day, 7).unwrap();
        assert_eq!(series[0].keyword, "perovskite");
        assert_eq!(series[0].total, 2);
        assert_eq!(series[1].keyword, "mxene");
        assert_eq!(series[1].total, 1);
    }
}
