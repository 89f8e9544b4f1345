use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::classify::Taxonomy;
use crate::collect::collect_papers;
use crate::config::Config;
use crate::enrich::{apply_briefing, fallback_briefing, Enricher};
use crate::mailer::send_email;
use crate::models::{Paper, Selection, TrendSeries};
use crate::out_models::Briefing;
use crate::render::{email_subject, generate_report};
use crate::score::score_papers;
use crate::select::select;
use crate::store::PaperStore;

pub struct RunOptions {
    pub db_path: PathBuf,
    pub output_dir: PathBuf,
    pub skip_email: bool,
}

/// One full pipeline pass: collect → dedup → score → select → enrich →
/// persist → render → deliver. Exactly one digest goes out per run; "nothing
/// collected" and "nothing new" still produce an explicitly empty digest.
pub async fn run_daily(cfg: &Config, opts: &RunOptions) -> Result<()> {
    let pipeline_start = std::time::Instant::now();
    let today = Utc::now().date_naive();
    let ymd = today.format("%Y-%m-%d").to_string();
    info!("Pipeline started - date={}", ymd);

    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;
    let taxonomy = Taxonomy::from_defs(&cfg.fields)?;

    // a broken store is fatal: without it dedup correctness is gone
    let store = PaperStore::open(&opts.db_path).context("paper store unavailable")?;

    info!("--- Stage 1: collection ---");
    let all_papers = collect_papers(&client, cfg).await;
    let total_collected = all_papers.len();

    info!("--- Stage 2: deduplication ---");
    let mut new_papers = store.filter_new(all_papers)?;
    info!(
        "New papers: {} (of {} collected)",
        new_papers.len(),
        total_collected
    );

    if new_papers.is_empty() {
        if total_collected == 0 {
            warn!("Nothing collected - sending empty digest");
        } else {
            info!("All papers already processed - sending empty digest");
        }
        let selection = Selection {
            featured: Vec::new(),
            others: Vec::new(),
            field_stats: BTreeMap::new(),
        };
        let trends = store.query_trends(cfg.analysis.trend_window_days)?;
        deliver(
            cfg,
            opts,
            &ymd,
            &selection,
            &Briefing::default(),
            false,
            total_collected,
            &trends,
        )
        .await?;
        return Ok(());
    }

    info!("--- Stage 3: relevance scoring ---");
    score_papers(&mut new_papers, &cfg.keywords);

    info!("--- Stage 4: classification & selection ---");
    let mut selection = select(&new_papers, &taxonomy, &cfg.analysis);
    info!(
        "Selected - featured={}, others={}",
        selection.featured.len(),
        selection.others.len()
    );

    info!("--- Stage 5: enrichment (optional) ---");
    let (briefing, ai_success) = match Enricher::from_env(client.clone(), &cfg.gemini) {
        Ok(enricher) if !selection.featured.is_empty() => {
            match enricher.analyze_featured(&selection, &cfg.keywords).await {
                Ok(b) => {
                    apply_briefing(&mut selection, &b);
                    (b, true)
                }
                Err(e) => {
                    warn!("Enrichment failed ({e:#}) - using deterministic fallback");
                    (fallback_briefing(&selection, total_collected), false)
                }
            }
        }
        Ok(_) => {
            debug!("Nothing featured - skipping enrichment call");
            (fallback_briefing(&selection, total_collected), false)
        }
        Err(e) => {
            warn!("Enrichment unavailable ({e}) - using deterministic fallback");
            (fallback_briefing(&selection, total_collected), false)
        }
    };

    info!("--- Stage 6: persistence ---");
    let mut analyzed: Vec<Paper> = selection.featured.iter().map(|(_, p)| p.clone()).collect();
    analyzed.extend(selection.others.iter().cloned());
    store.save_papers(&analyzed)?;

    let mut trend_keywords: Vec<String> = Vec::new();
    for p in &analyzed {
        trend_keywords.extend(p.keywords.iter().cloned());
    }
    trend_keywords.extend(briefing.trend_keywords.iter().cloned());
    store.record_trends(today, &trend_keywords)?;
    let trends = store.query_trends(cfg.analysis.trend_window_days)?;

    info!("--- Stage 7: report & delivery ---");
    deliver(
        cfg,
        opts,
        &ymd,
        &selection,
        &briefing,
        ai_success,
        total_collected,
        &trends,
    )
    .await?;

    info!(
        "Pipeline completed - duration={:.2}s, collected={}, featured={}, others={}, ai={}",
        pipeline_start.elapsed().as_secs_f32(),
        total_collected,
        selection.featured.len(),
        selection.others.len(),
        if ai_success { "Y" } else { "N" }
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn deliver(
    cfg: &Config,
    opts: &RunOptions,
    ymd: &str,
    selection: &Selection,
    briefing: &Briefing,
    ai_success: bool,
    total_collected: usize,
    trends: &[TrendSeries],
) -> Result<()> {
    let html = generate_report(ymd, selection, briefing, ai_success, total_collected, trends);
    let subject = email_subject(ymd, selection.featured.len());

    // keep a date-scoped copy of every digest on disk
    let date_dir = opts.output_dir.join(ymd);
    std::fs::create_dir_all(&date_dir)
        .with_context(|| format!("creating output directory {}", date_dir.display()))?;
    let html_path = date_dir.join("digest.html");
    std::fs::write(&html_path, &html)
        .with_context(|| format!("writing {}", html_path.display()))?;
    debug!("Wrote {}", html_path.display());

    if opts.skip_email {
        info!("Email delivery skipped (--skip-email) - digest at {}", html_path.display());
        return Ok(());
    }
    if cfg.email.recipient.is_empty() {
        warn!("No email recipient configured - digest only written to {}", html_path.display());
        return Ok(());
    }

    send_email(&cfg.email.smtp_relay, &subject, &html, &cfg.email.recipient).await
}
