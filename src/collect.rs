use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::api_types::CrossrefWork;
use crate::config::Config;
use crate::models::Paper;

static DOI_RE: OnceLock<Regex> = OnceLock::new();
static TAG_RE: OnceLock<Regex> = OnceLock::new();

fn doi_re() -> &'static Regex {
    DOI_RE.get_or_init(|| Regex::new(r"(10\.\d{4,}/[^\s&?#]+)").unwrap())
}

fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn strip_tags(s: &str) -> String {
    let stripped = tag_re().replace_all(s, "");
    stripped
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .trim()
        .to_string()
}

/// One RSS `<item>` or Atom `<entry>` before normalization into a Paper.
#[derive(Debug, Default, Clone)]
pub struct RawEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub summary: String,
    pub content: String,
    pub pub_date: String,
    pub updated: String,
    pub dc_date: String,
    pub prism_doi: String,
    pub dc_identifier: String,
    pub entry_id: String,
    pub authors: Vec<String>,
}

/// Event-driven feed parse; handles both RSS 2.0 items and Atom entries.
/// Only the fields the pipeline consumes are captured.
pub fn parse_feed(xml: &str) -> Result<Vec<RawEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries: Vec<RawEntry> = Vec::new();
    let mut current: Option<RawEntry> = None;
    let mut elem: Vec<String> = Vec::new();

    loop {
        match reader.read_event().context("reading feed XML")? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                if name == "item" || name == "entry" {
                    current = Some(RawEntry::default());
                }
                if let Some(entry) = current.as_mut() {
                    // Atom carries the link as an attribute
                    if name == "link" && entry.link.is_empty() {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"href" {
                                entry.link = String::from_utf8_lossy(&attr.value).to_string();
                            }
                        }
                    }
                }
                elem.push(name);
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                if let Some(entry) = current.as_mut() {
                    if name == "link" && entry.link.is_empty() {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"href" {
                                entry.link = String::from_utf8_lossy(&attr.value).to_string();
                            }
                        }
                    }
                }
            }
            Event::Text(t) => {
                let text = t.unescape().unwrap_or_default().to_string();
                append_field(current.as_mut(), elem.last().map(|s| s.as_str()), &text);
            }
            Event::CData(t) => {
                let text = String::from_utf8_lossy(&t.into_inner()).to_string();
                append_field(current.as_mut(), elem.last().map(|s| s.as_str()), &text);
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                if (name == "item" || name == "entry") && current.is_some() {
                    entries.push(current.take().unwrap_or_default());
                }
                elem.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}

fn append_field(entry: Option<&mut RawEntry>, elem: Option<&str>, text: &str) {
    let (Some(entry), Some(elem)) = (entry, elem) else {
        return;
    };
    match elem {
        "title" => entry.title.push_str(text),
        "link" => {
            if entry.link.is_empty() {
                entry.link.push_str(text);
            }
        }
        "description" => entry.description.push_str(text),
        "summary" => entry.summary.push_str(text),
        "content" | "content:encoded" => entry.content.push_str(text),
        "pubdate" | "published" => entry.pub_date.push_str(text),
        "updated" => entry.updated.push_str(text),
        "dc:date" => entry.dc_date.push_str(text),
        "prism:doi" => entry.prism_doi.push_str(text),
        "dc:identifier" => entry.dc_identifier.push_str(text),
        "id" | "guid" => entry.entry_id.push_str(text),
        "dc:creator" | "author" | "name" => {
            let author = text.trim();
            if !author.is_empty() {
                entry.authors.push(author.to_string());
            }
        }
        _ => {}
    }
}

fn extract_doi(entry: &RawEntry) -> String {
    for candidate in [&entry.prism_doi, &entry.dc_identifier] {
        let c = candidate.trim();
        if c.starts_with("10.") {
            return c.to_string();
        }
    }
    for haystack in [&entry.link, &entry.entry_id] {
        if let Some(m) = doi_re().captures(haystack) {
            return m[1].to_string();
        }
    }
    String::new()
}

fn extract_abstract(entry: &RawEntry) -> String {
    for raw in [&entry.description, &entry.summary, &entry.content] {
        let text = strip_tags(raw);
        if text.chars().count() > 50 {
            return text;
        }
    }
    // short or empty; keep whatever is there
    for raw in [&entry.description, &entry.summary, &entry.content] {
        let text = strip_tags(raw);
        if !text.is_empty() {
            return text;
        }
    }
    String::new()
}

fn parse_entry_date(entry: &RawEntry) -> Option<DateTime<Utc>> {
    for raw in [&entry.pub_date, &entry.updated, &entry.dc_date] {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                return Some(dt.and_utc());
            }
        }
    }
    None
}

/// Backfill a missing abstract from the CrossRef works API. Failures are
/// logged and ignored; the paper just keeps an empty abstract.
pub async fn fetch_crossref_abstract(client: &Client, doi: &str) -> Option<String> {
    if doi.is_empty() {
        return None;
    }
    let url = format!("https://api.crossref.org/works/{}", doi);
    let result = async {
        let resp = client
            .get(&url)
            .header("User-Agent", "PaperDigest/0.3 (journal digest bot)")
            .send()
            .await?;
        let resp = resp.error_for_status()?;
        resp.json::<CrossrefWork>().await
    }
    .await;

    match result {
        Ok(work) => work
            .message
            .abstract_text
            .map(|a| strip_tags(&a))
            .filter(|a| !a.is_empty()),
        Err(e) => {
            debug!("CrossRef backfill failed - doi={}, error={}", doi, e);
            None
        }
    }
}

/// Pull every configured journal feed and normalize entries into Papers.
/// Per-journal failures log a warning and are skipped; the collector never
/// aborts the run.
pub async fn collect_papers(client: &Client, config: &Config) -> Vec<Paper> {
    let cutoff = Utc::now() - Duration::hours(config.analysis.time_window_hours);
    let mut all_papers = Vec::new();

    for journal in &config.journals {
        debug!("Fetching feed - journal={}, url={}", journal.name, journal.url);
        let xml = match fetch_feed(client, &journal.url).await {
            Ok(xml) => xml,
            Err(e) => {
                warn!("Feed fetch failed - journal={}, error={:#}", journal.name, e);
                continue;
            }
        };

        let entries = match parse_feed(&xml) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Feed parse failed - journal={}, error={:#}", journal.name, e);
                continue;
            }
        };

        let mut count = 0usize;
        for entry in entries {
            let title = strip_tags(&entry.title);
            if title.is_empty() {
                continue;
            }
            // unparseable dates count as recent rather than being dropped
            let published = parse_entry_date(&entry).unwrap_or_else(Utc::now);
            if published < cutoff {
                continue;
            }

            let doi = extract_doi(&entry);
            let mut abstract_text = extract_abstract(&entry);
            if abstract_text.is_empty() && !doi.is_empty() {
                if let Some(filled) = fetch_crossref_abstract(client, &doi).await {
                    abstract_text = filled;
                }
            }

            all_papers.push(Paper {
                title,
                abstract_text,
                doi,
                authors: entry.authors.clone(),
                journal: journal.name.clone(),
                published,
                link: entry.link.clone(),
                keywords: Vec::new(),
                relevance_score: 0.0,
                field_label: String::new(),
                summary: String::new(),
                novelty: String::new(),
                ai_score: 0,
            });
            count += 1;
        }
        info!("Journal collected - name={}, papers={}", journal.name, count);
    }

    info!("Collection completed - total={}", all_papers.len());
    all_papers
}

async fn fetch_feed(client: &Client, url: &str) -> Result<String> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request failed for {}", url))?;
    let resp = resp
        .error_for_status()
        .with_context(|| format!("HTTP error for {}", url))?;
    resp.text()
        .await
        .with_context(|| format!("reading body for {}", url))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:prism="http://prismstandard.org/namespaces/basic/2.0/">
 <channel>
  <title>Nano Energy</title>
  <item>
   <title>A triboelectric nanogenerator for wearables</title>
   <link>https://doi.org/10.1016/j.nanoen.2026.1001</link>
   <description><![CDATA[<p>We report a flexible triboelectric nanogenerator harvesting body motion energy for wearable sensing.</p>]]></description>
   <prism:doi>10.1016/j.nanoen.2026.1001</prism:doi>
   <pubDate>Wed, 26 Aug 2026 08:00:00 +0000</pubDate>
   <dc:creator>Kim, J.</dc:creator>
  </item>
  <item>
   <title></title>
   <description>titleless entries are dropped</description>
  </item>
 </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
 <title>ACS Sensors</title>
 <entry>
  <title>Glucose Sensor Array on Paper</title>
  <link href="https://pubs.acs.org/doi/10.1021/acssensors.6c01234"/>
  <summary>An impedimetric glucose sensor array printed on paper substrates, with over fifty characters here.</summary>
  <updated>2026-08-25T10:30:00Z</updated>
  <id>tag:pubs.acs.org,2026:10.1021/acssensors.6c01234</id>
 </entry>
</feed>"#;

    #[test]
    fn parses_rss_items() {
        let entries = parse_feed(RSS_SAMPLE).unwrap();
        assert_eq!(entries.len(), 2);
        let e = &entries[0];
        assert_eq!(e.title, "A triboelectric nanogenerator for wearables");
        assert_eq!(e.prism_doi, "10.1016/j.nanoen.2026.1001");
        assert_eq!(e.authors, vec!["Kim, J."]);
        assert!(e.description.contains("flexible triboelectric"));
    }

    #[test]
    fn parses_atom_entries_with_link_attr() {
        let entries = parse_feed(ATOM_SAMPLE).unwrap();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.title, "Glucose Sensor Array on Paper");
        assert_eq!(e.link, "https://pubs.acs.org/doi/10.1021/acssensors.6c01234");
        assert_eq!(extract_doi(e), "10.1021/acssensors.6c01234");
    }

    #[test]
    fn doi_extracted_from_link_when_fields_missing() {
        let entry = RawEntry {
            link: "https://doi.org/10.1002/adma.202600001?utm=rss".to_string(),
            ..Default::default()
        };
        assert_eq!(extract_doi(&entry), "10.1002/adma.202600001");
    }

    #[test]
    fn doi_empty_when_nothing_matches() {
        let entry = RawEntry {
            link: "https://example.com/article/123".to_string(),
            ..Default::default()
        };
        assert_eq!(extract_doi(&entry), "");
    }

    #[test]
    fn abstract_strips_html_and_prefers_long_text() {
        let entry = RawEntry {
            description: "<p>short</p>".to_string(),
            summary: "<div>This summary is comfortably longer than fifty characters and should be chosen.</div>"
                .to_string(),
            ..Default::default()
        };
        let text = extract_abstract(&entry);
        assert!(text.starts_with("This summary"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn entry_dates_parse_across_formats() {
        let rfc2822 = RawEntry {
            pub_date: "Wed, 26 Aug 2026 08:00:00 +0000".to_string(),
            ..Default::default()
        };
        assert!(parse_entry_date(&rfc2822).is_some());

        let rfc3339 = RawEntry {
            updated: "2026-08-25T10:30:00Z".to_string(),
            ..Default::default()
        };
        assert!(parse_entry_date(&rfc3339).is_some());

        let bare = RawEntry {
            dc_date: "2026-08-24".to_string(),
            ..Default::default()
        };
        assert!(parse_entry_date(&bare).is_some());

        let garbage = RawEntry {
            pub_date: "yesterday-ish".to_string(),
            ..Default::default()
        };
        assert!(parse_entry_date(&garbage).is_none());
    }
}
