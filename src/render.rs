use crate::models::{Selection, TrendSeries};
use crate::out_models::Briefing;

fn esc(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn paper_link(doi: &str, link: &str) -> String {
    if !link.is_empty() {
        link.to_string()
    } else if !doi.is_empty() {
        format!("https://doi.org/{}", doi)
    } else {
        String::new()
    }
}

/// The full HTML digest. Exactly one of these is produced per run, even when
/// nothing was collected; `ai_success` marks whether the briefing came from
/// the model or from the deterministic fallback.
pub fn generate_report(
    date: &str,
    selection: &Selection,
    briefing: &Briefing,
    ai_success: bool,
    total_collected: usize,
    trends: &[TrendSeries],
) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
    html.push_str(
        "<style>\
         body{font-family:sans-serif;max-width:720px;margin:0 auto;color:#222}\
         h1{font-size:20px;border-bottom:2px solid #345;padding-bottom:6px}\
         h2{font-size:16px;color:#345;margin-top:24px}\
         .meta{color:#777;font-size:13px}\
         .featured{background:#f4f7fa;border-left:4px solid #345;padding:10px;margin:8px 0}\
         .score{color:#a60;font-weight:bold}\
         ul{margin:4px 0}\
         table{border-collapse:collapse;font-size:13px}\
         td,th{border:1px solid #ccc;padding:3px 8px}\
         .footer{margin-top:28px;color:#999;font-size:12px}\
         </style></head><body>\n",
    );

    html.push_str(&format!("<h1>Daily Paper Digest — {}</h1>\n", esc(date)));
    html.push_str(&format!(
        "<p class=\"meta\">collected {} | featured {} | others {}</p>\n",
        total_collected,
        selection.featured.len(),
        selection.others.len()
    ));

    if !briefing.overview.is_empty() {
        html.push_str(&format!("<p>{}</p>\n", esc(&briefing.overview)));
    }
    if total_collected == 0 {
        html.push_str("<p>수집된 논문이 없습니다. 피드가 조용한 날입니다.</p>\n");
    } else if selection.retained() == 0 {
        html.push_str("<p>오늘은 새로 선별된 논문이 없습니다 (모두 기존에 처리됨).</p>\n");
    }

    for (field, paper) in &selection.featured {
        let stats = selection.field_stats.get(field);
        let count = stats.map(|s| s.count).unwrap_or(1);
        html.push_str(&format!(
            "<h2>{} <span class=\"meta\">({} papers today)</span></h2>\n",
            esc(field),
            count
        ));

        if let Some(commentary) = briefing.field_analysis.get(field) {
            if !commentary.is_empty() {
                html.push_str(&format!("<p>{}</p>\n", esc(commentary)));
            }
        }

        html.push_str("<div class=\"featured\">\n");
        let href = paper_link(&paper.doi, &paper.link);
        if href.is_empty() {
            html.push_str(&format!("<b>{}</b><br>\n", esc(&paper.title)));
        } else {
            html.push_str(&format!(
                "<b><a href=\"{}\">{}</a></b><br>\n",
                esc(&href),
                esc(&paper.title)
            ));
        }
        html.push_str(&format!(
            "<span class=\"meta\">{}</span> \
             <span class=\"score\">score {:.1}</span>",
            esc(&paper.journal),
            paper.relevance_score
        ));
        if paper.ai_score > 0 {
            html.push_str(&format!(
                " <span class=\"score\">AI {}/10</span>",
                paper.ai_score
            ));
        }
        html.push('\n');
        if !paper.summary.is_empty() {
            html.push_str("<ul>");
            for line in paper.summary.lines() {
                html.push_str(&format!("<li>{}</li>", esc(line)));
            }
            html.push_str("</ul>\n");
        }
        if !paper.novelty.is_empty() {
            html.push_str(&format!("<p><i>{}</i></p>\n", esc(&paper.novelty)));
        }
        html.push_str("</div>\n");

        let same_field = selection.others_in_field(field);
        if !same_field.is_empty() {
            html.push_str("<ul>");
            for p in same_field {
                let href = paper_link(&p.doi, &p.link);
                if href.is_empty() {
                    html.push_str(&format!(
                        "<li>{} <span class=\"meta\">({}, {:.1})</span></li>",
                        esc(&p.title),
                        esc(&p.journal),
                        p.relevance_score
                    ));
                } else {
                    html.push_str(&format!(
                        "<li><a href=\"{}\">{}</a> <span class=\"meta\">({}, {:.1})</span></li>",
                        esc(&href),
                        esc(&p.title),
                        esc(&p.journal),
                        p.relevance_score
                    ));
                }
            }
            html.push_str("</ul>\n");
        }
    }

    let unclassified = selection.unclassified();
    if !unclassified.is_empty() {
        html.push_str("<h2>기타 관련 논문</h2>\n<ul>");
        for p in unclassified {
            html.push_str(&format!(
                "<li>{} <span class=\"meta\">({}, {:.1})</span></li>",
                esc(&p.title),
                esc(&p.journal),
                p.relevance_score
            ));
        }
        html.push_str("</ul>\n");
    }

    if !briefing.action_items.is_empty() {
        html.push_str("<h2>시사점</h2>\n<ul>");
        for item in &briefing.action_items {
            html.push_str(&format!("<li>{}</li>", esc(item)));
        }
        html.push_str("</ul>\n");
    }

    if !trends.is_empty() {
        html.push_str("<h2>주간 키워드 트렌드</h2>\n<table><tr><th>keyword</th>");
        if let Some(first) = trends.first() {
            for d in &first.dates {
                html.push_str(&format!("<th>{}</th>", d.format("%m/%d")));
            }
        }
        html.push_str("<th>total</th></tr>\n");
        for t in trends.iter().take(10) {
            html.push_str(&format!("<tr><td>{}</td>", esc(&t.keyword)));
            for c in &t.counts {
                html.push_str(&format!("<td>{}</td>", c));
            }
            html.push_str(&format!("<td><b>{}</b></td></tr>\n", t.total));
        }
        html.push_str("</table>\n");
    }

    html.push_str(&format!(
        "<p class=\"footer\">AI analysis: {}</p>\n</body></html>\n",
        if ai_success { "Y" } else { "N (keyword fallback)" }
    ));
    html
}

pub fn email_subject(date: &str, featured_count: usize) -> String {
    if featured_count == 0 {
        format!("[PPEL Digest] {} | 오늘은 관련 논문이 없습니다", date)
    } else {
        format!("[PPEL Digest] {} | {}개 분야 주요 논문", date, featured_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldStats, Paper};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn paper(title: &str, field: &str, score: f64) -> Paper {
        Paper {
            title: title.to_string(),
            abstract_text: String::new(),
            doi: "10.1000/t".to_string(),
            authors: vec![],
            journal: "J".to_string(),
            published: Utc::now(),
            link: String::new(),
            keywords: vec![],
            relevance_score: score,
            field_label: field.to_string(),
            summary: String::new(),
            novelty: String::new(),
            ai_score: 0,
        }
    }

    fn empty_briefing() -> Briefing {
        Briefing {
            overview: String::new(),
            papers: vec![],
            field_analysis: BTreeMap::new(),
            trend_keywords: vec![],
            action_items: vec![],
        }
    }

    #[test]
    fn report_escapes_html_in_titles() {
        let selection = Selection {
            featured: vec![(
                "sensors".to_string(),
                paper("Sensors & <Actuators> study", "sensors", 9.0),
            )],
            others: vec![],
            field_stats: BTreeMap::new(),
        };
        let html = generate_report("2026-08-27", &selection, &empty_briefing(), false, 1, &[]);
        assert!(html.contains("Sensors &amp; &lt;Actuators&gt; study"));
        assert!(html.contains("https://doi.org/10.1000/t"));
    }

    #[test]
    fn empty_digest_still_renders() {
        let selection = Selection {
            featured: vec![],
            others: vec![],
            field_stats: BTreeMap::new(),
        };
        let html = generate_report("2026-08-27", &selection, &empty_briefing(), false, 0, &[]);
        assert!(html.contains("수집된 논문이 없습니다"));
        assert!(html.contains("AI analysis: N"));
    }

    #[test]
    fn field_section_includes_stats_count() {
        let mut stats = BTreeMap::new();
        stats.insert(
            "sensors".to_string(),
            FieldStats {
                count: 7,
                top_journals: vec![],
                top_phrases: vec![],
            },
        );
        let selection = Selection {
            featured: vec![("sensors".to_string(), paper("P", "sensors", 8.0))],
            others: vec![],
            field_stats: stats,
        };
        let html = generate_report("2026-08-27", &selection, &empty_briefing(), true, 7, &[]);
        assert!(html.contains("(7 papers today)"));
        assert!(html.contains("AI analysis: Y"));
    }

    #[test]
    fn subject_reflects_featured_count() {
        assert!(email_subject("2026-08-27", 0).contains("관련 논문이 없습니다"));
        assert!(email_subject("2026-08-27", 3).contains("3개 분야"));
    }
}
