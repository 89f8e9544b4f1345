use crate::models::{FieldStats, Paper};
use std::collections::BTreeMap;

/// Abstracts are clipped before prompting; full texts add cost, not signal.
const MAX_ABSTRACT_CHARS: usize = 300;

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let clipped: String = text.chars().take(max_chars).collect();
    format!("{}...", clipped)
}

/// Single enrichment prompt covering every featured paper, so the whole run
/// costs one API call.
pub fn briefing_prompt(
    featured: &[(String, Paper)],
    field_stats: &BTreeMap<String, FieldStats>,
    keywords: &[String],
) -> String {
    let mut papers_block = String::new();
    for (field, p) in featured {
        let count = field_stats.get(field).map(|s| s.count).unwrap_or(1);
        let abstract_text = if p.abstract_text.is_empty() {
            "(no abstract)".to_string()
        } else {
            clip(&p.abstract_text, MAX_ABSTRACT_CHARS)
        };
        papers_block.push_str(&format!(
            "field: {field} (total {count} papers today)\n\
             title: {title}\n\
             journal: {journal}\n\
             abstract: {abstract_text}\n\n",
            field = field,
            count = count,
            title = p.title,
            journal = p.journal,
            abstract_text = abstract_text,
        ));
    }

    format!(
        r#"You are an analyst for a materials/electronics research group.
The group's interest keywords: {keywords}.

Below is today's representative paper for each research field, with the
total number of papers collected in that field.

{papers_block}
Respond with STRICT JSON only, in this shape:
{{
  "overview": "2-3 sentence summary of today's activity across fields",
  "papers": [
    {{
      "field": "field label exactly as given",
      "summary": ["key point 1", "key point 2"],
      "novelty": "one-line core contribution",
      "relevance": 7,
      "tags": ["tag1", "tag2"]
    }}
  ],
  "field_analysis": {{"field label": "1-2 sentences on that field's activity today"}},
  "trend_keywords": ["keyword1", "keyword2", "keyword3"],
  "action_items": ["follow-up suggestion 1", "follow-up suggestion 2"]
}}

Rules:
- "relevance" is 1-10 against the group's keywords.
- "trend_keywords" are lowercase English technical terms.
- No prose outside the JSON object."#,
        keywords = keywords.join(", "),
        papers_block = papers_block,
    )
}
