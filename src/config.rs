use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub journals: Vec<Journal>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Field taxonomy, in declaration order. Order matters: classification
    /// ties resolve to the earlier field.
    #[serde(default = "default_fields")]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Journal {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_threshold")]
    pub relevance_threshold: f64,
    /// How many top-scored papers to keep when nothing clears the threshold.
    #[serde(default = "default_fallback")]
    pub fallback_highlights: usize,
    #[serde(default = "default_window_hours")]
    pub time_window_hours: i64,
    #[serde(default = "default_trend_days")]
    pub trend_window_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_model")]
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub recipient: String,
    #[serde(default = "default_relay")]
    pub smtp_relay: String,
}

fn default_threshold() -> f64 {
    3.0
}
fn default_fallback() -> usize {
    5
}
fn default_window_hours() -> i64 {
    48
}
fn default_trend_days() -> u32 {
    7
}
fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_relay() -> String {
    "smtp.gmail.com".to_string()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: default_threshold(),
            fallback_highlights: default_fallback(),
            time_window_hours: default_window_hours(),
            trend_window_days: default_trend_days(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            recipient: String::new(),
            smtp_relay: default_relay(),
        }
    }
}

/// The lab's research fields. Used when the config file does not override
/// `fields`; declaration order is the classification tie-break order.
fn default_fields() -> Vec<FieldDef> {
    let defs: [(&str, &[&str]); 5] = [
        (
            "에너지 하베스팅",
            &[
                "energy harvesting",
                "triboelectric",
                "piezoelectric",
                "nanogenerator",
                "self-powered",
            ],
        ),
        (
            "바이오센서",
            &[
                "biosensor",
                "electrochemical sensor",
                "glucose sensor",
                "impedimetric",
                "voltammetric",
            ],
        ),
        (
            "유연전자소자",
            &["flexible electronics", "wearable", "strain sensor"],
        ),
        (
            "프린팅 전자소자",
            &[
                "printed electronics",
                "screen printing",
                "inkjet printing",
                "3d printing",
            ],
        ),
        (
            "DFT 계산소재과학",
            &["dft", "first-principles", "2d materials", "mxene", "perovskite"],
        ),
    ];
    defs.iter()
        .map(|(name, phrases)| FieldDef {
            name: name.to_string(),
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
        })
        .collect()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let cfg: Config =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg: Config = serde_yaml::from_str("keywords: [biosensor]").unwrap();
        assert_eq!(cfg.analysis.relevance_threshold, 3.0);
        assert_eq!(cfg.analysis.trend_window_days, 7);
        assert_eq!(cfg.fields.len(), 5);
        assert_eq!(cfg.fields[1].name, "바이오센서");
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let yaml = r#"
fields:
  - name: sensors
    phrases: ["glucose sensor"]
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.fields.len(), 1);
        assert_eq!(cfg.fields[0].phrases, vec!["glucose sensor"]);
    }
}
