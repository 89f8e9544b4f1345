use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};

use crate::config::FieldDef;

/// One taxonomy field with its phrase matchers compiled up front.
pub struct Field {
    pub name: String,
    pub phrases: Vec<String>,
    patterns: Vec<Regex>,
}

impl Field {
    /// Matched (phrase, occurrence) pairs over a document.
    pub fn phrase_hits(&self, text: &str) -> Vec<(&str, usize)> {
        self.phrases
            .iter()
            .zip(self.patterns.iter())
            .map(|(phrase, re)| (phrase.as_str(), re.find_iter(text).count()))
            .filter(|(_, n)| *n > 0)
            .collect()
    }
}

/// Immutable, ordered field taxonomy. Declaration order is the tie-break
/// order: when two fields reach the same match count, the earlier one wins.
pub struct Taxonomy {
    fields: Vec<Field>,
}

fn compile_phrase(phrase: &str) -> Result<Regex> {
    // Whole-word/phrase matching, case-insensitive.
    let pattern = format!(r"\b{}\b", regex::escape(phrase));
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("compiling phrase matcher for {:?}", phrase))
}

impl Taxonomy {
    pub fn from_defs(defs: &[FieldDef]) -> Result<Self> {
        let mut fields = Vec::with_capacity(defs.len());
        for def in defs {
            let patterns = def
                .phrases
                .iter()
                .map(|p| compile_phrase(p))
                .collect::<Result<Vec<_>>>()?;
            fields.push(Field {
                name: def.name.clone(),
                phrases: def.phrases.clone(),
                patterns,
            });
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Assign at most one field: the strictly highest phrase-match count, with
    /// ties resolved to the earlier-declared field. Zero matches everywhere
    /// means unclassified (`None`). Pure function of (text, taxonomy).
    pub fn classify(&self, text: &str) -> Option<&str> {
        let mut best: Option<(&str, usize)> = None;
        for f in &self.fields {
            let count: usize = f
                .patterns
                .iter()
                .map(|re| re.find_iter(text).count())
                .sum();
            if count == 0 {
                continue;
            }
            // Strictly-greater only, so the first field reaching the maximum wins.
            if best.map_or(true, |(_, best_count)| count > best_count) {
                best = Some((f.name.as_str(), count));
            }
        }
        best.map(|(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs(pairs: &[(&str, &[&str])]) -> Vec<FieldDef> {
        pairs
            .iter()
            .map(|(name, phrases)| FieldDef {
                name: name.to_string(),
                phrases: phrases.iter().map(|p| p.to_string()).collect(),
            })
            .collect()
    }

    #[test]
    fn phrase_match_is_case_insensitive() {
        let tax = Taxonomy::from_defs(&defs(&[("바이오센서", &["glucose sensor"])])).unwrap();
        assert_eq!(
            tax.classify("Glucose Sensor Array for continuous monitoring"),
            Some("바이오센서")
        );
    }

    #[test]
    fn whole_word_boundaries_respected() {
        let tax = Taxonomy::from_defs(&defs(&[("dft", &["dft"])])).unwrap();
        assert_eq!(tax.classify("a DFT study of MXenes"), Some("dft"));
        // "dft" embedded in a longer token must not match
        assert_eq!(tax.classify("the widftx compound"), None);
    }

    #[test]
    fn highest_count_wins() {
        let tax = Taxonomy::from_defs(&defs(&[
            ("energy", &["piezoelectric"]),
            ("sensors", &["biosensor"]),
        ]))
        .unwrap();
        let text = "biosensor array with biosensor readout and one piezoelectric layer";
        assert_eq!(tax.classify(text), Some("sensors"));
    }

    #[test]
    fn ties_resolve_to_declaration_order() {
        let tax = Taxonomy::from_defs(&defs(&[
            ("first", &["wearable"]),
            ("second", &["biosensor"]),
        ]))
        .unwrap();
        // one match each
        assert_eq!(tax.classify("a wearable biosensor"), Some("first"));

        // reversing declaration order flips the winner, same text
        let flipped = Taxonomy::from_defs(&defs(&[
            ("second", &["biosensor"]),
            ("first", &["wearable"]),
        ]))
        .unwrap();
        assert_eq!(flipped.classify("a wearable biosensor"), Some("second"));
    }

    #[test]
    fn no_match_is_unclassified() {
        let tax = Taxonomy::from_defs(&defs(&[("sensors", &["biosensor"])])).unwrap();
        assert_eq!(tax.classify("a study of medieval pottery"), None);
    }

    #[test]
    fn classification_is_repeatable() {
        let tax = Taxonomy::from_defs(&defs(&[
            ("energy", &["triboelectric", "nanogenerator"]),
            ("sensors", &["biosensor"]),
        ]))
        .unwrap();
        let text = "A triboelectric nanogenerator as a self-powered biosensor";
        let first = tax.classify(text).map(|s| s.to_string());
        for _ in 0..10 {
            assert_eq!(tax.classify(text).map(|s| s.to_string()), first);
        }
    }
}
