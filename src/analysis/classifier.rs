use std::collections::BTreeSet;

use crate::models::{Category, Classification};

use super::fingerprint::normalize;
use super::signals::{
    contains_marker, sentence_starts, starts_with_lead_word, SignalSet, MIN_VALID_CHARS,
    OCR_ARTEFACTS, SIGNAL_SETS,
};

/// Keyword-driven classifier for one observation's text.
///
/// Classification never fails: garbage in yields `Classification::invalid()`.
#[derive(Debug, Clone)]
pub struct ContentAnalyzer {
    /// A winning category below this confidence degrades to Routine.
    min_confidence: f64,
}

impl Default for ContentAnalyzer {
    fn default() -> Self {
        Self {
            min_confidence: 0.25,
        }
    }
}

struct CategoryHits {
    category: Category,
    signals: BTreeSet<String>,
    confidence: f64,
}

impl ContentAnalyzer {
    pub fn new(min_confidence: f64) -> Self {
        Self {
            min_confidence: min_confidence.clamp(0.0, 1.0),
        }
    }

    /// Classify `raw_text`. Only its normalized form is looked at, so texts
    /// that normalize alike classify alike.
    pub fn classify(&self, raw_text: &str) -> Classification {
        let normalized = normalize(raw_text);
        if !is_valid_content(&normalized) {
            return Classification::invalid();
        }

        // Sets are visited in tie-break order, so a strict `>` keeps the
        // higher-priority category on equal hit counts.
        let mut best: Option<CategoryHits> = None;
        for set in SIGNAL_SETS.iter() {
            let hits = collect_hits(set, &normalized);
            if hits.signals.is_empty() {
                continue;
            }
            let better = best
                .as_ref()
                .map_or(true, |current| hits.signals.len() > current.signals.len());
            if better {
                best = Some(hits);
            }
        }

        match best {
            None => Classification {
                category: Category::Routine,
                confidence: 1.0,
                matched_signals: BTreeSet::new(),
                valid: true,
            },
            Some(hits) if hits.confidence < self.min_confidence => Classification {
                category: Category::Routine,
                confidence: (1.0 - hits.confidence).clamp(0.0, 1.0),
                matched_signals: hits.signals,
                valid: true,
            },
            Some(hits) => Classification {
                category: hits.category,
                confidence: hits.confidence,
                matched_signals: hits.signals,
                valid: true,
            },
        }
    }
}

fn is_valid_content(normalized: &str) -> bool {
    normalized.chars().count() >= MIN_VALID_CHARS
        && !OCR_ARTEFACTS
            .iter()
            .any(|artefact| normalized.contains(artefact))
}

fn collect_hits(set: &SignalSet, normalized: &str) -> CategoryHits {
    let mut signals = BTreeSet::new();

    for marker in set.markers {
        if contains_marker(normalized, marker) {
            signals.insert((*marker).to_string());
        }
    }

    for word in set.lead_words {
        if sentence_starts(normalized).any(|sentence| starts_with_lead_word(sentence, word)) {
            signals.insert((*word).to_string());
        }
    }

    let quota = set.quota.max(1);
    let confidence = (signals.len().min(quota) as f64 / quota as f64).clamp(0.0, 1.0);

    CategoryHits {
        category: set.category,
        signals,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> ContentAnalyzer {
        ContentAnalyzer::default()
    }

    #[test]
    fn empty_and_whitespace_are_invalid_routine() {
        for text in ["", "   ", "\n\t  \n", "ok"] {
            let result = analyzer().classify(text);
            assert_eq!(result, Classification::invalid(), "input {text:?}");
            assert_eq!(result.category, Category::Routine);
            assert_eq!(result.confidence, 0.0);
            assert!(result.matched_signals.is_empty());
        }
    }

    #[test]
    fn ocr_artefacts_are_invalid() {
        let result = analyzer().classify("dark_content detected_features: none");
        assert!(result.is_invalid());
    }

    #[test]
    fn database_failure_is_error() {
        let result = analyzer().classify("Database connection failed, unable to connect to MySQL");
        assert_eq!(result.category, Category::Error);
        assert!(result.confidence >= 0.3);
        assert!(result.matched_signals.contains("failed"));
        assert!(result.matched_signals.contains("unable to"));
    }

    #[test]
    fn review_prompt_is_complete() {
        let result = analyzer().classify("Review the changes please");
        assert_eq!(result.category, Category::Complete);
        assert!(result.confidence >= 0.3);
    }

    #[test]
    fn generating_is_processing() {
        let result = analyzer().classify("Generating response...");
        assert_eq!(result.category, Category::Processing);
    }

    #[test]
    fn questions_are_detected_by_mark_and_lead_word() {
        let result = analyzer().classify("How should I name the new module?");
        assert_eq!(result.category, Category::Question);
        assert_eq!(result.confidence, 1.0);

        let result = analyzer().classify("需要我继续实现登录功能吗？");
        assert_eq!(result.category, Category::Question);
    }

    #[test]
    fn error_wins_ties_against_completion() {
        let result = analyzer().classify("Step finished but the linter reported an error");
        assert_eq!(result.category, Category::Error);
    }

    #[test]
    fn more_distinct_signals_win() {
        let result =
            analyzer().classify("Implementation complete, all tasks finished and done. One error fixed earlier.");
        assert_eq!(result.category, Category::Complete);
    }

    #[test]
    fn weak_match_degrades_to_routine() {
        let strict = ContentAnalyzer::new(0.6);
        let result = strict.classify("Generating response...");
        assert_eq!(result.category, Category::Routine);
        assert!(result.valid);
        assert!((result.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn unremarkable_text_is_confident_routine() {
        let result = analyzer().classify("Opened src/main.rs in the editor");
        assert_eq!(result.category, Category::Routine);
        assert_eq!(result.confidence, 1.0);
        assert!(result.valid);
    }

    #[test]
    fn classification_is_idempotent_over_normalized_text() {
        let a = analyzer().classify("Build FAILED:\n  cannot find crate `serde`");
        let b = analyzer().classify("build failed: cannot   find crate `serde`");
        assert_eq!(a, b);
        assert_eq!(a, analyzer().classify("Build FAILED:\n  cannot find crate `serde`"));
    }

    #[test]
    fn line_breaks_do_not_change_lead_word_matches() {
        let wrapped = "Done.\nHow do I deploy?\nWhat next";
        let flat = "done. how do i deploy? what next";
        assert_eq!(normalize(wrapped), normalize(flat));

        let a = analyzer().classify(wrapped);
        let b = analyzer().classify(flat);
        assert_eq!(a, b);
        assert_eq!(a.category, Category::Question);
        assert!(a.matched_signals.contains("how"));
        assert!(a.matched_signals.contains("what"));
    }

    #[test]
    fn validity_is_judged_on_normalized_length() {
        // Ten characters only once the padding inside is counted.
        assert!(analyzer().classify("a  b  c  d").is_invalid());
        assert!(analyzer().classify("a\n\n\n\n\nb").is_invalid());
        assert!(!analyzer().classify("build fails").is_invalid());
    }

    #[test]
    fn confidence_stays_in_unit_interval() {
        let noisy = "error exception failed failure fatal traceback panic crash ✅ done ??? 正在 生成中";
        for text in [noisy, "🙂🙂🙂🙂🙂🙂🙂🙂🙂🙂🙂", &"x".repeat(10_000)] {
            let result = analyzer().classify(text);
            assert!((0.0..=1.0).contains(&result.confidence), "input {text:?}");
        }
    }

    #[test]
    fn localized_error_markers_count() {
        let result = analyzer().classify("数据库连接失败，无法继续执行迁移");
        assert_eq!(result.category, Category::Error);
    }
}
