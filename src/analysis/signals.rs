//! Marker tables for the four non-routine categories.
//!
//! Markers are matched against lower-cased, whitespace-collapsed text. ASCII
//! word markers must sit on word boundaries so that "done" does not fire on
//! "abandoned"; anything containing CJK text or punctuation matches as a plain
//! substring.

use crate::models::Category;

/// The markers that vote for one category.
pub struct SignalSet {
    pub category: Category,
    /// Matched anywhere in the text.
    pub markers: &'static [&'static str],
    /// Words that count only when they open the text or one of its sentences.
    pub lead_words: &'static [&'static str],
    /// Number of distinct hits that saturates confidence at 1.0.
    pub quota: usize,
}

const COMPLETE_MARKERS: &[&str] = &[
    "review changes",
    "review the changes",
    "ready for review",
    "changes ready",
    "implementation complete",
    "completed",
    "completed successfully",
    "done",
    "finished",
    "task complete",
    "build successful",
    "请审查",
    "代码审查",
    "已完成",
    "任务完成",
    "✅",
];

const ERROR_MARKERS: &[&str] = &[
    "error",
    "exception",
    "failed",
    "failure",
    "fatal",
    "traceback",
    "panic",
    "crash",
    "unable to",
    "cannot",
    "could not",
    "错误",
    "异常",
    "失败",
    "无法",
    "崩溃",
];

const PROCESSING_MARKERS: &[&str] = &[
    "generating",
    "processing",
    "thinking",
    "running",
    "loading",
    "working on",
    "analyzing",
    "fixing",
    "正在",
    "生成中",
    "处理中",
    "分析中",
    "修复中",
];

const QUESTION_MARKERS: &[&str] = &["?", "？"];

const QUESTION_LEAD_WORDS: &[&str] = &[
    "how",
    "what",
    "why",
    "which",
    "should",
    "could you",
    "do you",
    "需要",
    "是否",
    "请问",
];

pub const SIGNAL_SETS: [SignalSet; 4] = [
    SignalSet {
        category: Category::Error,
        markers: ERROR_MARKERS,
        lead_words: &[],
        quota: 3,
    },
    SignalSet {
        category: Category::Complete,
        markers: COMPLETE_MARKERS,
        lead_words: &[],
        quota: 3,
    },
    SignalSet {
        category: Category::Processing,
        markers: PROCESSING_MARKERS,
        lead_words: &[],
        quota: 2,
    },
    SignalSet {
        category: Category::Question,
        markers: QUESTION_MARKERS,
        lead_words: QUESTION_LEAD_WORDS,
        quota: 2,
    },
];

/// Ends a sentence; the next word is a lead position.
const SENTENCE_TERMINATORS: [char; 8] = ['.', '?', '!', ':', '。', '？', '！', '：'];

/// Artefacts an upstream OCR/vision stage emits when it failed to read text.
pub const OCR_ARTEFACTS: &[&str] = &[
    "dark_content",
    "detected_features:",
    "high_brightness_content",
    "text_like_patterns",
    "stable_content",
    "unknown_content",
];

/// Shorter text (in characters, after normalisation) carries no usable signal.
pub const MIN_VALID_CHARS: usize = 10;

fn is_word_marker(marker: &str) -> bool {
    marker
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ')
}

pub fn contains_marker(haystack: &str, marker: &str) -> bool {
    if !is_word_marker(marker) {
        return haystack.contains(marker);
    }

    haystack.match_indices(marker).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + marker.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Sentence openings of normalized text. Line breaks are gone by then, so
/// only punctuation separates sentences.
pub fn sentence_starts(normalized: &str) -> impl Iterator<Item = &str> {
    normalized
        .split(SENTENCE_TERMINATORS)
        .map(str::trim_start)
        .filter(|sentence| !sentence.is_empty())
}

pub fn starts_with_lead_word(sentence: &str, word: &str) -> bool {
    let sentence = sentence.trim_start();
    if !sentence.starts_with(word) {
        return false;
    }
    if !is_word_marker(word) {
        return true;
    }
    !sentence[word.len()..]
        .chars()
        .next()
        .is_some_and(char::is_alphanumeric)
}
