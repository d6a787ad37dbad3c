// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content quality gate applied to every piece of text written to the store.

use std::sync::LazyLock;

use regex::Regex;

/// Shortest content the gate accepts, in characters.
pub const MIN_QUALITY_CHARS: usize = 5;
/// Content longer than this is accepted with a warning.
pub const LONG_CONTENT_CHARS: usize = 1000;

static SSN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("valid SSN regex"));

static CARD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{4}[ -]?){3}\d{4}\b").expect("valid card number regex")
});

static SENSITIVE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:password|passwd|credit card|ssn)\b").expect("valid sensitive word regex")
});

/// Findings for one piece of content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl QualityReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn check_content(content: &str) -> QualityReport {
    let mut report = QualityReport::default();
    let chars = content.trim().chars().count();

    if chars < MIN_QUALITY_CHARS {
        report.errors.push(format!(
            "content too short ({chars} characters, minimum {MIN_QUALITY_CHARS})"
        ));
    }
    if chars > LONG_CONTENT_CHARS {
        report
            .warnings
            .push(format!("content is long ({chars} characters)"));
    }
    if SSN_PATTERN.is_match(content) {
        report
            .warnings
            .push("content looks like it contains a social security number".into());
    }
    if CARD_PATTERN.is_match(content) {
        report
            .warnings
            .push("content looks like it contains a card number".into());
    }
    if let Some(m) = SENSITIVE_WORDS.find(content) {
        report.warnings.push(format!(
            "content mentions sensitive data (`{}`)",
            m.as_str().to_lowercase()
        ));
    }
    report
}
