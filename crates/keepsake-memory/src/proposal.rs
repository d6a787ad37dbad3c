// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tolerant decoding of proposal-source output into operations.
//!
//! Proposal sources are language models, so their output is parsed in three
//! stages: strict JSON, then the first balanced JSON value embedded in prose
//! or code fences, then `CREATE [type] (importance): content` lines. Entries
//! are decoded one by one, and a bad entry never sinks the batch.

use std::str::FromStr;
use std::sync::LazyLock;

use keepsake_core::model::CreateOperation;
use keepsake_core::{MemoryType, Operation};
use regex::Regex;
use serde_json::Value;
use tracing::debug;

const FALLBACK_IMPORTANCE: f32 = 0.5;
const FALLBACK_CONFIDENCE: f32 = 0.5;
const FALLBACK_REASONING: &str = "extracted from a free-form proposal line";

static CREATE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[\s>*-]*CREATE\s*(?:\[\s*(?P<type>[A-Za-z_]+)\s*\])?\s*(?:\(\s*(?P<importance>\d*\.?\d+)\s*\))?\s*:\s*(?P<content>\S.*?)\s*$",
    )
    .expect("valid create line regex")
});

/// Which stage produced a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    StrictJson,
    EmbeddedJson,
    LineHeuristic,
    Nothing,
}

/// An entry that could not be decoded into an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedEntry {
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProposalBatch {
    pub operations: Vec<Operation>,
    pub rejected: Vec<RejectedEntry>,
    /// Free-text reasoning from the source, kept even when nothing was proposed.
    pub rationale: Option<String>,
    pub stage: ParseStage,
}

impl ProposalBatch {
    fn empty(stage: ParseStage) -> Self {
        Self {
            operations: Vec::new(),
            rejected: Vec::new(),
            rationale: None,
            stage,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.rejected.is_empty()
    }
}

pub fn parse_proposal(raw: &str) -> ProposalBatch {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ProposalBatch::empty(ParseStage::Nothing);
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(batch) = from_value(value, ParseStage::StrictJson) {
            return batch;
        }
    }

    if let Some(batch) = embedded_values(trimmed)
        .filter_map(|v| from_value(v, ParseStage::EmbeddedJson))
        .next()
    {
        return batch;
    }

    let batch = from_lines(trimmed);
    debug!(
        stage = ?batch.stage,
        operations = batch.operations.len(),
        rejected = batch.rejected.len(),
        "proposal parsed without JSON"
    );
    batch
}

/// Interpret a JSON value in one of the accepted shapes.
fn from_value(value: Value, stage: ParseStage) -> Option<ProposalBatch> {
    let mut batch = ProposalBatch::empty(stage);
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut map) => {
            batch.rationale = ["reasoning", "rationale"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::to_string);
            if let Some(ops) = map.remove("operations") {
                match ops {
                    Value::Array(entries) => entries,
                    Value::Null => Vec::new(),
                    other => vec![other],
                }
            } else if map.contains_key("type") {
                vec![Value::Object(map)]
            } else {
                return None;
            }
        }
        _ => return None,
    };

    for entry in entries {
        match serde_json::from_value::<Operation>(entry.clone()) {
            Ok(op) => batch.operations.push(op),
            Err(e) => batch.rejected.push(RejectedEntry {
                raw: entry.to_string(),
                reason: e.to_string(),
            }),
        }
    }
    Some(batch)
}

/// JSON values found by scanning for balanced brackets, in order.
fn embedded_values(text: &str) -> impl Iterator<Item = Value> + '_ {
    let mut offset = 0;
    std::iter::from_fn(move || {
        while let Some(rel) = text[offset..].find(['{', '[']) {
            let start = offset + rel;
            offset = start + 1;
            let Some(end) = balanced_end(&text[start..]) else {
                continue;
            };
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..start + end]) {
                offset = start + end;
                return Some(value);
            }
        }
        None
    })
}

/// Byte length of the bracketed value at the start of `text`, honoring
/// string literals and escapes.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn from_lines(text: &str) -> ProposalBatch {
    let mut batch = ProposalBatch::empty(ParseStage::LineHeuristic);
    for caps in CREATE_LINE.captures_iter(text) {
        let line = caps.get(0).map_or("", |m| m.as_str()).trim().to_string();
        let memory_type = match caps.name("type") {
            Some(t) => match MemoryType::from_str(t.as_str()) {
                Ok(memory_type) => memory_type,
                Err(_) => {
                    batch.rejected.push(RejectedEntry {
                        raw: line,
                        reason: format!("unknown memory type {}", t.as_str()),
                    });
                    continue;
                }
            },
            None => MemoryType::Fact,
        };
        let importance = caps
            .name("importance")
            .and_then(|m| m.as_str().parse::<f32>().ok())
            .unwrap_or(FALLBACK_IMPORTANCE);
        let content = caps.name("content").map_or("", |m| m.as_str());
        batch.operations.push(Operation::Create(CreateOperation {
            content: content.to_string(),
            memory_type,
            importance,
            emotional_weight: None,
            metadata: None,
            reasoning: FALLBACK_REASONING.to_string(),
            confidence: FALLBACK_CONFIDENCE,
        }));
    }
    if batch.is_empty() {
        batch.stage = ParseStage::Nothing;
        batch.rationale = Some(text.to_string());
    }
    batch
}
