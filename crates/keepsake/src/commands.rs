// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand execution. Each command returns the text to print.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use keepsake_core::{EditSource, KeepsakeError, Operation};
use keepsake_memory::{MemoryEngine, OperationOutcome, parse_proposal};
use tokio::io::AsyncReadExt;

use crate::cli::Command;

pub async fn execute(
    engine: &MemoryEngine,
    owner: &str,
    command: Command,
) -> Result<String, KeepsakeError> {
    match command {
        Command::Remember {
            content,
            memory_type,
            importance,
        } => {
            let outcome = engine
                .remember(owner, &content, memory_type, importance)
                .await?;
            Ok(describe_outcome(&format!("CREATE [{memory_type}]"), &outcome))
        }
        Command::Recall { query, history } => recall(engine, owner, &query, &history).await,
        Command::Apply { file } => {
            let raw = read_input(file.as_deref()).await?;
            apply(engine, owner, &raw).await
        }
        Command::History { memory_id } => history(engine, owner, &memory_id).await,
        Command::Rollback {
            memory_id,
            version,
            reason,
        } => {
            let restored = engine.rollback(owner, &memory_id, version, &reason).await?;
            Ok(format!(
                "restored {memory_id} to v{version} as v{}",
                restored.version_number
            ))
        }
        Command::Prune => {
            let report = engine.prune(owner).await?;
            Ok(format!(
                "removed {} versions across {} memories",
                report.versions_removed, report.memories_touched
            ))
        }
        Command::ExportAudit { from, to, output } => {
            let from = from.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            let to = to.unwrap_or_else(Utc::now);
            let report = engine.export(owner, from, to, output.as_deref()).await?;
            match output {
                Some(path) => Ok(format!("wrote audit export to {}", path.display())),
                None => Ok(report),
            }
        }
        Command::VerifyAudit => {
            let report = engine.verify_audit(owner).await?;
            match report.broken_at {
                None => Ok(format!("audit chain intact ({} entries)", report.verified)),
                Some(line) => Err(KeepsakeError::Internal(format!(
                    "audit chain broken at line {line}: {}",
                    report.reason.as_deref().unwrap_or("unknown reason")
                ))),
            }
        }
        Command::Stats => {
            let stats = engine.stats(owner).await?;
            let mut out = format!("memories: {}\n", stats.count);
            for (memory_type, n) in &stats.by_type {
                let _ = writeln!(out, "  {memory_type}: {n}");
            }
            let _ = write!(out, "content bytes: {}", stats.total_content_bytes);
            Ok(out)
        }
        Command::DeleteOwner { yes } => {
            if !yes {
                return Err(KeepsakeError::PolicyRejected {
                    reason: format!("deleting `{owner}` is irreversible; pass --yes to confirm"),
                });
            }
            if engine.delete_owner(owner).await? {
                Ok(format!("deleted all data for {owner}"))
            } else {
                Ok(format!("{owner} had no stored data"))
            }
        }
    }
}

async fn read_input(file: Option<&Path>) -> Result<String, KeepsakeError> {
    match file {
        Some(path) => Ok(tokio::fs::read_to_string(path).await?),
        None => {
            let mut raw = String::new();
            tokio::io::stdin().read_to_string(&mut raw).await?;
            Ok(raw)
        }
    }
}

async fn recall(
    engine: &MemoryEngine,
    owner: &str,
    query: &str,
    history: &[String],
) -> Result<String, KeepsakeError> {
    let results = engine.retrieve(owner, query, history).await?;
    if results.is_empty() {
        return Ok("no matching memories".to_string());
    }
    let mut out = String::new();
    for r in &results {
        let _ = writeln!(
            out,
            "{:.3}  [{}] {}  ({})",
            r.score, r.memory.memory_type, r.memory.content, r.memory.id
        );
    }
    Ok(out.trim_end().to_string())
}

/// Operations typed in by a person are applied as user edits.
async fn apply(engine: &MemoryEngine, owner: &str, raw: &str) -> Result<String, KeepsakeError> {
    let batch = parse_proposal(raw);
    let mut out = String::new();
    for entry in &batch.rejected {
        let _ = writeln!(out, "skipped unparseable entry: {}", entry.reason);
    }
    if batch.operations.is_empty() {
        out.push_str("no operations found");
        return Ok(out);
    }
    for op in &batch.operations {
        let outcome = engine.apply_operation(owner, op, EditSource::User).await?;
        let _ = writeln!(out, "{}", describe_outcome(&op_label(op), &outcome));
    }
    Ok(out.trim_end().to_string())
}

async fn history(engine: &MemoryEngine, owner: &str, memory_id: &str) -> Result<String, KeepsakeError> {
    let versions = engine.history(owner, memory_id).await?;
    if versions.is_empty() {
        return Err(KeepsakeError::memory_not_found(memory_id));
    }
    let mut out = String::new();
    for v in &versions {
        let mut flags = Vec::new();
        if v.is_current {
            flags.push("current");
        }
        if v.is_backup {
            flags.push("backup");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        };
        let _ = writeln!(
            out,
            "v{} {} {} importance={:.2}{} {}",
            v.version_number,
            v.created_at.to_rfc3339(),
            v.edit_source,
            v.importance,
            flags,
            v.content
        );
    }
    Ok(out.trim_end().to_string())
}

fn op_label(op: &Operation) -> String {
    match op {
        Operation::Create(c) => format!("CREATE [{}]", c.memory_type),
        Operation::Update(u) => format!("UPDATE {}", u.memory_id),
        Operation::Replace(r) => format!("REPLACE {}", r.memory_id),
        Operation::Delete(d) => format!("DELETE {}", d.memory_id),
        Operation::Merge(m) => format!("MERGE {}", m.source_ids.join("+")),
    }
}

fn describe_outcome(label: &str, outcome: &OperationOutcome) -> String {
    match outcome {
        OperationOutcome::Applied {
            applied,
            validation,
            conflicts,
        } => {
            let mut line = format!("{label}: applied to {}", applied.memory_id);
            for w in &validation.warnings {
                let _ = write!(line, "\n  warning: {w}");
            }
            for c in &conflicts.conflicts {
                let _ = write!(line, "\n  {} ({}): {}", c.conflict_type, c.severity, c.description);
            }
            line
        }
        OperationOutcome::Rejected { validation } => {
            format!("{label}: rejected: {}", validation.errors.join("; "))
        }
        OperationOutcome::Blocked { conflicts, .. } => {
            let reasons: Vec<String> = conflicts
                .conflicts
                .iter()
                .map(|c| format!("{} ({})", c.conflict_type, c.description))
                .collect();
            format!("{label}: blocked: {}", reasons.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use keepsake_config::KeepsakeConfig;
    use keepsake_core::{MemoryStorage, MemoryType};
    use keepsake_test_utils::{MockEmbedder, TestOwner};

    use super::*;

    const OWNER: &str = "alice";

    fn engine(t: &TestOwner) -> MemoryEngine {
        MemoryEngine::new(
            KeepsakeConfig::default(),
            Arc::clone(&t.factory),
            Arc::new(MockEmbedder::new()),
        )
    }

    #[tokio::test]
    async fn remember_then_stats() {
        let t = TestOwner::in_memory(OWNER).await.unwrap();
        let engine = engine(&t);

        let out = execute(
            &engine,
            OWNER,
            Command::Remember {
                content: "User's sister is called Ana".into(),
                memory_type: MemoryType::Relationship,
                importance: 0.7,
            },
        )
        .await
        .unwrap();
        assert!(out.starts_with("CREATE [RELATIONSHIP]: applied to "), "{out}");

        let stats = execute(&engine, OWNER, Command::Stats).await.unwrap();
        assert!(stats.starts_with("memories: 1\n"));
        assert!(stats.contains("RELATIONSHIP: 1"));
    }

    #[tokio::test]
    async fn apply_reads_proposal_file() {
        let t = TestOwner::in_memory(OWNER).await.unwrap();
        let engine = engine(&t);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proposal.json");
        std::fs::write(
            &path,
            r#"{"operations": [
                {"type": "create", "content": "User works as a nurse", "memory_type": "FACT",
                 "importance": 0.6, "reasoning": "career", "confidence": 0.9},
                {"type": "create", "content": "no", "memory_type": "FACT",
                 "importance": 0.6, "reasoning": "too short", "confidence": 0.9}
            ]}"#,
        )
        .unwrap();

        let out = execute(&engine, OWNER, Command::Apply { file: Some(path) })
            .await
            .unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("CREATE [FACT]: applied"));
        assert!(lines.iter().any(|l| l.contains("rejected")));
        assert_eq!(t.owner.store().count().await.unwrap(), 1);

        let history_out = execute(
            &engine,
            OWNER,
            Command::History {
                memory_id: t.owner.store().all().await.unwrap()[0].id.clone(),
            },
        )
        .await
        .unwrap();
        assert!(history_out.starts_with("v1 "));
        assert!(history_out.contains("USER"));
        assert!(history_out.contains("(current)"));
    }

    #[tokio::test]
    async fn verify_and_export_audit() {
        let t = TestOwner::in_memory(OWNER).await.unwrap();
        let engine = engine(&t);
        engine
            .remember(OWNER, "User is vegetarian", MemoryType::Preference, 0.6)
            .await
            .unwrap();

        let out = execute(&engine, OWNER, Command::VerifyAudit).await.unwrap();
        assert_eq!(out, "audit chain intact (2 entries)");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.txt");
        let out = execute(
            &engine,
            OWNER,
            Command::ExportAudit {
                from: None,
                to: None,
                output: Some(path.clone()),
            },
        )
        .await
        .unwrap();
        assert!(out.starts_with("wrote audit export to "));
        assert!(std::fs::read_to_string(&path).unwrap().contains("User is vegetarian"));
    }

    #[tokio::test]
    async fn delete_owner_needs_confirmation() {
        let t = TestOwner::in_memory(OWNER).await.unwrap();
        let engine = engine(&t);
        engine
            .remember(OWNER, "User lives in Lisbon", MemoryType::Fact, 0.5)
            .await
            .unwrap();

        let err = execute(&engine, OWNER, Command::DeleteOwner { yes: false })
            .await
            .unwrap_err();
        assert!(matches!(err, KeepsakeError::PolicyRejected { .. }));
        assert_eq!(engine.stats(OWNER).await.unwrap().count, 1);

        execute(&engine, OWNER, Command::DeleteOwner { yes: true })
            .await
            .unwrap();
        assert_eq!(engine.stats(OWNER).await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn history_of_unknown_memory_is_not_found() {
        let t = TestOwner::in_memory(OWNER).await.unwrap();
        let err = execute(
            &engine(&t),
            OWNER,
            Command::History {
                memory_id: "missing".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, KeepsakeError::NotFound { .. }));
    }
}
