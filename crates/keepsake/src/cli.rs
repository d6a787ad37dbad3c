// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line surface.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use keepsake_core::MemoryType;
use keepsake_core::types::parse_timestamp;

/// Keepsake - long-term memory for conversational agents.
#[derive(Parser, Debug)]
#[command(name = "keepsake", version, about, long_about = None)]
pub struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Owner whose memories the command works on.
    #[arg(long, short, global = true, default_value = "default")]
    pub owner: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store a memory directly.
    Remember {
        content: String,
        #[arg(long = "type", default_value = "FACT")]
        memory_type: MemoryType,
        #[arg(long, default_value_t = 0.5)]
        importance: f32,
    },
    /// Show the memories most relevant to a query.
    Recall {
        query: String,
        /// Recent conversation turns used for the context boost.
        #[arg(long)]
        history: Vec<String>,
    },
    /// Apply a proposal (JSON or CREATE lines) from a file or stdin.
    Apply {
        file: Option<PathBuf>,
    },
    /// List every version of a memory.
    History { memory_id: String },
    /// Restore a memory to an earlier version.
    Rollback {
        memory_id: String,
        version: u32,
        #[arg(long, default_value = "manual rollback")]
        reason: String,
    },
    /// Drop old versions according to the retention settings.
    Prune,
    /// Write a human-readable audit report.
    ExportAudit {
        /// Start of the range (RFC 3339 or YYYY-MM-DD).
        #[arg(long, value_parser = parse_time)]
        from: Option<DateTime<Utc>>,
        /// End of the range (RFC 3339 or YYYY-MM-DD).
        #[arg(long, value_parser = parse_time)]
        to: Option<DateTime<Utc>>,
        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Check the audit log hash chain.
    VerifyAudit,
    /// Memory counts and sizes.
    Stats,
    /// Irreversibly delete all of an owner's data.
    DeleteOwner {
        #[arg(long)]
        yes: bool,
    },
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = parse_timestamp(s) {
        return Ok(ts);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("`{s}` is neither RFC 3339 nor YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_remember_with_type() {
        let cli = Cli::try_parse_from([
            "keepsake",
            "--owner",
            "alice",
            "remember",
            "User likes tea",
            "--type",
            "preference",
            "--importance",
            "0.7",
        ])
        .unwrap();
        assert_eq!(cli.owner, "alice");
        match cli.command {
            Command::Remember {
                memory_type,
                importance,
                ..
            } => {
                assert_eq!(memory_type, MemoryType::Preference);
                assert_eq!(importance, 0.7);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn time_arguments_accept_dates() {
        let ts = parse_time("2026-03-01").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-03-01T00:00:00+00:00");
        assert!(parse_time("2026-03-01T12:00:00Z").is_ok());
        assert!(parse_time("yesterday").is_err());
    }
}
