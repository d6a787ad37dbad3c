// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use keepsake_config::model::LoggingConfig;
use tracing_subscriber::EnvFilter;

const CRATES: &[&str] = &[
    "keepsake",
    "keepsake_core",
    "keepsake_config",
    "keepsake_storage",
    "keepsake_audit",
    "keepsake_memory",
];

/// `level` for our crates, `warn` for dependencies.
fn default_directive(level: &str) -> String {
    let mut directive = String::from("warn");
    for krate in CRATES {
        directive.push_str(&format!(",{krate}={level}"));
    }
    directive
}

/// Install the global subscriber. `RUST_LOG` overrides `[logging].level`.
/// Logs go to stderr so command output stays clean.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.level)));

    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
