// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Counters are no-ops until a recorder is installed by the host process.

use keepsake_core::OperationKind;
use metrics::{counter, describe_counter};

/// Register descriptions for all Keepsake counters.
pub fn register_metrics() {
    describe_counter!(
        "keepsake_operations_applied_total",
        "Memory operations committed, by kind"
    );
    describe_counter!(
        "keepsake_operations_rejected_total",
        "Memory operations that failed validation, by kind"
    );
    describe_counter!(
        "keepsake_operations_blocked_total",
        "Memory operations blocked by the conflict resolver, by kind"
    );
    describe_counter!(
        "keepsake_operations_failed_total",
        "Memory operations aborted by an infrastructure error, by kind"
    );
    describe_counter!("keepsake_retrievals_total", "Retrieval passes run");
    describe_counter!(
        "keepsake_retrieval_hits_total",
        "Memories returned by retrieval"
    );
    describe_counter!(
        "keepsake_embedding_failures_total",
        "Embedding calls that failed during retrieval"
    );
    describe_counter!("keepsake_rollbacks_total", "Version rollbacks applied");
}

pub fn record_applied(kind: OperationKind) {
    counter!("keepsake_operations_applied_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_rejected(kind: OperationKind) {
    counter!("keepsake_operations_rejected_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_blocked(kind: OperationKind) {
    counter!("keepsake_operations_blocked_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_failed(kind: OperationKind) {
    counter!("keepsake_operations_failed_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_retrieval(hits: usize) {
    counter!("keepsake_retrievals_total").increment(1);
    counter!("keepsake_retrieval_hits_total").increment(hits as u64);
}

pub fn record_embedding_failure() {
    counter!("keepsake_embedding_failures_total").increment(1);
}
