// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Proposal source that replays canned replies in order.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use keepsake_core::traits::adapter::PluginAdapter;
use keepsake_core::traits::proposal::{ProposalRequest, ProposalSource};
use keepsake_core::types::{AdapterType, HealthStatus};
use keepsake_core::KeepsakeError;

/// Replies are popped from a FIFO queue; an empty queue yields `{"operations": []}`.
/// Every request is kept for later inspection.
#[derive(Clone, Default)]
pub struct ScriptedProposalSource {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    requests: Arc<Mutex<Vec<ProposalRequest>>>,
}

impl ScriptedProposalSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue = replies.into_iter().map(|r| Ok(r.into())).collect();
        Self {
            replies: Arc::new(Mutex::new(queue)),
            requests: Arc::default(),
        }
    }

    pub async fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().await.push_back(Ok(reply.into()));
    }

    /// Queue a failure for the next call.
    pub async fn push_error(&self, message: impl Into<String>) {
        self.replies.lock().await.push_back(Err(message.into()));
    }

    pub async fn requests(&self) -> Vec<ProposalRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl PluginAdapter for ScriptedProposalSource {
    fn name(&self) -> &str {
        "scripted-proposals"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::ProposalSource
    }

    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), KeepsakeError> {
        Ok(())
    }
}

#[async_trait]
impl ProposalSource for ScriptedProposalSource {
    async fn propose(&self, request: ProposalRequest) -> Result<String, KeepsakeError> {
        self.requests.lock().await.push(request);
        match self.replies.lock().await.pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(KeepsakeError::Proposal {
                message,
                source: None,
            }),
            None => Ok(r#"{"operations": []}"#.to_string()),
        }
    }
}
