// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity and lifecycle shared by every pluggable component.

use async_trait::async_trait;

use crate::error::KeepsakeError;
use crate::types::{AdapterType, HealthStatus};

/// Stores, embedders and proposal sources all report a name, a version and
/// their health, and can be shut down.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn version(&self) -> semver::Version;

    fn adapter_type(&self) -> AdapterType;

    /// Probe the backing service. Degraded adapters still serve requests.
    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError>;

    /// Flush pending state and release resources.
    async fn shutdown(&self) -> Result<(), KeepsakeError>;
}
