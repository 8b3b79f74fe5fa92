//! Capability registry port.

use async_trait::async_trait;

use crate::domain::errors::CoordinationResult;
use crate::domain::models::{CapabilityRecord, CapabilityVersion};

/// Durable store of agent capability declarations.
///
/// The registry never embeds task references; task-to-agent matching is a
/// read-only join computed at claim time.
#[async_trait]
pub trait CapabilityRegistry: Send + Sync {
    /// Upsert a capability record, activating it and refreshing
    /// `last_verified_at`.
    async fn register(
        &self,
        agent_id: &str,
        capability_id: &str,
        version: CapabilityVersion,
    ) -> CoordinationResult<()>;

    /// Deactivate one capability. The record is retained for audit.
    /// Returns false when no such record exists; absence is a no-op,
    /// never a fault.
    async fn deactivate(&self, agent_id: &str, capability_id: &str) -> CoordinationResult<bool>;

    /// Deactivate everything an agent declared. Graceful-shutdown path;
    /// returns the number of records touched.
    async fn deactivate_all(&self, agent_id: &str) -> CoordinationResult<u64>;

    /// Agents holding an active record for `capability_id`, optionally at
    /// or above `min_version`, ordered version-descending.
    async fn find_agents_for(
        &self,
        capability_id: &str,
        min_version: Option<CapabilityVersion>,
    ) -> CoordinationResult<Vec<String>>;

    /// All records (active and inactive) declared by an agent.
    async fn get(&self, agent_id: &str) -> CoordinationResult<Vec<CapabilityRecord>>;

    /// The active capability ids for an agent, i.e. the set handed to
    /// `TaskLedger::claim_next`.
    async fn active_capabilities(&self, agent_id: &str) -> CoordinationResult<Vec<String>>;
}
