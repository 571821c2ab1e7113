// External metrics indexer: query seam and wire types

pub mod graphql;
pub mod memory;
pub mod subgraph;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::sort::Direction;

/// Indexer-side state code for communities accepted on chain.
pub const STATE_VALID: i32 = 0;

/// Fields the indexer can order community entities by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntityOrder {
    #[serde(rename = "beneficiaries")]
    Beneficiaries,
    #[serde(rename = "estimatedFunds")]
    EstimatedFunds,
    #[serde(rename = "id")]
    Id,
}

/// One parameterized read against the indexer's community entities.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityQuery {
    pub order_by: EntityOrder,
    pub direction: Direction,
    pub first: usize,
    pub skip: usize,
    /// Lower-case addresses; `None` means no address restriction
    pub id_in: Option<Vec<String>>,
    pub state: Option<i32>,
}

/// Community metrics as the indexer serves them. Amounts are base-unit
/// integers encoded as strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityEntity {
    pub id: String,
    #[serde(default)]
    pub state: i32,
    #[serde(default)]
    pub beneficiaries: i64,
    #[serde(default)]
    pub removed_beneficiaries: i64,
    #[serde(default = "zero")]
    pub claimed: String,
    #[serde(default = "zero")]
    pub contributed: String,
    #[serde(default)]
    pub contributors: i64,
    #[serde(default)]
    pub managers: i64,
    #[serde(default)]
    pub base_interval: i64,
    #[serde(default = "zero")]
    pub estimated_funds: String,
}

fn zero() -> String {
    "0".to_string()
}

/// A community accepted on chain, as reported by the indexer.
#[derive(Debug, Clone, PartialEq)]
pub struct CommunityAdded {
    pub id: String,
    pub requester: String,
    pub block: i64,
}

#[async_trait]
pub trait MetricsIndexer: Send + Sync {
    async fn community_entities(
        &self,
        query: &EntityQuery,
    ) -> Result<Vec<CommunityEntity>, IndexerError>;

    /// Communities added after `block`, ascending by block.
    async fn communities_added_since(
        &self,
        block: i64,
        first: usize,
    ) -> Result<Vec<CommunityAdded>, IndexerError>;

    async fn ping(&self) -> bool;
}
