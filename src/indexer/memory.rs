//! In-memory indexer
//!
//! Serves community entities from memory with the same ordering and paging
//! semantics as the subgraph. Used by tests and local development.

use async_trait::async_trait;
use num_bigint::BigInt;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{CommunityAdded, CommunityEntity, EntityOrder, EntityQuery, MetricsIndexer};
use crate::error::IndexerError;

#[derive(Debug, Default, Clone)]
pub struct MemoryIndexer {
    entities: Arc<RwLock<Vec<CommunityEntity>>>,
    added: Arc<RwLock<Vec<CommunityAdded>>>,
    queries: Arc<RwLock<Vec<EntityQuery>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, entity: CommunityEntity) {
        let mut entities = self.entities.write().await;
        entities.retain(|e| e.id != entity.id);
        entities.push(entity);
    }

    pub async fn push_added(&self, added: CommunityAdded) {
        self.added.write().await.push(added);
    }

    /// Simulates a total outage: every query fails until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    /// Every entity query received so far, in order.
    pub async fn queries(&self) -> Vec<EntityQuery> {
        self.queries.read().await.clone()
    }

    fn check_online(&self) -> Result<(), IndexerError> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(IndexerError::Graphql("indexer unavailable".to_string()));
        }
        Ok(())
    }
}

fn amount(value: &str) -> BigInt {
    value.parse().unwrap_or_default()
}

fn compare(order: EntityOrder, a: &CommunityEntity, b: &CommunityEntity) -> Ordering {
    match order {
        EntityOrder::Beneficiaries => a.beneficiaries.cmp(&b.beneficiaries),
        EntityOrder::EstimatedFunds => amount(&a.estimated_funds).cmp(&amount(&b.estimated_funds)),
        EntityOrder::Id => a.id.cmp(&b.id),
    }
}

#[async_trait]
impl MetricsIndexer for MemoryIndexer {
    async fn community_entities(
        &self,
        query: &EntityQuery,
    ) -> Result<Vec<CommunityEntity>, IndexerError> {
        self.queries.write().await.push(query.clone());
        self.check_online()?;

        let mut matching: Vec<CommunityEntity> = self
            .entities
            .read()
            .await
            .iter()
            .filter(|e| {
                query
                    .id_in
                    .as_ref()
                    .map_or(true, |ids| ids.iter().any(|id| *id == e.id))
            })
            .filter(|e| query.state.map_or(true, |state| e.state == state))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            query
                .direction
                .apply(compare(query.order_by, a, b))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(matching
            .into_iter()
            .skip(query.skip)
            .take(query.first)
            .collect())
    }

    async fn communities_added_since(
        &self,
        block: i64,
        first: usize,
    ) -> Result<Vec<CommunityAdded>, IndexerError> {
        self.check_online()?;
        let mut added: Vec<CommunityAdded> = self
            .added
            .read()
            .await
            .iter()
            .filter(|a| a.block > block)
            .cloned()
            .collect();
        added.sort_by_key(|a| a.block);
        added.truncate(first);
        Ok(added)
    }

    async fn ping(&self) -> bool {
        !self.offline.load(AtomicOrdering::SeqCst)
    }
}
