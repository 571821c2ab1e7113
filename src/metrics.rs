// Per-community dynamic metrics read from the indexer

use bigdecimal::BigDecimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::address::{to_checksum, NormalizedAddress};
use crate::decimal::parse_base_units;
use crate::error::IndexerError;
use crate::indexer::{CommunityEntity, EntityOrder, EntityQuery, MetricsIndexer, STATE_VALID};
use crate::models::MetricsSnapshot;
use crate::pagination::Page;
use crate::ranking::SortValue;
use crate::sort::Direction;

/// Largest `first` the indexer accepts in one call.
pub const INDEXER_MAX_PAGE_SIZE: usize = 1000;

/// Indexer-only metrics a listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKey {
    /// `bigger`
    Beneficiaries,
    /// `out_of_funds`: funds left relative to daily claim need
    EstimatedFunds,
}

impl MetricKey {
    fn entity_order(self) -> EntityOrder {
        match self {
            MetricKey::Beneficiaries => EntityOrder::Beneficiaries,
            MetricKey::EstimatedFunds => EntityOrder::EstimatedFunds,
        }
    }

    pub fn value(self, snapshot: &MetricsSnapshot) -> SortValue {
        match self {
            MetricKey::Beneficiaries => SortValue::Integer(snapshot.beneficiaries),
            MetricKey::EstimatedFunds => SortValue::Amount(snapshot.estimated_funds.clone()),
        }
    }

    pub fn zero(self) -> SortValue {
        self.value(&MetricsSnapshot::default())
    }
}

/// Address restriction for a ranking query.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    /// The indexer's own ordering over every valid community
    Global,
    /// Only these addresses, in the indexer's ordering
    Restricted(&'a [NormalizedAddress]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedMetric {
    pub address: NormalizedAddress,
    pub value: SortValue,
}

#[derive(Clone)]
pub struct MetricsProvider {
    indexer: Arc<dyn MetricsIndexer>,
    page_size: usize,
}

impl MetricsProvider {
    /// `page_size` above the indexer maximum is clamped to it.
    pub fn new(indexer: Arc<dyn MetricsIndexer>, page_size: usize) -> Self {
        if page_size > INDEXER_MAX_PAGE_SIZE {
            warn!(
                "Indexer page size {} clamped to {}",
                page_size, INDEXER_MAX_PAGE_SIZE
            );
        }
        Self {
            indexer,
            page_size: page_size.clamp(1, INDEXER_MAX_PAGE_SIZE),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Ordered `(address, value)` pairs. With a window the indexer owns the
    /// slice; without one the whole scope is returned. Windows wider than the
    /// per-call maximum are fetched in consecutive clamped calls, never cut.
    pub async fn rank(
        &self,
        key: MetricKey,
        direction: Direction,
        scope: Scope<'_>,
        window: Option<Page>,
    ) -> Result<Vec<RankedMetric>, IndexerError> {
        let (id_in, state) = match scope {
            Scope::Global => (None, Some(STATE_VALID)),
            Scope::Restricted(addresses) if addresses.is_empty() => return Ok(Vec::new()),
            Scope::Restricted(addresses) => (
                Some(addresses.iter().map(NormalizedAddress::to_indexer_id).collect::<Vec<_>>()),
                None,
            ),
        };

        let (mut skip, mut remaining) = match window {
            Some(page) => (page.offset, page.limit),
            None => (0, usize::MAX),
        };

        let mut ranked = Vec::new();
        while remaining > 0 {
            let first = remaining.min(self.page_size);
            let query = EntityQuery {
                order_by: key.entity_order(),
                direction,
                first,
                skip,
                id_in: id_in.clone(),
                state,
            };
            let entities = self.indexer.community_entities(&query).await?;
            let fetched = entities.len();

            ranked.extend(entities.iter().filter_map(|entity| {
                let address = checksum_entity(entity)?;
                Some(RankedMetric {
                    address,
                    value: key.value(&snapshot_from_entity(entity)),
                })
            }));

            if fetched < first {
                break;
            }
            skip += fetched;
            remaining -= fetched;
        }
        Ok(ranked)
    }

    /// Snapshots for the given addresses, batched by the page size. Addresses
    /// the indexer has no record for are simply absent from the map.
    pub async fn snapshots(
        &self,
        addresses: &[NormalizedAddress],
    ) -> Result<HashMap<NormalizedAddress, MetricsSnapshot>, IndexerError> {
        let mut out = HashMap::with_capacity(addresses.len());
        for batch in addresses.chunks(self.page_size) {
            let query = EntityQuery {
                order_by: EntityOrder::Id,
                direction: Direction::Asc,
                first: batch.len(),
                skip: 0,
                id_in: Some(batch.iter().map(NormalizedAddress::to_indexer_id).collect()),
                state: None,
            };
            for entity in self.indexer.community_entities(&query).await? {
                if let Some(address) = checksum_entity(&entity) {
                    out.insert(address, snapshot_from_entity(&entity));
                }
            }
        }
        Ok(out)
    }

    /// Snapshot for one community; zero when the indexer hasn't caught up.
    pub async fn get(&self, address: &NormalizedAddress) -> Result<MetricsSnapshot, IndexerError> {
        let mut snapshots = self.snapshots(std::slice::from_ref(address)).await?;
        Ok(snapshots.remove(address).unwrap_or_default())
    }

    pub async fn ping(&self) -> bool {
        self.indexer.ping().await
    }
}

fn checksum_entity(entity: &CommunityEntity) -> Option<NormalizedAddress> {
    match to_checksum(&entity.id) {
        Ok(address) => Some(address),
        Err(_) => {
            warn!("Ignoring indexer entity with malformed id {}", entity.id);
            None
        }
    }
}

fn amount(field: &str, value: &str, id: &str) -> BigDecimal {
    parse_base_units(value).unwrap_or_else(|e| {
        warn!("Indexer {} for {} unreadable, using zero: {}", field, id, e);
        BigDecimal::default()
    })
}

fn snapshot_from_entity(entity: &CommunityEntity) -> MetricsSnapshot {
    MetricsSnapshot {
        beneficiaries: entity.beneficiaries,
        removed_beneficiaries: entity.removed_beneficiaries,
        claimed: amount("claimed", &entity.claimed, &entity.id),
        contributed: amount("contributed", &entity.contributed, &entity.id),
        contributors: entity.contributors,
        managers: entity.managers,
        base_interval: entity.base_interval,
        estimated_funds: amount("estimatedFunds", &entity.estimated_funds, &entity.id),
    }
}
