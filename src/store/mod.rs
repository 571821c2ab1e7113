//! Relational store
//!
//! `CommunityStore` is the only way the engine touches persisted data. The
//! read path never opens a transaction; the write path (create, accept,
//! edit, remove) runs each operation in one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::address::{CommunityLookup, NormalizedAddress};
use crate::filter::CommunityFilter;
use crate::models::{
    CommunityContract, CommunityEdit, CommunityProposal, CommunityRecord, CommunitySuspect,
    CountGroup, GroupCount, Media, NewCommunity, RankingRow,
};
use crate::pagination::Page;
use crate::sort::Direction;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, sqlx::Error>;

/// Orderings the store can apply natively. Ties are broken by id ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOrder {
    CreatedAt,
    UpdatedAt,
}

#[async_trait]
pub trait CommunityStore: Send + Sync {
    /// Rows matching the static filter, ignoring soft-deleted ones.
    async fn count(&self, filter: &CommunityFilter) -> StoreResult<i64>;

    /// Whole filtered universe, light columns only, ordered by id.
    async fn ranking_rows(&self, filter: &CommunityFilter) -> StoreResult<Vec<RankingRow>>;

    /// Store-ordered slice. With `None` the whole ordered scope is returned.
    async fn ranking_rows_page(
        &self,
        filter: &CommunityFilter,
        order: LocalOrder,
        direction: Direction,
        window: Option<Page>,
    ) -> StoreResult<Vec<RankingRow>>;

    /// Full records for `ids`, in no particular order. Missing ids are absent.
    async fn find_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<CommunityRecord>>;

    async fn find_one(&self, lookup: &CommunityLookup) -> StoreResult<Option<CommunityRecord>>;

    /// Local ids for the given contract addresses; unknown addresses are absent.
    async fn local_ids_for_addresses(
        &self,
        addresses: &[NormalizedAddress],
    ) -> StoreResult<HashMap<NormalizedAddress, i64>>;

    async fn covers(&self, media_ids: &[i64]) -> StoreResult<HashMap<i64, Media>>;

    /// Most recent contract snapshot per community.
    async fn contracts(&self, ids: &[i64]) -> StoreResult<HashMap<i64, CommunityContract>>;

    /// Most recent suspect record per community created at or after `since`.
    async fn suspects_since(
        &self,
        ids: &[i64],
        since: DateTime<Utc>,
    ) -> StoreResult<HashMap<i64, CommunitySuspect>>;

    async fn proposals(&self, ids: &[i64]) -> StoreResult<HashMap<i64, CommunityProposal>>;

    /// Communities where `address` is an active manager.
    async fn managed_community_ids(&self, address: &NormalizedAddress) -> StoreResult<Vec<i64>>;

    /// Grouped counts over valid, non-deleted communities.
    async fn count_grouped(&self, group: CountGroup) -> StoreResult<Vec<GroupCount>>;

    async fn create_community(&self, new: &NewCommunity) -> StoreResult<CommunityRecord>;

    /// Sets the contract address and moves `pending -> valid`. Returns `None`
    /// when the community is not pending anymore.
    async fn accept_community(
        &self,
        id: i64,
        contract_address: &NormalizedAddress,
    ) -> StoreResult<Option<CommunityRecord>>;

    async fn update_community(
        &self,
        id: i64,
        edit: &CommunityEdit,
    ) -> StoreResult<Option<CommunityRecord>>;

    /// `valid -> removed`, with the soft-delete marker set.
    async fn remove_community(&self, id: i64) -> StoreResult<Option<CommunityRecord>>;

    /// Oldest pending community requested by `requester`.
    async fn find_pending_by_requester(
        &self,
        requester: &NormalizedAddress,
    ) -> StoreResult<Option<CommunityRecord>>;

    /// Last indexer block the acceptance sync has processed.
    async fn load_cursor(&self) -> StoreResult<Option<i64>>;

    async fn save_cursor(&self, block: i64) -> StoreResult<()>;

    async fn ping(&self) -> bool;
}
