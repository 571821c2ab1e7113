//! In-memory store
//!
//! Same filtering and ordering contract as `PgStore`, held behind a tokio
//! `RwLock`. Backs the pipeline tests and running without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CommunityStore, LocalOrder, StoreResult};
use crate::address::{CommunityLookup, NormalizedAddress};
use crate::filter::{CommunityFilter, SearchTerm};
use crate::models::{
    CommunityContract, CommunityEdit, CommunityProposal, CommunityRecord, CommunityStatus,
    CommunitySuspect, CountGroup, GroupCount, Media, NewCommunity, RankingRow, Review,
};
use crate::pagination::Page;
use crate::sort::Direction;

#[derive(Debug, Default)]
struct Tables {
    communities: BTreeMap<i64, CommunityRecord>,
    labels: Vec<(i64, String)>,
    /// Insertion order is snapshot order; the last one per community wins
    contracts: Vec<CommunityContract>,
    suspects: Vec<CommunitySuspect>,
    media: HashMap<i64, Media>,
    proposals: Vec<CommunityProposal>,
    managers: Vec<(i64, NormalizedAddress, bool)>,
    cursor: Option<i64>,
}

impl Tables {
    fn next_id(&self) -> i64 {
        self.communities.keys().next_back().map_or(1, |id| id + 1)
    }

    fn matches(&self, filter: &CommunityFilter, record: &CommunityRecord) -> bool {
        if record.status != filter.status {
            return false;
        }
        if record.deleted_at.is_some() && filter.status != CommunityStatus::Removed {
            return false;
        }
        if filter.visibility.is_some_and(|v| v != record.visibility) {
            return false;
        }
        if filter.review.is_some_and(|r| r != record.review) {
            return false;
        }
        let country = record.country.to_uppercase();
        if !filter.countries.is_empty() && !filter.countries.contains(&country) {
            return false;
        }
        if filter.exclude_countries.contains(&country) {
            return false;
        }
        match &filter.search {
            Some(SearchTerm::Address(address)) => {
                if record.contract_address.as_ref() != Some(address)
                    && record.requested_by != *address
                {
                    return false;
                }
            }
            Some(SearchTerm::Name(name)) => {
                if !record.name.to_lowercase().contains(&name.to_lowercase()) {
                    return false;
                }
            }
            None => {}
        }
        if let Some(ambassador) = &filter.ambassador {
            if record.ambassador_address.as_ref() != Some(ambassador) {
                return false;
            }
        }
        if let Some(label) = &filter.label {
            if !self
                .labels
                .iter()
                .any(|(id, l)| *id == record.id && l == label)
            {
                return false;
            }
        }
        !filter.exclude_requesters.contains(&record.requested_by)
    }

    fn filtered<'a>(
        &'a self,
        filter: &'a CommunityFilter,
    ) -> impl Iterator<Item = &'a CommunityRecord> + 'a {
        self.communities
            .values()
            .filter(move |record| self.matches(filter, record))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    failing_accepts: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a full record, keeping its id.
    pub async fn insert(&self, record: CommunityRecord) {
        self.tables
            .write()
            .await
            .communities
            .insert(record.id, record);
    }

    /// The next `count` acceptances fail as a lost connection would.
    pub fn fail_next_accepts(&self, count: usize) {
        self.failing_accepts.store(count, AtomicOrdering::SeqCst);
    }

    /// Hard-deletes a row, as a concurrent writer would.
    pub async fn purge(&self, id: i64) {
        self.tables.write().await.communities.remove(&id);
    }

    pub async fn add_label(&self, id: i64, label: &str) {
        self.tables
            .write()
            .await
            .labels
            .push((id, label.to_lowercase()));
    }

    pub async fn add_contract(&self, contract: CommunityContract) {
        self.tables.write().await.contracts.push(contract);
    }

    pub async fn add_suspect(&self, suspect: CommunitySuspect) {
        self.tables.write().await.suspects.push(suspect);
    }

    pub async fn add_media(&self, media: Media) {
        self.tables.write().await.media.insert(media.id, media);
    }

    pub async fn add_proposal(&self, proposal: CommunityProposal) {
        self.tables.write().await.proposals.push(proposal);
    }

    pub async fn add_manager(&self, community_id: i64, address: NormalizedAddress, active: bool) {
        self.tables
            .write()
            .await
            .managers
            .push((community_id, address, active));
    }
}

fn local_cmp(order: LocalOrder, direction: Direction, a: &CommunityRecord, b: &CommunityRecord) -> Ordering {
    let by = match order {
        LocalOrder::CreatedAt => a.created_at.cmp(&b.created_at),
        LocalOrder::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    };
    direction.apply(by).then_with(|| a.id.cmp(&b.id))
}

fn latest_by_community<T: Clone>(
    rows: &[T],
    ids: &[i64],
    community_id: impl Fn(&T) -> i64,
) -> HashMap<i64, T> {
    let mut out = HashMap::new();
    for row in rows.iter().filter(|r| ids.contains(&community_id(r))) {
        out.insert(community_id(row), row.clone());
    }
    out
}

#[async_trait]
impl CommunityStore for MemoryStore {
    async fn count(&self, filter: &CommunityFilter) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables.filtered(filter).count() as i64)
    }

    async fn ranking_rows(&self, filter: &CommunityFilter) -> StoreResult<Vec<RankingRow>> {
        let tables = self.tables.read().await;
        Ok(tables.filtered(filter).map(RankingRow::from).collect())
    }

    async fn ranking_rows_page(
        &self,
        filter: &CommunityFilter,
        order: LocalOrder,
        direction: Direction,
        window: Option<Page>,
    ) -> StoreResult<Vec<RankingRow>> {
        let tables = self.tables.read().await;
        let mut records: Vec<&CommunityRecord> = tables.filtered(filter).collect();
        records.sort_by(|a, b| local_cmp(order, direction, a, b));
        let (skip, take) = window.map_or((0, usize::MAX), |w| (w.offset, w.limit));
        Ok(records
            .into_iter()
            .skip(skip)
            .take(take)
            .map(RankingRow::from)
            .collect())
    }

    async fn find_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<CommunityRecord>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.communities.get(id).cloned())
            .collect())
    }

    async fn find_one(&self, lookup: &CommunityLookup) -> StoreResult<Option<CommunityRecord>> {
        let tables = self.tables.read().await;
        let found = match lookup {
            CommunityLookup::Id(id) => tables.communities.get(id),
            CommunityLookup::PublicId(public_id) => tables
                .communities
                .values()
                .find(|c| c.public_id == *public_id),
            CommunityLookup::ContractAddress(address) => tables
                .communities
                .values()
                .find(|c| c.contract_address.as_ref() == Some(address)),
        };
        Ok(found.cloned())
    }

    async fn local_ids_for_addresses(
        &self,
        addresses: &[NormalizedAddress],
    ) -> StoreResult<HashMap<NormalizedAddress, i64>> {
        let tables = self.tables.read().await;
        Ok(tables
            .communities
            .values()
            .filter_map(|c| {
                c.contract_address
                    .as_ref()
                    .filter(|a| addresses.contains(a))
                    .map(|a| (a.clone(), c.id))
            })
            .collect())
    }

    async fn covers(&self, media_ids: &[i64]) -> StoreResult<HashMap<i64, Media>> {
        let tables = self.tables.read().await;
        Ok(media_ids
            .iter()
            .filter_map(|id| tables.media.get(id).map(|m| (*id, m.clone())))
            .collect())
    }

    async fn contracts(&self, ids: &[i64]) -> StoreResult<HashMap<i64, CommunityContract>> {
        let tables = self.tables.read().await;
        Ok(latest_by_community(&tables.contracts, ids, |c| c.community_id))
    }

    async fn suspects_since(
        &self,
        ids: &[i64],
        since: DateTime<Utc>,
    ) -> StoreResult<HashMap<i64, CommunitySuspect>> {
        let tables = self.tables.read().await;
        let mut recent: Vec<CommunitySuspect> = tables
            .suspects
            .iter()
            .filter(|s| s.created_at >= since)
            .cloned()
            .collect();
        recent.sort_by_key(|s| s.created_at);
        Ok(latest_by_community(&recent, ids, |s| s.community_id))
    }

    async fn proposals(&self, ids: &[i64]) -> StoreResult<HashMap<i64, CommunityProposal>> {
        let tables = self.tables.read().await;
        Ok(latest_by_community(&tables.proposals, ids, |p| p.community_id))
    }

    async fn managed_community_ids(&self, address: &NormalizedAddress) -> StoreResult<Vec<i64>> {
        let tables = self.tables.read().await;
        Ok(tables
            .managers
            .iter()
            .filter(|(_, a, active)| *active && a == address)
            .map(|(id, _, _)| *id)
            .collect())
    }

    async fn count_grouped(&self, group: CountGroup) -> StoreResult<Vec<GroupCount>> {
        let tables = self.tables.read().await;
        let status = match group {
            CountGroup::Country => CommunityStatus::Valid,
            CountGroup::Review | CountGroup::ReviewByCountry => CommunityStatus::Pending,
        };
        let mut counts: BTreeMap<(Option<String>, Option<&'static str>), (Option<Review>, i64)> =
            BTreeMap::new();
        for record in tables
            .communities
            .values()
            .filter(|c| c.status == status && c.deleted_at.is_none())
        {
            let (country, review) = match group {
                CountGroup::Country => (Some(record.country.clone()), None),
                CountGroup::Review => (None, Some(record.review)),
                CountGroup::ReviewByCountry => (Some(record.country.clone()), Some(record.review)),
            };
            let entry = counts
                .entry((country, review.map(Review::as_str)))
                .or_insert((review, 0));
            entry.1 += 1;
        }
        Ok(counts
            .into_iter()
            .map(|((country, _), (review, count))| GroupCount {
                country,
                review,
                count,
            })
            .collect())
    }

    async fn create_community(&self, new: &NewCommunity) -> StoreResult<CommunityRecord> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let record = CommunityRecord {
            id: tables.next_id(),
            public_id: Uuid::new_v4(),
            contract_address: None,
            requested_by: new.requested_by.clone(),
            name: new.name.clone(),
            description: new.description.clone(),
            language: new.language.clone(),
            currency: new.currency.clone(),
            city: new.city.clone(),
            country: new.country.clone(),
            email: new.email.clone(),
            gps: Some(new.gps),
            visibility: new.visibility,
            status: CommunityStatus::Pending,
            review: Review::Pending,
            cover_image: None,
            cover_media_id: new.cover_media_id,
            ambassador_address: new.ambassador_address.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.communities.insert(record.id, record.clone());
        Ok(record)
    }

    async fn accept_community(
        &self,
        id: i64,
        contract_address: &NormalizedAddress,
    ) -> StoreResult<Option<CommunityRecord>> {
        if self
            .failing_accepts
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let mut tables = self.tables.write().await;
        let Some(record) = tables
            .communities
            .get_mut(&id)
            .filter(|c| c.status == CommunityStatus::Pending && c.contract_address.is_none())
        else {
            return Ok(None);
        };
        record.status = CommunityStatus::Valid;
        record.contract_address = Some(contract_address.clone());
        record.updated_at = Utc::now();
        let accepted = record.clone();
        tables
            .managers
            .push((accepted.id, accepted.requested_by.clone(), true));
        Ok(Some(accepted))
    }

    async fn update_community(
        &self,
        id: i64,
        edit: &CommunityEdit,
    ) -> StoreResult<Option<CommunityRecord>> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables
            .communities
            .get_mut(&id)
            .filter(|c| c.deleted_at.is_none())
        else {
            return Ok(None);
        };
        if let Some(name) = &edit.name {
            record.name = name.clone();
        }
        if let Some(description) = &edit.description {
            record.description = description.clone();
        }
        if let Some(language) = &edit.language {
            record.language = language.clone();
        }
        if let Some(currency) = &edit.currency {
            record.currency = currency.clone();
        }
        if let Some(city) = &edit.city {
            record.city = city.clone();
        }
        if let Some(country) = &edit.country {
            record.country = country.clone();
        }
        if let Some(email) = &edit.email {
            record.email = email.clone();
        }
        if let Some(gps) = edit.gps {
            record.gps = Some(gps);
        }
        if let Some(visibility) = edit.visibility {
            record.visibility = visibility;
        }
        if let Some(cover) = edit.cover_media_id {
            record.cover_media_id = Some(cover);
        }
        if let Some(review) = edit.review {
            record.review = review;
        }
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn remove_community(&self, id: i64) -> StoreResult<Option<CommunityRecord>> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables
            .communities
            .get_mut(&id)
            .filter(|c| c.status == CommunityStatus::Valid)
        else {
            return Ok(None);
        };
        let now = Utc::now();
        record.status = CommunityStatus::Removed;
        record.updated_at = now;
        record.deleted_at = Some(now);
        let removed = record.clone();
        for manager in tables.managers.iter_mut().filter(|m| m.0 == id) {
            manager.2 = false;
        }
        Ok(Some(removed))
    }

    async fn find_pending_by_requester(
        &self,
        requester: &NormalizedAddress,
    ) -> StoreResult<Option<CommunityRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .communities
            .values()
            .filter(|c| {
                c.status == CommunityStatus::Pending
                    && c.deleted_at.is_none()
                    && c.requested_by == *requester
            })
            .min_by_key(|c| (c.created_at, c.id))
            .cloned())
    }

    async fn load_cursor(&self) -> StoreResult<Option<i64>> {
        Ok(self.tables.read().await.cursor)
    }

    async fn save_cursor(&self, block: i64) -> StoreResult<()> {
        self.tables.write().await.cursor = Some(block);
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::to_checksum;
    use crate::models::{GeoPoint, Visibility};
    use bigdecimal::BigDecimal;
    use chrono::Duration;

    fn address(n: u8) -> NormalizedAddress {
        to_checksum(&format!("0x{:040x}", n)).unwrap()
    }

    fn record(id: i64, country: &str, minutes_ago: i64) -> CommunityRecord {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        CommunityRecord {
            id,
            public_id: Uuid::new_v4(),
            contract_address: Some(address(id as u8)),
            requested_by: address(100 + id as u8),
            name: format!("Community {}", id),
            description: String::new(),
            language: "en".to_string(),
            currency: "USD".to_string(),
            city: "Lisbon".to_string(),
            country: country.to_string(),
            email: format!("c{}@example.org", id),
            gps: Some(GeoPoint {
                latitude: 38.7,
                longitude: -9.1,
            }),
            visibility: Visibility::Public,
            status: CommunityStatus::Valid,
            review: Review::Accepted,
            cover_image: None,
            cover_media_id: None,
            ambassador_address: None,
            created_at: at,
            updated_at: at,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn filters_by_country_and_label() {
        let store = MemoryStore::new();
        store.insert(record(1, "PT", 3)).await;
        store.insert(record(2, "BR", 2)).await;
        store.insert(record(3, "PT", 1)).await;
        store.add_label(3, "Featured").await;

        let filter = CommunityFilter {
            countries: vec!["PT".to_string()],
            ..Default::default()
        };
        assert_eq!(store.count(&filter).await.unwrap(), 2);

        let filter = CommunityFilter {
            label: Some("featured".to_string()),
            ..Default::default()
        };
        let rows = store.ranking_rows(&filter).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3]);
    }

    #[tokio::test]
    async fn store_owned_page_orders_then_slices() {
        let store = MemoryStore::new();
        for id in 1..=5 {
            store.insert(record(id, "PT", 10 - id)).await;
        }
        let rows = store
            .ranking_rows_page(
                &CommunityFilter::default(),
                LocalOrder::CreatedAt,
                Direction::Desc,
                Some(Page::new(1, 2)),
            )
            .await
            .unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![4, 3]);
    }

    #[tokio::test]
    async fn accepts_only_pending_communities_once() {
        let store = MemoryStore::new();
        let mut pending = record(1, "PT", 1);
        pending.status = CommunityStatus::Pending;
        pending.contract_address = None;
        store.insert(pending).await;

        let accepted = store.accept_community(1, &address(9)).await.unwrap().unwrap();
        assert_eq!(accepted.status, CommunityStatus::Valid);
        assert_eq!(accepted.contract_address, Some(address(9)));
        assert!(store.accept_community(1, &address(8)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_addresses_are_absent_not_errors() {
        let store = MemoryStore::new();
        store.insert(record(1, "PT", 1)).await;
        let ids = store
            .local_ids_for_addresses(&[address(1), address(50)])
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids.get(&address(1)), Some(&1));
    }

    #[tokio::test]
    async fn keeps_the_latest_contract_snapshot() {
        let store = MemoryStore::new();
        for max in [100, 200] {
            store
                .add_contract(CommunityContract {
                    community_id: 1,
                    claim_amount: BigDecimal::from(1),
                    max_claim: BigDecimal::from(max),
                    base_interval: 17280,
                    increment_interval: 60,
                })
                .await;
        }
        let contracts = store.contracts(&[1]).await.unwrap();
        assert_eq!(contracts[&1].max_claim, BigDecimal::from(200));
    }
}
