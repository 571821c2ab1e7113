//! Directory service
//!
//! `Directory` is the request-scoped entry point: it owns the dependency
//! handles (store, indexer, governance source, settings) and wires the
//! listing pipeline together:
//!
//! ```text
//! FilterCompiler -> RankingComposer -> ResultAssembler
//! ```
//!
//! Listings and lookups run under one deadline; hitting it fails the whole
//! request.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

use crate::address::{CommunityLookup, NormalizedAddress};
use crate::assembler::{CommunityView, ResultAssembler};
use crate::config::ListingSettings;
use crate::error::{DirectoryError, DirectoryResult};
use crate::filter::{FilterCompiler, ListQuery};
use crate::governance::ProposalSource;
use crate::indexer::MetricsIndexer;
use crate::metrics::MetricsProvider;
use crate::models::{
    CommunityEdit, CommunityRecord, CommunityStatus, CountGroup, GroupCount, NewCommunity,
};
use crate::pagination::Page;
use crate::projection::FieldProjection;
use crate::ranking::RankingComposer;
use crate::sort::SortChain;
use crate::store::CommunityStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResponse {
    /// Matches for the static filters, independent of indexer availability
    pub count: i64,
    pub rows: Vec<CommunityView>,
    /// Set when an external source was unreachable and ordering or metrics
    /// fell back to local data
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

pub struct Directory {
    store: Arc<dyn CommunityStore>,
    metrics: MetricsProvider,
    filters: FilterCompiler,
    settings: ListingSettings,
}

impl Directory {
    pub fn new(
        store: Arc<dyn CommunityStore>,
        indexer: Arc<dyn MetricsIndexer>,
        proposals: Arc<dyn ProposalSource>,
        settings: ListingSettings,
    ) -> Self {
        Self {
            store,
            metrics: MetricsProvider::new(indexer, settings.indexer_page_size),
            filters: FilterCompiler::new(proposals),
            settings,
        }
    }

    pub fn store(&self) -> &dyn CommunityStore {
        self.store.as_ref()
    }

    pub fn metrics(&self) -> &MetricsProvider {
        &self.metrics
    }

    async fn with_deadline<T, F>(&self, fut: F) -> DirectoryResult<T>
    where
        F: Future<Output = DirectoryResult<T>>,
    {
        tokio::time::timeout(self.settings.request_timeout, fut)
            .await
            .map_err(|_| DirectoryError::Timeout)?
    }

    fn assembler(&self) -> ResultAssembler<'_> {
        ResultAssembler::new(
            self.store.as_ref(),
            &self.metrics,
            self.settings.token_decimals,
        )
    }

    /// Filtered, ranked, paginated and projected listing.
    pub async fn list(
        &self,
        query: &ListQuery,
        caller: Option<&NormalizedAddress>,
    ) -> DirectoryResult<PageResponse> {
        self.with_deadline(self.list_inner(query, caller)).await
    }

    async fn list_inner(
        &self,
        query: &ListQuery,
        caller: Option<&NormalizedAddress>,
    ) -> DirectoryResult<PageResponse> {
        let chain = SortChain::parse(query.order_by.as_deref())?;
        let projection = FieldProjection::parse(query.fields.as_deref())?;
        let compiled = self.filters.compile(query, &chain).await?;
        let page = Page::from_request(
            query.offset,
            query.limit,
            self.settings.default_page_limit,
            self.settings.max_page_limit,
        );

        let composer = RankingComposer::new(self.store.as_ref(), &self.metrics);
        let (count, ranked) = tokio::try_join!(
            async { Ok::<_, DirectoryError>(self.store.count(&compiled.filter).await?) },
            composer.compose(&compiled.filter, &chain, compiled.origin, page),
        )?;
        let assembled = self
            .assembler()
            .assemble(&ranked.ids, &projection, caller)
            .await?;

        debug!(
            "Listed {} of {} communities (offset {}, limit {})",
            assembled.rows.len(),
            count,
            page.offset,
            page.limit
        );
        Ok(PageResponse {
            count,
            rows: assembled.rows,
            degraded: compiled.degraded || ranked.degraded || assembled.degraded,
        })
    }

    /// Single community by id, public id or contract address, fully enriched.
    pub async fn find(
        &self,
        key: &str,
        caller: Option<&NormalizedAddress>,
    ) -> DirectoryResult<CommunityView> {
        self.with_deadline(async {
            let record = self.find_record(key).await?;
            self.view(&record, caller).await
        })
        .await
    }

    async fn find_record(&self, key: &str) -> DirectoryResult<CommunityRecord> {
        let lookup = CommunityLookup::parse(key)?;
        self.store
            .find_one(&lookup)
            .await?
            .ok_or_else(|| DirectoryError::CommunityNotFound(key.to_string()))
    }

    async fn view(
        &self,
        record: &CommunityRecord,
        caller: Option<&NormalizedAddress>,
    ) -> DirectoryResult<CommunityView> {
        self.assembler()
            .assemble(&[record.id], &FieldProjection::all(), caller)
            .await?
            .rows
            .into_iter()
            .next()
            .ok_or_else(|| DirectoryError::CommunityNotFound(record.id.to_string()))
    }

    pub async fn count_grouped(&self, group_by: Option<&str>) -> DirectoryResult<Vec<GroupCount>> {
        let raw = group_by.unwrap_or_default();
        let group: CountGroup = raw
            .parse()
            .map_err(|_| DirectoryError::InvalidGroup(raw.to_string()))?;
        Ok(self.store.count_grouped(group).await?)
    }

    /// New communities always start pending, without a contract address.
    pub async fn create(&self, new: &NewCommunity) -> DirectoryResult<CommunityView> {
        if !new.gps.is_valid() {
            return Err(DirectoryError::InvalidCoordinates);
        }
        let record = self.store.create_community(new).await?;
        info!(
            "Community {} requested by {}",
            record.id, record.requested_by
        );
        self.view(&record, Some(&new.requested_by)).await
    }

    pub async fn edit(
        &self,
        id: i64,
        edit: &CommunityEdit,
        caller: Option<&NormalizedAddress>,
    ) -> DirectoryResult<CommunityView> {
        if edit.gps.is_some_and(|p| !p.is_valid()) {
            return Err(DirectoryError::InvalidCoordinates);
        }
        let record = self
            .store
            .update_community(id, edit)
            .await?
            .ok_or_else(|| DirectoryError::CommunityNotFound(id.to_string()))?;
        self.view(&record, caller).await
    }

    /// `valid -> removed`.
    pub async fn remove(&self, id: i64) -> DirectoryResult<()> {
        let record = self.find_record(&id.to_string()).await?;
        ensure_transition(record.status, CommunityStatus::Removed)?;
        self.store
            .remove_community(id)
            .await?
            .ok_or(DirectoryError::InvalidTransition {
                from: record.status,
                to: CommunityStatus::Removed,
            })?;
        info!("Community {} removed", id);
        Ok(())
    }

    /// `pending -> valid`, fixing the contract address for good.
    pub async fn accept(
        &self,
        id: i64,
        contract_address: &NormalizedAddress,
    ) -> DirectoryResult<CommunityRecord> {
        let record = self.find_record(&id.to_string()).await?;
        ensure_transition(record.status, CommunityStatus::Valid)?;
        let accepted = self
            .store
            .accept_community(id, contract_address)
            .await?
            .ok_or(DirectoryError::InvalidTransition {
                from: record.status,
                to: CommunityStatus::Valid,
            })?;
        info!("Community {} accepted at {}", id, contract_address);
        Ok(accepted)
    }
}

fn ensure_transition(from: CommunityStatus, to: CommunityStatus) -> DirectoryResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(DirectoryError::InvalidTransition { from, to })
    }
}
