// Hydrates a ranked id slice into projected, enriched community views

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::warn;
use uuid::Uuid;

use crate::address::NormalizedAddress;
use crate::decimal::{rescale, to_plain_string};
use crate::error::DirectoryResult;
use crate::metrics::MetricsProvider;
use crate::models::{
    CommunityContract, CommunityProposal, CommunityRecord, CommunityStatus, CommunitySuspect,
    GeoPoint, Media, MediaThumbnail, MetricsSnapshot, Review, Visibility,
};
use crate::projection::{
    CommunityField, ContractField, CoverField, FieldProjection, MetricsField, ProposalField,
    Selection, SuspectField,
};
use crate::store::{CommunityStore, StoreResult};

/// Suspect records older than this are not reported.
const SUSPECT_WINDOW_DAYS: i64 = 1;

/// One community as returned to callers. Absent fields were not requested;
/// `null` means requested but unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Option<NormalizedAddress>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<NormalizedAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps: Option<Option<GeoPoint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CommunityStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<Review>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambassador_address: Option<Option<NormalizedAddress>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<Option<CoverView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<Option<ContractView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspect: Option<Option<SuspectView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<Option<ProposalView>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<Vec<MediaThumbnail>>,
}

/// Contract parameters; amounts are decimal strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_claim: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_interval: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub increment_interval: Option<i32>,
}

/// Indexer metrics; amounts are decimal strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beneficiaries: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_beneficiaries: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributors: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managers: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_interval: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_funds: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspectView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspect: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub rows: Vec<CommunityView>,
    /// Metrics were requested but the indexer could not be reached
    pub degraded: bool,
}

/// Companion-table reads for one page.
#[derive(Default)]
struct Enrichment {
    covers: HashMap<i64, Media>,
    contracts: HashMap<i64, CommunityContract>,
    suspects: HashMap<i64, CommunitySuspect>,
    proposals: HashMap<i64, CommunityProposal>,
    managed: HashSet<i64>,
}

pub struct ResultAssembler<'a> {
    store: &'a dyn CommunityStore,
    metrics: &'a MetricsProvider,
    decimals: u32,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(store: &'a dyn CommunityStore, metrics: &'a MetricsProvider, decimals: u32) -> Self {
        Self {
            store,
            metrics,
            decimals,
        }
    }

    /// Rows come back in `ids` order. Ids whose row vanished since ranking
    /// are dropped from the page.
    pub async fn assemble(
        &self,
        ids: &[i64],
        projection: &FieldProjection,
        caller: Option<&NormalizedAddress>,
    ) -> DirectoryResult<Assembled> {
        if ids.is_empty() {
            return Ok(Assembled {
                rows: Vec::new(),
                degraded: false,
            });
        }

        let mut by_id: HashMap<i64, CommunityRecord> = self
            .store
            .find_by_ids(ids)
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        let records: Vec<CommunityRecord> =
            ids.iter().filter_map(|id| by_id.remove(id)).collect();
        if records.len() < ids.len() {
            warn!(
                "{} ranked communities disappeared before hydration",
                ids.len() - records.len()
            );
        }

        let (enrichment, snapshots) = tokio::join!(
            self.enrich(&records, projection, caller),
            self.snapshots(&records, projection),
        );
        let enrichment = enrichment?;
        let (snapshots, degraded) = snapshots;

        let rows = records
            .iter()
            .map(|record| self.view(record, projection, caller, &enrichment, &snapshots))
            .collect::<DirectoryResult<Vec<_>>>()?;

        Ok(Assembled { rows, degraded })
    }

    async fn enrich(
        &self,
        records: &[CommunityRecord],
        projection: &FieldProjection,
        caller: Option<&NormalizedAddress>,
    ) -> StoreResult<Enrichment> {
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let media_ids: Vec<i64> = records.iter().filter_map(|r| r.cover_media_id).collect();
        let since = Utc::now() - Duration::days(SUSPECT_WINDOW_DAYS);
        let needs_managed = projection.includes(CommunityField::Email) && caller.is_some();

        let (covers, contracts, suspects, proposals, managed) = tokio::try_join!(
            async {
                match projection.cover {
                    Some(_) if !media_ids.is_empty() => self.store.covers(&media_ids).await,
                    _ => Ok(HashMap::new()),
                }
            },
            async {
                match projection.contract {
                    Some(_) => self.store.contracts(&ids).await,
                    None => Ok(HashMap::new()),
                }
            },
            async {
                match projection.suspect {
                    Some(_) => self.store.suspects_since(&ids, since).await,
                    None => Ok(HashMap::new()),
                }
            },
            async {
                match projection.proposal {
                    Some(_) => self.store.proposals(&ids).await,
                    None => Ok(HashMap::new()),
                }
            },
            async {
                match caller {
                    // one lookup per request, not per row
                    Some(caller) if needs_managed => self.store.managed_community_ids(caller).await,
                    _ => Ok(Vec::new()),
                }
            },
        )?;

        Ok(Enrichment {
            covers,
            contracts,
            suspects,
            proposals,
            managed: managed.into_iter().collect(),
        })
    }

    /// Indexer snapshots for the page. An unreachable indexer degrades every
    /// row to zero metrics instead of failing the page.
    async fn snapshots(
        &self,
        records: &[CommunityRecord],
        projection: &FieldProjection,
    ) -> (HashMap<NormalizedAddress, MetricsSnapshot>, bool) {
        if projection.metrics.is_none() {
            return (HashMap::new(), false);
        }
        let addresses: Vec<NormalizedAddress> = records
            .iter()
            .filter_map(|r| r.contract_address.clone())
            .collect();
        match self.metrics.snapshots(&addresses).await {
            Ok(snapshots) => (snapshots, false),
            Err(e) => {
                warn!("Indexer unavailable, reporting zero metrics: {}", e);
                (HashMap::new(), true)
            }
        }
    }

    fn money(&self, base_units: &BigDecimal) -> DirectoryResult<String> {
        Ok(to_plain_string(&rescale(base_units, self.decimals)?))
    }

    fn view(
        &self,
        record: &CommunityRecord,
        projection: &FieldProjection,
        caller: Option<&NormalizedAddress>,
        enrichment: &Enrichment,
        snapshots: &HashMap<NormalizedAddress, MetricsSnapshot>,
    ) -> DirectoryResult<CommunityView> {
        let has = |field| projection.includes(field);
        let may_see_email = caller.is_some_and(|c| {
            *c == record.requested_by || enrichment.managed.contains(&record.id)
        });

        let mut view = CommunityView {
            id: has(CommunityField::Id).then_some(record.id),
            public_id: has(CommunityField::PublicId).then_some(record.public_id),
            contract_address: has(CommunityField::ContractAddress)
                .then(|| record.contract_address.clone()),
            requested_by: has(CommunityField::RequestedBy).then(|| record.requested_by.clone()),
            name: has(CommunityField::Name).then(|| record.name.clone()),
            description: has(CommunityField::Description).then(|| record.description.clone()),
            language: has(CommunityField::Language).then(|| record.language.clone()),
            currency: has(CommunityField::Currency).then(|| record.currency.clone()),
            city: has(CommunityField::City).then(|| record.city.clone()),
            country: has(CommunityField::Country).then(|| record.country.clone()),
            email: (has(CommunityField::Email) && may_see_email).then(|| record.email.clone()),
            gps: has(CommunityField::Gps).then_some(record.gps),
            visibility: has(CommunityField::Visibility).then_some(record.visibility),
            status: has(CommunityField::Status).then_some(record.status),
            review: has(CommunityField::Review).then_some(record.review),
            cover_image: has(CommunityField::CoverImage).then(|| record.cover_image.clone()),
            ambassador_address: has(CommunityField::AmbassadorAddress)
                .then(|| record.ambassador_address.clone()),
            created_at: has(CommunityField::CreatedAt).then_some(record.created_at),
            updated_at: has(CommunityField::UpdatedAt).then_some(record.updated_at),
            ..Default::default()
        };

        if let Some(selection) = &projection.cover {
            view.cover = Some(cover_view(record, enrichment, selection));
        }
        if let Some(selection) = &projection.contract {
            view.contract = Some(
                enrichment
                    .contracts
                    .get(&record.id)
                    .map(|c| self.contract_view(c, selection))
                    .transpose()?,
            );
        }
        if let Some(selection) = &projection.metrics {
            let zero = MetricsSnapshot::default();
            let snapshot = record
                .contract_address
                .as_ref()
                .and_then(|a| snapshots.get(a))
                .unwrap_or(&zero);
            view.metrics = Some(self.metrics_view(snapshot, selection)?);
        }
        if let Some(selection) = &projection.suspect {
            view.suspect = Some(enrichment.suspects.get(&record.id).map(|s| SuspectView {
                percentage: selection.contains(SuspectField::Percentage).then_some(s.percentage),
                suspect: selection.contains(SuspectField::Suspect).then_some(s.suspect),
                created_at: selection.contains(SuspectField::CreatedAt).then_some(s.created_at),
            }));
        }
        if let Some(selection) = &projection.proposal {
            view.proposal = Some(enrichment.proposals.get(&record.id).map(|p| ProposalView {
                proposal_id: selection
                    .contains(ProposalField::ProposalId)
                    .then_some(p.proposal_id),
            }));
        }
        Ok(view)
    }

    fn contract_view(
        &self,
        contract: &CommunityContract,
        selection: &Selection<ContractField>,
    ) -> DirectoryResult<ContractView> {
        Ok(ContractView {
            claim_amount: selection
                .contains(ContractField::ClaimAmount)
                .then(|| self.money(&contract.claim_amount))
                .transpose()?,
            max_claim: selection
                .contains(ContractField::MaxClaim)
                .then(|| self.money(&contract.max_claim))
                .transpose()?,
            base_interval: selection
                .contains(ContractField::BaseInterval)
                .then_some(contract.base_interval),
            increment_interval: selection
                .contains(ContractField::IncrementInterval)
                .then_some(contract.increment_interval),
        })
    }

    fn metrics_view(
        &self,
        snapshot: &MetricsSnapshot,
        selection: &Selection<MetricsField>,
    ) -> DirectoryResult<MetricsView> {
        let has = |field| selection.contains(field);
        Ok(MetricsView {
            beneficiaries: has(MetricsField::Beneficiaries).then_some(snapshot.beneficiaries),
            removed_beneficiaries: has(MetricsField::RemovedBeneficiaries)
                .then_some(snapshot.removed_beneficiaries),
            claimed: has(MetricsField::Claimed)
                .then(|| self.money(&snapshot.claimed))
                .transpose()?,
            contributed: has(MetricsField::Contributed)
                .then(|| self.money(&snapshot.contributed))
                .transpose()?,
            contributors: has(MetricsField::Contributors).then_some(snapshot.contributors),
            managers: has(MetricsField::Managers).then_some(snapshot.managers),
            base_interval: has(MetricsField::BaseInterval).then_some(snapshot.base_interval),
            estimated_funds: has(MetricsField::EstimatedFunds)
                .then(|| self.money(&snapshot.estimated_funds))
                .transpose()?,
        })
    }
}

/// Media row when linked, otherwise the legacy inline path.
fn cover_view(
    record: &CommunityRecord,
    enrichment: &Enrichment,
    selection: &Selection<CoverField>,
) -> Option<CoverView> {
    let has = |field| selection.contains(field);
    if let Some(media) = record
        .cover_media_id
        .and_then(|id| enrichment.covers.get(&id))
    {
        return Some(CoverView {
            id: has(CoverField::Id).then_some(media.id),
            url: has(CoverField::Url).then(|| media.url.clone()),
            width: has(CoverField::Width).then_some(media.width),
            height: has(CoverField::Height).then_some(media.height),
            thumbnails: has(CoverField::Thumbnails).then(|| media.thumbnails.clone()),
        });
    }
    record.cover_image.as_ref().map(|path| CoverView {
        url: has(CoverField::Url).then(|| path.clone()),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::to_checksum;
    use crate::indexer::memory::MemoryIndexer;
    use crate::indexer::{CommunityEntity, STATE_VALID};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn address(n: u8) -> NormalizedAddress {
        to_checksum(&format!("0x{:040x}", n)).unwrap()
    }

    fn record(id: i64) -> CommunityRecord {
        let now = Utc::now();
        CommunityRecord {
            id,
            public_id: Uuid::new_v4(),
            contract_address: Some(address(id as u8)),
            requested_by: address(200),
            name: format!("Community {}", id),
            description: String::new(),
            language: "en".to_string(),
            currency: "EUR".to_string(),
            city: "Porto".to_string(),
            country: "PT".to_string(),
            email: "team@example.org".to_string(),
            gps: None,
            visibility: Visibility::Public,
            status: CommunityStatus::Valid,
            review: Review::Accepted,
            cover_image: Some("legacy/cover.jpg".to_string()),
            cover_media_id: None,
            ambassador_address: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    async fn fixture() -> (MemoryStore, MetricsProvider) {
        let store = MemoryStore::new();
        for id in 1..=3 {
            store.insert(record(id)).await;
        }
        store
            .add_contract(CommunityContract {
                community_id: 1,
                claim_amount: "1500000000000000000".parse().unwrap(),
                max_claim: "450000000000000000000".parse().unwrap(),
                base_interval: 17280,
                increment_interval: 60,
            })
            .await;

        let indexer = MemoryIndexer::new();
        indexer
            .upsert(CommunityEntity {
                id: address(1).to_indexer_id(),
                state: STATE_VALID,
                beneficiaries: 12,
                removed_beneficiaries: 1,
                claimed: "2500000000000000000".to_string(),
                contributed: "0".to_string(),
                contributors: 3,
                managers: 1,
                base_interval: 17280,
                estimated_funds: "0".to_string(),
            })
            .await;
        (store, MetricsProvider::new(Arc::new(indexer), 1000))
    }

    #[tokio::test]
    async fn keeps_ranked_order_and_drops_vanished_rows() {
        let (store, metrics) = fixture().await;
        let assembler = ResultAssembler::new(&store, &metrics, 18);
        let assembled = assembler
            .assemble(&[3, 99, 1], &FieldProjection::all(), None)
            .await
            .unwrap();
        let ids: Vec<_> = assembled.rows.iter().map(|r| r.id.unwrap()).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn rescales_money_and_defaults_missing_metrics_to_zero() {
        let (store, metrics) = fixture().await;
        let assembler = ResultAssembler::new(&store, &metrics, 18);
        let assembled = assembler
            .assemble(&[1, 2], &FieldProjection::all(), None)
            .await
            .unwrap();

        let first = &assembled.rows[0];
        let contract = first.contract.clone().flatten().unwrap();
        assert_eq!(contract.max_claim.as_deref(), Some("450"));
        assert_eq!(contract.claim_amount.as_deref(), Some("1.5"));
        let metrics = first.metrics.clone().unwrap();
        assert_eq!(metrics.beneficiaries, Some(12));
        assert_eq!(metrics.claimed.as_deref(), Some("2.5"));

        let second = &assembled.rows[1];
        let metrics = second.metrics.clone().unwrap();
        assert_eq!(metrics.beneficiaries, Some(0));
        assert_eq!(metrics.claimed.as_deref(), Some("0"));
        assert_eq!(second.contract, Some(None));
        assert!(!assembled.degraded);
    }

    #[tokio::test]
    async fn email_only_for_requester_or_active_manager() {
        let (store, metrics) = fixture().await;
        store.add_manager(2, address(150), true).await;
        store.add_manager(3, address(150), false).await;
        let assembler = ResultAssembler::new(&store, &metrics, 18);
        let projection = FieldProjection::all();

        let stranger = address(99);
        let rows = assembler
            .assemble(&[1, 2, 3], &projection, Some(&stranger))
            .await
            .unwrap()
            .rows;
        assert!(rows.iter().all(|r| r.email.is_none()));

        let manager = address(150);
        let rows = assembler
            .assemble(&[1, 2, 3], &projection, Some(&manager))
            .await
            .unwrap()
            .rows;
        let visible: Vec<_> = rows.iter().map(|r| r.email.is_some()).collect();
        assert_eq!(visible, vec![false, true, false]);

        let requester = address(200);
        let rows = assembler
            .assemble(&[1], &projection, Some(&requester))
            .await
            .unwrap()
            .rows;
        assert_eq!(rows[0].email.as_deref(), Some("team@example.org"));
    }

    #[tokio::test]
    async fn projection_limits_the_shape() {
        let (store, metrics) = fixture().await;
        let assembler = ResultAssembler::new(&store, &metrics, 18);
        let projection = FieldProjection::parse(Some("name;cover.url")).unwrap();
        let rows = assembler.assemble(&[1], &projection, None).await.unwrap().rows;

        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["name"], "Community 1");
        assert_eq!(json["id"], 1);
        assert!(json.get("email").is_none());
        assert!(json.get("metrics").is_none());
        assert_eq!(json["cover"]["url"], "legacy/cover.jpg");
        assert!(json["cover"].get("width").is_none());
    }
}
