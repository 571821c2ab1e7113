// End-to-end listing tests over the in-memory store and indexer

use async_trait::async_trait;
use chrono::{Duration, Utc};
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use ubi_directory::address::{to_checksum, NormalizedAddress};
use ubi_directory::config::ListingSettings;
use ubi_directory::error::{DirectoryError, IndexerError};
use ubi_directory::filter::ListQuery;
use ubi_directory::governance::StaticProposalSource;
use ubi_directory::indexer::memory::MemoryIndexer;
use ubi_directory::indexer::{
    CommunityAdded, CommunityEntity, EntityQuery, MetricsIndexer, STATE_VALID,
};
use ubi_directory::models::{
    CommunityRecord, CommunityStatus, GeoPoint, Review, Visibility,
};
use ubi_directory::service::{Directory, PageResponse};
use ubi_directory::store::MemoryStore;

fn address(n: u32) -> NormalizedAddress {
    to_checksum(&format!("0x{:040x}", n)).unwrap()
}

fn requester_of(id: i64) -> NormalizedAddress {
    address(10_000 + id as u32)
}

struct Fixture {
    store: MemoryStore,
    indexer: MemoryIndexer,
    directory: Directory,
}

impl Fixture {
    fn new() -> Self {
        Self::with_open_proposals(Vec::new())
    }

    fn with_open_proposals(requesters: Vec<NormalizedAddress>) -> Self {
        let store = MemoryStore::new();
        let indexer = MemoryIndexer::new();
        let directory = Directory::new(
            Arc::new(store.clone()),
            Arc::new(indexer.clone()),
            Arc::new(StaticProposalSource::new(requesters)),
            ListingSettings::default(),
        );
        Self {
            store,
            indexer,
            directory,
        }
    }

    async fn community(&self, id: i64, gps: Option<(f64, f64)>) -> CommunityRecord {
        let created = Utc::now() - Duration::minutes(1000 - id);
        let record = CommunityRecord {
            id,
            public_id: Uuid::new_v4(),
            contract_address: Some(address(id as u32)),
            requested_by: requester_of(id),
            name: format!("Community {}", id),
            description: String::new(),
            language: "en".to_string(),
            currency: "USD".to_string(),
            city: "Somewhere".to_string(),
            country: if id % 2 == 0 { "PT" } else { "BR" }.to_string(),
            email: format!("community{}@example.org", id),
            gps: gps.map(|(latitude, longitude)| GeoPoint {
                latitude,
                longitude,
            }),
            visibility: Visibility::Public,
            status: CommunityStatus::Valid,
            review: Review::Accepted,
            cover_image: None,
            cover_media_id: None,
            ambassador_address: None,
            created_at: created,
            updated_at: created,
            deleted_at: None,
        };
        self.store.insert(record.clone()).await;
        record
    }

    async fn pending(&self, id: i64) -> CommunityRecord {
        let mut record = self.community(id, Some((0.0, 0.0))).await;
        record.status = CommunityStatus::Pending;
        record.review = Review::Pending;
        record.contract_address = None;
        self.store.insert(record.clone()).await;
        record
    }

    async fn metrics(&self, id: i64, beneficiaries: i64, claimed: &str) {
        self.indexed(id, beneficiaries, claimed, "0").await;
    }

    async fn indexed(&self, id: i64, beneficiaries: i64, claimed: &str, estimated_funds: &str) {
        self.indexer
            .upsert(CommunityEntity {
                id: address(id as u32).to_indexer_id(),
                state: STATE_VALID,
                beneficiaries,
                removed_beneficiaries: 0,
                claimed: claimed.to_string(),
                contributed: "0".to_string(),
                contributors: 0,
                managers: 1,
                base_interval: 17280,
                estimated_funds: estimated_funds.to_string(),
            })
            .await;
    }

    async fn list(&self, query: ListQuery) -> PageResponse {
        self.directory.list(&query, None).await.unwrap()
    }
}

fn ids(page: &PageResponse) -> Vec<i64> {
    page.rows.iter().map(|r| r.id.unwrap()).collect()
}

fn query(order_by: &str) -> ListQuery {
    ListQuery {
        order_by: Some(order_by.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn count_matches_rows_when_the_page_covers_everything() {
    let fixture = Fixture::new();
    for id in 1..=7 {
        fixture.community(id, Some((0.0, id as f64))).await;
        fixture.metrics(id, id * 2, "0").await;
    }
    fixture.store.add_label(3, "featured").await;

    let filters = [
        ListQuery::default(),
        ListQuery {
            country: Some("PT".to_string()),
            ..Default::default()
        },
        ListQuery {
            exclude_country: Some("PT".to_string()),
            ..Default::default()
        },
        ListQuery {
            search: Some("Community 5".to_string()),
            ..Default::default()
        },
        ListQuery {
            filter: Some("featured".to_string()),
            ..Default::default()
        },
        ListQuery {
            order_by: Some("newest".to_string()),
            country: Some("BR".to_string()),
            ..Default::default()
        },
    ];

    for mut filter in filters {
        filter.offset = Some(0);
        filter.limit = Some(100);
        let page = fixture.list(filter.clone()).await;
        assert_eq!(page.count, page.rows.len() as i64, "filter {:?}", filter);
    }
}

#[tokio::test]
async fn bigger_reproduces_a_plain_descending_sort() {
    let fixture = Fixture::new();
    let beneficiaries = [(1, 40), (2, 10), (3, 90), (4, 25), (5, 60)];
    for (id, count) in beneficiaries {
        fixture.community(id, None).await;
        fixture.metrics(id, count, "0").await;
    }

    let page = fixture.list(query("bigger:DESC")).await;
    assert_eq!(ids(&page), vec![3, 5, 1, 4, 2]);

    // no orderBy defaults to the same ordering
    let page = fixture.list(ListQuery::default()).await;
    assert_eq!(ids(&page), vec![3, 5, 1, 4, 2]);
}

#[tokio::test]
async fn nearest_first_key_fully_orders_distinct_distances() {
    let fixture = Fixture::new();
    // roughly 1000 km, 0 km and 500 km east of the origin along the equator
    fixture.community(1, Some((0.0, 8.9932))).await;
    fixture.community(2, Some((0.0, 0.0))).await;
    fixture.community(3, Some((0.0, 4.4966))).await;
    fixture.metrics(1, 4, "0").await;
    fixture.metrics(2, 4, "0").await;
    fixture.metrics(3, 5, "0").await;

    let page = fixture
        .list(ListQuery {
            order_by: Some("nearest:ASC;bigger:DESC".to_string()),
            lat: Some(0.0),
            lng: Some(0.0),
            ..Default::default()
        })
        .await;
    assert_eq!(ids(&page), vec![2, 3, 1]);
}

#[tokio::test]
async fn equal_distance_ties_are_broken_by_beneficiaries() {
    let fixture = Fixture::new();
    fixture.community(1, Some((0.0, 1.0))).await;
    fixture.community(2, Some((0.0, -1.0))).await;
    fixture.community(3, Some((0.0, 3.0))).await;
    fixture.metrics(1, 3, "0").await;
    fixture.metrics(2, 4, "0").await;
    fixture.metrics(3, 100, "0").await;

    let page = fixture
        .list(ListQuery {
            order_by: Some("nearest;bigger".to_string()),
            lat: Some(0.0),
            lng: Some(0.0),
            ..Default::default()
        })
        .await;
    assert_eq!(ids(&page), vec![2, 1, 3]);
}

#[tokio::test]
async fn nearest_without_coordinates_is_rejected() {
    let fixture = Fixture::new();
    fixture.community(1, Some((0.0, 0.0))).await;
    let err = fixture
        .directory
        .list(&query("nearest"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryError::InvalidCoordinates));
}

#[tokio::test]
async fn monetary_metrics_are_rescaled_decimal_strings() {
    let fixture = Fixture::new();
    fixture.community(1, None).await;
    fixture.metrics(1, 1, "450000000000000000000").await;

    let page = fixture.list(ListQuery::default()).await;
    let metrics = page.rows[0].metrics.clone().unwrap();
    assert_eq!(metrics.claimed.as_deref(), Some("450"));

    let json = serde_json::to_value(&page).unwrap();
    assert_eq!(json["rows"][0]["metrics"]["claimed"], "450");
    assert!(json.get("degraded").is_none());
}

#[tokio::test]
async fn unindexed_communities_get_zero_metrics_and_stay_listed() {
    let fixture = Fixture::new();
    fixture.community(1, None).await;
    fixture.community(2, None).await;
    fixture.community(3, None).await;
    fixture.metrics(1, 5, "0").await;
    fixture.metrics(3, 8, "0").await;

    let page = fixture.list(query("bigger")).await;
    assert_eq!(page.count, 3);
    assert_eq!(ids(&page), vec![3, 1, 2]);
    let unindexed = page.rows[2].metrics.clone().unwrap();
    assert_eq!(unindexed.beneficiaries, Some(0));
    assert_eq!(unindexed.claimed.as_deref(), Some("0"));
    assert!(!page.degraded);
}

#[tokio::test]
async fn metric_pages_continue_into_the_unindexed_tail() {
    let fixture = Fixture::new();
    for id in 1..=5 {
        fixture.community(id, None).await;
    }
    fixture.metrics(4, 10, "0").await;
    fixture.metrics(2, 20, "0").await;

    let mut seen = Vec::new();
    for offset in [0, 2, 4] {
        let page = fixture
            .list(ListQuery {
                order_by: Some("bigger".to_string()),
                offset: Some(offset),
                limit: Some(2),
                ..Default::default()
            })
            .await;
        seen.extend(ids(&page));
    }
    assert_eq!(seen, vec![2, 4, 1, 3, 5]);
}

#[tokio::test]
async fn ascending_metric_orders_put_unindexed_communities_first() {
    let fixture = Fixture::new();
    for id in 1..=5 {
        fixture.community(id, None).await;
    }
    fixture.indexed(4, 10, "0", "7").await;
    fixture.indexed(2, 20, "0", "3").await;

    let mut seen = Vec::new();
    let mut values = Vec::new();
    for offset in [0, 2, 4] {
        let page = fixture
            .list(ListQuery {
                order_by: Some("bigger:ASC".to_string()),
                offset: Some(offset),
                limit: Some(2),
                ..Default::default()
            })
            .await;
        assert_eq!(page.count, 5);
        seen.extend(ids(&page));
        values.extend(
            page.rows
                .iter()
                .map(|r| r.metrics.clone().unwrap().beneficiaries.unwrap()),
        );
    }
    assert_eq!(seen, vec![1, 3, 5, 4, 2]);
    assert_eq!(values, vec![0, 0, 0, 10, 20]);

    // out_of_funds is ascending by default
    let page = fixture.list(query("out_of_funds")).await;
    assert_eq!(ids(&page), vec![1, 3, 5, 2, 4]);
    let funds: Vec<_> = page
        .rows
        .iter()
        .map(|r| r.metrics.clone().unwrap().estimated_funds.unwrap())
        .collect();
    assert_eq!(funds, vec!["0", "0", "0", "0.000000000000000003", "0.000000000000000007"]);
}

#[tokio::test]
async fn indexer_outage_degrades_to_local_order() {
    let fixture = Fixture::new();
    for id in [3, 1, 2] {
        fixture.community(id, None).await;
        fixture.metrics(id, id * 10, "0").await;
    }
    fixture.indexer.set_offline(true);

    let page = fixture.list(query("bigger")).await;
    assert!(page.degraded);
    assert_eq!(page.count, 3);
    assert_eq!(ids(&page), vec![1, 2, 3]);
    let metrics = page.rows[0].metrics.clone().unwrap();
    assert_eq!(metrics.beneficiaries, Some(0));

    let json = serde_json::to_value(&page).unwrap();
    assert_eq!(json["degraded"], true);
}

#[tokio::test]
async fn store_owned_ordering_pages_by_creation_time() {
    let fixture = Fixture::new();
    for id in 1..=6 {
        fixture.community(id, None).await;
    }
    let page = fixture
        .list(ListQuery {
            order_by: Some("newest".to_string()),
            offset: Some(1),
            limit: Some(3),
            ..Default::default()
        })
        .await;
    assert_eq!(page.count, 6);
    assert_eq!(ids(&page), vec![5, 4, 3]);
}

#[tokio::test]
async fn offsets_past_the_end_return_an_empty_page() {
    let fixture = Fixture::new();
    for id in 1..=3 {
        fixture.community(id, None).await;
    }
    fixture.metrics(1, 2, "0").await;

    for order_by in ["newest", "bigger", "bigger:ASC"] {
        let page = fixture
            .list(ListQuery {
                order_by: Some(order_by.to_string()),
                offset: Some(usize::MAX),
                ..Default::default()
            })
            .await;
        assert_eq!(page.count, 3);
        assert!(page.rows.is_empty(), "{}", order_by);
    }
}

#[tokio::test]
async fn email_is_suppressed_for_strangers_only() {
    let fixture = Fixture::new();
    let pending = fixture.pending(1).await;

    let query = ListQuery {
        status: Some("pending".to_string()),
        ..Default::default()
    };

    let stranger = address(77);
    let page = fixture.directory.list(&query, Some(&stranger)).await.unwrap();
    assert_eq!(page.rows.len(), 1);
    assert!(page.rows[0].email.as_deref().unwrap_or("").is_empty());

    let page = fixture.directory.list(&query, None).await.unwrap();
    assert!(page.rows[0].email.is_none());

    let page = fixture
        .directory
        .list(&query, Some(&pending.requested_by))
        .await
        .unwrap();
    assert_eq!(page.rows[0].email.as_deref(), Some("community1@example.org"));
}

#[tokio::test]
async fn pending_listing_hides_requesters_under_vote() {
    let fixture = Fixture::with_open_proposals(vec![requester_of(2)]);
    fixture.pending(1).await;
    fixture.pending(2).await;

    let page = fixture
        .list(ListQuery {
            status: Some("pending".to_string()),
            ..Default::default()
        })
        .await;
    assert_eq!(page.count, 1);
    assert_eq!(ids(&page), vec![1]);
    assert_eq!(page.rows[0].contract_address, Some(None));
}

#[tokio::test]
async fn single_lookup_accepts_every_identifier() {
    let fixture = Fixture::new();
    let record = fixture.community(4, None).await;
    fixture.metrics(4, 9, "0").await;

    let keys = [
        "4".to_string(),
        record.public_id.to_string(),
        record.contract_address.clone().unwrap().to_indexer_id(),
    ];
    for key in keys {
        let view = fixture.directory.find(&key, None).await.unwrap();
        assert_eq!(view.id, Some(4));
        assert_eq!(view.metrics.unwrap().beneficiaries, Some(9));
    }

    assert!(matches!(
        fixture.directory.find("999", None).await,
        Err(DirectoryError::CommunityNotFound(_))
    ));
}

#[tokio::test]
async fn grouped_counts_reject_unknown_keys() {
    let fixture = Fixture::new();
    fixture.community(1, None).await;
    fixture.community(2, None).await;
    fixture.community(4, None).await;

    let counts = fixture
        .directory
        .count_grouped(Some("country"))
        .await
        .unwrap();
    let pairs: Vec<_> = counts
        .iter()
        .map(|c| (c.country.clone().unwrap(), c.count))
        .collect();
    assert_eq!(pairs, vec![("BR".to_string(), 1), ("PT".to_string(), 2)]);

    assert!(matches!(
        fixture.directory.count_grouped(Some("city")).await,
        Err(DirectoryError::InvalidGroup(_))
    ));
}

#[tokio::test]
async fn removal_follows_the_status_lifecycle() {
    let fixture = Fixture::new();
    fixture.community(1, None).await;
    fixture.pending(2).await;

    fixture.directory.remove(1).await.unwrap();
    assert!(matches!(
        fixture.directory.remove(1).await,
        Err(DirectoryError::InvalidTransition { .. })
    ));
    assert!(matches!(
        fixture.directory.remove(2).await,
        Err(DirectoryError::InvalidTransition { .. })
    ));

    let page = fixture.list(ListQuery::default()).await;
    assert_eq!(page.count, 0);
}

/// Answers every call only after `delay`.
struct SlowIndexer {
    delay: std::time::Duration,
}

#[async_trait]
impl MetricsIndexer for SlowIndexer {
    async fn community_entities(
        &self,
        _query: &EntityQuery,
    ) -> Result<Vec<CommunityEntity>, IndexerError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }

    async fn communities_added_since(
        &self,
        _block: i64,
        _first: usize,
    ) -> Result<Vec<CommunityAdded>, IndexerError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn listing_fails_as_a_whole_when_the_deadline_passes() {
    let fixture = Fixture::new();
    fixture.community(1, None).await;
    let directory = Directory::new(
        Arc::new(fixture.store.clone()),
        Arc::new(SlowIndexer {
            delay: std::time::Duration::from_secs(30),
        }),
        Arc::new(StaticProposalSource::new(Vec::new())),
        ListingSettings {
            request_timeout: std::time::Duration::from_millis(50),
            ..Default::default()
        },
    );
    let result = directory.list(&query("bigger"), None).await;
    assert!(matches!(result, Err(DirectoryError::Timeout)));

    // store-owned orderings still hit the indexer while assembling metrics
    let result = directory.list(&query("newest"), None).await;
    assert!(matches!(result, Err(DirectoryError::Timeout)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn pagination_is_stable_and_gapless(
        beneficiaries in prop::collection::vec(prop::option::of(0i64..4), 1..12),
        limit in 1usize..5,
        order_by in prop::sample::select(vec!["bigger", "bigger:ASC", "newest", "updated:ASC", "out_of_funds"]),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let fixture = Fixture::new();
            for (i, count) in beneficiaries.iter().enumerate() {
                let id = i as i64 + 1;
                fixture.community(id, None).await;
                if let Some(count) = count {
                    fixture.metrics(id, *count, "0").await;
                }
            }

            let full = fixture
                .list(ListQuery {
                    order_by: Some(order_by.to_string()),
                    limit: Some(100),
                    ..Default::default()
                })
                .await;
            prop_assert_eq!(full.rows.len(), beneficiaries.len());

            let mut paged = Vec::new();
            let mut offset = 0;
            while offset < beneficiaries.len() {
                let page_query = ListQuery {
                    order_by: Some(order_by.to_string()),
                    offset: Some(offset),
                    limit: Some(limit),
                    ..Default::default()
                };
                let first = fixture.list(page_query.clone()).await;
                let again = fixture.list(page_query).await;
                prop_assert_eq!(ids(&first), ids(&again));
                paged.extend(ids(&first));
                offset += limit;
            }
            prop_assert_eq!(paged, ids(&full));
            Ok(())
        })?;
    }
}
