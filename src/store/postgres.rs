// Postgres-backed store

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use super::{CommunityStore, LocalOrder, StoreResult};
use crate::address::{CommunityLookup, NormalizedAddress};
use crate::error::DirectoryResult;
use crate::filter::{CommunityFilter, SearchTerm};
use crate::models::{
    CommunityContract, CommunityEdit, CommunityProposal, CommunityRecord, CommunityStatus,
    CommunitySuspect, CountGroup, GeoPoint, GroupCount, Media, MediaThumbnail, NewCommunity,
    RankingRow,
};
use crate::pagination::Page;
use crate::sort::Direction;

const COMMUNITY_COLUMNS: &str = "c.id, c.public_id, c.contract_address, c.requested_by, \
     c.name, c.description, c.language, c.currency, c.city, c.country, c.email, \
     c.latitude, c.longitude, c.visibility, c.status, c.review, c.cover_image, \
     c.cover_media_id, c.ambassador_address, c.created_at, c.updated_at, c.deleted_at";

const RANKING_COLUMNS: &str =
    "c.id, c.contract_address, c.latitude, c.longitude, c.created_at, c.updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects and brings the schema up to date.
    pub async fn connect(database_url: &str, max_connections: u32) -> DirectoryResult<Self> {
        info!("Connecting to database");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(Self { pool })
    }
}

fn decode_err<E>(e: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(e))
}

fn parse_address(raw: String) -> StoreResult<NormalizedAddress> {
    raw.parse().map_err(decode_err)
}

fn parse_optional_address(raw: Option<String>) -> StoreResult<Option<NormalizedAddress>> {
    raw.map(parse_address).transpose()
}

fn geo(latitude: Option<f64>, longitude: Option<f64>) -> Option<GeoPoint> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint {
            latitude,
            longitude,
        }),
        _ => None,
    }
}

#[derive(FromRow)]
struct CommunityRow {
    id: i64,
    public_id: Uuid,
    contract_address: Option<String>,
    requested_by: String,
    name: String,
    description: String,
    language: String,
    currency: String,
    city: String,
    country: String,
    email: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    visibility: String,
    status: String,
    review: String,
    cover_image: Option<String>,
    cover_media_id: Option<i64>,
    ambassador_address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<CommunityRow> for CommunityRecord {
    type Error = sqlx::Error;

    fn try_from(row: CommunityRow) -> Result<Self, Self::Error> {
        Ok(CommunityRecord {
            id: row.id,
            public_id: row.public_id,
            contract_address: parse_optional_address(row.contract_address)?,
            requested_by: parse_address(row.requested_by)?,
            name: row.name,
            description: row.description,
            language: row.language,
            currency: row.currency,
            city: row.city,
            country: row.country,
            email: row.email,
            gps: geo(row.latitude, row.longitude),
            visibility: row.visibility.parse().map_err(decode_err)?,
            status: row.status.parse().map_err(decode_err)?,
            review: row.review.parse().map_err(decode_err)?,
            cover_image: row.cover_image,
            cover_media_id: row.cover_media_id,
            ambassador_address: parse_optional_address(row.ambassador_address)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(FromRow)]
struct RankingRowRaw {
    id: i64,
    contract_address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RankingRowRaw> for RankingRow {
    type Error = sqlx::Error;

    fn try_from(row: RankingRowRaw) -> Result<Self, Self::Error> {
        Ok(RankingRow {
            id: row.id,
            contract_address: parse_optional_address(row.contract_address)?,
            gps: geo(row.latitude, row.longitude),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn records(rows: Vec<CommunityRow>) -> StoreResult<Vec<CommunityRecord>> {
    rows.into_iter().map(CommunityRecord::try_from).collect()
}

fn ranking(rows: Vec<RankingRowRaw>) -> StoreResult<Vec<RankingRow>> {
    rows.into_iter().map(RankingRow::try_from).collect()
}

/// Escapes LIKE wildcards so a name fragment only matches literally.
fn like_pattern(fragment: &str) -> String {
    let escaped = fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Appends the WHERE clause for `filter`. Every value is bound.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &CommunityFilter) {
    qb.push(" WHERE c.status = ").push_bind(filter.status.as_str());
    if filter.status != CommunityStatus::Removed {
        qb.push(" AND c.deleted_at IS NULL");
    }
    if let Some(visibility) = filter.visibility {
        qb.push(" AND c.visibility = ").push_bind(visibility.as_str());
    }
    if let Some(review) = filter.review {
        qb.push(" AND c.review = ").push_bind(review.as_str());
    }
    if !filter.countries.is_empty() {
        qb.push(" AND UPPER(c.country) = ANY(")
            .push_bind(filter.countries.clone())
            .push(")");
    }
    if !filter.exclude_countries.is_empty() {
        qb.push(" AND NOT (UPPER(c.country) = ANY(")
            .push_bind(filter.exclude_countries.clone())
            .push("))");
    }
    match &filter.search {
        Some(SearchTerm::Address(address)) => {
            qb.push(" AND (c.contract_address = ")
                .push_bind(address.as_str().to_string())
                .push(" OR c.requested_by = ")
                .push_bind(address.as_str().to_string())
                .push(")");
        }
        Some(SearchTerm::Name(name)) => {
            qb.push(" AND c.name ILIKE ").push_bind(like_pattern(name));
        }
        None => {}
    }
    if let Some(ambassador) = &filter.ambassador {
        qb.push(" AND c.ambassador_address = ")
            .push_bind(ambassador.as_str().to_string());
    }
    if let Some(label) = &filter.label {
        qb.push(
            " AND EXISTS (SELECT 1 FROM community_labels l \
             WHERE l.community_id = c.id AND l.label = ",
        )
        .push_bind(label.clone())
        .push(")");
    }
    if !filter.exclude_requesters.is_empty() {
        let requesters: Vec<String> = filter
            .exclude_requesters
            .iter()
            .map(|a| a.as_str().to_string())
            .collect();
        qb.push(" AND NOT (c.requested_by = ANY(")
            .push_bind(requesters)
            .push("))");
    }
}

fn order_column(order: LocalOrder) -> &'static str {
    match order {
        LocalOrder::CreatedAt => "c.created_at",
        LocalOrder::UpdatedAt => "c.updated_at",
    }
}

fn addresses_to_strings(addresses: &[NormalizedAddress]) -> Vec<String> {
    addresses.iter().map(|a| a.as_str().to_string()).collect()
}

#[async_trait]
impl CommunityStore for PgStore {
    async fn count(&self, filter: &CommunityFilter) -> StoreResult<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM communities c");
        push_filter(&mut qb, filter);
        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn ranking_rows(&self, filter: &CommunityFilter) -> StoreResult<Vec<RankingRow>> {
        let mut qb = QueryBuilder::new(format!("SELECT {} FROM communities c", RANKING_COLUMNS));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY c.id ASC");
        let rows = qb.build_query_as::<RankingRowRaw>().fetch_all(&self.pool).await?;
        ranking(rows)
    }

    async fn ranking_rows_page(
        &self,
        filter: &CommunityFilter,
        order: LocalOrder,
        direction: Direction,
        window: Option<Page>,
    ) -> StoreResult<Vec<RankingRow>> {
        let mut qb = QueryBuilder::new(format!("SELECT {} FROM communities c", RANKING_COLUMNS));
        push_filter(&mut qb, filter);
        qb.push(format!(
            " ORDER BY {} {}, c.id ASC",
            order_column(order),
            direction.as_str()
        ));
        if let Some(page) = window {
            qb.push(" LIMIT ")
                .push_bind(i64::try_from(page.limit).unwrap_or(i64::MAX))
                .push(" OFFSET ")
                .push_bind(i64::try_from(page.offset).unwrap_or(i64::MAX));
        }
        let rows = qb.build_query_as::<RankingRowRaw>().fetch_all(&self.pool).await?;
        ranking(rows)
    }

    async fn find_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<CommunityRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, CommunityRow>(&format!(
            "SELECT {} FROM communities c WHERE c.id = ANY($1)",
            COMMUNITY_COLUMNS
        ))
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        records(rows)
    }

    async fn find_one(&self, lookup: &CommunityLookup) -> StoreResult<Option<CommunityRecord>> {
        let mut qb = QueryBuilder::new(format!("SELECT {} FROM communities c WHERE ", COMMUNITY_COLUMNS));
        match lookup {
            CommunityLookup::Id(id) => {
                qb.push("c.id = ").push_bind(*id);
            }
            CommunityLookup::PublicId(public_id) => {
                qb.push("c.public_id = ").push_bind(*public_id);
            }
            CommunityLookup::ContractAddress(address) => {
                qb.push("c.contract_address = ")
                    .push_bind(address.as_str().to_string());
            }
        }
        let row = qb
            .build_query_as::<CommunityRow>()
            .fetch_optional(&self.pool)
            .await?;
        row.map(CommunityRecord::try_from).transpose()
    }

    async fn local_ids_for_addresses(
        &self,
        addresses: &[NormalizedAddress],
    ) -> StoreResult<HashMap<NormalizedAddress, i64>> {
        if addresses.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT contract_address, id FROM communities WHERE contract_address = ANY($1)",
        )
        .bind(addresses_to_strings(addresses))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(address, id)| Ok((parse_address(address)?, id)))
            .collect()
    }

    async fn covers(&self, media_ids: &[i64]) -> StoreResult<HashMap<i64, Media>> {
        if media_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let media: Vec<(i64, String, i32, i32)> =
            sqlx::query_as("SELECT id, url, width, height FROM media WHERE id = ANY($1)")
                .bind(media_ids.to_vec())
                .fetch_all(&self.pool)
                .await?;
        let thumbnails: Vec<(i64, String, i32, i32, i32)> = sqlx::query_as(
            "SELECT media_id, url, width, height, pixel_ratio FROM media_thumbnails \
             WHERE media_id = ANY($1) ORDER BY id",
        )
        .bind(media_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let mut out: HashMap<i64, Media> = media
            .into_iter()
            .map(|(id, url, width, height)| {
                (
                    id,
                    Media {
                        id,
                        url,
                        width,
                        height,
                        thumbnails: Vec::new(),
                    },
                )
            })
            .collect();
        for (media_id, url, width, height, pixel_ratio) in thumbnails {
            if let Some(media) = out.get_mut(&media_id) {
                media.thumbnails.push(MediaThumbnail {
                    url,
                    width,
                    height,
                    pixel_ratio,
                });
            }
        }
        Ok(out)
    }

    async fn contracts(&self, ids: &[i64]) -> StoreResult<HashMap<i64, CommunityContract>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(i64, BigDecimal, BigDecimal, i32, i32)> = sqlx::query_as(
            "SELECT DISTINCT ON (community_id) community_id, claim_amount, max_claim, \
             base_interval, increment_interval FROM community_contracts \
             WHERE community_id = ANY($1) ORDER BY community_id, id DESC",
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(
                |(community_id, claim_amount, max_claim, base_interval, increment_interval)| {
                    (
                        community_id,
                        CommunityContract {
                            community_id,
                            claim_amount,
                            max_claim,
                            base_interval,
                            increment_interval,
                        },
                    )
                },
            )
            .collect())
    }

    async fn suspects_since(
        &self,
        ids: &[i64],
        since: DateTime<Utc>,
    ) -> StoreResult<HashMap<i64, CommunitySuspect>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(i64, f64, i32, DateTime<Utc>)> = sqlx::query_as(
            "SELECT DISTINCT ON (community_id) community_id, percentage, suspect, created_at \
             FROM community_suspects WHERE community_id = ANY($1) AND created_at >= $2 \
             ORDER BY community_id, created_at DESC",
        )
        .bind(ids.to_vec())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(community_id, percentage, suspect, created_at)| {
                (
                    community_id,
                    CommunitySuspect {
                        community_id,
                        percentage,
                        suspect,
                        created_at,
                    },
                )
            })
            .collect())
    }

    async fn proposals(&self, ids: &[i64]) -> StoreResult<HashMap<i64, CommunityProposal>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT DISTINCT ON (community_id) community_id, proposal_id \
             FROM community_proposals WHERE community_id = ANY($1) \
             ORDER BY community_id, id DESC",
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(community_id, proposal_id)| {
                (
                    community_id,
                    CommunityProposal {
                        community_id,
                        proposal_id,
                    },
                )
            })
            .collect())
    }

    async fn managed_community_ids(&self, address: &NormalizedAddress) -> StoreResult<Vec<i64>> {
        sqlx::query_scalar::<_, i64>("SELECT community_id FROM managers WHERE address = $1 AND active")
            .bind(address.as_str())
            .fetch_all(&self.pool)
            .await
    }

    async fn count_grouped(&self, group: CountGroup) -> StoreResult<Vec<GroupCount>> {
        let sql = match group {
            CountGroup::Country => {
                "SELECT country, NULL::TEXT AS review, COUNT(*) FROM communities \
                 WHERE status = 'valid' AND deleted_at IS NULL \
                 GROUP BY country ORDER BY country"
            }
            CountGroup::Review => {
                "SELECT NULL::TEXT AS country, review, COUNT(*) FROM communities \
                 WHERE status = 'pending' AND deleted_at IS NULL \
                 GROUP BY review ORDER BY review"
            }
            CountGroup::ReviewByCountry => {
                "SELECT country, review, COUNT(*) FROM communities \
                 WHERE status = 'pending' AND deleted_at IS NULL \
                 GROUP BY country, review ORDER BY country, review"
            }
        };
        let rows: Vec<(Option<String>, Option<String>, i64)> =
            sqlx::query_as(sql).fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|(country, review, count)| {
                Ok(GroupCount {
                    country,
                    review: review.map(|r| r.parse()).transpose().map_err(decode_err)?,
                    count,
                })
            })
            .collect()
    }

    async fn create_community(&self, new: &NewCommunity) -> StoreResult<CommunityRecord> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, CommunityRow>(&format!(
            "INSERT INTO communities AS c (public_id, requested_by, name, description, \
             language, currency, city, country, email, latitude, longitude, visibility, \
             cover_media_id, ambassador_address) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {}",
            COMMUNITY_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new.requested_by.as_str())
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.language)
        .bind(&new.currency)
        .bind(&new.city)
        .bind(&new.country)
        .bind(&new.email)
        .bind(new.gps.latitude)
        .bind(new.gps.longitude)
        .bind(new.visibility.as_str())
        .bind(new.cover_media_id)
        .bind(new.ambassador_address.as_ref().map(NormalizedAddress::as_str))
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        CommunityRecord::try_from(row)
    }

    async fn accept_community(
        &self,
        id: i64,
        contract_address: &NormalizedAddress,
    ) -> StoreResult<Option<CommunityRecord>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, CommunityRow>(&format!(
            "UPDATE communities AS c SET status = 'valid', contract_address = $2, \
             updated_at = NOW() \
             WHERE c.id = $1 AND c.status = 'pending' AND c.contract_address IS NULL \
             RETURNING {}",
            COMMUNITY_COLUMNS
        ))
        .bind(id)
        .bind(contract_address.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        // the requester becomes the first manager
        sqlx::query(
            "INSERT INTO managers (community_id, address, active) VALUES ($1, $2, TRUE) \
             ON CONFLICT (community_id, address) DO UPDATE SET active = TRUE",
        )
        .bind(row.id)
        .bind(&row.requested_by)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        CommunityRecord::try_from(row).map(Some)
    }

    async fn update_community(
        &self,
        id: i64,
        edit: &CommunityEdit,
    ) -> StoreResult<Option<CommunityRecord>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, CommunityRow>(&format!(
            "UPDATE communities AS c SET \
             name = COALESCE($2, c.name), \
             description = COALESCE($3, c.description), \
             language = COALESCE($4, c.language), \
             currency = COALESCE($5, c.currency), \
             city = COALESCE($6, c.city), \
             country = COALESCE($7, c.country), \
             email = COALESCE($8, c.email), \
             latitude = COALESCE($9, c.latitude), \
             longitude = COALESCE($10, c.longitude), \
             visibility = COALESCE($11, c.visibility), \
             cover_media_id = COALESCE($12, c.cover_media_id), \
             review = COALESCE($13, c.review), \
             updated_at = NOW() \
             WHERE c.id = $1 AND c.deleted_at IS NULL \
             RETURNING {}",
            COMMUNITY_COLUMNS
        ))
        .bind(id)
        .bind(edit.name.as_deref())
        .bind(edit.description.as_deref())
        .bind(edit.language.as_deref())
        .bind(edit.currency.as_deref())
        .bind(edit.city.as_deref())
        .bind(edit.country.as_deref())
        .bind(edit.email.as_deref())
        .bind(edit.gps.map(|p| p.latitude))
        .bind(edit.gps.map(|p| p.longitude))
        .bind(edit.visibility.map(|v| v.as_str()))
        .bind(edit.cover_media_id)
        .bind(edit.review.map(|r| r.as_str()))
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        row.map(CommunityRecord::try_from).transpose()
    }

    async fn remove_community(&self, id: i64) -> StoreResult<Option<CommunityRecord>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, CommunityRow>(&format!(
            "UPDATE communities AS c SET status = 'removed', deleted_at = NOW(), \
             updated_at = NOW() WHERE c.id = $1 AND c.status = 'valid' RETURNING {}",
            COMMUNITY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(row) = &row {
            sqlx::query("UPDATE managers SET active = FALSE WHERE community_id = $1")
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        row.map(CommunityRecord::try_from).transpose()
    }

    async fn find_pending_by_requester(
        &self,
        requester: &NormalizedAddress,
    ) -> StoreResult<Option<CommunityRecord>> {
        let row = sqlx::query_as::<_, CommunityRow>(&format!(
            "SELECT {} FROM communities c WHERE c.requested_by = $1 \
             AND c.status = 'pending' AND c.deleted_at IS NULL \
             ORDER BY c.created_at ASC, c.id ASC LIMIT 1",
            COMMUNITY_COLUMNS
        ))
        .bind(requester.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(CommunityRecord::try_from).transpose()
    }

    async fn load_cursor(&self) -> StoreResult<Option<i64>> {
        sqlx::query_scalar::<_, i64>("SELECT last_block FROM indexer_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
    }

    async fn save_cursor(&self, block: i64) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO indexer_state (id, last_block, updated_at) \
             VALUES (1, $1, NOW()) \
             ON CONFLICT (id) DO UPDATE SET last_block = $1, updated_at = NOW()",
        )
        .bind(block)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::to_checksum;
    use crate::models::Review;

    #[test]
    fn filter_values_are_bound_not_interpolated() {
        let filter = CommunityFilter {
            review: Some(Review::Claimed),
            countries: vec!["PT".to_string()],
            exclude_countries: vec!["BR".to_string()],
            search: Some(SearchTerm::Name("x' OR 1=1".to_string())),
            label: Some("featured".to_string()),
            exclude_requesters: vec![
                to_checksum("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap(),
            ],
            ..Default::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM communities c");
        push_filter(&mut qb, &filter);
        let sql = qb.sql();

        assert!(sql.contains("c.status = $1"));
        assert!(sql.contains("c.deleted_at IS NULL"));
        assert!(sql.contains("c.name ILIKE $"));
        assert!(!sql.contains("OR 1=1"));
        assert!(!sql.contains("featured"));
        assert!(!sql.contains("PT"));
    }

    #[test]
    fn removed_listing_includes_soft_deleted_rows() {
        let filter = CommunityFilter {
            status: CommunityStatus::Removed,
            ..Default::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM communities c");
        push_filter(&mut qb, &filter);
        assert!(!qb.sql().contains("deleted_at"));
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(like_pattern("100%_x"), "%100\\%\\_x%");
    }
}
