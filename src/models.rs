// Domain models for the community directory

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::address::NormalizedAddress;

/// Lifecycle status. Only `pending -> valid` and `valid -> removed` exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunityStatus {
    Pending,
    Valid,
    Removed,
}

impl CommunityStatus {
    pub fn can_transition_to(self, next: CommunityStatus) -> bool {
        matches!(
            (self, next),
            (CommunityStatus::Pending, CommunityStatus::Valid)
                | (CommunityStatus::Valid, CommunityStatus::Removed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommunityStatus::Pending => "pending",
            CommunityStatus::Valid => "valid",
            CommunityStatus::Removed => "removed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Review {
    Pending,
    Claimed,
    Declined,
    Accepted,
}

impl Review {
    pub fn as_str(self) -> &'static str {
        match self {
            Review::Pending => "pending",
            Review::Claimed => "claimed",
            Review::Declined => "declined",
            Review::Accepted => "accepted",
        }
    }
}

/// Error for text columns or query params that don't name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant: {}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! text_enum {
    ($ty:ident { $($text:literal => $variant:ident),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(CommunityStatus { "pending" => Pending, "valid" => Valid, "removed" => Removed });
text_enum!(Visibility { "public" => Public, "private" => Private });
text_enum!(Review {
    "pending" => Pending,
    "claimed" => Claimed,
    "declined" => Declined,
    "accepted" => Accepted,
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Canonical community record as stored locally.
#[derive(Debug, Clone, PartialEq)]
pub struct CommunityRecord {
    pub id: i64,
    pub public_id: Uuid,
    pub contract_address: Option<NormalizedAddress>,
    pub requested_by: NormalizedAddress,
    pub name: String,
    pub description: String,
    pub language: String,
    pub currency: String,
    pub city: String,
    pub country: String,
    pub email: String,
    pub gps: Option<GeoPoint>,
    pub visibility: Visibility,
    pub status: CommunityStatus,
    pub review: Review,
    /// Legacy inline cover path, superseded by `cover_media_id`
    pub cover_image: Option<String>,
    pub cover_media_id: Option<i64>,
    pub ambassador_address: Option<NormalizedAddress>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// The light columns the ranking stages need.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingRow {
    pub id: i64,
    pub contract_address: Option<NormalizedAddress>,
    pub gps: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CommunityRecord> for RankingRow {
    fn from(record: &CommunityRecord) -> Self {
        Self {
            id: record.id,
            contract_address: record.contract_address.clone(),
            gps: record.gps,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaThumbnail {
    pub url: String,
    pub width: i32,
    pub height: i32,
    pub pixel_ratio: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub id: i64,
    pub url: String,
    pub width: i32,
    pub height: i32,
    pub thumbnails: Vec<MediaThumbnail>,
}

/// Most recent contract parameters snapshot; amounts in base units.
#[derive(Debug, Clone, PartialEq)]
pub struct CommunityContract {
    pub community_id: i64,
    pub claim_amount: BigDecimal,
    pub max_claim: BigDecimal,
    pub base_interval: i32,
    pub increment_interval: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommunitySuspect {
    pub community_id: i64,
    pub percentage: f64,
    pub suspect: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommunityProposal {
    pub community_id: i64,
    pub proposal_id: i64,
}

/// Point-in-time metrics read from the indexer. Amounts are base units.
/// `Default` is the zero snapshot used when the indexer has no record yet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricsSnapshot {
    pub beneficiaries: i64,
    pub removed_beneficiaries: i64,
    pub claimed: BigDecimal,
    pub contributed: BigDecimal,
    pub contributors: i64,
    pub managers: i64,
    pub base_interval: i64,
    pub estimated_funds: BigDecimal,
}

/// Write-path request for a new (pending) community.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommunity {
    pub requested_by: NormalizedAddress,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub language: String,
    pub currency: String,
    pub city: String,
    pub country: String,
    pub email: String,
    pub gps: GeoPoint,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
    pub cover_media_id: Option<i64>,
    pub ambassador_address: Option<NormalizedAddress>,
}

fn default_visibility() -> Visibility {
    Visibility::Public
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityEdit {
    pub name: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub currency: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub email: Option<String>,
    pub gps: Option<GeoPoint>,
    pub visibility: Option<Visibility>,
    pub cover_media_id: Option<i64>,
    pub review: Option<Review>,
}

/// Supported `groupBy` keys for grouped counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountGroup {
    Country,
    Review,
    ReviewByCountry,
}

impl FromStr for CountGroup {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "country" => Ok(CountGroup::Country),
            "review" => Ok(CountGroup::Review),
            "reviewByCountry" => Ok(CountGroup::ReviewByCountry),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<Review>,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_moves_forward_only() {
        use CommunityStatus::*;
        assert!(Pending.can_transition_to(Valid));
        assert!(Valid.can_transition_to(Removed));
        assert!(!Pending.can_transition_to(Removed));
        assert!(!Valid.can_transition_to(Pending));
        assert!(!Removed.can_transition_to(Valid));
        assert!(!Valid.can_transition_to(Valid));
    }

    #[test]
    fn parses_text_variants() {
        assert_eq!("VALID".parse::<CommunityStatus>().unwrap(), CommunityStatus::Valid);
        assert_eq!("claimed".parse::<Review>().unwrap(), Review::Claimed);
        assert!("archived".parse::<Visibility>().is_err());
        assert!("city".parse::<CountGroup>().is_err());
    }
}
