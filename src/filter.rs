// Compiles raw listing filters into a store-agnostic predicate

use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::address::{looks_like_address, to_checksum, NormalizedAddress};
use crate::error::{DirectoryError, DirectoryResult};
use crate::governance::ProposalSource;
use crate::models::{CommunityStatus, GeoPoint, Review, Visibility};
use crate::sort::SortChain;

/// Substrings never accepted in free-text search.
const SEARCH_DENYLIST: &[&str] = &[
    "--", ";", "/*", "*/", "'", "\"", "\\", "xp_", "@@", "union ", "select ", "drop ",
    "insert ", "delete ", "update ", "truncate ", "exec ",
];

const MAX_SEARCH_LEN: usize = 128;

/// Raw listing request as received over HTTP.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub country: Option<String>,
    pub exclude_country: Option<String>,
    pub search: Option<String>,
    pub review: Option<String>,
    pub status: Option<String>,
    pub ambassador_address: Option<String>,
    /// Label filter, e.g. `featured`
    pub filter: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub order_by: Option<String>,
    pub fields: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerm {
    Address(NormalizedAddress),
    /// Normalized name fragment, matched case-insensitively
    Name(String),
}

/// Typed predicate over communities. Stores translate it to their own query
/// language; nothing here is ever spliced into a query string.
#[derive(Debug, Clone, PartialEq)]
pub struct CommunityFilter {
    pub status: CommunityStatus,
    pub visibility: Option<Visibility>,
    pub review: Option<Review>,
    pub countries: Vec<String>,
    pub exclude_countries: Vec<String>,
    pub search: Option<SearchTerm>,
    pub ambassador: Option<NormalizedAddress>,
    pub label: Option<String>,
    /// Requesters with an open governance proposal (pending listings only)
    pub exclude_requesters: Vec<NormalizedAddress>,
}

impl Default for CommunityFilter {
    fn default() -> Self {
        Self {
            status: CommunityStatus::Valid,
            visibility: Some(Visibility::Public),
            review: None,
            countries: Vec::new(),
            exclude_countries: Vec::new(),
            search: None,
            ambassador: None,
            label: None,
            exclude_requesters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub filter: CommunityFilter,
    pub origin: Option<GeoPoint>,
    /// Governance source was unreachable; exclusions could not be applied
    pub degraded: bool,
}

pub struct FilterCompiler {
    proposals: Arc<dyn ProposalSource>,
}

impl FilterCompiler {
    pub fn new(proposals: Arc<dyn ProposalSource>) -> Self {
        Self { proposals }
    }

    pub async fn compile(
        &self,
        query: &ListQuery,
        chain: &SortChain,
    ) -> DirectoryResult<CompiledFilter> {
        let origin = compile_origin(query.lat, query.lng, chain)?;

        let status = match query.status.as_deref() {
            Some(raw) => raw
                .parse::<CommunityStatus>()
                .map_err(|e| DirectoryError::InvalidFilter(e.to_string()))?,
            None => CommunityStatus::Valid,
        };
        let review = query
            .review
            .as_deref()
            .map(str::parse::<Review>)
            .transpose()
            .map_err(|e| DirectoryError::InvalidFilter(e.to_string()))?;
        let ambassador = query
            .ambassador_address
            .as_deref()
            .map(to_checksum)
            .transpose()?;
        let search = query.search.as_deref().map(compile_search).transpose()?;

        let label = query
            .filter
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut filter = CommunityFilter {
            status,
            // ambassadors also see the private communities they look after
            visibility: if ambassador.is_some() {
                None
            } else {
                Some(Visibility::Public)
            },
            review,
            countries: split_countries(query.country.as_deref()),
            exclude_countries: split_countries(query.exclude_country.as_deref()),
            search,
            ambassador,
            label,
            exclude_requesters: Vec::new(),
        };

        let mut degraded = false;
        if status == CommunityStatus::Pending {
            match self.proposals.open_proposal_requesters().await {
                Ok(requesters) => filter.exclude_requesters = requesters,
                Err(e) => {
                    warn!("Governance source unavailable, listing pending communities unfiltered: {}", e);
                    degraded = true;
                }
            }
        }

        Ok(CompiledFilter {
            filter,
            origin,
            degraded,
        })
    }
}

fn compile_origin(
    lat: Option<f64>,
    lng: Option<f64>,
    chain: &SortChain,
) -> DirectoryResult<Option<GeoPoint>> {
    let origin = match (lat, lng) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint {
            latitude,
            longitude,
        }),
        _ => None,
    };
    match origin {
        Some(point) if point.is_valid() => Ok(Some(point)),
        Some(_) => Err(DirectoryError::InvalidCoordinates),
        None if chain.requires_origin() => Err(DirectoryError::InvalidCoordinates),
        None => Ok(None),
    }
}

/// Classifies free text as an address or a name fragment.
pub fn compile_search(raw: &str) -> DirectoryResult<SearchTerm> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return Err(DirectoryError::InvalidSearchInput("empty search".to_string()));
    }
    if looks_like_address(&normalized) {
        return to_checksum(&normalized).map(SearchTerm::Address);
    }
    if normalized.chars().count() > MAX_SEARCH_LEN {
        return Err(DirectoryError::InvalidSearchInput("search too long".to_string()));
    }
    let lowered = normalized.to_lowercase();
    if let Some(hit) = SEARCH_DENYLIST.iter().find(|d| lowered.contains(*d)) {
        return Err(DirectoryError::InvalidSearchInput(format!(
            "contains forbidden sequence {:?}",
            hit.trim()
        )));
    }
    Ok(SearchTerm::Name(normalized))
}

fn split_countries(raw: Option<&str>) -> Vec<String> {
    raw.map(|r| {
        r.split(';')
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect()
    })
    .unwrap_or_default()
}
