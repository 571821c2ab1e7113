// Resolves a sort-key chain across the local store and the indexer
//
// The two sources cannot be joined, so ranking is staged: the first key
// orders the full filtered scope and owns pagination; every later key only
// re-orders ties inside the page the first stage produced.

use bigdecimal::BigDecimal;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::address::NormalizedAddress;
use crate::error::{DirectoryError, DirectoryResult, IndexerError};
use crate::filter::CommunityFilter;
use crate::geo;
use crate::metrics::{MetricKey, MetricsProvider, Scope};
use crate::models::{GeoPoint, RankingRow};
use crate::pagination::{Page, PaginationReconciler, ScopeOwner};
use crate::sort::{Direction, SortChain, SortCriterion, SortKey};
use crate::store::{CommunityStore, LocalOrder};

/// One key's value for one community.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Integer(i64),
    Amount(BigDecimal),
    Distance(f64),
    /// No value available (e.g. no coordinates); always sorts last
    Missing,
}

impl SortValue {
    pub fn compare(&self, other: &SortValue, direction: Direction) -> Ordering {
        match (self, other) {
            (SortValue::Missing, SortValue::Missing) => Ordering::Equal,
            (SortValue::Missing, _) => Ordering::Greater,
            (_, SortValue::Missing) => Ordering::Less,
            (SortValue::Integer(a), SortValue::Integer(b)) => direction.apply(a.cmp(b)),
            (SortValue::Amount(a), SortValue::Amount(b)) => direction.apply(a.cmp(b)),
            (SortValue::Distance(a), SortValue::Distance(b)) => direction.apply(a.total_cmp(b)),
            _ => Ordering::Equal,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    row: RankingRow,
    keys: Vec<SortValue>,
}

impl Entry {
    fn new(row: RankingRow, value: SortValue) -> Self {
        Self {
            row,
            keys: vec![value],
        }
    }

    fn ties_with(&self, other: &Entry) -> bool {
        self.keys.len() == other.keys.len()
            && self
                .keys
                .iter()
                .zip(&other.keys)
                .all(|(a, b)| a.compare(b, Direction::Asc) == Ordering::Equal)
    }
}

/// Final ordered id slice for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedPage {
    pub ids: Vec<i64>,
    /// An indexer call failed and local ordering stood in for it
    pub degraded: bool,
}

pub struct RankingComposer<'a> {
    store: &'a dyn CommunityStore,
    metrics: &'a MetricsProvider,
}

impl<'a> RankingComposer<'a> {
    pub fn new(store: &'a dyn CommunityStore, metrics: &'a MetricsProvider) -> Self {
        Self { store, metrics }
    }

    pub async fn compose(
        &self,
        filter: &CommunityFilter,
        chain: &SortChain,
        origin: Option<GeoPoint>,
        page: Page,
    ) -> DirectoryResult<RankedPage> {
        let chain = chain.or_default();
        let Some((primary, tie_breaks)) = chain.keys().split_first() else {
            return Ok(RankedPage {
                ids: Vec::new(),
                degraded: false,
            });
        };

        let mut degraded = false;
        let mut entries = self
            .primary(*primary, filter, origin, page, &mut degraded)
            .await?;

        for key in tie_breaks {
            self.tie_break(*key, &mut entries, origin, &mut degraded)
                .await?;
        }

        debug!("Ranked {} communities by {}", entries.len(), chain);
        Ok(RankedPage {
            ids: entries.into_iter().map(|e| e.row.id).collect(),
            degraded,
        })
    }

    async fn primary(
        &self,
        key: SortKey,
        filter: &CommunityFilter,
        origin: Option<GeoPoint>,
        page: Page,
        degraded: &mut bool,
    ) -> DirectoryResult<Vec<Entry>> {
        match key.criterion {
            SortCriterion::Nearest => {
                let origin = origin.ok_or(DirectoryError::InvalidCoordinates)?;
                let rows = self.store.ranking_rows(filter).await?;
                Ok(self.nearest(origin, key.direction, rows, page))
            }
            SortCriterion::Newest => self.local(LocalOrder::CreatedAt, key.direction, filter, page).await,
            SortCriterion::Updated => self.local(LocalOrder::UpdatedAt, key.direction, filter, page).await,
            SortCriterion::Bigger => {
                self.metric(MetricKey::Beneficiaries, key.direction, filter, page, degraded)
                    .await
            }
            SortCriterion::OutOfFunds => {
                self.metric(MetricKey::EstimatedFunds, key.direction, filter, page, degraded)
                    .await
            }
        }
    }

    /// Distance needs every coordinate, so the composer owns the slice.
    fn nearest(
        &self,
        origin: GeoPoint,
        direction: Direction,
        rows: Vec<RankingRow>,
        page: Page,
    ) -> Vec<Entry> {
        let reconciler = PaginationReconciler::new(ScopeOwner::Composer, page);
        let mut entries: Vec<Entry> = rows
            .into_iter()
            .map(|row| {
                let value = distance_value(origin, &row);
                Entry::new(row, value)
            })
            .collect();
        // stable: equal distances keep id order, unlocated communities go last
        entries.sort_by(|a, b| a.keys[0].compare(&b.keys[0], direction));
        reconciler.apply(entries)
    }

    /// Timestamp orderings: the store owns the slice.
    async fn local(
        &self,
        order: LocalOrder,
        direction: Direction,
        filter: &CommunityFilter,
        page: Page,
    ) -> DirectoryResult<Vec<Entry>> {
        let reconciler = PaginationReconciler::new(ScopeOwner::Store, page);
        let rows = self
            .store
            .ranking_rows_page(filter, order, direction, reconciler.window_for(ScopeOwner::Store))
            .await?;
        Ok(reconciler.apply(
            rows.into_iter()
                .map(|row| {
                    let value = local_value(order, &row);
                    Entry::new(row, value)
                })
                .collect(),
        ))
    }

    /// Indexer metrics: the indexer owns the slice over the ranked segment.
    /// Communities it has no record for (no address yet, or not indexed yet)
    /// count as zero. They form an id-ordered segment that leads an ascending
    /// ranking and trails a descending one, sliced by what is left of the
    /// window.
    async fn metric(
        &self,
        key: MetricKey,
        direction: Direction,
        filter: &CommunityFilter,
        page: Page,
        degraded: &mut bool,
    ) -> DirectoryResult<Vec<Entry>> {
        let universe = self.store.ranking_rows(filter).await?;
        let addresses: Vec<NormalizedAddress> = universe
            .iter()
            .filter_map(|r| r.contract_address.clone())
            .collect();

        let known = match self.metrics.snapshots(&addresses).await {
            Ok(known) => known,
            Err(e) => return Ok(local_fallback(e, universe, page, degraded)),
        };
        let indexed = universe
            .iter()
            .filter(|r| {
                r.contract_address
                    .as_ref()
                    .is_some_and(|a| known.contains_key(a))
            })
            .count();
        let unindexed = universe.len() - indexed;

        let reconciler = PaginationReconciler::new(ScopeOwner::Indexer, page);
        let (ranked_window, zero_window) = match direction {
            Direction::Asc => (reconciler.residual(unindexed), Some(page)),
            Direction::Desc => (
                reconciler.window_for(ScopeOwner::Indexer),
                reconciler.residual(indexed),
            ),
        };

        let ranked = match ranked_window {
            Some(window) => {
                match self
                    .metrics
                    .rank(key, direction, Scope::Restricted(&addresses), Some(window))
                    .await
                {
                    Ok(ranked) => ranked,
                    Err(e) => return Ok(local_fallback(e, universe, page, degraded)),
                }
            }
            None => Vec::new(),
        };

        let mut by_address: HashMap<NormalizedAddress, RankingRow> = HashMap::new();
        let mut zero_rows = Vec::new();
        for row in universe {
            match &row.contract_address {
                Some(address) if known.contains_key(address) => {
                    by_address.insert(address.clone(), row);
                }
                _ => zero_rows.push(row),
            }
        }

        let ranked: Vec<Entry> = ranked
            .into_iter()
            .filter_map(|r| by_address.remove(&r.address).map(|row| Entry::new(row, r.value)))
            .collect();
        let zeros: Vec<Entry> = match zero_window {
            Some(window) => PaginationReconciler::new(ScopeOwner::Composer, window)
                .apply(zero_rows)
                .into_iter()
                .map(|row| Entry::new(row, key.zero()))
                .collect(),
            None => Vec::new(),
        };

        Ok(match direction {
            Direction::Asc => zeros.into_iter().chain(ranked).collect(),
            Direction::Desc => ranked.into_iter().chain(zeros).collect(),
        })
    }

    /// Re-orders runs of entries that tie on every earlier key. Never slices.
    async fn tie_break(
        &self,
        key: SortKey,
        entries: &mut Vec<Entry>,
        origin: Option<GeoPoint>,
        degraded: &mut bool,
    ) -> DirectoryResult<()> {
        let values: Vec<SortValue> = match key.criterion {
            SortCriterion::Nearest => {
                let origin = origin.ok_or(DirectoryError::InvalidCoordinates)?;
                entries.iter().map(|e| distance_value(origin, &e.row)).collect()
            }
            SortCriterion::Newest => entries
                .iter()
                .map(|e| local_value(LocalOrder::CreatedAt, &e.row))
                .collect(),
            SortCriterion::Updated => entries
                .iter()
                .map(|e| local_value(LocalOrder::UpdatedAt, &e.row))
                .collect(),
            SortCriterion::Bigger => {
                self.metric_values(MetricKey::Beneficiaries, key.direction, entries, degraded)
                    .await
            }
            SortCriterion::OutOfFunds => {
                self.metric_values(MetricKey::EstimatedFunds, key.direction, entries, degraded)
                    .await
            }
        };

        let mut groups = Vec::with_capacity(entries.len());
        let mut group = 0usize;
        for (i, entry) in entries.iter().enumerate() {
            if i > 0 && !entries[i - 1].ties_with(entry) {
                group += 1;
            }
            groups.push(group);
        }

        let mut keyed: Vec<(usize, Entry)> = groups
            .into_iter()
            .zip(entries.drain(..).zip(values))
            .map(|(group, (mut entry, value))| {
                entry.keys.push(value);
                (group, entry)
            })
            .collect();

        // stable: equal values keep the order of the previous stage
        keyed.sort_by(|(ga, a), (gb, b)| {
            ga.cmp(gb).then_with(|| {
                let va = a.keys.last().unwrap_or(&SortValue::Missing);
                let vb = b.keys.last().unwrap_or(&SortValue::Missing);
                va.compare(vb, key.direction)
            })
        });
        entries.extend(keyed.into_iter().map(|(_, e)| e));
        Ok(())
    }

    async fn metric_values(
        &self,
        key: MetricKey,
        direction: Direction,
        entries: &[Entry],
        degraded: &mut bool,
    ) -> Vec<SortValue> {
        let addresses: Vec<NormalizedAddress> = entries
            .iter()
            .filter_map(|e| e.row.contract_address.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        match self
            .metrics
            .rank(key, direction, Scope::Restricted(&addresses), None)
            .await
        {
            Ok(ranked) => {
                let values: HashMap<NormalizedAddress, SortValue> =
                    ranked.into_iter().map(|r| (r.address, r.value)).collect();
                entries
                    .iter()
                    .map(|e| {
                        e.row
                            .contract_address
                            .as_ref()
                            .and_then(|a| values.get(a).cloned())
                            .unwrap_or_else(|| key.zero())
                    })
                    .collect()
            }
            Err(e) => {
                warn!("Indexer unavailable, tie-break skipped: {}", e);
                *degraded = true;
                vec![SortValue::Missing; entries.len()]
            }
        }
    }
}

/// Id order over the whole universe, sliced locally, when the indexer is down.
fn local_fallback(
    error: IndexerError,
    universe: Vec<RankingRow>,
    page: Page,
    degraded: &mut bool,
) -> Vec<Entry> {
    warn!("Indexer unavailable, falling back to local ordering: {}", error);
    *degraded = true;
    PaginationReconciler::new(ScopeOwner::Composer, page).apply(
        universe
            .into_iter()
            .map(|row| Entry::new(row, SortValue::Missing))
            .collect(),
    )
}

fn distance_value(origin: GeoPoint, row: &RankingRow) -> SortValue {
    row.gps
        .map(|p| SortValue::Distance(geo::distance_km(origin, p)))
        .unwrap_or(SortValue::Missing)
}

fn local_value(order: LocalOrder, row: &RankingRow) -> SortValue {
    match order {
        LocalOrder::CreatedAt => SortValue::Integer(row.created_at.timestamp_millis()),
        LocalOrder::UpdatedAt => SortValue::Integer(row.updated_at.timestamp_millis()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_sort_last_in_both_directions() {
        let a = SortValue::Integer(1);
        assert_eq!(a.compare(&SortValue::Missing, Direction::Asc), Ordering::Less);
        assert_eq!(a.compare(&SortValue::Missing, Direction::Desc), Ordering::Less);
        assert_eq!(
            SortValue::Integer(1).compare(&SortValue::Integer(2), Direction::Desc),
            Ordering::Greater
        );
    }
}
