// Metrics subgraph client

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::graphql::GraphqlClient;
use super::{CommunityAdded, CommunityEntity, EntityQuery, MetricsIndexer};
use crate::error::IndexerError;

const COMMUNITY_ENTITIES: &str = r#"
query CommunityEntities(
  $first: Int!
  $skip: Int!
  $orderBy: CommunityEntity_orderBy!
  $orderDirection: OrderDirection!
  $where: CommunityEntity_filter
) {
  communityEntities(
    first: $first
    skip: $skip
    orderBy: $orderBy
    orderDirection: $orderDirection
    where: $where
  ) {
    id
    state
    beneficiaries
    removedBeneficiaries
    claimed
    contributed
    contributors
    managers
    baseInterval
    estimatedFunds
  }
}
"#;

const COMMUNITIES_ADDED: &str = r#"
query CommunitiesAdded($first: Int!, $where: CommunityEntity_filter) {
  communityEntities(first: $first, orderBy: startBlock, orderDirection: asc, where: $where) {
    id
    startBlock
    managerList
  }
}
"#;

#[derive(Debug, Deserialize)]
struct EntityPage {
    #[serde(rename = "communityEntities")]
    community_entities: Vec<CommunityEntity>,
}

#[derive(Debug, Deserialize)]
struct AddedPage {
    #[serde(rename = "communityEntities")]
    community_entities: Vec<AddedEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddedEntity {
    id: String,
    start_block: String,
    #[serde(default)]
    manager_list: Vec<String>,
}

pub struct SubgraphClient {
    client: GraphqlClient,
}

impl SubgraphClient {
    pub fn new(client: GraphqlClient) -> Self {
        Self { client }
    }
}

fn where_clause(query: &EntityQuery) -> Value {
    let mut filter = Map::new();
    if let Some(ids) = &query.id_in {
        filter.insert("id_in".to_string(), json!(ids));
    }
    if let Some(state) = query.state {
        filter.insert("state".to_string(), json!(state));
    }
    Value::Object(filter)
}

#[async_trait]
impl MetricsIndexer for SubgraphClient {
    async fn community_entities(
        &self,
        query: &EntityQuery,
    ) -> Result<Vec<CommunityEntity>, IndexerError> {
        let variables = json!({
            "first": query.first,
            "skip": query.skip,
            "orderBy": query.order_by,
            "orderDirection": query.direction.as_str(),
            "where": where_clause(query),
        });

        let page: EntityPage = self.client.query(COMMUNITY_ENTITIES, variables).await?;
        debug!(
            "Indexer returned {} community entities (skip {}, first {})",
            page.community_entities.len(),
            query.skip,
            query.first
        );
        Ok(page.community_entities)
    }

    async fn communities_added_since(
        &self,
        block: i64,
        first: usize,
    ) -> Result<Vec<CommunityAdded>, IndexerError> {
        let variables = json!({
            "first": first,
            "where": { "startBlock_gt": block.to_string() },
        });

        let page: AddedPage = self.client.query(COMMUNITIES_ADDED, variables).await?;

        let mut added = Vec::with_capacity(page.community_entities.len());
        for entity in page.community_entities {
            let block: i64 = entity.start_block.parse().map_err(|_| {
                IndexerError::Payload(format!("bad startBlock {}", entity.start_block))
            })?;
            match entity.manager_list.first() {
                Some(requester) => added.push(CommunityAdded {
                    id: entity.id,
                    requester: requester.clone(),
                    block,
                }),
                None => warn!("Community {} added without managers", entity.id),
            }
        }
        Ok(added)
    }

    async fn ping(&self) -> bool {
        self.client.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{EntityOrder, STATE_VALID};
    use crate::sort::Direction;

    #[test]
    fn where_clause_carries_only_given_filters() {
        let query = EntityQuery {
            order_by: EntityOrder::Beneficiaries,
            direction: Direction::Desc,
            first: 10,
            skip: 0,
            id_in: None,
            state: None,
        };
        assert_eq!(where_clause(&query), json!({}));

        let query = EntityQuery {
            id_in: Some(vec!["0xabc".to_string()]),
            state: Some(STATE_VALID),
            ..query
        };
        assert_eq!(
            where_clause(&query),
            json!({ "id_in": ["0xabc"], "state": 0 })
        );
    }

    #[test]
    fn entity_defaults_missing_metrics_to_zero() {
        let entity: CommunityEntity =
            serde_json::from_value(json!({ "id": "0xabc", "beneficiaries": 4 })).unwrap();
        assert_eq!(entity.beneficiaries, 4);
        assert_eq!(entity.claimed, "0");
        assert_eq!(entity.estimated_funds, "0");
    }
}
