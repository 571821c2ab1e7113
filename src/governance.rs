// Open governance proposals, used to hide pending communities already under vote

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::address::{to_checksum, NormalizedAddress};
use crate::error::IndexerError;
use crate::indexer::graphql::GraphqlClient;

const PAGE_SIZE: usize = 1000;
const ADD_COMMUNITY_SIGNATURE: &str = "addCommunity(";

/// Source of requesters whose community already has an open proposal.
#[async_trait]
pub trait ProposalSource: Send + Sync {
    async fn open_proposal_requesters(&self) -> Result<Vec<NormalizedAddress>, IndexerError>;
}

const OPEN_PROPOSALS: &str = r#"
query OpenProposals($first: Int!, $skip: Int!, $where: ProposalEntity_filter) {
  proposalEntities(first: $first, skip: $skip, where: $where, orderBy: id) {
    id
    signatures
    calldatas
  }
}
"#;

#[derive(Debug, Deserialize)]
struct ProposalPage {
    #[serde(rename = "proposalEntities")]
    proposal_entities: Vec<ProposalEntity>,
}

#[derive(Debug, Deserialize)]
struct ProposalEntity {
    id: String,
    signatures: Vec<String>,
    calldatas: Vec<String>,
}

/// Reads open proposals from the DAO subgraph.
pub struct SubgraphProposalSource {
    client: GraphqlClient,
}

impl SubgraphProposalSource {
    pub fn new(client: GraphqlClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProposalSource for SubgraphProposalSource {
    async fn open_proposal_requesters(&self) -> Result<Vec<NormalizedAddress>, IndexerError> {
        let mut requesters = Vec::new();
        let mut skip = 0;

        loop {
            let page: ProposalPage = self
                .client
                .query(
                    OPEN_PROPOSALS,
                    json!({
                        "first": PAGE_SIZE,
                        "skip": skip,
                        "where": { "status": 0 },
                    }),
                )
                .await?;
            let fetched = page.proposal_entities.len();

            for proposal in page.proposal_entities {
                for (signature, calldata) in proposal.signatures.iter().zip(&proposal.calldatas) {
                    if !signature.starts_with(ADD_COMMUNITY_SIGNATURE) {
                        continue;
                    }
                    match decode_requester(calldata) {
                        Ok(requester) => requesters.push(requester),
                        Err(reason) => warn!(
                            "Skipping proposal {}: unreadable addCommunity calldata ({})",
                            proposal.id, reason
                        ),
                    }
                }
            }

            if fetched < PAGE_SIZE {
                break;
            }
            skip += fetched;
        }

        debug!("Found {} open addCommunity proposals", requesters.len());
        Ok(requesters)
    }
}

/// Fixed requester list for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticProposalSource {
    requesters: Vec<NormalizedAddress>,
}

impl StaticProposalSource {
    pub fn new(requesters: Vec<NormalizedAddress>) -> Self {
        Self { requesters }
    }
}

#[async_trait]
impl ProposalSource for StaticProposalSource {
    async fn open_proposal_requesters(&self) -> Result<Vec<NormalizedAddress>, IndexerError> {
        Ok(self.requesters.clone())
    }
}

/// Extracts the first manager from ABI-encoded `addCommunity(address[],...)`
/// arguments. The managers array is the first, dynamic, argument; its head
/// word holds the offset to `[length, element0, ...]`. Every offset and the
/// address padding are checked so a changed tuple layout is rejected rather
/// than misread.
pub fn decode_requester(calldata: &str) -> Result<NormalizedAddress, String> {
    let body = calldata.strip_prefix("0x").unwrap_or(calldata);
    let bytes = hex::decode(body).map_err(|e| format!("not hex: {}", e))?;

    let offset = read_word_as_usize(&bytes, 0)?;
    if offset % 32 != 0 {
        return Err(format!("misaligned array offset {}", offset));
    }
    let length = read_word_as_usize(&bytes, offset)?;
    if length == 0 {
        return Err("empty managers array".to_string());
    }
    let element = word(&bytes, offset + 32)?;
    if element[..12].iter().any(|b| *b != 0) {
        return Err("first manager is not a padded address".to_string());
    }

    to_checksum(&format!("0x{}", hex::encode(&element[12..]))).map_err(|e| e.to_string())
}

fn word(bytes: &[u8], at: usize) -> Result<&[u8], String> {
    at.checked_add(32)
        .and_then(|end| bytes.get(at..end))
        .ok_or_else(|| format!("calldata too short for word at {}", at))
}

fn read_word_as_usize(bytes: &[u8], at: usize) -> Result<usize, String> {
    let w = word(bytes, at)?;
    if w[..24].iter().any(|b| *b != 0) {
        return Err(format!("word at {} is out of range", at));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&w[24..]);
    usize::try_from(u64::from_be_bytes(buf)).map_err(|e| e.to_string())
}
