// Background acceptance sync: pending communities become valid once the
// indexer reports them added on chain

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::address::{to_checksum, NormalizedAddress};
use crate::error::{DirectoryError, DirectoryResult};
use crate::indexer::{CommunityAdded, MetricsIndexer};
use crate::service::Directory;

const BATCH_SIZE: usize = 100;

pub struct AcceptanceSync {
    directory: Arc<Directory>,
    indexer: Arc<dyn MetricsIndexer>,
    poll_interval: Duration,
}

impl AcceptanceSync {
    pub fn new(
        directory: Arc<Directory>,
        indexer: Arc<dyn MetricsIndexer>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            directory,
            indexer,
            poll_interval,
        }
    }

    pub async fn run(&self) -> DirectoryResult<()> {
        let mut cursor = self.directory.store().load_cursor().await?.unwrap_or(0);
        info!("Starting acceptance sync from block {}", cursor);

        loop {
            match self.poll(cursor).await {
                Ok(Some(next)) => match self.directory.store().save_cursor(next).await {
                    Ok(()) => cursor = next,
                    Err(e) => error!("Failed to persist sync cursor {}: {}", next, e),
                },
                Ok(None) => {}
                Err(e) => {
                    error!("Error processing accepted communities: {}", e);
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Processes one batch after `cursor`. Returns the new cursor, or `None`
    /// when there was nothing new. A store failure leaves the cursor before
    /// the failing block so its acceptance is retried on the next poll.
    pub async fn poll(&self, cursor: i64) -> DirectoryResult<Option<i64>> {
        let added = self
            .indexer
            .communities_added_since(cursor, BATCH_SIZE)
            .await?;
        if added.is_empty() {
            return Ok(None);
        }

        info!("Fetched {} accepted communities", added.len());

        let addresses: Vec<NormalizedAddress> = added
            .iter()
            .filter_map(|a| to_checksum(&a.id).ok())
            .collect();
        let known = self
            .directory
            .store()
            .local_ids_for_addresses(&addresses)
            .await?;

        for event in &added {
            if let Ok(address) = to_checksum(&event.id) {
                if let Some(id) = known.get(&address) {
                    debug!("Community {} already accepted as {}", id, address);
                    continue;
                }
            }
            match self.process(event).await {
                Ok(()) => {}
                // store failures are retried: the cursor stops before this block
                Err(DirectoryError::Store(e)) => {
                    let done = added
                        .iter()
                        .map(|a| a.block)
                        .filter(|block| *block < event.block)
                        .max();
                    return match done {
                        Some(block) => {
                            error!(
                                "Failed to accept {} at block {}, retrying after block {}: {}",
                                event.id, event.block, block, e
                            );
                            Ok(Some(block))
                        }
                        None => Err(DirectoryError::Store(e)),
                    };
                }
                Err(e) => warn!("Skipping accepted community {}: {}", event.id, e),
            }
        }

        Ok(added.iter().map(|a| a.block).max())
    }

    async fn process(&self, event: &CommunityAdded) -> DirectoryResult<()> {
        let contract_address = to_checksum(&event.id)?;
        let requester = to_checksum(&event.requester)?;

        let Some(pending) = self
            .directory
            .store()
            .find_pending_by_requester(&requester)
            .await?
        else {
            warn!(
                "No pending community for requester {} of {}",
                requester, contract_address
            );
            return Ok(());
        };

        self.directory
            .accept(pending.id, &contract_address)
            .await?;
        Ok(())
    }
}
