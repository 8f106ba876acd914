//! Receipt polling

use super::ChainClient;

use ethers::types::{TransactionReceipt, H256};
use std::time::Duration;
use tracing::{debug, warn};

/// Poll `client` until it reports a receipt for `tx_hash`
///
/// Query failures are logged and retried on the next tick. The loop has no
/// deadline of its own; callers bound it with `tokio::time::timeout_at`, and
/// dropping the future stops the polling.
pub async fn wait_for_receipt(
    client: &dyn ChainClient,
    tx_hash: H256,
    poll_interval: Duration,
) -> TransactionReceipt {
    let mut attempts: u64 = 0;

    loop {
        attempts += 1;

        match client.get_transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => {
                debug!(
                    "Receipt for {:?} found in block {:?} after {} poll(s)",
                    tx_hash, receipt.block_number, attempts
                );
                return receipt;
            }
            Ok(None) => {
                debug!("No receipt yet for {:?} (poll {})", tx_hash, attempts);
            }
            Err(e) => {
                warn!("Receipt query for {:?} failed: {}", tx_hash, e);
            }
        }

        tokio::time::sleep(poll_interval).await;
    }
}
