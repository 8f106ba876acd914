//! Test utilities: log builders and a scripted in-memory chain

use crate::chain::ChainClient;
use crate::error::CorrelatorResult;
use crate::events::{MessageHash, MessageLogSchema};

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::types::{Address, Filter, Log, Transaction, TransactionReceipt, H256, U256, U64};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// A `SentMessage(bytes)` log carrying `message`
pub(crate) fn sent_message_log(messenger: Address, message: &[u8]) -> Log {
    Log {
        address: messenger,
        topics: vec![MessageLogSchema::default().sent_topic()],
        data: abi::encode(&[Token::Bytes(message.to_vec())]).into(),
        ..Default::default()
    }
}

/// A `RelayedMessage(bytes32)` log carrying `hash` in its data
pub(crate) fn relay_log(messenger: Address, hash: MessageHash) -> Log {
    Log {
        address: messenger,
        topics: vec![MessageLogSchema::default().relay_topic()],
        data: hash.as_bytes().to_vec().into(),
        ..Default::default()
    }
}

/// A successful receipt with the given logs
pub(crate) fn receipt(tx_hash: H256, logs: Vec<Log>) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: tx_hash,
        status: Some(U64::from(1)),
        logs,
        ..Default::default()
    }
}

#[derive(Debug)]
struct ScriptedBlock {
    number: u64,
    visible_at: Instant,
    receipts: Vec<TransactionReceipt>,
}

/// In-memory chain whose blocks become visible at scripted times
///
/// Time is tokio time, so tests run with `start_paused = true` get exact,
/// deterministic polling schedules.
#[derive(Debug)]
pub(crate) struct ScriptedChain {
    chain_id: u64,
    started: Instant,
    blocks: Mutex<Vec<ScriptedBlock>>,
    log_ranges: Mutex<Vec<(u64, u64)>>,
    queries: AtomicUsize,
    lagging_log_queries: AtomicUsize,
    stall_transactions: AtomicBool,
}

impl ScriptedChain {
    pub(crate) fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            started: Instant::now(),
            blocks: Mutex::new(Vec::new()),
            log_ranges: Mutex::new(Vec::new()),
            queries: AtomicUsize::new(0),
            lagging_log_queries: AtomicUsize::new(0),
            stall_transactions: AtomicBool::new(false),
        }
    }

    /// Mine block `number` holding `receipts`, visible `after` the chain was created
    pub(crate) fn mine(&self, after: Duration, number: u64, mut receipts: Vec<TransactionReceipt>) {
        let mut log_index = 0u64;
        for (position, receipt) in receipts.iter_mut().enumerate() {
            receipt.block_number = Some(U64::from(number));
            receipt.transaction_index = U64::from(position as u64);
            for log in receipt.logs.iter_mut() {
                log.block_number = Some(U64::from(number));
                log.transaction_hash = Some(receipt.transaction_hash);
                log.log_index = Some(U256::from(log_index));
                log_index += 1;
            }
        }

        let mut blocks = self.blocks.lock().unwrap();
        blocks.push(ScriptedBlock {
            number,
            visible_at: self.started + after,
            receipts,
        });
        blocks.sort_by_key(|b| b.number);
    }

    /// Replace block `number` with `receipts`, visible from now on
    pub(crate) fn reorg(&self, number: u64, receipts: Vec<TransactionReceipt>) {
        self.blocks.lock().unwrap().retain(|b| b.number != number);
        self.mine(Instant::now() - self.started, number, receipts);
    }

    /// Answer the next `count` log queries with no logs, like an endpoint behind the head
    pub(crate) fn lag_log_queries(&self, count: usize) {
        self.lagging_log_queries.store(count, Ordering::SeqCst);
    }

    /// Make every `get_transaction` call hang
    pub(crate) fn stall_transactions(&self) {
        self.stall_transactions.store(true, Ordering::SeqCst);
    }

    /// Block ranges requested through `get_logs`, in call order
    pub(crate) fn log_ranges(&self) -> Vec<(u64, u64)> {
        self.log_ranges.lock().unwrap().clone()
    }

    /// Total number of queries served
    pub(crate) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn visible_receipt(&self, hash: H256) -> Option<TransactionReceipt> {
        let now = Instant::now();
        self.blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.visible_at <= now)
            .flat_map(|b| b.receipts.iter())
            .find(|r| r.transaction_hash == hash)
            .cloned()
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn get_transaction(&self, hash: H256) -> CorrelatorResult<Option<Transaction>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.stall_transactions.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(self.visible_receipt(hash).map(|receipt| Transaction {
            hash,
            block_number: receipt.block_number,
            chain_id: Some(U256::from(self.chain_id)),
            ..Default::default()
        }))
    }

    async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> CorrelatorResult<Option<TransactionReceipt>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.visible_receipt(hash))
    }

    async fn get_block_number(&self) -> CorrelatorResult<u64> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let now = Instant::now();
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.visible_at <= now)
            .map(|b| b.number)
            .max()
            .unwrap_or(0))
    }

    async fn get_logs(&self, filter: &Filter) -> CorrelatorResult<Vec<Log>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let from = filter.get_from_block().map(|n| n.as_u64()).unwrap_or(0);
        let to = filter.get_to_block().map(|n| n.as_u64()).unwrap_or(u64::MAX);
        self.log_ranges.lock().unwrap().push((from, to));

        let lagging = self
            .lagging_log_queries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lagging {
            return Ok(Vec::new());
        }

        let now = Instant::now();
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.visible_at <= now && b.number >= from && b.number <= to)
            .flat_map(|b| b.receipts.iter())
            .flat_map(|r| r.logs.iter().cloned())
            .collect())
    }
}
