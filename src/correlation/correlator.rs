//! Cross-domain correlator: origin transaction -> message hash -> relayed transaction

use super::{CorrelatedPair, CorrelationStage};
use crate::chain::{wait_for_receipt, ChainEndpoint, Direction, Layer, RelayListener};
use crate::config::CorrelatorConfig;
use crate::error::{CorrelatorError, CorrelatorResult};
use crate::events::{self, MessageHash, MessageLogSchema};
use crate::metrics;

use ethers::types::{Transaction, TransactionReceipt, H256};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// Which of the origin transaction's messages to follow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageSelector {
    /// The first message emitted
    #[default]
    First,
    /// The message at this position in emission order
    Index(usize),
}

/// A mined origin transaction and the messages it emitted
struct OriginOutcome {
    tx_hash: H256,
    transaction: Transaction,
    receipt: TransactionReceipt,
    hashes: Vec<MessageHash>,
}

impl OriginOutcome {
    fn select(&self, selector: MessageSelector) -> CorrelatorResult<MessageHash> {
        let index = match selector {
            MessageSelector::First => 0,
            MessageSelector::Index(index) => index,
        };
        self.hashes
            .get(index)
            .copied()
            .ok_or(CorrelatorError::MessageIndexOutOfRange {
                tx_hash: self.tx_hash,
                index,
                emitted: self.hashes.len(),
            })
    }
}

/// Matches origin-chain transactions with their relays on the other chain
///
/// Holds no mutable state: every call polls through its own listener, so any
/// number of correlations may run concurrently over the same clients.
#[derive(Debug, Clone)]
pub struct CrossDomainCorrelator {
    l1: ChainEndpoint,
    l2: ChainEndpoint,
    config: CorrelatorConfig,
    schema: MessageLogSchema,
}

impl CrossDomainCorrelator {
    /// Create a correlator over an L1 and an L2 endpoint
    pub fn new(
        l1: ChainEndpoint,
        l2: ChainEndpoint,
        config: CorrelatorConfig,
        schema: MessageLogSchema,
    ) -> CorrelatorResult<Self> {
        if l1.layer() != Layer::L1 || l2.layer() != Layer::L2 {
            return Err(CorrelatorError::Config(format!(
                "Endpoints must be given as (l1, l2), got ({}, {})",
                l1.layer(),
                l2.layer()
            )));
        }
        validate(&config)?;

        Ok(Self {
            l1,
            l2,
            config,
            schema,
        })
    }

    /// Same endpoints with a different overall deadline
    pub fn with_deadline(&self, deadline: Duration) -> CorrelatorResult<Self> {
        let mut config = self.config.clone();
        config.deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
        validate(&config)?;

        Ok(Self {
            config,
            ..self.clone()
        })
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    pub fn endpoint(&self, layer: Layer) -> &ChainEndpoint {
        match layer {
            Layer::L1 => &self.l1,
            Layer::L2 => &self.l2,
        }
    }

    /// Wait for the first message of a submitted transaction to be relayed
    pub async fn wait_for_relayed_transaction<F, E>(
        &self,
        submission: F,
        direction: Direction,
    ) -> CorrelatorResult<CorrelatedPair>
    where
        F: Future<Output = Result<H256, E>>,
        E: Display,
    {
        self.wait_for_relayed_transaction_with(submission, direction, MessageSelector::First)
            .await
    }

    /// Wait for the selected message of a submitted transaction to be relayed
    pub async fn wait_for_relayed_transaction_with<F, E>(
        &self,
        submission: F,
        direction: Direction,
        selector: MessageSelector,
    ) -> CorrelatorResult<CorrelatedPair>
    where
        F: Future<Output = Result<H256, E>>,
        E: Display,
    {
        self.traced(direction, |started, deadline| async move {
            let origin = self
                .await_origin(submission, direction, started, deadline)
                .await?;
            let message_hash = origin.select(selector)?;
            debug!("Selected {} from {:?}", message_hash, origin.tx_hash);

            let mut listener = self.awaiting_relay(direction, 1);
            let pair = self
                .await_relay(&origin, &mut listener, message_hash, direction, started, deadline)
                .await?;
            debug!("Correlation of {:?} {}", origin.tx_hash, CorrelationStage::Relayed);
            Ok(pair)
        })
        .await
    }

    /// Wait for every message of a submitted transaction, in emission order
    pub async fn wait_for_all_relayed_transactions<F, E>(
        &self,
        submission: F,
        direction: Direction,
    ) -> CorrelatorResult<Vec<CorrelatedPair>>
    where
        F: Future<Output = Result<H256, E>>,
        E: Display,
    {
        self.traced(direction, |started, deadline| async move {
            let origin = self
                .await_origin(submission, direction, started, deadline)
                .await?;
            debug!("Selected all of {:?} from {:?}", origin.hashes, origin.tx_hash);

            let mut listener = self.awaiting_relay(direction, origin.hashes.len());
            let mut pairs = Vec::with_capacity(origin.hashes.len());
            for &message_hash in &origin.hashes {
                pairs.push(
                    self.await_relay(&origin, &mut listener, message_hash, direction, started, deadline)
                        .await?,
                );
            }
            debug!("Correlation of {:?} {}", origin.tx_hash, CorrelationStage::Relayed);
            Ok(pairs)
        })
        .await
    }

    /// Deposit-type flow: L1 transaction relayed on L2
    pub async fn wait_for_deposit<F, E>(&self, submission: F) -> CorrelatorResult<CorrelatedPair>
    where
        F: Future<Output = Result<H256, E>>,
        E: Display,
    {
        self.wait_for_relayed_transaction(submission, Direction::L1ToL2)
            .await
    }

    /// Withdrawal-type flow: L2 transaction relayed on L1
    pub async fn wait_for_withdrawal<F, E>(&self, submission: F) -> CorrelatorResult<CorrelatedPair>
    where
        F: Future<Output = Result<H256, E>>,
        E: Display,
    {
        self.wait_for_relayed_transaction(submission, Direction::L2ToL1)
            .await
    }

    /// Message hashes emitted by a mined origin transaction, in emission order
    ///
    /// `None` while the origin chain has no receipt for `tx_hash`.
    pub async fn get_message_hashes_from_tx(
        &self,
        direction: Direction,
        tx_hash: H256,
    ) -> CorrelatorResult<Option<Vec<MessageHash>>> {
        let origin = self.endpoint(direction.origin());
        let receipt = origin.client().get_transaction_receipt(tx_hash).await?;
        Ok(receipt.map(|r| events::extract_message_hashes(&r, origin.messenger(), &self.schema)))
    }

    /// One-shot lookup of the destination receipt relaying `message_hash`
    pub async fn find_relay_receipt(
        &self,
        direction: Direction,
        message_hash: MessageHash,
    ) -> CorrelatorResult<Option<TransactionReceipt>> {
        let mut listener = self.listener(direction);
        listener.poll().await?;
        listener.lookup(message_hash).await
    }

    fn listener(&self, direction: Direction) -> RelayListener {
        RelayListener::new(
            self.endpoint(direction.destination()).clone(),
            self.schema.clone(),
            &self.config,
        )
    }

    /// Run one correlation under its deadline, span and metrics
    async fn traced<T, B, Fut>(&self, direction: Direction, body: B) -> CorrelatorResult<T>
    where
        B: FnOnce(Instant, Instant) -> Fut,
        Fut: Future<Output = CorrelatorResult<T>>,
    {
        let started = Instant::now();
        let deadline = started + self.config.deadline();
        let span = info_span!("correlate", id = %Uuid::new_v4(), %direction);

        async move {
            metrics::record_correlation_started(direction);

            let result = body(started, deadline).await;
            match &result {
                Ok(_) => {
                    info!("Correlation finished in {:?}", started.elapsed());
                    metrics::record_correlation_completed(
                        direction,
                        started.elapsed().as_secs_f64(),
                    );
                }
                Err(e) => metrics::record_correlation_failed(direction, e),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Submitted -> origin mined -> messages extracted
    async fn await_origin<F, E>(
        &self,
        submission: F,
        direction: Direction,
        started: Instant,
        deadline: Instant,
    ) -> CorrelatorResult<OriginOutcome>
    where
        F: Future<Output = Result<H256, E>>,
        E: Display,
    {
        let origin = self.endpoint(direction.origin());
        let poll_interval = self.config.poll_interval();

        let tx_hash = match timeout_at(deadline, submission).await {
            Ok(Ok(tx_hash)) => tx_hash,
            Ok(Err(e)) => return Err(CorrelatorError::Submission(e.to_string())),
            Err(_) => {
                return Err(CorrelatorError::OriginReceiptTimeout {
                    tx_hash: None,
                    waited: started.elapsed(),
                })
            }
        };
        info!(
            "Origin transaction {:?} {} on {}",
            tx_hash,
            CorrelationStage::Submitted,
            origin.layer()
        );

        let origin_timeout = || CorrelatorError::OriginReceiptTimeout {
            tx_hash: Some(tx_hash),
            waited: started.elapsed(),
        };

        let receipt = timeout_at(
            deadline,
            wait_for_receipt(origin.client(), tx_hash, poll_interval),
        )
        .await
        .map_err(|_| origin_timeout())?;
        let transaction = timeout_at(deadline, origin.fetch_transaction(tx_hash))
            .await
            .map_err(|_| origin_timeout())??;
        info!(
            "Origin transaction {:?} mined in block {:?} ({})",
            tx_hash,
            receipt.block_number,
            CorrelationStage::OriginMined
        );

        let hashes = events::extract_message_hashes(&receipt, origin.messenger(), &self.schema);
        if hashes.is_empty() {
            return Err(CorrelatorError::NoMessageEmitted { tx_hash });
        }
        debug!(
            "{} message(s) extracted from {:?} ({})",
            hashes.len(),
            tx_hash,
            CorrelationStage::MessageExtracted
        );

        Ok(OriginOutcome {
            tx_hash,
            transaction,
            receipt,
            hashes,
        })
    }

    fn awaiting_relay(&self, direction: Direction, count: usize) -> RelayListener {
        info!(
            "Waiting for {} relay(s) on {} ({})",
            count,
            direction.destination(),
            CorrelationStage::AwaitingRelay
        );
        self.listener(direction)
    }

    /// Awaiting relay -> relayed, for one message
    async fn await_relay(
        &self,
        origin: &OriginOutcome,
        listener: &mut RelayListener,
        message_hash: MessageHash,
        direction: Direction,
        started: Instant,
        deadline: Instant,
    ) -> CorrelatorResult<CorrelatedPair> {
        let destination = self.endpoint(direction.destination());
        let relay_timeout = || CorrelatorError::DestinationRelayTimeout {
            message_hash,
            waited: started.elapsed(),
        };

        let destination_receipt = timeout_at(
            deadline,
            listener.wait_for_relay(message_hash, self.config.poll_interval()),
        )
        .await
        .map_err(|_| relay_timeout())?;
        let destination_transaction = timeout_at(
            deadline,
            destination.fetch_transaction(destination_receipt.transaction_hash),
        )
        .await
        .map_err(|_| relay_timeout())??;

        info!(
            "Message {} relayed by {:?} in block {:?}",
            message_hash, destination_receipt.transaction_hash, destination_receipt.block_number
        );

        Ok(CorrelatedPair {
            direction,
            message_hash,
            origin_transaction: origin.transaction.clone(),
            origin_receipt: origin.receipt.clone(),
            destination_transaction,
            destination_receipt,
        })
    }
}

fn validate(config: &CorrelatorConfig) -> CorrelatorResult<()> {
    config
        .validate()
        .map_err(|e| CorrelatorError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::test_utils::{receipt, relay_log, sent_message_log, ScriptedChain};
    use ethers::types::Address;
    use std::convert::Infallible;
    use std::sync::Arc;

    const INTERVAL: Duration = Duration::from_millis(100);

    fn l1_messenger() -> Address {
        Address::repeat_byte(0x11)
    }

    fn l2_messenger() -> Address {
        Address::repeat_byte(0x22)
    }

    fn config(deadline: Duration) -> CorrelatorConfig {
        CorrelatorConfig {
            poll_interval_ms: INTERVAL.as_millis() as u64,
            deadline_ms: deadline.as_millis() as u64,
            lookback_blocks: 100,
            max_block_range: 1_000,
            rescan_blocks: 8,
        }
    }

    fn correlator(
        l1: Arc<dyn crate::chain::ChainClient>,
        l2: Arc<dyn crate::chain::ChainClient>,
        deadline: Duration,
    ) -> CrossDomainCorrelator {
        CrossDomainCorrelator::new(
            ChainEndpoint::new(Layer::L1, 31337, l1, l1_messenger()),
            ChainEndpoint::new(Layer::L2, 420, l2, l2_messenger()),
            config(deadline),
            MessageLogSchema::default(),
        )
        .unwrap()
    }

    fn submitted(tx_hash: H256) -> impl Future<Output = Result<H256, Infallible>> {
        std::future::ready(Ok(tx_hash))
    }

    #[tokio::test(start_paused = true)]
    async fn test_deposit_relayed_after_two_polls() {
        let deposit = H256::repeat_byte(0xd1);
        let relay = H256::repeat_byte(0xe1);
        let message = b"1 wei deposit to 0x1234";
        let hash = MessageHash::of_message(message);

        let l1 = Arc::new(ScriptedChain::new(31337));
        l1.mine(
            Duration::ZERO,
            7,
            vec![receipt(deposit, vec![sent_message_log(l1_messenger(), message)])],
        );
        let l2 = Arc::new(ScriptedChain::new(420));
        l2.mine(Duration::ZERO, 1, vec![]);
        l2.mine(
            INTERVAL * 2,
            2,
            vec![receipt(relay, vec![relay_log(l2_messenger(), hash)])],
        );

        let start = Instant::now();
        let pair = correlator(l1, l2, Duration::from_secs(30))
            .wait_for_deposit(submitted(deposit))
            .await
            .unwrap();

        assert!(start.elapsed() <= INTERVAL * 3);
        assert_eq!(pair.direction, Direction::L1ToL2);
        assert_eq!(pair.message_hash, hash);
        assert_eq!(pair.origin_hash(), deposit);
        assert_eq!(pair.origin_transaction.hash, deposit);
        assert_eq!(pair.destination_hash(), relay);
        assert_eq!(pair.destination_transaction.hash, relay);
        assert!(pair.relay_succeeded());

        let extracted =
            events::extract_message_hashes(&pair.origin_receipt, l1_messenger(), &MessageLogSchema::default());
        assert!(events::receipt_relays(
            &pair.destination_receipt,
            l2_messenger(),
            extracted[0],
            &MessageLogSchema::default()
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_withdrawal_flows_from_l2_to_l1() {
        let withdrawal = H256::repeat_byte(0x0d);
        let relay = H256::repeat_byte(0x0e);
        let hash = MessageHash::of_message(b"withdraw");

        let l2 = Arc::new(ScriptedChain::new(420));
        l2.mine(
            Duration::ZERO,
            40,
            vec![receipt(withdrawal, vec![sent_message_log(l2_messenger(), b"withdraw")])],
        );
        let l1 = Arc::new(ScriptedChain::new(31337));
        l1.mine(
            Duration::from_millis(500),
            12,
            vec![receipt(relay, vec![relay_log(l1_messenger(), hash)])],
        );

        let pair = correlator(l1, l2, Duration::from_secs(30))
            .wait_for_withdrawal(submitted(withdrawal))
            .await
            .unwrap();

        assert_eq!(pair.direction, Direction::L2ToL1);
        assert_eq!(pair.destination_hash(), relay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_transactions_never_cross_match() {
        let (tx1, tx2) = (H256::repeat_byte(0x01), H256::repeat_byte(0x02));
        let (relay1, relay2) = (H256::repeat_byte(0xa1), H256::repeat_byte(0xa2));
        let h1 = MessageHash::of_message(b"first deposit");
        let h2 = MessageHash::of_message(b"second deposit");

        let l1 = Arc::new(ScriptedChain::new(31337));
        l1.mine(
            Duration::ZERO,
            1,
            vec![
                receipt(tx1, vec![sent_message_log(l1_messenger(), b"first deposit")]),
                receipt(tx2, vec![sent_message_log(l1_messenger(), b"second deposit")]),
            ],
        );
        let l2 = Arc::new(ScriptedChain::new(420));
        // Relayed out of submission order, in the same block
        l2.mine(
            Duration::from_millis(300),
            5,
            vec![
                receipt(relay2, vec![relay_log(l2_messenger(), h2)]),
                receipt(relay1, vec![relay_log(l2_messenger(), h1)]),
            ],
        );

        let correlator = correlator(l1, l2, Duration::from_secs(30));
        let (first, second) = tokio::join!(
            correlator.wait_for_deposit(submitted(tx1)),
            correlator.wait_for_deposit(submitted(tx2)),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!((first.message_hash, first.destination_hash()), (h1, relay1));
        assert_eq!((second.message_hash, second.destination_hash()), (h2, relay2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_messages_resolve_in_emission_order() {
        let tx = H256::repeat_byte(0x33);
        let h1 = MessageHash::of_message(b"m1");
        let h2 = MessageHash::of_message(b"m2");

        let l1 = Arc::new(ScriptedChain::new(31337));
        l1.mine(
            Duration::ZERO,
            3,
            vec![receipt(
                tx,
                vec![
                    sent_message_log(l1_messenger(), b"m1"),
                    sent_message_log(l1_messenger(), b"m2"),
                ],
            )],
        );
        let l2 = Arc::new(ScriptedChain::new(420));
        l2.mine(
            Duration::from_millis(100),
            8,
            vec![receipt(H256::repeat_byte(0xb1), vec![relay_log(l2_messenger(), h1)])],
        );
        l2.mine(
            Duration::from_millis(200),
            9,
            vec![receipt(H256::repeat_byte(0xb2), vec![relay_log(l2_messenger(), h2)])],
        );

        let correlator = correlator(l1, l2, Duration::from_secs(30));
        let pairs = correlator
            .wait_for_all_relayed_transactions(submitted(tx), Direction::L1ToL2)
            .await
            .unwrap();

        assert_eq!(
            pairs.iter().map(|p| p.message_hash).collect::<Vec<_>>(),
            vec![h1, h2]
        );
        assert!(pairs[0].destination_receipt.block_number <= pairs[1].destination_receipt.block_number);

        let second = correlator
            .wait_for_relayed_transaction_with(
                submitted(tx),
                Direction::L1ToL2,
                MessageSelector::Index(1),
            )
            .await
            .unwrap();
        assert_eq!(second.message_hash, h2);

        let err = correlator
            .wait_for_relayed_transaction_with(
                submitted(tx),
                Direction::L1ToL2,
                MessageSelector::Index(2),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CorrelatorError::MessageIndexOutOfRange { index: 2, emitted: 2, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_never_observed_times_out_at_deadline() {
        let tx = H256::repeat_byte(0x44);
        let l1 = Arc::new(ScriptedChain::new(31337));
        l1.mine(
            Duration::ZERO,
            1,
            vec![receipt(tx, vec![sent_message_log(l1_messenger(), b"lost")])],
        );
        let l2 = Arc::new(ScriptedChain::new(420));
        l2.mine(Duration::ZERO, 1, vec![]);

        let deadline = Duration::from_secs(1);
        let start = Instant::now();
        let err = correlator(l1, l2.clone(), deadline)
            .wait_for_deposit(submitted(tx))
            .await
            .unwrap_err();

        assert!(start.elapsed() >= deadline);
        assert!(start.elapsed() < deadline + INTERVAL);
        assert_eq!(err.failed_stage(), Some(CorrelationStage::Relayed));
        assert!(matches!(
            err,
            CorrelatorError::DestinationRelayTimeout { message_hash, .. }
                if message_hash == MessageHash::of_message(b"lost")
        ));

        // Nothing keeps polling once the call has returned
        let queries = l2.queries();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(l2.queries(), queries);
    }

    #[tokio::test(start_paused = true)]
    async fn test_origin_never_mined_is_origin_timeout() {
        let mut l1 = MockChainClient::new();
        l1.expect_get_transaction_receipt().returning(|_| Ok(None));
        // The destination must never be touched
        let l2 = MockChainClient::new();

        let tx = H256::repeat_byte(0x55);
        let err = correlator(Arc::new(l1), Arc::new(l2), Duration::from_millis(500))
            .wait_for_deposit(submitted(tx))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CorrelatorError::OriginReceiptTimeout { tx_hash: Some(hash), .. } if hash == tx
        ));
        assert_eq!(err.failed_stage(), Some(CorrelationStage::OriginMined));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_rejection_propagates() {
        let l1 = MockChainClient::new();
        let l2 = MockChainClient::new();

        let err = correlator(Arc::new(l1), Arc::new(l2), Duration::from_secs(5))
            .wait_for_deposit(async { Err::<H256, _>("nonce has already been used") })
            .await
            .unwrap_err();

        assert!(matches!(err, CorrelatorError::Submission(ref m) if m.contains("nonce has already been used")));
        assert_eq!(err.failed_stage(), Some(CorrelationStage::Submitted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_submission_counts_against_deadline() {
        let err = correlator(
            Arc::new(MockChainClient::new()),
            Arc::new(MockChainClient::new()),
            Duration::from_millis(200),
        )
        .wait_for_deposit(std::future::pending::<Result<H256, Infallible>>())
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            CorrelatorError::OriginReceiptTimeout { tx_hash: None, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transaction_without_message_is_reported() {
        let tx = H256::repeat_byte(0x66);
        let l1 = Arc::new(ScriptedChain::new(31337));
        // Same event, wrong emitter
        l1.mine(
            Duration::ZERO,
            1,
            vec![receipt(tx, vec![sent_message_log(Address::repeat_byte(0x99), b"x")])],
        );

        let err = correlator(l1, Arc::new(MockChainClient::new()), Duration::from_secs(5))
            .wait_for_deposit(submitted(tx))
            .await
            .unwrap_err();

        assert!(matches!(err, CorrelatorError::NoMessageEmitted { tx_hash } if tx_hash == tx));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_lookups() {
        let tx = H256::repeat_byte(0x77);
        let relay = H256::repeat_byte(0x78);
        let hash = MessageHash::of_message(b"one-shot");

        let l1 = Arc::new(ScriptedChain::new(31337));
        l1.mine(
            Duration::ZERO,
            1,
            vec![receipt(tx, vec![sent_message_log(l1_messenger(), b"one-shot")])],
        );
        let l2 = Arc::new(ScriptedChain::new(420));
        l2.mine(
            Duration::from_secs(1),
            4,
            vec![receipt(relay, vec![relay_log(l2_messenger(), hash)])],
        );

        let correlator = correlator(l1, l2, Duration::from_secs(30));
        let hashes = correlator
            .get_message_hashes_from_tx(Direction::L1ToL2, tx)
            .await
            .unwrap();
        assert_eq!(hashes, Some(vec![hash]));
        assert_eq!(
            correlator
                .get_message_hashes_from_tx(Direction::L1ToL2, H256::zero())
                .await
                .unwrap(),
            None
        );

        assert!(correlator
            .find_relay_receipt(Direction::L1ToL2, hash)
            .await
            .unwrap()
            .is_none());
        tokio::time::sleep(Duration::from_secs(1)).await;
        let found = correlator
            .find_relay_receipt(Direction::L1ToL2, hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.transaction_hash, relay);
    }

    #[test]
    fn test_endpoints_must_match_layers() {
        let l1 = ChainEndpoint::new(Layer::L1, 1, Arc::new(MockChainClient::new()), l1_messenger());
        let l2 = ChainEndpoint::new(Layer::L2, 2, Arc::new(MockChainClient::new()), l2_messenger());

        let swapped = CrossDomainCorrelator::new(
            l2.clone(),
            l1.clone(),
            CorrelatorConfig::default(),
            MessageLogSchema::default(),
        );
        assert!(matches!(swapped, Err(CorrelatorError::Config(_))));

        let correlator =
            CrossDomainCorrelator::new(l1, l2, CorrelatorConfig::default(), MessageLogSchema::default())
                .unwrap();
        let shortened = correlator.with_deadline(Duration::from_secs(2)).unwrap();
        assert_eq!(shortened.config().deadline(), Duration::from_secs(2));

        // Shorter than the one-second poll interval
        assert!(matches!(
            correlator.with_deadline(Duration::ZERO),
            Err(CorrelatorError::Config(_))
        ));
        assert!(matches!(
            correlator.with_deadline(Duration::from_millis(999)),
            Err(CorrelatorError::Config(_))
        ));
        assert_eq!(correlator.config().deadline(), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_origin_transaction_fetch_ends_at_deadline() {
        let tx = H256::repeat_byte(0x88);
        let l1 = Arc::new(ScriptedChain::new(31337));
        l1.mine(
            Duration::ZERO,
            1,
            vec![receipt(tx, vec![sent_message_log(l1_messenger(), b"stuck")])],
        );
        l1.stall_transactions();

        let deadline = Duration::from_secs(2);
        let start = Instant::now();
        let err = correlator(l1, Arc::new(MockChainClient::new()), deadline)
            .wait_for_deposit(submitted(tx))
            .await
            .unwrap_err();

        assert_eq!(start.elapsed(), deadline);
        assert!(matches!(
            err,
            CorrelatorError::OriginReceiptTimeout { tx_hash: Some(hash), .. } if hash == tx
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_relay_transaction_fetch_ends_at_deadline() {
        let tx = H256::repeat_byte(0x89);
        let hash = MessageHash::of_message(b"relayed, then stuck");
        let l1 = Arc::new(ScriptedChain::new(31337));
        l1.mine(
            Duration::ZERO,
            1,
            vec![receipt(tx, vec![sent_message_log(l1_messenger(), b"relayed, then stuck")])],
        );
        let l2 = Arc::new(ScriptedChain::new(420));
        l2.mine(
            Duration::ZERO,
            2,
            vec![receipt(H256::repeat_byte(0x8a), vec![relay_log(l2_messenger(), hash)])],
        );
        l2.stall_transactions();

        let deadline = Duration::from_secs(2);
        let start = Instant::now();
        let err = correlator(l1, l2, deadline)
            .wait_for_deposit(submitted(tx))
            .await
            .unwrap_err();

        assert_eq!(start.elapsed(), deadline);
        assert!(matches!(
            err,
            CorrelatorError::DestinationRelayTimeout { message_hash, .. } if message_hash == hash
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_hidden_by_lagging_log_endpoint_is_still_correlated() {
        let tx = H256::repeat_byte(0x90);
        let relay = H256::repeat_byte(0x91);
        let hash = MessageHash::of_message(b"late logs");

        let l1 = Arc::new(ScriptedChain::new(31337));
        l1.mine(
            Duration::ZERO,
            1,
            vec![receipt(tx, vec![sent_message_log(l1_messenger(), b"late logs")])],
        );
        let l2 = Arc::new(ScriptedChain::new(420));
        l2.mine(
            Duration::ZERO,
            5,
            vec![receipt(relay, vec![relay_log(l2_messenger(), hash)])],
        );
        l2.lag_log_queries(1);

        let pair = correlator(l1, l2.clone(), Duration::from_secs(2))
            .wait_for_deposit(submitted(tx))
            .await
            .unwrap();

        assert_eq!(pair.destination_hash(), relay);
        assert_eq!(l2.log_ranges().len(), 2);
    }
}
