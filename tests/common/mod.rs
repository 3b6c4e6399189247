#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use launch_indexer::config::IndexerSettings;
use launch_indexer::error::ChainError;
use launch_indexer::models::launch::{LaunchMetadata, LaunchState, RawEvent};
use launch_indexer::services::chain_reader::{ChainReader, IBondingCurveFactory::LaunchCreated};
use launch_indexer::services::ingestor::Ingestor;
use launch_indexer::services::launch_store::MemoryLaunchStore;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tokio::sync::{mpsc, OnceCell};

pub const BLOCK_TIME_BASE: u64 = 1_700_000_000;

pub fn factory() -> Address {
    Address::repeat_byte(0xfa)
}

pub fn launch_addr(n: u8) -> Address {
    Address::repeat_byte(n)
}

pub fn token_addr(n: u8) -> Address {
    let mut bytes = [0x70u8; 20];
    bytes[19] = n;
    Address::from(bytes)
}

pub fn creator_addr() -> Address {
    Address::repeat_byte(0xcc)
}

/// A `LaunchCreated` log emitted by the test factory. Carries no block
/// timestamp, so ingestion has to ask the reader for it.
pub fn creation_event(launch: Address, block: u64, log_index: u64) -> RawEvent {
    let event = LaunchCreated {
        launch,
        token: token_addr(launch.0[0]),
        creator: creator_addr(),
        name: format!("Launch {}", launch.0[0]),
        symbol: format!("L{}", launch.0[0]),
    };
    let log = event.encode_log_data();
    RawEvent {
        address: factory(),
        topics: log.topics().to_vec(),
        data: log.data,
        block_number: block,
        block_timestamp: None,
        transaction_hash: Some(B256::repeat_byte(launch.0[0])),
        log_index,
    }
}

pub fn state(price: Decimal, sold: Decimal, raised: Decimal, graduated: bool) -> LaunchState {
    LaunchState {
        current_price_native: price,
        tokens_sold: sold,
        native_raised: raised,
        is_graduated: graduated,
    }
}

pub fn settings() -> IndexerSettings {
    let mut settings = IndexerSettings::new(factory());
    settings.refresh_interval = Duration::from_millis(50);
    settings.refresh_min_backoff = Duration::from_millis(5);
    settings.shutdown_grace = Duration::from_secs(2);
    settings
}

#[derive(Clone)]
struct MockLaunch {
    total_supply: Decimal,
    state: LaunchState,
    metadata: LaunchMetadata,
}

#[derive(Default)]
struct MockChain {
    tip: u64,
    tip_unavailable: bool,
    logs: Vec<RawEvent>,
    max_range: Option<u64>,
    failing_ranges: Vec<(u64, u64)>,
    oversized_blocks: Vec<u64>,
    launches: HashMap<Address, MockLaunch>,
    failing: HashSet<Address>,
    get_logs_calls: Vec<(u64, u64)>,
}

/// Scriptable in-memory chain.
pub struct MockChainReader {
    chain: Mutex<MockChain>,
    live_tx: mpsc::UnboundedSender<RawEvent>,
    live_rx: Mutex<Option<mpsc::UnboundedReceiver<RawEvent>>>,
    state_delay: Mutex<Duration>,
    state_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    timeline: Mutex<Vec<&'static str>>,
}

impl MockChainReader {
    pub fn new(tip: u64) -> Self {
        let (live_tx, live_rx) = mpsc::unbounded_channel();
        Self {
            chain: Mutex::new(MockChain {
                tip,
                ..Default::default()
            }),
            live_tx,
            live_rx: Mutex::new(Some(live_rx)),
            state_delay: Mutex::new(Duration::ZERO),
            state_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            timeline: Mutex::new(Vec::new()),
        }
    }

    pub fn add_launch(&self, launch: Address, total_supply: Decimal, state: LaunchState) {
        self.chain.lock().launches.insert(
            launch,
            MockLaunch {
                total_supply,
                state,
                metadata: LaunchMetadata {
                    logo_url: Some(format!("https://cdn.pad/{}.png", launch.0[0])),
                    description: Some("bonding curve launch".to_string()),
                    website: None,
                    twitter: Some("@pad".to_string()),
                    telegram: None,
                    discord: None,
                },
            },
        );
    }

    /// Register a launch and emit its creation log at `block`.
    pub fn create_launch(&self, launch: Address, block: u64, total_supply: Decimal, state: LaunchState) -> RawEvent {
        self.add_launch(launch, total_supply, state);
        let event = creation_event(launch, block, 0);
        self.chain.lock().logs.push(event.clone());
        event
    }

    pub fn set_state(&self, launch: Address, state: LaunchState) {
        if let Some(entry) = self.chain.lock().launches.get_mut(&launch) {
            entry.state = state;
        }
    }

    pub fn fail_calls(&self, launch: Address) {
        self.chain.lock().failing.insert(launch);
    }

    pub fn set_tip(&self, tip: u64) {
        self.chain.lock().tip = tip;
    }

    pub fn set_tip_unavailable(&self, unavailable: bool) {
        self.chain.lock().tip_unavailable = unavailable;
    }

    /// Reject log queries wider than `blocks`.
    pub fn set_max_range(&self, blocks: u64) {
        self.chain.lock().max_range = Some(blocks);
    }

    /// Log queries overlapping this window fail with a transport error.
    pub fn fail_range(&self, from: u64, to: u64) {
        self.chain.lock().failing_ranges.push((from, to));
    }

    /// Any log query covering `block` is rejected as too large, even a
    /// single-block one.
    pub fn oversized_block(&self, block: u64) {
        self.chain.lock().oversized_blocks.push(block);
    }

    pub fn set_state_delay(&self, delay: Duration) {
        *self.state_delay.lock() = delay;
    }

    pub fn send_live(&self, event: RawEvent) {
        let _ = self.live_tx.send(event);
    }

    pub fn get_logs_calls(&self) -> Vec<(u64, u64)> {
        self.chain.lock().get_logs_calls.clone()
    }

    pub fn state_calls(&self) -> usize {
        self.state_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Ordered "start"/"end" marks of every `launch_state` call.
    pub fn timeline(&self) -> Vec<&'static str> {
        self.timeline.lock().clone()
    }

    fn launch(&self, launch: Address, operation: &'static str) -> Result<MockLaunch, ChainError> {
        let chain = self.chain.lock();
        if chain.failing.contains(&launch) {
            return Err(ChainError::Rpc {
                operation,
                message: "connection reset by peer".to_string(),
            });
        }
        chain
            .launches
            .get(&launch)
            .cloned()
            .ok_or_else(|| ChainError::decode(operation, "execution returned no data"))
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn latest_block(&self) -> Result<u64, ChainError> {
        let chain = self.chain.lock();
        if chain.tip_unavailable {
            return Err(ChainError::Rpc {
                operation: "eth_blockNumber",
                message: "503 Service Unavailable".to_string(),
            });
        }
        Ok(chain.tip)
    }

    async fn get_logs(
        &self,
        address: Address,
        event_signature: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawEvent>, ChainError> {
        let mut chain = self.chain.lock();
        chain.get_logs_calls.push((from_block, to_block));

        if chain
            .oversized_blocks
            .iter()
            .any(|block| (from_block..=to_block).contains(block))
        {
            return Err(ChainError::RangeTooLarge {
                from_block,
                to_block,
                message: "query returned more than 10000 results".to_string(),
            });
        }
        if let Some(max) = chain.max_range {
            if to_block - from_block + 1 > max {
                return Err(ChainError::RangeTooLarge {
                    from_block,
                    to_block,
                    message: format!("block range is too large, max is {}", max),
                });
            }
        }
        if chain
            .failing_ranges
            .iter()
            .any(|(from, to)| from_block <= *to && *from <= to_block)
        {
            return Err(ChainError::Rpc {
                operation: "eth_getLogs",
                message: "upstream timeout".to_string(),
            });
        }

        let mut events: Vec<RawEvent> = chain
            .logs
            .iter()
            .filter(|e| e.address == address && e.topics.first() == Some(&event_signature))
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(events)
    }

    async fn subscribe(
        &self,
        _address: Address,
        _event_signature: B256,
        _from_block: u64,
    ) -> Result<BoxStream<'static, RawEvent>, ChainError> {
        let rx = self.live_rx.lock().take().ok_or_else(|| ChainError::Rpc {
            operation: "subscribe",
            message: "feed already taken".to_string(),
        })?;
        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|event| (event, rx)) }).boxed())
    }

    async fn block_timestamp(&self, block: u64) -> Result<u64, ChainError> {
        Ok(BLOCK_TIME_BASE + block * 3)
    }

    async fn total_supply(&self, launch: Address) -> Result<Decimal, ChainError> {
        Ok(self.launch(launch, "TOTAL_SUPPLY")?.total_supply)
    }

    async fn launch_state(&self, launch: Address) -> Result<LaunchState, ChainError> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.timeline.lock().push("start");

        let delay = *self.state_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = self.launch(launch, "tokensSold").map(|l| l.state);

        self.timeline.lock().push("end");
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn launch_metadata(
        &self,
        _factory: Address,
        launch: Address,
    ) -> Result<LaunchMetadata, ChainError> {
        Ok(self.launch(launch, "getLaunchInfo")?.metadata)
    }
}

pub struct Harness {
    pub chain: Arc<MockChainReader>,
    pub store: Arc<MemoryLaunchStore>,
    pub ingestor: Arc<Ingestor>,
}

pub fn harness(tip: u64) -> Harness {
    let chain = Arc::new(MockChainReader::new(tip));
    let store = Arc::new(MemoryLaunchStore::new());
    let ingestor = Arc::new(Ingestor::new(chain.clone(), store.clone(), factory()));
    Harness {
        chain,
        store,
        ingestor,
    }
}

static MIGRATED: OnceCell<()> = OnceCell::const_new();

/// Set up test database connection
/// Uses TEST_DATABASE_URL; returns None when it is unset so database tests
/// are skipped on machines without Postgres.
pub async fn setup_test_db() -> Option<DatabaseConnection> {
    let database_url = std::env::var("TEST_DATABASE_URL").ok()?;
    let db = Database::connect(&database_url)
        .await
        .expect("Failed to connect to test DB");

    MIGRATED
        .get_or_init(|| async {
            migration::Migrator::up(&db, None)
                .await
                .expect("Failed to run migrations");
        })
        .await;

    Some(db)
}
