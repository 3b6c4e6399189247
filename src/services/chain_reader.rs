//! Chain Reader
//!
//! Read-only access to the launch factory and launch contracts: log queries,
//! a polled live feed of new logs, and view calls. Nothing here retries;
//! callers own their retry policy. Every call is bounded by a timeout.

use std::collections::VecDeque;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, B256, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::{Filter, Log},
    sol,
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::RpcSettings;
use crate::error::ChainError;
use crate::models::launch::{LaunchMetadata, LaunchState, RawEvent};

// Factory contract: emits LaunchCreated and keeps per-launch metadata
sol! {
    #[sol(rpc)]
    interface IBondingCurveFactory {
        struct LaunchInfo {
            string logoUrl;
            string description;
            string website;
            string twitter;
            string telegram;
            string discord;
        }

        event LaunchCreated(
            address indexed launch,
            address indexed token,
            address indexed creator,
            string name,
            string symbol
        );

        function getLaunchInfo(address launch) external view returns (LaunchInfo memory info);
    }
}

// Bonding-curve launch contract (view functions only)
sol! {
    #[sol(rpc)]
    interface IBondingCurveLaunch {
        function TOTAL_SUPPLY() external view returns (uint256);
        function tokensSold() external view returns (uint256);
        function bnbRaised() external view returns (uint256);
        function graduated() external view returns (bool);
        function getCurrentPrice() external view returns (uint256);
    }
}

/// Token and native amounts on chain carry 18 decimals.
const WEI_DECIMALS: u32 = 18;

#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn latest_block(&self) -> Result<u64, ChainError>;

    /// Logs emitted by `address` with topic0 `event_signature` in the
    /// inclusive block range, ordered by (block, log index).
    async fn get_logs(
        &self,
        address: Address,
        event_signature: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawEvent>, ChainError>;

    /// Long-lived feed of matching logs starting at `from_block`.
    ///
    /// Delivery is at-least-once: consumers must tolerate duplicates.
    async fn subscribe(
        &self,
        address: Address,
        event_signature: B256,
        from_block: u64,
    ) -> Result<BoxStream<'static, RawEvent>, ChainError>;

    /// Unix timestamp (seconds) of a block.
    async fn block_timestamp(&self, block: u64) -> Result<u64, ChainError>;

    async fn total_supply(&self, launch: Address) -> Result<Decimal, ChainError>;

    async fn launch_state(&self, launch: Address) -> Result<LaunchState, ChainError>;

    async fn launch_metadata(
        &self,
        factory: Address,
        launch: Address,
    ) -> Result<LaunchMetadata, ChainError>;
}

/// `ChainReader` over an alloy HTTP provider.
#[derive(Clone)]
pub struct AlloyChainReader {
    provider: RootProvider<Http<Client>>,
    call_timeout: Duration,
    poll_interval: Duration,
    max_block_range: u64,
}

impl AlloyChainReader {
    /// Build the provider and verify the endpoint answers `eth_chainId`.
    pub async fn connect(settings: &RpcSettings) -> Result<Self, ChainError> {
        let url = settings.rpc_url.parse().map_err(|e| ChainError::Rpc {
            operation: "connect",
            message: format!("Invalid RPC URL: {}", e),
        })?;
        let reader = Self {
            provider: ProviderBuilder::new().on_http(url),
            call_timeout: settings.call_timeout,
            poll_interval: settings.live_poll_interval,
            max_block_range: settings.max_block_range.max(1),
        };

        let chain_id = reader
            .timed("eth_chainId", reader.provider.get_chain_id())
            .await?
            .map_err(|e| ChainError::Rpc {
                operation: "eth_chainId",
                message: e.to_string(),
            })?;

        info!(
            rpc_url = %settings.rpc_url,
            chain_id = chain_id,
            "Connected to RPC endpoint"
        );

        Ok(reader)
    }

    async fn timed<F>(&self, operation: &'static str, fut: F) -> Result<F::Output, ChainError>
    where
        F: IntoFuture,
    {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| ChainError::Timeout {
                operation,
                after: self.call_timeout,
            })
    }

    async fn contract_call<F, T>(&self, operation: &'static str, call: F) -> Result<T, ChainError>
    where
        F: IntoFuture<Output = Result<T, alloy::contract::Error>>,
    {
        self.timed(operation, call)
            .await?
            .map_err(|e| contract_error(operation, e))
    }
}

#[async_trait]
impl ChainReader for AlloyChainReader {
    async fn latest_block(&self) -> Result<u64, ChainError> {
        self.timed("eth_blockNumber", self.provider.get_block_number())
            .await?
            .map_err(|e| ChainError::Rpc {
                operation: "eth_blockNumber",
                message: e.to_string(),
            })
    }

    async fn get_logs(
        &self,
        address: Address,
        event_signature: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawEvent>, ChainError> {
        let filter = Filter::new()
            .address(address)
            .event_signature(event_signature)
            .from_block(BlockNumberOrTag::Number(from_block))
            .to_block(BlockNumberOrTag::Number(to_block));

        let logs = self
            .timed("eth_getLogs", self.provider.get_logs(&filter))
            .await?
            .map_err(|e| {
                let message = e.to_string();
                if is_range_too_large(&message) {
                    ChainError::RangeTooLarge {
                        from_block,
                        to_block,
                        message,
                    }
                } else {
                    ChainError::Rpc {
                        operation: "eth_getLogs",
                        message,
                    }
                }
            })?;

        let mut events: Vec<RawEvent> = logs
            .iter()
            .filter(|log| !log.removed)
            .filter_map(raw_event_from_log)
            .collect();
        events.sort_by_key(|e| (e.block_number, e.log_index));

        debug!(
            from_block = from_block,
            to_block = to_block,
            count = events.len(),
            "Fetched logs"
        );

        Ok(events)
    }

    async fn subscribe(
        &self,
        address: Address,
        event_signature: B256,
        from_block: u64,
    ) -> Result<BoxStream<'static, RawEvent>, ChainError> {
        Ok(poll_logs(
            Arc::new(self.clone()),
            address,
            event_signature,
            from_block,
            self.poll_interval,
            self.max_block_range,
        ))
    }

    async fn block_timestamp(&self, block: u64) -> Result<u64, ChainError> {
        let params = serde_json::json!([format!("0x{:x}", block), false]);
        let response: serde_json::Value = self
            .timed(
                "eth_getBlockByNumber",
                self.provider
                    .client()
                    .request::<_, serde_json::Value>("eth_getBlockByNumber", params),
            )
            .await?
            .map_err(|e| ChainError::Rpc {
                operation: "eth_getBlockByNumber",
                message: e.to_string(),
            })?;

        // Parse timestamp from hex string
        response["timestamp"]
            .as_str()
            .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
            .ok_or_else(|| {
                ChainError::decode(
                    "eth_getBlockByNumber",
                    format!("block {} has no readable timestamp", block),
                )
            })
    }

    async fn total_supply(&self, launch: Address) -> Result<Decimal, ChainError> {
        let contract = IBondingCurveLaunch::new(launch, &self.provider);
        let call = contract.TOTAL_SUPPLY();
        let supply = self.contract_call("TOTAL_SUPPLY", call.call()).await?;
        wei_to_decimal("TOTAL_SUPPLY", supply._0)
    }

    async fn launch_state(&self, launch: Address) -> Result<LaunchState, ChainError> {
        let contract = IBondingCurveLaunch::new(launch, &self.provider);
        let sold = contract.tokensSold();
        let raised = contract.bnbRaised();
        let graduated = contract.graduated();
        let price = contract.getCurrentPrice();

        let (sold, raised, graduated, price) = tokio::try_join!(
            self.contract_call("tokensSold", sold.call()),
            self.contract_call("bnbRaised", raised.call()),
            self.contract_call("graduated", graduated.call()),
            self.contract_call("getCurrentPrice", price.call()),
        )?;

        Ok(LaunchState {
            current_price_native: wei_to_decimal("getCurrentPrice", price._0)?,
            tokens_sold: wei_to_decimal("tokensSold", sold._0)?,
            native_raised: wei_to_decimal("bnbRaised", raised._0)?,
            is_graduated: graduated._0,
        })
    }

    async fn launch_metadata(
        &self,
        factory: Address,
        launch: Address,
    ) -> Result<LaunchMetadata, ChainError> {
        let contract = IBondingCurveFactory::new(factory, &self.provider);
        let call = contract.getLaunchInfo(launch);
        let info = self.contract_call("getLaunchInfo", call.call()).await?.info;

        Ok(LaunchMetadata {
            logo_url: non_empty(info.logoUrl),
            description: non_empty(info.description),
            website: non_empty(info.website),
            twitter: non_empty(info.twitter),
            telegram: non_empty(info.telegram),
            discord: non_empty(info.discord),
        })
    }
}

/// Live feed built on repeated `latest_block` / `get_logs` calls.
///
/// Each tick fetches `[next_block, tip]` in windows of at most
/// `max_block_range` blocks and yields the logs in order. A window the node
/// rejects as too large is halved; a single block that is still too large is
/// skipped. Any other error is logged and the same window is retried on the
/// next tick, so a flaky endpoint never ends the stream.
pub fn poll_logs(
    reader: Arc<dyn ChainReader>,
    address: Address,
    event_signature: B256,
    from_block: u64,
    poll_interval: Duration,
    max_block_range: u64,
) -> BoxStream<'static, RawEvent> {
    let cursor = PollCursor {
        reader,
        address,
        event_signature,
        next_block: from_block,
        span: max_block_range.max(1),
        max_span: max_block_range.max(1),
        poll_interval,
        pending: VecDeque::new(),
        first_poll: true,
    };
    stream::unfold(cursor, next_polled_event).boxed()
}

/// Next block to ask for, plus logs fetched but not yet handed out.
struct PollCursor {
    reader: Arc<dyn ChainReader>,
    address: Address,
    event_signature: B256,
    next_block: u64,
    span: u64,
    max_span: u64,
    poll_interval: Duration,
    pending: VecDeque<RawEvent>,
    first_poll: bool,
}

impl PollCursor {
    async fn poll_once(&mut self) -> Result<(), ChainError> {
        let tip = self.reader.latest_block().await?;

        while self.next_block <= tip && self.pending.is_empty() {
            let from_block = self.next_block;
            let to_block = tip.min(from_block.saturating_add(self.span - 1));

            match self
                .reader
                .get_logs(self.address, self.event_signature, from_block, to_block)
                .await
            {
                Ok(events) => {
                    self.pending.extend(events);
                    self.next_block = to_block + 1;
                }
                Err(ChainError::RangeTooLarge { .. }) if to_block > from_block => {
                    self.span = ((to_block - from_block + 1) / 2).max(1);
                    debug!(from_block = from_block, span = self.span, "Live poll range too large, narrowing");
                }
                Err(ChainError::RangeTooLarge { message, .. }) => {
                    warn!(
                        block = from_block,
                        error = %message,
                        "Node rejects a single-block log query, skipping block"
                    );
                    self.next_block = to_block + 1;
                    self.span = self.max_span;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

async fn next_polled_event(mut cursor: PollCursor) -> Option<(RawEvent, PollCursor)> {
    loop {
        if let Some(event) = cursor.pending.pop_front() {
            return Some((event, cursor));
        }

        if cursor.first_poll {
            cursor.first_poll = false;
        } else {
            tokio::time::sleep(cursor.poll_interval).await;
        }

        // Transport errors are absorbed here; the next tick retries from the
        // same block, which is what makes reconnects invisible to consumers.
        if let Err(e) = cursor.poll_once().await {
            warn!(
                next_block = cursor.next_block,
                error = %e,
                "Live log poll failed, retrying"
            );
        }
    }
}

fn raw_event_from_log(log: &Log) -> Option<RawEvent> {
    Some(RawEvent {
        address: log.inner.address,
        topics: log.inner.data.topics().to_vec(),
        data: log.inner.data.data.clone(),
        block_number: log.block_number?,
        block_timestamp: log.block_timestamp,
        transaction_hash: log.transaction_hash,
        log_index: log.log_index.unwrap_or_default(),
    })
}

fn contract_error(operation: &'static str, err: alloy::contract::Error) -> ChainError {
    match err {
        alloy::contract::Error::TransportError(e) => ChainError::Rpc {
            operation,
            message: e.to_string(),
        },
        other => ChainError::decode(operation, other.to_string()),
    }
}

/// Node error messages used by common providers when a log query spans too
/// many blocks or would return too many results.
pub fn is_range_too_large(message: &str) -> bool {
    let message = message.to_lowercase();
    [
        "block range",
        "range is too large",
        "range too large",
        "exceed maximum block range",
        "query returned more than",
        "too many blocks",
        "response size exceeded",
    ]
    .iter()
    .any(|needle| message.contains(needle))
}

/// Scale an 18-decimal on-chain integer into whole units.
///
/// The whole and fractional parts are converted separately so supplies well
/// beyond 96 bits of wei still fit; fraction digits that exceed `Decimal`
/// precision are rounded away.
pub fn wei_to_decimal(operation: &'static str, value: U256) -> Result<Decimal, ChainError> {
    let out_of_range = || ChainError::decode(operation, format!("value {} out of range", value));
    let unit = U256::from(10u64).pow(U256::from(WEI_DECIMALS));
    let (whole, fraction) = value.div_rem(unit);

    let whole = u128::try_from(whole)
        .ok()
        .and_then(|v| i128::try_from(v).ok())
        .and_then(|v| Decimal::try_from_i128_with_scale(v, 0).ok())
        .ok_or_else(out_of_range)?;
    // Below 10^18, always representable
    let fraction = u128::try_from(fraction)
        .ok()
        .and_then(|v| i128::try_from(v).ok())
        .and_then(|v| Decimal::try_from_i128_with_scale(v, WEI_DECIMALS).ok())
        .ok_or_else(out_of_range)?;

    whole
        .checked_add(fraction)
        .map(|d| d.normalize())
        .ok_or_else(out_of_range)
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
