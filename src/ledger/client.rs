use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{
    backoff, failure_policy, Config as BreakerConfig, Error as FailsafeError, StateMachine,
};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::config::Config;
use crate::domain::Address;
use crate::ports::{
    ContractCall, EventQuery, Ledger, LedgerError, LedgerResult, ProductActors, ProductBasicInfo,
    ProductFees, RawEvent, SendOptions, TxReceipt,
};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_RESET_TIMEOUT_SECS: u64 = 60;

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct RoleResponse {
    #[serde(default)]
    role: String,
}

#[derive(Debug, Deserialize)]
struct BlockResponse {
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct GasResponse {
    gas: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct EstimateRequest<'a> {
    call: &'a ContractCall,
    from: &'a Address,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    call: &'a ContractCall,
    #[serde(flatten)]
    options: &'a SendOptions,
}

/// HTTP client for the ledger gateway that fronts the supply-chain contract.
#[derive(Clone)]
pub struct LedgerClient {
    client: Client,
    base_url: String,
    circuit_breaker: Breaker,
}

impl LedgerClient {
    /// Creates a new LedgerClient with the specified base URL
    pub fn new(base_url: String) -> Self {
        Self::build(
            base_url,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            DEFAULT_FAILURE_THRESHOLD,
            DEFAULT_RESET_TIMEOUT_SECS,
        )
    }

    /// Creates a new LedgerClient with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        Self::build(
            base_url,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            failure_threshold,
            reset_timeout_secs,
        )
    }

    pub fn from_config(config: &Config) -> Self {
        Self::build(
            config.ledger_url.clone(),
            Duration::from_secs(config.ledger_timeout_secs),
            config.circuit_breaker_threshold,
            config.circuit_breaker_reset_secs,
        )
    }

    fn build(
        base_url: String,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = BreakerConfig::new().failure_policy(policy).build();

        LedgerClient {
            client,
            base_url,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Runs a request through the circuit breaker. Only outages count as
    /// failures; a rejected transaction or a missing product does not trip it.
    async fn guarded<T, F>(&self, request: F) -> LedgerResult<T>
    where
        F: Future<Output = LedgerResult<T>>,
    {
        let result = self
            .circuit_breaker
            .call_with(|err: &LedgerError| err.is_outage(), request)
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(LedgerError::CircuitBreakerOpen(
                "Ledger gateway circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    /// GET returning `None` on 404.
    async fn get_json<T>(
        &self,
        path: String,
        query: Vec<(&'static str, String)>,
    ) -> LedgerResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let url = self.url(&path);
        let client = self.client.clone();

        self.guarded(async move {
            let response = client.get(&url).query(&query).send().await?;
            let status = response.status();

            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if status.is_server_error() {
                return Err(LedgerError::Unavailable(format!("{} returned {}", path, status)));
            }
            if !status.is_success() {
                return Err(LedgerError::InvalidResponse(format!(
                    "{} returned {}",
                    path, status
                )));
            }

            let body = response
                .json::<T>()
                .await
                .map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;
            Ok(Some(body))
        })
        .await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> LedgerResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let payload =
            serde_json::to_value(body).map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;
        let client = self.client.clone();

        self.guarded(async move {
            let response = client.post(&url).json(&payload).send().await?;
            let status = response.status();

            if status.is_success() {
                return response
                    .json::<T>()
                    .await
                    .map_err(|e| LedgerError::InvalidResponse(e.to_string()));
            }

            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status.to_string(),
            };

            if status.is_server_error() {
                Err(LedgerError::Unavailable(message))
            } else {
                Err(LedgerError::Rejected(message))
            }
        })
        .await
    }

    async fn get_product_record<T>(&self, id: u64, suffix: &str) -> LedgerResult<T>
    where
        T: DeserializeOwned,
    {
        self.get_json(format!("/products/{}{}", id, suffix), Vec::new())
            .await?
            .ok_or(LedgerError::ProductNotFound(id))
    }
}

#[async_trait]
impl Ledger for LedgerClient {
    fn circuit_state(&self) -> Option<String> {
        Some(LedgerClient::circuit_state(self))
    }

    async fn product_count(&self) -> LedgerResult<u64> {
        let body: CountResponse = self
            .get_json("/products/count".to_string(), Vec::new())
            .await?
            .ok_or_else(|| LedgerError::InvalidResponse("product counter missing".to_string()))?;
        Ok(body.count)
    }

    async fn product_basic_info(&self, id: u64) -> LedgerResult<ProductBasicInfo> {
        self.get_product_record(id, "").await
    }

    async fn product_fees(&self, id: u64) -> LedgerResult<ProductFees> {
        self.get_product_record(id, "/fees").await
    }

    async fn product_actors(&self, id: u64) -> LedgerResult<ProductActors> {
        self.get_product_record(id, "/actors").await
    }

    async fn user_role(&self, address: &Address) -> LedgerResult<String> {
        let body: Option<RoleResponse> = self
            .get_json(format!("/roles/{}", address), Vec::new())
            .await?;
        Ok(body.map(|b| b.role).unwrap_or_default())
    }

    async fn past_events(&self, query: &EventQuery) -> LedgerResult<Vec<RawEvent>> {
        let mut params = vec![("fromBlock", query.from_block.to_string())];
        if let Some(kind) = query.kind {
            params.push(("kind", kind.ledger_name().to_string()));
        }
        if let Some(product_id) = query.product_id {
            params.push(("productId", product_id.to_string()));
        }
        params.push((
            "toBlock",
            query
                .to_block
                .map(|block| block.to_string())
                .unwrap_or_else(|| "latest".to_string()),
        ));

        Ok(self
            .get_json("/events".to_string(), params)
            .await?
            .unwrap_or_default())
    }

    async fn block_timestamp(&self, block_number: u64) -> LedgerResult<DateTime<Utc>> {
        let block: BlockResponse = self
            .get_json(format!("/blocks/{}", block_number), Vec::new())
            .await?
            .ok_or(LedgerError::BlockNotFound(block_number))?;

        Utc.timestamp_opt(block.timestamp, 0).single().ok_or_else(|| {
            LedgerError::InvalidResponse(format!(
                "block {} has invalid timestamp {}",
                block_number, block.timestamp
            ))
        })
    }

    async fn estimate_gas(&self, call: &ContractCall, from: &Address) -> LedgerResult<u64> {
        let body: GasResponse = self
            .post_json("/transactions/estimate", &EstimateRequest { call, from })
            .await?;
        Ok(body.gas)
    }

    async fn submit(&self, call: &ContractCall, options: &SendOptions) -> LedgerResult<TxReceipt> {
        tracing::debug!(
            method = call.method_name(),
            from = %options.from,
            value = %options.value,
            "Submitting ledger transaction"
        );
        self.post_json("/transactions", &SubmitRequest { call, options })
            .await
    }
}
