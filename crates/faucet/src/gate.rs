//! Request gate
//!
//! Decides whether an airdrop request may proceed under the per-wallet quota
//! and, once admitted, hands it to the [`Disburser`].
//!
//! Quota is a fixed window counter: each wallet gets `limit` admissions per
//! `window`, counted from its first admitted request. The window resets on
//! the first request after it has elapsed. Rejected requests are not
//! counted, and a failed disbursement still consumes its unit of quota.

use crate::clock::{Clock, SystemClock};
use crate::config::FaucetConfig;
use crate::error::{FaucetError, FaucetResult};
use crate::metrics::{
    AIRDROPS_TOTAL, DISBURSE_LATENCY, DOWNSTREAM_FAILURES_TOTAL, INVALID_REQUESTS_TOTAL,
    RATE_LIMITED_TOTAL, REQUESTS_TOTAL, TRACKED_WALLETS,
};
use crate::rpc::{Disburser, LAMPORTS_PER_SOL};
use crate::store::{QuotaStore, UsageRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Admissions allowed per wallet per window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub limit: u32,
    pub window: Duration,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            limit: 2,
            window: Duration::from_secs(60 * 60),
        }
    }
}

impl From<&FaucetConfig> for QuotaPolicy {
    fn from(config: &FaucetConfig) -> Self {
        Self {
            limit: config.max_requests_per_window,
            window: config.rate_limit_duration(),
        }
    }
}

/// Outcome of the quota check for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Request admitted; `count` is the wallet's usage including this one
    Admit { count: u32 },
    /// Quota exhausted until the current window ends
    Reject { retry_after: Duration },
}

/// Airdrop request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirdropRequest {
    #[serde(default)]
    pub wallet_address: Option<String>,
    /// Whole tokens, either a JSON number or a numeric string
    #[serde(default)]
    pub amount: Option<Value>,
}

/// Successful airdrop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirdropResponse {
    pub message: String,
    pub signature: String,
}

/// Whether the client actually supplied an amount. Zero, empty strings,
/// `false` and `null` count as missing.
fn amount_given(amount: &Value) -> bool {
    match amount {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn validate(request: &AirdropRequest) -> FaucetResult<(&str, &Value)> {
    let wallet = request
        .wallet_address
        .as_deref()
        .filter(|w| !w.is_empty())
        .ok_or_else(|| FaucetError::InvalidRequest("walletAddress is required".to_string()))?;

    let amount = request
        .amount
        .as_ref()
        .filter(|a| amount_given(a))
        .ok_or_else(|| FaucetError::InvalidRequest("amount is required".to_string()))?;

    Ok((wallet, amount))
}

/// Human-readable amount, echoed back the way the client sent it
fn display_amount(amount: &Value) -> String {
    match amount {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert whole tokens to lamports
pub fn to_lamports(amount: &Value) -> FaucetResult<u64> {
    let tokens = match amount {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| FaucetError::Downstream(format!("Malformed amount: {}", amount)))?;

    let lamports = (tokens * LAMPORTS_PER_SOL as f64).round();
    if !lamports.is_finite() || lamports < 1.0 || lamports > u64::MAX as f64 {
        return Err(FaucetError::Downstream(format!("Amount out of range: {}", amount)));
    }
    Ok(lamports as u64)
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Quota check in front of the disbursement call
pub struct RequestGate {
    store: Arc<QuotaStore>,
    policy: QuotaPolicy,
    disburser: Arc<dyn Disburser>,
    clock: Arc<dyn Clock>,
}

impl RequestGate {
    pub fn new(store: Arc<QuotaStore>, policy: QuotaPolicy, disburser: Arc<dyn Disburser>) -> Self {
        Self::with_clock(store, policy, disburser, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<QuotaStore>,
        policy: QuotaPolicy,
        disburser: Arc<dyn Disburser>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            policy,
            disburser,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<QuotaStore> {
        &self.store
    }

    pub fn policy(&self) -> QuotaPolicy {
        self.policy
    }

    /// Admit or reject one request from `wallet` at `now`.
    ///
    /// The lookup, decision and write happen atomically in the store, so
    /// concurrent requests for the same wallet can never admit more than
    /// `limit` times per window.
    pub fn evaluate(&self, wallet: &str, now: Instant) -> Decision {
        let QuotaPolicy { limit, window } = self.policy;

        self.store.update(wallet, |current| match current {
            None => (Some(UsageRecord::first(now)), Decision::Admit { count: 1 }),
            Some(record) if record.window_elapsed(now, window) => {
                (Some(UsageRecord::first(now)), Decision::Admit { count: 1 })
            }
            Some(record) if record.count < limit => {
                let count = record.count + 1;
                (Some(UsageRecord { count, ..record }), Decision::Admit { count })
            }
            Some(record) => {
                let elapsed = now.saturating_duration_since(record.window_start);
                (
                    None,
                    Decision::Reject {
                        retry_after: window.saturating_sub(elapsed),
                    },
                )
            }
        })
    }

    /// Validate, apply the quota and disburse.
    pub async fn handle(&self, request: &AirdropRequest) -> FaucetResult<AirdropResponse> {
        REQUESTS_TOTAL.inc();

        let (wallet, amount) = validate(request).map_err(|e| {
            INVALID_REQUESTS_TOTAL.inc();
            warn!("Rejected airdrop request: {}", e);
            e
        })?;

        match self.evaluate(wallet, self.clock.now()) {
            Decision::Admit { count } => {
                info!(wallet, count, limit = self.policy.limit, "Airdrop admitted");
            }
            Decision::Reject { retry_after } => {
                RATE_LIMITED_TOTAL.inc();
                let retry_after_secs = ceil_secs(retry_after);
                warn!(wallet, retry_after_secs, "Airdrop rate limited");
                return Err(FaucetError::RateLimited { retry_after_secs });
            }
        }
        TRACKED_WALLETS.set(self.store.len() as i64);

        match self.disburse(wallet, amount).await {
            Ok(signature) => {
                AIRDROPS_TOTAL.inc();
                info!(wallet, %signature, "Airdrop sent");
                Ok(AirdropResponse {
                    message: format!("Successfully airdropped {} sol", display_amount(amount)),
                    signature,
                })
            }
            Err(e) => {
                DOWNSTREAM_FAILURES_TOTAL.inc();
                error!(wallet, error = %e, "Error airdropping");
                Err(e)
            }
        }
    }

    /// Runs the disbursement on its own task so it completes even if the
    /// caller goes away; the quota has already been committed by then.
    async fn disburse(&self, wallet: &str, amount: &Value) -> FaucetResult<String> {
        let lamports = to_lamports(amount)?;
        let disburser = Arc::clone(&self.disburser);
        let wallet = wallet.to_string();

        let timer = DISBURSE_LATENCY.start_timer();
        let joined =
            tokio::spawn(async move { disburser.disburse(&wallet, lamports).await }).await;
        timer.observe_duration();

        match joined {
            Ok(Ok(signature)) => Ok(signature),
            Ok(Err(FaucetError::Downstream(msg))) => Err(FaucetError::Downstream(msg)),
            Ok(Err(other)) => Err(FaucetError::Downstream(other.to_string())),
            Err(e) => Err(FaucetError::Downstream(format!("Disbursement task failed: {}", e))),
        }
    }
}
