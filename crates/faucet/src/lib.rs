//! Devnet airdrop faucet
//!
//! Accepts a wallet address and an amount, applies a per-wallet quota and
//! asks the ledger RPC node to airdrop the funds:
//! - Fixed window quota per wallet (2 requests per hour by default)
//! - Bounded, expiring quota store (LRU capacity + ttl)
//! - JSON-RPC disbursement via `requestAirdrop`
//! - Prometheus metrics and structured logging

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod rpc;
pub mod store;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::FaucetConfig;
pub use error::{FaucetError, FaucetResult};
pub use gate::{AirdropRequest, AirdropResponse, Decision, QuotaPolicy, RequestGate};
pub use rpc::{Disburser, SolanaRpcClient, LAMPORTS_PER_SOL};
pub use store::{spawn_sweeper, QuotaStore, UsageRecord};
