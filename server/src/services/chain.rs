//! On-chain collaborators
//!
//! The settlement core only ever reads from the chain: the available TKOIN
//! balance of a wallet when staking, and the treasury/supply snapshot when
//! sizing a burn. Both are trait objects so tests can substitute fixed
//! values.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tkoin_types::TkoinAmount;
use tracing::debug;

use crate::error::{SettlementError, SettlementResult};

/// Available on-chain TKOIN for a wallet
#[async_trait]
pub trait OnChainBalanceReader: Send + Sync {
    async fn available_balance(&self, wallet: &str) -> SettlementResult<TkoinAmount>;
}

/// Supply figures used to size a burn
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TreasurySnapshot {
    pub treasury_balance: TkoinAmount,
    pub total_supply: TkoinAmount,
    pub circulating_supply: TkoinAmount,
}

#[async_trait]
pub trait TreasuryOracle: Send + Sync {
    async fn snapshot(&self, treasury_wallet: &str) -> SettlementResult<TreasurySnapshot>;
}

/// Solana JSON-RPC reader for the TKOIN mint
pub struct SolanaRpcReader {
    client: Client,
    rpc_url: String,
    mint: String,
}

impl SolanaRpcReader {
    pub fn new(rpc_url: &str, mint: &str) -> SettlementResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SettlementError::Internal(format!("Failed to build RPC client: {e}")))?;
        Ok(Self {
            client,
            rpc_url: rpc_url.to_string(),
            mint: mint.to_string(),
        })
    }

    async fn call(&self, method: &str, params: Value) -> SettlementResult<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response: Value = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SettlementError::OnChain(format!("{method}: {e}")))?
            .error_for_status()
            .map_err(|e| SettlementError::OnChain(format!("{method}: {e}")))?
            .json()
            .await
            .map_err(|e| SettlementError::OnChain(format!("{method}: invalid response: {e}")))?;

        if let Some(err) = response.get("error") {
            return Err(SettlementError::OnChain(format!("{method}: {err}")));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| SettlementError::OnChain(format!("{method}: missing result")))
    }

    async fn token_balance_of(&self, owner: &str) -> SettlementResult<TkoinAmount> {
        let result = self
            .call(
                "getTokenAccountsByOwner",
                json!([owner, { "mint": self.mint }, { "encoding": "jsonParsed" }]),
            )
            .await?;
        let accounts = result
            .get("value")
            .and_then(Value::as_array)
            .ok_or_else(|| SettlementError::OnChain("token accounts: missing value".into()))?;

        let mut total = TkoinAmount::ZERO;
        for account in accounts {
            let amount = account
                .pointer("/account/data/parsed/info/tokenAmount/amount")
                .and_then(Value::as_str)
                .ok_or_else(|| SettlementError::OnChain("token account without amount".into()))?;
            total = total
                .checked_add(parse_base_units(amount)?)
                .ok_or_else(|| SettlementError::OnChain("token balance overflow".into()))?;
        }
        debug!(accounts = accounts.len(), balance = total.base_units(), "Read on-chain balance");
        Ok(total)
    }
}

fn parse_base_units(raw: &str) -> SettlementResult<TkoinAmount> {
    raw.parse::<i64>()
        .map(TkoinAmount)
        .map_err(|_| SettlementError::OnChain(format!("unparseable token amount {raw:?}")))
}

#[async_trait]
impl OnChainBalanceReader for SolanaRpcReader {
    async fn available_balance(&self, wallet: &str) -> SettlementResult<TkoinAmount> {
        self.token_balance_of(wallet).await
    }
}

#[async_trait]
impl TreasuryOracle for SolanaRpcReader {
    async fn snapshot(&self, treasury_wallet: &str) -> SettlementResult<TreasurySnapshot> {
        let supply = self.call("getTokenSupply", json!([self.mint])).await?;
        let raw_supply = supply
            .pointer("/value/amount")
            .and_then(Value::as_str)
            .ok_or_else(|| SettlementError::OnChain("token supply: missing amount".into()))?;
        let total_supply = parse_base_units(raw_supply)?;
        let treasury_balance = self.token_balance_of(treasury_wallet).await?;

        Ok(TreasurySnapshot {
            treasury_balance,
            total_supply,
            circulating_supply: total_supply.saturating_sub(treasury_balance),
        })
    }
}
