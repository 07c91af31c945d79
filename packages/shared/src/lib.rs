// Shared value types and helpers for the authz contracts

use std::fmt;

use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Coin, StdResult, Timestamp};

/// Targets a scoped deposit grant may fund
#[cw_serde]
#[derive(Copy, Eq, PartialOrd, Ord)]
pub enum DepositScope {
    Deployment,
    Bid,
}

impl DepositScope {
    pub const ALL: [DepositScope; 2] = [DepositScope::Deployment, DepositScope::Bid];

    pub fn as_str(&self) -> &'static str {
        match self {
            DepositScope::Deployment => "deployment",
            DepositScope::Bid => "bid",
        }
    }

    /// Resolve a scope by its name, as given on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scope| scope.as_str() == name)
    }
}

impl fmt::Display for DepositScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Common helper functions

/// Check if an optional expiration has passed (`None` = never expires)
pub fn is_expired(now: Timestamp, expiration: Option<Timestamp>) -> bool {
    matches!(expiration, Some(expiry) if expiry <= now)
}

/// Translate a unix-seconds expiration flag, where 0 means no expiration
pub fn expiration_from_seconds(seconds: Option<u64>) -> Option<Timestamp> {
    match seconds {
        None | Some(0) => None,
        Some(secs) => Some(Timestamp::from_seconds(secs)),
    }
}

/// True when the list is non-empty and every amount is strictly positive
pub fn all_positive(coins: &[Coin]) -> bool {
    !coins.is_empty() && coins.iter().all(|coin| !coin.amount.is_zero())
}

/// Subtract `spend` from `limit` denom by denom.
///
/// Returns `None` if a spent denom is absent from the limit or the limit would
/// go negative. Denoms that reach zero are dropped, so an exhausted limit is
/// returned as an empty list.
pub fn checked_sub_coins(limit: &[Coin], spend: &[Coin]) -> Option<Vec<Coin>> {
    let mut left = limit.to_vec();
    for coin in spend.iter().filter(|coin| !coin.amount.is_zero()) {
        let entry = left.iter_mut().find(|entry| entry.denom == coin.denom)?;
        entry.amount = entry.amount.checked_sub(coin.amount).ok()?;
    }
    left.retain(|coin| !coin.amount.is_zero());
    Some(left)
}

/// Add `add` to `balance` denom by denom, sorted by denom. Zero amounts are skipped.
pub fn add_coins(balance: &[Coin], add: &[Coin]) -> StdResult<Vec<Coin>> {
    let mut total = balance.to_vec();
    for coin in add.iter().filter(|coin| !coin.amount.is_zero()) {
        match total.iter_mut().find(|entry| entry.denom == coin.denom) {
            Some(entry) => entry.amount = entry.amount.checked_add(coin.amount)?,
            None => total.push(coin.clone()),
        }
    }
    total.sort_by(|a, b| a.denom.cmp(&b.denom));
    Ok(total)
}

/// Single-denom variant of [`checked_sub_coins`]. The residual may be zero.
pub fn checked_sub_coin(limit: &Coin, spend: &Coin) -> Option<Coin> {
    if limit.denom != spend.denom {
        return None;
    }
    let amount = limit.amount.checked_sub(spend.amount).ok()?;
    Some(Coin {
        denom: limit.denom.clone(),
        amount,
    })
}

/// First item that appears more than once
pub fn first_duplicate<T: PartialEq>(items: &[T]) -> Option<&T> {
    items
        .iter()
        .enumerate()
        .find(|(i, item)| items[..*i].contains(item))
        .map(|(_, item)| item)
}
