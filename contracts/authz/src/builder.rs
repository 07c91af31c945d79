//! Builders for command-line front ends.
//!
//! A CLI collects flags as plain strings; these helpers turn them into
//! validated authorizations and ready-to-submit messages. Flag registration and
//! transaction signing stay with the caller.

use std::fs;
use std::path::Path;

use authz_shared::expiration_from_seconds;
use cosmwasm_std::{from_json, Api, Coin, QuerierWrapper, StdError, Timestamp, Uint128};

use crate::authorization::Authorization;
use crate::error::ContractError;
use crate::msg::{AuthorizationMsg, AuthzMsg, ExecuteMsg, StakeAuthorizationType};

/// Raw `grant` command flags
#[derive(Clone, Debug, Default)]
pub struct GrantFlags {
    /// One of "generic", "send", "delegate", "unbond", "redelegate", "deposit"
    pub authorization_type: String,
    pub msg_type: Option<String>,
    /// Comma separated coins, e.g. "100uve,5uatom"
    pub spend_limit: Option<String>,
    pub allow_list: Vec<String>,
    pub allowed_validators: Vec<String>,
    pub deny_validators: Vec<String>,
    pub scopes: Vec<String>,
    /// Unix seconds, 0 = no expiration
    pub expiration: Option<u64>,
}

impl GrantFlags {
    /// Map flags onto the submitted form of an authorization
    pub fn to_authorization_msg(&self) -> Result<AuthorizationMsg, ContractError> {
        let spend_limit = match &self.spend_limit {
            Some(raw) => parse_coins(raw)?,
            None => vec![],
        };

        let stake = |authorization_type: StakeAuthorizationType| {
            let max_tokens = match spend_limit.as_slice() {
                [] => None,
                [coin] => Some(coin.clone()),
                _ => {
                    return Err(ContractError::InvalidCoin {
                        input: self.spend_limit.clone().unwrap_or_default(),
                    })
                }
            };
            Ok(AuthorizationMsg::Stake {
                authorization_type,
                max_tokens,
                allow_list: self.allowed_validators.clone(),
                deny_list: self.deny_validators.clone(),
            })
        };

        match self.authorization_type.as_str() {
            "generic" => {
                let msg_type_url = self
                    .msg_type
                    .clone()
                    .filter(|msg_type| !msg_type.is_empty())
                    .ok_or_else(|| ContractError::MissingField {
                        field: "msg-type".to_string(),
                    })?;
                Ok(AuthorizationMsg::Generic { msg_type_url })
            }
            "send" => Ok(AuthorizationMsg::Send {
                spend_limit,
                allow_list: self.allow_list.clone(),
            }),
            "delegate" => stake(StakeAuthorizationType::Delegate),
            "unbond" => stake(StakeAuthorizationType::Undelegate),
            "redelegate" => stake(StakeAuthorizationType::Redelegate),
            "deposit" => {
                let spend_limit = match spend_limit.as_slice() {
                    [coin] => coin.clone(),
                    [] => return Err(ContractError::InvalidSpendLimit {}),
                    _ => {
                        return Err(ContractError::InvalidCoin {
                            input: self.spend_limit.clone().unwrap_or_default(),
                        })
                    }
                };
                Ok(AuthorizationMsg::Deposit {
                    spend_limit,
                    scopes: self.scopes.clone(),
                })
            }
            other => Err(ContractError::InvalidAuthorizationType {
                authorization_type: other.to_string(),
            }),
        }
    }
}

/// Validate `grant` flags into an authorization and its expiration.
///
/// Runs the same checks as the contract so errors surface before a
/// transaction is built.
pub fn build_grant(
    api: &dyn Api,
    querier: &QuerierWrapper,
    now: Timestamp,
    flags: &GrantFlags,
) -> Result<(Authorization, Option<Timestamp>), ContractError> {
    let expiration = expiration_from_seconds(flags.expiration);
    if let Some(expiry) = expiration {
        if expiry <= now {
            return Err(ContractError::InvalidExpiration {});
        }
    }
    let authorization = flags.to_authorization_msg()?.into_checked(api, querier)?;
    Ok((authorization, expiration))
}

/// `Grant` message for the contract; the granter is the signing account
pub fn build_grant_msg(
    granter: &str,
    grantee: &str,
    flags: &GrantFlags,
) -> Result<ExecuteMsg, ContractError> {
    if granter == grantee {
        return Err(ContractError::SelfGrant {});
    }
    Ok(ExecuteMsg::Grant {
        grantee: grantee.to_string(),
        authorization: flags.to_authorization_msg()?,
        expiration: expiration_from_seconds(flags.expiration),
    })
}

pub fn build_revoke_msg(grantee: &str, msg_type_url: &str) -> ExecuteMsg {
    ExecuteMsg::Revoke {
        grantee: grantee.to_string(),
        msg_type_url: msg_type_url.to_string(),
    }
}

/// Build an `Exec` from a JSON file path or inline JSON.
///
/// The JSON is either one message or an array of messages.
pub fn build_exec_msg(source: &str) -> Result<ExecuteMsg, ContractError> {
    Ok(ExecuteMsg::Exec {
        msgs: load_exec_msgs(source)?,
    })
}

pub fn load_exec_msgs(source: &str) -> Result<Vec<AuthzMsg>, ContractError> {
    let trimmed = source.trim_start();
    let raw = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        trimmed.as_bytes().to_vec()
    } else {
        fs::read(Path::new(source)).map_err(|err| {
            StdError::generic_err(format!("failed to read {source}: {err}"))
        })?
    };

    let msgs = match from_json::<Vec<AuthzMsg>>(&raw) {
        Ok(msgs) => msgs,
        Err(_) => vec![from_json::<AuthzMsg>(&raw)?],
    };
    if msgs.is_empty() {
        return Err(ContractError::EmptyMsgs {});
    }
    Ok(msgs)
}

/// Parse a comma separated coin list such as "100uve,5uatom"
pub fn parse_coins(input: &str) -> Result<Vec<Coin>, ContractError> {
    input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_coin)
        .collect()
}

/// Parse a single coin such as "100uve"
pub fn parse_coin(input: &str) -> Result<Coin, ContractError> {
    let invalid = || ContractError::InvalidCoin {
        input: input.to_string(),
    };
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (amount, denom) = input.split_at(split);
    if amount.is_empty() || !is_valid_denom(denom) {
        return Err(invalid());
    }
    let amount: u128 = amount.parse().map_err(|_| invalid())?;
    Ok(Coin {
        denom: denom.to_string(),
        amount: Uint128::new(amount),
    })
}

// Cosmos denom: a letter, then 2-127 of [a-zA-Z0-9/:._-]
fn is_valid_denom(denom: &str) -> bool {
    let mut chars = denom.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphabetic()
        && (3..=128).contains(&denom.len())
        && chars.all(|c| c.is_ascii_alphanumeric() || "/:._-".contains(c))
}
