use authz_shared::{all_positive, DepositScope};
use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::{Addr, Api, Coin, Timestamp};

use crate::authorization::Authorization;
use crate::error::ContractError;
use crate::state::{Config, Unbonding};

pub const SEND_TYPE_URL: &str = "/cosmos.bank.v1beta1.MsgSend";
pub const DELEGATE_TYPE_URL: &str = "/cosmos.staking.v1beta1.MsgDelegate";
pub const UNDELEGATE_TYPE_URL: &str = "/cosmos.staking.v1beta1.MsgUndelegate";
pub const REDELEGATE_TYPE_URL: &str = "/cosmos.staking.v1beta1.MsgBeginRedelegate";
pub const DEPOSIT_TYPE_URL: &str = "/akash.escrow.v1.MsgAccountDeposit";

/// Every message type the contract can execute on behalf of a granter
pub const KNOWN_MSG_TYPES: [&str; 5] = [
    SEND_TYPE_URL,
    DELEGATE_TYPE_URL,
    UNDELEGATE_TYPE_URL,
    REDELEGATE_TYPE_URL,
    DEPOSIT_TYPE_URL,
];

pub fn is_known_msg_type(type_url: &str) -> bool {
    KNOWN_MSG_TYPES.contains(&type_url)
}

/// Grant key of a deposit authorization: the deposit type qualified by its scope set,
/// e.g. "/akash.escrow.v1.MsgAccountDeposit:bid,deployment"
pub fn deposit_grant_key(scopes: &[DepositScope]) -> String {
    let mut names: Vec<&str> = scopes.iter().map(DepositScope::as_str).collect();
    names.sort_unstable();
    names.dedup();
    format!("{DEPOSIT_TYPE_URL}:{}", names.join(","))
}

/// True for every key a grant over deposits can be stored under, the bare
/// type URL of an unconditional grant included
pub fn is_deposit_grant_key(key: &str) -> bool {
    key.strip_prefix(DEPOSIT_TYPE_URL)
        .is_some_and(|scopes| scopes.is_empty() || scopes.starts_with(':'))
}

#[cw_serde]
pub struct InstantiateMsg {
    /// Contract that receives forwarded scoped deposits
    pub deposit_escrow: Option<String>,
    /// Defaults to 21 days
    pub unbonding_period: Option<u64>,
}

#[cw_serde]
pub enum ExecuteMsg {
    /// Grant an authorization from the sender to `grantee`
    Grant {
        grantee: String,
        authorization: AuthorizationMsg,
        expiration: Option<Timestamp>,
    },
    /// Revoke the sender's grant to `grantee` for a grant key.
    /// The bare deposit type URL revokes every deposit grant to `grantee`.
    Revoke {
        grantee: String,
        msg_type_url: String,
    },
    /// Execute messages on behalf of their signers (sender is the grantee)
    Exec { msgs: Vec<AuthzMsg> },
    /// Credit the attached funds to the sender's balance
    Fund {},
    /// Pay out part of the sender's balance
    Withdraw { amount: Vec<Coin> },
    /// Move the sender's unbonded stake back into their balance
    ClaimUnbonded {},
}

/// Authorization as submitted, before addresses and limits are validated
#[cw_serde]
pub enum AuthorizationMsg {
    Generic {
        msg_type_url: String,
    },
    Send {
        spend_limit: Vec<Coin>,
        allow_list: Vec<String>,
    },
    Stake {
        authorization_type: StakeAuthorizationType,
        max_tokens: Option<Coin>,
        allow_list: Vec<String>,
        deny_list: Vec<String>,
    },
    Deposit {
        spend_limit: Coin,
        scopes: Vec<String>,
    },
}

#[cw_serde]
#[derive(Copy, Eq)]
pub enum StakeAuthorizationType {
    Delegate,
    Undelegate,
    Redelegate,
}

impl StakeAuthorizationType {
    pub fn msg_type_url(&self) -> &'static str {
        match self {
            StakeAuthorizationType::Delegate => DELEGATE_TYPE_URL,
            StakeAuthorizationType::Undelegate => UNDELEGATE_TYPE_URL,
            StakeAuthorizationType::Redelegate => REDELEGATE_TYPE_URL,
        }
    }
}

/// Messages a grantee may submit on behalf of a granter.
///
/// The granter is always the message signer (`from_address`,
/// `delegator_address` or `depositor`).
#[cw_serde]
pub enum AuthzMsg {
    Send {
        from_address: String,
        to_address: String,
        amount: Vec<Coin>,
    },
    Delegate {
        delegator_address: String,
        validator: String,
        amount: Coin,
    },
    Undelegate {
        delegator_address: String,
        validator: String,
        amount: Coin,
    },
    Redelegate {
        delegator_address: String,
        src_validator: String,
        dst_validator: String,
        amount: Coin,
    },
    Deposit {
        depositor: String,
        scope: DepositScope,
        id: String,
        amount: Coin,
    },
}

impl AuthzMsg {
    pub fn type_url(&self) -> &'static str {
        match self {
            AuthzMsg::Send { .. } => SEND_TYPE_URL,
            AuthzMsg::Delegate { .. } => DELEGATE_TYPE_URL,
            AuthzMsg::Undelegate { .. } => UNDELEGATE_TYPE_URL,
            AuthzMsg::Redelegate { .. } => REDELEGATE_TYPE_URL,
            AuthzMsg::Deposit { .. } => DEPOSIT_TYPE_URL,
        }
    }

    pub fn signer(&self) -> &str {
        match self {
            AuthzMsg::Send { from_address, .. } => from_address,
            AuthzMsg::Delegate {
                delegator_address, ..
            }
            | AuthzMsg::Undelegate {
                delegator_address, ..
            }
            | AuthzMsg::Redelegate {
                delegator_address, ..
            } => delegator_address,
            AuthzMsg::Deposit { depositor, .. } => depositor,
        }
    }

    /// Decode every address the message carries, check its amount is positive
    /// and return the signer
    pub fn validate(&self, api: &dyn Api) -> Result<Addr, ContractError> {
        match self {
            AuthzMsg::Send {
                to_address, amount, ..
            } => {
                if !all_positive(amount) {
                    return Err(ContractError::InvalidAmount {});
                }
                api.addr_validate(to_address)?;
            }
            AuthzMsg::Delegate {
                validator, amount, ..
            }
            | AuthzMsg::Undelegate {
                validator, amount, ..
            } => {
                if amount.amount.is_zero() {
                    return Err(ContractError::InvalidAmount {});
                }
                api.addr_validate(validator)?;
            }
            AuthzMsg::Redelegate {
                src_validator,
                dst_validator,
                amount,
                ..
            } => {
                if amount.amount.is_zero() {
                    return Err(ContractError::InvalidAmount {});
                }
                api.addr_validate(src_validator)?;
                api.addr_validate(dst_validator)?;
            }
            AuthzMsg::Deposit { amount, .. } => {
                if amount.amount.is_zero() {
                    return Err(ContractError::InvalidAmount {});
                }
            }
        }
        Ok(api.addr_validate(self.signer())?)
    }
}

/// Message forwarded to the configured escrow for scoped deposits
#[cw_serde]
pub enum EscrowExecuteMsg {
    Deposit {
        scope: DepositScope,
        id: String,
        depositor: String,
    },
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum QueryMsg {
    /// Grants between a granter and grantee, optionally for one message type
    #[returns(GrantsResponse)]
    Grants {
        granter: String,
        grantee: String,
        msg_type_url: Option<String>,
    },

    /// Grants issued by a granter
    #[returns(GrantsResponse)]
    GranterGrants {
        granter: String,
        start_after: Option<GrantCursor>,
        limit: Option<u32>,
    },

    /// Grants held by a grantee
    #[returns(GrantsResponse)]
    GranteeGrants {
        grantee: String,
        start_after: Option<GrantCursor>,
        limit: Option<u32>,
    },

    /// Funds, stake and pending unbondings a principal keeps in the contract
    #[returns(AccountResponse)]
    Account { address: String },

    #[returns(Config)]
    Config {},
}

/// Pagination cursor: the counterparty address and message type of the last
/// grant returned
#[cw_serde]
pub struct GrantCursor {
    pub address: String,
    pub msg_type_url: String,
}

// Response types

#[cw_serde]
pub struct GrantResponse {
    pub granter: Addr,
    pub grantee: Addr,
    pub authorization: Authorization,
    pub expiration: Option<Timestamp>,
    pub expired: bool,
}

#[cw_serde]
pub struct GrantsResponse {
    pub grants: Vec<GrantResponse>,
}

#[cw_serde]
pub struct DelegationResponse {
    pub validator: String,
    pub amount: Coin,
}

#[cw_serde]
pub struct AccountResponse {
    pub balance: Vec<Coin>,
    pub delegations: Vec<DelegationResponse>,
    pub unbonding: Vec<Unbonding>,
}
