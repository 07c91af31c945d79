use cosmwasm_std::StdError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContractError {
    #[error("{0}")]
    Std(#[from] StdError),

    #[error("grantee and granter should be different")]
    SelfGrant {},

    #[error("grant already exists")]
    GrantExists {},

    #[error("authorization not found")]
    AuthorizationNotFound {},

    #[error("expiration must be after the current block time")]
    InvalidExpiration {},

    #[error("invalid authorization type, {authorization_type}")]
    InvalidAuthorizationType { authorization_type: String },

    #[error("{field} is required")]
    MissingField { field: String },

    #[error("unknown message type {type_url}")]
    UnknownMsgType { type_url: String },

    #[error("invalid coin {input}")]
    InvalidCoin { input: String },

    #[error("spend-limit should be greater than zero")]
    InvalidSpendLimit {},

    #[error("duplicate denomination {denom} in spend-limit")]
    DuplicateDenom { denom: String },

    #[error("duplicate address {address} in allow-list")]
    DuplicateAddress { address: String },

    #[error("invalid denom {denom}, should match the current bond denom {bond_denom}")]
    InvalidBondDenom { denom: String, bond_denom: String },

    #[error("cannot set both allowed & deny list")]
    ConflictingValidatorLists {},

    #[error("invalid scope {scope}")]
    InvalidScope { scope: String },

    #[error("duplicate scope {scope}")]
    DuplicateScope { scope: String },

    #[error("scope cannot be empty")]
    EmptyScopes {},

    #[error("messages cannot be empty")]
    EmptyMsgs {},

    #[error("type mismatch: authorization for {expected} cannot accept {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("requested amount is more than spend limit")]
    SpendLimitExceeded {},

    #[error("cannot send to {address} address")]
    RecipientNotAllowed { address: String },

    #[error("cannot delegate/undelegate to {validator} validator")]
    ValidatorNotAllowed { validator: String },

    #[error("deposit scope {scope} is not authorized")]
    ScopeNotAuthorized { scope: String },

    #[error("deposit escrow not configured")]
    EscrowNotConfigured {},

    #[error("Amount must be greater than zero")]
    InvalidAmount {},

    #[error("insufficient funds: {owner} holds {available}")]
    InsufficientFunds { owner: String, available: String },

    #[error("insufficient delegation: {owner} has {available} bonded to {validator}")]
    InsufficientDelegation {
        owner: String,
        validator: String,
        available: String,
    },

    #[error("No funds sent")]
    NoFunds {},

    #[error("nothing to claim")]
    NothingToClaim {},
}
