use authz_shared::{all_positive, is_expired};
use cosmwasm_std::{
    entry_point, to_json_binary, Addr, BankMsg, Binary, Coin, CosmosMsg, Deps, DepsMut, Env,
    MessageInfo, Order, Response, StakingMsg, StdResult, Timestamp, WasmMsg,
};
use cw2::set_contract_version;
use cw_storage_plus::Bound;

use crate::engine::evaluate;
use crate::error::ContractError;
use crate::ledger::{format_coins, StagedLedger};
use crate::msg::{
    AccountResponse, AuthorizationMsg, AuthzMsg, DelegationResponse, EscrowExecuteMsg,
    ExecuteMsg, GrantCursor, GrantResponse, GrantsResponse, InstantiateMsg, QueryMsg,
    DEPOSIT_TYPE_URL,
};
use crate::state::{
    deposit_grant_keys, grant_exists, load_grant, remove_grant, save_grant, Config, Grant,
    GrantKey, BALANCES, CONFIG, DELEGATIONS, GRANTEE_GRANTS, GRANTS, UNBONDING,
};

const CONTRACT_NAME: &str = "crates.io:authz";
const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_UNBONDING_PERIOD: u64 = 1_814_400; // 21 days

const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 30;

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn instantiate(
    deps: DepsMut,
    _env: Env,
    _info: MessageInfo,
    msg: InstantiateMsg,
) -> Result<Response, ContractError> {
    set_contract_version(deps.storage, CONTRACT_NAME, CONTRACT_VERSION)?;

    let deposit_escrow = msg
        .deposit_escrow
        .map(|escrow| deps.api.addr_validate(&escrow))
        .transpose()?;
    let config = Config {
        deposit_escrow,
        unbonding_period: msg.unbonding_period.unwrap_or(DEFAULT_UNBONDING_PERIOD),
    };
    CONFIG.save(deps.storage, &config)?;

    Ok(Response::new()
        .add_attribute("method", "instantiate")
        .add_attribute("unbonding_period", config.unbonding_period.to_string())
        .add_attribute(
            "deposit_escrow",
            config
                .deposit_escrow
                .map(|escrow| escrow.to_string())
                .unwrap_or_else(|| "none".to_string()),
        ))
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn execute(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    msg: ExecuteMsg,
) -> Result<Response, ContractError> {
    match msg {
        ExecuteMsg::Grant {
            grantee,
            authorization,
            expiration,
        } => execute_grant(deps, env, info, grantee, authorization, expiration),
        ExecuteMsg::Revoke {
            grantee,
            msg_type_url,
        } => execute_revoke(deps, info, grantee, msg_type_url),
        ExecuteMsg::Exec { msgs } => execute_exec(deps, env, info, msgs),
        ExecuteMsg::Fund {} => execute_fund(deps, info),
        ExecuteMsg::Withdraw { amount } => execute_withdraw(deps, info, amount),
        ExecuteMsg::ClaimUnbonded {} => execute_claim_unbonded(deps, env, info),
    }
}

pub fn execute_grant(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    grantee: String,
    authorization: AuthorizationMsg,
    expiration: Option<Timestamp>,
) -> Result<Response, ContractError> {
    // Compared before decoding so malformed self-grants fail the same way
    if info.sender.as_str() == grantee {
        return Err(ContractError::SelfGrant {});
    }

    let grantee_addr = deps.api.addr_validate(&grantee)?;

    if let Some(expiry) = expiration {
        if expiry <= env.block.time {
            return Err(ContractError::InvalidExpiration {});
        }
    }

    let authorization = authorization.into_checked(deps.api, &deps.querier)?;
    let key = GrantKey::new(
        info.sender.clone(),
        grantee_addr.clone(),
        authorization.grant_key(),
    );

    // An expired grant counts as absent and may be replaced
    if let Some(existing) = load_grant(deps.storage, &key)? {
        if !is_expired(env.block.time, existing.expiration) {
            return Err(ContractError::GrantExists {});
        }
    }

    // At most one deposit grant may cover a scope
    let scopes = authorization.scopes();
    if !scopes.is_empty() {
        for other in deposit_grant_keys(deps.storage, &info.sender, &grantee_addr)? {
            let Some(existing) = load_grant(deps.storage, &other)? else {
                continue;
            };
            if !existing
                .authorization
                .scopes()
                .iter()
                .any(|scope| scopes.contains(scope))
            {
                continue;
            }
            if !is_expired(env.block.time, existing.expiration) {
                return Err(ContractError::GrantExists {});
            }
            remove_grant(deps.storage, &other);
        }
    }

    let grant = Grant {
        granter: info.sender.clone(),
        grantee: grantee_addr,
        authorization,
        expiration,
    };
    save_grant(deps.storage, &key, &grant)?;

    Ok(Response::new()
        .add_attribute("method", "grant")
        .add_attribute("granter", info.sender)
        .add_attribute("grantee", grantee)
        .add_attribute("msg_type_url", key.msg_type_url)
        .add_attribute(
            "expiration",
            expiration
                .map(|expiry| expiry.seconds().to_string())
                .unwrap_or_else(|| "none".to_string()),
        ))
}

pub fn execute_revoke(
    deps: DepsMut,
    info: MessageInfo,
    grantee: String,
    msg_type_url: String,
) -> Result<Response, ContractError> {
    let grantee_addr = deps.api.addr_validate(&grantee)?;

    let keys = if msg_type_url == DEPOSIT_TYPE_URL {
        deposit_grant_keys(deps.storage, &info.sender, &grantee_addr)?
    } else {
        let key = GrantKey::new(info.sender.clone(), grantee_addr, msg_type_url);
        if grant_exists(deps.storage, &key) {
            vec![key]
        } else {
            vec![]
        }
    };
    if keys.is_empty() {
        return Err(ContractError::AuthorizationNotFound {});
    }

    let mut response = Response::new()
        .add_attribute("method", "revoke")
        .add_attribute("granter", info.sender.as_str())
        .add_attribute("grantee", grantee);
    for key in keys {
        remove_grant(deps.storage, &key);
        response = response.add_attribute("msg_type_url", key.msg_type_url);
    }
    Ok(response)
}

pub fn execute_exec(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
    msgs: Vec<AuthzMsg>,
) -> Result<Response, ContractError> {
    let config = CONFIG.load(deps.storage)?;
    let evaluation = evaluate(
        deps.api,
        deps.storage,
        env.block.time,
        &config,
        &info.sender,
        msgs,
    )?;

    let mut response = Response::new()
        .add_attribute("method", "exec")
        .add_attribute("grantee", info.sender.as_str());

    for dispatch in evaluation.dispatches {
        response = response
            .add_attribute("granter", dispatch.granter.as_str())
            .add_attribute("msg_type_url", dispatch.msg.type_url())
            .add_attribute("grant_outcome", dispatch.outcome.as_str())
            .add_message(forward(&config, &dispatch.granter, dispatch.msg)?);
    }

    // Forwarded messages run after this returns; a failure there reverts the writes too
    evaluation.grants.commit(deps.storage)?;
    evaluation.ledger.commit(deps.storage)?;

    Ok(response)
}

pub fn execute_fund(deps: DepsMut, info: MessageInfo) -> Result<Response, ContractError> {
    if !all_positive(&info.funds) {
        return Err(ContractError::NoFunds {});
    }

    let mut ledger = StagedLedger::default();
    ledger.credit(deps.storage, &info.sender, &info.funds)?;
    ledger.commit(deps.storage)?;

    Ok(Response::new()
        .add_attribute("method", "fund")
        .add_attribute("owner", info.sender)
        .add_attribute("amount", format_coins(&info.funds)))
}

pub fn execute_withdraw(
    deps: DepsMut,
    info: MessageInfo,
    amount: Vec<Coin>,
) -> Result<Response, ContractError> {
    if !all_positive(&amount) {
        return Err(ContractError::InvalidAmount {});
    }

    let mut ledger = StagedLedger::default();
    ledger.debit(deps.storage, &info.sender, &amount)?;
    ledger.commit(deps.storage)?;

    Ok(Response::new()
        .add_message(BankMsg::Send {
            to_address: info.sender.to_string(),
            amount: amount.clone(),
        })
        .add_attribute("method", "withdraw")
        .add_attribute("owner", info.sender)
        .add_attribute("amount", format_coins(&amount)))
}

pub fn execute_claim_unbonded(
    deps: DepsMut,
    env: Env,
    info: MessageInfo,
) -> Result<Response, ContractError> {
    let mut ledger = StagedLedger::default();
    let claimed = ledger.claim(deps.storage, &info.sender, env.block.time)?;
    ledger.commit(deps.storage)?;

    Ok(Response::new()
        .add_attribute("method", "claim_unbonded")
        .add_attribute("owner", info.sender)
        .add_attribute("amount", format_coins(&claimed)))
}

/// Translate an accepted message into what the host executes
fn forward(config: &Config, granter: &Addr, msg: AuthzMsg) -> Result<CosmosMsg, ContractError> {
    let cosmos_msg: CosmosMsg = match msg {
        AuthzMsg::Send {
            to_address, amount, ..
        } => BankMsg::Send { to_address, amount }.into(),
        AuthzMsg::Delegate {
            validator, amount, ..
        } => StakingMsg::Delegate { validator, amount }.into(),
        AuthzMsg::Undelegate {
            validator, amount, ..
        } => StakingMsg::Undelegate { validator, amount }.into(),
        AuthzMsg::Redelegate {
            src_validator,
            dst_validator,
            amount,
            ..
        } => StakingMsg::Redelegate {
            src_validator,
            dst_validator,
            amount,
        }
        .into(),
        AuthzMsg::Deposit {
            scope, id, amount, ..
        } => {
            let escrow = config
                .deposit_escrow
                .as_ref()
                .ok_or(ContractError::EscrowNotConfigured {})?;
            WasmMsg::Execute {
                contract_addr: escrow.to_string(),
                msg: to_json_binary(&EscrowExecuteMsg::Deposit {
                    scope,
                    id,
                    depositor: granter.to_string(),
                })?,
                funds: vec![amount],
            }
            .into()
        }
    };
    Ok(cosmos_msg)
}

#[cfg_attr(not(feature = "library"), entry_point)]
pub fn query(deps: Deps, env: Env, msg: QueryMsg) -> StdResult<Binary> {
    match msg {
        QueryMsg::Grants {
            granter,
            grantee,
            msg_type_url,
        } => to_json_binary(&query_grants(deps, env, granter, grantee, msg_type_url)?),
        QueryMsg::GranterGrants {
            granter,
            start_after,
            limit,
        } => to_json_binary(&query_granter_grants(
            deps,
            env,
            granter,
            start_after,
            limit,
        )?),
        QueryMsg::GranteeGrants {
            grantee,
            start_after,
            limit,
        } => to_json_binary(&query_grantee_grants(
            deps,
            env,
            grantee,
            start_after,
            limit,
        )?),
        QueryMsg::Account { address } => to_json_binary(&query_account(deps, address)?),
        QueryMsg::Config {} => to_json_binary(&CONFIG.load(deps.storage)?),
    }
}

fn query_grants(
    deps: Deps,
    env: Env,
    granter: String,
    grantee: String,
    msg_type_url: Option<String>,
) -> StdResult<GrantsResponse> {
    let granter_addr = deps.api.addr_validate(&granter)?;
    let grantee_addr = deps.api.addr_validate(&grantee)?;

    let grants = match msg_type_url {
        Some(msg_type_url) if msg_type_url == DEPOSIT_TYPE_URL => {
            deposit_grant_keys(deps.storage, &granter_addr, &grantee_addr)?
                .iter()
                .map(|key| load_grant(deps.storage, key))
                .collect::<StdResult<Vec<_>>>()?
                .into_iter()
                .flatten()
                .map(|grant| grant_to_response(&env, grant))
                .collect::<Vec<_>>()
        }
        Some(msg_type_url) => {
            let key = GrantKey::new(granter_addr, grantee_addr, msg_type_url);
            load_grant(deps.storage, &key)?
                .into_iter()
                .map(|grant| grant_to_response(&env, grant))
                .collect::<Vec<_>>()
        }
        None => GRANTS
            .prefix((&granter_addr, &grantee_addr))
            .range(deps.storage, None, None, Order::Ascending)
            .map(|item| item.map(|(_, grant)| grant_to_response(&env, grant)))
            .collect::<StdResult<Vec<_>>>()?,
    };

    Ok(GrantsResponse { grants })
}

fn query_granter_grants(
    deps: Deps,
    env: Env,
    granter: String,
    start_after: Option<GrantCursor>,
    limit: Option<u32>,
) -> StdResult<GrantsResponse> {
    let granter_addr = deps.api.addr_validate(&granter)?;
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;

    let cursor = start_after
        .map(|cursor| {
            deps.api
                .addr_validate(&cursor.address)
                .map(|addr| (addr, cursor.msg_type_url))
        })
        .transpose()?;
    let min = cursor
        .as_ref()
        .map(|(grantee, msg_type_url)| Bound::exclusive((grantee, msg_type_url.as_str())));

    let grants = GRANTS
        .sub_prefix(&granter_addr)
        .range(deps.storage, min, None, Order::Ascending)
        .take(limit)
        .map(|item| item.map(|(_, grant)| grant_to_response(&env, grant)))
        .collect::<StdResult<Vec<_>>>()?;

    Ok(GrantsResponse { grants })
}

fn query_grantee_grants(
    deps: Deps,
    env: Env,
    grantee: String,
    start_after: Option<GrantCursor>,
    limit: Option<u32>,
) -> StdResult<GrantsResponse> {
    let grantee_addr = deps.api.addr_validate(&grantee)?;
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;

    let cursor = start_after
        .map(|cursor| {
            deps.api
                .addr_validate(&cursor.address)
                .map(|addr| (addr, cursor.msg_type_url))
        })
        .transpose()?;
    let min = cursor
        .as_ref()
        .map(|(granter, msg_type_url)| Bound::exclusive((granter, msg_type_url.as_str())));

    let grants = GRANTEE_GRANTS
        .sub_prefix(&grantee_addr)
        .keys(deps.storage, min, None, Order::Ascending)
        .take(limit)
        .map(|item| {
            let (granter, msg_type_url) = item?;
            let grant = GRANTS.load(
                deps.storage,
                (&granter, &grantee_addr, msg_type_url.as_str()),
            )?;
            Ok(grant_to_response(&env, grant))
        })
        .collect::<StdResult<Vec<_>>>()?;

    Ok(GrantsResponse { grants })
}

fn query_account(deps: Deps, address: String) -> StdResult<AccountResponse> {
    let owner = deps.api.addr_validate(&address)?;

    let delegations = DELEGATIONS
        .prefix(&owner)
        .range(deps.storage, None, None, Order::Ascending)
        .map(|item| item.map(|(validator, amount)| DelegationResponse { validator, amount }))
        .collect::<StdResult<Vec<_>>>()?;

    Ok(AccountResponse {
        balance: BALANCES.may_load(deps.storage, &owner)?.unwrap_or_default(),
        delegations,
        unbonding: UNBONDING.may_load(deps.storage, &owner)?.unwrap_or_default(),
    })
}

fn grant_to_response(env: &Env, grant: Grant) -> GrantResponse {
    GrantResponse {
        expired: is_expired(env.block.time, grant.expiration),
        granter: grant.granter,
        grantee: grant.grantee,
        authorization: grant.authorization,
        expiration: grant.expiration,
    }
}
