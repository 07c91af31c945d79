use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Coin, Order, StdResult, Storage, Timestamp};
use cw_storage_plus::{Item, Map};

use crate::authorization::Authorization;
use crate::msg::is_deposit_grant_key;

#[cw_serde]
pub struct Config {
    /// Escrow contract receiving scoped deposits (None = deposits disabled)
    pub deposit_escrow: Option<Addr>,
    /// Seconds until undelegated stake is claimable, no shorter than the chain's unbonding time
    pub unbonding_period: u64,
}

#[cw_serde]
pub struct Grant {
    /// Granter (on whose behalf messages are executed)
    pub granter: Addr,
    /// Grantee (who may execute)
    pub grantee: Addr,
    /// Policy constraining what the grantee may do
    pub authorization: Authorization,
    /// Expiration instant (None = never)
    pub expiration: Option<Timestamp>,
}

/// Composite identity of a grant: at most one grant exists per key
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct GrantKey {
    pub granter: Addr,
    pub grantee: Addr,
    pub msg_type_url: String,
}

impl GrantKey {
    pub fn new(granter: Addr, grantee: Addr, msg_type_url: impl Into<String>) -> Self {
        GrantKey {
            granter,
            grantee,
            msg_type_url: msg_type_url.into(),
        }
    }

    fn primary(&self) -> (&Addr, &Addr, &str) {
        (&self.granter, &self.grantee, self.msg_type_url.as_str())
    }

    fn by_grantee(&self) -> (&Addr, &Addr, &str) {
        (&self.grantee, &self.granter, self.msg_type_url.as_str())
    }
}

pub const CONFIG: Item<Config> = Item::new("config");

/// Grants indexed by (granter, grantee, msg_type_url)
pub const GRANTS: Map<(&Addr, &Addr, &str), Grant> = Map::new("grants");

/// Grants by grantee (for queries)
/// Key: (grantee, granter, msg_type_url)
pub const GRANTEE_GRANTS: Map<(&Addr, &Addr, &str), ()> = Map::new("grantee_grants");

/// Liquid funds each principal keeps in the contract
pub const BALANCES: Map<&Addr, Vec<Coin>> = Map::new("balances");

/// Stake bonded through the contract
/// Key: (delegator, validator)
pub const DELEGATIONS: Map<(&Addr, &str), Coin> = Map::new("delegations");

/// Undelegated stake waiting out the unbonding period
pub const UNBONDING: Map<&Addr, Vec<Unbonding>> = Map::new("unbonding");

#[cw_serde]
pub struct Unbonding {
    pub amount: Coin,
    /// Claimable from this instant on
    pub release_at: Timestamp,
}

pub fn load_grant(storage: &dyn Storage, key: &GrantKey) -> StdResult<Option<Grant>> {
    GRANTS.may_load(storage, key.primary())
}

pub fn grant_exists(storage: &dyn Storage, key: &GrantKey) -> bool {
    GRANTS.has(storage, key.primary())
}

pub fn save_grant(storage: &mut dyn Storage, key: &GrantKey, grant: &Grant) -> StdResult<()> {
    GRANTS.save(storage, key.primary(), grant)?;
    GRANTEE_GRANTS.save(storage, key.by_grantee(), &())
}

pub fn remove_grant(storage: &mut dyn Storage, key: &GrantKey) {
    GRANTS.remove(storage, key.primary());
    GRANTEE_GRANTS.remove(storage, key.by_grantee());
}

/// Keys of every deposit grant from `granter` to `grantee`, expired ones included
pub fn deposit_grant_keys(
    storage: &dyn Storage,
    granter: &Addr,
    grantee: &Addr,
) -> StdResult<Vec<GrantKey>> {
    let mut keys = vec![];
    for msg_type_url in GRANTS
        .prefix((granter, grantee))
        .keys(storage, None, None, Order::Ascending)
    {
        let msg_type_url = msg_type_url?;
        if is_deposit_grant_key(&msg_type_url) {
            keys.push(GrantKey::new(granter.clone(), grantee.clone(), msg_type_url));
        }
    }
    Ok(keys)
}
