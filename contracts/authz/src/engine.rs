use std::collections::{BTreeMap, BTreeSet};

use authz_shared::{is_expired, DepositScope};
use cosmwasm_std::{Addr, Api, StdResult, Storage, Timestamp};

use crate::authorization::{Accepted, Authorization};
use crate::error::ContractError;
use crate::ledger::StagedLedger;
use crate::msg::{is_deposit_grant_key, AuthzMsg};
use crate::state::{
    deposit_grant_keys, load_grant, remove_grant, save_grant, Config, Grant, GrantKey,
};

/// What an accepted message did to its grant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantOutcome {
    /// Signer is the grantee, no grant involved
    Implicit,
    Unchanged,
    Updated,
    Deleted,
}

impl GrantOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantOutcome::Implicit => "implicit",
            GrantOutcome::Unchanged => "unchanged",
            GrantOutcome::Updated => "updated",
            GrantOutcome::Deleted => "deleted",
        }
    }
}

/// An accepted message, ready to be forwarded as its granter
#[derive(Debug)]
pub struct Dispatch {
    pub granter: Addr,
    pub msg: AuthzMsg,
    pub outcome: GrantOutcome,
}

/// Grant writes of one exec, held back until every message is accepted
#[derive(Debug, Default)]
pub struct StagedGrants {
    pending: BTreeMap<GrantKey, Option<Grant>>,
}

impl StagedGrants {
    fn get(&self, storage: &dyn Storage, key: &GrantKey) -> StdResult<Option<Grant>> {
        match self.pending.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => load_grant(storage, key),
        }
    }

    /// The grant from `granter` to `grantee` covering deposits into `scope`:
    /// an unconditional grant for the deposit type or a deposit grant listing it
    fn find_deposit(
        &self,
        storage: &dyn Storage,
        granter: &Addr,
        grantee: &Addr,
        scope: DepositScope,
    ) -> StdResult<Option<(GrantKey, Grant)>> {
        let mut keys: BTreeSet<GrantKey> = deposit_grant_keys(storage, granter, grantee)?
            .into_iter()
            .collect();
        keys.extend(
            self.pending
                .keys()
                .filter(|key| {
                    key.granter == *granter
                        && key.grantee == *grantee
                        && is_deposit_grant_key(&key.msg_type_url)
                })
                .cloned(),
        );

        for key in keys {
            if let Some(grant) = self.get(storage, &key)? {
                let covers = match &grant.authorization {
                    Authorization::Generic { .. } => true,
                    authorization => authorization.scopes().contains(&scope),
                };
                if covers {
                    return Ok(Some((key, grant)));
                }
            }
        }
        Ok(None)
    }

    fn put(&mut self, key: GrantKey, grant: Grant) {
        self.pending.insert(key, Some(grant));
    }

    fn delete(&mut self, key: GrantKey) {
        self.pending.insert(key, None);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply every staged write
    pub fn commit(self, storage: &mut dyn Storage) -> StdResult<()> {
        for (key, staged) in self.pending {
            match staged {
                Some(grant) => save_grant(storage, &key, &grant)?,
                None => remove_grant(storage, &key),
            }
        }
        Ok(())
    }
}

/// Accepted messages of one exec and the writes they cause
#[derive(Debug)]
pub struct Evaluation {
    pub dispatches: Vec<Dispatch>,
    pub grants: StagedGrants,
    pub ledger: StagedLedger,
}

/// Evaluate `msgs` submitted by `grantee` against the stored grants and
/// charge each one to its granter's custody.
///
/// Nothing is written: the caller commits the returned writes once it has
/// built the forwarded messages. Any rejection discards the whole batch.
pub fn evaluate(
    api: &dyn Api,
    storage: &dyn Storage,
    now: Timestamp,
    config: &Config,
    grantee: &Addr,
    msgs: Vec<AuthzMsg>,
) -> Result<Evaluation, ContractError> {
    if msgs.is_empty() {
        return Err(ContractError::EmptyMsgs {});
    }

    let mut grants = StagedGrants::default();
    let mut ledger = StagedLedger::default();
    let mut dispatches = Vec::with_capacity(msgs.len());
    let release_at = now.plus_seconds(config.unbonding_period);

    for msg in msgs {
        let granter = msg.validate(api)?;
        let outcome = if granter == *grantee {
            GrantOutcome::Implicit
        } else {
            authorize(api, storage, now, &mut grants, &granter, grantee, &msg)?
        };
        ledger.settle(storage, &granter, &msg, release_at)?;

        dispatches.push(Dispatch {
            granter,
            msg,
            outcome,
        });
    }

    Ok(Evaluation {
        dispatches,
        grants,
        ledger,
    })
}

fn authorize(
    api: &dyn Api,
    storage: &dyn Storage,
    now: Timestamp,
    grants: &mut StagedGrants,
    granter: &Addr,
    grantee: &Addr,
    msg: &AuthzMsg,
) -> Result<GrantOutcome, ContractError> {
    let found = match msg {
        AuthzMsg::Deposit { scope, .. } => grants.find_deposit(storage, granter, grantee, *scope)?,
        _ => {
            let key = GrantKey::new(granter.clone(), grantee.clone(), msg.type_url());
            grants.get(storage, &key)?.map(|grant| (key, grant))
        }
    };
    let (key, grant) = found.ok_or(ContractError::AuthorizationNotFound {})?;

    // Expired grants stay in storage but are never honoured
    if is_expired(now, grant.expiration) {
        api.debug(&format!(
            "authz: grant {}/{}/{} expired",
            key.granter, key.grantee, key.msg_type_url
        ));
        return Err(ContractError::AuthorizationNotFound {});
    }

    let outcome = match grant.authorization.accept(msg)? {
        Accepted::Unchanged => GrantOutcome::Unchanged,
        Accepted::Updated(authorization) => {
            grants.put(
                key,
                Grant {
                    authorization,
                    ..grant
                },
            );
            GrantOutcome::Updated
        }
        Accepted::Exhausted => {
            grants.delete(key);
            GrantOutcome::Deleted
        }
    };
    Ok(outcome)
}
