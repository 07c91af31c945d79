//! Per-principal custody of the funds and stake the contract holds.
//!
//! Every forwarded message is paid for by its principal: transfers and
//! deposits come out of the principal's balance, staking moves between the
//! balance, the principal's delegations and its unbonding queue. Writes are
//! staged exactly like grant writes and committed with them.

use std::collections::BTreeMap;
use std::slice;

use authz_shared::{add_coins, checked_sub_coin, checked_sub_coins};
use cosmwasm_std::{Addr, Coin, StdError, StdResult, Storage, Timestamp};

use crate::error::ContractError;
use crate::msg::AuthzMsg;
use crate::state::{Unbonding, BALANCES, DELEGATIONS, UNBONDING};

#[derive(Debug, Default)]
pub struct StagedLedger {
    balances: BTreeMap<Addr, Vec<Coin>>,
    delegations: BTreeMap<(Addr, String), Coin>,
    unbonding: BTreeMap<Addr, Vec<Unbonding>>,
}

impl StagedLedger {
    pub fn balance(&self, storage: &dyn Storage, owner: &Addr) -> StdResult<Vec<Coin>> {
        match self.balances.get(owner) {
            Some(staged) => Ok(staged.clone()),
            None => Ok(BALANCES.may_load(storage, owner)?.unwrap_or_default()),
        }
    }

    pub fn credit(
        &mut self,
        storage: &dyn Storage,
        owner: &Addr,
        coins: &[Coin],
    ) -> StdResult<()> {
        let total = add_coins(&self.balance(storage, owner)?, coins)?;
        self.balances.insert(owner.clone(), total);
        Ok(())
    }

    pub fn debit(
        &mut self,
        storage: &dyn Storage,
        owner: &Addr,
        coins: &[Coin],
    ) -> Result<(), ContractError> {
        let balance = self.balance(storage, owner)?;
        let left =
            checked_sub_coins(&balance, coins).ok_or_else(|| ContractError::InsufficientFunds {
                owner: owner.to_string(),
                available: format_coins(&balance),
            })?;
        self.balances.insert(owner.clone(), left);
        Ok(())
    }

    fn delegation(
        &self,
        storage: &dyn Storage,
        owner: &Addr,
        validator: &str,
    ) -> StdResult<Option<Coin>> {
        match self.delegations.get(&(owner.clone(), validator.to_string())) {
            Some(staged) => Ok(Some(staged.clone()).filter(|coin| !coin.amount.is_zero())),
            None => DELEGATIONS.may_load(storage, (owner, validator)),
        }
    }

    fn bond(
        &mut self,
        storage: &dyn Storage,
        owner: &Addr,
        validator: &str,
        amount: &Coin,
    ) -> Result<(), ContractError> {
        let bonded = match self.delegation(storage, owner, validator)? {
            Some(current) if current.denom != amount.denom => {
                return Err(ContractError::InvalidBondDenom {
                    denom: amount.denom.clone(),
                    bond_denom: current.denom,
                })
            }
            Some(current) => Coin {
                amount: current
                    .amount
                    .checked_add(amount.amount)
                    .map_err(StdError::from)?,
                denom: current.denom,
            },
            None => amount.clone(),
        };
        self.delegations.insert((owner.clone(), validator.to_string()), bonded);
        Ok(())
    }

    fn unbond(
        &mut self,
        storage: &dyn Storage,
        owner: &Addr,
        validator: &str,
        amount: &Coin,
    ) -> Result<(), ContractError> {
        let bonded = self
            .delegation(storage, owner, validator)?
            .unwrap_or_else(|| Coin::new(0, amount.denom.clone()));
        let left = checked_sub_coin(&bonded, amount).ok_or_else(|| {
            ContractError::InsufficientDelegation {
                owner: owner.to_string(),
                validator: validator.to_string(),
                available: bonded.to_string(),
            }
        })?;
        self.delegations.insert((owner.clone(), validator.to_string()), left);
        Ok(())
    }

    fn pending_unbonding(
        &self,
        storage: &dyn Storage,
        owner: &Addr,
    ) -> StdResult<Vec<Unbonding>> {
        match self.unbonding.get(owner) {
            Some(staged) => Ok(staged.clone()),
            None => Ok(UNBONDING.may_load(storage, owner)?.unwrap_or_default()),
        }
    }

    /// Charge `msg` to `owner`, who must hold what the message moves.
    ///
    /// Undelegated stake becomes claimable at `release_at`.
    pub fn settle(
        &mut self,
        storage: &dyn Storage,
        owner: &Addr,
        msg: &AuthzMsg,
        release_at: Timestamp,
    ) -> Result<(), ContractError> {
        match msg {
            AuthzMsg::Send { amount, .. } => self.debit(storage, owner, amount),
            AuthzMsg::Deposit { amount, .. } => self.debit(storage, owner, slice::from_ref(amount)),
            AuthzMsg::Delegate {
                validator, amount, ..
            } => {
                self.debit(storage, owner, slice::from_ref(amount))?;
                self.bond(storage, owner, validator, amount)
            }
            AuthzMsg::Undelegate {
                validator, amount, ..
            } => {
                self.unbond(storage, owner, validator, amount)?;
                let mut pending = self.pending_unbonding(storage, owner)?;
                pending.push(Unbonding {
                    amount: amount.clone(),
                    release_at,
                });
                self.unbonding.insert(owner.clone(), pending);
                Ok(())
            }
            AuthzMsg::Redelegate {
                src_validator,
                dst_validator,
                amount,
                ..
            } => {
                self.unbond(storage, owner, src_validator, amount)?;
                self.bond(storage, owner, dst_validator, amount)
            }
        }
    }

    /// Move every unbonding entry released by `now` into the balance
    pub fn claim(
        &mut self,
        storage: &dyn Storage,
        owner: &Addr,
        now: Timestamp,
    ) -> Result<Vec<Coin>, ContractError> {
        let (released, pending): (Vec<_>, Vec<_>) = self
            .pending_unbonding(storage, owner)?
            .into_iter()
            .partition(|entry| entry.release_at <= now);
        if released.is_empty() {
            return Err(ContractError::NothingToClaim {});
        }

        let released: Vec<Coin> = released.into_iter().map(|entry| entry.amount).collect();
        let claimed = add_coins(&[], &released)?;
        self.credit(storage, owner, &claimed)?;
        self.unbonding.insert(owner.clone(), pending);
        Ok(claimed)
    }

    pub fn commit(self, storage: &mut dyn Storage) -> StdResult<()> {
        for (owner, balance) in self.balances {
            if balance.is_empty() {
                BALANCES.remove(storage, &owner);
            } else {
                BALANCES.save(storage, &owner, &balance)?;
            }
        }
        for ((owner, validator), bonded) in self.delegations {
            if bonded.amount.is_zero() {
                DELEGATIONS.remove(storage, (&owner, validator.as_str()));
            } else {
                DELEGATIONS.save(storage, (&owner, validator.as_str()), &bonded)?;
            }
        }
        for (owner, entries) in self.unbonding {
            if entries.is_empty() {
                UNBONDING.remove(storage, &owner);
            } else {
                UNBONDING.save(storage, &owner, &entries)?;
            }
        }
        Ok(())
    }
}

pub fn format_coins(coins: &[Coin]) -> String {
    if coins.is_empty() {
        return "nothing".to_string();
    }
    coins
        .iter()
        .map(Coin::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::testing::{mock_env, MockStorage};
    use cosmwasm_std::{coin, coins};

    fn delegate(validator: &str, amount: u128) -> AuthzMsg {
        AuthzMsg::Delegate {
            delegator_address: "alice".to_string(),
            validator: validator.to_string(),
            amount: coin(amount, "uve"),
        }
    }

    fn funded(storage: &mut MockStorage, owner: &Addr, amount: u128) {
        let mut ledger = StagedLedger::default();
        ledger.credit(storage, owner, &coins(amount, "uve")).unwrap();
        ledger.commit(storage).unwrap();
    }

    #[test]
    fn unfunded_owner_cannot_spend() {
        let storage = MockStorage::new();
        let eve = Addr::unchecked("eve");
        let msg = AuthzMsg::Send {
            from_address: "eve".to_string(),
            to_address: "eve".to_string(),
            amount: coins(1000, "uve"),
        };
        let err = StagedLedger::default()
            .settle(&storage, &eve, &msg, mock_env().block.time)
            .unwrap_err();
        assert_eq!(err.to_string(), "insufficient funds: eve holds nothing");
    }

    #[test]
    fn debits_accumulate_before_commit() {
        let mut storage = MockStorage::new();
        let alice = Addr::unchecked("alice");
        funded(&mut storage, &alice, 100);

        let mut ledger = StagedLedger::default();
        ledger.debit(&storage, &alice, &coins(60, "uve")).unwrap();
        let err = ledger.debit(&storage, &alice, &coins(41, "uve")).unwrap_err();
        assert_eq!(err.to_string(), "insufficient funds: alice holds 40uve");

        // nothing written yet
        assert_eq!(BALANCES.load(&storage, &alice).unwrap(), coins(100, "uve"));
        ledger.debit(&storage, &alice, &coins(40, "uve")).unwrap();
        ledger.commit(&mut storage).unwrap();
        assert!(!BALANCES.has(&storage, &alice));
    }

    #[test]
    fn stake_moves_between_balance_delegations_and_unbonding() {
        let mut storage = MockStorage::new();
        let alice = Addr::unchecked("alice");
        funded(&mut storage, &alice, 100);
        let now = mock_env().block.time;
        let release_at = now.plus_seconds(60);

        let mut ledger = StagedLedger::default();
        ledger
            .settle(&storage, &alice, &delegate("validator1", 70), release_at)
            .unwrap();
        let redelegate = AuthzMsg::Redelegate {
            delegator_address: "alice".to_string(),
            src_validator: "validator1".to_string(),
            dst_validator: "validator2".to_string(),
            amount: coin(20, "uve"),
        };
        ledger.settle(&storage, &alice, &redelegate, release_at).unwrap();
        let undelegate = AuthzMsg::Undelegate {
            delegator_address: "alice".to_string(),
            validator: "validator2".to_string(),
            amount: coin(20, "uve"),
        };
        ledger.settle(&storage, &alice, &undelegate, release_at).unwrap();
        ledger.commit(&mut storage).unwrap();

        assert_eq!(BALANCES.load(&storage, &alice).unwrap(), coins(30, "uve"));
        assert_eq!(
            DELEGATIONS.load(&storage, (&alice, "validator1")).unwrap(),
            coin(50, "uve")
        );
        assert!(!DELEGATIONS.has(&storage, (&alice, "validator2")));

        let mut ledger = StagedLedger::default();
        assert!(matches!(
            ledger.claim(&storage, &alice, now).unwrap_err(),
            ContractError::NothingToClaim {}
        ));
        assert_eq!(
            ledger.claim(&storage, &alice, release_at).unwrap(),
            coins(20, "uve")
        );
        ledger.commit(&mut storage).unwrap();
        assert_eq!(BALANCES.load(&storage, &alice).unwrap(), coins(50, "uve"));
        assert!(!UNBONDING.has(&storage, &alice));
    }

    #[test]
    fn cannot_undelegate_stake_of_another_owner() {
        let mut storage = MockStorage::new();
        let alice = Addr::unchecked("alice");
        funded(&mut storage, &alice, 100);
        let release_at = mock_env().block.time;

        let mut ledger = StagedLedger::default();
        ledger
            .settle(&storage, &alice, &delegate("validator1", 100), release_at)
            .unwrap();
        ledger.commit(&mut storage).unwrap();

        let undelegate = AuthzMsg::Undelegate {
            delegator_address: "eve".to_string(),
            validator: "validator1".to_string(),
            amount: coin(100, "uve"),
        };
        let err = StagedLedger::default()
            .settle(&storage, &Addr::unchecked("eve"), &undelegate, release_at)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "insufficient delegation: eve has 0uve bonded to validator1"
        );
    }
}
