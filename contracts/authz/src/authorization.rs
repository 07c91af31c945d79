use authz_shared::{
    all_positive, checked_sub_coin, checked_sub_coins, first_duplicate, DepositScope,
};
use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Api, Coin, QuerierWrapper};

use crate::error::ContractError;
use crate::msg::{
    deposit_grant_key, is_known_msg_type, AuthorizationMsg, AuthzMsg, StakeAuthorizationType,
    DEPOSIT_TYPE_URL, SEND_TYPE_URL,
};

/// Validated policy stored in a grant
#[cw_serde]
pub enum Authorization {
    /// Any message of the given type
    Generic { msg_type_url: String },
    /// Bank transfers up to a remaining spend limit
    Send {
        spend_limit: Vec<Coin>,
        /// Empty = any recipient
        allow_list: Vec<Addr>,
    },
    /// One kind of staking operation, optionally capped
    Stake {
        authorization_type: StakeAuthorizationType,
        max_tokens: Option<Coin>,
        validators: ValidatorFilter,
    },
    /// Deposits into the listed scopes up to a remaining spend limit
    Deposit {
        spend_limit: Coin,
        scopes: Vec<DepositScope>,
    },
}

/// Validator restriction of a stake authorization
#[cw_serde]
pub enum ValidatorFilter {
    Unrestricted,
    Allow(Vec<Addr>),
    Deny(Vec<Addr>),
}

impl ValidatorFilter {
    fn check(&self, validator: &str) -> Result<(), ContractError> {
        let permitted = match self {
            ValidatorFilter::Unrestricted => true,
            ValidatorFilter::Allow(allowed) => allowed.iter().any(|v| v.as_str() == validator),
            ValidatorFilter::Deny(denied) => !denied.iter().any(|v| v.as_str() == validator),
        };
        if permitted {
            Ok(())
        } else {
            Err(ContractError::ValidatorNotAllowed {
                validator: validator.to_string(),
            })
        }
    }
}

/// Result of a successful accept
#[derive(Debug, PartialEq)]
pub enum Accepted {
    /// Stateless authorization, stored grant stays as is
    Unchanged,
    /// Stored grant must be replaced with the residual authorization
    Updated(Authorization),
    /// Spend limit exhausted, grant must be deleted
    Exhausted,
}

impl AuthorizationMsg {
    /// Validate a submitted authorization into its stored form.
    ///
    /// The bond denom is only queried for stake authorizations carrying a limit.
    pub fn into_checked(
        self,
        api: &dyn Api,
        querier: &QuerierWrapper,
    ) -> Result<Authorization, ContractError> {
        match self {
            AuthorizationMsg::Generic { msg_type_url } => {
                if msg_type_url.is_empty() {
                    return Err(ContractError::MissingField {
                        field: "msg-type".to_string(),
                    });
                }
                if !is_known_msg_type(&msg_type_url) {
                    return Err(ContractError::UnknownMsgType {
                        type_url: msg_type_url,
                    });
                }
                Ok(Authorization::Generic { msg_type_url })
            }
            AuthorizationMsg::Send {
                spend_limit,
                allow_list,
            } => {
                if !all_positive(&spend_limit) {
                    return Err(ContractError::InvalidSpendLimit {});
                }
                let denoms: Vec<&str> = spend_limit.iter().map(|c| c.denom.as_str()).collect();
                if let Some(denom) = first_duplicate(&denoms) {
                    return Err(ContractError::DuplicateDenom {
                        denom: denom.to_string(),
                    });
                }
                if let Some(address) = first_duplicate(&allow_list) {
                    return Err(ContractError::DuplicateAddress {
                        address: address.clone(),
                    });
                }
                let allow_list = validate_addrs(api, &allow_list)?;
                Ok(Authorization::Send {
                    spend_limit,
                    allow_list,
                })
            }
            AuthorizationMsg::Stake {
                authorization_type,
                max_tokens,
                allow_list,
                deny_list,
            } => {
                if let Some(limit) = &max_tokens {
                    if limit.amount.is_zero() {
                        return Err(ContractError::InvalidSpendLimit {});
                    }
                    let bond_denom = querier.query_bonded_denom()?;
                    if limit.denom != bond_denom {
                        return Err(ContractError::InvalidBondDenom {
                            denom: limit.denom.clone(),
                            bond_denom,
                        });
                    }
                }
                let allowed = validate_addrs(api, &allow_list)?;
                let denied = validate_addrs(api, &deny_list)?;
                let validators = match (allowed.is_empty(), denied.is_empty()) {
                    (true, true) => ValidatorFilter::Unrestricted,
                    (false, true) => ValidatorFilter::Allow(allowed),
                    (true, false) => ValidatorFilter::Deny(denied),
                    (false, false) => return Err(ContractError::ConflictingValidatorLists {}),
                };
                Ok(Authorization::Stake {
                    authorization_type,
                    max_tokens,
                    validators,
                })
            }
            AuthorizationMsg::Deposit {
                spend_limit,
                scopes,
            } => {
                let mut resolved: Vec<DepositScope> = Vec::with_capacity(scopes.len());
                for name in &scopes {
                    let scope = DepositScope::from_name(name).ok_or_else(|| {
                        ContractError::InvalidScope {
                            scope: name.clone(),
                        }
                    })?;
                    if resolved.contains(&scope) {
                        return Err(ContractError::DuplicateScope {
                            scope: scope.to_string(),
                        });
                    }
                    resolved.push(scope);
                }
                if resolved.is_empty() {
                    return Err(ContractError::EmptyScopes {});
                }
                if spend_limit.amount.is_zero() {
                    return Err(ContractError::InvalidSpendLimit {});
                }
                Ok(Authorization::Deposit {
                    spend_limit,
                    scopes: resolved,
                })
            }
        }
    }
}

fn validate_addrs(api: &dyn Api, addrs: &[String]) -> Result<Vec<Addr>, ContractError> {
    addrs
        .iter()
        .map(|addr| api.addr_validate(addr).map_err(ContractError::from))
        .collect()
}

impl Authorization {
    /// Message type this authorization governs
    pub fn msg_type_url(&self) -> &str {
        match self {
            Authorization::Generic { msg_type_url } => msg_type_url,
            Authorization::Send { .. } => SEND_TYPE_URL,
            Authorization::Stake {
                authorization_type, ..
            } => authorization_type.msg_type_url(),
            Authorization::Deposit { .. } => DEPOSIT_TYPE_URL,
        }
    }

    /// Key the grant is stored under. Deposit grants are qualified by their
    /// scope set so grants over disjoint scopes can coexist.
    pub fn grant_key(&self) -> String {
        match self {
            Authorization::Deposit { scopes, .. } => deposit_grant_key(scopes),
            _ => self.msg_type_url().to_string(),
        }
    }

    /// Deposit scopes covered; empty for every other variant
    pub fn scopes(&self) -> &[DepositScope] {
        match self {
            Authorization::Deposit { scopes, .. } => scopes,
            _ => &[],
        }
    }

    /// Decide whether `msg` is allowed and what becomes of the grant afterwards
    pub fn accept(&self, msg: &AuthzMsg) -> Result<Accepted, ContractError> {
        if self.msg_type_url() != msg.type_url() {
            return Err(self.type_mismatch(msg));
        }

        match (self, msg) {
            (Authorization::Generic { .. }, _) => Ok(Accepted::Unchanged),
            (
                Authorization::Send {
                    spend_limit,
                    allow_list,
                },
                AuthzMsg::Send {
                    to_address, amount, ..
                },
            ) => {
                if !allow_list.is_empty() && !allow_list.iter().any(|a| a.as_str() == to_address) {
                    return Err(ContractError::RecipientNotAllowed {
                        address: to_address.clone(),
                    });
                }
                let left = checked_sub_coins(spend_limit, amount)
                    .ok_or(ContractError::SpendLimitExceeded {})?;
                if left.is_empty() {
                    return Ok(Accepted::Exhausted);
                }
                Ok(Accepted::Updated(Authorization::Send {
                    spend_limit: left,
                    allow_list: allow_list.clone(),
                }))
            }
            (
                Authorization::Stake {
                    authorization_type,
                    max_tokens,
                    validators,
                },
                _,
            ) => {
                let (validator, amount) = match msg {
                    AuthzMsg::Delegate {
                        validator, amount, ..
                    }
                    | AuthzMsg::Undelegate {
                        validator, amount, ..
                    } => (validator, amount),
                    AuthzMsg::Redelegate {
                        dst_validator,
                        amount,
                        ..
                    } => (dst_validator, amount),
                    _ => return Err(self.type_mismatch(msg)),
                };
                validators.check(validator)?;

                let Some(limit) = max_tokens else {
                    return Ok(Accepted::Unchanged);
                };
                let left =
                    checked_sub_coin(limit, amount).ok_or(ContractError::SpendLimitExceeded {})?;
                if left.amount.is_zero() {
                    return Ok(Accepted::Exhausted);
                }
                Ok(Accepted::Updated(Authorization::Stake {
                    authorization_type: *authorization_type,
                    max_tokens: Some(left),
                    validators: validators.clone(),
                }))
            }
            (
                Authorization::Deposit {
                    spend_limit,
                    scopes,
                },
                AuthzMsg::Deposit { scope, amount, .. },
            ) => {
                if !scopes.contains(scope) {
                    return Err(ContractError::ScopeNotAuthorized {
                        scope: scope.to_string(),
                    });
                }
                let left = checked_sub_coin(spend_limit, amount)
                    .ok_or(ContractError::SpendLimitExceeded {})?;
                if left.amount.is_zero() {
                    return Ok(Accepted::Exhausted);
                }
                Ok(Accepted::Updated(Authorization::Deposit {
                    spend_limit: left,
                    scopes: scopes.clone(),
                }))
            }
            _ => Err(self.type_mismatch(msg)),
        }
    }

    fn type_mismatch(&self, msg: &AuthzMsg) -> ContractError {
        ContractError::TypeMismatch {
            expected: self.msg_type_url().to_string(),
            actual: msg.type_url().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::testing::mock_dependencies;
    use cosmwasm_std::{coin, coins};

    use crate::msg::{DELEGATE_TYPE_URL, REDELEGATE_TYPE_URL, UNDELEGATE_TYPE_URL};

    fn send(to: &str, amount: u128) -> AuthzMsg {
        AuthzMsg::Send {
            from_address: "alice".to_string(),
            to_address: to.to_string(),
            amount: coins(amount, "uve"),
        }
    }

    fn delegate(validator: &str, amount: u128) -> AuthzMsg {
        AuthzMsg::Delegate {
            delegator_address: "alice".to_string(),
            validator: validator.to_string(),
            amount: coin(amount, "uve"),
        }
    }

    fn deposit(scope: DepositScope, amount: u128) -> AuthzMsg {
        AuthzMsg::Deposit {
            depositor: "alice".to_string(),
            scope,
            id: "1".to_string(),
            amount: coin(amount, "uve"),
        }
    }

    #[test]
    fn send_validation() {
        let deps = mock_dependencies();
        let querier = deps.as_ref().querier;

        let err = AuthorizationMsg::Send {
            spend_limit: coins(0, "uve"),
            allow_list: vec![],
        }
        .into_checked(&deps.api, &querier)
        .unwrap_err();
        assert_eq!(err.to_string(), "spend-limit should be greater than zero");

        let err = AuthorizationMsg::Send {
            spend_limit: coins(100, "uve"),
            allow_list: vec!["carol".to_string(), "carol".to_string()],
        }
        .into_checked(&deps.api, &querier)
        .unwrap_err();
        assert_eq!(err.to_string(), "duplicate address carol in allow-list");

        let err = AuthorizationMsg::Send {
            spend_limit: coins(100, "uve"),
            allow_list: vec!["c".to_string()],
        }
        .into_checked(&deps.api, &querier)
        .unwrap_err();
        assert!(matches!(err, ContractError::Std(_)));
    }

    #[test]
    fn stake_validation() {
        let mut deps = mock_dependencies();
        deps.querier.update_staking("uve", &[], &[]);
        let querier = deps.as_ref().querier;

        let err = AuthorizationMsg::Stake {
            authorization_type: StakeAuthorizationType::Delegate,
            max_tokens: Some(coin(10, "uatom")),
            allow_list: vec![],
            deny_list: vec![],
        }
        .into_checked(&deps.api, &querier)
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid denom uatom, should match the current bond denom uve"
        );

        let err = AuthorizationMsg::Stake {
            authorization_type: StakeAuthorizationType::Delegate,
            max_tokens: None,
            allow_list: vec!["validator1".to_string()],
            deny_list: vec!["validator2".to_string()],
        }
        .into_checked(&deps.api, &querier)
        .unwrap_err();
        assert!(matches!(err, ContractError::ConflictingValidatorLists {}));

        let auth = AuthorizationMsg::Stake {
            authorization_type: StakeAuthorizationType::Undelegate,
            max_tokens: Some(coin(10, "uve")),
            allow_list: vec![],
            deny_list: vec![],
        }
        .into_checked(&deps.api, &querier)
        .unwrap();
        assert_eq!(auth.msg_type_url(), UNDELEGATE_TYPE_URL);

        let err = AuthorizationMsg::Stake {
            authorization_type: StakeAuthorizationType::Delegate,
            max_tokens: Some(coin(0, "uve")),
            allow_list: vec![],
            deny_list: vec![],
        }
        .into_checked(&deps.api, &querier)
        .unwrap_err();
        assert_eq!(err.to_string(), "spend-limit should be greater than zero");
    }

    #[test]
    fn deposit_validation() {
        let deps = mock_dependencies();
        let querier = deps.as_ref().querier;
        let build = |scopes: &[&str]| {
            AuthorizationMsg::Deposit {
                spend_limit: coin(10, "uve"),
                scopes: scopes.iter().map(|s| s.to_string()).collect(),
            }
            .into_checked(&deps.api, &querier)
        };

        let err = build(&["deployment", "deployment"]).unwrap_err();
        assert_eq!(err.to_string(), "duplicate scope deployment");

        let err = build(&["lease"]).unwrap_err();
        assert_eq!(err.to_string(), "invalid scope lease");

        assert!(matches!(build(&[]).unwrap_err(), ContractError::EmptyScopes {}));

        let auth = build(&["bid", "deployment"]).unwrap();
        assert_eq!(
            auth,
            Authorization::Deposit {
                spend_limit: coin(10, "uve"),
                scopes: vec![DepositScope::Bid, DepositScope::Deployment],
            }
        );
        assert_eq!(auth.msg_type_url(), DEPOSIT_TYPE_URL);
        assert_eq!(auth.grant_key(), "/akash.escrow.v1.MsgAccountDeposit:bid,deployment");
        assert_ne!(build(&["bid"]).unwrap().grant_key(), auth.grant_key());
    }

    #[test]
    fn generic_requires_known_type() {
        let deps = mock_dependencies();
        let querier = deps.as_ref().querier;
        let err = AuthorizationMsg::Generic {
            msg_type_url: "/cosmos.gov.v1beta1.MsgVote".to_string(),
        }
        .into_checked(&deps.api, &querier)
        .unwrap_err();
        assert!(matches!(err, ContractError::UnknownMsgType { .. }));
    }

    #[test]
    fn generic_accepts_its_type_without_change() {
        let auth = Authorization::Generic {
            msg_type_url: SEND_TYPE_URL.to_string(),
        };
        assert_eq!(auth.grant_key(), SEND_TYPE_URL);
        assert_eq!(auth.accept(&send("anyone", 1_000_000)).unwrap(), Accepted::Unchanged);
        assert!(matches!(
            auth.accept(&delegate("validator1", 1)).unwrap_err(),
            ContractError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn send_accept_decrements_and_exhausts() {
        let auth = Authorization::Send {
            spend_limit: coins(100, "uve"),
            allow_list: vec![Addr::unchecked("carol")],
        };

        assert_eq!(
            auth.accept(&send("carol", 40)).unwrap(),
            Accepted::Updated(Authorization::Send {
                spend_limit: coins(60, "uve"),
                allow_list: vec![Addr::unchecked("carol")],
            })
        );
        assert_eq!(auth.accept(&send("carol", 100)).unwrap(), Accepted::Exhausted);
        assert!(matches!(
            auth.accept(&send("carol", 101)).unwrap_err(),
            ContractError::SpendLimitExceeded {}
        ));
        assert!(matches!(
            auth.accept(&send("dave", 1)).unwrap_err(),
            ContractError::RecipientNotAllowed { .. }
        ));
    }

    #[test]
    fn stake_accept_checks_kind_and_validators() {
        let auth = Authorization::Stake {
            authorization_type: StakeAuthorizationType::Delegate,
            max_tokens: None,
            validators: ValidatorFilter::Deny(vec![Addr::unchecked("validator1")]),
        };
        assert_eq!(
            auth.accept(&delegate("validator2", 5)).unwrap(),
            Accepted::Unchanged
        );
        assert_eq!(
            auth.accept(&delegate("validator1", 5)).unwrap_err().to_string(),
            "cannot delegate/undelegate to validator1 validator"
        );

        let undelegate = AuthzMsg::Undelegate {
            delegator_address: "alice".to_string(),
            validator: "validator2".to_string(),
            amount: coin(5, "uve"),
        };
        assert!(matches!(
            auth.accept(&undelegate).unwrap_err(),
            ContractError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn redelegate_checks_destination() {
        let auth = Authorization::Stake {
            authorization_type: StakeAuthorizationType::Redelegate,
            max_tokens: Some(coin(10, "uve")),
            validators: ValidatorFilter::Allow(vec![Addr::unchecked("validator2")]),
        };
        let msg = AuthzMsg::Redelegate {
            delegator_address: "alice".to_string(),
            src_validator: "validator1".to_string(),
            dst_validator: "validator2".to_string(),
            amount: coin(10, "uve"),
        };
        assert_eq!(auth.accept(&msg).unwrap(), Accepted::Exhausted);
    }

    #[test]
    fn validator_missing_from_allow_list_rejected() {
        let auth = Authorization::Stake {
            authorization_type: StakeAuthorizationType::Delegate,
            max_tokens: None,
            validators: ValidatorFilter::Allow(vec![Addr::unchecked("validator1")]),
        };
        assert_eq!(
            auth.accept(&delegate("validator1", 5)).unwrap(),
            Accepted::Unchanged
        );
        assert_eq!(
            auth.accept(&delegate("validator2", 5)).unwrap_err().to_string(),
            "cannot delegate/undelegate to validator2 validator"
        );

        let auth = Authorization::Stake {
            authorization_type: StakeAuthorizationType::Redelegate,
            max_tokens: None,
            validators: ValidatorFilter::Allow(vec![Addr::unchecked("validator2")]),
        };
        // the source validator is not what the list constrains
        let msg = AuthzMsg::Redelegate {
            delegator_address: "alice".to_string(),
            src_validator: "validator2".to_string(),
            dst_validator: "validator3".to_string(),
            amount: coin(1, "uve"),
        };
        assert_eq!(auth.msg_type_url(), REDELEGATE_TYPE_URL);
        assert!(matches!(
            auth.accept(&msg).unwrap_err(),
            ContractError::ValidatorNotAllowed { ref validator } if validator == "validator3"
        ));
    }

    #[test]
    fn stake_limit_decrements() {
        let auth = Authorization::Stake {
            authorization_type: StakeAuthorizationType::Delegate,
            max_tokens: Some(coin(10, "uve")),
            validators: ValidatorFilter::Unrestricted,
        };
        let Accepted::Updated(residual) = auth.accept(&delegate("validator1", 4)).unwrap() else {
            panic!("expected residual authorization");
        };
        assert_eq!(residual.msg_type_url(), DELEGATE_TYPE_URL);
        assert!(matches!(
            residual,
            Authorization::Stake { max_tokens: Some(ref left), .. } if left == &coin(6, "uve")
        ));
        assert!(matches!(
            auth.accept(&delegate("validator1", 11)).unwrap_err(),
            ContractError::SpendLimitExceeded {}
        ));
    }

    #[test]
    fn deposit_accept_checks_scope() {
        let auth = Authorization::Deposit {
            spend_limit: coin(10, "uve"),
            scopes: vec![DepositScope::Deployment],
        };
        assert!(matches!(
            auth.accept(&deposit(DepositScope::Bid, 1)).unwrap_err(),
            ContractError::ScopeNotAuthorized { .. }
        ));
        assert_eq!(
            auth.accept(&deposit(DepositScope::Deployment, 10)).unwrap(),
            Accepted::Exhausted
        );
    }

    #[test]
    fn deposit_limit_decrements_and_caps() {
        let auth = Authorization::Deposit {
            spend_limit: coin(10, "uve"),
            scopes: vec![DepositScope::Deployment, DepositScope::Bid],
        };
        assert_eq!(
            auth.accept(&deposit(DepositScope::Bid, 4)).unwrap(),
            Accepted::Updated(Authorization::Deposit {
                spend_limit: coin(6, "uve"),
                scopes: vec![DepositScope::Deployment, DepositScope::Bid],
            })
        );
        assert_eq!(
            auth.accept(&deposit(DepositScope::Deployment, 11))
                .unwrap_err()
                .to_string(),
            "requested amount is more than spend limit"
        );

        let other_denom = AuthzMsg::Deposit {
            depositor: "alice".to_string(),
            scope: DepositScope::Bid,
            id: "1".to_string(),
            amount: coin(1, "uatom"),
        };
        assert!(matches!(
            auth.accept(&other_denom).unwrap_err(),
            ContractError::SpendLimitExceeded {}
        ));
    }

    #[test]
    fn send_authorization_rejects_other_types() {
        let auth = Authorization::Send {
            spend_limit: coins(100, "uve"),
            allow_list: vec![],
        };
        assert!(matches!(
            auth.accept(&delegate("validator1", 1)).unwrap_err(),
            ContractError::TypeMismatch { .. }
        ));
    }
}
