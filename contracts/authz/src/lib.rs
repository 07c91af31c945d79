pub mod authorization;
pub mod builder;
pub mod contract;
pub mod engine;
mod error;
pub mod ledger;
pub mod msg;
pub mod state;

pub use crate::error::ContractError;
