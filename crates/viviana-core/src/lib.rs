pub mod accounts;
pub mod admin;
pub mod audit;
pub mod chat;
pub mod error;
pub mod jokers;
pub mod ledger;
pub mod payments;
pub mod rank;
pub mod service;

pub use error::{CoreError, CoreResult};
pub use service::{Settings, Viviana};
