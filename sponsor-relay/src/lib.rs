//! Sponsor Relay
//!
//! Fee-sponsoring relay for token account cleanup. A wallet submits a
//! transaction that closes empty token accounts or burns dust, paying a
//! bounded service fee. The relay proves the transaction does nothing else,
//! confirms the accounts being closed are empty, then has the fee payer
//! co-sign and broadcasts it.

pub mod accounts;
pub mod api;
pub mod builder;
pub mod config;
pub mod error;
pub mod relay;
pub mod service;
pub mod transaction;
pub mod validator;

pub use api::ApiServer;
pub use config::Config;
pub use error::{Rejection, RejectionKind, SponsorError};
pub use service::SponsorService;
