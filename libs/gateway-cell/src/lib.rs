//! Clearinghouse gateway: token-authenticated X12 HTTP exchange with
//! transient/permanent error classification at the boundary.

pub mod auth;
pub mod client;
pub mod error;

pub use auth::TokenCache;
pub use client::{ClearinghouseClient, PayerGateway, StatusCheck};
pub use error::{ErrorClass, GatewayError};
