//! CalendarGateway trait and implementations.
//!
//! - [`CalendarGateway`] - the contract the sync engine uses to reach a provider
//! - [`StaticGateway`] - canned responses with failure and latency injection
//! - [`google::GoogleGateway`] - Google Calendar v3 (feature `google`)
//! - [`GatewayError`] - error types for gateway operations

pub mod error;
pub mod gateway;
#[cfg(feature = "google")]
pub mod google;
pub mod static_gateway;

pub use error::{GatewayError, GatewayErrorCode, GatewayResult};
pub use gateway::{AccessCredential, BoxFuture, CalendarGateway, EventDraft};
pub use static_gateway::{StaticGateway, StaticOperation};
