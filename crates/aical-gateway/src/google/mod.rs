//! Google Calendar gateway.
//!
//! - Refresh-token grant against the OAuth token endpoint
//! - Paginated calendar and event listing
//! - Server-side recurring event expansion (`singleEvents=true`)
//! - Event insert, patch and delete
//!
//! # Example
//!
//! ```ignore
//! use aical_gateway::google::{GoogleConfig, GoogleGateway, OAuthCredentials};
//!
//! let credentials = OAuthCredentials::new(
//!     "your-client-id.apps.googleusercontent.com",
//!     "your-client-secret",
//! );
//! let gateway = GoogleGateway::new(GoogleConfig::new(credentials))?;
//! let access = gateway.exchange_credential(&user.refresh_credential).await?;
//! ```

mod client;
mod config;
mod gateway;

pub use client::GoogleCalendarClient;
pub use config::{GoogleConfig, OAuthCredentials};
pub use gateway::GoogleGateway;
