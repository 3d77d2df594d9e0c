//! Cloud calendar account client.
//!
//! This crate drives one provider account end to end:
//!
//! - [`AccountClient`] - Per-account facade: login, calendars, events, push
//! - [`AuthFlow`] / [`transition`] - The login handshake state machine
//! - [`Session`] - Handshake secrets, trust token and the cookie jar
//! - [`Transport`] - Direct or relay-forwarded HTTP with one seam trait
//! - [`ClientError`] - Error types for every operation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  authenticate / provide_code   ┌──────────────┐
//! │  AuthFlow    │───────────────────────────────▶│   Session    │
//! │ (state table)│        secrets, cookies        │ (cookie jar) │
//! └──────┬───────┘                                └──────┬───────┘
//!        │                                               │ headers
//!        ▼                                               ▼
//! ┌──────────────┐      HttpRequest/Response      ┌──────────────┐
//! │ CalendarApi  │───────────────────────────────▶│  Transport   │
//! │ PushChannel  │                                │ (direct/relay)│
//! └──────────────┘                                └──────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cloudcal_client::{AccountClient, AccountConfig, LoginOutcome, ServiceConfig};
//!
//! let mut client = AccountClient::new(ServiceConfig::icloud(), config)?;
//! match client.login(&username, &password).await? {
//!     LoginOutcome::MfaRequired => {
//!         client.provide_code(&prompt_for_code()?).await?;
//!     }
//!     LoginOutcome::Ready(_) => {}
//! }
//! let calendars = client.list_calendars().await?;
//! ```

pub mod auth;
pub mod calendar;
pub mod client;
pub mod config;
pub mod error;
pub mod handoff;
pub mod push;
pub mod ready;
pub mod reconnect;
pub mod session;
pub mod transport;
pub mod trust;
pub mod vault;

// Re-export main types at crate root
pub use auth::{AccountMetadata, AuthEvent, AuthFlow, AuthPhase, LoginOutcome, transition};
pub use calendar::CalendarApi;
pub use client::AccountClient;
pub use config::{AccountConfig, ServiceConfig};
pub use error::{ClientError, ClientErrorCode, ClientResult};
pub use handoff::{HandoffListener, HandoffToken};
pub use push::{PushChannel, PushHandle, PushNotification};
pub use ready::{ReadySignal, ReadyWaiter};
pub use reconnect::ReconnectPolicy;
pub use session::{CookieJar, Session};
pub use transport::{BoxFuture, HttpExchange, HttpMethod, HttpRequest, HttpResponse, Transport};
pub use trust::TrustStore;
pub use vault::{CredentialVault, Credentials};
