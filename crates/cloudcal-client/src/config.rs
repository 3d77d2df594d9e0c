//! Service endpoints and per-account settings.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{ClientError, ClientResult};

/// Where the provider's services live and how to reach them.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Credential and second-factor handshake endpoint.
    pub auth_url: Url,

    /// Account setup endpoint (cookie exchange, account metadata).
    pub setup_url: Url,

    /// Calendar web service. The cookie exchange may point the client at an
    /// account-specific host; this is the bootstrap value.
    pub calendar_url: Url,

    /// Push notification web service.
    pub push_url: Url,

    /// Forwarding relay endpoint. When set, every request is wrapped in the
    /// relay envelope instead of going out directly.
    pub relay_url: Option<Url>,

    /// Request timeout.
    pub timeout: Duration,

    /// User agent string.
    pub user_agent: String,
}

impl ServiceConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Creates a configuration from the four service bases.
    ///
    /// # Errors
    ///
    /// Returns a config error if any URL does not parse.
    pub fn new(
        auth_url: impl AsRef<str>,
        setup_url: impl AsRef<str>,
        calendar_url: impl AsRef<str>,
        push_url: impl AsRef<str>,
    ) -> ClientResult<Self> {
        Ok(Self {
            auth_url: parse_base("auth_url", auth_url.as_ref())?,
            setup_url: parse_base("setup_url", setup_url.as_ref())?,
            calendar_url: parse_base("calendar_url", calendar_url.as_ref())?,
            push_url: parse_base("push_url", push_url.as_ref())?,
            relay_url: None,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("cloudcal/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// The well-known production endpoints.
    pub fn icloud() -> Self {
        Self::new(
            "https://idmsa.apple.com/appleauth/auth",
            "https://setup.icloud.com/setup/ws/1",
            "https://p01-calendarws.icloud.com/ca",
            "https://p01-pushws.icloud.com",
        )
        .expect("well-known endpoints parse")
    }

    /// Routes every request through a forwarding relay.
    ///
    /// # Errors
    ///
    /// Returns a config error if the relay URL does not parse.
    pub fn with_relay(mut self, relay_url: impl AsRef<str>) -> ClientResult<Self> {
        self.relay_url = Some(parse_base("relay_url", relay_url.as_ref())?);
        Ok(self)
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

fn parse_base(field: &str, raw: &str) -> ClientResult<Url> {
    Url::parse(raw)
        .map_err(|err| ClientError::config(format!("invalid {field} {raw:?}")).with_source(err))
}

/// Settings for one account.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// The account name (usually an email address).
    pub account: String,

    /// IANA timezone sent with calendar queries.
    pub usertz: String,

    /// Directory holding the trust-token store and credential vault.
    pub data_dir: PathBuf,

    /// Ask the service to trust this device after a successful second
    /// factor, so future logins can skip it.
    pub trust_device: bool,
}

impl AccountConfig {
    pub fn new(account: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            account: account.into(),
            usertz: "UTC".to_string(),
            data_dir: data_dir.into(),
            trust_device: true,
        }
    }

    pub fn with_usertz(mut self, usertz: impl Into<String>) -> Self {
        self.usertz = usertz.into();
        self
    }

    pub fn with_trust_device(mut self, trust_device: bool) -> Self {
        self.trust_device = trust_device;
        self
    }

    /// Checks the settings a login cannot proceed without.
    ///
    /// # Errors
    ///
    /// Returns a config error when the account name or timezone is empty.
    pub fn validate(&self) -> ClientResult<()> {
        if self.account.trim().is_empty() {
            return Err(ClientError::config("account name is empty"));
        }
        if self.usertz.trim().is_empty() {
            return Err(ClientError::config("usertz is empty"));
        }
        Ok(())
    }
}
