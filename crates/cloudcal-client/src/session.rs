//! Per-account session state.
//!
//! The session accumulates what the handshake produces: the anti-forgery
//! secrets (`scnt`, session id, the `aasp` cookie), the per-attempt session
//! token, the durable trust token, and the cookie jar the calendar service
//! honors. Only the login state machine mutates it; calendar operations
//! read headers from it.

use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::transport::HttpResponse;
use crate::trust::TrustStore;

/// Ordered, name-keyed cookie jar.
///
/// Later responses replace a cookie in place instead of reordering it, so
/// the emitted `Cookie` header stays stable across refreshes.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.cookies.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.cookies.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// The value for an outgoing `Cookie` header, `None` while empty.
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }
}

/// Extracts the `name=value` pair from a `Set-Cookie` string, dropping
/// attributes.
fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Session state for one account.
#[derive(Debug)]
pub struct Session {
    account: String,
    scnt: Option<String>,
    session_id: Option<String>,
    session_token: Option<String>,
    trust_token: Option<String>,
    dsid: Option<String>,
    cookies: CookieJar,
    cookies_exchanged: bool,
    trust_store: TrustStore,
}

impl Session {
    pub fn new(account: impl Into<String>, trust_store: TrustStore) -> Self {
        Self {
            account: account.into(),
            scnt: None,
            session_id: None,
            session_token: None,
            trust_token: None,
            dsid: None,
            cookies: CookieJar::default(),
            cookies_exchanged: false,
            trust_store,
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn scnt(&self) -> Option<&str> {
        self.scnt.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn trust_token(&self) -> Option<&str> {
        self.trust_token.as_deref()
    }

    pub fn dsid(&self) -> Option<&str> {
        self.dsid.as_deref()
    }

    /// The dsid, or an error when login has not completed yet.
    pub fn require_dsid(&self) -> ClientResult<&str> {
        self.dsid
            .as_deref()
            .ok_or_else(|| ClientError::internal("session carries no dsid; log in first"))
    }

    /// The anti-forgery cookie fragment, delivered as a cookie at sign-in.
    pub fn aasp(&self) -> Option<&str> {
        self.cookies.get("aasp")
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Pulls the saved trust token into the session. A missing record is
    /// simply no prior trust; an unreadable one is logged and treated the
    /// same, so a damaged file never blocks login.
    pub fn load_trust_token(&mut self) -> bool {
        match self.trust_store.load(&self.account) {
            Ok(token) => {
                self.trust_token = token;
            }
            Err(err) => {
                warn!(account = %self.account, error = %err, "failed to load trust token");
                self.trust_token = None;
            }
        }
        self.trust_token.is_some()
    }

    pub fn set_session_secrets(&mut self, scnt: impl Into<String>, session_id: impl Into<String>) {
        self.scnt = Some(scnt.into());
        self.session_id = Some(session_id.into());
    }

    pub fn set_session_token(&mut self, token: impl Into<String>) {
        self.session_token = Some(token.into());
    }

    pub fn set_dsid(&mut self, dsid: impl Into<String>) {
        self.dsid = Some(dsid.into());
    }

    /// Drops the in-memory trust token after the provider declined to
    /// honor it. The on-disk record is left alone; a successful trust
    /// exchange overwrites it.
    pub fn clear_trust_token(&mut self) {
        self.trust_token = None;
    }

    /// Records a fresh trust token and persists it. Persistence failures
    /// are logged, never surfaced: an unsaved trust token costs one extra
    /// second factor later, not this login.
    pub fn set_trust_token(&mut self, token: impl Into<String>) {
        let token = token.into();
        if let Err(err) = self.trust_store.save(&self.account, &token) {
            warn!(account = %self.account, error = %err, "failed to persist trust token");
        }
        self.trust_token = Some(token);
    }

    /// Folds every cookie a response set into the jar; returns how many.
    pub fn absorb_cookies(&mut self, response: &HttpResponse) -> usize {
        let mut absorbed = 0;
        for raw in response.set_cookie_values() {
            if let Some((name, value)) = parse_set_cookie(&raw) {
                debug!(cookie = %name, "absorbed cookie");
                self.cookies.insert(name, value);
                absorbed += 1;
            }
        }
        absorbed
    }

    /// All three handshake secrets are present.
    pub fn has_handshake_secrets(&self) -> bool {
        self.scnt.is_some() && self.session_id.is_some() && self.aasp().is_some()
    }

    /// Marks the jar as backed by a successful cookie exchange.
    pub fn mark_cookies_exchanged(&mut self) {
        self.cookies_exchanged = true;
    }

    /// The jar is only trustworthy after a successful cookie exchange that
    /// actually set at least one cookie.
    pub fn cookies_valid(&self) -> bool {
        self.cookies_exchanged && !self.cookies.is_empty()
    }

    /// Base headers for every authenticated call.
    pub fn auth_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        if let Some(cookie) = self.cookies.header_value() {
            headers.push(("Cookie".to_string(), cookie));
        }
        headers
    }

    /// Headers for second-factor submission: the base set plus the
    /// anti-forgery secrets. The `aasp` fragment rides in the jar's
    /// `Cookie` header.
    pub fn mfa_headers(&self) -> Vec<(String, String)> {
        let mut headers = self.auth_headers();
        if let Some(scnt) = &self.scnt {
            headers.push(("scnt".to_string(), scnt.clone()));
        }
        if let Some(session_id) = &self.session_id {
            headers.push(("X-Apple-ID-Session-Id".to_string(), session_id.clone()));
        }
        headers
    }

    /// Drops everything a new login attempt replaces. The trust token is
    /// durable and survives; the account obviously does too.
    pub fn reset_for_login(&mut self) {
        self.scnt = None;
        self.session_id = None;
        self.session_token = None;
        self.dsid = None;
        self.cookies.clear();
        self.cookies_exchanged = false;
    }
}
