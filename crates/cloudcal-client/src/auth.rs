//! Login handshake state machine.
//!
//! The handshake is a fixed sequence: credential submit, optional second
//! factor, optional device trust, cookie exchange. [`transition`] is the
//! pure state table; [`AuthFlow`] drives the wire calls and feeds the
//! table with what actually happened. Calendar calls are only legal once
//! the phase reaches [`AuthPhase::Ready`].

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ServiceConfig;
use crate::error::{ClientError, ClientResult};
use crate::session::Session;
use crate::transport::{HttpRequest, Transport, endpoint};

/// Where one account session stands in the login handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// No login attempted yet.
    NotStarted,
    /// Credentials submitted, waiting on the provider's verdict.
    Started,
    /// Provider wants a second-factor code before going further.
    MfaRequested,
    /// Second factor accepted; device trust not yet settled.
    Authenticated,
    /// Primary verification done, cookie exchange still pending.
    Trusted,
    /// Cookie jar populated; calendar calls may proceed.
    Ready,
    /// The handshake failed hard. A fresh `authenticate` call restarts it.
    Error,
}

impl AuthPhase {
    /// Calendar operations are permitted only in this phase.
    pub fn is_ready(self) -> bool {
        matches!(self, AuthPhase::Ready)
    }

    /// A login attempt is in flight and a second one must be refused.
    pub fn login_in_progress(self) -> bool {
        matches!(self, AuthPhase::Started | AuthPhase::MfaRequested)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthPhase::NotStarted => "not_started",
            AuthPhase::Started => "started",
            AuthPhase::MfaRequested => "mfa_requested",
            AuthPhase::Authenticated => "authenticated",
            AuthPhase::Trusted => "trusted",
            AuthPhase::Ready => "ready",
            AuthPhase::Error => "error",
        }
    }
}

impl fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One handshake step's outcome, reduced to the facts the table needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// Caller asked to (re)start the handshake.
    LoginRequested,
    /// The sign-in call returned. `secrets_present` reports whether all
    /// three handshake secrets were extracted from the response.
    SignInCompleted { status: u16, secrets_present: bool },
    /// The provider accepted the second-factor code.
    CodeAccepted,
    /// The provider refused the code. The prompt stays open so the caller
    /// can submit a corrected one.
    CodeRejected,
    /// Device trust finished, granted or absorbed as a logged failure.
    TrustSettled,
    /// The cookie exchange populated the jar and account metadata.
    CookiesExchanged,
    /// An in-flight step failed hard (transport loss, protocol violation).
    HandshakeFailed,
}

/// Applies one event to the current phase and returns the next phase.
///
/// Refused combinations return an error and leave the phase untouched,
/// which is how concurrent `authenticate` calls and out-of-order code
/// submissions are rejected.
pub fn transition(phase: AuthPhase, event: AuthEvent) -> ClientResult<AuthPhase> {
    use AuthEvent::*;
    use AuthPhase::*;

    let next = match (phase, event) {
        (NotStarted | Ready | Error, LoginRequested) => Started,
        (Started | MfaRequested, LoginRequested) => {
            return Err(ClientError::internal(format!(
                "login already in progress (phase {phase})"
            )));
        }
        (
            Started,
            SignInCompleted {
                secrets_present: false,
                ..
            },
        ) => Error,
        (
            Started,
            SignInCompleted {
                status: 200,
                secrets_present: true,
            },
        ) => Trusted,
        (
            Started,
            SignInCompleted {
                status: 409,
                secrets_present: true,
            },
        ) => MfaRequested,
        (Started, SignInCompleted { .. }) => Error,
        (MfaRequested, CodeAccepted) => Authenticated,
        (MfaRequested, CodeRejected) => MfaRequested,
        (Authenticated, TrustSettled) => Trusted,
        (Authenticated | Trusted, CookiesExchanged) => Ready,
        (Started | MfaRequested | Authenticated | Trusted, HandshakeFailed) => Error,
        (phase, event) => {
            return Err(ClientError::internal(format!(
                "event {event:?} is not permitted in phase {phase}"
            )));
        }
    };
    Ok(next)
}

/// What a sign-in attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The provider wants a second-factor code; call
    /// [`AuthFlow::provide_code`] next.
    MfaRequired,
    /// Handshake complete.
    Ready(AccountMetadata),
}

/// Account facts decoded from the cookie exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMetadata {
    /// Directory-services identifier, required by every calendar call.
    pub dsid: String,
    /// Account-specific calendar host, when the provider names one.
    pub calendar_url: Option<Url>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountLoginResponse {
    ds_info: DsInfo,
    #[serde(default)]
    webservices: Option<WebserviceMap>,
}

#[derive(Debug, Deserialize)]
struct DsInfo {
    #[serde(deserialize_with = "dsid_from_wire")]
    dsid: String,
}

#[derive(Debug, Deserialize)]
struct WebserviceMap {
    #[serde(default)]
    calendar: Option<WebserviceEntry>,
}

#[derive(Debug, Deserialize)]
struct WebserviceEntry {
    url: String,
    #[serde(default)]
    status: Option<String>,
}

// The dsid has shown up as both a JSON string and a bare number.
fn dsid_from_wire<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Text(String),
        Number(i64),
    }
    match Wire::deserialize(deserializer)? {
        Wire::Text(value) => Ok(value),
        Wire::Number(value) => Ok(value.to_string()),
    }
}

fn sanitize_code(code: &str) -> String {
    code.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Drives the handshake against the provider, mutating the session as each
/// step lands. One flow per account; it refuses overlapping logins.
pub struct AuthFlow {
    service: ServiceConfig,
    transport: Arc<Transport>,
    trust_device: bool,
    phase: AuthPhase,
}

impl AuthFlow {
    pub fn new(service: ServiceConfig, transport: Arc<Transport>, trust_device: bool) -> Self {
        Self {
            service,
            transport,
            trust_device,
            phase: AuthPhase::NotStarted,
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    /// Submits credentials and follows the handshake as far as it can go
    /// without caller input.
    ///
    /// Returns [`LoginOutcome::MfaRequired`] when the provider wants a
    /// second-factor code, or [`LoginOutcome::Ready`] when the session is
    /// fully established. Refused while another attempt is in flight.
    pub async fn authenticate(
        &mut self,
        session: &mut Session,
        username: &str,
        password: &str,
    ) -> ClientResult<LoginOutcome> {
        self.phase = transition(self.phase, AuthEvent::LoginRequested)?;
        session.reset_for_login();
        let had_trust = session.load_trust_token();
        debug!(account = %session.account(), trusted_device = had_trust, "starting sign-in");

        let trust_tokens: Vec<String> = session
            .trust_token()
            .map(|token| vec![token.to_string()])
            .unwrap_or_default();
        let body = json!({
            "accountName": username,
            "password": password,
            "trustTokens": trust_tokens,
        });
        let url = endpoint(&self.service.auth_url, "signin")
            .map_err(|err| self.fail_handshake(err))?;
        let request = HttpRequest::post(url)
            .with_headers(session.auth_headers())
            .with_json_body(body);
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => return Err(self.fail_handshake(err)),
        };

        session.absorb_cookies(&response);
        if let (Some(scnt), Some(session_id)) = (
            response.header("scnt"),
            response.header("x-apple-id-session-id"),
        ) {
            session.set_session_secrets(scnt, session_id);
        }
        if let Some(token) = response.header("x-apple-session-token") {
            session.set_session_token(token);
        }

        let status = response.status;
        let secrets_present = session.has_handshake_secrets();
        self.phase = transition(
            self.phase,
            AuthEvent::SignInCompleted {
                status,
                secrets_present,
            },
        )?;

        match self.phase {
            AuthPhase::Trusted => {
                info!(account = %session.account(), "signed in without second factor");
                let metadata = self.exchange_cookies(session).await?;
                Ok(LoginOutcome::Ready(metadata))
            }
            AuthPhase::MfaRequested => {
                // The provider did not honor the saved trust token; drop it.
                session.clear_trust_token();
                info!(account = %session.account(), "second factor required");
                Ok(LoginOutcome::MfaRequired)
            }
            _ => Err(self
                .signin_failure(status, secrets_present)
                .with_account(session.account())),
        }
    }

    /// Submits a second-factor code and finishes the handshake.
    ///
    /// The code is reduced to its digits before submission; an unexpected
    /// length is logged but still sent, since the provider performs the
    /// authoritative validation. A rejected code keeps the prompt open.
    pub async fn provide_code(
        &mut self,
        session: &mut Session,
        code: &str,
    ) -> ClientResult<LoginOutcome> {
        if self.phase != AuthPhase::MfaRequested {
            return Err(ClientError::internal(format!(
                "no second factor pending (phase {})",
                self.phase
            )));
        }

        let sanitized = sanitize_code(code);
        if sanitized.len() != 6 {
            warn!(
                length = sanitized.len(),
                "second-factor code is not six digits after sanitizing; submitting anyway"
            );
        }
        let body = json!({ "securityCode": { "code": sanitized } });
        let url = endpoint(&self.service.auth_url, "verify/securitycode")
            .map_err(|err| self.fail_handshake(err))?;
        let request = HttpRequest::post(url)
            .with_headers(session.mfa_headers())
            .with_json_body(body);
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => return Err(self.fail_handshake(err)),
        };
        session.absorb_cookies(&response);

        if !response.is_success() {
            if (400..500).contains(&response.status) {
                self.phase = transition(self.phase, AuthEvent::CodeRejected)?;
                return Err(ClientError::code_rejected(format!(
                    "the provider rejected the second-factor code (status {})",
                    response.status
                ))
                .with_account(session.account()));
            }
            let err = ClientError::protocol(format!(
                "second-factor verification failed with status {}",
                response.status
            ));
            return Err(self.fail_handshake(err).with_account(session.account()));
        }

        if let Some(token) = response.header("x-apple-session-token") {
            session.set_session_token(token);
        }
        self.phase = transition(self.phase, AuthEvent::CodeAccepted)?;
        info!(account = %session.account(), "second factor accepted");

        if self.trust_device {
            self.request_device_trust(session).await;
            self.phase = transition(self.phase, AuthEvent::TrustSettled)?;
        }

        let metadata = self.exchange_cookies(session).await?;
        Ok(LoginOutcome::Ready(metadata))
    }

    /// Asks the provider to mark this device trusted so later logins can
    /// skip the second factor.
    ///
    /// Failures here are logged and absorbed: a session without a trust
    /// token still becomes a valid session.
    async fn request_device_trust(&self, session: &mut Session) {
        let request = match endpoint(&self.service.auth_url, "2sv/trust") {
            Ok(url) => HttpRequest::post(url).with_headers(session.mfa_headers()),
            Err(err) => {
                warn!(error = %err, "skipping device trust");
                return;
            }
        };
        match self.transport.send(request).await {
            Ok(response) if response.is_success() => {
                if let Some(token) = response.header("x-apple-session-token") {
                    session.set_session_token(token);
                }
                match response.header("x-apple-twosv-trust-token") {
                    Some(token) => {
                        session.set_trust_token(token.to_string());
                        info!(account = %session.account(), "device trust granted");
                    }
                    None => warn!("trust response carried no trust token"),
                }
                session.absorb_cookies(&response);
            }
            Ok(response) => {
                warn!(
                    status = response.status,
                    "device trust refused; continuing without it"
                );
            }
            Err(err) => {
                warn!(error = %err, "device trust exchange failed; continuing without it");
            }
        }
    }

    /// Trades the session token for the durable cookie jar and account
    /// metadata. The last handshake step; lands the phase on `Ready`.
    async fn exchange_cookies(&mut self, session: &mut Session) -> ClientResult<AccountMetadata> {
        let Some(session_token) = session.session_token().map(str::to_string) else {
            let err = ClientError::protocol("no session token available for the cookie exchange");
            return Err(self.fail_handshake(err).with_account(session.account()));
        };

        let mut body = serde_json::Map::new();
        body.insert("sessionToken".to_string(), json!(session_token));
        if let Some(trust) = session.trust_token() {
            body.insert("trustToken".to_string(), json!(trust));
        }
        let url = endpoint(&self.service.setup_url, "accountLogin")
            .map_err(|err| self.fail_handshake(err))?;
        let request = HttpRequest::post(url)
            .with_headers(session.auth_headers())
            .with_json_body(Value::Object(body));
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => return Err(self.fail_handshake(err)),
        };

        if !response.is_success() {
            let err = ClientError::protocol(format!(
                "cookie exchange failed with status {}",
                response.status
            ));
            return Err(self.fail_handshake(err).with_account(session.account()));
        }

        session.absorb_cookies(&response);
        let account: AccountLoginResponse = match response.json() {
            Ok(decoded) => decoded,
            Err(err) => return Err(self.fail_handshake(err).with_account(session.account())),
        };
        if session.cookies().is_empty() {
            let err = ClientError::protocol("cookie exchange set no cookies");
            return Err(self.fail_handshake(err).with_account(session.account()));
        }

        session.set_dsid(account.ds_info.dsid.clone());
        session.mark_cookies_exchanged();
        self.phase = transition(self.phase, AuthEvent::CookiesExchanged)?;

        let calendar_url = account
            .webservices
            .and_then(|services| services.calendar)
            .filter(|entry| {
                entry
                    .status
                    .as_deref()
                    .is_none_or(|status| status.eq_ignore_ascii_case("active"))
            })
            .and_then(|entry| match Url::parse(&entry.url) {
                Ok(url) => Some(url),
                Err(err) => {
                    warn!(error = %err, url = %entry.url, "ignoring unusable calendar service url");
                    None
                }
            });

        info!(
            account = %session.account(),
            dsid = %account.ds_info.dsid,
            cookies = session.cookies().len(),
            "session ready"
        );
        Ok(AccountMetadata {
            dsid: account.ds_info.dsid,
            calendar_url,
        })
    }

    /// Classifies a sign-in the transition table already marked failed:
    /// bad credentials, missing secrets, or an unclassified status.
    fn signin_failure(&self, status: u16, secrets_present: bool) -> ClientError {
        if status == 401 {
            return ClientError::invalid_credentials("the provider rejected the credentials");
        }
        if !secrets_present {
            return ClientError::protocol(format!(
                "sign-in response carried no handshake secrets (status {status})"
            ));
        }
        ClientError::protocol(format!("sign-in failed with unexpected status {status}"))
    }

    /// Records a hard mid-handshake failure and hands the error back.
    fn fail_handshake(&mut self, err: ClientError) -> ClientError {
        match transition(self.phase, AuthEvent::HandshakeFailed) {
            Ok(next) => self.phase = next,
            Err(refused) => warn!(error = %refused, "failure outside an active handshake"),
        }
        err
    }
}
