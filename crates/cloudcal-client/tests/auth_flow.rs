//! Handshake and recovery scenarios over a scripted wire.
//!
//! Every test drives the real [`AccountClient`] against a canned sequence
//! of responses, asserting both the externally visible outcome and the
//! requests the client actually put on the wire.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cloudcal_client::transport::{BoxFuture, HttpExchange, HttpRequest, HttpResponse};
use cloudcal_client::{
    AccountClient, AccountConfig, AuthPhase, ClientError, ClientErrorCode, ClientResult,
    LoginOutcome, ServiceConfig, Transport, TrustStore,
};
use cloudcal_core::{CalendarEvent, EventIntent, ProviderDate};
use serde_json::{Value, json};
use tempfile::TempDir;

/// Plays back a fixed response sequence, recording every request sent.
struct ScriptedExchange {
    script: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedExchange {
    fn new(script: Vec<HttpResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Appends more responses to the script mid-test.
    fn push(&self, responses: Vec<HttpResponse>) {
        self.script.lock().unwrap().extend(responses);
    }

    fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Paths of every request sent so far, in order.
    fn paths(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|request| request.url.path().to_string())
            .collect()
    }

    fn count_path(&self, suffix: &str) -> usize {
        self.paths()
            .iter()
            .filter(|path| path.ends_with(suffix))
            .count()
    }
}

impl HttpExchange for ScriptedExchange {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, ClientResult<HttpResponse>> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        Box::pin(async move {
            next.ok_or_else(|| ClientError::transport("scripted exchange ran out of responses"))
        })
    }
}

fn response(status: u16, headers: &[(&str, &str)], body: Value) -> HttpResponse {
    let headers = headers
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    HttpResponse::new(status, headers, body.to_string().into_bytes())
}

/// Sign-in accepted outright: anti-forgery secrets plus a session token.
fn signin_ok() -> HttpResponse {
    response(
        200,
        &[
            ("scnt", "scnt-1"),
            ("x-apple-id-session-id", "sid-1"),
            ("x-apple-session-token", "session-token-1"),
            ("set-cookie", "aasp=frag-1; Path=/; Secure; HttpOnly"),
        ],
        json!({"authType": "non-sa"}),
    )
}

/// Sign-in answered 409: the provider wants a second factor first.
fn signin_mfa() -> HttpResponse {
    response(
        409,
        &[
            ("scnt", "scnt-1"),
            ("x-apple-id-session-id", "sid-1"),
            ("set-cookie", "aasp=frag-1; Path=/; Secure; HttpOnly"),
        ],
        json!({"authType": "hsa2"}),
    )
}

fn code_accepted() -> HttpResponse {
    response(
        200,
        &[("x-apple-session-token", "session-token-2")],
        json!({}),
    )
}

fn trust_granted() -> HttpResponse {
    response(
        200,
        &[
            ("x-apple-session-token", "session-token-3"),
            ("x-apple-twosv-trust-token", "trust-9"),
        ],
        json!({}),
    )
}

/// Cookie exchange success. The jar arrives as one `forward-cookie` value
/// holding two cookies, the account metadata in the body.
fn account_login() -> HttpResponse {
    response(
        200,
        &[(
            "forward-cookie",
            "X-WEBAUTH=web-1; Path=/; Secure, X-APPLE-ID=acct-1; HttpOnly",
        )],
        json!({
            "dsInfo": {"dsid": 8018042, "fullName": "Test User"},
            "webservices": {
                "calendar": {
                    "url": "https://p42-calendarws.example.com/ca",
                    "status": "active"
                },
                "push": {
                    "url": "https://p42-pushws.example.com",
                    "status": "active"
                }
            }
        }),
    )
}

fn snapshot() -> HttpResponse {
    response(
        200,
        &[],
        json!({
            "Collection": [
                {"guid": "home", "ctag": "FT=-@RU=1", "title": "Home"},
                {"guid": "work", "ctag": "FT=-@RU=2", "title": "Work", "readOnly": true}
            ],
            "Event": []
        }),
    )
}

fn stale_session() -> HttpResponse {
    response(421, &[], json!({"error": "authentication required"}))
}

fn write_accepted() -> HttpResponse {
    response(200, &[], json!({}))
}

fn client_over(exchange: Arc<ScriptedExchange>, dir: &TempDir) -> AccountClient {
    let transport = Arc::new(Transport::new(exchange, None));
    let account = AccountConfig::new("user@example.com", dir.path());
    AccountClient::with_transport(ServiceConfig::icloud(), account, transport)
        .expect("client construction")
}

fn pd(y: i32, m: u32, d: u32, h: u32, min: u32) -> ProviderDate {
    ProviderDate::new(y, m, d, h, min, 0).unwrap()
}

fn event() -> CalendarEvent {
    CalendarEvent::new("EV-1", "home", pd(2026, 8, 22, 9, 0), pd(2026, 8, 22, 10, 0))
}

#[tokio::test]
async fn clean_signin_reaches_ready_and_reads_calendars() {
    let dir = TempDir::new().unwrap();
    let exchange =
        ScriptedExchange::new(vec![signin_ok(), account_login(), snapshot(), snapshot()]);
    let mut client = client_over(exchange.clone(), &dir);

    let waiter = client.ready_waiter();
    let outcome = client.login("user@example.com", "hunter2").await.unwrap();
    assert!(matches!(outcome, LoginOutcome::Ready(_)));
    assert_eq!(client.phase(), AuthPhase::Ready);
    assert_eq!(client.session().dsid(), Some("8018042"));
    assert!(client.session().cookies_valid());
    waiter.wait().await.unwrap();

    // Two reads without a write in between see the same snapshot.
    let first = client.list_calendars().await.unwrap();
    let second = client.list_calendars().await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].guid, "home");
    assert!(first[1].read_only);
    assert_eq!(first, second);

    let requests = exchange.requests();

    // Sign-in carried the credentials and an empty trust-token list.
    let signin_body = requests[0].body.clone().unwrap();
    assert_eq!(signin_body["accountName"], "user@example.com");
    assert_eq!(signin_body["trustTokens"], json!([]));

    // The cookie exchange traded the token sign-in handed out.
    let exchange_body = requests[1].body.clone().unwrap();
    assert_eq!(exchange_body["sessionToken"], "session-token-1");

    // Calendar traffic moved to the account-specific host it named.
    let startup = &requests[2];
    assert_eq!(startup.url.host_str(), Some("p42-calendarws.example.com"));
    assert!(startup.url.query().unwrap().contains("dsid=8018042"));
    assert_eq!(exchange.remaining(), 0);
}

#[tokio::test]
async fn mfa_login_completes_after_code_and_trust() {
    let dir = TempDir::new().unwrap();
    let exchange = ScriptedExchange::new(vec![
        signin_mfa(),
        code_accepted(),
        trust_granted(),
        account_login(),
    ]);
    let mut client = client_over(exchange.clone(), &dir);

    let outcome = client.login("user@example.com", "hunter2").await.unwrap();
    assert!(matches!(outcome, LoginOutcome::MfaRequired));
    assert_eq!(client.phase(), AuthPhase::MfaRequested);

    // Whitespace and dashes are stripped before submission.
    let outcome = client.provide_code(" 12 34-56 ").await.unwrap();
    assert!(matches!(outcome, LoginOutcome::Ready(_)));
    assert_eq!(client.phase(), AuthPhase::Ready);

    let requests = exchange.requests();
    let verify = &requests[1];
    assert!(verify.url.path().ends_with("/verify/securitycode"));
    assert_eq!(
        verify.body.clone().unwrap()["securityCode"]["code"],
        "123456"
    );
    // The submission rode with the anti-forgery secrets.
    assert!(
        verify
            .headers
            .iter()
            .any(|(name, value)| name == "scnt" && value == "scnt-1")
    );

    // The granted trust token is durable.
    assert_eq!(client.session().trust_token(), Some("trust-9"));
    let stored = TrustStore::new(dir.path())
        .load("user@example.com")
        .unwrap();
    assert_eq!(stored.as_deref(), Some("trust-9"));
}

#[tokio::test]
async fn saved_trust_token_rides_the_next_signin() {
    let dir = TempDir::new().unwrap();
    let exchange = ScriptedExchange::new(vec![
        signin_mfa(),
        code_accepted(),
        trust_granted(),
        account_login(),
    ]);
    let mut client = client_over(exchange, &dir);
    client.login("user@example.com", "hunter2").await.unwrap();
    client.provide_code("123456").await.unwrap();
    drop(client);

    // A fresh client on the same data dir presents the stored token and
    // the provider skips the second factor.
    let exchange = ScriptedExchange::new(vec![signin_ok(), account_login()]);
    let mut client = client_over(exchange.clone(), &dir);
    let outcome = client.login("user@example.com", "hunter2").await.unwrap();
    assert!(matches!(outcome, LoginOutcome::Ready(_)));

    let signin_body = exchange.requests()[0].body.clone().unwrap();
    assert_eq!(signin_body["trustTokens"], json!(["trust-9"]));
    assert!(client.session().cookies_valid());
}

#[tokio::test]
async fn rejected_code_keeps_the_prompt_open() {
    let dir = TempDir::new().unwrap();
    let exchange = ScriptedExchange::new(vec![
        signin_mfa(),
        response(400, &[], json!({"serviceErrors": [{"code": "-21669"}]})),
        code_accepted(),
        trust_granted(),
        account_login(),
    ]);
    let mut client = client_over(exchange, &dir);
    client.login("user@example.com", "hunter2").await.unwrap();

    let err = client.provide_code("000000").await.unwrap_err();
    assert_eq!(err.code(), ClientErrorCode::CodeRejected);
    assert_eq!(client.phase(), AuthPhase::MfaRequested);

    // A corrected code on the same handshake still lands.
    let outcome = client.provide_code("123456").await.unwrap();
    assert!(matches!(outcome, LoginOutcome::Ready(_)));
}

#[tokio::test]
async fn signin_without_secrets_is_a_protocol_failure() {
    let dir = TempDir::new().unwrap();
    // A 200 without the anti-forgery headers is useless for the rest of
    // the handshake.
    let bare = response(200, &[("x-apple-session-token", "tok")], json!({}));
    let exchange = ScriptedExchange::new(vec![bare]);
    let mut client = client_over(exchange, &dir);

    let err = client
        .login("user@example.com", "hunter2")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ClientErrorCode::Protocol);
    assert!(err.message().contains("handshake secrets"), "{err}");
    assert_eq!(client.phase(), AuthPhase::Error);
}

#[tokio::test]
async fn rejected_credentials_are_typed_and_retryable() {
    let dir = TempDir::new().unwrap();
    let unauthorized = response(401, &[], json!({"serviceErrors": [{"code": "-20101"}]}));
    let exchange = ScriptedExchange::new(vec![unauthorized]);
    let mut client = client_over(exchange.clone(), &dir);

    let err = client.login("user@example.com", "wrong").await.unwrap_err();
    assert_eq!(err.code(), ClientErrorCode::InvalidCredentials);
    assert_eq!(client.phase(), AuthPhase::Error);

    // The failed state accepts a fresh attempt.
    exchange.push(vec![signin_ok(), account_login()]);
    let outcome = client.login("user@example.com", "right").await.unwrap();
    assert!(matches!(outcome, LoginOutcome::Ready(_)));
}

#[tokio::test]
async fn second_login_refused_mid_handshake() {
    let dir = TempDir::new().unwrap();
    let exchange = ScriptedExchange::new(vec![signin_mfa()]);
    let mut client = client_over(exchange.clone(), &dir);
    client.login("user@example.com", "hunter2").await.unwrap();

    let err = client
        .login("user@example.com", "hunter2")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ClientErrorCode::Internal);
    // The refusal left the pending handshake untouched.
    assert_eq!(client.phase(), AuthPhase::MfaRequested);
    assert_eq!(exchange.count_path("/signin"), 1);
}

#[tokio::test]
async fn trust_refusal_still_lands_ready() {
    let dir = TempDir::new().unwrap();
    let exchange = ScriptedExchange::new(vec![
        signin_mfa(),
        code_accepted(),
        response(500, &[], json!({"reason": "maintenance"})),
        account_login(),
    ]);
    let mut client = client_over(exchange, &dir);
    client.login("user@example.com", "hunter2").await.unwrap();

    let outcome = client.provide_code("123456").await.unwrap();
    assert!(matches!(outcome, LoginOutcome::Ready(_)));
    assert_eq!(client.phase(), AuthPhase::Ready);

    // No trust was granted, so none is held or stored for next time.
    assert!(client.session().trust_token().is_none());
    let stored = TrustStore::new(dir.path())
        .load("user@example.com")
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn stale_write_recovers_with_retained_credentials() {
    let dir = TempDir::new().unwrap();
    let exchange = ScriptedExchange::new(vec![
        signin_ok(),
        account_login(),
        stale_session(),
        signin_ok(),
        account_login(),
        write_accepted(),
    ]);
    let mut client = client_over(exchange.clone(), &dir);
    client.login("user@example.com", "hunter2").await.unwrap();

    let accepted = client.upsert_event(&event(), "FT=-@RU=1").await.unwrap();
    assert!(accepted);
    // The cycle ended in success, so the retry budget is whole again.
    assert_eq!(client.reconnect_attempts(), 0);
    assert_eq!(client.phase(), AuthPhase::Ready);
    assert_eq!(exchange.count_path("/signin"), 2);
    assert_eq!(exchange.remaining(), 0);
}

#[tokio::test]
async fn reauth_budget_exhausts_against_persistent_staleness() {
    let dir = TempDir::new().unwrap();
    let mut script = vec![signin_ok(), account_login(), stale_session()];
    for _ in 0..4 {
        script.push(signin_ok());
        script.push(account_login());
        script.push(stale_session());
    }
    let exchange = ScriptedExchange::new(script);
    let mut client = client_over(exchange.clone(), &dir);
    client.login("user@example.com", "hunter2").await.unwrap();

    let err = client
        .upsert_event(&event(), "FT=-@RU=1")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ClientErrorCode::RetryExhausted);
    // One interactive login plus four silent recoveries, then the budget
    // slams shut without another sign-in.
    assert_eq!(exchange.count_path("/signin"), 5);
    assert_eq!(exchange.remaining(), 0);
}

#[tokio::test]
async fn stale_recovery_that_needs_a_second_factor_surfaces() {
    let dir = TempDir::new().unwrap();
    let exchange = ScriptedExchange::new(vec![
        signin_ok(),
        account_login(),
        stale_session(),
        signin_mfa(),
    ]);
    let mut client = client_over(exchange.clone(), &dir);
    client.login("user@example.com", "hunter2").await.unwrap();

    let err = client.list_calendars().await.unwrap_err();
    assert_eq!(err.code(), ClientErrorCode::StaleSession);
    assert!(err.message().contains("second factor"), "{err}");

    // The handshake is parked at the prompt; the interactive path can
    // finish what the silent one could not.
    assert_eq!(client.phase(), AuthPhase::MfaRequested);
    exchange.push(vec![
        code_accepted(),
        trust_granted(),
        account_login(),
        snapshot(),
    ]);
    client.provide_code("123456").await.unwrap();
    let calendars = client.list_calendars().await.unwrap();
    assert_eq!(calendars.len(), 2);
    assert_eq!(client.reconnect_attempts(), 0);
}

#[tokio::test]
async fn ctag_conflict_is_a_write_conflict() {
    let dir = TempDir::new().unwrap();
    let exchange = ScriptedExchange::new(vec![
        signin_ok(),
        account_login(),
        response(412, &[], json!({})),
    ]);
    let mut client = client_over(exchange.clone(), &dir);
    client.login("user@example.com", "hunter2").await.unwrap();

    let err = client
        .upsert_event(&event(), "FT=-@RU=0")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ClientErrorCode::WriteConflict);
    // A conflict is not a session problem; nothing re-authenticated.
    assert_eq!(exchange.count_path("/signin"), 1);

    // The write carried the event keyed by collection and guid, with the
    // quoted ctag riding in the client state.
    let write = &exchange.requests()[2];
    assert_eq!(write.url.path(), "/ca/events/home/EV-1");
    let query = write.url.query().unwrap();
    assert!(query.ends_with("usertz=UTC&dsid=8018042"), "{query}");
    let body = write.body.clone().unwrap();
    assert_eq!(body["ClientState"]["Collection"][0]["ctag"], "FT=-@RU=0");
    assert_eq!(body["ClientState"]["fullState"], false);
    assert_eq!(body["Event"]["pGuid"], "home");
}

#[tokio::test]
async fn create_event_picks_up_the_collection_ctag() {
    let dir = TempDir::new().unwrap();
    let exchange = ScriptedExchange::new(vec![
        signin_ok(),
        account_login(),
        snapshot(),
        write_accepted(),
    ]);
    let mut client = client_over(exchange.clone(), &dir);
    client.login("user@example.com", "hunter2").await.unwrap();

    let intent = EventIntent::new("Dentist", pd(2026, 9, 1, 14, 0), pd(2026, 9, 1, 15, 0));
    let created = client.create_event(intent, "home").await.unwrap();
    assert_eq!(created.title, "Dentist");
    assert_eq!(created.p_guid, "home");
    assert!(!created.guid.is_empty());

    let write = &exchange.requests()[3];
    let body = write.body.clone().unwrap();
    assert_eq!(body["ClientState"]["Collection"][0]["ctag"], "FT=-@RU=1");
    assert_eq!(body["Event"]["title"], "Dentist");
}

#[tokio::test]
async fn create_event_refuses_a_read_only_collection() {
    let dir = TempDir::new().unwrap();
    let exchange = ScriptedExchange::new(vec![signin_ok(), account_login(), snapshot()]);
    let mut client = client_over(exchange.clone(), &dir);
    client.login("user@example.com", "hunter2").await.unwrap();

    let intent = EventIntent::new("Standup", pd(2026, 9, 1, 9, 0), pd(2026, 9, 1, 9, 15));
    let err = client.create_event(intent, "work").await.unwrap_err();
    assert_eq!(err.code(), ClientErrorCode::InvalidEvent);
    assert!(err.message().contains("read-only"), "{err}");
    // Nothing was written.
    assert_eq!(exchange.remaining(), 0);
    assert_eq!(exchange.requests().len(), 3);
}
