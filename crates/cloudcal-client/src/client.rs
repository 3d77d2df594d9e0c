//! Per-account facade tying the pieces together.

use std::sync::Arc;

use cloudcal_core::{CalendarCollection, CalendarEvent, DateRange, EventIntent};
use tracing::warn;

use crate::auth::{AccountMetadata, AuthFlow, AuthPhase, LoginOutcome};
use crate::calendar::CalendarApi;
use crate::config::{AccountConfig, ServiceConfig};
use crate::error::{ClientError, ClientErrorCode, ClientResult};
use crate::push::{PushChannel, PushHandle, PushNotification};
use crate::ready::{ReadySignal, ReadyWaiter};
use crate::reconnect::ReconnectPolicy;
use crate::session::Session;
use crate::transport::Transport;
use crate::trust::TrustStore;
use crate::vault::Credentials;

/// One account's session, login flow and calendar access.
///
/// Construct one per account and pass it by reference; there is no shared
/// process-wide state. Calendar calls transparently recover from a stale
/// session by re-authenticating with the retained credentials, bounded by
/// the reconnect policy.
pub struct AccountClient {
    service: ServiceConfig,
    transport: Arc<Transport>,
    session: Session,
    flow: AuthFlow,
    api: CalendarApi,
    policy: ReconnectPolicy,
    ready: ReadySignal,
    credentials: Option<Credentials>,
}

impl AccountClient {
    pub fn new(service: ServiceConfig, account: AccountConfig) -> ClientResult<Self> {
        let transport = Arc::new(Transport::from_config(&service)?);
        Self::with_transport(service, account, transport)
    }

    /// Builds a client over an existing transport, the seam scripted
    /// exchanges plug into.
    pub fn with_transport(
        service: ServiceConfig,
        account: AccountConfig,
        transport: Arc<Transport>,
    ) -> ClientResult<Self> {
        account.validate()?;
        let session = Session::new(&account.account, TrustStore::new(&account.data_dir));
        let flow = AuthFlow::new(
            service.clone(),
            Arc::clone(&transport),
            account.trust_device,
        );
        let api = CalendarApi::new(
            service.calendar_url.clone(),
            Arc::clone(&transport),
            &account.usertz,
        );
        Ok(Self {
            service,
            transport,
            session,
            flow,
            api,
            policy: ReconnectPolicy::new(),
            ready: ReadySignal::new(),
            credentials: None,
        })
    }

    pub fn phase(&self) -> AuthPhase {
        self.flow.phase()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// How many stale-session recoveries the current request cycle has
    /// consumed.
    pub fn reconnect_attempts(&self) -> u32 {
        self.policy.attempts()
    }

    /// Independent waiter that resolves once the session is ready. Handing
    /// one to a task never triggers a login by itself.
    pub fn ready_waiter(&self) -> ReadyWaiter {
        self.ready.waiter()
    }

    /// Runs the login handshake. On [`LoginOutcome::MfaRequired`] the
    /// caller prompts for the code and calls [`provide_code`].
    ///
    /// The credentials are retained in memory so a later stale session can
    /// re-authenticate without asking again.
    ///
    /// [`provide_code`]: AccountClient::provide_code
    pub async fn login(&mut self, username: &str, password: &str) -> ClientResult<LoginOutcome> {
        let outcome = self
            .flow
            .authenticate(&mut self.session, username, password)
            .await?;
        self.credentials = Some(Credentials::new(username, password));
        // An interactive login opens a fresh retry budget; the silent
        // re-login in recover_stale must not.
        self.policy.reset();
        if let LoginOutcome::Ready(metadata) = &outcome {
            self.apply_metadata(metadata);
        }
        Ok(outcome)
    }

    /// Submits the second-factor code and finishes the handshake.
    pub async fn provide_code(&mut self, code: &str) -> ClientResult<LoginOutcome> {
        let outcome = self.flow.provide_code(&mut self.session, code).await?;
        if let LoginOutcome::Ready(metadata) = &outcome {
            self.apply_metadata(metadata);
        }
        Ok(outcome)
    }

    /// The collections visible in the current monthly snapshot.
    pub async fn list_calendars(&mut self) -> ClientResult<Vec<CalendarCollection>> {
        self.require_ready()?;
        loop {
            match self.api.list_calendars(&self.session).await {
                Ok(collections) => {
                    self.policy.reset();
                    return Ok(collections);
                }
                Err(err) if err.code() == ClientErrorCode::StaleSession => {
                    self.recover_stale().await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// The events between `range.start` and `range.end` inclusive.
    pub async fn list_events(&mut self, range: &DateRange) -> ClientResult<Vec<CalendarEvent>> {
        self.require_ready()?;
        loop {
            match self.api.list_events(&self.session, range).await {
                Ok(events) => {
                    self.policy.reset();
                    return Ok(events);
                }
                Err(err) if err.code() == ClientErrorCode::StaleSession => {
                    self.recover_stale().await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Writes one event guarded by its collection's ctag. Returns whether
    /// the provider accepted the write.
    pub async fn upsert_event(
        &mut self,
        event: &CalendarEvent,
        calendar_ctag: &str,
    ) -> ClientResult<bool> {
        self.require_ready()?;
        loop {
            match self.api.upsert_event(&self.session, event, calendar_ctag).await {
                Ok(accepted) => {
                    self.policy.reset();
                    return Ok(accepted);
                }
                Err(err) if err.code() == ClientErrorCode::StaleSession => {
                    self.recover_stale().await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Creates an event from an intent in the named collection.
    ///
    /// Reads the snapshot first to pick up the collection's current ctag,
    /// then writes with it. Returns the event as written.
    pub async fn create_event(
        &mut self,
        intent: EventIntent,
        calendar_guid: &str,
    ) -> ClientResult<CalendarEvent> {
        let collections = self.list_calendars().await?;
        let Some(collection) = collections
            .into_iter()
            .find(|collection| collection.guid == calendar_guid)
        else {
            return Err(ClientError::invalid_event(format!(
                "no calendar with guid {calendar_guid}"
            )));
        };
        if collection.read_only {
            return Err(ClientError::invalid_event(format!(
                "calendar {calendar_guid} is read-only"
            )));
        }

        let event = CalendarEvent::from_intent(intent, &collection.guid);
        let accepted = self.upsert_event(&event, &collection.ctag).await?;
        if !accepted {
            return Err(ClientError::protocol(
                "the provider did not accept the event write",
            ));
        }
        Ok(event)
    }

    /// Obtains, registers and starts polling a push token, handing each
    /// notification to the callback.
    pub async fn start_push_listener<F>(&mut self, on_notification: F) -> ClientResult<PushHandle>
    where
        F: FnMut(PushNotification) + Send + 'static,
    {
        self.require_ready()?;
        let channel = self.push_channel();
        let token = channel.get_push_token(&self.session).await?;
        channel.register_push_token(&self.session, &token).await?;
        channel.start_listener(&self.session, &token, on_notification)
    }

    pub fn push_channel(&self) -> PushChannel {
        PushChannel::new(self.service.push_url.clone(), Arc::clone(&self.transport))
    }

    fn apply_metadata(&mut self, metadata: &AccountMetadata) {
        if let Some(url) = &metadata.calendar_url {
            self.api.set_calendar_url(url.clone());
        }
        self.ready.set_ready();
    }

    fn require_ready(&self) -> ClientResult<()> {
        let phase = self.flow.phase();
        if !phase.is_ready() {
            return Err(ClientError::internal(format!(
                "calendar operations need a ready session (phase {phase})"
            )));
        }
        Ok(())
    }

    /// One stale-session recovery: consume an attempt and log in again
    /// with the retained credentials.
    ///
    /// Every calendar operation funnels its 421s here; a successful
    /// operation returns the budget via [`ReconnectPolicy::reset`].
    async fn recover_stale(&mut self) -> ClientResult<()> {
        if !self.policy.can_retry() {
            return Err(ClientError::retry_exhausted(
                "re-authentication budget exhausted; session remains stale",
            )
            .with_account(self.session.account()));
        }
        self.ready.set_not_ready();
        warn!(
            account = %self.session.account(),
            attempt = self.policy.attempts(),
            "stale session; re-authenticating"
        );

        let Some(credentials) = self.credentials.clone() else {
            return Err(ClientError::stale_session(
                "session expired and no credentials were retained; log in again",
            ));
        };
        match self
            .flow
            .authenticate(&mut self.session, &credentials.username, &credentials.password)
            .await?
        {
            LoginOutcome::Ready(metadata) => {
                self.apply_metadata(&metadata);
                Ok(())
            }
            LoginOutcome::MfaRequired => Err(ClientError::stale_session(
                "re-authentication needs a second factor; log in interactively",
            )
            .with_account(self.session.account())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn client() -> (AccountClient, TempDir) {
        let dir = TempDir::new().unwrap();
        let account = AccountConfig::new("user@example.com", dir.path());
        let client = AccountClient::new(ServiceConfig::icloud(), account).unwrap();
        (client, dir)
    }

    #[tokio::test]
    async fn calendar_calls_refused_before_login() {
        let (mut client, _dir) = client();
        assert_eq!(client.phase(), AuthPhase::NotStarted);

        let err = client.list_calendars().await.unwrap_err();
        assert_eq!(err.code(), ClientErrorCode::Internal);
        assert!(err.message().contains("ready"), "{err}");
    }

    #[tokio::test]
    async fn ready_waiter_is_pending_before_login() {
        let (client, _dir) = client();
        let waiter = client.ready_waiter();
        // Dropping the client fails the waiter instead of hanging it.
        drop(client);
        assert!(waiter.wait().await.is_err());
    }
}
