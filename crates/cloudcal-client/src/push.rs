//! Push-notification registration and the long-poll listener.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ClientResult;
use crate::session::Session;
use crate::transport::{HttpRequest, Transport, check_status, endpoint};

/// Pause before re-issuing the poll after a failed cycle.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenGrant {
    push_token: String,
}

/// One notification from the long poll: the service it concerns plus the
/// raw payload, which the caller interprets.
#[derive(Debug, Clone, Deserialize)]
pub struct PushNotification {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Thin wrapper over the push web service.
///
/// The listener is the one long-lived operation in the client: an explicit
/// loop that issues a long poll, hands each notification to the callback,
/// and re-issues the poll until its handle signals a stop. Dropping the
/// in-flight poll closes its connection, so shutdown is prompt.
pub struct PushChannel {
    push_url: Url,
    transport: Arc<Transport>,
}

impl PushChannel {
    pub fn new(push_url: Url, transport: Arc<Transport>) -> Self {
        Self {
            push_url,
            transport,
        }
    }

    /// Obtains a push token for this session.
    pub async fn get_push_token(&self, session: &Session) -> ClientResult<String> {
        let mut url = endpoint(&self.push_url, "getToken")?;
        url.query_pairs_mut()
            .append_pair("dsid", session.require_dsid()?);

        let request = HttpRequest::post(url).with_headers(session.auth_headers());
        let response = self.transport.send(request).await?;
        check_status(response.status, "push token request")?;

        let grant: TokenGrant = response.json()?;
        debug!("obtained push token");
        Ok(grant.push_token)
    }

    /// Registers the token so the provider starts queueing notifications.
    pub async fn register_push_token(&self, session: &Session, token: &str) -> ClientResult<()> {
        let mut url = endpoint(&self.push_url, "registerToken")?;
        url.query_pairs_mut()
            .append_pair("dsid", session.require_dsid()?);

        let request = HttpRequest::post(url)
            .with_headers(session.auth_headers())
            .with_json_body(json!({ "pushToken": token }));
        let response = self.transport.send(request).await?;
        check_status(response.status, "push token registration")?;
        debug!("push token registered");
        Ok(())
    }

    /// Starts the long-poll loop on a background task.
    ///
    /// The callback runs on that task, once per notification. The loop
    /// stops when [`PushHandle::stop`] is called or the handle is dropped;
    /// a failed poll is logged and retried after a short pause. The poll
    /// uses the session's headers as of this call, so after a re-login the
    /// listener should be stopped and started again.
    pub fn start_listener<F>(
        &self,
        session: &Session,
        token: &str,
        mut on_notification: F,
    ) -> ClientResult<PushHandle>
    where
        F: FnMut(PushNotification) + Send + 'static,
    {
        let mut url = endpoint(&self.push_url, "listen")?;
        url.query_pairs_mut()
            .append_pair("pushToken", token)
            .append_pair("dsid", session.require_dsid()?);
        let headers = session.auth_headers();
        let transport = Arc::clone(&self.transport);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!("push listener started");
            loop {
                let request = HttpRequest::get(url.clone()).with_headers(headers.clone());
                let failed = tokio::select! {
                    _ = stop_rx.changed() => break,
                    result = transport.send(request) => match result {
                        Ok(response) if response.is_success() => {
                            if response.body.is_empty() {
                                // Poll window rolled over without news.
                                debug!("push poll returned empty; re-issuing");
                            } else {
                                match response.json::<PushNotification>() {
                                    Ok(notification) => on_notification(notification),
                                    Err(err) => {
                                        warn!(error = %err, "undecodable push notification")
                                    }
                                }
                            }
                            false
                        }
                        Ok(response) => {
                            warn!(status = response.status, "push poll failed");
                            true
                        }
                        Err(err) => {
                            warn!(error = %err, "push poll transport failure");
                            true
                        }
                    },
                };
                if failed {
                    tokio::select! {
                        _ = stop_rx.changed() => break,
                        _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                    }
                }
            }
            info!("push listener stopped");
        });

        Ok(PushHandle { stop_tx, task })
    }
}

/// Controls a running push listener.
pub struct PushHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PushHandle {
    /// Signals the loop to stop; the in-flight poll is abandoned.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stops the loop and waits for the task to wind down.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
