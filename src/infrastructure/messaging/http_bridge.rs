use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    application::services::transport::{TransportClient, TransportEvent, TransportEvents},
    domain::{errors::TransportError, value_objects::ChatId},
};

#[derive(Debug, Clone)]
pub struct HttpBridgeConfig {
    pub base_url: String,
    pub session_id: String,
    pub api_token: Option<String>,
    pub status_poll_interval: Duration,
    pub request_timeout: Duration,
}

/// Transport backed by a messaging bridge that owns the actual chat session
/// and exposes it over HTTP/JSON.
pub struct HttpBridgeClient {
    http: Client,
    config: HttpBridgeConfig,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl HttpBridgeClient {
    pub fn new(config: HttpBridgeConfig) -> anyhow::Result<Arc<Self>> {
        let http = Client::builder()
            .user_agent("chat-dispatch/http-bridge")
            .timeout(config.request_timeout)
            .build()
            .context("failed to build bridge http client")?;

        Ok(Arc::new(Self {
            http,
            config,
            watcher: Mutex::new(None),
        }))
    }

    fn session_url(&self, path: &str) -> String {
        format!(
            "{}/sessions/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.session_id,
            path
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn replace_watcher(&self, next: Option<JoinHandle<()>>) {
        let mut watcher = self.watcher.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = watcher.take() {
            previous.abort();
        }
        *watcher = next;
    }
}

impl Drop for HttpBridgeClient {
    fn drop(&mut self) {
        self.replace_watcher(None);
    }
}

#[async_trait]
impl TransportClient for HttpBridgeClient {
    fn name(&self) -> &'static str {
        "http-bridge"
    }

    async fn initialize(&self, events: TransportEvents) -> Result<(), TransportError> {
        self.replace_watcher(None);

        let url = self.session_url("start");
        info!(url = %url, session = %self.config.session_id, "starting bridge session");

        let response = self
            .authorize(self.http.post(url))
            .send()
            .await
            .map_err(map_request_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Other(anyhow::anyhow!(
                "bridge refused to start session: HTTP {status}: {body}"
            )));
        }

        let watcher = SessionWatcher {
            request: self.authorize(self.http.get(self.session_url("status"))),
            interval: self.config.status_poll_interval,
            events,
        };
        self.replace_watcher(Some(tokio::spawn(watcher.run())));
        Ok(())
    }

    async fn send(&self, chat_id: &ChatId, text: &str) -> Result<(), TransportError> {
        let request = SendMessageRequest {
            chat_id: chat_id.as_str(),
            text,
        };
        debug!(chat_id = %chat_id, "posting message to bridge");

        let response = self
            .authorize(self.http.post(self.session_url("messages")))
            .json(&request)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_status(status, body));
        }

        let payload: SendMessageResponse = response
            .json()
            .await
            .map_err(|err| TransportError::Send(format!("unreadable bridge response: {err}")))?;
        if payload.success {
            Ok(())
        } else {
            Err(TransportError::Send(
                payload.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

struct SessionWatcher {
    request: RequestBuilder,
    interval: Duration,
    events: TransportEvents,
}

impl SessionWatcher {
    /// Polls the bridge until the session disconnects or nobody listens.
    async fn run(self) {
        let mut tracker = SessionTracker::default();
        loop {
            let Some(request) = self.request.try_clone() else {
                return;
            };

            let observed = match request.send().await {
                Ok(response) if response.status().is_success() => {
                    match response.json::<SessionStatus>().await {
                        Ok(status) => tracker.observe(&status),
                        Err(err) => tracker.poll_failed(&err.to_string()),
                    }
                }
                Ok(response) => tracker.poll_failed(&format!("HTTP {}", response.status())),
                Err(err) => tracker.poll_failed(&err.to_string()),
            };

            for event in observed {
                let disconnected = matches!(event, TransportEvent::Disconnected(_));
                if self.events.send(event).is_err() || disconnected {
                    return;
                }
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionStatus {
    pub state: String,
    #[serde(default)]
    pub qr: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Starting,
    Pairing,
    Authenticated,
    Ready,
    Disconnected,
}

impl SessionState {
    fn parse(state: &str) -> Self {
        match state {
            "qr" | "scan_qr" | "pairing" => SessionState::Pairing,
            "authenticated" => SessionState::Authenticated,
            "ready" | "connected" => SessionState::Ready,
            "disconnected" | "logged_out" | "failed" | "closed" => SessionState::Disconnected,
            _ => SessionState::Starting,
        }
    }
}

/// Turns successive status snapshots into edge-triggered lifecycle events.
#[derive(Debug, Default)]
struct SessionTracker {
    state: Option<SessionState>,
    last_qr: Option<String>,
}

impl SessionTracker {
    fn observe(&mut self, status: &SessionStatus) -> Vec<TransportEvent> {
        let next = SessionState::parse(&status.state);
        let mut events = Vec::new();

        if next == SessionState::Pairing {
            if let Some(qr) = &status.qr {
                if self.last_qr.as_ref() != Some(qr) {
                    self.last_qr = Some(qr.clone());
                    events.push(TransportEvent::QrCode(qr.clone()));
                }
            }
        }

        if self.state != Some(next) {
            match next {
                SessionState::Authenticated => events.push(TransportEvent::Authenticated),
                SessionState::Ready => events.push(TransportEvent::Ready),
                SessionState::Disconnected => events.push(TransportEvent::Disconnected(
                    status
                        .reason
                        .clone()
                        .unwrap_or_else(|| status.state.clone()),
                )),
                SessionState::Starting | SessionState::Pairing => {}
            }
            self.state = Some(next);
        }

        events
    }

    /// A failed poll only counts as a disconnect once the session was usable.
    fn poll_failed(&mut self, reason: &str) -> Vec<TransportEvent> {
        match self.state {
            Some(SessionState::Ready) | Some(SessionState::Authenticated) => {
                self.state = Some(SessionState::Disconnected);
                vec![TransportEvent::Disconnected(format!("status poll failed: {reason}"))]
            }
            _ => {
                warn!(error = %reason, "bridge status poll failed");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

fn map_request_error(err: reqwest::Error) -> TransportError {
    if err.is_connect() {
        TransportError::Disconnected(err.to_string())
    } else {
        TransportError::Send(err.to_string())
    }
}

fn map_http_status(status: StatusCode, body: String) -> TransportError {
    match status {
        StatusCode::CONFLICT | StatusCode::GONE => {
            TransportError::Disconnected(format!("HTTP {status}: {body}"))
        }
        StatusCode::SERVICE_UNAVAILABLE => TransportError::NotReady,
        _ => TransportError::Send(format!("HTTP {status}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(state: &str, qr: Option<&str>) -> SessionStatus {
        SessionStatus {
            state: state.to_string(),
            qr: qr.map(str::to_string),
            reason: None,
        }
    }

    #[test]
    fn pairing_flow_emits_each_event_once() {
        let mut tracker = SessionTracker::default();

        assert!(tracker.observe(&status("starting", None)).is_empty());
        assert_eq!(
            tracker.observe(&status("qr", Some("code-1"))),
            vec![TransportEvent::QrCode("code-1".to_string())]
        );
        assert!(tracker.observe(&status("qr", Some("code-1"))).is_empty());
        assert_eq!(
            tracker.observe(&status("qr", Some("code-2"))),
            vec![TransportEvent::QrCode("code-2".to_string())]
        );
        assert_eq!(
            tracker.observe(&status("authenticated", None)),
            vec![TransportEvent::Authenticated]
        );
        assert_eq!(tracker.observe(&status("ready", None)), vec![TransportEvent::Ready]);
        assert!(tracker.observe(&status("ready", None)).is_empty());
    }

    #[test]
    fn disconnect_carries_reason() {
        let mut tracker = SessionTracker::default();
        tracker.observe(&status("ready", None));

        let events = tracker.observe(&SessionStatus {
            state: "logged_out".to_string(),
            qr: None,
            reason: Some("phone unlinked".to_string()),
        });

        assert_eq!(events, vec![TransportEvent::Disconnected("phone unlinked".to_string())]);
    }

    #[test]
    fn poll_failures_before_ready_are_tolerated() {
        let mut tracker = SessionTracker::default();
        assert!(tracker.poll_failed("connection refused").is_empty());

        tracker.observe(&status("ready", None));
        let events = tracker.poll_failed("connection refused");
        assert!(matches!(events.as_slice(), [TransportEvent::Disconnected(reason)] if reason.contains("connection refused")));
    }

    #[test]
    fn http_statuses_map_to_transport_errors() {
        assert!(map_http_status(StatusCode::CONFLICT, String::new()).is_disconnect());
        assert!(matches!(
            map_http_status(StatusCode::SERVICE_UNAVAILABLE, String::new()),
            TransportError::NotReady
        ));
        let err = map_http_status(StatusCode::BAD_REQUEST, "no such chat".to_string());
        assert!(!err.is_disconnect());
        assert!(err.to_string().contains("no such chat"));
    }

    #[test]
    fn send_request_uses_bridge_field_names() {
        let body = serde_json::to_value(SendMessageRequest {
            chat_id: "923001234567@c.us",
            text: "hello",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "chatId": "923001234567@c.us", "text": "hello" }));
    }

    #[test]
    fn session_urls_tolerate_trailing_slash() {
        let client = HttpBridgeClient::new(HttpBridgeConfig {
            base_url: "http://bridge.local/".to_string(),
            session_id: "app2".to_string(),
            api_token: None,
            status_poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap();

        assert_eq!(client.session_url("status"), "http://bridge.local/sessions/app2/status");
    }
}
