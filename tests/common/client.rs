//! Client-side helpers for end-to-end tests
//!
//! Wraps a fully wired `NotificationClient` with fast reconnect and polling
//! settings, plus helpers that wait for observable conditions.

use super::constants::*;
use dashboard_notifications::client::Collaborators;
use dashboard_notifications::config::{
    AppConfig, CliConfig, FallbackConfig, FileConfig, RealtimeConfig,
};
use dashboard_notifications::{
    ClientStatus, ConnectionState, HttpNotificationApi, NotificationClient, TokenSource,
    TransportMode,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Notification client with its token source
pub struct TestClient {
    pub client: NotificationClient,
    pub tokens: Arc<TokenSource>,
}

impl TestClient {
    /// Configuration used by test clients: quick retries and 1s polling
    pub fn config(base_url: &str, max_attempts: u32) -> AppConfig {
        let cli = CliConfig {
            api_base_url: Some(base_url.to_string()),
            request_timeout_sec: 5,
            ..Default::default()
        };
        let file = FileConfig {
            realtime: Some(RealtimeConfig {
                base_delay_ms: Some(TEST_BASE_DELAY_MS),
                max_delay_ms: Some(TEST_MAX_DELAY_MS),
                max_attempts: Some(max_attempts),
                heartbeat_interval_secs: Some(1),
            }),
            fallback: Some(FallbackConfig {
                failure_threshold: Some(2),
                poll_interval_secs: Some(1),
            }),
            ..Default::default()
        };
        AppConfig::resolve(&cli, Some(file)).expect("Invalid test config")
    }

    /// Start a client against the server, logged in with `token` if given
    pub fn connect(base_url: &str, token: Option<&str>) -> Self {
        Self::connect_with(Self::config(base_url, 50), token)
    }

    pub fn connect_with(config: AppConfig, token: Option<&str>) -> Self {
        let tokens = Arc::new(TokenSource::new(token.map(str::to_string)));
        let parts = Collaborators::http(&config, tokens.clone());
        let client =
            NotificationClient::start(&config, parts).expect("Failed to start notification client");
        Self { client, tokens }
    }

    /// A bare REST client using the given token
    pub fn api(base_url: &str, token: Option<&str>) -> HttpNotificationApi {
        let tokens = Arc::new(TokenSource::new(token.map(str::to_string)));
        HttpNotificationApi::new(base_url.to_string(), 5, tokens)
    }

    pub async fn wait_for_status<F>(&self, mut condition: F) -> ClientStatus
    where
        F: FnMut(&ClientStatus) -> bool,
    {
        let mut rx = self.client.watch_status();
        let result = tokio::time::timeout(
            Duration::from_millis(WAIT_TIMEOUT_MS),
            rx.wait_for(|status| condition(status)),
        )
        .await;
        match result {
            Ok(Ok(status)) => *status,
            _ => panic!(
                "Status condition not met, last status {:?}",
                self.client.status()
            ),
        }
    }

    pub async fn wait_for_connection(&self, state: ConnectionState) {
        self.wait_for_status(|s| s.connection == state).await;
    }

    pub async fn wait_for_mode(&self, mode: TransportMode) {
        self.wait_for_status(|s| s.mode == mode).await;
    }

    /// Wait until the store holds `count` records
    pub async fn wait_for_records(&self, count: usize) {
        let mut rx = self.client.store().subscribe();
        let result = tokio::time::timeout(
            Duration::from_millis(WAIT_TIMEOUT_MS),
            rx.wait_for(|snapshot| snapshot.records.len() == count),
        )
        .await;
        assert!(
            matches!(result, Ok(Ok(_))),
            "Store never reached {} records",
            count
        );
    }

    /// Wait until the store's unread counter equals `count`
    pub async fn wait_for_unread(&self, count: u64) {
        let mut rx = self.client.store().subscribe();
        let result = tokio::time::timeout(
            Duration::from_millis(WAIT_TIMEOUT_MS),
            rx.wait_for(|snapshot| snapshot.unread_count == count),
        )
        .await;
        assert!(
            matches!(result, Ok(Ok(_))),
            "Unread count never reached {}",
            count
        );
    }
}

/// Poll `check` until it returns true
///
/// # Panics
///
/// Panics if the condition isn't met within `WAIT_TIMEOUT_MS`.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_millis(WAIT_TIMEOUT_MS) {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Condition not met in time: {}", what);
}
