//! Client of the upstream schedule service.
//!
//! Keeps the freshest daily and weekly snapshots, owns the interactor key
//! and runs the long-lived update stream. The client is the single writer
//! of the snapshots; everything else reads.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use reqwest::Client;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::api::{InteractResponse, IsValidResponse, Notify, PageResponse};
use crate::error::ApiError;
use crate::models::compare::compare_pages;
use crate::models::page::{Page, PageKind};

/// Delay before retrying a failed index refresh.
pub const FETCH_RETRY: Duration = Duration::from_secs(60);

/// Latest known pages. Swapped whole by the client, read by everybody.
#[derive(Default)]
pub struct Snapshots {
    daily: RwLock<Option<Page>>,
    weekly: RwLock<Option<Page>>,
}

impl Snapshots {
    pub async fn daily(&self) -> Option<Page> {
        self.daily.read().await.clone()
    }

    pub async fn weekly(&self) -> Option<Page> {
        self.weekly.read().await.clone()
    }

    pub async fn get(&self, kind: PageKind) -> Option<Page> {
        match kind {
            PageKind::Daily => self.daily().await,
            PageKind::Weekly => self.weekly().await,
        }
    }
}

pub struct ScheduleClient {
    http: Client,
    base: Url,
    key: Mutex<Option<String>>,
    pub snapshots: Arc<Snapshots>,
}

impl ScheduleClient {
    pub fn new(http: Client, base: Url) -> Self {
        Self {
            http,
            base,
            key: Mutex::new(None),
            snapshots: Arc::new(Snapshots::default()),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path)?)
    }

    /// Health probe against the service root.
    pub async fn ping(&self) -> Result<(), ApiError> {
        let response = self.http.get(self.base.clone()).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::InvalidStatusCode(response.status()));
        }
        Ok(())
    }

    async fn fetch_page(&self, kind: PageKind) -> Result<Page, ApiError> {
        let path = match kind {
            PageKind::Daily => "schedule/daily",
            PageKind::Weekly => "schedule/weekly",
        };
        let response = self.http.get(self.endpoint(path)?).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::InvalidStatusCode(response.status()));
        }
        let body: PageResponse = serde_json::from_str(&response.text().await?)?;
        body.data
            .map(|data| data.page)
            .ok_or_else(|| serde_json::Error::io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "ok response without a page",
            )))
            .map_err(ApiError::from)
    }

    /// Forces a daily fetch and replaces the cached snapshot.
    pub async fn daily(&self) -> Result<Page, ApiError> {
        let page = self.fetch_page(PageKind::Daily).await?;
        *self.snapshots.daily.write().await = Some(page.clone());
        Ok(page)
    }

    /// Forces a weekly fetch and replaces the cached snapshot.
    pub async fn weekly(&self) -> Result<Page, ApiError> {
        let page = self.fetch_page(PageKind::Weekly).await?;
        *self.snapshots.weekly.write().await = Some(page.clone());
        Ok(page)
    }

    /// Cached snapshot, fetching once on first call.
    pub async fn cached_daily(&self) -> Result<Page, ApiError> {
        match self.snapshots.daily().await {
            Some(page) => Ok(page),
            None => self.daily().await,
        }
    }

    pub async fn cached_weekly(&self) -> Result<Page, ApiError> {
        match self.snapshots.weekly().await {
            Some(page) => Ok(page),
            None => self.weekly().await,
        }
    }

    /// Asks the server to re-crawl its sources.
    pub async fn update(&self) -> Result<(), ApiError> {
        let key = self.ensure_key().await?;
        let mut url = self.endpoint("schedule/update")?;
        url.query_pairs_mut().append_pair("key", &key);
        let response = self.http.post(url).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::InvalidStatusCode(response.status()));
        }
        Ok(())
    }

    async fn is_key_valid(&self, key: &str) -> Result<bool, ApiError> {
        let mut url = self.endpoint("schedule/interact/is-valid")?;
        url.query_pairs_mut().append_pair("key", key);
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let body: IsValidResponse = serde_json::from_str(&response.text().await?)?;
        Ok(body.is_ok)
    }

    /// Returns a valid interactor key, requesting a fresh one when the
    /// stored key is absent or no longer accepted.
    async fn ensure_key(&self) -> Result<String, ApiError> {
        let mut slot = self.key.lock().await;
        if let Some(key) = slot.as_ref() {
            if self.is_key_valid(key).await? {
                return Ok(key.clone());
            }
            debug!("Interactor key no longer valid, requesting a new one");
        }
        let response = self.http.get(self.endpoint("schedule/interact")?).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::InvalidStatusCode(response.status()));
        }
        let body: InteractResponse = serde_json::from_str(&response.text().await?)?;
        let key = body.data.interactor.key;
        *slot = Some(key.clone());
        info!("Obtained interactor key");
        Ok(key)
    }

    fn updates_url(&self, key: &str) -> String {
        // http → ws, https → wss.
        let base = self.base.as_str().replacen("http", "ws", 1);
        let sep = if base.ends_with('/') { "" } else { "/" };
        format!("{base}{sep}schedule/updates?key={key}")
    }

    /// Refetches the pages a notify flags as changed and compares them with
    /// the previous snapshots. Returns `None` when nothing differs locally.
    async fn refresh_for(&self, server: &Notify) -> Result<Option<Notify>, ApiError> {
        let mut want_daily = server.daily.is_some();
        let mut want_weekly = server.weekly.is_some();
        if !want_daily && !want_weekly {
            // A notify that names no page still means something crawled.
            want_daily = true;
            want_weekly = true;
        }

        let old_daily = self.snapshots.daily().await;
        let old_weekly = self.snapshots.weekly().await;
        let (new_daily, new_weekly) = futures::join!(
            async {
                if want_daily {
                    Some(self.daily().await)
                } else {
                    None
                }
            },
            async {
                if want_weekly {
                    Some(self.weekly().await)
                } else {
                    None
                }
            },
        );

        let daily_cmp = match new_daily.transpose()? {
            Some(new) => old_daily
                .map(|old| compare_pages(&old, &new))
                .filter(|cmp| !cmp.is_empty()),
            None => None,
        };
        let weekly_cmp = match new_weekly.transpose()? {
            Some(new) => old_weekly
                .map(|old| compare_pages(&old, &new))
                .filter(|cmp| !cmp.is_empty()),
            None => None,
        };

        if daily_cmp.is_none() && weekly_cmp.is_none() {
            return Ok(None);
        }
        Ok(Some(Notify {
            invoker: server.invoker.clone(),
            daily: daily_cmp,
            weekly: weekly_cmp,
        }))
    }

    /// Consumes the update stream forever, publishing locally computed
    /// compares. Returns when the receiver side is dropped. Reconnects with
    /// backoff; the interactor key is revalidated before every connect. A
    /// frame identical to the previous one is a post-reconnect replay and is
    /// skipped.
    pub async fn updates(&self, tx: mpsc::Sender<Notify>) {
        let mut backoff = Duration::from_secs(1);
        let mut last_frame: Option<String> = None;
        let config = WebSocketConfig {
            max_message_size: None,
            max_frame_size: None,
            ..WebSocketConfig::default()
        };

        loop {
            let key = match self.ensure_key().await {
                Ok(key) => key,
                Err(err) => {
                    warn!("updates: key refresh failed: {err}");
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                    continue;
                }
            };

            let url = self.updates_url(&key);
            let (mut ws, _) = match connect_async_with_config(url.as_str(), Some(config), false).await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!("updates: connect failed: {err}");
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                    continue;
                }
            };
            info!("updates: stream connected");
            backoff = Duration::from_secs(1);

            while let Some(message) = ws.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if is_replay(&last_frame, &text) {
                            debug!("updates: duplicate frame after reconnect, skipping");
                            continue;
                        }
                        match serde_json::from_str::<Notify>(&text) {
                            Ok(server) => {
                                match self.refresh_for(&server).await {
                                    Ok(Some(notify)) => {
                                        if tx.send(notify).await.is_err() {
                                            let _ = ws.close(None).await;
                                            return;
                                        }
                                    }
                                    Ok(None) => debug!("updates: no local difference"),
                                    Err(err) => warn!("updates: refresh failed: {err}"),
                                }
                                last_frame = Some(text);
                            }
                            // Protocol errors fail hard for the message only.
                            Err(err) => warn!("updates: bad frame: {err}"),
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        let _ = ws.send(Message::Pong(payload)).await;
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!("updates: stream error: {err}");
                        break;
                    }
                }
            }

            warn!("updates: stream closed, reconnecting");
            tokio::time::sleep(backoff).await;
            backoff = next_backoff(backoff);
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(Duration::from_secs(60))
}

/// The server re-sends the current frame on (re)connect; a frame equal to
/// the previous one carries nothing new.
fn is_replay(last: &Option<String>, frame: &str) -> bool {
    last.as_deref() == Some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ScheduleClient {
        ScheduleClient::new(
            Client::new(),
            Url::parse("https://sched.example.org/").unwrap(),
        )
    }

    #[test]
    fn endpoint_joins_relative_paths() {
        let url = client().endpoint("schedule/daily").unwrap();
        assert_eq!(url.as_str(), "https://sched.example.org/schedule/daily");
    }

    #[test]
    fn updates_url_switches_scheme() {
        let c = client();
        assert_eq!(
            c.updates_url("deadbeef"),
            "wss://sched.example.org/schedule/updates?key=deadbeef"
        );
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        let mut d = Duration::from_secs(1);
        for _ in 0..10 {
            d = next_backoff(d);
        }
        assert_eq!(d, Duration::from_secs(60));
    }

    #[test]
    fn repeated_frame_is_a_replay() {
        let mut last = None;
        assert!(!is_replay(&last, r#"{"daily":true}"#));
        last = Some(r#"{"daily":true}"#.to_string());
        assert!(is_replay(&last, r#"{"daily":true}"#));
        assert!(!is_replay(&last, r#"{"weekly":true}"#));
    }
}
