use std::error::Error;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ktmu_sched_bot::bot::ctx::ConvKey;
use ktmu_sched_bot::bot::dispatch::{CommonEverything, Dispatcher};
use ktmu_sched_bot::bot::handlers::{handlers, middlewares};
use ktmu_sched_bot::bot::storage::CtxStore;
use ktmu_sched_bot::broadcast::Broadcaster;
use ktmu_sched_bot::config::{self, Args};
use ktmu_sched_bot::error::DispatchError;
use ktmu_sched_bot::messenger::{Egress, Keyboard};
use ktmu_sched_bot::schedule::client::{ScheduleClient, FETCH_RETRY};
use ktmu_sched_bot::subscribers::SubscriberIndex;
use log::{error, info, warn};
use tokio::sync::{mpsc, Mutex};
use url::Url;

/// Stand-in delivery that logs instead of talking to a messenger. Wire
/// adapters for VK and Telegram implement [`Egress`] and feed
/// [`CommonEverything`] into the event channel in place of this.
struct LogEgress {
    next_id: AtomicI64,
}

impl LogEgress {
    fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
        }
    }
}

impl Egress for LogEgress {
    async fn send(
        &self,
        conv: ConvKey,
        text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<i64, DispatchError> {
        info!("send to {}: {} char(s)", conv.file_stem(), text.chars().count());
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn edit(
        &self,
        conv: ConvKey,
        message_id: i64,
        _text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<(), DispatchError> {
        info!("edit {} in {}", message_id, conv.file_stem());
        Ok(())
    }

    async fn notify(&self, conv: ConvKey, text: &str) -> Result<(), DispatchError> {
        info!("notify {}: {text}", conv.file_stem());
        Ok(())
    }

    async fn pin(&self, conv: ConvKey, message_id: i64) -> Result<(), DispatchError> {
        info!("pin {} in {}", message_id, conv.file_stem());
        Ok(())
    }

    async fn delete(&self, conv: ConvKey, message_id: i64) -> Result<(), DispatchError> {
        info!("delete {} in {}", message_id, conv.file_stem());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    /* Get all the required resources */
    let args = Args::parse();
    ktmu_sched_bot::logging::init(&args.log_path)?;
    let config = config::load(&args)?;
    info!(
        "Read config.json from {}",
        std::path::absolute(&args.config_json_path)?.display()
    );

    let http_client = reqwest::Client::new();
    let base = Url::parse(&config.schedule_url)?;
    let client = Arc::new(ScheduleClient::new(http_client, base));

    /* Restore conversations and rebuild the subscription index */
    let store = Arc::new(CtxStore::new(&args.ctx_dir)?);
    let loaded = store.preload().await?;
    info!("Preloaded {loaded} conversation context(s)");

    let mut index = SubscriberIndex::default();
    for key in store.keys().await {
        let ctx = store.load_or_init(key).await;
        index.sync(&*ctx.lock().await);
    }
    info!("Rebuilt subscription index: {} identifier(s)", index.len());
    let index = Arc::new(Mutex::new(index));

    /* Warm the page snapshots before serving anyone */
    loop {
        match tokio::try_join!(client.weekly(), client.daily()) {
            Ok(_) => break,
            Err(err) => {
                warn!("initial fetch failed, retrying in {FETCH_RETRY:?}: {err}");
                tokio::time::sleep(FETCH_RETRY).await;
            }
        }
    }
    info!("Initial pages fetched");

    /* Wire everything up */
    let (notify_tx, notify_rx) = mpsc::channel(16);
    let (update_tx, mut update_rx) = mpsc::channel::<()>(4);
    let (event_tx, mut event_rx) = mpsc::channel::<CommonEverything>(64);

    let egress = Arc::new(LogEgress::new());
    let dispatcher = Arc::new(Dispatcher::new(
        handlers(),
        middlewares(),
        store.clone(),
        client.snapshots.clone(),
        index.clone(),
        egress.clone(),
        config.admins.clone(),
        update_tx,
    ));
    let broadcaster = Broadcaster::new(
        store.clone(),
        index,
        egress,
        Duration::from_secs(config.update_period_mins * 60),
    );

    let saver = {
        let store = store.clone();
        let period = Duration::from_secs(config.save_period_secs);
        tokio::spawn(async move { store.save_forever(period).await })
    };
    let stream = {
        let client = client.clone();
        tokio::spawn(async move { client.updates(notify_tx).await })
    };
    let updater = {
        let client = client.clone();
        tokio::spawn(async move {
            while update_rx.recv().await.is_some() {
                if let Err(err) = client.update().await {
                    error!("requested upstream update failed: {err}");
                }
            }
        })
    };
    let ingest = tokio::spawn(async move {
        while let Some(everything) = event_rx.recv().await {
            dispatcher.dispatch(everything).await;
        }
    });
    // Keep the intake side alive until shutdown; adapters clone it.
    let _event_tx = event_tx;

    tokio::select! {
        _ = broadcaster.run(notify_rx) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    /* Flush what is still in memory */
    saver.abort();
    stream.abort();
    updater.abort();
    ingest.abort();
    store.flush_dirty().await;
    Ok(())
}
