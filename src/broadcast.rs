//! Fan-out of schedule changes to subscribed conversations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use log::{debug, info, warn};
use tokio::sync::{mpsc, Mutex};

use crate::bot::ctx::ConvKey;
use crate::bot::storage::CtxStore;
use crate::messenger::{chunk_text, Button, Egress, Keyboard, CHUNK_LIMIT};
use crate::models::compare::FormationTouch;
use crate::render;
use crate::schedule::Notify;
use crate::subscribers::SubscriberIndex;

/// Moscow time for user-facing timestamps.
fn msk(now: DateTime<Utc>) -> DateTime<FixedOffset> {
    now.with_timezone(&FixedOffset::east_opt(3 * 3600).expect("static offset"))
}

pub struct Broadcaster<E: Egress> {
    store: Arc<CtxStore>,
    index: Arc<Mutex<SubscriberIndex>>,
    egress: E,
    /// How often the upstream re-crawls, shown in the footer.
    update_period: Duration,
}

impl<E: Egress> Broadcaster<E> {
    pub fn new(
        store: Arc<CtxStore>,
        index: Arc<Mutex<SubscriberIndex>>,
        egress: E,
        update_period: Duration,
    ) -> Self {
        Self {
            store,
            index,
            egress,
            update_period,
        }
    }

    /// Consumes notifies until the sender side closes.
    pub async fn run(&self, mut rx: mpsc::Receiver<Notify>) {
        while let Some(notify) = rx.recv().await {
            self.broadcast(notify).await;
        }
    }

    /// Delivers one notify to every affected conversation. Deliveries run
    /// concurrently and fail independently.
    pub async fn broadcast(&self, notify: Notify) {
        let merged = {
            let index = self.index.lock().await;
            let daily = notify
                .daily
                .as_ref()
                .map(|cmp| index.affected_by(cmp))
                .unwrap_or_default();
            let weekly = notify
                .weekly
                .as_ref()
                .map(|cmp| index.affected_by(cmp))
                .unwrap_or_default();
            SubscriberIndex::merge_affected(daily, weekly)
        };

        if merged.is_empty() {
            debug!("broadcast: change affects no subscriber");
            return;
        }
        info!("broadcast: delivering to {} conversation(s)", merged.len());

        let now = Utc::now();
        let deliveries = merged
            .into_iter()
            .map(|(key, touches)| self.deliver(key, touches, now));
        futures::future::join_all(deliveries).await;
    }

    async fn deliver(&self, key: ConvKey, touches: Vec<FormationTouch>, now: DateTime<Utc>) {
        let rendered = render::cmp::touches(&touches);
        let footer = format!(
            "Обновлено {} (UTC+3), источники перечитываются раз в ~{} мин",
            msk(now).format("%H:%M %d.%m.%Y"),
            self.update_period.as_secs() / 60
        );
        let text = format!("📣 Расписание изменилось\n\n{}\n\n{}", rendered.text, footer);

        let keyboard = rendered.has_detailed.then(|| {
            Keyboard::default().row(vec![Button::new(
                "К расписанию",
                crate::bot::handlers::payload::RESEND,
            )])
        });

        let chunks = chunk_text(&text, CHUNK_LIMIT);
        let last_index = chunks.len() - 1;
        let mut last_id = None;
        for (i, chunk) in chunks.iter().enumerate() {
            let kb = if i == last_index { keyboard.as_ref() } else { None };
            match self.egress.send(key, chunk, kb).await {
                Ok(id) => last_id = Some(id),
                Err(err) => {
                    warn!("broadcast to {} failed: {err}", key.file_stem());
                    return;
                }
            }
        }

        let ctx_arc = self.store.load_or_init(key).await;
        let should_pin = {
            let mut ctx = ctx_arc.lock().await;
            ctx.schedule.last_update = Some(now);
            ctx.settings.should_pin
        };
        self.store.mark_dirty(key).await;

        if should_pin {
            if let Some(id) = last_id {
                if let Err(err) = self.egress.pin(key, id).await {
                    debug!("pin in {} failed: {err}", key.file_stem());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::ctx::{Mode, Platform};
    use crate::error::DispatchError;
    use crate::models::compare::compare_pages;
    use crate::models::page::{Formation, Page, PageKind, Range};
    use crate::schedule::api::Invoker;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingEgress {
        sent: AtomicUsize,
    }

    impl Egress for CountingEgress {
        async fn send(
            &self,
            _conv: ConvKey,
            _text: &str,
            _keyboard: Option<&Keyboard>,
        ) -> Result<i64, DispatchError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }

        async fn edit(
            &self,
            _conv: ConvKey,
            _message_id: i64,
            _text: &str,
            _keyboard: Option<&Keyboard>,
        ) -> Result<(), DispatchError> {
            Ok(())
        }

        async fn notify(&self, _conv: ConvKey, _text: &str) -> Result<(), DispatchError> {
            Ok(())
        }

        async fn pin(&self, _conv: ConvKey, _message_id: i64) -> Result<(), DispatchError> {
            Ok(())
        }

        async fn delete(&self, _conv: ConvKey, _message_id: i64) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    fn page(names: &[&str]) -> Page {
        Page {
            raw: String::new(),
            raw_types: BTreeSet::new(),
            kind: PageKind::Weekly,
            date: Range::new(
                NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 9, 9).unwrap(),
            ),
            formations: names
                .iter()
                .map(|name| Formation {
                    raw: String::new(),
                    name: name.to_string(),
                    days: Vec::new(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn empty_compare_delivers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CtxStore::new(dir.path()).unwrap());
        let index = Arc::new(Mutex::new(SubscriberIndex::default()));
        index.lock().await.subscribe(
            ConvKey::new(Platform::Telegram, 1),
            "1-КДД-69",
            Mode::Group,
        );
        let egress = Arc::new(CountingEgress::default());
        let bc = Broadcaster::new(
            store,
            index,
            egress.clone(),
            Duration::from_secs(600),
        );

        let same = page(&["1-КДД-69"]);
        bc.broadcast(Notify {
            invoker: Invoker::auto(),
            daily: None,
            weekly: Some(compare_pages(&same, &same)),
        })
        .await;
        assert_eq!(egress.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn affected_subscriber_gets_one_message() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CtxStore::new(dir.path()).unwrap());
        let index = Arc::new(Mutex::new(SubscriberIndex::default()));
        let key = ConvKey::new(Platform::Telegram, 1);
        index.lock().await.subscribe(key, "1-КДД-69", Mode::Group);
        let egress = Arc::new(CountingEgress::default());
        let bc = Broadcaster::new(
            store.clone(),
            index,
            egress.clone(),
            Duration::from_secs(600),
        );

        let cmp = compare_pages(&page(&["1-КДД-69"]), &page(&[]));
        bc.broadcast(Notify {
            invoker: Invoker::auto(),
            daily: Some(cmp.clone()),
            weekly: Some(cmp),
        })
        .await;
        // Daily and weekly duplicates merge into one delivery.
        assert_eq!(egress.sent.load(Ordering::SeqCst), 1);

        let ctx = store.load_or_init(key).await;
        assert!(ctx.lock().await.schedule.last_update.is_some());
    }
}
