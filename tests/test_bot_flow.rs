use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use ktmu_sched_bot::bot::ctx::{ConvKey, Mode, Platform};
use ktmu_sched_bot::bot::dispatch::{
    CommonEvent, CommonEverything, CommonMessage, Dispatcher,
};
use ktmu_sched_bot::bot::handlers::{handlers, middlewares, payload};
use ktmu_sched_bot::bot::navigator::State;
use ktmu_sched_bot::bot::storage::CtxStore;
use ktmu_sched_bot::error::DispatchError;
use ktmu_sched_bot::messenger::{Egress, Keyboard};
use ktmu_sched_bot::schedule::Snapshots;
use ktmu_sched_bot::subscribers::SubscriberIndex;
use ktmu_sched_bot::zoom::ZoomEntry;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Delivered {
    Send { id: i64, text: String },
    Edit { id: i64, text: String },
    Notify { text: String },
    Pin { id: i64 },
    Delete { id: i64 },
}

/// Captures everything the bot tries to deliver, in order.
#[derive(Default)]
pub struct RecordingEgress {
    next_id: AtomicI64,
    pub log: StdMutex<Vec<Delivered>>,
}

impl Egress for RecordingEgress {
    async fn send(
        &self,
        _conv: ConvKey,
        text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<i64, DispatchError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.lock().unwrap().push(Delivered::Send {
            id,
            text: text.to_string(),
        });
        Ok(id)
    }

    async fn edit(
        &self,
        _conv: ConvKey,
        message_id: i64,
        text: &str,
        _keyboard: Option<&Keyboard>,
    ) -> Result<(), DispatchError> {
        self.log.lock().unwrap().push(Delivered::Edit {
            id: message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn notify(&self, _conv: ConvKey, text: &str) -> Result<(), DispatchError> {
        self.log.lock().unwrap().push(Delivered::Notify {
            text: text.to_string(),
        });
        Ok(())
    }

    async fn pin(&self, _conv: ConvKey, message_id: i64) -> Result<(), DispatchError> {
        self.log.lock().unwrap().push(Delivered::Pin { id: message_id });
        Ok(())
    }

    async fn delete(&self, _conv: ConvKey, message_id: i64) -> Result<(), DispatchError> {
        self.log.lock().unwrap().push(Delivered::Delete { id: message_id });
        Ok(())
    }
}

impl RecordingEgress {
    fn taken(&self) -> Vec<Delivered> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }

    fn last_sent_id(&self) -> i64 {
        self.log
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|d| match d {
                Delivered::Send { id, .. } => Some(*id),
                _ => None,
            })
            .expect("nothing was sent")
    }
}

struct Harness {
    dispatcher: Dispatcher<Arc<RecordingEgress>>,
    egress: Arc<RecordingEgress>,
    store: Arc<CtxStore>,
    index: Arc<Mutex<SubscriberIndex>>,
    update_rx: mpsc::Receiver<()>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CtxStore::new(dir.path()).unwrap());
    let index = Arc::new(Mutex::new(SubscriberIndex::default()));
    let egress = Arc::new(RecordingEgress::default());
    let (update_tx, update_rx) = mpsc::channel(4);
    let dispatcher = Dispatcher::new(
        handlers(),
        middlewares(),
        store.clone(),
        Arc::new(Snapshots::default()),
        index.clone(),
        egress.clone(),
        vec![ADMIN_ID],
        update_tx,
    );
    Harness {
        dispatcher,
        egress,
        store,
        index,
        update_rx,
        _dir: dir,
    }
}

const ADMIN_ID: i64 = 100500;

fn key() -> ConvKey {
    ConvKey::new(Platform::Telegram, 1)
}

fn message_from(key: ConvKey, text: &str) -> CommonEverything {
    CommonEverything::Message(CommonMessage {
        key,
        sender_id: key.peer_id,
        text: text.to_string(),
    })
}

fn message(text: &str) -> CommonEverything {
    message_from(key(), text)
}

fn event(payload: &str, message_id: i64) -> CommonEverything {
    CommonEverything::Event(CommonEvent {
        key: key(),
        sender_id: key().peer_id,
        payload: payload.to_string(),
        message_id,
    })
}

/// Pushes one conversation from the first message all the way to the hub.
async fn onboard(h: &Harness) -> i64 {
    h.dispatcher.dispatch(message("старт")).await;
    let screen_id = h.egress.last_sent_id();
    h.dispatcher.dispatch(event(payload::BEGIN, screen_id)).await;
    h.dispatcher.dispatch(event(payload::MODE_GROUP, screen_id)).await;
    h.dispatcher.dispatch(message("1-КДД-69")).await;
    let screen_id = h.egress.last_sent_id();
    h.dispatcher.dispatch(event(payload::YES, screen_id)).await;
    h.dispatcher.dispatch(event(payload::FINISH, screen_id)).await;
    h.egress.last_sent_id()
}

#[tokio::test]
async fn onboarding_reaches_the_hub() {
    let h = harness();
    onboard(&h).await;

    let ctx_arc = h.store.load_or_init(key()).await;
    let ctx = ctx_arc.lock().await;
    assert_eq!(ctx.mode, Some(Mode::Group));
    assert_eq!(ctx.identifier.as_deref(), Some("1-КДД-69"));
    assert_eq!(ctx.navigator.current(), State::HubMain);
    assert!(ctx.is_subscribed());
    // Private chat: pin question was skipped entirely.
    assert!(ctx.navigator.is_ignored(State::InitShouldPin));
    drop(ctx);

    assert!(h
        .index
        .lock()
        .await
        .subscribers_for("1-КДД-69", Mode::Group)
        .contains(&key()));
}

#[tokio::test]
async fn back_at_the_hub_root_re_renders_in_place() {
    let h = harness();
    let screen_id = onboard(&h).await;
    h.egress.taken();

    h.dispatcher.dispatch(event(payload::BACK, screen_id)).await;

    let log = h.egress.taken();
    assert_eq!(log.len(), 1);
    assert!(matches!(&log[0], Delivered::Edit { id, .. } if *id == screen_id));

    let ctx_arc = h.store.load_or_init(key()).await;
    assert_eq!(ctx_arc.lock().await.navigator.current(), State::HubMain);
}

#[tokio::test]
async fn stale_button_gets_a_toast_and_a_fresh_screen() {
    let h = harness();
    let screen_id = onboard(&h).await;
    h.egress.taken();

    h.dispatcher.dispatch(event(payload::BACK, screen_id + 1000)).await;

    let log = h.egress.taken();
    assert!(matches!(&log[0], Delivered::Notify { .. }));
    assert!(matches!(&log[1], Delivered::Send { .. }));
}

#[tokio::test]
async fn fresh_screen_after_a_stale_press_is_tracked() {
    let h = harness();
    let screen_id = onboard(&h).await;
    h.egress.taken();

    h.dispatcher.dispatch(event(payload::BACK, screen_id + 1000)).await;
    let fresh_id = h.egress.last_sent_id();
    h.egress.taken();

    // Buttons on the fresh copy must edit it in place, not toast again.
    h.dispatcher.dispatch(event(payload::SETTINGS, fresh_id)).await;

    let log = h.egress.taken();
    assert!(matches!(&log[0], Delivered::Edit { id, .. } if *id == fresh_id));
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn reset_wipes_the_conversation_and_its_subscription() {
    let h = harness();
    let screen_id = onboard(&h).await;

    h.dispatcher.dispatch(event(payload::SETTINGS, screen_id)).await;
    h.dispatcher.dispatch(event(payload::RESET, screen_id)).await;
    h.egress.taken();
    h.dispatcher.dispatch(event(payload::YES, screen_id)).await;

    let log = h.egress.taken();
    assert!(matches!(&log[0], Delivered::Send { text, .. } if text.contains("сброшен")));
    assert!(h.index.lock().await.is_empty());
    assert!(!h.store.keys().await.contains(&key()));
}

#[tokio::test]
async fn failed_zoom_removal_keeps_the_selection() {
    let h = harness();
    let screen_id = onboard(&h).await;
    {
        let ctx_arc = h.store.load_or_init(key()).await;
        let mut ctx = ctx_arc.lock().await;
        ctx.settings.zoom.add(ZoomEntry::named("Иванов И.И.")).unwrap();
        // A selection that no longer matches any entry.
        ctx.zoom_selected = Some("Петров П.П.".to_string());
        ctx.navigator.append(State::ZoomConfirmRemove);
    }
    h.egress.taken();

    h.dispatcher.dispatch(event(payload::YES, screen_id)).await;

    let log = h.egress.taken();
    assert!(matches!(&log[0], Delivered::Notify { .. }));
    let ctx_arc = h.store.load_or_init(key()).await;
    let ctx = ctx_arc.lock().await;
    assert_eq!(ctx.zoom_selected.as_deref(), Some("Петров П.П."));
    assert_eq!(ctx.settings.zoom.len(), 1);
}

#[tokio::test]
async fn admin_command_opens_the_panel_and_requests_an_update() {
    let mut h = harness();
    let admin_key = ConvKey::new(Platform::Telegram, ADMIN_ID);

    h.dispatcher.dispatch(message_from(admin_key, "/admin")).await;
    let panel_id = h.egress.last_sent_id();

    let ctx_arc = h.store.load_or_init(admin_key).await;
    assert_eq!(ctx_arc.lock().await.navigator.current(), State::AdminMain);

    h.dispatcher
        .dispatch(CommonEverything::Event(CommonEvent {
            key: admin_key,
            sender_id: ADMIN_ID,
            payload: payload::ADMIN_UPDATE.to_string(),
            message_id: panel_id,
        }))
        .await;

    assert!(h.update_rx.try_recv().is_ok());
}

#[tokio::test]
async fn admin_command_is_ignored_for_everyone_else() {
    let h = harness();
    onboard(&h).await;
    h.egress.taken();

    // sender 1 is not in the admin list.
    h.dispatcher.dispatch(message("/admin")).await;

    let ctx_arc = h.store.load_or_init(key()).await;
    assert_ne!(ctx_arc.lock().await.navigator.current(), State::AdminMain);
}
