//! Normalized event routing.
//!
//! Platform adapters normalize their updates into [`CommonEverything`] and
//! feed them here. Dispatch runs the pre-middleware chain, picks handlers by
//! filters in registration order, applies the answers through the egress and
//! runs post-middlewares. Middleware control flow is an explicit [`Flow`]
//! value, not an exception.

use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::{mpsc, Mutex};

use super::ctx::{ConvKey, Ctx};
use super::navigator::State;
use super::storage::CtxStore;
use crate::error::DispatchError;
use crate::messenger::{chunk_text, Egress, Keyboard, CHUNK_LIMIT};
use crate::models::page::Page;
use crate::schedule::Snapshots;
use crate::subscribers::SubscriberIndex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonMessage {
    pub key: ConvKey,
    pub sender_id: i64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonEvent {
    pub key: ConvKey,
    pub sender_id: i64,
    pub payload: String,
    pub message_id: i64,
}

/// A normalized incoming update: either a typed message or a button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonEverything {
    Message(CommonMessage),
    Event(CommonEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Message,
    Event,
}

impl CommonEverything {
    pub fn key(&self) -> ConvKey {
        match self {
            CommonEverything::Message(m) => m.key,
            CommonEverything::Event(e) => e.key,
        }
    }

    pub fn sender_id(&self) -> i64 {
        match self {
            CommonEverything::Message(m) => m.sender_id,
            CommonEverything::Event(e) => e.sender_id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            CommonEverything::Message(_) => EventKind::Message,
            CommonEverything::Event(_) => EventKind::Event,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            CommonEverything::Message(m) => Some(&m.text),
            CommonEverything::Event(_) => None,
        }
    }

    pub fn payload(&self) -> Option<&str> {
        match self {
            CommonEverything::Message(_) => None,
            CommonEverything::Event(e) => Some(&e.payload),
        }
    }
}

/// Middleware verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Abort the whole dispatch, post hooks included.
    StopAll,
    /// Skip handler selection but still run post hooks.
    SkipHandlers,
}

/// Handler selection predicate. All of a handler's filters must hold.
#[derive(Debug, Clone)]
pub enum Filter {
    MessageOnly,
    EventOnly,
    State(State),
    Payload(&'static str),
    /// Message text equals a command verbatim.
    Command(&'static str),
    Union(Vec<Filter>),
}

impl Filter {
    pub fn matches(&self, everything: &CommonEverything, current: State) -> bool {
        match self {
            Filter::MessageOnly => everything.kind() == EventKind::Message,
            Filter::EventOnly => everything.kind() == EventKind::Event,
            Filter::State(state) => current == *state,
            Filter::Payload(payload) => everything.payload() == Some(payload),
            Filter::Command(command) => everything.text().map(str::trim) == Some(command),
            Filter::Union(children) => children
                .iter()
                .any(|child| child.matches(everything, current)),
        }
    }
}

/// Everything a handler may see and mutate.
pub struct Request<'a> {
    pub everything: &'a CommonEverything,
    pub ctx: &'a mut Ctx,
    pub daily: Option<&'a Page>,
    pub weekly: Option<&'a Page>,
    pub admins: &'a [i64],
    /// Subscription count at dispatch time, for the admin overview.
    pub subscriber_count: usize,
    /// Set by a handler to ask for an upstream re-crawl after dispatch.
    pub wants_update: bool,
}

impl Request<'_> {
    pub fn is_admin(&self) -> bool {
        self.admins.contains(&self.everything.sender_id())
    }
}

/// One outward effect requested by a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send {
        text: String,
        keyboard: Option<Keyboard>,
        /// Remember the resulting message id as the schedule message and
        /// pin it if the conversation wants pins.
        track: bool,
    },
    Edit {
        message_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Notify {
        text: String,
    },
    Delete {
        message_id: i64,
    },
}

/// What a handler wants done, plus dispatch directives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Answer {
    pub actions: Vec<Action>,
    pub avoid_post: bool,
    /// Destroy this conversation's Ctx after the actions are applied.
    pub reset_ctx: bool,
}

impl Answer {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn send(text: impl Into<String>, keyboard: Option<Keyboard>) -> Self {
        Self::default().then_send(text, keyboard)
    }

    pub fn then_send(mut self, text: impl Into<String>, keyboard: Option<Keyboard>) -> Self {
        self.actions.push(Action::Send {
            text: text.into(),
            keyboard,
            track: false,
        });
        self
    }

    pub fn send_tracked(text: impl Into<String>, keyboard: Option<Keyboard>) -> Self {
        Self::default().then_send_tracked(text, keyboard)
    }

    pub fn then_send_tracked(mut self, text: impl Into<String>, keyboard: Option<Keyboard>) -> Self {
        self.actions.push(Action::Send {
            text: text.into(),
            keyboard,
            track: true,
        });
        self
    }

    pub fn edit(message_id: i64, text: impl Into<String>, keyboard: Option<Keyboard>) -> Self {
        Self {
            actions: vec![Action::Edit {
                message_id,
                text: text.into(),
                keyboard,
            }],
            ..Self::default()
        }
    }

    pub fn then_notify(mut self, text: impl Into<String>) -> Self {
        self.actions.push(Action::Notify { text: text.into() });
        self
    }

    pub fn notify(text: impl Into<String>) -> Self {
        Self::default().then_notify(text)
    }
}

pub type HandlerFn = fn(&mut Request<'_>) -> Result<Answer, DispatchError>;

pub struct Handler {
    pub name: &'static str,
    pub filters: Vec<Filter>,
    pub is_blocking: bool,
    pub func: HandlerFn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareKind {
    Always,
    MessageOnly,
    EventOnly,
}

impl MiddlewareKind {
    fn applies(&self, kind: EventKind) -> bool {
        match self {
            MiddlewareKind::Always => true,
            MiddlewareKind::MessageOnly => kind == EventKind::Message,
            MiddlewareKind::EventOnly => kind == EventKind::Event,
        }
    }
}

pub type PreFn = fn(&mut Request<'_>) -> Flow;
pub type PostFn = fn(&mut Request<'_>);

pub struct Middleware {
    pub name: &'static str,
    pub kind: MiddlewareKind,
    pub pre: Option<PreFn>,
    pub post: Option<PostFn>,
}

pub struct Dispatcher<E: Egress> {
    handlers: Vec<Handler>,
    middlewares: Vec<Middleware>,
    store: Arc<CtxStore>,
    snapshots: Arc<Snapshots>,
    index: Arc<Mutex<SubscriberIndex>>,
    egress: E,
    admins: Vec<i64>,
    update_requests: mpsc::Sender<()>,
}

impl<E: Egress> Dispatcher<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        handlers: Vec<Handler>,
        middlewares: Vec<Middleware>,
        store: Arc<CtxStore>,
        snapshots: Arc<Snapshots>,
        index: Arc<Mutex<SubscriberIndex>>,
        egress: E,
        admins: Vec<i64>,
        update_requests: mpsc::Sender<()>,
    ) -> Self {
        Self {
            handlers,
            middlewares,
            store,
            snapshots,
            index,
            egress,
            admins,
            update_requests,
        }
    }

    /// Services one incoming event. Errors are fatal for the event only:
    /// they get logged with the failing handler's name and forwarded to the
    /// admins best-effort.
    pub async fn dispatch(&self, everything: CommonEverything) {
        let key = everything.key();
        if let Err((origin, err)) = self.dispatch_inner(everything).await {
            error!("{origin}: {err}");
            let text = format!("⚠ {origin}: {err}");
            for admin in &self.admins {
                let admin_key = ConvKey::new(key.platform, *admin);
                if let Err(err) = self.egress.notify(admin_key, &text).await {
                    warn!("failed to notify admin {admin}: {err}");
                }
            }
        }
    }

    async fn dispatch_inner(
        &self,
        everything: CommonEverything,
    ) -> Result<(), (&'static str, DispatchError)> {
        let key = everything.key();
        let ctx_arc = self.store.load_or_init(key).await;
        // Per-conversation ordering: the lock is held for the whole event.
        let mut ctx = ctx_arc.lock().await;

        let daily = self.snapshots.daily().await;
        let weekly = self.snapshots.weekly().await;
        let subscriber_count = self.index.lock().await.len();

        let mut request = Request {
            everything: &everything,
            ctx: &mut ctx,
            daily: daily.as_ref(),
            weekly: weekly.as_ref(),
            admins: &self.admins,
            subscriber_count,
            wants_update: false,
        };

        let mut skip_handlers = false;
        for middleware in &self.middlewares {
            if !middleware.kind.applies(everything.kind()) {
                continue;
            }
            if let Some(pre) = middleware.pre {
                match pre(&mut request) {
                    Flow::Continue => {}
                    Flow::SkipHandlers => {
                        debug!("{} skipped handler selection", middleware.name);
                        skip_handlers = true;
                        break;
                    }
                    Flow::StopAll => {
                        debug!("{} stopped dispatch", middleware.name);
                        return Ok(());
                    }
                }
            }
        }

        let mut answers: Vec<Answer> = Vec::new();
        let mut failed: Option<(&'static str, DispatchError)> = None;
        if !skip_handlers {
            for handler in &self.handlers {
                let current = request.ctx.navigator.current();
                let selected = handler
                    .filters
                    .iter()
                    .all(|filter| filter.matches(&everything, current));
                if !selected {
                    continue;
                }
                match (handler.func)(&mut request) {
                    Ok(answer) => {
                        let blocking = handler.is_blocking;
                        answers.push(answer);
                        if blocking {
                            break;
                        }
                    }
                    Err(err) => {
                        failed = Some((handler.name, err));
                        break;
                    }
                }
            }
        }

        let avoid_post = answers.iter().any(|a| a.avoid_post);
        if !avoid_post {
            for middleware in &self.middlewares {
                if !middleware.kind.applies(everything.kind()) {
                    continue;
                }
                if let Some(post) = middleware.post {
                    post(&mut request);
                }
            }
        }
        let wants_update = request.wants_update;

        // A frontend error is an answer, not a failure.
        if let Some((origin, err)) = failed {
            match err.frontend_text() {
                Some(text) => answers.push(Answer::notify(text.to_string())),
                None => {
                    self.apply_answers(key, &mut ctx, &answers).await;
                    return Err((origin, err));
                }
            }
        }

        let reset = answers.iter().any(|a| a.reset_ctx);
        self.apply_answers(key, &mut ctx, &answers).await;

        self.index.lock().await.sync(&ctx);
        drop(ctx);

        if reset {
            self.index.lock().await.unsubscribe(key);
            if let Err(err) = self.store.delete(key).await {
                return Err(("reset", DispatchError::Storage(err)));
            }
        } else {
            self.store.mark_dirty(key).await;
        }

        if wants_update {
            let _ = self.update_requests.send(()).await;
        }
        Ok(())
    }

    async fn apply_answers(&self, key: ConvKey, ctx: &mut Ctx, answers: &[Answer]) {
        for answer in answers {
            for action in &answer.actions {
                if let Err(err) = self.apply_action(key, ctx, action).await {
                    warn!("delivery to {} failed: {err}", key.file_stem());
                }
            }
        }
    }

    async fn apply_action(
        &self,
        key: ConvKey,
        ctx: &mut Ctx,
        action: &Action,
    ) -> Result<(), DispatchError> {
        match action {
            Action::Send {
                text,
                keyboard,
                track,
            } => {
                let chunks = chunk_text(text, CHUNK_LIMIT);
                let mut last_id = None;
                let last_index = chunks.len() - 1;
                for (i, chunk) in chunks.iter().enumerate() {
                    // Only the final chunk carries the keyboard.
                    let kb = if i == last_index { keyboard.as_ref() } else { None };
                    last_id = Some(self.egress.send(key, chunk, kb).await?);
                }
                if *track {
                    ctx.schedule.message.id = last_id;
                    if ctx.settings.should_pin {
                        if let Some(id) = last_id {
                            if let Err(err) = self.egress.pin(key, id).await {
                                debug!("pin for {} failed: {err}", key.file_stem());
                            }
                        }
                    }
                }
            }
            Action::Edit {
                message_id,
                text,
                keyboard,
            } => {
                self.egress
                    .edit(key, *message_id, text, keyboard.as_ref())
                    .await?;
            }
            Action::Notify { text } => {
                self.egress.notify(key, text).await?;
            }
            Action::Delete { message_id } => {
                self.egress.delete(key, *message_id).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::ctx::Platform;

    fn message(text: &str) -> CommonEverything {
        CommonEverything::Message(CommonMessage {
            key: ConvKey::new(Platform::Telegram, 1),
            sender_id: 1,
            text: text.to_string(),
        })
    }

    fn event(payload: &str) -> CommonEverything {
        CommonEverything::Event(CommonEvent {
            key: ConvKey::new(Platform::Telegram, 1),
            sender_id: 1,
            payload: payload.to_string(),
            message_id: 10,
        })
    }

    #[test]
    fn kind_filters_split_messages_and_events() {
        assert!(Filter::MessageOnly.matches(&message("hi"), State::HubMain));
        assert!(!Filter::MessageOnly.matches(&event("hub"), State::HubMain));
        assert!(Filter::EventOnly.matches(&event("hub"), State::HubMain));
    }

    #[test]
    fn state_and_payload_filters() {
        assert!(Filter::State(State::HubMain).matches(&message("hi"), State::HubMain));
        assert!(!Filter::State(State::HubMain).matches(&message("hi"), State::InitMain));
        assert!(Filter::Payload("hub").matches(&event("hub"), State::HubMain));
        assert!(!Filter::Payload("hub").matches(&event("settings"), State::HubMain));
        assert!(!Filter::Payload("hub").matches(&message("hub"), State::HubMain));
    }

    #[test]
    fn union_filter_matches_any_child() {
        let filter = Filter::Union(vec![
            Filter::Payload("daily"),
            Filter::Payload("weekly"),
        ]);
        assert!(filter.matches(&event("weekly"), State::HubMain));
        assert!(!filter.matches(&event("hub"), State::HubMain));
    }
}
