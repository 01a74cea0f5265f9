//! The narrow capability the core sees of a chat platform.

use crate::bot::ctx::ConvKey;
use crate::error::DispatchError;

/// Platform message length ceiling; longer texts are chunked.
pub const CHUNK_LIMIT: usize = 4000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub payload: String,
}

impl Button {
    pub fn new(text: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            payload: payload.into(),
        }
    }
}

/// A platform-neutral button grid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }
}

/// Send/edit/notify capability of one messenger platform. Rate limiting is
/// the implementor's concern.
#[allow(async_fn_in_trait)]
pub trait Egress {
    async fn send(
        &self,
        conv: ConvKey,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i64, DispatchError>;

    async fn edit(
        &self,
        conv: ConvKey,
        message_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), DispatchError>;

    /// A transient notification (a callback toast where the platform has
    /// one, a plain message otherwise).
    async fn notify(&self, conv: ConvKey, text: &str) -> Result<(), DispatchError>;

    async fn pin(&self, conv: ConvKey, message_id: i64) -> Result<(), DispatchError>;

    async fn delete(&self, conv: ConvKey, message_id: i64) -> Result<(), DispatchError>;
}

impl<T: Egress> Egress for std::sync::Arc<T> {
    async fn send(
        &self,
        conv: ConvKey,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i64, DispatchError> {
        (**self).send(conv, text, keyboard).await
    }

    async fn edit(
        &self,
        conv: ConvKey,
        message_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), DispatchError> {
        (**self).edit(conv, message_id, text, keyboard).await
    }

    async fn notify(&self, conv: ConvKey, text: &str) -> Result<(), DispatchError> {
        (**self).notify(conv, text).await
    }

    async fn pin(&self, conv: ConvKey, message_id: i64) -> Result<(), DispatchError> {
        (**self).pin(conv, message_id).await
    }

    async fn delete(&self, conv: ConvKey, message_id: i64) -> Result<(), DispatchError> {
        (**self).delete(conv, message_id).await
    }
}

/// Splits text into chunks of at most `limit` bytes, breaking on `\n\n`
/// when possible, then `\n`, then anywhere on a char boundary.
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > limit {
        let window = &rest[..floor_char_boundary(rest, limit)];
        let split_at = window
            .rfind("\n\n")
            .map(|i| i + 2)
            .or_else(|| window.rfind('\n').map(|i| i + 1))
            .unwrap_or(window.len());
        chunks.push(rest[..split_at].trim_end().to_string());
        rest = &rest[split_at..];
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("привет", CHUNK_LIMIT), ["привет"]);
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let text = format!("{}\n\n{}", "а".repeat(30), "б".repeat(30));
        let chunks = chunk_text(&text, 70);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "а".repeat(30));
        assert_eq!(chunks[1], "б".repeat(30));
    }

    #[test]
    fn falls_back_to_line_boundaries() {
        let text = format!("{}\n{}", "а".repeat(30), "б".repeat(30));
        let chunks = chunk_text(&text, 70);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "а".repeat(30));
    }

    #[test]
    fn hard_splits_on_char_boundary_when_no_newline() {
        let text = "я".repeat(100);
        let chunks = chunk_text(&text, 33);
        assert!(chunks.iter().all(|c| c.len() <= 33));
        assert_eq!(chunks.concat(), text);
    }
}
