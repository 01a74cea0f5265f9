//! Wire shapes of the upstream schedule service.

use serde::{Deserialize, Serialize};

use crate::models::page::Page;
use crate::models::PageCompare;

#[derive(Deserialize, Debug)]
pub struct PageResponse {
    pub is_ok: bool,
    pub data: Option<PageData>,
}

#[derive(Deserialize, Debug)]
pub struct PageData {
    pub page: Page,
}

#[derive(Deserialize, Debug)]
pub struct InteractResponse {
    pub data: InteractData,
}

#[derive(Deserialize, Debug)]
pub struct InteractData {
    pub interactor: Interactor,
}

#[derive(Deserialize, Debug)]
pub struct Interactor {
    pub key: String,
}

#[derive(Deserialize, Debug)]
pub struct IsValidResponse {
    pub is_ok: bool,
}

/// Who caused a re-crawl: the server's own timer, or somebody holding an
/// interactor key. The wire form is either the string `"auto"` or an object
/// `{"manually": {"key": ...}}`.
#[derive(Deserialize, Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Invoker {
    Auto(String),
    Manually { manually: ManualInvoker },
}

#[derive(Deserialize, Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ManualInvoker {
    pub key: String,
}

impl Invoker {
    pub fn auto() -> Self {
        Invoker::Auto("auto".to_string())
    }
}

/// A server push: which pages changed since the last crawl. The same shape
/// is republished locally with compares computed against our own snapshots.
#[derive(Deserialize, Debug, Serialize, Clone, PartialEq)]
pub struct Notify {
    pub invoker: Invoker,
    pub daily: Option<PageCompare>,
    pub weekly: Option<PageCompare>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoker_parses_both_wire_forms() {
        let auto: Invoker = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(auto, Invoker::auto());

        let manual: Invoker =
            serde_json::from_str(r#"{"manually": {"key": "deadbeef"}}"#).unwrap();
        assert_eq!(
            manual,
            Invoker::Manually {
                manually: ManualInvoker {
                    key: "deadbeef".to_string()
                }
            }
        );
    }

    #[test]
    fn notify_with_absent_pages_parses() {
        let notify: Notify = serde_json::from_str(r#"{"invoker": "auto"}"#).unwrap();
        assert!(notify.daily.is_none());
        assert!(notify.weekly.is_none());
    }
}
