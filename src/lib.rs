//! Core of a cross-messenger schedule bot: an upstream schedule client with
//! a long-lived update stream, structural page diffing, per-conversation
//! state with a navigable space forest, text rendering and change
//! broadcasts. Platform wire adapters plug in through the
//! [`messenger::Egress`] seam.

pub mod bot;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod logging;
pub mod messenger;
pub mod models;
pub mod render;
pub mod schedule;
pub mod subscribers;
pub mod zoom;
