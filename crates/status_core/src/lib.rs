//! Status widget core for the messaging bridge: fetches the bridge's
//! connection status, derives a [`RenderState`] and hands it to a
//! [`RenderTarget`].

pub mod api;
pub mod controller;
pub mod error;
pub mod render;
pub mod state;

pub use api::{BridgeApi, HttpBridgeApi};
pub use controller::{
    ActionKind, ActionOutcome, StatusController, DEFAULT_POLL_INTERVAL, DEFAULT_SIMULATED_PHONE,
};
pub use error::StatusError;
pub use render::{render_html, render_text, Notifier, RenderTarget, RenderedView};
pub use state::{Controls, RenderState};
