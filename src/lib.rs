//! rtc-session: headless client for OpenAI Realtime sessions.
//!
//! A local backend hands out short-lived session tokens; the client then
//! negotiates a peer connection with the realtime endpoint, opens the
//! `oai-events` data channel, and turns the inbound JSON event stream into
//! finished utterances, chat-log entries and UI effects.
//!
//! Browser capabilities (microphone, peer connection) sit behind the
//! [`realtime::transport`] traits, so the whole session state machine runs
//! without a browser.
//!
//! [`kalman`] holds the scalar Kalman filter simulation served alongside the
//! session apps.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use rtc_session::prelude::*;
//! use rtc_session::realtime::transport::memory::{MemoryMedia, MemoryPeerConnector};
//!
//! # async fn example() -> rtc_session::error::Result<()> {
//! let config = ClientConfig::from_env()?;
//! let (connector, _handle) = MemoryPeerConnector::new();
//! let mut controller =
//!     SessionController::new(config, Arc::new(MemoryMedia::available()), Arc::new(connector))?;
//! controller.connect().await?;
//! while controller.step().await {
//!     for effect in controller.drain_effects() {
//!         println!("{effect:?}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod kalman;
pub mod prelude;
pub mod realtime;
pub mod util;
