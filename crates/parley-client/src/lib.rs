//! # parley-client
//!
//! Client core for the Parley messaging service: session lifecycle, chat
//! directory and message polling, the message codec on the way out, and a
//! [`Client`] facade that a view layer drives through [`Intent`]s and
//! observes through [`ClientEvent`]s.

pub mod api;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod grouping;
pub mod http;
pub mod messages;
pub mod outbound;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use tracing_subscriber::{fmt, EnvFilter};

pub use client::{Client, Intent};
pub use config::ClientConfig;
pub use error::{ClientError, TransportError};
pub use events::{ClientEvent, Severity};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("parley_client=debug,parley_store=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
