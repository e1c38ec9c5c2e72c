//! Error taxonomy for the index server.
//!
//! Protocol and semantic outcomes are not errors — they are `ERROR`/`FAIL`
//! response lines, see [`crate::protocol`] and [`crate::store`]. The types
//! here cover the failures that never reach a client: bind failures and
//! other listener-level faults.

use std::io;
use thiserror::Error;

/// Failures from the Listener/Acceptor that abort the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("accept loop failed: {0}")]
    Accept(#[source] io::Error),
}
