//! Kongossa chat client library.
//!
//! Conversation sync engine (polling, history paging, reconciliation of
//! speculative sends, day grouping) and the pieces the terminal front-end is
//! built from.

pub mod backend;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod format;
pub mod grouping;
pub mod logging;
pub mod message;
pub mod protocol;
pub mod reconcile;
pub mod state;
pub mod surface;
pub mod transport;
pub mod validation;

mod integration_tests;
