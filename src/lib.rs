// Pedantic: suppress noise for internal crate code.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

pub mod actions;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod github;
pub mod present;
pub mod store;
pub mod types;
pub mod util;
