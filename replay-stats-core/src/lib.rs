#![doc = "replay-stats-core: core pipeline library for replay-stats."]

//! This crate contains the whole collector: configuration types, the replay service seam
//! and its `reqwest` client, stat extraction, and writing of the run output.
//! The `replay-stats` binary only loads configuration and calls [`collect::collect`].
//!
//! # Usage
//! Build a [`config::CollectConfig`], construct a [`client::BallchasingClient`] (or any
//! other [`contract::ReplayApi`]), and pass both to [`collect::collect`].

pub mod client;
pub mod collect;
pub mod config;
pub mod contract;
pub mod error;
pub mod output;
pub mod retry;
pub mod stats;
pub mod summary;

pub use collect::{collect, CollectReport};
pub use config::CollectConfig;
pub use error::{ApiError, CollectError};
