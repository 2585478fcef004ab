#![allow(clippy::result_large_err)]

pub mod app;
pub mod config;
pub mod dependency;
pub mod domain;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod readiness;
pub mod reconcile;
pub mod retry;
pub mod surface;
pub mod synthesis;
pub mod telemetry;
