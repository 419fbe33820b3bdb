//! Core domain types and simulation logic.

pub mod bar;
pub mod session;
pub mod range;
pub mod confluence;
pub mod entry;
pub mod position;
pub mod trade;
pub mod strategy;
pub mod config_validation;
pub mod backtest;
pub mod metrics;
pub mod error;
