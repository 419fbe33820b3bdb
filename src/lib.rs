//! rangetrader: intraday opening-range breakout and pullback simulator.
//!
//! Hexagonal architecture: the deterministic simulation core lives in
//! [`domain`], port traits in [`ports`], file-backed implementations in
//! [`adapters`], and the command line in [`cli`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
