//! Port traits decoupling the domain from configuration, data and reports.

pub mod config_port;
pub mod data_port;
pub mod report_port;
