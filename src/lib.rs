//! RPCM outlet tester.
//!
//! Drives power and recognition cycles against RPCM devices over their HTTPS
//! API, records every outcome as a JSON event line, and folds those event logs
//! back into per-target and per-error reports.

pub mod analyzer;
pub mod config;
pub mod device;
pub mod events;
pub mod outlet;
pub mod runner;
pub mod scheduler;
