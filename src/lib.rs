//! classpoll library
//!
//! Live classroom polling: one teacher opens a multiple-choice question,
//! connected students answer once each, and everyone sees results in real
//! time. The poll closes when every student has answered or after a fixed
//! timeout, whichever comes first.

pub mod cli;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod polls;
pub mod server;
pub mod session;
