//! Non-blocking shell job engine.
//!
//! A caller submits a command and immediately gets a job id back, then polls
//! for output by line offset, watches for stalls and kills jobs it no longer
//! wants. Finished jobs are reaped after a retention window.

pub mod config;
pub mod consts;
pub mod engine;
pub mod error;
pub mod events;
pub mod guard;
pub mod job;
pub mod logging;
pub mod poll;
pub mod reaper;
pub mod registry;
pub mod runner;
pub mod shell;
pub mod terminate;
pub mod tools;
