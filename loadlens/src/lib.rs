//! `loadlens` - page-load phase measurement and what-if simulation
//!
//! Drives a browser against a URL, aggregates the per-phase timings of
//! repeated trials and projects how optimization toggles would change them.
//! The statistics and simulation live in `loadlens-core`; this crate adds
//! the trial runner, configuration, observability and the CLI.

pub mod cli;
pub mod config;
pub mod error;
pub mod observability;
pub mod output;
pub mod trials;
