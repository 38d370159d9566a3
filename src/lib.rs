// ABOUTME: Wake-up alarm daemon library: trigger engine, backends, and the runtime that drives them.
// ABOUTME: The daemon binary and wakeup-ctl both build on these modules.

pub mod clock;
pub mod config;
pub mod display;
pub mod engine;
pub mod mixer;
pub mod persistence;
pub mod player;
pub mod ramp;
pub mod runtime;
pub mod schedule;
pub mod signals;
pub mod state;

pub type DynError = Box<dyn std::error::Error + Send + Sync>;
