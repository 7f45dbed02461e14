//! Testing utilities for eltflow pipelines.
//!
//! This module provides:
//! - Scripted and fixed-answer readiness probes
//! - A recording stage runner with scriptable failures
//!
//! All of them are deterministic, so gate and orchestrator behavior can be
//! exercised without sockets or child processes.

mod fakes;

pub use fakes::{FakeStageRunner, ScriptedProbe, StaticProbe};
