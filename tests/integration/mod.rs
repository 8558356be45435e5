//! Integration tests for tierflow.
//!
//! These run whole pipelines against scripted workers and step runners, so
//! no agent binary or toolchain is needed.
//!
//! # Test Categories
//!
//! - `dispatch`: tiered fan-out, failure isolation, depth bound, timeouts
//! - `feasibility`: checklist to report, end to end
//! - `gate`: validation ordering and graph outcome consumption

mod fixtures;

mod dispatch;
mod feasibility;
mod gate;
