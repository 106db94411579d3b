//! Test Module
//!
//! Cross-module suites for the persona client core.
//!
//! ## Test Categories
//! - `classifier_tests`: score bounds, caching, rule loading
//! - `risk_tests`: crisis/concern properties, context exclusion, rule loading
//! - `orchestrator_tests`: mock backends and session orchestration scenarios
//! - `scenario_tests`: end-to-end flows over a mocked HTTP backend

pub mod risk_tests;
pub mod scenario_tests;
