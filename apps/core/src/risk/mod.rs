//! # Risk Module
//!
//! Crisis and concern detection over free text.
//!
//! ## Components
//! - `patterns`: exclusion, crisis and concern pattern families (data-driven)
//! - `resources`: support resources and how they are recommended
//! - `assessment`: assessment records and risk levels
//! - `assessor`: the two-phase engine and per-session history

pub mod assessment;
pub mod assessor;
pub mod patterns;
pub mod resources;

pub use assessment::{
    AssessmentContext, AssessmentMetadata, Concern, RiskAssessment, RiskLevel, Trigger,
};
pub use assessor::RiskAssessor;
pub use patterns::{CrisisFamily, PatternFamily, RiskRules};
pub use resources::{Resource, ResourceCatalog, ResourceKind};
