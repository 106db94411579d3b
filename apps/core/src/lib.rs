//! # Persona Core
//!
//! Client core of the persona assessment app.
//!
//! - [`classifier`]: deterministic lexical scoring of free text
//! - [`risk`]: crisis and concern detection with resource recommendations
//! - [`session`]: starting and following analyses on the remote backend
//! - [`parser`]: transcript parsing into speaker turns

pub mod classifier;
pub mod config;
pub mod error;
pub mod parser;
pub mod risk;
pub mod session;

#[cfg(test)]
mod tests;

pub use classifier::{ClassificationResult, ClassifyOptions, LexicalClassifier};
pub use config::ClientConfig;
pub use error::AppError;
pub use risk::{AssessmentContext, RiskAssessment, RiskAssessor, RiskLevel};
pub use session::{AnalysisOutcome, AnalysisPhase, AnalyzeRequest, SessionOrchestrator};
