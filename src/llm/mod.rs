//! Vehicle reasoning: rule-based default and hosted-model backend

pub mod client;
pub mod context;
pub mod reasoning;

pub use client::LlmReasoner;
pub use context::VehicleContext;
pub use reasoning::{ReasoningProvider, ReasoningStyle, RuleBasedReasoner};
