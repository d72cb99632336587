//! Pre-signal Index engine.
//!
//! Normalizes per-category signals, scores them against each ticker's own
//! rolling baseline, fuses them into a bounded composite, classifies the
//! tier and gates notifications so each regime change alerts once.

pub mod alert_gate;
pub mod baseline;
pub mod config;
pub mod engine;
pub mod flash_reason;
pub mod fusion;
pub mod normalizer;
pub mod store;
mod tier;

pub use alert_gate::{decide, AlertGate, AlertState, GateOutcome, GateReason};
pub use baseline::{BaselineRecord, Baselines};
pub use config::{BaselineConfig, CategoryWeights, ConfigError, NormalizerConfig, PsiConfig, TierThresholds};
pub use engine::{Evaluation, PsiEngine};
pub use flash_reason::{event_type, FlashReasonAttributor};
pub use fusion::{FusedScore, PsiFusion};
pub use normalizer::SignalNormalizer;
pub use store::{AlertStateStore, BaselineStore, MemoryStore, StoreError};
