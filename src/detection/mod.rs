//! Implant detection: family definitions, signature rules, and the
//! scanning engine.

pub mod engine;
pub mod family;
pub mod rules;

pub use engine::{RuleEngine, SignatureHit};
pub use family::{classify, FamilyId, PointerStrategy};
pub use rules::{Condition, SignatureRule, StringPattern};
