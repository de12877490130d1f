//! Signature scanning engine.
//!
//! Holds the compiled family rules and runs them over fetched region
//! bytes. The rule set is built once at startup and shared read-only for
//! the rest of the run.

use std::collections::HashMap;

use super::family::FamilyId;
use super::rules::{Condition, SignatureRule, StringPattern};
use crate::core::error::{Error, Result};

/// A signature hit inside a scanned memory region.
#[derive(Debug, Clone)]
pub struct SignatureHit {
    /// Family whose rule matched
    pub family: FamilyId,
    /// Absolute address of the lowest-offset pattern match
    pub address: u64,
}

/// Rule engine preloaded with the five family signatures.
pub struct RuleEngine {
    /// Loaded rules
    rules: Vec<SignatureRule>,
    /// Rules indexed by name
    rules_by_name: HashMap<String, usize>,
}

impl RuleEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            rules_by_name: HashMap::new(),
        }
    }

    /// Create an engine with the built-in family rules compiled.
    ///
    /// Compilation failure here is the one fatal startup condition: the
    /// scan cannot run without a working rule set.
    pub fn with_family_rules() -> Result<Self> {
        let mut engine = Self::new();
        engine.load_family_rules()?;
        Ok(engine)
    }

    fn load_family_rules(&mut self) -> Result<()> {
        self.add_rule(
            SignatureRule::new("RedLeaves")
                .with_description("RedLeaves implant strings")
                .with_string(StringPattern::text(
                    "$v1",
                    "red_autumnal_leaves_dllmain.dll",
                ))
                .with_string(StringPattern::hex("$b1", "FF FF 90 00"))
                .with_condition(Condition::And(
                    Box::new(Condition::Pattern("$v1".to_string())),
                    Box::new(Condition::PatternAt {
                        id: "$b1".to_string(),
                        offset: 0,
                    }),
                )),
        )?;

        self.add_rule(
            SignatureRule::new("Himawari")
                .with_description("Himawari variant strings")
                .with_string(StringPattern::text("$h1", "himawariA"))
                .with_string(StringPattern::text("$h2", "himawariB"))
                .with_string(StringPattern::text("$h3", "HimawariDemo"))
                .with_condition(Condition::All),
        )?;

        self.add_rule(
            SignatureRule::new("Lavender")
                .with_description("Lavender variant mov-immediate markers")
                .with_string(StringPattern::hex("$l1", "C7 ?? ?? 4C 41 56 45"))
                .with_string(StringPattern::hex("$l2", "C7 ?? ?? 4E 44 45 52"))
                .with_condition(Condition::All),
        )?;

        self.add_rule(
            SignatureRule::new("Armadill")
                .with_description("Armadill variant mov-immediate markers")
                .with_string(StringPattern::hex("$a1", "C7 ?? ?? 41 72 6D 61"))
                .with_string(StringPattern::hex("$a2", "C7 ?? ?? 64 69 6C 6C"))
                .with_condition(Condition::All),
        )?;

        self.add_rule(
            SignatureRule::new("zark20rk")
                .with_description("zark20rk variant mov-immediate markers")
                .with_string(StringPattern::hex("$a1", "C7 ?? ?? 7A 61 72 6B"))
                .with_string(StringPattern::hex("$a2", "C7 ?? ?? 32 30 72 6B"))
                .with_condition(Condition::All),
        )?;

        Ok(())
    }

    /// Add a rule to the engine.
    pub fn add_rule(&mut self, mut rule: SignatureRule) -> Result<()> {
        rule.compile()
            .map_err(|e| Error::RuleCompilation(format!("Rule '{}': {}", rule.name, e)))?;

        let index = self.rules.len();
        self.rules_by_name.insert(rule.name.clone(), index);
        self.rules.push(rule);

        Ok(())
    }

    /// Get the number of loaded rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Get a rule by name.
    pub fn get_rule(&self, name: &str) -> Option<&SignatureRule> {
        self.rules_by_name
            .get(name)
            .and_then(|&idx| self.rules.get(idx))
    }

    /// List all loaded rules.
    pub fn list_rules(&self) -> &[SignatureRule] {
        &self.rules
    }

    /// Scan region bytes against all rules.
    ///
    /// Returns one hit per matching rule with the absolute address of its
    /// lowest pattern offset (`region_base` + offset).
    pub fn scan(&self, data: &[u8], region_base: u64) -> Vec<SignatureHit> {
        let mut hits = Vec::new();

        for rule in &self.rules {
            if let Some(m) = rule.matches(data) {
                let family = match FamilyId::from_label(&m.rule_name) {
                    Some(family) => family,
                    None => continue,
                };
                hits.push(SignatureHit {
                    family,
                    address: region_base + m.first_offset as u64,
                });
            }
        }

        hits
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_rules_load() {
        let engine = RuleEngine::with_family_rules().unwrap();
        assert_eq!(engine.rule_count(), 5);
        assert!(engine.get_rule("RedLeaves").is_some());
        assert!(engine.get_rule("zark20rk").is_some());
    }

    #[test]
    fn test_redleaves_rule_requires_marker_at_zero() {
        let engine = RuleEngine::with_family_rules().unwrap();

        // Marker bytes at offset 0 plus the dll string: hit.
        let mut data = vec![0xFF, 0xFF, 0x90, 0x00];
        data.extend_from_slice(b"red_autumnal_leaves_dllmain.dll");
        let hits = engine.scan(&data, 0x400000);
        assert!(hits.iter().any(|h| h.family == FamilyId::RedLeaves));

        // Same bytes but the marker shifted off zero: no RedLeaves hit.
        let mut shifted = vec![0x90];
        shifted.extend_from_slice(&data);
        let hits = engine.scan(&shifted, 0x400000);
        assert!(!hits.iter().any(|h| h.family == FamilyId::RedLeaves));
    }

    #[test]
    fn test_himawari_rule_requires_all_strings() {
        let engine = RuleEngine::with_family_rules().unwrap();

        let partial = b"himawariA himawariB";
        assert!(engine.scan(partial, 0).is_empty());

        let full = b"himawariA himawariB HimawariDemo";
        let hits = engine.scan(full, 0x10000);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].family, FamilyId::Himawari);
        assert_eq!(hits[0].address, 0x10000);
    }

    #[test]
    fn test_lavender_rule_masks_modrm() {
        let engine = RuleEngine::with_family_rules().unwrap();

        // "LAVE" and "NDER" written through mov [reg+disp], imm32 with
        // arbitrary ModRM/displacement bytes under the wildcard.
        let data = [
            0xC7, 0x45, 0xF0, 0x4C, 0x41, 0x56, 0x45, // LAVE
            0xC7, 0x45, 0xF4, 0x4E, 0x44, 0x45, 0x52, // NDER
        ];
        let hits = engine.scan(&data, 0x7000);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].family, FamilyId::Lavender);
    }

    #[test]
    fn test_scan_reports_absolute_address() {
        let engine = RuleEngine::with_family_rules().unwrap();

        let mut data = vec![0u8; 16];
        data.extend_from_slice(b"himawariA himawariB HimawariDemo");
        let hits = engine.scan(&data, 0x400000);
        assert_eq!(hits[0].address, 0x400010);
    }

    #[test]
    fn test_scan_address_unaffected_by_non_utf8_bytes() {
        let engine = RuleEngine::with_family_rules().unwrap();

        // Process memory is rarely valid UTF-8; invalid bytes ahead of the
        // signature strings must not shift the reported address.
        let mut data = vec![0xFF; 4];
        data.extend_from_slice(b"himawariA himawariB HimawariDemo");
        let hits = engine.scan(&data, 0x400000);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].family, FamilyId::Himawari);
        assert_eq!(hits[0].address, 0x400004);
    }
}
