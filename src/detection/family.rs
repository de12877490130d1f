//! Implant family definitions.
//!
//! Each supported variant of the RedLeaves lineage is a closed enum member
//! carrying its configuration geometry: the secondary byte pattern that
//! anchors the config-loading code, the pointer recovery strategy, and the
//! fixed size of the embedded configuration blob.

use serde::{Deserialize, Serialize};

/// A known implant family sharing the RedLeaves configuration lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FamilyId {
    RedLeaves,
    Himawari,
    Lavender,
    Armadill,
    Zark20rk,
}

/// How the configuration pointer is recovered relative to the secondary
/// pattern offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerStrategy {
    /// Scan backward for a mov-immediate anchor opcode, then decode the
    /// 32-bit literal operand at a form-dependent delta.
    BackwardAnchor,
    /// Decode the 32-bit literal directly at a fixed forward offset.
    Forward { offset: usize },
}

impl FamilyId {
    /// All known families, in rule-definition order.
    pub const ALL: [FamilyId; 5] = [
        FamilyId::RedLeaves,
        FamilyId::Himawari,
        FamilyId::Lavender,
        FamilyId::Armadill,
        FamilyId::Zark20rk,
    ];

    /// Display label, matching the original rule names.
    pub fn label(&self) -> &'static str {
        match self {
            FamilyId::RedLeaves => "RedLeaves",
            FamilyId::Himawari => "Himawari",
            FamilyId::Lavender => "Lavender",
            FamilyId::Armadill => "Armadill",
            FamilyId::Zark20rk => "zark20rk",
        }
    }

    /// Parse a signature rule name back into a family tag.
    pub fn from_label(label: &str) -> Option<FamilyId> {
        FamilyId::ALL.iter().copied().find(|f| f.label() == label)
    }

    /// The secondary byte pattern that re-anchors the hit inside the
    /// fetched region bytes, independent of the primary signature.
    ///
    /// Himawari, Lavender, and Armadill currently share an identical byte
    /// string but keep distinct entries per family; future signatures are
    /// expected to diverge them.
    pub fn secondary_pattern(&self) -> &'static [u8] {
        match self {
            FamilyId::RedLeaves => &[0x68, 0x88, 0x13, 0x00, 0x00, 0xFF],
            FamilyId::Himawari => &[0x68, 0x70, 0x03, 0x00, 0x00, 0xBF],
            FamilyId::Lavender => &[0x68, 0x70, 0x03, 0x00, 0x00, 0xBF],
            FamilyId::Armadill => &[0x68, 0x70, 0x03, 0x00, 0x00, 0xBF],
            FamilyId::Zark20rk => &[0x68, 0x70, 0x03, 0x00, 0x00, 0x8D],
        }
    }

    /// Fixed length of the configuration blob for this family.
    pub fn blob_len(&self) -> usize {
        match self {
            FamilyId::RedLeaves => 2100,
            FamilyId::Himawari
            | FamilyId::Lavender
            | FamilyId::Armadill
            | FamilyId::Zark20rk => 880,
        }
    }

    /// How the configuration pointer is located for this family.
    pub fn pointer_strategy(&self) -> PointerStrategy {
        match self {
            FamilyId::RedLeaves => PointerStrategy::BackwardAnchor,
            FamilyId::Himawari | FamilyId::Lavender | FamilyId::Armadill => {
                PointerStrategy::Forward { offset: 6 }
            }
            // One extra mov to step over in the zark20rk build.
            FamilyId::Zark20rk => PointerStrategy::Forward { offset: 12 },
        }
    }
}

impl std::fmt::Display for FamilyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Locate the first occurrence of the family's secondary pattern inside
/// the fetched region bytes.
///
/// `None` means the primary signature was a false positive or the sample
/// deviates; the caller skips the hit without failing the scan.
pub fn classify(family: FamilyId, data: &[u8]) -> Option<usize> {
    let pattern = family.secondary_pattern();
    if pattern.is_empty() || data.len() < pattern.len() {
        return None;
    }
    (0..=data.len() - pattern.len()).find(|&i| data[i..].starts_with(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_round_trip() {
        for family in FamilyId::ALL {
            assert_eq!(FamilyId::from_label(family.label()), Some(family));
        }
        assert_eq!(FamilyId::from_label("Unknown"), None);
    }

    #[test]
    fn test_blob_lengths() {
        assert_eq!(FamilyId::RedLeaves.blob_len(), 2100);
        assert_eq!(FamilyId::Himawari.blob_len(), 880);
        assert_eq!(FamilyId::Zark20rk.blob_len(), 880);
    }

    #[test]
    fn test_pointer_strategies() {
        assert_eq!(
            FamilyId::RedLeaves.pointer_strategy(),
            PointerStrategy::BackwardAnchor
        );
        assert_eq!(
            FamilyId::Lavender.pointer_strategy(),
            PointerStrategy::Forward { offset: 6 }
        );
        assert_eq!(
            FamilyId::Zark20rk.pointer_strategy(),
            PointerStrategy::Forward { offset: 12 }
        );
    }

    #[test]
    fn test_classify_finds_first_match() {
        let mut data = vec![0u8; 32];
        data.extend_from_slice(FamilyId::RedLeaves.secondary_pattern());
        data.extend_from_slice(&[0x90; 8]);
        data.extend_from_slice(FamilyId::RedLeaves.secondary_pattern());

        assert_eq!(classify(FamilyId::RedLeaves, &data), Some(32));
    }

    #[test]
    fn test_classify_absent() {
        let data = vec![0x90u8; 64];
        assert_eq!(classify(FamilyId::Himawari, &data), None);
    }

    #[test]
    fn test_classify_short_buffer() {
        let data = [0x68u8, 0x70];
        assert_eq!(classify(FamilyId::Himawari, &data), None);
    }

    #[test]
    fn test_zark_pattern_differs() {
        // zark20rk ends in 8D where the rest of the group ends in BF.
        let himawari = FamilyId::Himawari.secondary_pattern();
        let zark = FamilyId::Zark20rk.secondary_pattern();
        assert_ne!(himawari, zark);
        assert_eq!(himawari[..5], zark[..5]);
    }
}
