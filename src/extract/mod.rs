//! Configuration extraction pipeline.
//!
//! Given a signature hit and the bytes of its memory region, this module
//! recovers the implant's configuration: re-anchor on the family's
//! secondary pattern, decode the config pointer from the surrounding
//! machine code, slice the bounded blob, and decode the fixed-offset
//! record. Every step fails softly; a hit that cannot be resolved is
//! skipped, never fatal to the scan.

pub mod blob;
pub mod decode;
pub mod resolver;

pub use blob::locate_blob;
pub use decode::{decode, ConfigRecord, ConnectMode, HimawariConfig, RedLeavesConfig};
pub use resolver::{resolve_pointer, ConfigPointer};

use crate::detection::{classify, FamilyId};
use crate::process::memory::MemoryRegion;
use thiserror::Error;

/// Per-hit extraction failures.
///
/// Everything except `ModeOutOfRange` is an expected soft outcome: the
/// hit is skipped and the scan moves on. `ModeOutOfRange` is a hard
/// decode error for that hit (the connect-mode enumeration has no
/// default), still local to the hit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("address {address:#x} is not inside any known region")]
    RegionNotFound { address: u64 },

    #[error("secondary pattern for {family} not present in region bytes")]
    SecondaryPatternAbsent { family: FamilyId },

    #[error("no anchor opcode found before offset {offset:#x}")]
    PointerAnchorNotFound { offset: usize },

    #[error("resolved pointer {address:#x} precedes region base {base:#x}")]
    PointerOutOfRegion { address: u32, base: u64 },

    #[error("configuration blob is empty or outside the fetched window")]
    BlobUnavailable,

    #[error("connect mode {0} is outside the known range 1-4")]
    ModeOutOfRange(u32),
}

impl ExtractError {
    /// Whether this outcome is a routine skip rather than a decode error.
    pub fn is_skip(&self) -> bool {
        !matches!(self, ExtractError::ModeOutOfRange(_))
    }
}

/// Run the full per-hit pipeline over one region's bytes.
///
/// `data` is the read-only byte window covering `region` from its base;
/// it is never written, and the returned record owns its own copies.
pub fn extract_config(
    family: FamilyId,
    region: &MemoryRegion,
    data: &[u8],
) -> Result<ConfigRecord, ExtractError> {
    let pattern_offset =
        classify(family, data).ok_or(ExtractError::SecondaryPatternAbsent { family })?;
    let pointer = resolve_pointer(family, data, pattern_offset)?;
    let blob = locate_blob(region, pointer, family.blob_len(), data)?;
    decode(family, blob)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(base: u64, end: u64) -> MemoryRegion {
        MemoryRegion { base, end }
    }

    #[test]
    fn test_skip_classification() {
        assert!(ExtractError::BlobUnavailable.is_skip());
        assert!(ExtractError::RegionNotFound { address: 0x1000 }.is_skip());
        assert!(!ExtractError::ModeOutOfRange(5).is_skip());
    }

    #[test]
    fn test_extract_missing_secondary_pattern() {
        let data = vec![0x90u8; 128];
        let err = extract_config(FamilyId::RedLeaves, &region(0x1000, 0x2000), &data).unwrap_err();
        assert_eq!(
            err,
            ExtractError::SecondaryPatternAbsent {
                family: FamilyId::RedLeaves
            }
        );
    }

    #[test]
    fn test_extract_himawari_end_to_end() {
        // Region at 0x400000 with the secondary pattern at offset 0x20,
        // the config pointer literal at 0x26, and an 880-byte blob at
        // region offset 0x100.
        let base = 0x400000u64;
        let blob_rel = 0x100usize;
        let mut data = vec![0u8; blob_rel + 880];

        data[0x20..0x26].copy_from_slice(FamilyId::Himawari.secondary_pattern());
        let config_addr = (base + blob_rel as u64) as u32;
        data[0x26..0x2A].copy_from_slice(&config_addr.to_le_bytes());

        // Server1 @ blob+0x04, Port @ blob+0x104.
        data[blob_rel + 0x04..blob_rel + 0x0C].copy_from_slice(b"10.0.0.1");
        data[blob_rel + 0x104..blob_rel + 0x108].copy_from_slice(&8080u32.to_le_bytes());

        let record =
            extract_config(FamilyId::Himawari, &region(base, base + 0x10000), &data).unwrap();
        match record {
            ConfigRecord::Himawari(cfg) => {
                assert_eq!(cfg.server1, "10.0.0.1");
                assert_eq!(cfg.port, 8080);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_extract_pointer_below_region_base() {
        let base = 0x400000u64;
        let mut data = vec![0u8; 0x100];
        data[0x20..0x26].copy_from_slice(FamilyId::Himawari.secondary_pattern());
        // Pointer resolves below the region base: expected soft failure.
        data[0x26..0x2A].copy_from_slice(&0x1000u32.to_le_bytes());

        let err =
            extract_config(FamilyId::Himawari, &region(base, base + 0x1000), &data).unwrap_err();
        assert_eq!(
            err,
            ExtractError::PointerOutOfRegion {
                address: 0x1000,
                base
            }
        );
        assert!(err.is_skip());
    }
}
