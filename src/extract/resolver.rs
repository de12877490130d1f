//! Configuration pointer recovery from machine code.
//!
//! The implants materialize the configuration's absolute address with a
//! mov-immediate instruction near the secondary pattern. RedLeaves builds
//! need a backward scan for the anchor opcode and disambiguation between
//! three encodings; the Himawari group places the literal at a fixed
//! forward offset.

use super::ExtractError;
use crate::detection::{FamilyId, PointerStrategy};

/// A 32-bit absolute address decoded from code bytes.
///
/// May point outside the scanned region; that is a normal outcome handled
/// by the blob locator, not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigPointer {
    pub absolute_address: u32,
}

// mov r/m32, imm32 (register target selected by the ModRM byte)
const ANCHOR_MOV_RM32: u8 = 0xC7;
// mov esi, imm32
const ANCHOR_MOV_ESI: u8 = 0xBE;
// mov edi, imm32
const ANCHOR_MOV_EDI: u8 = 0xBF;

// [ebp+disp32] form: literal sits after opcode, ModRM, and 4 disp bytes.
const MODRM_EBP_DISP32: u8 = 0x85;
// [ebp+disp8] form: literal sits after opcode, ModRM, and 1 disp byte.
const MODRM_EBP_DISP8: u8 = 0x45;

// Length of the alternate instruction encoding that places the anchor
// earlier when the ModRM byte matches neither expected disp8 form.
const ALT_ENCODING_STEP: usize = 6;

/// Literal operand delta for each anchor form.
///
/// mov r/m32 with disp32: opcode + ModRM + 4 disp bytes = +6.
/// mov r/m32 with disp8:  opcode + ModRM + 1 disp byte  = +3.
/// mov esi/edi (and the re-tested fallthrough): opcode only = +1.
fn literal_delta(data: &[u8], anchor: usize) -> usize {
    match data.get(anchor) {
        Some(&ANCHOR_MOV_RM32) if data.get(anchor + 1) == Some(&MODRM_EBP_DISP32) => 6,
        Some(&ANCHOR_MOV_RM32) => 3,
        _ => 1,
    }
}

fn is_anchor(byte: u8) -> bool {
    matches!(byte, ANCHOR_MOV_RM32 | ANCHOR_MOV_ESI | ANCHOR_MOV_EDI)
}

fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Resolve the configuration pointer for `family` relative to the
/// secondary pattern at `pattern_offset` within `data`.
pub fn resolve_pointer(
    family: FamilyId,
    data: &[u8],
    pattern_offset: usize,
) -> Result<ConfigPointer, ExtractError> {
    match family.pointer_strategy() {
        PointerStrategy::BackwardAnchor => resolve_backward(data, pattern_offset),
        PointerStrategy::Forward { offset } => resolve_forward(data, pattern_offset, offset),
    }
}

/// Backward scan: step back from the pattern until an anchor opcode byte
/// is found, disambiguate the encoding, then decode the literal.
fn resolve_backward(data: &[u8], pattern_offset: usize) -> Result<ConfigPointer, ExtractError> {
    let not_found = ExtractError::PointerAnchorNotFound {
        offset: pattern_offset,
    };

    let mut anchor = pattern_offset.checked_sub(1).ok_or(not_found.clone())?;
    loop {
        match data.get(anchor) {
            Some(&byte) if is_anchor(byte) => break,
            Some(_) => {
                anchor = anchor.checked_sub(1).ok_or(not_found.clone())?;
            }
            None => return Err(not_found),
        }
    }

    // An alternate encoding places the anchor six bytes earlier when the
    // ModRM byte matches neither expected ebp-relative form.
    if data[anchor] == ANCHOR_MOV_RM32 {
        let modrm = data.get(anchor + 1).copied();
        if modrm != Some(MODRM_EBP_DISP32) && modrm != Some(MODRM_EBP_DISP8) {
            anchor = anchor.checked_sub(ALT_ENCODING_STEP).ok_or(not_found)?;
        }
    }

    let literal = anchor + literal_delta(data, anchor);
    let absolute_address = read_u32_le(data, literal).ok_or(ExtractError::BlobUnavailable)?;

    Ok(ConfigPointer { absolute_address })
}

/// Forward resolution: the literal sits at a fixed offset past the
/// secondary pattern, no anchor search needed.
fn resolve_forward(
    data: &[u8],
    pattern_offset: usize,
    offset: usize,
) -> Result<ConfigPointer, ExtractError> {
    let literal = pattern_offset
        .checked_add(offset)
        .ok_or(ExtractError::BlobUnavailable)?;
    let absolute_address = read_u32_le(data, literal).ok_or(ExtractError::BlobUnavailable)?;

    Ok(ConfigPointer { absolute_address })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERN: usize = 0x20;

    fn buffer_with_pattern(family: FamilyId, len: usize) -> Vec<u8> {
        let mut data = vec![0x90u8; len];
        let pattern = family.secondary_pattern();
        data[PATTERN..PATTERN + pattern.len()].copy_from_slice(pattern);
        data
    }

    #[test]
    fn test_backward_mov_rm32_disp32() {
        // C7 85 <4 disp bytes> <literal>: literal at anchor+6.
        let mut data = buffer_with_pattern(FamilyId::RedLeaves, 0x40);
        data[0x10] = 0xC7;
        data[0x11] = 0x85;
        data[0x16..0x1A].copy_from_slice(&0x00404000u32.to_le_bytes());

        let pointer = resolve_pointer(FamilyId::RedLeaves, &data, PATTERN).unwrap();
        assert_eq!(pointer.absolute_address, 0x00404000);
    }

    #[test]
    fn test_backward_mov_rm32_disp8() {
        // C7 45 <disp8> <literal>: literal at anchor+3.
        let mut data = buffer_with_pattern(FamilyId::RedLeaves, 0x40);
        data[0x18] = 0xC7;
        data[0x19] = 0x45;
        data[0x1B..0x1F].copy_from_slice(&0x00402000u32.to_le_bytes());

        let pointer = resolve_pointer(FamilyId::RedLeaves, &data, PATTERN).unwrap();
        assert_eq!(pointer.absolute_address, 0x00402000);
    }

    #[test]
    fn test_backward_mov_edi() {
        // BF <literal>: literal at anchor+1.
        let mut data = buffer_with_pattern(FamilyId::RedLeaves, 0x40);
        data[0x1B] = 0xBF;
        data[0x1C..0x20].copy_from_slice(&0x00401000u32.to_le_bytes());

        let pointer = resolve_pointer(FamilyId::RedLeaves, &data, PATTERN).unwrap();
        assert_eq!(pointer.absolute_address, 0x00401000);
    }

    #[test]
    fn test_backward_alternate_encoding_steps_back() {
        // A C7 anchor whose ModRM is neither 0x85 nor 0x45: the true
        // anchor sits six bytes earlier. Place a BE form there.
        let mut data = buffer_with_pattern(FamilyId::RedLeaves, 0x40);
        data[0x1F] = 0xC7;
        // data[0x20] is the pattern's first byte (0x68), not a valid ModRM.
        data[0x19] = 0xBE;
        data[0x1A..0x1E].copy_from_slice(&0x00403000u32.to_le_bytes());

        let pointer = resolve_pointer(FamilyId::RedLeaves, &data, PATTERN).unwrap();
        assert_eq!(pointer.absolute_address, 0x00403000);
    }

    #[test]
    fn test_backward_no_anchor() {
        let data = buffer_with_pattern(FamilyId::RedLeaves, 0x40);
        let err = resolve_pointer(FamilyId::RedLeaves, &data, PATTERN).unwrap_err();
        assert_eq!(err, ExtractError::PointerAnchorNotFound { offset: PATTERN });
    }

    #[test]
    fn test_backward_pattern_at_start() {
        let data = vec![0x90u8; 16];
        let err = resolve_pointer(FamilyId::RedLeaves, &data, 0).unwrap_err();
        assert_eq!(err, ExtractError::PointerAnchorNotFound { offset: 0 });
    }

    #[test]
    fn test_backward_literal_past_window() {
        // Anchor right at the end: the 4-byte literal read runs out.
        let mut data = vec![0x90u8; 8];
        data[6] = 0xBF;
        let err = resolve_pointer(FamilyId::RedLeaves, &data, 7).unwrap_err();
        assert_eq!(err, ExtractError::BlobUnavailable);
    }

    #[test]
    fn test_forward_himawari_offset_six() {
        let mut data = buffer_with_pattern(FamilyId::Himawari, 0x40);
        // Surround the literal with decoy bytes so a shifted read would
        // decode a different value.
        data[PATTERN + 5..PATTERN + 11].copy_from_slice(&[0xAA, 0x11, 0x22, 0x33, 0x44, 0xBB]);

        let pointer = resolve_pointer(FamilyId::Himawari, &data, PATTERN).unwrap();
        assert_eq!(pointer.absolute_address, 0x44332211);
        assert_ne!(pointer.absolute_address, 0x332211AA);
        assert_ne!(pointer.absolute_address, 0xBB443322);
    }

    #[test]
    fn test_forward_zark_offset_twelve() {
        let mut data = buffer_with_pattern(FamilyId::Zark20rk, 0x40);
        data[PATTERN + 6..PATTERN + 10].copy_from_slice(&0x11111111u32.to_le_bytes());
        data[PATTERN + 12..PATTERN + 16].copy_from_slice(&0x00406000u32.to_le_bytes());

        let pointer = resolve_pointer(FamilyId::Zark20rk, &data, PATTERN).unwrap();
        assert_eq!(pointer.absolute_address, 0x00406000);
    }

    #[test]
    fn test_forward_read_past_window() {
        let data = buffer_with_pattern(FamilyId::Himawari, PATTERN + 8);
        let err = resolve_pointer(FamilyId::Himawari, &data, PATTERN).unwrap_err();
        assert_eq!(err, ExtractError::BlobUnavailable);
    }
}
