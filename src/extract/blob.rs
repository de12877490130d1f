//! Configuration blob location.
//!
//! Translates a decoded 32-bit pointer into a slice of the region buffer
//! that was already read from the target process. The pointer routinely
//! lands outside the matched region or past the end of the captured
//! window; both outcomes are reported as recoverable extraction errors
//! rather than faults.

use super::resolver::ConfigPointer;
use super::ExtractError;
use crate::process::memory::MemoryRegion;

/// Resolves `pointer` against `region` and returns the blob bytes from
/// `data`, the buffer read for that region.
///
/// The returned slice is at most `blob_len` bytes and is clipped to the
/// captured window; the decoder bounds-checks each field read, so a
/// clipped blob surfaces as [`ExtractError::BlobUnavailable`] at the
/// first field that falls outside it.
pub fn locate_blob<'a>(
    region: &MemoryRegion,
    pointer: ConfigPointer,
    blob_len: usize,
    data: &'a [u8],
) -> Result<&'a [u8], ExtractError> {
    let address = u64::from(pointer.absolute_address);
    if address < region.base {
        return Err(ExtractError::PointerOutOfRegion {
            address: pointer.absolute_address,
            base: region.base,
        });
    }

    let rel = (address - region.base) as usize;
    if rel >= data.len() {
        return Err(ExtractError::BlobUnavailable);
    }

    let end = rel.saturating_add(blob_len).min(data.len());
    let blob = &data[rel..end];
    if blob.is_empty() {
        return Err(ExtractError::BlobUnavailable);
    }

    Ok(blob)
}
