//! Typed attribute copy engine
//!
//! Moves attribute bytes between caller buffers and storage slices according
//! to the descriptor's element class. The destination slice length is the
//! capacity: on a write it is the declared storage size, on a read it is
//! whatever the caller handed over. String classes truncate to capacity and
//! rewrite the length prefix; scalars never partially fill.

use arbor_schema::{AttributeDescriptor, ElementType};

use crate::error::AccessError;

/// Copy one attribute value into `dest`
///
/// `src = None` is the no-default case: `dest` is explicitly zero-filled.
/// Returns the logical number of bytes the destination now holds (prefix
/// plus payload for strings, header width for lists, declared size for
/// scalars).
pub fn copy_attribute(
    dest: &mut [u8],
    src: Option<&[u8]>,
    descriptor: &AttributeDescriptor,
) -> Result<usize, AccessError> {
    let src = match src {
        Some(src) => src,
        None => {
            dest.fill(0);
            return Ok(dest.len());
        }
    };

    match descriptor.element_type {
        ElementType::ShortString => copy_short_string(dest, src),
        ElementType::LongString => copy_long_string(dest, src),
        ElementType::List => copy_list_header(dest, src),
        ElementType::Scalar => copy_scalar(dest, src, descriptor.size as usize),
    }
}

fn copy_short_string(dest: &mut [u8], src: &[u8]) -> Result<usize, AccessError> {
    if dest.is_empty() || src.is_empty() {
        return Err(AccessError::ResourceExhausted {
            needed: 1,
            have: dest.len().min(src.len()),
        });
    }
    let claimed = src[0] as usize;
    let payload = claimed.min(src.len() - 1).min(dest.len() - 1);
    dest[0] = payload as u8;
    dest[1..1 + payload].copy_from_slice(&src[1..1 + payload]);
    Ok(1 + payload)
}

fn copy_long_string(dest: &mut [u8], src: &[u8]) -> Result<usize, AccessError> {
    if dest.len() < 2 || src.len() < 2 {
        return Err(AccessError::ResourceExhausted {
            needed: 2,
            have: dest.len().min(src.len()),
        });
    }
    let claimed = u16::from_le_bytes([src[0], src[1]]) as usize;
    let payload = claimed.min(src.len() - 2).min(dest.len() - 2);
    dest[..2].copy_from_slice(&(payload as u16).to_le_bytes());
    dest[2..2 + payload].copy_from_slice(&src[2..2 + payload]);
    Ok(2 + payload)
}

fn copy_list_header(dest: &mut [u8], src: &[u8]) -> Result<usize, AccessError> {
    if dest.len() < 2 || src.len() < 2 {
        return Err(AccessError::ResourceExhausted {
            needed: 2,
            have: dest.len().min(src.len()),
        });
    }
    // Lists are header-only in attribute storage; elements live elsewhere.
    dest[..2].copy_from_slice(&src[..2]);
    Ok(2)
}

fn copy_scalar(dest: &mut [u8], src: &[u8], size: usize) -> Result<usize, AccessError> {
    if dest.len() < size {
        return Err(AccessError::ResourceExhausted {
            needed: size,
            have: dest.len(),
        });
    }
    if src.len() < size {
        return Err(AccessError::ResourceExhausted {
            needed: size,
            have: src.len(),
        });
    }
    dest[..size].copy_from_slice(&src[..size]);
    Ok(size)
}
