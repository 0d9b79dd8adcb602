//! Persistence bridge: default-value decoding and the persisted-value
//! fallback chain
//!
//! Narrow defaults come out of the generated tables as a packed 32-bit slot
//! and must be read with an explicit, declared byte order; the engine passes
//! the target's native order. Wider defaults and string defaults are
//! out-of-line byte runs.

use arbor_schema::{AttributeDescriptor, DefaultValue, ElementType};

/// Byte order for decoding narrow default slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// The byte order attribute storage uses on this target
pub const NATIVE_ORDER: ByteOrder = if cfg!(target_endian = "big") {
    ByteOrder::Big
} else {
    ByteOrder::Little
};

/// Decode a packed narrow default into its stored byte run
///
/// `size` is clamped to the 4 bytes the slot can carry. Little-endian takes
/// the low-order prefix of the slot; big-endian takes the low-order suffix.
pub fn narrow_default_bytes(value: u32, size: usize, order: ByteOrder) -> Vec<u8> {
    let size = size.min(4);
    match order {
        ByteOrder::Little => value.to_le_bytes()[..size].to_vec(),
        ByteOrder::Big => value.to_be_bytes()[4 - size..].to_vec(),
    }
}

/// Decode a stored narrow value back into its numeric form
///
/// Inverse of [`narrow_default_bytes`]; `bytes` carries at most 4 bytes.
pub fn decode_narrow(bytes: &[u8], order: ByteOrder) -> u32 {
    let len = bytes.len().min(4);
    let mut buf = [0u8; 4];
    match order {
        ByteOrder::Little => {
            buf[..len].copy_from_slice(&bytes[..len]);
            u32::from_le_bytes(buf)
        }
        ByteOrder::Big => {
            buf[4 - len..].copy_from_slice(&bytes[..len]);
            u32::from_be_bytes(buf)
        }
    }
}

/// Generated default bytes for an attribute, or `None` to zero-fill
pub fn default_bytes(descriptor: &AttributeDescriptor, order: ByteOrder) -> Option<Vec<u8>> {
    match &descriptor.default {
        DefaultValue::Empty => None,
        DefaultValue::Inline(value) => {
            let mut bytes =
                narrow_default_bytes(*value, descriptor.size as usize, order);
            // Wide scalars with a narrow default pad out with zeros.
            bytes.resize(descriptor.size as usize, 0);
            Some(bytes)
        }
        DefaultValue::Bytes(bytes) => Some(bytes.clone()),
    }
}

/// Logical byte count of a stored value, as handed to the persistence
/// collaborator: prefix plus payload for strings, header width for lists,
/// declared size for scalars
pub fn persisted_len(descriptor: &AttributeDescriptor, stored: &[u8]) -> usize {
    match descriptor.element_type {
        ElementType::Scalar => descriptor.size as usize,
        _ => descriptor.logical_len(stored),
    }
}
