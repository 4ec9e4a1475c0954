// This module provides the target data layout the pointer-offset collapse consults:
// pointer width plus byte-size and alignment queries over host types. The pointer
// width defaults to the producing machine's native word, matching the wire format's
// assumption; the runtime that reads the encoding rejects anything else, so a
// mismatch is surfaced as a fatal error at type-emission time rather than here.
// Sizes follow the usual natural-alignment rules of 64-bit ABIs: integers are
// ceil(bits/8) bytes aligned to their size (capped at 16), structs end at their
// last field rounded up to the widest field alignment.

//! Target data layout: type sizes and alignments.

use super::{Context, Type, TypeId};

/// Byte sizes and alignments of host types on the target.
#[derive(Debug, Clone)]
pub struct DataLayout {
    ptr_bytes: u32,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self {
            ptr_bytes: std::mem::size_of::<usize>() as u32,
        }
    }
}

impl DataLayout {
    /// A layout with an explicit pointer width, for hosts that differ from
    /// the producing machine.
    pub fn with_ptr_bytes(ptr_bytes: u32) -> Self {
        Self { ptr_bytes }
    }

    pub fn ptr_bytes(&self) -> u32 {
        self.ptr_bytes
    }

    pub fn ptr_bits(&self) -> u32 {
        self.ptr_bytes * 8
    }

    /// Allocation size of `ty` in bytes, or `None` for unsized types (void,
    /// functions, unsupported types).
    pub fn byte_size(&self, ctx: &Context, ty: TypeId) -> Option<u64> {
        match ctx.ty(ty) {
            Type::Void | Type::Function { .. } | Type::Unsupported { .. } => None,
            Type::Integer { bits } => Some(u64::from(*bits).div_ceil(8)),
            Type::Ptr => Some(u64::from(self.ptr_bytes)),
            Type::Struct {
                fields,
                field_bit_offs,
            } => {
                let mut end_bits = 0u64;
                let mut align = 1u64;
                for (f, off) in fields.iter().zip(field_bit_offs) {
                    let size = self.byte_size(ctx, *f)?;
                    end_bits = end_bits.max(off + size * 8);
                    align = align.max(self.byte_align(ctx, *f)?);
                }
                Some(end_bits.div_ceil(8).next_multiple_of(align))
            }
        }
    }

    /// ABI alignment of `ty` in bytes, or `None` for unsized types.
    pub fn byte_align(&self, ctx: &Context, ty: TypeId) -> Option<u64> {
        match ctx.ty(ty) {
            Type::Void | Type::Function { .. } | Type::Unsupported { .. } => None,
            Type::Integer { bits } => {
                let size = u64::from(*bits).div_ceil(8);
                Some(size.next_power_of_two().min(16).max(1))
            }
            Type::Ptr => Some(u64::from(self.ptr_bytes)),
            Type::Struct { fields, .. } => {
                let mut align = 1u64;
                for f in fields {
                    align = align.max(self.byte_align(ctx, *f)?);
                }
                Some(align)
            }
        }
    }
}
