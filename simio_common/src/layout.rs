//! Byte layout of structured I/O blocks.
//!
//! An [`IoLayout`] is built from an ordered list of typed field
//! declarations. Fields are placed one after another on a running bit
//! offset:
//!
//! - a 1-bit `bool` is placed at the current bit offset (no alignment),
//! - every other kind first rounds the offset up to the next byte boundary.
//!
//! The block size is the final offset rounded up to whole bytes. Within a
//! byte, bits are numbered LSB-first; multi-byte scalars are big-endian.
//!
//! ```text
//!  bool a | bool b | bool c | pad ×5 | u8 d
//!  bit 0    bit 1    bit 2             byte 1     → byte_len() == 2
//! ```
//!
//! Invalid declarations (unknown kind name, array of bits, a field that
//! would push the block past the addressable size) are ignored without
//! touching the layout; callers validate semantics upstream.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Primitive kind of a field, each with a fixed bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Single bit.
    Bool,
    /// Unsigned 8-bit.
    U8,
    /// Signed 8-bit.
    I8,
    /// Unsigned 16-bit.
    U16,
    /// Signed 16-bit.
    I16,
    /// Unsigned 32-bit.
    U32,
    /// Signed 32-bit.
    I32,
    /// IEEE-754 single.
    F32,
    /// Unsigned 64-bit.
    U64,
    /// Signed 64-bit.
    I64,
    /// IEEE-754 double.
    F64,
}

impl FieldKind {
    /// Width of one element in bits.
    pub const fn bit_width(self) -> u32 {
        match self {
            Self::Bool => 1,
            Self::U8 | Self::I8 => 8,
            Self::U16 | Self::I16 => 16,
            Self::U32 | Self::I32 | Self::F32 => 32,
            Self::U64 | Self::I64 | Self::F64 => 64,
        }
    }

    /// `true` for the 1-bit kind, the only one that skips byte alignment.
    pub const fn is_bit(self) -> bool {
        matches!(self, Self::Bool)
    }

    /// Resolve a kind from its configuration name.
    ///
    /// Accepts the Rust-style names and the usual PLC aliases
    /// (`bit`, `byte`, `word`, `dint`, `real`, ...). Case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.to_ascii_lowercase().as_str() {
            "bool" | "bit" => Self::Bool,
            "u8" | "byte" | "usint" => Self::U8,
            "i8" | "sint" => Self::I8,
            "u16" | "word" | "uint" => Self::U16,
            "i16" | "int" => Self::I16,
            "u32" | "dword" | "udint" => Self::U32,
            "i32" | "dint" => Self::I32,
            "f32" | "real" => Self::F32,
            "u64" | "lword" | "ulint" => Self::U64,
            "i64" | "lint" => Self::I64,
            "f64" | "lreal" => Self::F64,
            _ => return None,
        };
        Some(kind)
    }
}

/// A declared field together with its placement in the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutField {
    /// Field name as declared.
    pub name: String,
    /// Element kind.
    pub kind: FieldKind,
    /// Number of elements; `0` declares a scalar.
    pub array_len: u32,
    /// Absolute bit offset of the first element.
    pub bit_offset: u64,
}

impl LayoutField {
    /// Number of elements occupied (a scalar counts as one).
    pub const fn element_count(&self) -> u32 {
        if self.array_len == 0 { 1 } else { self.array_len }
    }

    /// Total bits occupied by the field.
    pub const fn bit_len(&self) -> u64 {
        self.kind.bit_width() as u64 * self.element_count() as u64
    }

    /// Byte holding the first bit of the field.
    pub const fn byte_offset(&self) -> usize {
        (self.bit_offset / 8) as usize
    }

    /// Bit position inside [`byte_offset`](Self::byte_offset), LSB-first.
    pub const fn bit_in_byte(&self) -> u8 {
        (self.bit_offset % 8) as u8
    }

    /// Read a `bool` field. Returns `false` if the buffer is too short.
    pub fn read_bit(&self, buf: &[u8]) -> bool {
        buf.get(self.byte_offset())
            .is_some_and(|byte| (byte >> self.bit_in_byte()) & 1 == 1)
    }

    /// Write a `bool` field. Ignored if the buffer is too short.
    pub fn write_bit(&self, buf: &mut [u8], value: bool) {
        if let Some(byte) = buf.get_mut(self.byte_offset()) {
            let mask = 1u8 << self.bit_in_byte();
            if value {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
    }

    /// Read element `index` of a byte-aligned field as a big-endian
    /// unsigned integer (sign and float interpretation left to the caller).
    pub fn read_uint(&self, buf: &[u8], index: u32) -> Option<u64> {
        let range = self.element_range(index)?;
        let bytes = buf.get(range)?;
        Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    /// Write element `index` of a byte-aligned field, truncating `value`
    /// to the element width. Returns `false` if out of range.
    pub fn write_uint(&self, buf: &mut [u8], index: u32, value: u64) -> bool {
        let Some(range) = self.element_range(index) else {
            return false;
        };
        let Some(bytes) = buf.get_mut(range) else {
            return false;
        };
        let width = bytes.len();
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (value >> (8 * (width - 1 - i))) as u8;
        }
        true
    }

    fn element_range(&self, index: u32) -> Option<std::ops::Range<usize>> {
        if self.kind.is_bit() || index >= self.element_count() {
            return None;
        }
        let width = (self.kind.bit_width() / 8) as usize;
        let start = self.byte_offset() + width * index as usize;
        Some(start..start + width)
    }
}

/// Ordered field list plus running bit offset.
///
/// Built fresh for every configuration pass and never shared with a running
/// cycle loop; only the resulting byte length and field slots are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoLayout {
    fields: Vec<LayoutField>,
    bit_offset: u64,
}

impl IoLayout {
    /// Empty layout (size 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field.
    ///
    /// An array of `bool` is not representable and is ignored, as is a
    /// field whose end would not fit the addressable byte range.
    pub fn add_field(&mut self, name: &str, kind: FieldKind, array_len: u32) {
        if kind.is_bit() && array_len > 0 {
            debug!("Ignoring field '{name}': arrays of bits are not supported");
            return;
        }

        let offset = if kind.is_bit() {
            Some(self.bit_offset)
        } else {
            self.bit_offset.div_ceil(8).checked_mul(8)
        };

        let Some(offset) = offset else {
            debug!("Ignoring field '{name}': layout offset overflows");
            return;
        };
        let field = LayoutField {
            name: name.to_string(),
            kind,
            array_len,
            bit_offset: offset,
        };
        let Some(end) = offset
            .checked_add(field.bit_len())
            .filter(|end| usize::try_from(end.div_ceil(8)).is_ok())
        else {
            debug!(
                "Ignoring field '{name}': {} bits at offset {offset} exceed the addressable size",
                field.bit_len()
            );
            return;
        };

        self.bit_offset = end;
        self.fields.push(field);
    }

    /// Append a field whose kind is given by name; unknown kinds are ignored.
    pub fn add_field_named(&mut self, name: &str, kind_name: &str, array_len: u32) {
        match FieldKind::from_name(kind_name) {
            Some(kind) => self.add_field(name, kind, array_len),
            None => debug!("Ignoring field '{name}': unknown kind '{kind_name}'"),
        }
    }

    /// Current size rounded up to whole bytes.
    pub const fn byte_len(&self) -> usize {
        self.bit_offset.div_ceil(8) as usize
    }

    /// Current running offset in bits.
    pub const fn bit_len(&self) -> u64 {
        self.bit_offset
    }

    /// Look up a placed field by name (first match).
    pub fn field(&self, name: &str) -> Option<&LayoutField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All placed fields in declaration order.
    pub fn fields(&self) -> &[LayoutField] {
        &self.fields
    }

    /// Number of placed fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// `true` if no field has been placed.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
