//! Data formats of the values fed to subgroup operations.

use crate::value::{Scalar, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Bool,
}

impl ScalarType {
    pub const ALL: [Self; 7] = [
        Self::I32,
        Self::U32,
        Self::I64,
        Self::U64,
        Self::F32,
        Self::F64,
        Self::Bool,
    ];

    /// Size of one component in a buffer. Booleans travel as 32-bit words.
    pub fn width(self) -> usize {
        match self {
            Self::I64 | Self::U64 | Self::F64 => 8,
            Self::I32 | Self::U32 | Self::F32 | Self::Bool => 4,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub fn is_bool(self) -> bool {
        self == Self::Bool
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Self::I32 | Self::I64)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::I32 | Self::U32 | Self::I64 | Self::U64)
    }

    pub fn is_64bit(self) -> bool {
        self.width() == 8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Bool => "bool",
        }
    }

    fn glsl_scalar(self) -> &'static str {
        match self {
            Self::I32 => "int",
            Self::U32 => "uint",
            Self::I64 => "int64_t",
            Self::U64 => "uint64_t",
            Self::F32 => "float",
            Self::F64 => "double",
            Self::Bool => "bool",
        }
    }

    fn glsl_vector_prefix(self) -> &'static str {
        match self {
            Self::I32 => "ivec",
            Self::U32 => "uvec",
            Self::I64 => "i64vec",
            Self::U64 => "u64vec",
            Self::F32 => "vec",
            Self::F64 => "dvec",
            Self::Bool => "bvec",
        }
    }

    /// Decodes one component from little-endian bytes.
    fn decode(self, bytes: &[u8]) -> Scalar {
        let word = |n: usize| {
            let mut buf = [0u8; 8];
            buf[..n].copy_from_slice(&bytes[..n]);
            u64::from_le_bytes(buf)
        };
        match self {
            Self::Bool => Scalar::Bool(word(4) != 0),
            Self::I32 | Self::U32 | Self::F32 => Scalar::from_bits(self, word(4)),
            Self::I64 | Self::U64 | Self::F64 => Scalar::from_bits(self, word(8)),
        }
    }
}

/// Memory layout rules a buffer is declared with.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Uniform-buffer rules: every array element is padded to 16 bytes.
    Std140,
    Std430,
}

/// A scalar or vector data format, e.g. `u32`, `f64vec3` or `boolvec2`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Format {
    scalar: ScalarType,
    components: u8,
}

impl Format {
    /// # Panics
    ///
    /// If `components` is not in `1..=4`.
    pub const fn new(scalar: ScalarType, components: u8) -> Self {
        assert!(components >= 1 && components <= 4, "vectors have 1 to 4 components");
        Self { scalar, components }
    }

    pub const fn u32() -> Self {
        Self::new(ScalarType::U32, 1)
    }

    /// Every format the suite knows about, scalars first.
    pub fn all() -> impl Iterator<Item = Self> + Clone {
        ScalarType::ALL
            .into_iter()
            .flat_map(|scalar| (1..=4).map(move |components| Self::new(scalar, components)))
    }

    pub fn scalar(self) -> ScalarType {
        self.scalar
    }

    pub fn components(self) -> usize {
        usize::from(self.components)
    }

    pub fn is_vector(self) -> bool {
        self.components > 1
    }

    /// Byte size of one array element under `layout`.
    pub fn size(self, layout: Layout) -> usize {
        let width = self.scalar.width();
        let packed = match self.components {
            1 | 2 => self.components() * width,
            _ => 4 * width,
        };
        match layout {
            Layout::Std430 => packed,
            Layout::Std140 => packed.max(16),
        }
    }

    /// Same shape, different component type.
    pub fn with_scalar(self, scalar: ScalarType) -> Self {
        Self::new(scalar, self.components)
    }

    /// Stable name used in test paths, e.g. `u32vec2`.
    pub fn name(self) -> String {
        if self.is_vector() {
            format!("{}vec{}", self.scalar.name(), self.components)
        } else {
            self.scalar.name().to_string()
        }
    }

    /// GLSL type of a value in this format.
    pub fn glsl_type(self) -> String {
        if self.is_vector() {
            format!("{}{}", self.scalar.glsl_vector_prefix(), self.components)
        } else {
            self.scalar.glsl_scalar().to_string()
        }
    }

    /// GLSL type used to store this format in a buffer; booleans are stored
    /// as unsigned integers.
    pub fn glsl_storage_type(self) -> String {
        if self.scalar.is_bool() {
            self.with_scalar(ScalarType::U32).glsl_type()
        } else {
            self.glsl_type()
        }
    }

    /// WGSL type of this format, if WGSL can express it at all.
    pub fn wgsl_type(self) -> Option<String> {
        let scalar = match self.scalar {
            ScalarType::I32 => "i32",
            ScalarType::U32 => "u32",
            ScalarType::F32 => "f32",
            ScalarType::Bool => "bool",
            ScalarType::I64 | ScalarType::U64 | ScalarType::F64 => return None,
        };
        Some(if self.is_vector() {
            format!("vec{}<{scalar}>", self.components)
        } else {
            scalar.to_string()
        })
    }

    /// Decodes a tightly strided array of elements laid out per `layout`.
    pub fn decode_all(self, bytes: &[u8], layout: Layout) -> Vec<Value> {
        bytes
            .chunks_exact(self.size(layout))
            .map(|element| self.decode(element))
            .collect()
    }

    /// Decodes one element; trailing padding is ignored.
    pub fn decode(self, bytes: &[u8]) -> Value {
        let width = self.scalar.width();
        Value::new(
            (0..self.components())
                .map(|i| self.scalar.decode(&bytes[i * width..]))
                .collect(),
        )
    }

    /// Encodes one element padded to `self.size(layout)` bytes.
    pub fn encode(self, value: &Value, layout: Layout, out: &mut Vec<u8>) {
        let start = out.len();
        for scalar in value.components() {
            let bits = scalar.to_bits();
            out.extend_from_slice(&bits.to_le_bytes()[..self.scalar.width()]);
        }
        out.resize(start + self.size(layout), 0);
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::iproduct;

    #[test]
    fn format_list_can_be_paired() {
        let formats = Format::all();
        assert_eq!(formats.clone().count(), 28);
        assert_eq!(iproduct!(0..2, formats).filter(|(_, f)| f.is_vector()).count(), 42);
    }

    #[test]
    fn sizes_follow_buffer_layout_rules() {
        let f32x3 = Format::new(ScalarType::F32, 3);
        assert_eq!(f32x3.size(Layout::Std430), 16);
        assert_eq!(Format::new(ScalarType::F64, 3).size(Layout::Std430), 32);
        assert_eq!(Format::new(ScalarType::U32, 2).size(Layout::Std430), 8);
        assert_eq!(Format::u32().size(Layout::Std140), 16);
        assert_eq!(Format::new(ScalarType::F64, 4).size(Layout::Std140), 32);
    }

    #[test]
    fn there_are_twenty_eight_formats() {
        assert_eq!(Format::all().count(), 28);
    }

    #[test]
    fn type_names() {
        assert_eq!(Format::new(ScalarType::U64, 3).glsl_type(), "u64vec3");
        assert_eq!(Format::new(ScalarType::Bool, 2).glsl_type(), "bvec2");
        assert_eq!(Format::new(ScalarType::Bool, 2).glsl_storage_type(), "uvec2");
        assert_eq!(Format::new(ScalarType::F64, 1).glsl_type(), "double");
        assert_eq!(
            Format::new(ScalarType::F32, 4).wgsl_type().as_deref(),
            Some("vec4<f32>")
        );
        assert_eq!(Format::new(ScalarType::I64, 1).wgsl_type(), None);
        assert_eq!(Format::new(ScalarType::I32, 2).name(), "i32vec2");
    }

    #[test]
    fn encode_pads_and_decode_ignores_padding() {
        let format = Format::new(ScalarType::I32, 3);
        let value = Value::new(vec![Scalar::I32(-1), Scalar::I32(2), Scalar::I32(3)]);
        let mut bytes = Vec::new();
        format.encode(&value, Layout::Std430, &mut bytes);
        assert_eq!(bytes.len(), 16);
        assert_eq!(format.decode(&bytes), value);
    }

    #[test]
    fn nonzero_words_decode_as_true() {
        let format = Format::new(ScalarType::Bool, 2);
        let bytes: Vec<u8> = [0u32, 7].iter().flat_map(|w| w.to_le_bytes()).collect();
        assert_eq!(
            format.decode(&bytes),
            Value::new(vec![Scalar::Bool(false), Scalar::Bool(true)])
        );
    }
}
