use crate::format::{Format, ScalarType};
use std::fmt;

/// One component of a [`Value`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Scalar {
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
}

impl Scalar {
    /// Reinterprets the low bits of `bits` as a component of type `ty`.
    pub fn from_bits(ty: ScalarType, bits: u64) -> Self {
        match ty {
            ScalarType::I32 => Self::I32(bits as u32 as i32),
            ScalarType::U32 => Self::U32(bits as u32),
            ScalarType::I64 => Self::I64(bits as i64),
            ScalarType::U64 => Self::U64(bits),
            ScalarType::F32 => Self::F32(f32::from_bits(bits as u32)),
            ScalarType::F64 => Self::F64(f64::from_bits(bits)),
            ScalarType::Bool => Self::Bool(bits != 0),
        }
    }

    pub fn to_bits(self) -> u64 {
        match self {
            Self::I32(v) => u64::from(v as u32),
            Self::U32(v) => u64::from(v),
            Self::I64(v) => v as u64,
            Self::U64(v) => v,
            Self::F32(v) => u64::from(v.to_bits()),
            Self::F64(v) => v.to_bits(),
            Self::Bool(v) => u64::from(v),
        }
    }

    pub fn scalar_type(self) -> ScalarType {
        match self {
            Self::I32(_) => ScalarType::I32,
            Self::U32(_) => ScalarType::U32,
            Self::I64(_) => ScalarType::I64,
            Self::U64(_) => ScalarType::U64,
            Self::F32(_) => ScalarType::F32,
            Self::F64(_) => ScalarType::F64,
            Self::Bool(_) => ScalarType::Bool,
        }
    }

    pub fn is_nan(self) -> bool {
        match self {
            Self::F32(v) => v.is_nan(),
            Self::F64(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Floating-point view of the component, used for tolerance checks.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::I32(v) => f64::from(v),
            Self::U32(v) => f64::from(v),
            Self::I64(v) => v as f64,
            Self::U64(v) => v as f64,
            Self::F32(v) => f64::from(v),
            Self::F64(v) => v,
            Self::Bool(v) => f64::from(u8::from(v)),
        }
    }

    /// Equality where NaN matches any NaN and everything else compares by
    /// value.
    pub fn same(self, other: Self) -> bool {
        (self.is_nan() && other.is_nan()) || self == other
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v:?}"),
            Self::F64(v) => write!(f, "{v:?}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// A scalar or vector value; all components share one [`ScalarType`].
#[derive(Clone, Debug, PartialEq)]
pub struct Value(Vec<Scalar>);

impl Value {
    /// # Panics
    ///
    /// If `components` is empty or mixes component types.
    pub fn new(components: Vec<Scalar>) -> Self {
        assert!(!components.is_empty(), "a value needs at least one component");
        let ty = components[0].scalar_type();
        assert!(
            components.iter().all(|c| c.scalar_type() == ty),
            "mixed component types in {components:?}"
        );
        Self(components)
    }

    pub fn splat(scalar: Scalar, format: Format) -> Self {
        Self(vec![scalar; format.components()])
    }

    pub fn components(&self) -> &[Scalar] {
        &self.0
    }

    pub fn format(&self) -> Format {
        Format::new(self.0[0].scalar_type(), self.0.len() as u8)
    }

    /// Componentwise application of `f`.
    pub fn zip_with(&self, other: &Self, mut f: impl FnMut(Scalar, Scalar) -> Scalar) -> Self {
        assert_eq!(self.0.len(), other.0.len(), "component count mismatch");
        Self::new(self.0.iter().zip(&other.0).map(|(&a, &b)| f(a, b)).collect())
    }

    /// Componentwise [`Scalar::same`].
    pub fn same(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a.same(*b))
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        Self(vec![scalar])
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [scalar] = self.0.as_slice() {
            return scalar.fmt(f);
        }
        f.write_str("(")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            c.fmt(f)?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_round_trip_signed() {
        let s = Scalar::from_bits(ScalarType::I32, 0xffff_ffff);
        assert_eq!(s, Scalar::I32(-1));
        assert_eq!(s.to_bits(), 0xffff_ffff);
    }

    #[test]
    fn nan_is_same_as_nan() {
        assert!(Scalar::F32(f32::NAN).same(Scalar::F32(-f32::NAN)));
        assert!(!Scalar::F32(f32::NAN).same(Scalar::F32(1.0)));
    }

    #[test]
    fn display() {
        let v = Value::new(vec![Scalar::F32(1.0), Scalar::F32(-2.5)]);
        assert_eq!(v.to_string(), "(1.0, -2.5)");
        assert_eq!(Value::from(Scalar::U32(7)).to_string(), "7");
    }
}
