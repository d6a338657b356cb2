//! Input buffers uploaded before a job runs.

use crate::format::{Format, Layout, ScalarType};
use crate::stage::ShaderStages;
use crate::value::Value;
use rand::rngs::StdRng;
use rand::{Rng, RngCore};

/// How an input buffer is filled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InitPolicy {
    Zero,
    /// Pseudo-random data: random words for integers, `[0, 1)` for floats,
    /// and for booleans a random word when it is odd, zero otherwise.
    NonZero,
    /// Like `NonZero`, but every seventh float component is a quiet NaN.
    NonZeroWithSpecials,
    /// Random `u32` indices below `modulus`.
    Indices { modulus: u32 },
    /// The shader must not depend on the contents; filled with zeros so runs
    /// stay reproducible.
    Uninitialized,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InputKind {
    Buffer,
    Uniform,
}

/// One GPU-visible input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputData {
    pub name: &'static str,
    pub format: Format,
    pub count: usize,
    pub init: InitPolicy,
    pub binding: u32,
    pub stages: ShaderStages,
    pub kind: InputKind,
}

impl InputData {
    /// Uniform buffers use std140; storage buffers std430.
    pub fn layout(&self) -> Layout {
        match self.kind {
            InputKind::Uniform => Layout::Std140,
            InputKind::Buffer => Layout::Std430,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.count * self.format.size(self.layout())
    }

    /// Produces the buffer contents, drawing from `rng` for random policies.
    pub fn initialize(&self, rng: &mut StdRng) -> Vec<u8> {
        let layout = self.layout();
        let mut bytes = Vec::with_capacity(self.byte_size());
        let mut component = 0usize;
        for _ in 0..self.count {
            let start = bytes.len();
            for _ in 0..self.format.components() {
                let bits = self.random_component(rng, component);
                component += 1;
                bytes.extend_from_slice(&bits.to_le_bytes()[..self.format.scalar().width()]);
            }
            bytes.resize(start + self.format.size(layout), 0);
        }
        bytes
    }

    fn random_component(&self, rng: &mut StdRng, index: usize) -> u64 {
        let scalar = self.format.scalar();
        match self.init {
            InitPolicy::Zero | InitPolicy::Uninitialized => 0,
            InitPolicy::Indices { modulus } => u64::from(rng.next_u32() % modulus.max(1)),
            InitPolicy::NonZeroWithSpecials if scalar.is_float() && index % 7 == 3 => match scalar {
                ScalarType::F64 => f64::NAN.to_bits(),
                _ => u64::from(f32::NAN.to_bits()),
            },
            InitPolicy::NonZero | InitPolicy::NonZeroWithSpecials => match scalar {
                ScalarType::Bool => {
                    let r = rng.next_u32();
                    u64::from(if r & 1 != 0 { r } else { 0 })
                }
                ScalarType::I32 | ScalarType::U32 => u64::from(rng.next_u32()),
                ScalarType::I64 | ScalarType::U64 => rng.next_u64(),
                ScalarType::F32 => u64::from(rng.gen_range(0.0f32..1.0).to_bits()),
                ScalarType::F64 => rng.gen_range(0.0f64..1.0).to_bits(),
            },
        }
    }

    /// Decodes uploaded contents back into values, one per element.
    pub fn values(&self, bytes: &[u8]) -> Vec<Value> {
        self.format.decode_all(bytes, self.layout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Scalar;
    use rand::SeedableRng;

    fn input(format: Format, init: InitPolicy, kind: InputKind) -> InputData {
        InputData {
            name: "data",
            format,
            count: 64,
            init,
            binding: 1,
            stages: ShaderStages::COMPUTE,
            kind,
        }
    }

    #[test]
    fn same_seed_same_data() {
        let data = input(Format::new(ScalarType::F32, 3), InitPolicy::NonZero, InputKind::Buffer);
        let a = data.initialize(&mut StdRng::seed_from_u64(7));
        let b = data.initialize(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64 * 16);
    }

    #[test]
    fn floats_are_in_unit_interval() {
        let data = input(Format::new(ScalarType::F64, 2), InitPolicy::NonZero, InputKind::Buffer);
        let bytes = data.initialize(&mut StdRng::seed_from_u64(1));
        for value in data.values(&bytes) {
            for c in value.components() {
                let Scalar::F64(v) = *c else { panic!("wrong type {c:?}") };
                assert!((0.0..1.0).contains(&v));
            }
        }
    }

    #[test]
    fn specials_include_nans() {
        let data = input(
            Format::new(ScalarType::F32, 1),
            InitPolicy::NonZeroWithSpecials,
            InputKind::Buffer,
        );
        let bytes = data.initialize(&mut StdRng::seed_from_u64(1));
        let values = data.values(&bytes);
        assert!(values[3].components()[0].is_nan());
        assert!(!values[4].components()[0].is_nan());
    }

    #[test]
    fn uniform_layout_pads_elements() {
        let data = input(Format::u32(), InitPolicy::Zero, InputKind::Uniform);
        assert_eq!(data.byte_size(), 64 * 16);
        assert!(data.initialize(&mut StdRng::seed_from_u64(0)).iter().all(|&b| b == 0));
    }

    #[test]
    fn indices_stay_below_modulus() {
        let data = input(Format::u32(), InitPolicy::Indices { modulus: 5 }, InputKind::Buffer);
        let bytes = data.initialize(&mut StdRng::seed_from_u64(3));
        let indices: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes);
        assert!(indices.iter().all(|&i| i < 5));
    }
}
