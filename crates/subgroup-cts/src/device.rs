//! The boundary to the driver and its shader compiler.
//!
//! A [`Device`] compiles the sources of a job, runs it once, waits for the
//! queue to go idle and hands back the buffer contents. Everything else, from
//! capability checks to result comparison, happens on this side.

use crate::codegen::{Dialect, ShaderProgramSet};
use crate::features::DeviceCapabilities;
use crate::stage::ShaderStage;
use thiserror::Error;

/// How a job binds one of its buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Written by the shaders and read back after the job.
    Storage,
    StorageReadOnly,
    Uniform,
}

/// Configuration for one buffer of a job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferSpec {
    pub binding: u32,
    pub usage: BufferUsage,
    pub size: u64,
    /// Zero-filled when `None`.
    pub contents: Option<Vec<u8>>,
}

impl BufferSpec {
    pub fn output(binding: u32, size: u64) -> Self {
        Self {
            binding,
            usage: BufferUsage::Storage,
            size,
            contents: None,
        }
    }

    pub fn input(binding: u32, usage: BufferUsage, contents: Vec<u8>) -> Self {
        Self {
            binding,
            usage,
            size: contents.len() as u64,
            contents: Some(contents),
        }
    }
}

/// Primitive assembly of a draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    Points,
    Patches { control_points: u32 },
}

/// One compute dispatch.
#[derive(Clone, Debug)]
pub struct ComputeJob<'a> {
    pub programs: &'a ShaderProgramSet,
    pub workgroups: [u32; 3],
    pub buffers: Vec<BufferSpec>,
}

/// One draw into a `framebuffer_width` x 1 `R32Uint` attachment cleared to
/// zero.
#[derive(Clone, Debug)]
pub struct GraphicsJob<'a> {
    pub programs: &'a ShaderProgramSet,
    pub vertex_count: u32,
    pub topology: Topology,
    pub buffers: Vec<BufferSpec>,
    pub framebuffer_width: u32,
}

/// What comes back from a draw.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphicsReadback {
    /// Contents of every buffer, in job order.
    pub buffers: Vec<Vec<u8>>,
    /// One word per attachment pixel.
    pub framebuffer: Vec<u32>,
}

#[derive(Debug, Error)]
pub enum DeviceError {
    /// The compiler or validator rejected a generated shader.
    #[error("{stage} shader failed to compile:\n{diagnostic}")]
    Compile {
        stage: ShaderStage,
        diagnostic: String,
    },
    /// The job needs something the device did not advertise.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// The job ran but something went wrong, e.g. a buffer could not be
    /// mapped.
    #[error("execution failed: {0}")]
    Execution(String),
    /// The device is gone; nothing else can run on it.
    #[error("device lost: {0}")]
    Lost(String),
}

/// A driver running generated shaders synchronously.
///
/// Implementations must not overlap submissions: each call returns only after
/// the device is idle again.
pub trait Device {
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Source language the device compiles.
    fn dialect(&self) -> Dialect;

    /// Runs a compute job and returns the contents of every buffer, in job
    /// order.
    fn dispatch(&self, job: &ComputeJob<'_>) -> Result<Vec<Vec<u8>>, DeviceError>;

    fn draw(&self, job: &GraphicsJob<'_>) -> Result<GraphicsReadback, DeviceError>;
}

impl<D: Device + ?Sized> Device for &D {
    fn capabilities(&self) -> &DeviceCapabilities {
        (**self).capabilities()
    }

    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn dispatch(&self, job: &ComputeJob<'_>) -> Result<Vec<Vec<u8>>, DeviceError> {
        (**self).dispatch(job)
    }

    fn draw(&self, job: &GraphicsJob<'_>) -> Result<GraphicsReadback, DeviceError> {
        (**self).draw(job)
    }
}
