//! Symbolic description of one test case.

use crate::error::{Error, Result};
use crate::format::Format;
use crate::op::Operation;
use crate::stage::{ShaderStage, ShaderStages};
use serde::{Deserialize, Serialize};

/// Where the operation runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageTarget {
    Compute,
    /// Every graphics stage the device supports, each writing its own result
    /// buffer, with the fragment stage reporting through the framebuffer.
    AllGraphics,
    /// One non-fragment graphics stage reporting through the framebuffer
    /// instead of a storage buffer.
    Framebuffer(ShaderStage),
}

impl StageTarget {
    pub const ALL: [Self; 6] = [
        Self::Compute,
        Self::AllGraphics,
        Self::Framebuffer(ShaderStage::Vertex),
        Self::Framebuffer(ShaderStage::TessControl),
        Self::Framebuffer(ShaderStage::TessEval),
        Self::Framebuffer(ShaderStage::Geometry),
    ];

    pub fn stages(self) -> ShaderStages {
        match self {
            Self::Compute => ShaderStages::COMPUTE,
            Self::AllGraphics => ShaderStages::ALL_GRAPHICS,
            Self::Framebuffer(stage) => stage.flag(),
        }
    }

    pub fn name(self) -> String {
        match self {
            Self::Compute => "compute".into(),
            Self::AllGraphics => "graphics".into(),
            Self::Framebuffer(stage) => format!("framebuffer/{}", stage.name()),
        }
    }
}

/// How results come back from the device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultMode {
    /// The shader compares against an in-shader emulation and writes one
    /// packed word of sub-check bits per invocation.
    CheckMask,
    /// The shader writes the raw operation result, checked on the host
    /// against the reference model.
    Values,
}

/// One check: an operation on a format, in some stages.
///
/// Only constructible through [`CaseDefinition::new`], which rejects
/// combinations that make no sense.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseDefinition {
    operation: Operation,
    format: Format,
    target: StageTarget,
    mode: ResultMode,
}

impl CaseDefinition {
    pub fn new(
        operation: Operation,
        format: Format,
        target: StageTarget,
        mode: ResultMode,
    ) -> Result<Self> {
        let invalid = |reason: String| {
            Error::InvalidCase(format!("{operation} on {format} ({}): {reason}", target.name()))
        };
        operation.supports(format).map_err(invalid)?;
        if let StageTarget::Framebuffer(stage) = target {
            if matches!(stage, ShaderStage::Fragment | ShaderStage::Compute) {
                return Err(invalid(format!("{stage} has no framebuffer fallback")));
            }
        }
        if mode == ResultMode::Values {
            if target != StageTarget::Compute {
                return Err(invalid("raw values are only collected from compute".into()));
            }
            if !operation.produces_value() {
                return Err(invalid("operation does not produce a value".into()));
            }
        }
        Ok(Self {
            operation,
            format,
            target,
            mode,
        })
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn target(&self) -> StageTarget {
        self.target
    }

    pub fn mode(&self) -> ResultMode {
        self.mode
    }

    /// Stable, path-like test name.
    pub fn name(&self) -> String {
        let mut name = format!(
            "{}/{}/{}/{}",
            self.operation.family(),
            self.operation.name(),
            self.format.name(),
            self.target.name()
        );
        if self.mode == ResultMode::Values {
            name.push_str("/values");
        }
        name
    }
}
