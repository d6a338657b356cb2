use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEval,
    Geometry,
    Fragment,
    Compute,
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const TESS_CONTROL = 1 << 1;
        const TESS_EVAL = 1 << 2;
        const GEOMETRY = 1 << 3;
        const FRAGMENT = 1 << 4;
        const COMPUTE = 1 << 5;

        const TESSELLATION = Self::TESS_CONTROL.bits() | Self::TESS_EVAL.bits();
        const ALL_GRAPHICS = Self::VERTEX.bits()
            | Self::TESSELLATION.bits()
            | Self::GEOMETRY.bits()
            | Self::FRAGMENT.bits();
    }
}

impl ShaderStage {
    /// Graphics stages in pipeline order.
    pub const GRAPHICS: [Self; 5] = [
        Self::Vertex,
        Self::TessControl,
        Self::TessEval,
        Self::Geometry,
        Self::Fragment,
    ];

    /// Short name used for program-set keys and dumped shader files.
    pub fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::TessControl => "tesc",
            Self::TessEval => "tese",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
            Self::Compute => "comp",
        }
    }

    pub fn flag(self) -> ShaderStages {
        match self {
            Self::Vertex => ShaderStages::VERTEX,
            Self::TessControl => ShaderStages::TESS_CONTROL,
            Self::TessEval => ShaderStages::TESS_EVAL,
            Self::Geometry => ShaderStages::GEOMETRY,
            Self::Fragment => ShaderStages::FRAGMENT,
            Self::Compute => ShaderStages::COMPUTE,
        }
    }

    /// Result buffer binding when every graphics stage writes its own buffer
    /// inside one draw. Compute and fragment results use binding 0 and the
    /// color attachment respectively.
    pub fn result_binding(self) -> u32 {
        match self {
            Self::Vertex | Self::Compute | Self::Fragment => 0,
            Self::TessControl => 1,
            Self::TessEval => 2,
            Self::Geometry => 3,
        }
    }

    /// Stages a pipeline must also contain for this stage to run.
    pub fn required_stages(self) -> ShaderStages {
        match self {
            Self::TessControl | Self::TessEval => ShaderStages::VERTEX | ShaderStages::TESSELLATION,
            Self::Geometry | Self::Fragment => ShaderStages::VERTEX,
            Self::Vertex | Self::Compute => ShaderStages::empty(),
        }
    }
}

impl ShaderStages {
    /// Iterates the contained stages in pipeline order, compute last.
    pub fn stages(self) -> impl Iterator<Item = ShaderStage> {
        ShaderStage::GRAPHICS
            .into_iter()
            .chain([ShaderStage::Compute])
            .filter(move |s| self.contains(s.flag()))
    }
}

impl From<ShaderStage> for ShaderStages {
    fn from(stage: ShaderStage) -> Self {
        stage.flag()
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tessellation_stages_come_in_pairs() {
        assert!(
            ShaderStage::TessEval
                .required_stages()
                .contains(ShaderStages::TESS_CONTROL)
        );
        assert!(
            ShaderStage::TessControl
                .required_stages()
                .contains(ShaderStages::TESS_EVAL)
        );
    }

    #[test]
    fn stages_iterate_in_pipeline_order() {
        let stages: Vec<_> = (ShaderStages::FRAGMENT | ShaderStages::VERTEX | ShaderStages::COMPUTE)
            .stages()
            .collect();
        assert_eq!(
            stages,
            [ShaderStage::Vertex, ShaderStage::Fragment, ShaderStage::Compute]
        );
    }

    #[test]
    fn result_bindings_are_distinct_for_buffer_stages() {
        let bindings: Vec<_> = [
            ShaderStage::Vertex,
            ShaderStage::TessControl,
            ShaderStage::TessEval,
            ShaderStage::Geometry,
        ]
        .map(ShaderStage::result_binding)
        .to_vec();
        assert_eq!(bindings, [0, 1, 2, 3]);
    }
}
