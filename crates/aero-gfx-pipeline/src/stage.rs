//! API shader stages and the hardware stages they execute on.

use std::fmt;

use bitflags::bitflags;

use crate::regs::StageShRegs;

bitflags! {
    /// API-level shader stages present in a pipeline.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const HULL = 1 << 1;
        const DOMAIN = 1 << 2;
        const GEOMETRY = 1 << 3;
        const PIXEL = 1 << 4;
    }
}

impl ShaderStageFlags {
    pub fn tess_enabled(self) -> bool {
        self.contains(Self::HULL | Self::DOMAIN)
    }

    pub fn gs_enabled(self) -> bool {
        self.contains(Self::GEOMETRY)
    }
}

/// API shader type, used for per-stage queries such as shader statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApiShaderType {
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
}

/// Hardware shader stages, in the order the geometry pipeline executes them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HwShaderStage {
    Ls = 0,
    Hs = 1,
    Es = 2,
    Gs = 3,
    Vs = 4,
    Ps = 5,
}

pub const NUM_HW_STAGES: usize = 6;

impl HwShaderStage {
    pub const ALL: [HwShaderStage; NUM_HW_STAGES] = [
        HwShaderStage::Ls,
        HwShaderStage::Hs,
        HwShaderStage::Es,
        HwShaderStage::Gs,
        HwShaderStage::Vs,
        HwShaderStage::Ps,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn sh_regs(self) -> StageShRegs {
        match self {
            HwShaderStage::Ls => StageShRegs::LS,
            HwShaderStage::Hs => StageShRegs::HS,
            HwShaderStage::Es => StageShRegs::ES,
            HwShaderStage::Gs => StageShRegs::GS,
            HwShaderStage::Vs => StageShRegs::VS,
            HwShaderStage::Ps => StageShRegs::PS,
        }
    }

    pub const fn flag(self) -> HwStageMask {
        HwStageMask::from_bits_truncate(1 << self as u32)
    }
}

impl fmt::Display for HwShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HwShaderStage::Ls => "LS",
            HwShaderStage::Hs => "HS",
            HwShaderStage::Es => "ES",
            HwShaderStage::Gs => "GS",
            HwShaderStage::Vs => "VS",
            HwShaderStage::Ps => "PS",
        };
        f.write_str(s)
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct HwStageMask: u32 {
        const LS = 1 << 0;
        const HS = 1 << 1;
        const ES = 1 << 2;
        const GS = 1 << 3;
        const VS = 1 << 4;
        const PS = 1 << 5;
    }
}

impl HwStageMask {
    pub fn stages(self) -> impl Iterator<Item = HwShaderStage> {
        HwShaderStage::ALL
            .into_iter()
            .filter(move |stage| self.contains(stage.flag()))
    }
}

/// Hardware stages that must carry code for the given API stage set.
///
/// With a geometry shader the hardware VS stage runs the GS copy shader, so it is required even
/// though no API stage maps onto it directly.
pub fn hw_stages_for(api: ShaderStageFlags) -> HwStageMask {
    let mut mask = HwStageMask::empty();
    let tess = api.tess_enabled();
    let gs = api.gs_enabled();

    if api.contains(ShaderStageFlags::VERTEX) {
        mask |= if tess {
            HwStageMask::LS
        } else if gs {
            HwStageMask::ES
        } else {
            HwStageMask::VS
        };
    }
    if tess {
        mask |= HwStageMask::HS;
        mask |= if gs { HwStageMask::ES } else { HwStageMask::VS };
    }
    if gs {
        mask |= HwStageMask::GS | HwStageMask::VS;
    }
    if api.contains(ShaderStageFlags::PIXEL) {
        mask |= HwStageMask::PS;
    }
    mask
}

/// The hardware stage that executes `api` for the given stage set, if that API stage is present.
pub fn hw_stage_for_api(api_stages: ShaderStageFlags, api: ApiShaderType) -> Option<HwShaderStage> {
    let tess = api_stages.tess_enabled();
    let gs = api_stages.gs_enabled();
    let stage = match api {
        ApiShaderType::Vertex if api_stages.contains(ShaderStageFlags::VERTEX) => {
            if tess {
                HwShaderStage::Ls
            } else if gs {
                HwShaderStage::Es
            } else {
                HwShaderStage::Vs
            }
        }
        ApiShaderType::Hull if tess => HwShaderStage::Hs,
        ApiShaderType::Domain if tess => {
            if gs {
                HwShaderStage::Es
            } else {
                HwShaderStage::Vs
            }
        }
        ApiShaderType::Geometry if gs => HwShaderStage::Gs,
        ApiShaderType::Pixel if api_stages.contains(ShaderStageFlags::PIXEL) => HwShaderStage::Ps,
        _ => return None,
    };
    Some(stage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vs_ps_pipeline_uses_hw_vs_and_ps() {
        let mask = hw_stages_for(ShaderStageFlags::VERTEX | ShaderStageFlags::PIXEL);
        assert_eq!(mask, HwStageMask::VS | HwStageMask::PS);
    }

    #[test]
    fn tess_gs_pipeline_uses_every_hw_stage() {
        let mask = hw_stages_for(ShaderStageFlags::all());
        assert_eq!(mask, HwStageMask::all());
        assert_eq!(
            hw_stage_for_api(ShaderStageFlags::all(), ApiShaderType::Domain),
            Some(HwShaderStage::Es)
        );
    }

    #[test]
    fn gs_pipeline_runs_vertex_shader_on_es() {
        let api = ShaderStageFlags::VERTEX | ShaderStageFlags::GEOMETRY | ShaderStageFlags::PIXEL;
        assert_eq!(
            hw_stages_for(api),
            HwStageMask::ES | HwStageMask::GS | HwStageMask::VS | HwStageMask::PS
        );
        assert_eq!(hw_stage_for_api(api, ApiShaderType::Vertex), Some(HwShaderStage::Es));
        assert_eq!(hw_stage_for_api(api, ApiShaderType::Hull), None);
    }

    #[test]
    fn stage_mask_iterates_in_pipeline_order() {
        let stages: Vec<_> = (HwStageMask::PS | HwStageMask::LS | HwStageMask::HS)
            .stages()
            .collect();
        assert_eq!(
            stages,
            vec![HwShaderStage::Ls, HwShaderStage::Hs, HwShaderStage::Ps]
        );
    }
}
