//! Values that depend on state only known when a pipeline is bound or a draw is recorded.

use crate::caps::GpuCapabilities;
use crate::create_info::{
    ChannelMask, ColorBlendState, ColorFormat, CompareFunc, DepthStencilState,
    DepthStencilViewInfo,
};
use crate::regs::{
    CbTargetMask, PaScModeCntl1, SxBlendOptControl, SxBlendOptEpsilon, SxPsDownconvert,
    MAX_COLOR_TARGETS, WAVE_LIMIT_MAX,
};
use crate::settings::OutOfOrderPrimMode;
use crate::stage::{hw_stage_for_api, ApiShaderType, HwShaderStage, ShaderStageFlags, NUM_HW_STAGES};

/// Whether the command processor may retire primitives of the next draw out of submission order.
///
/// The pipeline-level enable bit cached in `PA_SC_MODE_CNTL_1` gates everything. Beyond that, any
/// state whose visible result depends on primitive order makes the draw ineligible.
pub fn can_draw_prims_out_of_order(
    pa_sc_mode_cntl_1: PaScModeCntl1,
    ds_view: Option<&DepthStencilViewInfo>,
    ds_state: Option<&DepthStencilState>,
    blend: Option<&ColorBlendState>,
    target_mask: CbTargetMask,
    has_active_queries: bool,
    mode: OutOfOrderPrimMode,
) -> bool {
    if pa_sc_mode_cntl_1.out_of_order_primitive_enable() == 0
        || mode == OutOfOrderPrimMode::Disable
        || has_active_queries
    {
        return false;
    }
    if mode == OutOfOrderPrimMode::Always {
        return true;
    }

    let view = ds_view.copied().unwrap_or_default();
    let ds = ds_state.copied().unwrap_or_default();

    if (ds.depth_enable && !view.has_depth) || (ds.stencil_enable && !view.has_stencil) {
        return false;
    }

    let depth_write = ds.depth_writes() && !view.read_only_depth;
    let stencil_write = ds.stencil_writes() && !view.read_only_stencil;
    let color_write = target_mask.0 != 0;

    if depth_write || stencil_write {
        return mode == OutOfOrderPrimMode::Aggressive
            && !stencil_write
            && !color_write
            && matches!(
                ds.depth_func,
                CompareFunc::Less
                    | CompareFunc::LessEqual
                    | CompareFunc::Greater
                    | CompareFunc::GreaterEqual
            );
    }

    let blend = blend.copied().unwrap_or_default();
    (0..MAX_COLOR_TARGETS)
        .filter(|&slot| target_mask.target(slot) != 0)
        .all(|slot| {
            let target = blend.target(slot);
            target.blend_enable && target.color.is_commutative() && target.alpha.is_commutative()
        })
}

/// Converts a waves-per-CU hint into `SPI_SHADER_PGM_RSRC3_*.WAVE_LIMIT` (units of 16 waves per SH).
///
/// Zero means "no limit" both as input and as output.
pub fn calc_max_waves_per_sh(max_waves_per_cu: u32, caps: &GpuCapabilities) -> u32 {
    if max_waves_per_cu == 0 {
        return 0;
    }
    const SIMDS_PER_CU: u32 = 4;
    const WAVE_LIMIT_GRANULARITY: u32 = 16;

    let hw_max = (SIMDS_PER_CU
        .saturating_mul(caps.waves_per_simd)
        .saturating_mul(caps.cu_per_sh)
        / WAVE_LIMIT_GRANULARITY)
        .max(1);
    let requested = (max_waves_per_cu.saturating_mul(caps.cu_per_sh) / WAVE_LIMIT_GRANULARITY).max(1);
    requested.min(hw_max).min(WAVE_LIMIT_MAX)
}

// -------------------------------------------------------------------------------------------------
// RB+
// -------------------------------------------------------------------------------------------------

pub const SX_RT_EXPORT_NO_CONVERSION: u8 = 0;
pub const SX_RT_EXPORT_32_R: u8 = 1;
pub const SX_RT_EXPORT_32_A: u8 = 2;
pub const SX_RT_EXPORT_10_11_11: u8 = 3;
pub const SX_RT_EXPORT_2_10_10_10: u8 = 4;
pub const SX_RT_EXPORT_8_8_8_8: u8 = 5;
pub const SX_RT_EXPORT_5_6_5: u8 = 6;
pub const SX_RT_EXPORT_1_5_5_5: u8 = 7;
pub const SX_RT_EXPORT_4_4_4_4: u8 = 8;
pub const SX_RT_EXPORT_16_16_GR: u8 = 9;
pub const SX_RT_EXPORT_16_16_AR: u8 = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RbPlusRegisters {
    pub sx_ps_downconvert: SxPsDownconvert,
    pub sx_blend_opt_epsilon: SxBlendOptEpsilon,
    pub sx_blend_opt_control: SxBlendOptControl,
}

/// Export down-conversion for one target. Channels outside `write_mask` never affect the choice.
pub fn sx_down_convert_format(format: ColorFormat, write_mask: ChannelMask) -> u8 {
    let written = write_mask & format.channels();
    if written.is_empty() {
        return SX_RT_EXPORT_NO_CONVERSION;
    }

    match format {
        ColorFormat::R10G10B10A2Unorm => return SX_RT_EXPORT_2_10_10_10,
        ColorFormat::R11G11B10Float => return SX_RT_EXPORT_10_11_11,
        ColorFormat::B5G6R5Unorm => return SX_RT_EXPORT_5_6_5,
        ColorFormat::B5G5R5A1Unorm => return SX_RT_EXPORT_1_5_5_5,
        ColorFormat::B4G4R4A4Unorm => return SX_RT_EXPORT_4_4_4_4,
        _ => {}
    }

    let integer = format.numeric().is_integer();
    match format.max_channel_bits() {
        8 if !integer => SX_RT_EXPORT_8_8_8_8,
        16 if !integer => {
            if (ChannelMask::R | ChannelMask::G).contains(written) {
                SX_RT_EXPORT_16_16_GR
            } else if (ChannelMask::R | ChannelMask::A).contains(written) {
                SX_RT_EXPORT_16_16_AR
            } else {
                SX_RT_EXPORT_NO_CONVERSION
            }
        }
        32 if written == ChannelMask::R => SX_RT_EXPORT_32_R,
        32 if written == ChannelMask::A => SX_RT_EXPORT_32_A,
        _ => SX_RT_EXPORT_NO_CONVERSION,
    }
}

/// Blend optimization epsilon matching the precision of a down-converted export.
pub fn sx_blend_opt_epsilon(down_convert: u8) -> u8 {
    match down_convert {
        SX_RT_EXPORT_2_10_10_10 => 3,
        SX_RT_EXPORT_8_8_8_8 => 6,
        SX_RT_EXPORT_5_6_5 => 11,
        SX_RT_EXPORT_1_5_5_5 => 13,
        SX_RT_EXPORT_4_4_4_4 => 15,
        _ => 0,
    }
}

/// Blend optimizations must be off for any component the shader does not write.
pub fn sx_blend_opt_control(write_mask: ChannelMask) -> u8 {
    let mut control = 0;
    if !write_mask.intersects(ChannelMask::RGB) {
        control |= SxBlendOptControl::COLOR_OPT_DISABLE;
    }
    if !write_mask.contains(ChannelMask::A) {
        control |= SxBlendOptControl::ALPHA_OPT_DISABLE;
    }
    control
}

/// Programs the three RB+ registers for one color-target slot, leaving other slots untouched.
pub fn setup_rb_plus_registers_for_slot(
    slot: usize,
    write_mask: ChannelMask,
    format: Option<ColorFormat>,
    regs: &mut RbPlusRegisters,
) {
    debug_assert!(slot < MAX_COLOR_TARGETS);
    let (down_convert, write_mask) = match format {
        Some(format) => {
            let written = write_mask & format.channels();
            (sx_down_convert_format(format, written), written)
        }
        None => (SX_RT_EXPORT_NO_CONVERSION, ChannelMask::empty()),
    };

    regs.sx_ps_downconvert.set_target(slot, down_convert);
    regs.sx_blend_opt_epsilon
        .set_target(slot, sx_blend_opt_epsilon(down_convert));
    regs.sx_blend_opt_control
        .set_target(slot, sx_blend_opt_control(write_mask));
}

// -------------------------------------------------------------------------------------------------
// Per-draw shader overrides
// -------------------------------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DynamicShaderInfo {
    /// Waves-per-CU occupancy hint; zero leaves occupancy unrestricted.
    pub max_waves_per_cu: u32,
    /// CU enable mask; zero means every CU.
    pub cu_enable_mask: u32,
}

/// Overrides supplied with a bind call, one per API stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DynamicGraphicsShaderInfos {
    pub vs: DynamicShaderInfo,
    pub hs: DynamicShaderInfo,
    pub ds: DynamicShaderInfo,
    pub gs: DynamicShaderInfo,
    pub ps: DynamicShaderInfo,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DynamicStageInfo {
    pub wave_limit: u32,
    pub cu_enable_mask: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DynamicStageInfos {
    pub stages: [DynamicStageInfo; NUM_HW_STAGES],
}

impl DynamicStageInfos {
    pub fn stage(&self, stage: HwShaderStage) -> DynamicStageInfo {
        self.stages[stage.index()]
    }
}

/// Maps API-stage overrides onto the hardware stages that run them.
pub fn calc_dynamic_stage_infos(
    api_stages: ShaderStageFlags,
    infos: &DynamicGraphicsShaderInfos,
    caps: &GpuCapabilities,
) -> DynamicStageInfos {
    let mut out = DynamicStageInfos::default();
    for (api, info) in [
        (ApiShaderType::Vertex, infos.vs),
        (ApiShaderType::Hull, infos.hs),
        (ApiShaderType::Domain, infos.ds),
        (ApiShaderType::Geometry, infos.gs),
        (ApiShaderType::Pixel, infos.ps),
    ] {
        if let Some(stage) = hw_stage_for_api(api_stages, api) {
            out.stages[stage.index()] = DynamicStageInfo {
                wave_limit: calc_max_waves_per_sh(info.max_waves_per_cu, caps),
                cu_enable_mask: info.cu_enable_mask,
            };
        }
    }
    // The GS copy shader on the hardware VS stage inherits the geometry shader's limits.
    if api_stages.gs_enabled() {
        out.stages[HwShaderStage::Vs.index()] = out.stages[HwShaderStage::Gs.index()];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::GfxIpLevel;
    use crate::create_info::{BlendEquation, BlendFactor, BlendOp, TargetBlendState};

    fn ooo_enabled() -> PaScModeCntl1 {
        let mut reg = PaScModeCntl1::default();
        reg.set_out_of_order_primitive_enable(1);
        reg
    }

    fn additive_blend() -> ColorBlendState {
        let additive = BlendEquation {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
            op: BlendOp::Add,
        };
        ColorBlendState {
            targets: [TargetBlendState {
                blend_enable: true,
                color: additive,
                alpha: additive,
            }; MAX_COLOR_TARGETS],
        }
    }

    fn rt0_mask() -> CbTargetMask {
        let mut mask = CbTargetMask::default();
        mask.set_target(0, 0xF);
        mask
    }

    #[test]
    fn pipeline_bit_gates_everything() {
        assert!(!can_draw_prims_out_of_order(
            PaScModeCntl1::default(),
            None,
            None,
            None,
            CbTargetMask::default(),
            false,
            OutOfOrderPrimMode::Always,
        ));
    }

    #[test]
    fn commutative_blending_without_depth_writes_is_eligible() {
        let blend = additive_blend();
        let eligible = |queries| {
            can_draw_prims_out_of_order(
                ooo_enabled(),
                None,
                None,
                Some(&blend),
                rt0_mask(),
                queries,
                OutOfOrderPrimMode::Safe,
            )
        };
        assert!(eligible(false));
        assert!(!eligible(true));
    }

    #[test]
    fn replacing_writes_are_order_dependent() {
        assert!(!can_draw_prims_out_of_order(
            ooo_enabled(),
            None,
            None,
            Some(&ColorBlendState::default()),
            rt0_mask(),
            false,
            OutOfOrderPrimMode::Safe,
        ));
    }

    #[test]
    fn depth_only_pass_needs_aggressive_mode() {
        let view = DepthStencilViewInfo {
            has_depth: true,
            ..DepthStencilViewInfo::default()
        };
        let ds = DepthStencilState {
            depth_enable: true,
            depth_write_enable: true,
            depth_func: CompareFunc::LessEqual,
            ..DepthStencilState::default()
        };
        let check = |mode| {
            can_draw_prims_out_of_order(
                ooo_enabled(),
                Some(&view),
                Some(&ds),
                None,
                CbTargetMask::default(),
                false,
                mode,
            )
        };
        assert!(!check(OutOfOrderPrimMode::Safe));
        assert!(check(OutOfOrderPrimMode::Aggressive));

        let read_only = DepthStencilViewInfo {
            read_only_depth: true,
            ..view
        };
        assert!(can_draw_prims_out_of_order(
            ooo_enabled(),
            Some(&read_only),
            Some(&ds),
            None,
            CbTargetMask::default(),
            false,
            OutOfOrderPrimMode::Safe,
        ));
    }

    #[test]
    fn depth_test_without_depth_aspect_is_ineligible() {
        let ds = DepthStencilState {
            depth_enable: true,
            ..DepthStencilState::default()
        };
        assert!(!can_draw_prims_out_of_order(
            ooo_enabled(),
            None,
            Some(&ds),
            None,
            CbTargetMask::default(),
            false,
            OutOfOrderPrimMode::Aggressive,
        ));
    }

    #[test]
    fn wave_limit_scales_and_clamps() {
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx8);
        assert_eq!(calc_max_waves_per_sh(0, &caps), 0);
        // 8 CUs * 4 waves = 32 waves per SH = 2 units of 16.
        assert_eq!(calc_max_waves_per_sh(4, &caps), 2);
        assert_eq!(calc_max_waves_per_sh(1, &caps), 1);
        // Hardware maximum: 4 SIMDs * 10 waves * 8 CUs / 16 = 20.
        assert_eq!(calc_max_waves_per_sh(u32::MAX, &caps), 20);

        let mut huge = caps;
        huge.cu_per_sh = 1000;
        assert_eq!(calc_max_waves_per_sh(u32::MAX, &huge), WAVE_LIMIT_MAX);
    }

    #[test]
    fn down_convert_ignores_masked_channels() {
        let full = sx_down_convert_format(ColorFormat::R16G16B16A16Float, ChannelMask::all());
        assert_eq!(full, SX_RT_EXPORT_NO_CONVERSION);
        assert_eq!(
            sx_down_convert_format(ColorFormat::R16G16B16A16Float, ChannelMask::R | ChannelMask::G),
            SX_RT_EXPORT_16_16_GR
        );
        assert_eq!(
            sx_down_convert_format(ColorFormat::R16G16B16A16Float, ChannelMask::A),
            SX_RT_EXPORT_16_16_AR
        );
        assert_eq!(
            sx_down_convert_format(ColorFormat::R32Float, ChannelMask::all()),
            sx_down_convert_format(ColorFormat::R32Float, ChannelMask::R)
        );
        assert_eq!(
            sx_down_convert_format(ColorFormat::R8G8B8A8Unorm, ChannelMask::empty()),
            SX_RT_EXPORT_NO_CONVERSION
        );
    }

    #[test]
    fn slot_setup_touches_only_its_slot() {
        let mut regs = RbPlusRegisters::default();
        setup_rb_plus_registers_for_slot(
            1,
            ChannelMask::RGB,
            Some(ColorFormat::B5G6R5Unorm),
            &mut regs,
        );
        assert_eq!(regs.sx_ps_downconvert.target(1), SX_RT_EXPORT_5_6_5);
        assert_eq!(regs.sx_blend_opt_epsilon.target(1), 11);
        assert_eq!(
            regs.sx_blend_opt_control.target(1),
            SxBlendOptControl::ALPHA_OPT_DISABLE
        );
        assert_eq!(regs.sx_ps_downconvert.0 & !0xF0, 0);

        let mut again = regs;
        setup_rb_plus_registers_for_slot(
            1,
            ChannelMask::RGB,
            Some(ColorFormat::B5G6R5Unorm),
            &mut again,
        );
        assert_eq!(again, regs);
    }

    #[test]
    fn gs_copy_shader_inherits_gs_overrides() {
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx8);
        let api = ShaderStageFlags::VERTEX | ShaderStageFlags::GEOMETRY | ShaderStageFlags::PIXEL;
        let infos = DynamicGraphicsShaderInfos {
            vs: DynamicShaderInfo {
                max_waves_per_cu: 4,
                cu_enable_mask: 0x0F,
            },
            gs: DynamicShaderInfo {
                max_waves_per_cu: 8,
                cu_enable_mask: 0xF0,
            },
            ..DynamicGraphicsShaderInfos::default()
        };
        let out = calc_dynamic_stage_infos(api, &infos, &caps);
        assert_eq!(out.stage(HwShaderStage::Es).cu_enable_mask, 0x0F);
        assert_eq!(out.stage(HwShaderStage::Gs).wave_limit, 4);
        assert_eq!(out.stage(HwShaderStage::Vs), out.stage(HwShaderStage::Gs));
        assert_eq!(out.stage(HwShaderStage::Ps), DynamicStageInfo::default());
    }
}
