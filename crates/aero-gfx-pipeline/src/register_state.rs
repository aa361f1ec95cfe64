//! Fixed-function register program of a graphics pipeline.
//!
//! One builder serves every hardware generation. Generation differences come from the capability
//! descriptor's feature bits and quirk table, never from separate code paths.

use tracing::debug;

use crate::caps::{GpuCapabilities, GpuFeatures};
use crate::chunks::ShaderChunks;
use crate::create_info::{DepthRange, GraphicsPipelineCreateInfo, PointCoordOrigin};
use crate::error::CapabilityError;
use crate::heuristics::{setup_rb_plus_registers_for_slot, RbPlusRegisters};
use crate::metadata::{PipelineLoadInfo, PipelineMetadata, RegisterVector};
use crate::regs::{
    CbColorControl, CbShaderMask, CbTargetMask, DbAlphaToMask, DbRenderOverride,
    DbShaderControl, IaMultiVgtParam, PaClClipCntl, PaClVteCntl, PaScLineCntl, PaScModeCntl1,
    PaSuVtxCntl, SpiInterpControl0, SpiPsInputEna, SpiShaderLateAllocVs, SxBlendOptControl,
    SxBlendOptEpsilon, SxPsDownconvert, VgtGsMode, VgtLsHsConfig, VgtReuseOff, VgtShaderStagesEn,
    VgtTfParam, VgtVertexReuseBlockCntl, CB_DISABLE, CB_NORMAL, ES_STAGE_DS, ES_STAGE_REAL,
    MAX_COLOR_TARGETS, SPI_PNT_SPRITE_SEL_0, SPI_PNT_SPRITE_SEL_1, SPI_PNT_SPRITE_SEL_S,
    SPI_PNT_SPRITE_SEL_T, VS_STAGE_COPY_SHADER, VS_STAGE_DS, VS_STAGE_REAL, WAVE_LIMIT_MAX,
};
use crate::settings::{OutOfOrderPrimMode, PipelineSettings};
use crate::stage::{HwShaderStage, HwStageMask};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterState {
    vgt_shader_stages_en: VgtShaderStagesEn,
    vgt_gs_mode: VgtGsMode,
    vgt_reuse_off: VgtReuseOff,
    vgt_tf_param: VgtTfParam,
    vgt_ls_hs_config: VgtLsHsConfig,
    vgt_vertex_reuse_block_cntl: VgtVertexReuseBlockCntl,
    /// Indexed by whether the draw forces a vertex-group switch on end-of-packet.
    ia_multi_vgt_param: [IaMultiVgtParam; 2],
    cb_color_control: CbColorControl,
    cb_target_mask: CbTargetMask,
    cb_shader_mask: CbShaderMask,
    pa_cl_clip_cntl: PaClClipCntl,
    pa_su_vtx_cntl: PaSuVtxCntl,
    pa_cl_vte_cntl: PaClVteCntl,
    pa_sc_line_cntl: PaScLineCntl,
    pa_sc_mode_cntl_1: PaScModeCntl1,
    spi_interp_control_0: SpiInterpControl0,
    db_shader_control: DbShaderControl,
    db_alpha_to_mask: DbAlphaToMask,
    db_render_override: DbRenderOverride,
    late_alloc_vs: Option<SpiShaderLateAllocVs>,
    rb_plus: Option<RbPlusRegisters>,
    chunks: ShaderChunks,
}

impl RegisterState {
    pub fn build(
        create_info: &GraphicsPipelineCreateInfo,
        load_info: &PipelineLoadInfo,
        registers: &RegisterVector,
        metadata: &PipelineMetadata,
        caps: &GpuCapabilities,
        settings: &PipelineSettings,
    ) -> Result<Self, CapabilityError> {
        check_capabilities(create_info, load_info, metadata, caps)?;

        let chunks = ShaderChunks::build(load_info, metadata, registers, create_info.code_gpu_va);
        let tess = load_info.uses_tess;
        let gs = load_info.uses_gs;

        let rb_plus_enabled = caps.has(GpuFeatures::RB_PLUS) && settings.rb_plus;
        if caps.has(GpuFeatures::RB_PLUS) && !settings.rb_plus {
            debug!("RB+ available but disabled by settings");
        }

        let cb_target_mask = cb_target_mask(create_info);
        let mut cb_color_control = CbColorControl::default();
        cb_color_control.set_mode(if cb_target_mask.0 != 0 { CB_NORMAL } else { CB_DISABLE });
        cb_color_control.set_rop3(create_info.logic_op.rop3());
        if rb_plus_enabled && create_info.dual_source_blend {
            cb_color_control.set_disable_dual_quad(1);
        }

        let cb_shader_mask = registers
            .get(CbShaderMask::ADDR)
            .map(CbShaderMask)
            .unwrap_or_else(|| shader_mask_from_col_format(chunks.spi_shader_col_format()));

        let mut db_shader_control = DbShaderControl(registers.get_or_zero(DbShaderControl::ADDR));
        db_shader_control.set_alpha_to_mask_disable(u32::from(!create_info.alpha_to_coverage));

        let mut db_alpha_to_mask = DbAlphaToMask(registers.get_or_zero(DbAlphaToMask::ADDR));
        db_alpha_to_mask.set_alpha_to_mask_enable(u32::from(create_info.alpha_to_coverage));

        let mut db_render_override = DbRenderOverride::default();
        db_render_override
            .set_disable_viewport_clamp(u32::from(create_info.rasterizer.depth_clamp_disable));

        let quirks = caps.quirks();
        let mut vgt_vertex_reuse_block_cntl = VgtVertexReuseBlockCntl::default();
        vgt_vertex_reuse_block_cntl.set_vtx_reuse_depth(
            settings
                .vertex_reuse_depth
                .unwrap_or(quirks.default_vertex_reuse_depth)
                .min(0xFF),
        );

        let ia_multi_vgt_param = [false, true].map(|forced| {
            ia_multi_vgt_param_variant(create_info, load_info, registers, caps, forced)
        });

        let late_alloc_vs = if caps.has(GpuFeatures::LATE_ALLOC_VS) {
            Some(late_alloc_vs(load_info, metadata, &chunks, caps, settings))
        } else {
            debug!(gfx_level = ?caps.gfx_level, "late-alloc VS not supported");
            None
        };

        let rb_plus = rb_plus_enabled.then(|| {
            let mut rb = RbPlusRegisters::default();
            for slot in 0..MAX_COLOR_TARGETS {
                let target = create_info.color_targets.get(slot).copied().unwrap_or_default();
                setup_rb_plus_registers_for_slot(slot, target.write_mask, target.format, &mut rb);
            }
            if create_info.dual_source_blend {
                rb.sx_ps_downconvert
                    .set_target(1, rb.sx_ps_downconvert.target(0));
                rb.sx_blend_opt_epsilon
                    .set_target(1, rb.sx_blend_opt_epsilon.target(0));
                rb.sx_blend_opt_control
                    .set_target(1, rb.sx_blend_opt_control.target(0));
            }
            rb
        });

        Ok(Self {
            vgt_shader_stages_en: shader_stages_en(load_info),
            vgt_gs_mode: VgtGsMode(if gs { registers.get_or_zero(VgtGsMode::ADDR) } else { 0 }),
            vgt_reuse_off: VgtReuseOff(registers.get_or_zero(VgtReuseOff::ADDR)),
            vgt_tf_param: VgtTfParam(if tess { registers.get_or_zero(VgtTfParam::ADDR) } else { 0 }),
            vgt_ls_hs_config: VgtLsHsConfig(if tess {
                registers.get_or_zero(VgtLsHsConfig::ADDR)
            } else {
                0
            }),
            vgt_vertex_reuse_block_cntl,
            ia_multi_vgt_param,
            cb_color_control,
            cb_target_mask,
            cb_shader_mask,
            pa_cl_clip_cntl: clip_cntl(create_info),
            pa_su_vtx_cntl: su_vtx_cntl(),
            pa_cl_vte_cntl: vte_cntl(),
            pa_sc_line_cntl: line_cntl(create_info),
            pa_sc_mode_cntl_1: mode_cntl_1(load_info, metadata, &chunks, caps, settings),
            spi_interp_control_0: interp_control_0(create_info),
            db_shader_control,
            db_alpha_to_mask,
            db_render_override,
            late_alloc_vs,
            rb_plus,
            chunks,
        })
    }

    /// Context registers in emission order. `DB_SHADER_CONTROL` is always last.
    pub fn context_registers(&self) -> Vec<(u32, u32)> {
        let mut out = vec![
            (VgtShaderStagesEn::ADDR, self.vgt_shader_stages_en.0),
            (VgtGsMode::ADDR, self.vgt_gs_mode.0),
            (VgtReuseOff::ADDR, self.vgt_reuse_off.0),
            (VgtTfParam::ADDR, self.vgt_tf_param.0),
            (CbColorControl::ADDR, self.cb_color_control.0),
            (CbTargetMask::ADDR, self.cb_target_mask.0),
            (CbShaderMask::ADDR, self.cb_shader_mask.0),
            (PaClClipCntl::ADDR, self.pa_cl_clip_cntl.0),
            (PaSuVtxCntl::ADDR, self.pa_su_vtx_cntl.0),
            (PaClVteCntl::ADDR, self.pa_cl_vte_cntl.0),
            (PaScLineCntl::ADDR, self.pa_sc_line_cntl.0),
            (SpiInterpControl0::ADDR, self.spi_interp_control_0.0),
            (VgtVertexReuseBlockCntl::ADDR, self.vgt_vertex_reuse_block_cntl.0),
        ];
        if let Some(rb) = &self.rb_plus {
            out.extend([
                (SxPsDownconvert::ADDR, rb.sx_ps_downconvert.0),
                (SxBlendOptEpsilon::ADDR, rb.sx_blend_opt_epsilon.0),
                (SxBlendOptControl::ADDR, rb.sx_blend_opt_control.0),
            ]);
        }
        for chunk in self.chunks.iter() {
            out.extend_from_slice(chunk.context_registers());
        }
        out.push((DbShaderControl::ADDR, self.db_shader_control.0));
        out
    }

    /// SH registers in emission order.
    pub fn sh_registers(&self) -> Vec<(u32, u32)> {
        let mut out: Vec<(u32, u32)> = self
            .chunks
            .iter()
            .flat_map(|chunk| chunk.sh_registers())
            .collect();
        if let Some(late_alloc) = self.late_alloc_vs {
            out.push((SpiShaderLateAllocVs::ADDR, late_alloc.0));
        }
        out
    }

    pub fn ia_multi_vgt_param(&self, force_wd_switch_on_eop: bool) -> IaMultiVgtParam {
        self.ia_multi_vgt_param[force_wd_switch_on_eop as usize]
    }

    pub fn vgt_ls_hs_config(&self) -> VgtLsHsConfig {
        self.vgt_ls_hs_config
    }

    pub fn vgt_shader_stages_en(&self) -> VgtShaderStagesEn {
        self.vgt_shader_stages_en
    }

    pub fn pa_sc_mode_cntl_1(&self) -> PaScModeCntl1 {
        self.pa_sc_mode_cntl_1
    }

    pub fn cb_color_control(&self) -> CbColorControl {
        self.cb_color_control
    }

    pub fn cb_target_mask(&self) -> CbTargetMask {
        self.cb_target_mask
    }

    pub fn db_shader_control(&self) -> DbShaderControl {
        self.db_shader_control
    }

    pub fn db_alpha_to_mask(&self) -> DbAlphaToMask {
        self.db_alpha_to_mask
    }

    pub fn db_render_override(&self) -> DbRenderOverride {
        self.db_render_override
    }

    pub fn late_alloc_vs(&self) -> Option<SpiShaderLateAllocVs> {
        self.late_alloc_vs
    }

    /// RB+ registers, or `None` when RB+ is unavailable or disabled.
    pub fn rb_plus(&self) -> Option<&RbPlusRegisters> {
        self.rb_plus.as_ref()
    }

    pub fn chunks(&self) -> &ShaderChunks {
        &self.chunks
    }
}

fn check_capabilities(
    create_info: &GraphicsPipelineCreateInfo,
    load_info: &PipelineLoadInfo,
    metadata: &PipelineMetadata,
    caps: &GpuCapabilities,
) -> Result<(), CapabilityError> {
    if create_info.color_targets.len() > MAX_COLOR_TARGETS {
        return Err(CapabilityError::TooManyColorTargets {
            count: create_info.color_targets.len(),
            max: MAX_COLOR_TARGETS,
        });
    }
    if load_info.uses_onchip_gs {
        if !caps.has(GpuFeatures::ONCHIP_GS) {
            return Err(CapabilityError::OnChipGsUnsupported);
        }
        if metadata.es_gs_lds_bytes > caps.lds_bytes_per_tg {
            return Err(CapabilityError::LdsExceeded {
                stage: HwShaderStage::Gs,
                required: metadata.es_gs_lds_bytes,
                available: caps.lds_bytes_per_tg,
            });
        }
    }
    if load_info.uses_onchip_tess {
        let required = metadata.stage(HwShaderStage::Hs).map_or(0, |hs| hs.lds_bytes);
        if required > caps.lds_bytes_per_tg {
            return Err(CapabilityError::LdsExceeded {
                stage: HwShaderStage::Hs,
                required,
                available: caps.lds_bytes_per_tg,
            });
        }
    }
    Ok(())
}

fn shader_stages_en(load_info: &PipelineLoadInfo) -> VgtShaderStagesEn {
    let stages = load_info.hw_stages;
    let tess = load_info.uses_tess;
    let mut reg = VgtShaderStagesEn::default();
    if stages.contains(HwStageMask::LS) {
        reg.set_ls_en(1);
    }
    if stages.contains(HwStageMask::HS) {
        reg.set_hs_en(1);
    }
    if stages.contains(HwStageMask::ES) {
        reg.set_es_en(if tess { ES_STAGE_DS } else { ES_STAGE_REAL });
    }
    if stages.contains(HwStageMask::GS) {
        reg.set_gs_en(1);
    }
    reg.set_vs_en(if load_info.uses_gs {
        VS_STAGE_COPY_SHADER
    } else if tess {
        VS_STAGE_DS
    } else {
        VS_STAGE_REAL
    });
    reg.set_dynamic_hs(u32::from(tess && !load_info.uses_onchip_tess));
    reg
}

fn cb_target_mask(create_info: &GraphicsPipelineCreateInfo) -> CbTargetMask {
    let mut mask = CbTargetMask::default();
    for (slot, target) in create_info
        .color_targets
        .iter()
        .enumerate()
        .take(MAX_COLOR_TARGETS)
    {
        if target.format.is_some() {
            mask.set_target(slot, target.write_mask.bits());
        }
    }
    mask
}

/// Every MRT with a non-zero export format receives all four components from the shader.
fn shader_mask_from_col_format(col_format: u32) -> CbShaderMask {
    let mut mask = CbShaderMask::default();
    for slot in 0..MAX_COLOR_TARGETS {
        if (col_format >> (slot * 4)) & 0xF != 0 {
            mask.set_target(slot, 0xF);
        }
    }
    mask
}

fn clip_cntl(create_info: &GraphicsPipelineCreateInfo) -> PaClClipCntl {
    let rs = &create_info.rasterizer;
    let mut reg = PaClClipCntl::default();
    reg.set_ucp_ena(u32::from(rs.user_clip_plane_mask & 0x3F));
    reg.set_dx_clip_space_def(u32::from(rs.depth_range == DepthRange::ZeroToOne));
    reg.set_dx_rasterization_kill(u32::from(rs.rasterizer_discard));
    reg.set_dx_linear_attr_clip_ena(1);
    reg.set_zclip_near_disable(u32::from(!rs.depth_clip_enable));
    reg.set_zclip_far_disable(u32::from(!rs.depth_clip_enable));
    reg
}

fn su_vtx_cntl() -> PaSuVtxCntl {
    let mut reg = PaSuVtxCntl::default();
    reg.set_pix_center(1);
    reg.set_round_mode(2);
    reg.set_quant_mode(5);
    reg
}

fn vte_cntl() -> PaClVteCntl {
    let mut reg = PaClVteCntl::default();
    reg.set_vport_x_scale_ena(1);
    reg.set_vport_x_offset_ena(1);
    reg.set_vport_y_scale_ena(1);
    reg.set_vport_y_offset_ena(1);
    reg.set_vport_z_scale_ena(1);
    reg.set_vport_z_offset_ena(1);
    reg.set_vtx_w0_fmt(1);
    reg
}

fn line_cntl(create_info: &GraphicsPipelineCreateInfo) -> PaScLineCntl {
    let mut reg = PaScLineCntl::default();
    reg.set_dx10_diamond_test_ena(1);
    reg.set_perpendicular_endcap_ena(u32::from(create_info.rasterizer.perpendicular_end_caps));
    reg
}

fn interp_control_0(create_info: &GraphicsPipelineCreateInfo) -> SpiInterpControl0 {
    let mut reg = SpiInterpControl0::default();
    reg.set_pnt_sprite_ena(1);
    reg.set_pnt_sprite_ovrd_x(SPI_PNT_SPRITE_SEL_S);
    reg.set_pnt_sprite_ovrd_y(SPI_PNT_SPRITE_SEL_T);
    reg.set_pnt_sprite_ovrd_z(SPI_PNT_SPRITE_SEL_0);
    reg.set_pnt_sprite_ovrd_w(SPI_PNT_SPRITE_SEL_1);
    reg.set_pnt_sprite_top_1(u32::from(
        create_info.rasterizer.point_coord_origin == PointCoordOrigin::LowerLeft,
    ));
    reg.set_flat_shade_ena(u32::from(create_info.rasterizer.flat_shading));
    reg
}

fn mode_cntl_1(
    load_info: &PipelineLoadInfo,
    metadata: &PipelineMetadata,
    chunks: &ShaderChunks,
    caps: &GpuCapabilities,
    settings: &PipelineSettings,
) -> PaScModeCntl1 {
    let mut reg = PaScModeCntl1::default();
    reg.set_walk_align8_prim_fits_st(1);
    reg.set_walk_fence_enable(1);
    reg.set_walk_fence_size(3);
    reg.set_supertile_walk_order_enable(1);
    reg.set_tile_walk_order_enable(1);
    reg.set_multi_shader_engine_prim_discard_enable(1);
    reg.set_force_eov_cntdwn_enable(1);
    reg.set_force_eov_rez_enable(1);
    reg.set_out_of_order_water_mark(7);

    let input_ena = SpiPsInputEna(chunks.spi_ps_input_ena());
    reg.set_ps_iter_sample(u32::from(
        input_ena.persp_sample_ena() != 0 || input_ena.linear_sample_ena() != 0,
    ));

    let uses_uavs = load_info
        .hw_stages
        .stages()
        .filter_map(|stage| metadata.stage(stage))
        .any(|stage| stage.uses_uavs);
    let ooo = caps.quirks().out_of_order_prims
        && caps.has(GpuFeatures::OUT_OF_ORDER_PRIMS)
        && settings.out_of_order_prims != OutOfOrderPrimMode::Disable
        && !uses_uavs;
    reg.set_out_of_order_primitive_enable(u32::from(ooo));
    reg
}

fn ia_multi_vgt_param_variant(
    create_info: &GraphicsPipelineCreateInfo,
    load_info: &PipelineLoadInfo,
    registers: &RegisterVector,
    caps: &GpuCapabilities,
    force_wd_switch_on_eop: bool,
) -> IaMultiVgtParam {
    let quirks = caps.quirks();
    let gs = load_info.uses_gs;
    let tess = load_info.uses_tess;
    let big_chip = caps.num_shader_engines > 2;

    let mut reg = IaMultiVgtParam::default();
    let primgroup_size = if tess {
        VgtLsHsConfig(registers.get_or_zero(VgtLsHsConfig::ADDR))
            .num_patches()
            .saturating_sub(1)
    } else {
        127
    };
    reg.set_primgroup_size(primgroup_size);
    let switch_on_eop = create_info.topology.is_adjacency() || force_wd_switch_on_eop;
    reg.set_switch_on_eop(u32::from(switch_on_eop));
    reg.set_switch_on_eoi(u32::from(tess));
    reg.set_partial_vs_wave_on(u32::from(gs));
    reg.set_partial_es_wave_on(u32::from(load_info.uses_onchip_gs));

    if quirks.ia_multi_vgt_param_fixup {
        if gs && big_chip && quirks.gs_partial_es_wave_on_big_chip {
            reg.set_partial_es_wave_on(1);
        }
        let wd_switch_on_eop = switch_on_eop;
        reg.set_wd_switch_on_eop(u32::from(wd_switch_on_eop));
        if big_chip && !wd_switch_on_eop {
            reg.set_switch_on_eoi(1);
        }
        if gs && quirks.gs_eoi_partial_vs_wave_on && reg.switch_on_eoi() != 0 {
            reg.set_partial_vs_wave_on(1);
        }
        if !wd_switch_on_eop {
            reg.set_switch_on_eop(0);
        }
        reg.set_max_primgrp_in_wave(quirks.max_primgrp_in_wave);
    }

    if reg.switch_on_eoi() != 0 {
        reg.set_partial_es_wave_on(1);
    }
    reg
}

fn late_alloc_vs(
    load_info: &PipelineLoadInfo,
    metadata: &PipelineMetadata,
    chunks: &ShaderChunks,
    caps: &GpuCapabilities,
    settings: &PipelineSettings,
) -> SpiShaderLateAllocVs {
    let vs_uses_scratch = load_info.hw_stages.contains(HwStageMask::VS)
        && (metadata
            .stage(HwShaderStage::Vs)
            .is_some_and(|vs| vs.scratch_bytes_per_thread > 0)
            || chunks
                .stage(HwShaderStage::Vs)
                .is_some_and(|vs| vs.rsrc2().scratch_en() != 0));

    let limit = if caps.cu_per_sh <= 2 || vs_uses_scratch {
        0
    } else {
        settings
            .late_alloc_vs_limit
            .min((caps.cu_per_sh - 1).saturating_mul(4))
            .min(WAVE_LIMIT_MAX)
    };
    let mut reg = SpiShaderLateAllocVs::default();
    reg.set_limit(limit);
    reg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::GfxIpLevel;
    use crate::create_info::{ChannelMask, ColorFormat, ColorTargetInfo, PrimitiveTopology};
    use crate::metadata::{decode, HwStageMetadata};
    use crate::regs::{self, StageShRegs};
    use crate::stage::ShaderStageFlags;

    fn build(
        create_info: &GraphicsPipelineCreateInfo,
        caps: &GpuCapabilities,
        extra: &[(u32, u32)],
    ) -> Result<RegisterState, CapabilityError> {
        let mut metadata = PipelineMetadata::default();
        let mut registers = RegisterVector::new();
        for stage in crate::stage::hw_stages_for(create_info.stages).stages() {
            metadata = metadata.with_stage(stage, HwStageMetadata::default());
            registers.insert(stage.sh_regs().pgm_rsrc1, 0);
            registers.insert(stage.sh_regs().pgm_rsrc2, 0);
        }
        for &(addr, value) in extra {
            registers.insert(addr, value);
        }
        let decoded = decode(create_info, &metadata, &registers).unwrap();
        RegisterState::build(
            create_info,
            &decoded.load_info,
            &registers,
            &metadata,
            caps,
            &PipelineSettings::default(),
        )
    }

    fn rgba8_targets(count: usize) -> Vec<ColorTargetInfo> {
        vec![ColorTargetInfo::new(ColorFormat::R8G8B8A8Unorm, ChannelMask::all()); count]
    }

    #[test]
    fn db_shader_control_is_emitted_last() {
        let info = GraphicsPipelineCreateInfo {
            color_targets: rgba8_targets(1),
            ..GraphicsPipelineCreateInfo::default()
        };
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx8);
        let state = build(&info, &caps, &[]).unwrap();
        let ctx = state.context_registers();
        assert_eq!(ctx.last().map(|(addr, _)| *addr), Some(DbShaderControl::ADDR));
        assert_eq!(state.cb_color_control().mode(), CB_NORMAL);
        assert_eq!(state.cb_color_control().rop3(), 0xCC);
    }

    #[test]
    fn no_targets_disables_color_block() {
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx6);
        let state = build(&GraphicsPipelineCreateInfo::default(), &caps, &[]).unwrap();
        assert_eq!(state.cb_color_control().mode(), CB_DISABLE);
        assert!(state.rb_plus().is_none());
        assert!(state.late_alloc_vs().is_none());
        assert!(!state
            .sh_registers()
            .iter()
            .any(|(addr, _)| *addr == SpiShaderLateAllocVs::ADDR));
    }

    #[test]
    fn too_many_targets_is_a_capability_error() {
        let info = GraphicsPipelineCreateInfo {
            color_targets: rgba8_targets(9),
            ..GraphicsPipelineCreateInfo::default()
        };
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx8);
        assert_eq!(
            build(&info, &caps, &[]).unwrap_err(),
            CapabilityError::TooManyColorTargets { count: 9, max: 8 }
        );
    }

    #[test]
    fn onchip_gs_requires_feature() {
        let info = GraphicsPipelineCreateInfo {
            stages: ShaderStageFlags::VERTEX | ShaderStageFlags::GEOMETRY | ShaderStageFlags::PIXEL,
            ..GraphicsPipelineCreateInfo::default()
        };
        let mut gs_mode = VgtGsMode::default();
        gs_mode.set_onchip(regs::VGT_GS_MODE_ONCHIP);
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx6);
        assert_eq!(
            build(&info, &caps, &[(VgtGsMode::ADDR, gs_mode.0)]).unwrap_err(),
            CapabilityError::OnChipGsUnsupported
        );
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx7);
        let state = build(&info, &caps, &[(VgtGsMode::ADDR, gs_mode.0)]).unwrap();
        assert_eq!(state.vgt_shader_stages_en().vs_en(), VS_STAGE_COPY_SHADER);
        assert_eq!(state.vgt_shader_stages_en().es_en(), ES_STAGE_REAL);
    }

    #[test]
    fn switch_variants_differ_only_in_switch_bits() {
        let info = GraphicsPipelineCreateInfo {
            topology: PrimitiveTopology::TriangleList,
            ..GraphicsPipelineCreateInfo::default()
        };
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx8);
        let state = build(&info, &caps, &[]).unwrap();
        let plain = state.ia_multi_vgt_param(false);
        let forced = state.ia_multi_vgt_param(true);
        assert_eq!(plain.wd_switch_on_eop(), 0);
        assert_eq!(plain.switch_on_eop(), 0);
        assert_eq!(forced.wd_switch_on_eop(), 1);
        assert_eq!(forced.switch_on_eop(), 1);
        assert_eq!(plain.primgroup_size(), forced.primgroup_size());
        assert_eq!(plain.max_primgrp_in_wave(), 2);
    }

    #[test]
    fn gfx6_has_no_wd_switch() {
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx6);
        let state = build(&GraphicsPipelineCreateInfo::default(), &caps, &[]).unwrap();
        assert_eq!(state.ia_multi_vgt_param(true).wd_switch_on_eop(), 0);
        assert_eq!(state.ia_multi_vgt_param(true).switch_on_eop(), 1);
        assert_eq!(state.ia_multi_vgt_param(false).primgroup_size(), 127);
    }

    #[test]
    fn late_alloc_respects_cu_count_and_scratch() {
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx8);
        let state = build(&GraphicsPipelineCreateInfo::default(), &caps, &[]).unwrap();
        // min(32, (8 - 1) * 4)
        assert_eq!(state.late_alloc_vs().map(|r| r.limit()), Some(28));

        let mut rsrc2 = regs::SpiShaderPgmRsrc2::default();
        rsrc2.set_scratch_en(1);
        let state = build(
            &GraphicsPipelineCreateInfo::default(),
            &caps,
            &[(StageShRegs::VS.pgm_rsrc2, rsrc2.0)],
        )
        .unwrap();
        assert_eq!(state.late_alloc_vs().map(|r| r.limit()), Some(0));
    }

    #[test]
    fn dual_source_blend_mirrors_slot_zero() {
        let info = GraphicsPipelineCreateInfo {
            color_targets: vec![ColorTargetInfo::new(ColorFormat::B5G6R5Unorm, ChannelMask::RGB)],
            dual_source_blend: true,
            ..GraphicsPipelineCreateInfo::default()
        };
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx8);
        let state = build(&info, &caps, &[]).unwrap();
        let rb = state.rb_plus().unwrap();
        assert_eq!(rb.sx_ps_downconvert.target(1), rb.sx_ps_downconvert.target(0));
        assert_eq!(rb.sx_blend_opt_control.target(1), rb.sx_blend_opt_control.target(0));
        assert_eq!(state.cb_color_control().disable_dual_quad(), 1);
    }

    #[test]
    fn shader_mask_falls_back_to_export_format() {
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx7);
        let state = build(
            &GraphicsPipelineCreateInfo::default(),
            &caps,
            &[(regs::SPI_SHADER_COL_FORMAT, 0x0000_0104)],
        )
        .unwrap();
        let shader_mask = state
            .context_registers()
            .into_iter()
            .find(|(addr, _)| *addr == CbShaderMask::ADDR)
            .map(|(_, value)| value);
        assert_eq!(shader_mask, Some(0x0000_0F0F));
    }
}
