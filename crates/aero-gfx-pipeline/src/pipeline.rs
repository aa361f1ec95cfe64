//! Graphics pipeline construction and bind-time emission.

use tracing::{debug, warn};

use crate::caps::GpuCapabilities;
use crate::commands::{context_reg_hash, BindPathKind, Pm4Image};
use crate::create_info::{
    ChannelMask, ColorBlendState, ColorFormat, DepthStencilState, DepthStencilViewInfo,
    GraphicsPipelineCreateInfo,
};
use crate::error::PipelineError;
use crate::heuristics::{
    calc_dynamic_stage_infos, can_draw_prims_out_of_order, setup_rb_plus_registers_for_slot,
    DynamicGraphicsShaderInfos, RbPlusRegisters,
};
use crate::metadata::{
    decode, PipelineLoadInfo, PipelineMetadata, RegisterVector, RingItemSizes,
};
use crate::pm4::CmdStream;
use crate::register_state::RegisterState;
use crate::regs::{
    DbShaderControl, IaMultiVgtParam, PaScModeCntl1, SpiPsInControl, SpiShaderPgmRsrc3,
    SpiVsOutConfig, SxBlendOptControl, SxBlendOptEpsilon, SxPsDownconvert, VgtLsHsConfig,
    VgtStrmoutBufferConfig, VgtStrmoutVtxStride, LATE_Z, MAX_COLOR_TARGETS,
};
use crate::settings::{OutOfOrderPrimMode, PipelineSettings};
use crate::signature::GraphicsPipelineSignature;
use crate::stage::{hw_stage_for_api, ApiShaderType, HwShaderStage, HwStageMask};
use crate::uploader::GpuMemoryAllocator;

/// Resource usage of one API shader stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderStats {
    /// Hardware stages the API stage occupies.
    pub hw_stages: HwStageMask,
    pub num_used_sgprs: u32,
    pub num_used_vgprs: u32,
    pub lds_bytes: u32,
    pub scratch_bytes_per_thread: u32,
    pub code_gpu_va: u64,
    pub code_size: u64,
}

/// An immutable, fully encoded graphics pipeline.
///
/// All bind-time operations take `&self` and only append to caller-owned command streams, so a
/// pipeline can be shared freely between recording threads.
#[derive(Clone, Debug)]
pub struct GraphicsPipeline {
    create_info: GraphicsPipelineCreateInfo,
    caps: GpuCapabilities,
    metadata: PipelineMetadata,
    load_info: PipelineLoadInfo,
    signature: GraphicsPipelineSignature,
    ring_sizes: RingItemSizes,
    state: RegisterState,
    image: Pm4Image,
    context_hash: u64,
}

impl GraphicsPipeline {
    pub fn new(
        create_info: &GraphicsPipelineCreateInfo,
        metadata: &PipelineMetadata,
        registers: &RegisterVector,
        caps: &GpuCapabilities,
        settings: &PipelineSettings,
        allocator: &dyn GpuMemoryAllocator,
    ) -> Result<Self, PipelineError> {
        Self::build(create_info, metadata, registers, caps, settings, allocator).map_err(|err| {
            warn!(kind = err.kind(), error = %err, "graphics pipeline construction failed");
            err
        })
    }

    fn build(
        create_info: &GraphicsPipelineCreateInfo,
        metadata: &PipelineMetadata,
        registers: &RegisterVector,
        caps: &GpuCapabilities,
        settings: &PipelineSettings,
        allocator: &dyn GpuMemoryAllocator,
    ) -> Result<Self, PipelineError> {
        caps.validate()?;
        let decoded = decode(create_info, metadata, registers)?;
        let mut load_info = decoded.load_info;

        let state = RegisterState::build(
            create_info,
            &load_info,
            registers,
            metadata,
            caps,
            settings,
        )?;
        load_info.loaded_ctx_reg_count = state.context_registers().len() as u32;
        load_info.loaded_sh_reg_count = state.sh_registers().len() as u32;

        let image = Pm4Image::build(
            &state,
            caps,
            settings,
            create_info.code_gpu_va,
            create_info.code_size,
            allocator,
        )?;
        let context_hash = context_reg_hash(&state);

        debug!(
            path = ?image.kind(),
            hash = context_hash,
            stages = ?create_info.stages,
            ctx_regs = load_info.loaded_ctx_reg_count,
            sh_regs = load_info.loaded_sh_reg_count,
            "created graphics pipeline"
        );

        Ok(Self {
            create_info: create_info.clone(),
            caps: *caps,
            metadata: metadata.clone(),
            load_info,
            signature: decoded.signature,
            ring_sizes: decoded.ring_sizes,
            state,
            image,
            context_hash,
        })
    }

    /// Appends the shader-code prefetch, if prefetching is enabled.
    pub fn prefetch(&self, cmd: &mut CmdStream) {
        cmd.append(&self.image.prefetch);
    }

    /// Appends the SH register program followed by per-draw wave-limit and CU-mask overrides.
    pub fn write_sh_commands(&self, cmd: &mut CmdStream, infos: &DynamicGraphicsShaderInfos) {
        cmd.append(self.image.sh_commands());

        if !self.caps.quirks().has_pgm_rsrc3 {
            return;
        }
        let dynamic = calc_dynamic_stage_infos(self.load_info.api_stages, infos, &self.caps);
        for stage in self.load_info.hw_stages.stages() {
            let info = dynamic.stage(stage);
            let mut rsrc3 = SpiShaderPgmRsrc3::default();
            let cu_mask = info.cu_enable_mask & 0xFFFF;
            rsrc3.set_cu_en(if cu_mask == 0 { 0xFFFF } else { cu_mask });
            rsrc3.set_wave_limit(info.wave_limit);
            cmd.set_sh_reg(stage.sh_regs().pgm_rsrc3, rsrc3.0);
        }
    }

    /// Appends the shared read-modify-write packets and the context register program.
    pub fn write_context_commands(&self, cmd: &mut CmdStream) {
        cmd.append(&self.image.common);
        cmd.append(self.image.ctx_commands());
    }

    /// Re-emits `DB_SHADER_CONTROL` adjusted for the draw's depth and over-rasterization state.
    pub fn write_db_shader_control(
        &self,
        is_depth_enabled: bool,
        uses_over_rasterization: bool,
        cmd: &mut CmdStream,
    ) {
        let mut value = self.state.db_shader_control();
        if uses_over_rasterization {
            value.set_z_order(LATE_Z);
        }
        if !is_depth_enabled {
            value.set_depth_before_shader(0);
        }
        cmd.set_context_reg(DbShaderControl::ADDR, value.0);
    }

    pub fn signature(&self) -> &GraphicsPipelineSignature {
        &self.signature
    }

    pub fn uses_view_instancing(&self) -> bool {
        self.signature.uses_view_instancing()
    }

    pub fn ia_multi_vgt_param(&self, force_wd_switch_on_eop: bool) -> IaMultiVgtParam {
        self.state.ia_multi_vgt_param(force_wd_switch_on_eop)
    }

    pub fn pa_sc_mode_cntl_1(&self) -> PaScModeCntl1 {
        self.state.pa_sc_mode_cntl_1()
    }

    pub fn vgt_ls_hs_config(&self) -> VgtLsHsConfig {
        self.state.vgt_ls_hs_config()
    }

    pub fn is_out_of_order_prims_enabled(&self) -> bool {
        self.state.pa_sc_mode_cntl_1().out_of_order_primitive_enable() != 0
    }

    pub fn can_draw_prims_out_of_order(
        &self,
        ds_view: Option<&DepthStencilViewInfo>,
        ds_state: Option<&DepthStencilState>,
        blend: Option<&ColorBlendState>,
        has_active_queries: bool,
        mode: OutOfOrderPrimMode,
    ) -> bool {
        can_draw_prims_out_of_order(
            self.state.pa_sc_mode_cntl_1(),
            ds_view,
            ds_state,
            blend,
            self.state.cb_target_mask(),
            has_active_queries,
            mode,
        )
    }

    pub fn vgt_strmout_buffer_config(&self) -> VgtStrmoutBufferConfig {
        self.state.chunks().vgt_strmout_buffer_config()
    }

    pub fn vgt_strmout_vtx_stride(&self, index: usize) -> VgtStrmoutVtxStride {
        self.state.chunks().vgt_strmout_vtx_stride(index)
    }

    pub fn spi_vs_out_config(&self) -> SpiVsOutConfig {
        self.state.chunks().spi_vs_out_config()
    }

    pub fn spi_ps_in_control(&self) -> SpiPsInControl {
        self.state.chunks().spi_ps_in_control()
    }

    fn rb_plus_registers(&self) -> RbPlusRegisters {
        self.state.rb_plus().copied().unwrap_or_default()
    }

    pub fn sx_ps_downconvert(&self) -> SxPsDownconvert {
        self.rb_plus_registers().sx_ps_downconvert
    }

    pub fn sx_blend_opt_epsilon(&self) -> SxBlendOptEpsilon {
        self.rb_plus_registers().sx_blend_opt_epsilon
    }

    pub fn sx_blend_opt_control(&self) -> SxBlendOptControl {
        self.rb_plus_registers().sx_blend_opt_control
    }

    /// The pipeline's RB+ registers with `slot` retuned for `format`, for render-pass helpers that
    /// draw into a target the pipeline was not built for. Without RB+ the registers stay zeroed.
    pub fn override_rb_plus_registers_for_rpm(
        &self,
        slot: usize,
        format: ColorFormat,
        write_mask: ChannelMask,
    ) -> RbPlusRegisters {
        let Some(&rb_plus) = self.state.rb_plus() else {
            return RbPlusRegisters::default();
        };
        let mut regs = rb_plus;
        if slot < MAX_COLOR_TARGETS {
            setup_rb_plus_registers_for_slot(slot, write_mask, Some(format), &mut regs);
        }
        regs
    }

    pub fn context_pm4_img_hash(&self) -> u64 {
        self.context_hash
    }

    /// Register that receives the first vertex-shader user-data entry.
    pub fn vs_user_data_base_offset(&self) -> u32 {
        let stage = if self.load_info.uses_tess {
            HwShaderStage::Ls
        } else if self.load_info.uses_gs {
            HwShaderStage::Es
        } else {
            HwShaderStage::Vs
        };
        stage.sh_regs().user_data_0
    }

    pub fn bind_path(&self) -> BindPathKind {
        self.image.kind()
    }

    pub fn ring_item_sizes(&self) -> RingItemSizes {
        self.ring_sizes
    }

    pub fn shader_stats(&self, api: ApiShaderType) -> Option<ShaderStats> {
        let stage = hw_stage_for_api(self.load_info.api_stages, api)?;
        let metadata = self.metadata.stage(stage)?;
        let chunk = self.state.chunks().stage(stage)?;

        let mut hw_stages = stage.flag();
        if api == ApiShaderType::Geometry {
            hw_stages |= HwStageMask::VS;
        }
        let rsrc1 = chunk.rsrc1();
        Some(ShaderStats {
            hw_stages,
            num_used_sgprs: (rsrc1.sgprs() + 1) * 8,
            num_used_vgprs: (rsrc1.vgprs() + 1) * 4,
            lds_bytes: metadata.lds_bytes,
            scratch_bytes_per_thread: metadata.scratch_bytes_per_thread,
            code_gpu_va: chunk.code_gpu_va(),
            code_size: metadata.code_size,
        })
    }

    pub fn load_info(&self) -> &PipelineLoadInfo {
        &self.load_info
    }

    pub fn register_state(&self) -> &RegisterState {
        &self.state
    }

    pub fn pm4_image(&self) -> &Pm4Image {
        &self.image
    }

    pub fn create_info(&self) -> &GraphicsPipelineCreateInfo {
        &self.create_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{GfxIpLevel, GpuFeatures};
    use crate::create_info::ColorTargetInfo;
    use crate::metadata::HwStageMetadata;
    use crate::pm4::{type3_header, Opcode, RegisterFile};
    use crate::regs::{SpiShaderPgmRsrc1, StageShRegs, EARLY_Z_THEN_LATE_Z};
    use crate::uploader::LinearGpuAllocator;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn pipeline_is_send_and_sync() {
        assert_send_sync::<GraphicsPipeline>();
    }

    fn vs_ps_pipeline(caps: &GpuCapabilities, extra: &[(u32, u32)]) -> GraphicsPipeline {
        let create_info = GraphicsPipelineCreateInfo {
            color_targets: vec![ColorTargetInfo::new(
                ColorFormat::R8G8B8A8Unorm,
                ChannelMask::all(),
            )],
            code_gpu_va: 0x8000_0000,
            code_size: 0x400,
            ..GraphicsPipelineCreateInfo::default()
        };
        let metadata = PipelineMetadata::default()
            .with_stage(
                HwShaderStage::Vs,
                HwStageMetadata {
                    code_size: 0x200,
                    ..HwStageMetadata::default()
                },
            )
            .with_stage(
                HwShaderStage::Ps,
                HwStageMetadata {
                    entry_offset: 0x200,
                    code_size: 0x200,
                    lds_bytes: 0,
                    ..HwStageMetadata::default()
                },
            );
        let mut ps_rsrc1 = SpiShaderPgmRsrc1::default();
        ps_rsrc1.set_vgprs(3);
        ps_rsrc1.set_sgprs(1);
        let mut registers: RegisterVector = [
            (StageShRegs::VS.pgm_rsrc1, 0),
            (StageShRegs::VS.pgm_rsrc2, 0),
            (StageShRegs::PS.pgm_rsrc1, ps_rsrc1.0),
            (StageShRegs::PS.pgm_rsrc2, 0),
        ]
        .into_iter()
        .collect();
        for &(addr, value) in extra {
            registers.insert(addr, value);
        }
        let allocator = LinearGpuAllocator::new(0x1_0000_0000, 0x1_0000);
        GraphicsPipeline::new(
            &create_info,
            &metadata,
            &registers,
            caps,
            &PipelineSettings::default(),
            &allocator,
        )
        .unwrap()
    }

    #[test]
    fn rsrc3_overrides_follow_sh_image_on_gfx7() {
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx7);
        let pipeline = vs_ps_pipeline(&caps, &[]);
        let mut cmd = CmdStream::new();
        pipeline.write_sh_commands(&mut cmd, &DynamicGraphicsShaderInfos::default());

        let mut file = RegisterFile::new();
        file.execute(cmd.words(), None).unwrap();
        assert_eq!(file.sh_reg(StageShRegs::VS.pgm_rsrc3), Some(0xFFFF));
        assert_eq!(file.sh_reg(StageShRegs::PS.pgm_rsrc3), Some(0xFFFF));
        assert_eq!(file.sh_reg(StageShRegs::PS.pgm_lo), Some(0x8000_0200 >> 8));
    }

    #[test]
    fn gfx6_emits_no_rsrc3() {
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx6);
        let pipeline = vs_ps_pipeline(&caps, &[]);
        let mut cmd = CmdStream::new();
        pipeline.write_sh_commands(&mut cmd, &DynamicGraphicsShaderInfos::default());
        assert_eq!(cmd.words(), pipeline.pm4_image().sh_commands().words());
    }

    #[test]
    fn over_rasterization_forces_late_z() {
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx8);
        let mut db = DbShaderControl::default();
        db.set_z_order(EARLY_Z_THEN_LATE_Z);
        let pipeline = vs_ps_pipeline(&caps, &[(DbShaderControl::ADDR, db.0)]);

        let mut cmd = CmdStream::new();
        pipeline.write_db_shader_control(true, true, &mut cmd);
        assert_eq!(cmd.words()[0], type3_header(Opcode::SetContextReg, 2));
        assert_eq!(DbShaderControl(cmd.words()[2]).z_order(), LATE_Z);

        cmd.clear();
        pipeline.write_db_shader_control(true, false, &mut cmd);
        assert_eq!(DbShaderControl(cmd.words()[2]).z_order(), EARLY_Z_THEN_LATE_Z);
    }

    #[test]
    fn shader_stats_decode_register_counts() {
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx8);
        let pipeline = vs_ps_pipeline(&caps, &[]);
        let stats = pipeline.shader_stats(ApiShaderType::Pixel).unwrap();
        assert_eq!(stats.hw_stages, HwStageMask::PS);
        assert_eq!(stats.num_used_vgprs, 16);
        assert_eq!(stats.num_used_sgprs, 16);
        assert_eq!(stats.code_gpu_va, 0x8000_0200);
        assert!(pipeline.shader_stats(ApiShaderType::Geometry).is_none());
    }

    #[test]
    fn vs_user_data_base_is_hw_vs_without_tess_or_gs() {
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx8);
        let pipeline = vs_ps_pipeline(&caps, &[]);
        assert_eq!(pipeline.vs_user_data_base_offset(), StageShRegs::VS.user_data_0);
    }

    #[test]
    fn rpm_override_changes_only_requested_slot() {
        let caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx8);
        let pipeline = vs_ps_pipeline(&caps, &[]);
        let base = pipeline.sx_ps_downconvert();
        let regs = pipeline.override_rb_plus_registers_for_rpm(
            3,
            ColorFormat::B5G6R5Unorm,
            ChannelMask::RGB,
        );
        assert_eq!(regs.sx_ps_downconvert.target(0), base.target(0));
        assert_ne!(regs.sx_ps_downconvert.target(3), base.target(3));
        assert_eq!(
            pipeline.override_rb_plus_registers_for_rpm(3, ColorFormat::B5G6R5Unorm, ChannelMask::RGB),
            regs
        );
    }

    #[test]
    fn rpm_override_is_zero_without_rb_plus() {
        let gfx7 = GpuCapabilities::for_generation(GfxIpLevel::Gfx7);
        let gfx8 = GpuCapabilities::for_generation(GfxIpLevel::Gfx8);
        let no_rb_plus = gfx8.with_features(gfx8.features - GpuFeatures::RB_PLUS);
        for caps in [gfx7, no_rb_plus] {
            let pipeline = vs_ps_pipeline(&caps, &[]);
            assert!(pipeline.register_state().rb_plus().is_none());
            assert_eq!(
                pipeline.override_rb_plus_registers_for_rpm(
                    0,
                    ColorFormat::B5G6R5Unorm,
                    ChannelMask::RGB
                ),
                RbPlusRegisters::default()
            );
        }
    }
}
