#![allow(dead_code)]

use aero_gfx_pipeline::create_info::{
    BlendEquation, BlendFactor, BlendOp, ChannelMask, ColorBlendState, ColorFormat,
    ColorTargetInfo, TargetBlendState,
};
use aero_gfx_pipeline::metadata::{HwStageMetadata, UserDataMapping};
use aero_gfx_pipeline::regs::StageShRegs;
use aero_gfx_pipeline::{
    GpuCapabilities, GraphicsPipeline, GraphicsPipelineCreateInfo, HwShaderStage,
    LinearGpuAllocator, PipelineError, PipelineMetadata, PipelineSettings, RegisterVector,
    ShaderStageFlags,
};

pub const CODE_GPU_VA: u64 = 0x4_0000_0000;
pub const TABLE_HEAP_VA: u64 = 0x8_0000_0000;

/// Everything a pipeline is built from, kept together so tests can tweak one piece.
#[derive(Clone, Debug)]
pub struct PipelineInputs {
    pub create_info: GraphicsPipelineCreateInfo,
    pub metadata: PipelineMetadata,
    pub registers: RegisterVector,
}

impl PipelineInputs {
    pub fn build(
        &self,
        caps: &GpuCapabilities,
        settings: &PipelineSettings,
    ) -> Result<GraphicsPipeline, PipelineError> {
        let allocator = LinearGpuAllocator::new(TABLE_HEAP_VA, 0x10_0000);
        GraphicsPipeline::new(
            &self.create_info,
            &self.metadata,
            &self.registers,
            caps,
            settings,
            &allocator,
        )
    }
}

fn stage_block(registers: &mut RegisterVector, sh: StageShRegs, vgprs: u32, sgprs: u32) {
    registers.insert(sh.pgm_rsrc1, (sgprs << 6) | vgprs);
    // One user SGPR.
    registers.insert(sh.pgm_rsrc2, 1 << 1);
}

fn code(offset: u64) -> HwStageMetadata {
    HwStageMetadata {
        entry_offset: offset,
        code_size: 0x100,
        ..HwStageMetadata::default()
    }
}

/// A vertex + pixel pipeline writing `targets`.
pub fn vs_ps(targets: &[(ColorFormat, ChannelMask)]) -> PipelineInputs {
    let create_info = GraphicsPipelineCreateInfo {
        color_targets: targets
            .iter()
            .map(|&(format, mask)| ColorTargetInfo::new(format, mask))
            .collect(),
        code_gpu_va: CODE_GPU_VA,
        code_size: 0x200,
        ..GraphicsPipelineCreateInfo::default()
    };
    let metadata = PipelineMetadata::default()
        .with_stage(HwShaderStage::Vs, code(0))
        .with_stage(HwShaderStage::Ps, code(0x100));

    let mut registers = RegisterVector::new();
    stage_block(&mut registers, StageShRegs::VS, 5, 2);
    stage_block(&mut registers, StageShRegs::PS, 3, 1);
    registers.insert(
        StageShRegs::VS.user_data(0),
        UserDataMapping::VertexBufferTable.to_raw(),
    );
    registers.insert(StageShRegs::VS.user_data(1), UserDataMapping::Entry(0).to_raw());
    registers.insert(StageShRegs::VS.user_data(2), UserDataMapping::BaseVertex.to_raw());
    registers.insert(StageShRegs::PS.user_data(0), UserDataMapping::Entry(1).to_raw());
    // One exported color target in 32_ABGR.
    registers.insert(aero_gfx_pipeline::regs::SPI_SHADER_COL_FORMAT, 0x9);

    PipelineInputs {
        create_info,
        metadata,
        registers,
    }
}

pub fn rgba8_vs_ps() -> PipelineInputs {
    vs_ps(&[(ColorFormat::R8G8B8A8Unorm, ChannelMask::all())])
}

/// Vertex + geometry + pixel; the GS copy shader runs on the hardware VS stage.
pub fn vs_gs_ps() -> PipelineInputs {
    let mut inputs = rgba8_vs_ps();
    inputs.create_info.stages |= ShaderStageFlags::GEOMETRY;
    inputs.metadata = PipelineMetadata::default()
        .with_stage(HwShaderStage::Es, code(0))
        .with_stage(HwShaderStage::Gs, code(0x100))
        .with_stage(HwShaderStage::Vs, code(0x200))
        .with_stage(HwShaderStage::Ps, code(0x300));
    inputs.create_info.code_size = 0x400;
    stage_block(&mut inputs.registers, StageShRegs::ES, 4, 2);
    stage_block(&mut inputs.registers, StageShRegs::GS, 4, 2);
    inputs
}

/// Vertex + hull + domain + pixel.
pub fn tessellated() -> PipelineInputs {
    let mut inputs = rgba8_vs_ps();
    inputs.create_info.stages |= ShaderStageFlags::HULL | ShaderStageFlags::DOMAIN;
    inputs.metadata = PipelineMetadata::default()
        .with_stage(HwShaderStage::Ls, code(0))
        .with_stage(HwShaderStage::Hs, code(0x100))
        .with_stage(HwShaderStage::Vs, code(0x200))
        .with_stage(HwShaderStage::Ps, code(0x300));
    inputs.create_info.code_size = 0x400;
    stage_block(&mut inputs.registers, StageShRegs::LS, 4, 2);
    stage_block(&mut inputs.registers, StageShRegs::HS, 4, 2);
    inputs
}

pub fn additive() -> BlendEquation {
    BlendEquation {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::One,
        op: BlendOp::Add,
    }
}

/// Additive blending on every slot.
pub fn additive_blend() -> ColorBlendState {
    ColorBlendState {
        targets: [TargetBlendState {
            blend_enable: true,
            color: additive(),
            alpha: additive(),
        }; 8],
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}
