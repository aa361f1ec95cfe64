//! Per-hardware-stage register chunks.
//!
//! Each active stage owns its program address, resource descriptors and the context registers that
//! configure its inputs and outputs. Values come straight from the compiler's register vector, in
//! a fixed table order so the emitted register list is deterministic.

use crate::metadata::{PipelineLoadInfo, PipelineMetadata, RegisterVector};
use crate::regs::{
    self, SpiPsInControl, SpiShaderPgmRsrc1, SpiShaderPgmRsrc2, SpiVsOutConfig,
    VgtStrmoutBufferConfig, VgtStrmoutVtxStride, MAX_STREAM_OUT_BUFFERS,
    VGT_STRMOUT_VTX_STRIDE_STEP,
};
use crate::stage::{HwShaderStage, NUM_HW_STAGES};

const VS_CONTEXT_REGS: &[u32] = &[
    regs::SPI_SHADER_POS_FORMAT,
    regs::PA_CL_VS_OUT_CNTL,
    regs::SPI_VS_OUT_CONFIG,
    regs::VGT_PRIMITIVEID_EN,
    regs::VGT_STRMOUT_CONFIG,
    regs::VGT_STRMOUT_BUFFER_CONFIG,
    regs::VGT_STRMOUT_VTX_STRIDE_0,
    regs::VGT_STRMOUT_VTX_STRIDE_0 + VGT_STRMOUT_VTX_STRIDE_STEP,
    regs::VGT_STRMOUT_VTX_STRIDE_0 + 2 * VGT_STRMOUT_VTX_STRIDE_STEP,
    regs::VGT_STRMOUT_VTX_STRIDE_0 + 3 * VGT_STRMOUT_VTX_STRIDE_STEP,
];

const PS_CONTEXT_REGS: &[u32] = &[
    regs::SPI_SHADER_Z_FORMAT,
    regs::SPI_SHADER_COL_FORMAT,
    regs::SPI_PS_INPUT_ENA,
    regs::SPI_PS_INPUT_ADDR,
    regs::SPI_PS_IN_CONTROL,
    regs::SPI_BARYC_CNTL,
];

const GS_CONTEXT_REGS: &[u32] = &[
    regs::VGT_GS_MAX_VERT_OUT,
    regs::VGT_GS_OUT_PRIM_TYPE,
    regs::VGT_GS_INSTANCE_CNT,
    regs::VGT_ESGS_RING_ITEMSIZE,
    regs::VGT_GSVS_RING_ITEMSIZE,
    regs::VGT_GSVS_RING_OFFSET_1,
    regs::VGT_GSVS_RING_OFFSET_2,
    regs::VGT_GSVS_RING_OFFSET_3,
    regs::VGT_GS_VERT_ITEMSIZE,
    regs::VGT_GS_VERT_ITEMSIZE_1,
    regs::VGT_GS_VERT_ITEMSIZE_2,
    regs::VGT_GS_VERT_ITEMSIZE_3,
];

const HS_CONTEXT_REGS: &[u32] = &[regs::VGT_HOS_MAX_TESS_LEVEL, regs::VGT_HOS_MIN_TESS_LEVEL];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageChunk {
    stage: HwShaderStage,
    code_gpu_va: u64,
    rsrc1: SpiShaderPgmRsrc1,
    rsrc2: SpiShaderPgmRsrc2,
    context_regs: Vec<(u32, u32)>,
}

impl StageChunk {
    fn build(
        stage: HwShaderStage,
        code_gpu_va: u64,
        load_info: &PipelineLoadInfo,
        registers: &RegisterVector,
    ) -> Self {
        let sh = stage.sh_regs();
        let table: &[u32] = match stage {
            HwShaderStage::Vs => VS_CONTEXT_REGS,
            HwShaderStage::Ps => PS_CONTEXT_REGS,
            HwShaderStage::Gs => GS_CONTEXT_REGS,
            HwShaderStage::Hs => HS_CONTEXT_REGS,
            HwShaderStage::Ls | HwShaderStage::Es => &[],
        };

        let mut addrs = table.to_vec();
        match stage {
            HwShaderStage::Ps => {
                addrs.extend((0..load_info.interpolator_count).map(|i| regs::SPI_PS_INPUT_CNTL_0 + i))
            }
            HwShaderStage::Gs if load_info.uses_onchip_gs => addrs.push(regs::VGT_GS_ONCHIP_CNTL),
            _ => {}
        }

        Self {
            stage,
            code_gpu_va,
            rsrc1: SpiShaderPgmRsrc1(registers.get_or_zero(sh.pgm_rsrc1)),
            rsrc2: SpiShaderPgmRsrc2(registers.get_or_zero(sh.pgm_rsrc2)),
            context_regs: addrs
                .into_iter()
                .map(|addr| (addr, registers.get_or_zero(addr)))
                .collect(),
        }
    }

    pub fn stage(&self) -> HwShaderStage {
        self.stage
    }

    /// GPU address of the stage's entry point.
    pub fn code_gpu_va(&self) -> u64 {
        self.code_gpu_va
    }

    pub fn rsrc1(&self) -> SpiShaderPgmRsrc1 {
        self.rsrc1
    }

    pub fn rsrc2(&self) -> SpiShaderPgmRsrc2 {
        self.rsrc2
    }

    /// `PGM_LO`, `PGM_HI`, `RSRC1`, `RSRC2`, in address order.
    pub fn sh_registers(&self) -> [(u32, u32); 4] {
        let sh = self.stage.sh_regs();
        [
            (sh.pgm_lo, (self.code_gpu_va >> 8) as u32),
            (sh.pgm_hi, ((self.code_gpu_va >> 40) & 0xFF) as u32),
            (sh.pgm_rsrc1, self.rsrc1.0),
            (sh.pgm_rsrc2, self.rsrc2.0),
        ]
    }

    pub fn context_registers(&self) -> &[(u32, u32)] {
        &self.context_regs
    }

    fn context_value(&self, addr: u32) -> Option<u32> {
        self.context_regs
            .iter()
            .find(|(a, _)| *a == addr)
            .map(|(_, value)| *value)
    }
}

/// The chunks of every active hardware stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderChunks {
    chunks: [Option<StageChunk>; NUM_HW_STAGES],
}

impl ShaderChunks {
    pub fn build(
        load_info: &PipelineLoadInfo,
        metadata: &PipelineMetadata,
        registers: &RegisterVector,
        code_gpu_va: u64,
    ) -> Self {
        let mut chunks: [Option<StageChunk>; NUM_HW_STAGES] = Default::default();
        for stage in load_info.hw_stages.stages() {
            let entry_offset = metadata.stage(stage).map_or(0, |m| m.entry_offset);
            chunks[stage.index()] = Some(StageChunk::build(
                stage,
                code_gpu_va.wrapping_add(entry_offset),
                load_info,
                registers,
            ));
        }
        Self { chunks }
    }

    pub fn stage(&self, stage: HwShaderStage) -> Option<&StageChunk> {
        self.chunks[stage.index()].as_ref()
    }

    /// Active chunks in hardware pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = &StageChunk> + '_ {
        self.chunks.iter().flatten()
    }

    fn vs_value(&self, addr: u32) -> u32 {
        self.stage(HwShaderStage::Vs)
            .and_then(|chunk| chunk.context_value(addr))
            .unwrap_or(0)
    }

    pub fn vgt_strmout_buffer_config(&self) -> VgtStrmoutBufferConfig {
        VgtStrmoutBufferConfig(self.vs_value(regs::VGT_STRMOUT_BUFFER_CONFIG))
    }

    pub fn vgt_strmout_vtx_stride(&self, index: usize) -> VgtStrmoutVtxStride {
        debug_assert!(index < MAX_STREAM_OUT_BUFFERS);
        let addr = regs::VGT_STRMOUT_VTX_STRIDE_0 + index as u32 * VGT_STRMOUT_VTX_STRIDE_STEP;
        VgtStrmoutVtxStride(self.vs_value(addr))
    }

    pub fn spi_vs_out_config(&self) -> SpiVsOutConfig {
        SpiVsOutConfig(self.vs_value(regs::SPI_VS_OUT_CONFIG))
    }

    pub fn spi_ps_in_control(&self) -> SpiPsInControl {
        SpiPsInControl(
            self.stage(HwShaderStage::Ps)
                .and_then(|chunk| chunk.context_value(regs::SPI_PS_IN_CONTROL))
                .unwrap_or(0),
        )
    }

    /// `SPI_SHADER_COL_FORMAT`, or zero without a pixel shader.
    pub fn spi_shader_col_format(&self) -> u32 {
        self.stage(HwShaderStage::Ps)
            .and_then(|chunk| chunk.context_value(regs::SPI_SHADER_COL_FORMAT))
            .unwrap_or(0)
    }

    pub fn spi_ps_input_ena(&self) -> u32 {
        self.stage(HwShaderStage::Ps)
            .and_then(|chunk| chunk.context_value(regs::SPI_PS_INPUT_ENA))
            .unwrap_or(0)
    }
}
