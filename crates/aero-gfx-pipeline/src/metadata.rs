//! Decoding of the compiler's pipeline metadata.
//!
//! The compiler describes a pipeline with a per-hardware-stage block (code location and resource
//! usage) plus a register vector: the values it wants in every context and SH register it
//! assigned. User-data registers in that vector do not hold register values; they hold mapping
//! codes that say which logical entry (or which special value) the driver must load there.

use hashbrown::HashMap;
use tracing::trace;

use crate::create_info::GraphicsPipelineCreateInfo;
use crate::error::MetadataError;
use crate::regs::{
    self, SpiPsInControl, VgtGsMode, VgtShaderStagesEn, MAX_PS_INTERPOLATORS, MAX_USER_DATA_REGS,
    VGT_ESGS_RING_ITEMSIZE, VGT_GSVS_RING_ITEMSIZE, VGT_GS_MODE_ONCHIP,
};
use crate::signature::{GraphicsPipelineSignature, UserDataEntryMap, UNMAPPED_ENTRY};
use crate::stage::{hw_stages_for, HwShaderStage, HwStageMask, ShaderStageFlags, NUM_HW_STAGES};

/// Register address to value map supplied by the compiler.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterVector {
    map: HashMap<u32, u32>,
}

impl RegisterVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a blob of little-endian `(address, value)` dword pairs.
    pub fn parse(bytes: &[u8]) -> Result<Self, MetadataError> {
        if bytes.len() % 8 != 0 {
            return Err(MetadataError::MalformedRegisterBlob { len: bytes.len() });
        }
        Ok(bytes
            .chunks_exact(8)
            .map(|pair| (read_u32_le(&pair[0..4]), read_u32_le(&pair[4..8])))
            .collect())
    }

    pub fn insert(&mut self, addr: u32, value: u32) -> Option<u32> {
        self.map.insert(addr, value)
    }

    pub fn get(&self, addr: u32) -> Option<u32> {
        self.map.get(&addr).copied()
    }

    /// Registers the compiler left out default to zero.
    pub fn get_or_zero(&self, addr: u32) -> u32 {
        self.get(addr).unwrap_or(0)
    }

    pub fn contains(&self, addr: u32) -> bool {
        self.map.contains_key(&addr)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.map.iter().map(|(&addr, &value)| (addr, value))
    }
}

impl FromIterator<(u32, u32)> for RegisterVector {
    fn from_iter<I: IntoIterator<Item = (u32, u32)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct HwStageMetadata {
    /// Byte offset of the stage's entry point from the start of the pipeline code.
    pub entry_offset: u64,
    pub code_size: u64,
    pub scratch_bytes_per_thread: u32,
    pub lds_bytes: u32,
    pub uses_uavs: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineMetadata {
    pub stages: [Option<HwStageMetadata>; NUM_HW_STAGES],
    /// One past the highest logical user-data entry the pipeline reads.
    pub user_data_limit: u32,
    pub spill_threshold: u32,
    /// LDS reserved for ES to GS data when the geometry shader runs on chip.
    pub es_gs_lds_bytes: u32,
}

impl Default for PipelineMetadata {
    fn default() -> Self {
        Self {
            stages: [None; NUM_HW_STAGES],
            user_data_limit: 0,
            spill_threshold: u32::MAX,
            es_gs_lds_bytes: 0,
        }
    }
}

impl PipelineMetadata {
    pub fn stage(&self, stage: HwShaderStage) -> Option<&HwStageMetadata> {
        self.stages[stage.index()].as_ref()
    }

    pub fn with_stage(mut self, stage: HwShaderStage, metadata: HwStageMetadata) -> Self {
        self.stages[stage.index()] = Some(metadata);
        self
    }
}

/// Meaning of a value the compiler stored in a `SPI_SHADER_USER_DATA_*` register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UserDataMapping {
    /// Logical user-data entry.
    Entry(u32),
    GlobalTable,
    PerShaderTable,
    SpillTable,
    BaseVertex,
    BaseInstance,
    DrawIndex,
    Workgroup,
    EsGsLdsSize,
    ViewId,
    StreamOutTable,
    VertexBufferTable,
}

impl UserDataMapping {
    const SPECIAL_BASE: u32 = 0x1000_0000;

    pub fn from_raw(raw: u32) -> Option<Self> {
        let mapping = match raw {
            entry if entry < Self::SPECIAL_BASE => UserDataMapping::Entry(entry),
            0x1000_0000 => UserDataMapping::GlobalTable,
            0x1000_0001 => UserDataMapping::PerShaderTable,
            0x1000_0002 => UserDataMapping::SpillTable,
            0x1000_0003 => UserDataMapping::BaseVertex,
            0x1000_0004 => UserDataMapping::BaseInstance,
            0x1000_0005 => UserDataMapping::DrawIndex,
            0x1000_0006 => UserDataMapping::Workgroup,
            0x1000_000A => UserDataMapping::EsGsLdsSize,
            0x1000_000B => UserDataMapping::ViewId,
            0x1000_000C => UserDataMapping::StreamOutTable,
            0x1000_000F => UserDataMapping::VertexBufferTable,
            _ => return None,
        };
        Some(mapping)
    }

    pub fn to_raw(self) -> u32 {
        match self {
            UserDataMapping::Entry(entry) => entry,
            UserDataMapping::GlobalTable => 0x1000_0000,
            UserDataMapping::PerShaderTable => 0x1000_0001,
            UserDataMapping::SpillTable => 0x1000_0002,
            UserDataMapping::BaseVertex => 0x1000_0003,
            UserDataMapping::BaseInstance => 0x1000_0004,
            UserDataMapping::DrawIndex => 0x1000_0005,
            UserDataMapping::Workgroup => 0x1000_0006,
            UserDataMapping::EsGsLdsSize => 0x1000_000A,
            UserDataMapping::ViewId => 0x1000_000B,
            UserDataMapping::StreamOutTable => 0x1000_000C,
            UserDataMapping::VertexBufferTable => 0x1000_000F,
        }
    }
}

/// Facts about the pipeline that later construction steps need.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineLoadInfo {
    pub api_stages: ShaderStageFlags,
    pub hw_stages: HwStageMask,
    pub uses_gs: bool,
    pub uses_tess: bool,
    pub uses_onchip_tess: bool,
    pub uses_onchip_gs: bool,
    pub es_gs_lds_size_reg_gs: u16,
    pub es_gs_lds_size_reg_vs: u16,
    pub interpolator_count: u32,
    /// Filled in once the register state has been built.
    pub loaded_sh_reg_count: u32,
    pub loaded_ctx_reg_count: u32,
}

/// Per-item ring sizes and scratch demand the queue must provision before the pipeline can run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RingItemSizes {
    pub es_gs: u32,
    pub gs_vs: u32,
    pub tess_factor: u32,
    pub offchip_lds: u32,
    pub scratch_dwords: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decoded {
    pub load_info: PipelineLoadInfo,
    pub signature: GraphicsPipelineSignature,
    pub ring_sizes: RingItemSizes,
}

pub fn decode(
    create_info: &GraphicsPipelineCreateInfo,
    metadata: &PipelineMetadata,
    registers: &RegisterVector,
) -> Result<Decoded, MetadataError> {
    let api = create_info.stages;
    if api.intersects(ShaderStageFlags::HULL | ShaderStageFlags::DOMAIN) && !api.tess_enabled() {
        return Err(MetadataError::IncompleteTessellation);
    }

    let hw_stages = hw_stages_for(api);
    for stage in hw_stages.stages() {
        if metadata.stage(stage).is_none() {
            return Err(MetadataError::MissingStage(stage));
        }
        let sh = stage.sh_regs();
        for addr in [sh.pgm_rsrc1, sh.pgm_rsrc2] {
            if !registers.contains(addr) {
                return Err(MetadataError::MissingRegister { stage, addr });
            }
        }
    }

    for (addr, value) in registers.iter() {
        if !regs::is_context_reg(addr) && !regs::is_sh_reg(addr) {
            trace!(addr, value, "ignoring register outside context and persistent space");
        }
    }

    let signature = decode_signature(metadata, registers, hw_stages);

    let uses_tess = api.tess_enabled();
    let uses_gs = api.gs_enabled();
    let stages_en = VgtShaderStagesEn(registers.get_or_zero(VgtShaderStagesEn::ADDR));
    let gs_mode = VgtGsMode(registers.get_or_zero(VgtGsMode::ADDR));
    let interpolator_count = if hw_stages.contains(HwStageMask::PS) {
        SpiPsInControl(registers.get_or_zero(regs::SPI_PS_IN_CONTROL))
            .num_interp()
            .min(MAX_PS_INTERPOLATORS as u32)
    } else {
        0
    };

    let load_info = PipelineLoadInfo {
        api_stages: api,
        hw_stages,
        uses_gs,
        uses_tess,
        uses_onchip_tess: uses_tess && stages_en.dynamic_hs() == 0,
        uses_onchip_gs: uses_gs && gs_mode.onchip() == VGT_GS_MODE_ONCHIP,
        es_gs_lds_size_reg_gs: signature.es_gs_lds_size_reg_gs,
        es_gs_lds_size_reg_vs: signature.es_gs_lds_size_reg_vs,
        interpolator_count,
        loaded_sh_reg_count: 0,
        loaded_ctx_reg_count: 0,
    };

    let ring_sizes = ring_item_sizes(&load_info, metadata, registers);

    Ok(Decoded {
        load_info,
        signature,
        ring_sizes,
    })
}

fn decode_signature(
    metadata: &PipelineMetadata,
    registers: &RegisterVector,
    hw_stages: HwStageMask,
) -> GraphicsPipelineSignature {
    let mut signature = GraphicsPipelineSignature {
        spill_threshold: metadata.spill_threshold,
        user_data_limit: metadata.user_data_limit,
        ..GraphicsPipelineSignature::default()
    };

    for stage in hw_stages.stages() {
        let sh = stage.sh_regs();
        let mut slots = Vec::with_capacity(MAX_USER_DATA_REGS);
        let mut spill_table_reg_addr = None;

        for index in 0..MAX_USER_DATA_REGS {
            let addr = sh.user_data(index);
            let Some(raw) = registers.get(addr) else {
                continue;
            };
            let reg = addr as u16;
            match UserDataMapping::from_raw(raw) {
                Some(UserDataMapping::Entry(entry)) => match u8::try_from(entry) {
                    Ok(entry) if entry != UNMAPPED_ENTRY => slots.push((index, entry)),
                    _ => trace!(%stage, addr, entry, "ignoring user-data entry beyond 8-bit range"),
                },
                Some(UserDataMapping::SpillTable) => spill_table_reg_addr = Some(reg),
                Some(UserDataMapping::VertexBufferTable) => {
                    signature.vertex_buf_table_reg_addr = reg
                }
                Some(UserDataMapping::StreamOutTable) => signature.stream_out_table_reg_addr = reg,
                Some(UserDataMapping::BaseVertex) => signature.vertex_offset_reg_addr = reg,
                Some(UserDataMapping::DrawIndex) => signature.draw_index_reg_addr = reg,
                Some(UserDataMapping::ViewId) => signature.view_id_reg_addr[stage.index()] = reg,
                Some(UserDataMapping::EsGsLdsSize) => match stage {
                    HwShaderStage::Gs => signature.es_gs_lds_size_reg_gs = reg,
                    HwShaderStage::Vs => signature.es_gs_lds_size_reg_vs = reg,
                    _ => trace!(%stage, addr, "ignoring ES/GS LDS size mapping on this stage"),
                },
                Some(
                    UserDataMapping::GlobalTable
                    | UserDataMapping::PerShaderTable
                    | UserDataMapping::BaseInstance
                    | UserDataMapping::Workgroup,
                ) => {}
                None => trace!(%stage, addr, raw, "ignoring unknown user-data mapping"),
            }
        }

        let mut map = UserDataEntryMap::from_slots(sh.user_data_0, &slots);
        if let Some(addr) = spill_table_reg_addr {
            map.spill_table_reg_addr = addr;
        }
        signature.stages[stage.index()] = map;
    }

    signature.finalize();
    signature
}

fn ring_item_sizes(
    load_info: &PipelineLoadInfo,
    metadata: &PipelineMetadata,
    registers: &RegisterVector,
) -> RingItemSizes {
    let max_scratch = load_info
        .hw_stages
        .stages()
        .filter_map(|stage| metadata.stage(stage))
        .map(|stage| stage.scratch_bytes_per_thread)
        .max()
        .unwrap_or(0);

    let (es_gs, gs_vs) = if load_info.uses_gs {
        (
            registers.get_or_zero(VGT_ESGS_RING_ITEMSIZE),
            registers.get_or_zero(VGT_GSVS_RING_ITEMSIZE),
        )
    } else {
        (0, 0)
    };

    RingItemSizes {
        es_gs,
        gs_vs,
        tess_factor: u32::from(load_info.uses_tess),
        offchip_lds: u32::from(load_info.uses_tess && !load_info.uses_onchip_tess),
        scratch_dwords: max_scratch.div_ceil(4),
    }
}
