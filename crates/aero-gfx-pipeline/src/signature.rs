//! Where the compiler placed each piece of user data, per hardware stage.
//!
//! The command-buffer layer reads the signature when a pipeline is bound to decide which SH
//! registers receive which logical user-data entries.

use xxhash_rust::xxh3::xxh3_64;

use crate::regs::MAX_USER_DATA_REGS;
use crate::stage::{HwShaderStage, NUM_HW_STAGES};

/// Register address sentinel meaning "not mapped by this pipeline".
pub const USER_DATA_NOT_MAPPED: u16 = 0;

/// `mapped_entry` sentinel for user SGPRs that hold no logical entry.
pub const UNMAPPED_ENTRY: u8 = 0xFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserDataEntryMap {
    /// Address of the first user SGPR that holds a logical entry.
    pub first_user_sgpr_reg_addr: u16,
    pub user_sgpr_count: u8,
    /// Logical entry loaded into `first_user_sgpr_reg_addr + i`.
    pub mapped_entry: [u8; MAX_USER_DATA_REGS],
    pub spill_table_reg_addr: u16,
}

impl Default for UserDataEntryMap {
    fn default() -> Self {
        Self {
            first_user_sgpr_reg_addr: USER_DATA_NOT_MAPPED,
            user_sgpr_count: 0,
            mapped_entry: [UNMAPPED_ENTRY; MAX_USER_DATA_REGS],
            spill_table_reg_addr: USER_DATA_NOT_MAPPED,
        }
    }
}

impl UserDataEntryMap {
    /// Builds the map from `(register index, logical entry)` pairs relative to `USER_DATA_0`.
    pub(crate) fn from_slots(user_data_0: u32, slots: &[(usize, u8)]) -> Self {
        let mut map = Self::default();
        let (Some(first), Some(last)) = (
            slots.iter().map(|(i, _)| *i).min(),
            slots.iter().map(|(i, _)| *i).max(),
        ) else {
            return map;
        };

        map.first_user_sgpr_reg_addr = (user_data_0 + first as u32) as u16;
        map.user_sgpr_count = (last - first + 1) as u8;
        for &(index, entry) in slots {
            map.mapped_entry[index - first] = entry;
        }
        map
    }

    pub fn entry(&self, index: usize) -> Option<u8> {
        if index >= usize::from(self.user_sgpr_count) {
            return None;
        }
        match self.mapped_entry[index] {
            UNMAPPED_ENTRY => None,
            entry => Some(entry),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user_sgpr_count == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineSignature {
    pub stages: [UserDataEntryMap; NUM_HW_STAGES],
    pub vertex_buf_table_reg_addr: u16,
    pub stream_out_table_reg_addr: u16,
    /// Base vertex; base instance is always the following register.
    pub vertex_offset_reg_addr: u16,
    pub draw_index_reg_addr: u16,
    pub view_id_reg_addr: [u16; NUM_HW_STAGES],
    pub es_gs_lds_size_reg_gs: u16,
    pub es_gs_lds_size_reg_vs: u16,
    /// First logical entry that lives in the spill table rather than in registers.
    pub spill_threshold: u32,
    pub user_data_limit: u32,
    /// Hash of every field above; equal hashes mean the bind path can skip user-data remapping.
    pub user_data_hash: u64,
}

impl Default for GraphicsPipelineSignature {
    fn default() -> Self {
        Self {
            stages: [UserDataEntryMap::default(); NUM_HW_STAGES],
            vertex_buf_table_reg_addr: USER_DATA_NOT_MAPPED,
            stream_out_table_reg_addr: USER_DATA_NOT_MAPPED,
            vertex_offset_reg_addr: USER_DATA_NOT_MAPPED,
            draw_index_reg_addr: USER_DATA_NOT_MAPPED,
            view_id_reg_addr: [USER_DATA_NOT_MAPPED; NUM_HW_STAGES],
            es_gs_lds_size_reg_gs: USER_DATA_NOT_MAPPED,
            es_gs_lds_size_reg_vs: USER_DATA_NOT_MAPPED,
            spill_threshold: u32::MAX,
            user_data_limit: 0,
            user_data_hash: 0,
        }
    }
}

impl GraphicsPipelineSignature {
    pub fn stage(&self, stage: HwShaderStage) -> &UserDataEntryMap {
        &self.stages[stage.index()]
    }

    pub fn uses_view_instancing(&self) -> bool {
        self.view_id_reg_addr
            .iter()
            .any(|&addr| addr != USER_DATA_NOT_MAPPED)
    }

    pub(crate) fn finalize(&mut self) {
        self.user_data_hash = self.compute_user_data_hash();
    }

    fn compute_user_data_hash(&self) -> u64 {
        let mut bytes = Vec::with_capacity(NUM_HW_STAGES * 24 + 32);
        for map in &self.stages {
            bytes.extend_from_slice(&map.first_user_sgpr_reg_addr.to_le_bytes());
            bytes.push(map.user_sgpr_count);
            bytes.extend_from_slice(&map.mapped_entry);
            bytes.extend_from_slice(&map.spill_table_reg_addr.to_le_bytes());
        }
        for addr in [
            self.vertex_buf_table_reg_addr,
            self.stream_out_table_reg_addr,
            self.vertex_offset_reg_addr,
            self.draw_index_reg_addr,
            self.es_gs_lds_size_reg_gs,
            self.es_gs_lds_size_reg_vs,
        ]
        .into_iter()
        .chain(self.view_id_reg_addr)
        {
            bytes.extend_from_slice(&addr.to_le_bytes());
        }
        bytes.extend_from_slice(&self.spill_threshold.to_le_bytes());
        bytes.extend_from_slice(&self.user_data_limit.to_le_bytes());
        xxh3_64(&bytes)
    }
}
