//! PM4 type-3 packet encoding and a reference command processor.
//!
//! Only the packets a graphics pipeline emits are covered. [`RegisterFile`] replays a dword stream
//! the way the command processor would and records the resulting register values, which makes
//! it possible to compare two encodings of the same register program.

use std::collections::BTreeMap;

use bytemuck::{Pod, Zeroable};

use crate::error::ReplayError;
use crate::regs::{self, CONTEXT_SPACE_START, PERSISTENT_SPACE_START};

pub const PM4_TYPE_3: u32 = 3;

/// Largest byte count a single `DMA_DATA` packet can move.
pub const DMA_MAX_BYTE_COUNT: u32 = (1 << 21) - 1;

const DMA_DATA_DST_SEL_NOWHERE: u32 = 2;
const DMA_DATA_SRC_SEL_SRC_ADDR_USING_L2: u32 = 3;
const LOAD_INDEX_DATA_FORMAT_OFFSET_AND_DATA: u32 = 1;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop = 0x10,
    DmaData = 0x50,
    ContextRegRmw = 0x51,
    LoadShRegIndex = 0x63,
    SetContextReg = 0x69,
    SetShReg = 0x76,
    LoadContextRegIndex = 0x9F,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x10 => Opcode::Nop,
            0x50 => Opcode::DmaData,
            0x51 => Opcode::ContextRegRmw,
            0x63 => Opcode::LoadShRegIndex,
            0x69 => Opcode::SetContextReg,
            0x76 => Opcode::SetShReg,
            0x9F => Opcode::LoadContextRegIndex,
            _ => return None,
        })
    }
}

/// Header of a type-3 packet carrying `body_dwords` dwords after the header.
pub const fn type3_header(opcode: Opcode, body_dwords: u32) -> u32 {
    (PM4_TYPE_3 << 30) | (((body_dwords - 1) & 0x3FFF) << 16) | ((opcode as u32) << 8)
}

/// One entry of a register table consumed by the `LOAD_*_REG_INDEX` packets.
///
/// `offset` is relative to the start of the register space the packet targets.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct RegisterEntry {
    pub offset: u32,
    pub value: u32,
}

impl RegisterEntry {
    pub const SIZE_BYTES: usize = core::mem::size_of::<RegisterEntry>();
}

/// A caller-owned dword buffer that packets are appended to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CmdStream {
    words: Vec<u32>,
}

impl CmdStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(dwords: usize) -> Self {
        Self {
            words: Vec::with_capacity(dwords),
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Copies a prebuilt packet image into the stream.
    pub fn append(&mut self, image: &CmdStream) {
        self.words.extend_from_slice(&image.words);
    }

    fn packet(&mut self, opcode: Opcode, body: &[u32]) {
        self.words.reserve(body.len() + 1);
        self.words.push(type3_header(opcode, body.len() as u32));
        self.words.extend_from_slice(body);
    }

    fn set_regs(&mut self, opcode: Opcode, space_start: u32, first_addr: u32, values: &[u32]) {
        debug_assert!(!values.is_empty());
        self.words.reserve(values.len() + 2);
        self.words.push(type3_header(opcode, values.len() as u32 + 1));
        self.words.push(first_addr - space_start);
        self.words.extend_from_slice(values);
    }

    pub fn set_context_regs(&mut self, first_addr: u32, values: &[u32]) {
        debug_assert!(regs::is_context_reg(first_addr));
        self.set_regs(Opcode::SetContextReg, CONTEXT_SPACE_START, first_addr, values);
    }

    pub fn set_sh_regs(&mut self, first_addr: u32, values: &[u32]) {
        debug_assert!(regs::is_sh_reg(first_addr));
        self.set_regs(Opcode::SetShReg, PERSISTENT_SPACE_START, first_addr, values);
    }

    pub fn set_context_reg(&mut self, addr: u32, value: u32) {
        self.set_context_regs(addr, &[value]);
    }

    pub fn set_sh_reg(&mut self, addr: u32, value: u32) {
        self.set_sh_regs(addr, &[value]);
    }

    /// Emits `SET_CONTEXT_REG` packets for `(address, value)` pairs, merging runs of consecutive
    /// addresses into one packet. Pair order is preserved.
    pub fn set_context_reg_runs(&mut self, pairs: &[(u32, u32)]) {
        for (first, values) in consecutive_runs(pairs) {
            self.set_context_regs(first, &values);
        }
    }

    pub fn set_sh_reg_runs(&mut self, pairs: &[(u32, u32)]) {
        for (first, values) in consecutive_runs(pairs) {
            self.set_sh_regs(first, &values);
        }
    }

    /// Replaces the bits of `addr` selected by `mask` with the same bits of `data`.
    pub fn context_reg_rmw(&mut self, addr: u32, mask: u32, data: u32) {
        debug_assert!(regs::is_context_reg(addr));
        self.packet(
            Opcode::ContextRegRmw,
            &[addr - CONTEXT_SPACE_START, mask, data],
        );
    }

    pub fn load_context_reg_index(&mut self, table_gpu_va: u64, count: u32) {
        self.load_index(Opcode::LoadContextRegIndex, table_gpu_va, count);
    }

    pub fn load_sh_reg_index(&mut self, table_gpu_va: u64, count: u32) {
        self.load_index(Opcode::LoadShRegIndex, table_gpu_va, count);
    }

    fn load_index(&mut self, opcode: Opcode, table_gpu_va: u64, count: u32) {
        debug_assert_eq!(table_gpu_va % 4, 0);
        self.packet(
            opcode,
            &[
                table_gpu_va as u32,
                (table_gpu_va >> 32) as u32,
                LOAD_INDEX_DATA_FORMAT_OFFSET_AND_DATA << 31,
                count,
            ],
        );
    }

    /// Prefetches `size_bytes` at `gpu_va` into L2 without writing anywhere.
    pub fn dma_prefetch(&mut self, gpu_va: u64, size_bytes: u64) {
        let byte_count = size_bytes.min(u64::from(DMA_MAX_BYTE_COUNT)) as u32;
        self.packet(
            Opcode::DmaData,
            &[
                (DMA_DATA_DST_SEL_NOWHERE << 20) | (DMA_DATA_SRC_SEL_SRC_ADDR_USING_L2 << 29),
                gpu_va as u32,
                (gpu_va >> 32) as u32,
                0,
                0,
                byte_count,
            ],
        );
    }
}

fn consecutive_runs(pairs: &[(u32, u32)]) -> Vec<(u32, Vec<u32>)> {
    let mut runs: Vec<(u32, Vec<u32>)> = Vec::new();
    for &(addr, value) in pairs {
        if let Some((first, values)) = runs.last_mut() {
            if *first + values.len() as u32 == addr {
                values.push(value);
                continue;
            }
        }
        runs.push((addr, vec![value]));
    }
    runs
}

/// Read access to GPU memory, as seen by the command processor.
pub trait GpuMemoryRead {
    /// Returns `len` bytes starting at `gpu_va`, or `None` if the range is not backed.
    fn read(&self, gpu_va: u64, len: usize) -> Option<&[u8]>;
}

/// A `DMA_DATA` prefetch observed during replay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Prefetch {
    pub gpu_va: u64,
    pub byte_count: u32,
}

/// Register values produced by replaying packets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterFile {
    context: BTreeMap<u32, u32>,
    sh: BTreeMap<u32, u32>,
    prefetches: Vec<Prefetch>,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context_reg(&self, addr: u32) -> Option<u32> {
        self.context.get(&addr).copied()
    }

    pub fn sh_reg(&self, addr: u32) -> Option<u32> {
        self.sh.get(&addr).copied()
    }

    pub fn context_regs(&self) -> &BTreeMap<u32, u32> {
        &self.context
    }

    pub fn sh_regs(&self) -> &BTreeMap<u32, u32> {
        &self.sh
    }

    pub fn prefetches(&self) -> &[Prefetch] {
        &self.prefetches
    }

    /// Replays `words`. `memory` backs the tables read by load-index packets.
    pub fn execute(
        &mut self,
        words: &[u32],
        memory: Option<&dyn GpuMemoryRead>,
    ) -> Result<(), ReplayError> {
        let mut offset = 0;
        while offset < words.len() {
            let header = words[offset];
            if header >> 30 != PM4_TYPE_3 {
                return Err(ReplayError::NotType3 { offset, header });
            }
            let body_len = (((header >> 16) & 0x3FFF) + 1) as usize;
            let raw_opcode = ((header >> 8) & 0xFF) as u8;
            let body = words
                .get(offset + 1..offset + 1 + body_len)
                .ok_or(ReplayError::Truncated { offset })?;

            let opcode = Opcode::from_u8(raw_opcode).ok_or(ReplayError::UnsupportedOpcode {
                offset,
                opcode: raw_opcode,
            })?;
            match opcode {
                Opcode::Nop => {}
                Opcode::SetContextReg => {
                    let first = CONTEXT_SPACE_START + body[0];
                    for (i, &value) in body[1..].iter().enumerate() {
                        self.write_context(first + i as u32, value, opcode)?;
                    }
                }
                Opcode::SetShReg => {
                    let first = PERSISTENT_SPACE_START + body[0];
                    for (i, &value) in body[1..].iter().enumerate() {
                        self.write_sh(first + i as u32, value, opcode)?;
                    }
                }
                Opcode::ContextRegRmw => {
                    let [reg_offset, mask, data] = body_array::<3>(body, offset)?;
                    let addr = CONTEXT_SPACE_START + reg_offset;
                    let old = self.context_reg(addr).unwrap_or(0);
                    self.write_context(addr, (old & !mask) | (data & mask), opcode)?;
                }
                Opcode::LoadContextRegIndex | Opcode::LoadShRegIndex => {
                    let [lo, hi, _format, count] = body_array::<4>(body, offset)?;
                    let gpu_va = u64::from(lo) | (u64::from(hi) << 32);
                    let memory = memory.ok_or(ReplayError::NoMemory { gpu_va })?;
                    let len = count as usize * RegisterEntry::SIZE_BYTES;
                    let bytes = memory
                        .read(gpu_va, len)
                        .filter(|bytes| bytes.len() == len)
                        .ok_or(ReplayError::MemoryOutOfBounds { gpu_va, len })?;
                    for chunk in bytes.chunks_exact(RegisterEntry::SIZE_BYTES) {
                        let entry: RegisterEntry = bytemuck::pod_read_unaligned(chunk);
                        if opcode == Opcode::LoadContextRegIndex {
                            self.write_context(CONTEXT_SPACE_START + entry.offset, entry.value, opcode)?;
                        } else {
                            self.write_sh(PERSISTENT_SPACE_START + entry.offset, entry.value, opcode)?;
                        }
                    }
                }
                Opcode::DmaData => {
                    let [_control, lo, hi, _dst_lo, _dst_hi, command] = body_array::<6>(body, offset)?;
                    self.prefetches.push(Prefetch {
                        gpu_va: u64::from(lo) | (u64::from(hi) << 32),
                        byte_count: command & DMA_MAX_BYTE_COUNT,
                    });
                }
            }
            offset += 1 + body_len;
        }
        Ok(())
    }

    fn write_context(&mut self, addr: u32, value: u32, opcode: Opcode) -> Result<(), ReplayError> {
        if !regs::is_context_reg(addr) {
            return Err(ReplayError::RegisterOutOfRange {
                addr,
                opcode: opcode as u8,
            });
        }
        self.context.insert(addr, value);
        Ok(())
    }

    fn write_sh(&mut self, addr: u32, value: u32, opcode: Opcode) -> Result<(), ReplayError> {
        if !regs::is_sh_reg(addr) {
            return Err(ReplayError::RegisterOutOfRange {
                addr,
                opcode: opcode as u8,
            });
        }
        self.sh.insert(addr, value);
        Ok(())
    }
}

fn body_array<const N: usize>(body: &[u32], offset: usize) -> Result<[u32; N], ReplayError> {
    body.get(..N)
        .and_then(|slice| <[u32; N]>::try_from(slice).ok())
        .ok_or(ReplayError::Truncated { offset })
}
