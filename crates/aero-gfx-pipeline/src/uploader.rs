//! Staging of register tables for the indexed-load bind path.
//!
//! The uploader collects `(offset, value)` entries on the CPU, reserves one device-visible
//! allocation, and lays the context table out first with the SH table immediately after it.

use std::sync::Mutex;

use crate::error::UploadError;
use crate::pm4::{GpuMemoryRead, RegisterEntry};
use crate::regs::{self, CONTEXT_SPACE_START, PERSISTENT_SPACE_START};

/// Alignment of the table allocation; the command processor fetches tables in 256-byte lines.
pub const REGISTER_TABLE_ALIGNMENT: u64 = 256;

/// Round `value` up to the nearest multiple of `alignment`.
///
/// `alignment` must be > 0.
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment > 0);
    match value.checked_add(alignment - 1) {
        Some(v) => v / alignment * alignment,
        None => u64::MAX / alignment * alignment,
    }
}

/// Reserves device-visible memory. Implementations must be usable from several threads.
pub trait GpuMemoryAllocator: Send + Sync {
    /// Returns the GPU virtual address of `size_bytes` bytes aligned to `alignment`.
    fn allocate(&self, size_bytes: u64, alignment: u64) -> Result<u64, UploadError>;
}

/// Bump allocator over a fixed GPU VA window.
#[derive(Debug)]
pub struct LinearGpuAllocator {
    base: u64,
    capacity: u64,
    cursor: Mutex<u64>,
}

impl LinearGpuAllocator {
    /// Allocates from `[base, base + capacity)`.
    pub fn new(base: u64, capacity: u64) -> Self {
        Self {
            base,
            capacity,
            cursor: Mutex::new(base),
        }
    }

    fn end(&self) -> u64 {
        self.base.saturating_add(self.capacity)
    }

    /// Bytes not yet handed out, ignoring alignment padding.
    pub fn remaining(&self) -> u64 {
        let cursor = *self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        self.end().saturating_sub(cursor)
    }

    pub fn reset(&self) {
        *self.cursor.lock().unwrap_or_else(|e| e.into_inner()) = self.base;
    }
}

impl GpuMemoryAllocator for LinearGpuAllocator {
    fn allocate(&self, size_bytes: u64, alignment: u64) -> Result<u64, UploadError> {
        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        let start = align_up(*cursor, alignment);
        let end = start.checked_add(size_bytes).filter(|&end| end <= self.end());
        let Some(end) = end else {
            return Err(UploadError::OutOfDeviceMemory {
                requested: size_bytes,
                available: self.end().saturating_sub(start),
            });
        };
        *cursor = end;
        Ok(start)
    }
}

/// Bytes written to a device-visible allocation, together with its GPU address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GpuMemory {
    pub gpu_va: u64,
    pub data: Vec<u8>,
}

impl GpuMemoryRead for GpuMemory {
    fn read(&self, gpu_va: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(gpu_va.checked_sub(self.gpu_va)?).ok()?;
        self.data.get(start..start.checked_add(len)?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UploadedRegisterTables {
    pub memory: GpuMemory,
    pub ctx_table_gpu_va: u64,
    pub ctx_count: u32,
    pub sh_table_gpu_va: u64,
    pub sh_count: u32,
}

#[derive(Debug)]
pub struct PipelineUploader {
    expected_ctx: usize,
    expected_sh: usize,
    ctx: Vec<RegisterEntry>,
    sh: Vec<RegisterEntry>,
}

impl PipelineUploader {
    pub fn new(ctx_count: usize, sh_count: usize) -> Self {
        Self {
            expected_ctx: ctx_count,
            expected_sh: sh_count,
            ctx: Vec::with_capacity(ctx_count),
            sh: Vec::with_capacity(sh_count),
        }
    }

    pub fn add_ctx_reg(&mut self, addr: u32, value: u32) {
        debug_assert!(regs::is_context_reg(addr));
        self.ctx.push(RegisterEntry {
            offset: addr - CONTEXT_SPACE_START,
            value,
        });
    }

    pub fn add_sh_reg(&mut self, addr: u32, value: u32) {
        debug_assert!(regs::is_sh_reg(addr));
        self.sh.push(RegisterEntry {
            offset: addr - PERSISTENT_SPACE_START,
            value,
        });
    }

    pub fn finish(
        self,
        allocator: &dyn GpuMemoryAllocator,
    ) -> Result<UploadedRegisterTables, UploadError> {
        for (table, expected, actual) in [
            ("context", self.expected_ctx, self.ctx.len()),
            ("sh", self.expected_sh, self.sh.len()),
        ] {
            if expected != actual {
                return Err(UploadError::CountMismatch {
                    table,
                    expected,
                    actual,
                });
            }
        }

        let ctx_bytes: &[u8] = bytemuck::cast_slice(&self.ctx);
        let sh_bytes: &[u8] = bytemuck::cast_slice(&self.sh);
        let size = (ctx_bytes.len() + sh_bytes.len()) as u64;
        let gpu_va = allocator.allocate(size, REGISTER_TABLE_ALIGNMENT)?;

        let mut data = Vec::with_capacity(ctx_bytes.len() + sh_bytes.len());
        data.extend_from_slice(ctx_bytes);
        data.extend_from_slice(sh_bytes);

        Ok(UploadedRegisterTables {
            ctx_table_gpu_va: gpu_va,
            ctx_count: self.ctx.len() as u32,
            sh_table_gpu_va: gpu_va + ctx_bytes.len() as u64,
            sh_count: self.sh.len() as u32,
            memory: GpuMemory { gpu_va, data },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_handles_overflow() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(u64::MAX, 256), u64::MAX / 256 * 256);
    }

    #[test]
    fn linear_allocator_aligns_and_exhausts() {
        let alloc = LinearGpuAllocator::new(0x1000, 0x200);
        assert_eq!(alloc.allocate(8, 256).unwrap(), 0x1000);
        assert_eq!(alloc.allocate(8, 256).unwrap(), 0x1100);
        assert_eq!(
            alloc.allocate(8, 256),
            Err(UploadError::OutOfDeviceMemory {
                requested: 8,
                available: 0
            })
        );
        alloc.reset();
        assert_eq!(alloc.remaining(), 0x200);
    }

    #[test]
    fn tables_are_laid_out_back_to_back() {
        let mut uploader = PipelineUploader::new(2, 1);
        uploader.add_ctx_reg(0xA203, 1);
        uploader.add_ctx_reg(0xA08E, 2);
        uploader.add_sh_reg(0x2C48, 3);
        let alloc = LinearGpuAllocator::new(0x10_0000, 0x1000);
        let tables = uploader.finish(&alloc).unwrap();

        assert_eq!(tables.ctx_table_gpu_va, 0x10_0000);
        assert_eq!(tables.sh_table_gpu_va, 0x10_0010);
        assert_eq!(tables.ctx_count, 2);
        assert_eq!(tables.sh_count, 1);
        let sh = tables.memory.read(tables.sh_table_gpu_va, 8).unwrap();
        assert_eq!(
            bytemuck::pod_read_unaligned::<RegisterEntry>(sh),
            RegisterEntry {
                offset: 0x48,
                value: 3
            }
        );
    }

    #[test]
    fn count_mismatch_is_reported() {
        let mut uploader = PipelineUploader::new(1, 0);
        uploader.add_sh_reg(0x2C48, 3);
        let alloc = LinearGpuAllocator::new(0, 0x1000);
        assert_eq!(
            uploader.finish(&alloc).unwrap_err(),
            UploadError::CountMismatch {
                table: "context",
                expected: 1,
                actual: 0
            }
        );
    }
}
