//! Prebuilt packet images for binding a pipeline.
//!
//! The register program is encoded once, at construction, in exactly one of two forms:
//! indexed loads from an uploaded register table, or direct `SET_*_REG` packets. Binding then
//! reduces to copying dwords.

use tracing::debug;
use xxhash_rust::xxh3::Xxh3;

use crate::caps::{GpuCapabilities, GpuFeatures};
use crate::error::UploadError;
use crate::pm4::CmdStream;
use crate::register_state::RegisterState;
use crate::regs::{DbAlphaToMask, DbRenderOverride};
use crate::settings::PipelineSettings;
use crate::uploader::{GpuMemoryAllocator, PipelineUploader, UploadedRegisterTables};

const DB_ALPHA_TO_MASK_ENABLE_MASK: u32 = 1 << 0;
const DB_RENDER_OVERRIDE_DISABLE_VIEWPORT_CLAMP_MASK: u32 = 1 << 25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindPathKind {
    LoadIndex,
    Set,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindPath {
    /// Registers are fetched by the command processor from `tables`.
    LoadIndex {
        sh: CmdStream,
        ctx: CmdStream,
        tables: UploadedRegisterTables,
    },
    Set {
        sh: CmdStream,
        ctx: CmdStream,
    },
}

impl BindPath {
    pub fn kind(&self) -> BindPathKind {
        match self {
            BindPath::LoadIndex { .. } => BindPathKind::LoadIndex,
            BindPath::Set { .. } => BindPathKind::Set,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pm4Image {
    /// Read-modify-write packets for registers shared with other state objects.
    pub common: CmdStream,
    pub path: BindPath,
    /// Empty when shader prefetch is disabled.
    pub prefetch: CmdStream,
}

impl Pm4Image {
    pub fn build(
        state: &RegisterState,
        caps: &GpuCapabilities,
        settings: &PipelineSettings,
        code_gpu_va: u64,
        code_size: u64,
        allocator: &dyn GpuMemoryAllocator,
    ) -> Result<Self, UploadError> {
        let mut common = CmdStream::with_capacity(8);
        common.context_reg_rmw(
            DbAlphaToMask::ADDR,
            DB_ALPHA_TO_MASK_ENABLE_MASK,
            state.db_alpha_to_mask().0,
        );
        common.context_reg_rmw(
            DbRenderOverride::ADDR,
            DB_RENDER_OVERRIDE_DISABLE_VIEWPORT_CLAMP_MASK,
            state.db_render_override().0,
        );

        let mut prefetch = CmdStream::new();
        if settings.shader_prefetch && code_size > 0 {
            prefetch.dma_prefetch(code_gpu_va, code_size);
        }

        let ctx_regs = state.context_registers();
        let sh_regs = state.sh_registers();
        // DB_SHADER_CONTROL is always emitted as its own trailing packet.
        let (tail, table_ctx_regs) = match ctx_regs.split_last() {
            Some((last, rest)) => (Some(*last), rest),
            None => (None, &ctx_regs[..]),
        };

        let path = if caps.has(GpuFeatures::LOAD_INDEX) {
            let mut uploader = PipelineUploader::new(table_ctx_regs.len(), sh_regs.len());
            for &(addr, value) in table_ctx_regs {
                uploader.add_ctx_reg(addr, value);
            }
            for &(addr, value) in &sh_regs {
                uploader.add_sh_reg(addr, value);
            }
            let tables = uploader.finish(allocator)?;

            let mut sh = CmdStream::with_capacity(5);
            sh.load_sh_reg_index(tables.sh_table_gpu_va, tables.sh_count);
            let mut ctx = CmdStream::with_capacity(8);
            ctx.load_context_reg_index(tables.ctx_table_gpu_va, tables.ctx_count);
            if let Some((addr, value)) = tail {
                ctx.set_context_reg(addr, value);
            }
            BindPath::LoadIndex { sh, ctx, tables }
        } else {
            let mut sh = CmdStream::new();
            sh.set_sh_reg_runs(&sh_regs);
            let mut ctx = CmdStream::new();
            ctx.set_context_reg_runs(table_ctx_regs);
            if let Some((addr, value)) = tail {
                ctx.set_context_reg(addr, value);
            }
            BindPath::Set { sh, ctx }
        };

        debug!(
            path = ?path.kind(),
            ctx_regs = ctx_regs.len(),
            sh_regs = sh_regs.len(),
            "built pipeline packet image"
        );

        Ok(Self {
            common,
            path,
            prefetch,
        })
    }

    pub fn kind(&self) -> BindPathKind {
        self.path.kind()
    }

    pub fn sh_commands(&self) -> &CmdStream {
        match &self.path {
            BindPath::LoadIndex { sh, .. } | BindPath::Set { sh, .. } => sh,
        }
    }

    pub fn ctx_commands(&self) -> &CmdStream {
        match &self.path {
            BindPath::LoadIndex { ctx, .. } | BindPath::Set { ctx, .. } => ctx,
        }
    }

    pub fn uploaded_tables(&self) -> Option<&UploadedRegisterTables> {
        match &self.path {
            BindPath::LoadIndex { tables, .. } => Some(tables),
            BindPath::Set { .. } => None,
        }
    }
}

/// Hash of the context register program. It depends only on register values, never on the
/// encoding, so two pipelines with equal hashes can skip re-emitting context state.
pub fn context_reg_hash(state: &RegisterState) -> u64 {
    let mut hasher = Xxh3::new();
    for (addr, value) in state.context_registers() {
        hasher.update(&addr.to_le_bytes());
        hasher.update(&value.to_le_bytes());
    }
    for (addr, value) in [
        (DbAlphaToMask::ADDR, state.db_alpha_to_mask().0),
        (DbRenderOverride::ADDR, state.db_render_override().0),
    ] {
        hasher.update(&addr.to_le_bytes());
        hasher.update(&value.to_le_bytes());
    }
    hasher.digest()
}
