use thiserror::Error;

use crate::stage::HwShaderStage;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("pipeline metadata has no {0} stage block but the active shader stages require one")]
    MissingStage(HwShaderStage),
    #[error("required register {addr:#06x} for the {stage} stage is missing from the register vector")]
    MissingRegister { stage: HwShaderStage, addr: u32 },
    #[error("register blob length {len} is not a multiple of 8 bytes")]
    MalformedRegisterBlob { len: usize },
    #[error("tessellation requires both hull and domain shaders")]
    IncompleteTessellation,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("pipeline uses an on-chip geometry shader but the device does not support one")]
    OnChipGsUnsupported,
    #[error("{stage} stage needs {required} bytes of LDS but the device provides {available}")]
    LdsExceeded {
        stage: HwShaderStage,
        required: u32,
        available: u32,
    },
    #[error("pipeline declares {count} color targets, the hardware supports {max}")]
    TooManyColorTargets { count: usize, max: usize },
    #[error(
        "invalid capability descriptor (cu_per_sh={cu_per_sh}, num_shader_engines={num_shader_engines}, waves_per_simd={waves_per_simd})"
    )]
    InvalidDescriptor {
        cu_per_sh: u32,
        num_shader_engines: u32,
        waves_per_simd: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("out of device memory: requested {requested} bytes, {available} available")]
    OutOfDeviceMemory { requested: u64, available: u64 },
    #[error("{table} register table expected {expected} entries but {actual} were added")]
    CountMismatch {
        table: &'static str,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("packet at dword {offset} is not a type-3 packet (header {header:#010x})")]
    NotType3 { offset: usize, header: u32 },
    #[error("packet at dword {offset} runs past the end of the stream")]
    Truncated { offset: usize },
    #[error("unsupported opcode {opcode:#04x} at dword {offset}")]
    UnsupportedOpcode { offset: usize, opcode: u8 },
    #[error("register {addr:#06x} is outside the space addressed by opcode {opcode:#04x}")]
    RegisterOutOfRange { addr: u32, opcode: u8 },
    #[error("load-index packet reads GPU address {gpu_va:#x} but no memory was provided")]
    NoMemory { gpu_va: u64 },
    #[error("GPU read of {len} bytes at {gpu_va:#x} is out of bounds")]
    MemoryOutOfBounds { gpu_va: u64, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Metadata(_) => "metadata",
            PipelineError::Capability(_) => "capability",
            PipelineError::Upload(_) => "upload",
        }
    }
}
