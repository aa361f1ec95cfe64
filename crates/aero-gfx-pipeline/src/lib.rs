//! `aero-gfx-pipeline` builds hardware graphics pipelines and emits their bind-time packets.
//!
//! A pipeline is built once from compiler metadata and a register vector (see
//! [`GraphicsPipeline::new`]):
//! - The metadata decoder resolves the active stages and the user-data signature
//!   (see [`metadata`] and [`signature`]).
//! - The register builder derives every pipeline-owned register (see [`register_state`]).
//! - The packet assembler encodes the register program as either indexed loads from an uploaded
//!   table or direct `SET_*_REG` packets, depending on the device (see [`commands`]).
//!
//! Binding then only appends prebuilt dwords, plus a few per-draw overrides computed by
//! [`heuristics`].

mod error;
mod pipeline;

pub mod caps;
pub mod chunks;
pub mod commands;
pub mod create_info;
pub mod heuristics;
pub mod metadata;
pub mod pm4;
pub mod register_state;
pub mod regs;
pub mod settings;
pub mod signature;
pub mod stage;
pub mod uploader;

pub use caps::{GenerationQuirks, GfxIpLevel, GpuCapabilities, GpuFeatures};
pub use commands::{BindPath, BindPathKind, Pm4Image};
pub use create_info::GraphicsPipelineCreateInfo;
pub use error::{CapabilityError, MetadataError, PipelineError, ReplayError, UploadError};
pub use heuristics::{DynamicGraphicsShaderInfos, DynamicShaderInfo, RbPlusRegisters};
pub use metadata::{PipelineLoadInfo, PipelineMetadata, RegisterVector, RingItemSizes};
pub use pipeline::{GraphicsPipeline, ShaderStats};
pub use pm4::{CmdStream, GpuMemoryRead, RegisterFile};
pub use settings::{OutOfOrderPrimMode, PipelineSettings};
pub use signature::GraphicsPipelineSignature;
pub use stage::{ApiShaderType, HwShaderStage, HwStageMask, ShaderStageFlags};
pub use uploader::{GpuMemory, GpuMemoryAllocator, LinearGpuAllocator};
