//! Pipeline creation parameters and the bind-time state objects the heuristics inspect.

use bitflags::bitflags;

use crate::stage::ShaderStageFlags;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
    LineListAdj,
    LineStripAdj,
    TriangleListAdj,
    TriangleStripAdj,
    PatchList,
}

impl PrimitiveTopology {
    pub fn is_adjacency(self) -> bool {
        matches!(
            self,
            PrimitiveTopology::LineListAdj
                | PrimitiveTopology::LineStripAdj
                | PrimitiveTopology::TriangleListAdj
                | PrimitiveTopology::TriangleStripAdj
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DepthRange {
    #[default]
    ZeroToOne,
    NegativeOneToOne,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PointCoordOrigin {
    #[default]
    UpperLeft,
    LowerLeft,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RasterizerState {
    pub depth_clip_enable: bool,
    pub rasterizer_discard: bool,
    /// One bit per user clip plane; only the low six bits are meaningful.
    pub user_clip_plane_mask: u8,
    pub depth_range: DepthRange,
    pub point_coord_origin: PointCoordOrigin,
    pub perpendicular_end_caps: bool,
    pub depth_clamp_disable: bool,
    pub flat_shading: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            depth_clip_enable: true,
            rasterizer_discard: false,
            user_clip_plane_mask: 0,
            depth_range: DepthRange::ZeroToOne,
            point_coord_origin: PointCoordOrigin::UpperLeft,
            perpendicular_end_caps: false,
            depth_clamp_disable: false,
            flat_shading: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LogicOp {
    #[default]
    Copy,
    Clear,
    And,
    AndReverse,
    CopyInverted,
    AndInverted,
    Noop,
    Xor,
    Or,
    Nor,
    Equiv,
    Invert,
    OrReverse,
    OrInverted,
    Nand,
    Set,
}

impl LogicOp {
    /// ROP3 code programmed into `CB_COLOR_CONTROL.ROP3`.
    pub const fn rop3(self) -> u32 {
        match self {
            LogicOp::Copy => 0xCC,
            LogicOp::Clear => 0x00,
            LogicOp::And => 0x88,
            LogicOp::AndReverse => 0x44,
            LogicOp::CopyInverted => 0x33,
            LogicOp::AndInverted => 0x22,
            LogicOp::Noop => 0xAA,
            LogicOp::Xor => 0x66,
            LogicOp::Or => 0xEE,
            LogicOp::Nor => 0x11,
            LogicOp::Equiv => 0x99,
            LogicOp::Invert => 0x55,
            LogicOp::OrReverse => 0xDD,
            LogicOp::OrInverted => 0xBB,
            LogicOp::Nand => 0x77,
            LogicOp::Set => 0xFF,
        }
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ChannelMask: u8 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
        const RGB = Self::R.bits() | Self::G.bits() | Self::B.bits();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumericFormat {
    Unorm,
    Snorm,
    Srgb,
    Uint,
    Sint,
    Float,
}

impl NumericFormat {
    pub fn is_integer(self) -> bool {
        matches!(self, NumericFormat::Uint | NumericFormat::Sint)
    }
}

/// Render-target formats the export path distinguishes between.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    R8Unorm,
    R8G8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    R8G8B8A8Snorm,
    R8G8B8A8Uint,
    B8G8R8A8Unorm,
    R16Float,
    R16G16Float,
    R16G16B16A16Float,
    R16G16B16A16Unorm,
    R16G16B16A16Uint,
    R32Float,
    R32Uint,
    R32G32Float,
    R32G32B32A32Float,
    R10G10B10A2Unorm,
    R11G11B10Float,
    B5G6R5Unorm,
    B5G5R5A1Unorm,
    B4G4R4A4Unorm,
}

impl ColorFormat {
    /// Bits per channel in R, G, B, A order. Zero means the channel is absent.
    pub const fn channel_bits(self) -> [u8; 4] {
        match self {
            ColorFormat::R8Unorm => [8, 0, 0, 0],
            ColorFormat::R8G8Unorm => [8, 8, 0, 0],
            ColorFormat::R8G8B8A8Unorm
            | ColorFormat::R8G8B8A8Srgb
            | ColorFormat::R8G8B8A8Snorm
            | ColorFormat::R8G8B8A8Uint
            | ColorFormat::B8G8R8A8Unorm => [8, 8, 8, 8],
            ColorFormat::R16Float => [16, 0, 0, 0],
            ColorFormat::R16G16Float => [16, 16, 0, 0],
            ColorFormat::R16G16B16A16Float
            | ColorFormat::R16G16B16A16Unorm
            | ColorFormat::R16G16B16A16Uint => [16, 16, 16, 16],
            ColorFormat::R32Float | ColorFormat::R32Uint => [32, 0, 0, 0],
            ColorFormat::R32G32Float => [32, 32, 0, 0],
            ColorFormat::R32G32B32A32Float => [32, 32, 32, 32],
            ColorFormat::R10G10B10A2Unorm => [10, 10, 10, 2],
            ColorFormat::R11G11B10Float => [11, 11, 10, 0],
            ColorFormat::B5G6R5Unorm => [5, 6, 5, 0],
            ColorFormat::B5G5R5A1Unorm => [5, 5, 5, 1],
            ColorFormat::B4G4R4A4Unorm => [4, 4, 4, 4],
        }
    }

    pub const fn numeric(self) -> NumericFormat {
        match self {
            ColorFormat::R8G8B8A8Srgb => NumericFormat::Srgb,
            ColorFormat::R8G8B8A8Snorm => NumericFormat::Snorm,
            ColorFormat::R8G8B8A8Uint
            | ColorFormat::R16G16B16A16Uint
            | ColorFormat::R32Uint => NumericFormat::Uint,
            ColorFormat::R16Float
            | ColorFormat::R16G16Float
            | ColorFormat::R16G16B16A16Float
            | ColorFormat::R32Float
            | ColorFormat::R32G32Float
            | ColorFormat::R32G32B32A32Float
            | ColorFormat::R11G11B10Float => NumericFormat::Float,
            _ => NumericFormat::Unorm,
        }
    }

    /// Formats whose channels do not share one bit width.
    pub const fn is_packed(self) -> bool {
        matches!(
            self,
            ColorFormat::R10G10B10A2Unorm
                | ColorFormat::R11G11B10Float
                | ColorFormat::B5G6R5Unorm
                | ColorFormat::B5G5R5A1Unorm
                | ColorFormat::B4G4R4A4Unorm
        )
    }

    pub fn channels(self) -> ChannelMask {
        let bits = self.channel_bits();
        let mut mask = ChannelMask::empty();
        for (i, flag) in [ChannelMask::R, ChannelMask::G, ChannelMask::B, ChannelMask::A]
            .into_iter()
            .enumerate()
        {
            if bits[i] != 0 {
                mask |= flag;
            }
        }
        mask
    }

    pub fn max_channel_bits(self) -> u8 {
        self.channel_bits().into_iter().max().unwrap_or(0)
    }
}

/// One color-target slot. A slot with no format is unbound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ColorTargetInfo {
    pub format: Option<ColorFormat>,
    pub write_mask: ChannelMask,
}

impl ColorTargetInfo {
    pub fn new(format: ColorFormat, write_mask: ChannelMask) -> Self {
        Self {
            format: Some(format),
            write_mask,
        }
    }

    /// Channels actually written: the write mask limited to channels the format has.
    pub fn written_channels(&self) -> ChannelMask {
        self.format
            .map(|format| self.write_mask & format.channels())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineCreateInfo {
    pub stages: ShaderStageFlags,
    pub topology: PrimitiveTopology,
    pub rasterizer: RasterizerState,
    pub color_targets: Vec<ColorTargetInfo>,
    pub alpha_to_coverage: bool,
    pub dual_source_blend: bool,
    pub logic_op: LogicOp,
    /// Number of views rendered by one draw; `1` disables view instancing.
    pub view_instance_count: u32,
    pub code_gpu_va: u64,
    pub code_size: u64,
}

impl Default for GraphicsPipelineCreateInfo {
    fn default() -> Self {
        Self {
            stages: ShaderStageFlags::VERTEX | ShaderStageFlags::PIXEL,
            topology: PrimitiveTopology::TriangleList,
            rasterizer: RasterizerState::default(),
            color_targets: Vec::new(),
            alpha_to_coverage: false,
            dual_source_blend: false,
            logic_op: LogicOp::Copy,
            view_instance_count: 1,
            code_gpu_va: 0,
            code_size: 0,
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Bind-time state
// -------------------------------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturate,
    ConstantColor,
    OneMinusConstantColor,
}

impl BlendFactor {
    pub fn reads_destination(self) -> bool {
        matches!(
            self,
            BlendFactor::DstColor
                | BlendFactor::OneMinusDstColor
                | BlendFactor::DstAlpha
                | BlendFactor::OneMinusDstAlpha
                | BlendFactor::SrcAlphaSaturate
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendEquation {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub op: BlendOp,
}

impl BlendEquation {
    pub const REPLACE: Self = Self {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
        op: BlendOp::Add,
    };

    /// Whether applying the equation to a sequence of fragments gives the same result in any order.
    pub fn is_commutative(&self) -> bool {
        match self.op {
            BlendOp::Min | BlendOp::Max => true,
            BlendOp::Add => {
                self.dst_factor == BlendFactor::One && !self.src_factor.reads_destination()
            }
            BlendOp::Subtract | BlendOp::ReverseSubtract => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetBlendState {
    pub blend_enable: bool,
    pub color: BlendEquation,
    pub alpha: BlendEquation,
}

impl Default for TargetBlendState {
    fn default() -> Self {
        Self {
            blend_enable: false,
            color: BlendEquation::REPLACE,
            alpha: BlendEquation::REPLACE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ColorBlendState {
    pub targets: [TargetBlendState; crate::regs::MAX_COLOR_TARGETS],
}

impl ColorBlendState {
    pub fn target(&self, slot: usize) -> TargetBlendState {
        self.targets.get(slot).copied().unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub func: CompareFunc,
    pub write_mask: u8,
}

impl StencilFaceState {
    pub fn writes(&self) -> bool {
        self.write_mask != 0
            && [self.fail_op, self.pass_op, self.depth_fail_op]
                .iter()
                .any(|op| *op != StencilOp::Keep)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_enable: bool,
    pub depth_write_enable: bool,
    pub depth_func: CompareFunc,
    pub stencil_enable: bool,
    pub front: StencilFaceState,
    pub back: StencilFaceState,
}

impl DepthStencilState {
    pub fn depth_writes(&self) -> bool {
        self.depth_enable && self.depth_write_enable
    }

    pub fn stencil_writes(&self) -> bool {
        self.stencil_enable && (self.front.writes() || self.back.writes())
    }
}

/// The bound depth/stencil view, or `None` fields when nothing is bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DepthStencilViewInfo {
    pub has_depth: bool,
    pub has_stencil: bool,
    pub read_only_depth: bool,
    pub read_only_stencil: bool,
}
