//! Driver-level tuning knobs.

use tracing::debug;

pub const DISABLE_OUT_OF_ORDER_PRIMS_ENV: &str = "AERO_GFX_DISABLE_OUT_OF_ORDER_PRIMS";
pub const DISABLE_SHADER_PREFETCH_ENV: &str = "AERO_GFX_DISABLE_SHADER_PREFETCH";
pub const DISABLE_RB_PLUS_ENV: &str = "AERO_GFX_DISABLE_RB_PLUS";
pub const LATE_ALLOC_VS_LIMIT_ENV: &str = "AERO_GFX_LATE_ALLOC_VS_LIMIT";

/// How aggressively primitives may be rasterized out of submission order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutOfOrderPrimMode {
    Disable,
    /// Only when the result is provably order-independent.
    #[default]
    Safe,
    /// Also allows depth-only passes with a monotonic depth function.
    Aggressive,
    /// Whenever the pipeline allows it, regardless of bound state.
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineSettings {
    pub out_of_order_prims: OutOfOrderPrimMode,
    /// Upper bound for `SPI_SHADER_LATE_ALLOC_VS.LIMIT`.
    pub late_alloc_vs_limit: u32,
    /// Overrides the generation default for `VGT_VERTEX_REUSE_BLOCK_CNTL`.
    pub vertex_reuse_depth: Option<u32>,
    pub shader_prefetch: bool,
    pub rb_plus: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            out_of_order_prims: OutOfOrderPrimMode::Safe,
            late_alloc_vs_limit: 32,
            vertex_reuse_depth: None,
            shader_prefetch: true,
            rb_plus: true,
        }
    }
}

impl PipelineSettings {
    /// Defaults with overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults with overrides read through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        let truthy = |name: &str| lookup(name).is_some_and(|raw| is_truthy(&raw));

        if truthy(DISABLE_OUT_OF_ORDER_PRIMS_ENV) {
            settings.out_of_order_prims = OutOfOrderPrimMode::Disable;
        }
        if truthy(DISABLE_SHADER_PREFETCH_ENV) {
            settings.shader_prefetch = false;
        }
        if truthy(DISABLE_RB_PLUS_ENV) {
            settings.rb_plus = false;
        }
        if let Some(raw) = lookup(LATE_ALLOC_VS_LIMIT_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(limit) => settings.late_alloc_vs_limit = limit,
                Err(_) => debug!(
                    var = LATE_ALLOC_VS_LIMIT_ENV,
                    value = %raw,
                    "ignoring unparsable late-alloc VS limit"
                ),
            }
        }

        settings
    }
}

fn is_truthy(raw: &str) -> bool {
    let v = raw.trim();
    v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
}
