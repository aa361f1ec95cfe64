//! Hardware capability descriptor.
//!
//! Everything that differs between hardware generations is expressed either as a [`GpuFeatures`]
//! bit or as a row of the [`GenerationQuirks`] table. The register builder consults these values
//! and never branches on the generation directly.

use bitflags::bitflags;

use crate::error::CapabilityError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GfxIpLevel {
    Gfx6,
    Gfx7,
    Gfx8,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct GpuFeatures: u32 {
        /// `LOAD_CONTEXT_REG_INDEX` / `LOAD_SH_REG_INDEX` are supported by the command processor.
        const LOAD_INDEX = 1 << 0;
        const RB_PLUS = 1 << 1;
        const LATE_ALLOC_VS = 1 << 2;
        const ONCHIP_GS = 1 << 3;
        const OUT_OF_ORDER_PRIMS = 1 << 4;
    }
}

/// Per-generation constants that used to live in generation-specific code paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenerationQuirks {
    /// `IA_MULTI_VGT_PARAM` needs the WD/EOI fix-up pass.
    pub ia_multi_vgt_param_fixup: bool,
    /// GS pipelines on more than two shader engines must set `PARTIAL_ES_WAVE_ON`.
    pub gs_partial_es_wave_on_big_chip: bool,
    /// GS pipelines that switch on EOI must also set `PARTIAL_VS_WAVE_ON`.
    pub gs_eoi_partial_vs_wave_on: bool,
    pub max_primgrp_in_wave: u32,
    /// `SPI_SHADER_PGM_RSRC3_*` exists and accepts CU masks and wave limits.
    pub has_pgm_rsrc3: bool,
    pub default_vertex_reuse_depth: u32,
    /// Out-of-order primitive rendering may be enabled at all.
    pub out_of_order_prims: bool,
}

impl GenerationQuirks {
    pub const fn for_level(level: GfxIpLevel) -> Self {
        match level {
            GfxIpLevel::Gfx6 => Self {
                ia_multi_vgt_param_fixup: false,
                gs_partial_es_wave_on_big_chip: false,
                gs_eoi_partial_vs_wave_on: false,
                max_primgrp_in_wave: 0,
                has_pgm_rsrc3: false,
                default_vertex_reuse_depth: 14,
                out_of_order_prims: false,
            },
            GfxIpLevel::Gfx7 => Self {
                ia_multi_vgt_param_fixup: true,
                gs_partial_es_wave_on_big_chip: true,
                gs_eoi_partial_vs_wave_on: false,
                max_primgrp_in_wave: 0,
                has_pgm_rsrc3: true,
                default_vertex_reuse_depth: 14,
                out_of_order_prims: true,
            },
            GfxIpLevel::Gfx8 => Self {
                ia_multi_vgt_param_fixup: true,
                gs_partial_es_wave_on_big_chip: true,
                gs_eoi_partial_vs_wave_on: true,
                max_primgrp_in_wave: 2,
                has_pgm_rsrc3: true,
                default_vertex_reuse_depth: 30,
                out_of_order_prims: true,
            },
        }
    }
}

/// Describes the device a pipeline is built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuCapabilities {
    pub gfx_level: GfxIpLevel,
    pub features: GpuFeatures,
    pub cu_per_sh: u32,
    pub num_shader_engines: u32,
    pub waves_per_simd: u32,
    pub lds_bytes_per_tg: u32,
}

impl GpuCapabilities {
    /// A representative device of the given generation with that generation's feature set.
    pub fn for_generation(gfx_level: GfxIpLevel) -> Self {
        match gfx_level {
            GfxIpLevel::Gfx6 => Self {
                gfx_level,
                features: GpuFeatures::empty(),
                cu_per_sh: 8,
                num_shader_engines: 2,
                waves_per_simd: 10,
                lds_bytes_per_tg: 32 * 1024,
            },
            GfxIpLevel::Gfx7 => Self {
                gfx_level,
                features: GpuFeatures::LATE_ALLOC_VS
                    | GpuFeatures::ONCHIP_GS
                    | GpuFeatures::OUT_OF_ORDER_PRIMS,
                cu_per_sh: 11,
                num_shader_engines: 4,
                waves_per_simd: 10,
                lds_bytes_per_tg: 64 * 1024,
            },
            GfxIpLevel::Gfx8 => Self {
                gfx_level,
                features: GpuFeatures::LOAD_INDEX
                    | GpuFeatures::RB_PLUS
                    | GpuFeatures::LATE_ALLOC_VS
                    | GpuFeatures::ONCHIP_GS
                    | GpuFeatures::OUT_OF_ORDER_PRIMS,
                cu_per_sh: 8,
                num_shader_engines: 4,
                waves_per_simd: 10,
                lds_bytes_per_tg: 64 * 1024,
            },
        }
    }

    pub fn with_features(mut self, features: GpuFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn has(&self, feature: GpuFeatures) -> bool {
        self.features.contains(feature)
    }

    pub fn quirks(&self) -> GenerationQuirks {
        GenerationQuirks::for_level(self.gfx_level)
    }

    pub fn validate(&self) -> Result<(), CapabilityError> {
        if self.cu_per_sh == 0 || self.num_shader_engines == 0 || self.waves_per_simd == 0 {
            return Err(CapabilityError::InvalidDescriptor {
                cu_per_sh: self.cu_per_sh,
                num_shader_engines: self.num_shader_engines,
                waves_per_simd: self.waves_per_simd,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_index_is_a_gfx8_feature() {
        assert!(!GpuCapabilities::for_generation(GfxIpLevel::Gfx6).has(GpuFeatures::LOAD_INDEX));
        assert!(!GpuCapabilities::for_generation(GfxIpLevel::Gfx7).has(GpuFeatures::LOAD_INDEX));
        assert!(GpuCapabilities::for_generation(GfxIpLevel::Gfx8).has(GpuFeatures::LOAD_INDEX));
    }

    #[test]
    fn quirks_follow_generation() {
        let gfx6 = GenerationQuirks::for_level(GfxIpLevel::Gfx6);
        assert!(!gfx6.ia_multi_vgt_param_fixup);
        assert!(!gfx6.has_pgm_rsrc3);

        let gfx8 = GpuCapabilities::for_generation(GfxIpLevel::Gfx8).quirks();
        assert_eq!(gfx8.max_primgrp_in_wave, 2);
        assert_eq!(gfx8.default_vertex_reuse_depth, 30);
    }

    #[test]
    fn gfx6_never_allows_out_of_order_prims() {
        let gfx6 = GpuCapabilities::for_generation(GfxIpLevel::Gfx6);
        assert!(!gfx6.has(GpuFeatures::OUT_OF_ORDER_PRIMS));
        assert!(!gfx6.quirks().out_of_order_prims);
        assert!(!gfx6.with_features(GpuFeatures::all()).quirks().out_of_order_prims);
        assert!(GenerationQuirks::for_level(GfxIpLevel::Gfx7).out_of_order_prims);
    }

    #[test]
    fn zero_sized_descriptor_is_rejected() {
        let mut caps = GpuCapabilities::for_generation(GfxIpLevel::Gfx7);
        caps.cu_per_sh = 0;
        assert!(matches!(
            caps.validate(),
            Err(CapabilityError::InvalidDescriptor { cu_per_sh: 0, .. })
        ));
    }
}
