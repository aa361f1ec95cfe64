//! Register addresses and packed register layouts.
//!
//! Addresses are dword offsets in the GPU register aperture. Context registers live at
//! [`CONTEXT_SPACE_START`], persistent (SH) registers at [`PERSISTENT_SPACE_START`]; packets that
//! write either space encode the offset relative to that base.
//!
//! Each register is a `u32` newtype. Field accessors are generated by [`hw_reg!`] from an explicit
//! `(shift, width)` pair so the on-the-wire layout never depends on compiler bit-field rules.

pub const CONTEXT_SPACE_START: u32 = 0xA000;
pub const CONTEXT_SPACE_END: u32 = 0xA3FF;
pub const PERSISTENT_SPACE_START: u32 = 0x2C00;
pub const PERSISTENT_SPACE_END: u32 = 0x2FFF;

pub const MAX_COLOR_TARGETS: usize = 8;
pub const MAX_USER_DATA_REGS: usize = 16;
pub const MAX_STREAM_OUT_BUFFERS: usize = 4;
pub const MAX_PS_INTERPOLATORS: usize = 32;

pub const fn is_context_reg(addr: u32) -> bool {
    addr >= CONTEXT_SPACE_START && addr <= CONTEXT_SPACE_END
}

pub const fn is_sh_reg(addr: u32) -> bool {
    addr >= PERSISTENT_SPACE_START && addr <= PERSISTENT_SPACE_END
}

const fn field_mask(shift: u32, width: u32) -> u32 {
    ((1u32 << width) - 1) << shift
}

/// Defines a packed register type.
///
/// ```ignore
/// hw_reg! {
///     /// Docs.
///     Name @ 0xA000 {
///         getter / setter : shift, width;
///     }
/// }
/// ```
macro_rules! hw_reg {
    (
        $(#[$meta:meta])*
        $name:ident @ $addr:tt {
            $( $get:ident / $set:ident : $shift:expr, $width:expr; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
        pub struct $name(pub u32);

        impl $name {
            pub const ADDR: u32 = $addr;

            $(
                pub const fn $get(self) -> u32 {
                    (self.0 & field_mask($shift, $width)) >> $shift
                }

                pub fn $set(&mut self, value: u32) {
                    let mask = field_mask($shift, $width);
                    debug_assert!(
                        value <= (mask >> $shift),
                        concat!(stringify!($name), ".", stringify!($get), " overflows its field")
                    );
                    self.0 = (self.0 & !mask) | ((value << $shift) & mask);
                }
            )*
        }
    };
}

// -------------------------------------------------------------------------------------------------
// Fixed-function context registers
// -------------------------------------------------------------------------------------------------

hw_reg! {
    DbRenderOverride @ 0xA003 {
        disable_viewport_clamp / set_disable_viewport_clamp: 25, 1;
    }
}

hw_reg! {
    CbTargetMask @ 0xA08E {}
}

hw_reg! {
    CbShaderMask @ 0xA08F {}
}

macro_rules! per_target_nibbles {
    ($($name:ident),*) => {
        $(
            impl $name {
                pub const fn target(self, slot: usize) -> u8 {
                    ((self.0 >> (slot * 4)) & 0xF) as u8
                }

                pub fn set_target(&mut self, slot: usize, value: u8) {
                    debug_assert!(slot < MAX_COLOR_TARGETS);
                    let shift = slot * 4;
                    self.0 = (self.0 & !(0xF << shift)) | ((u32::from(value) & 0xF) << shift);
                }
            }
        )*
    };
}

per_target_nibbles!(
    CbTargetMask,
    CbShaderMask,
    SxPsDownconvert,
    SxBlendOptEpsilon,
    SxBlendOptControl
);

hw_reg! {
    CbColorControl @ 0xA202 {
        disable_dual_quad / set_disable_dual_quad: 0, 1;
        mode / set_mode: 4, 3;
        rop3 / set_rop3: 16, 8;
    }
}

pub const CB_DISABLE: u32 = 0;
pub const CB_NORMAL: u32 = 1;

hw_reg! {
    DbShaderControl @ 0xA203 {
        z_export_enable / set_z_export_enable: 0, 1;
        z_order / set_z_order: 4, 2;
        kill_enable / set_kill_enable: 6, 1;
        alpha_to_mask_disable / set_alpha_to_mask_disable: 11, 1;
        depth_before_shader / set_depth_before_shader: 12, 1;
    }
}

pub const LATE_Z: u32 = 0;
pub const EARLY_Z_THEN_LATE_Z: u32 = 1;
pub const RE_Z: u32 = 2;
pub const EARLY_Z_THEN_RE_Z: u32 = 3;

hw_reg! {
    PaClClipCntl @ 0xA204 {
        ucp_ena / set_ucp_ena: 0, 6;
        dx_clip_space_def / set_dx_clip_space_def: 19, 1;
        dx_rasterization_kill / set_dx_rasterization_kill: 22, 1;
        dx_linear_attr_clip_ena / set_dx_linear_attr_clip_ena: 24, 1;
        zclip_near_disable / set_zclip_near_disable: 26, 1;
        zclip_far_disable / set_zclip_far_disable: 27, 1;
    }
}

hw_reg! {
    PaClVteCntl @ 0xA206 {
        vport_x_scale_ena / set_vport_x_scale_ena: 0, 1;
        vport_x_offset_ena / set_vport_x_offset_ena: 1, 1;
        vport_y_scale_ena / set_vport_y_scale_ena: 2, 1;
        vport_y_offset_ena / set_vport_y_offset_ena: 3, 1;
        vport_z_scale_ena / set_vport_z_scale_ena: 4, 1;
        vport_z_offset_ena / set_vport_z_offset_ena: 5, 1;
        vtx_w0_fmt / set_vtx_w0_fmt: 10, 1;
    }
}

hw_reg! {
    SpiInterpControl0 @ 0xA1B5 {
        flat_shade_ena / set_flat_shade_ena: 0, 1;
        pnt_sprite_ena / set_pnt_sprite_ena: 1, 1;
        pnt_sprite_ovrd_x / set_pnt_sprite_ovrd_x: 2, 3;
        pnt_sprite_ovrd_y / set_pnt_sprite_ovrd_y: 5, 3;
        pnt_sprite_ovrd_z / set_pnt_sprite_ovrd_z: 8, 3;
        pnt_sprite_ovrd_w / set_pnt_sprite_ovrd_w: 11, 3;
        pnt_sprite_top_1 / set_pnt_sprite_top_1: 14, 1;
    }
}

pub const SPI_PNT_SPRITE_SEL_0: u32 = 0;
pub const SPI_PNT_SPRITE_SEL_1: u32 = 1;
pub const SPI_PNT_SPRITE_SEL_S: u32 = 2;
pub const SPI_PNT_SPRITE_SEL_T: u32 = 3;

hw_reg! {
    SxPsDownconvert @ 0xA1D5 {}
}

hw_reg! {
    SxBlendOptEpsilon @ 0xA1D6 {}
}

hw_reg! {
    /// One nibble per MRT: bit 0 disables the color optimization, bit 1 the alpha optimization.
    SxBlendOptControl @ 0xA1D7 {
        pixen_zero_opt_disable / set_pixen_zero_opt_disable: 31, 1;
    }
}

impl SxBlendOptControl {
    pub const COLOR_OPT_DISABLE: u8 = 1 << 0;
    pub const ALPHA_OPT_DISABLE: u8 = 1 << 1;
}

hw_reg! {
    VgtGsMode @ 0xA290 {
        mode / set_mode: 0, 3;
        onchip / set_onchip: 21, 2;
    }
}

pub const VGT_GS_MODE_ONCHIP: u32 = 3;

hw_reg! {
    PaScModeCntl1 @ 0xA293 {
        walk_align8_prim_fits_st / set_walk_align8_prim_fits_st: 2, 1;
        walk_fence_enable / set_walk_fence_enable: 3, 1;
        walk_fence_size / set_walk_fence_size: 4, 3;
        supertile_walk_order_enable / set_supertile_walk_order_enable: 7, 1;
        tile_walk_order_enable / set_tile_walk_order_enable: 8, 1;
        ps_iter_sample / set_ps_iter_sample: 16, 1;
        multi_shader_engine_prim_discard_enable / set_multi_shader_engine_prim_discard_enable: 17, 1;
        force_eov_cntdwn_enable / set_force_eov_cntdwn_enable: 25, 1;
        force_eov_rez_enable / set_force_eov_rez_enable: 26, 1;
        out_of_order_primitive_enable / set_out_of_order_primitive_enable: 27, 1;
        out_of_order_water_mark / set_out_of_order_water_mark: 28, 3;
    }
}

hw_reg! {
    IaMultiVgtParam @ 0xA2AA {
        primgroup_size / set_primgroup_size: 0, 16;
        partial_vs_wave_on / set_partial_vs_wave_on: 16, 1;
        switch_on_eop / set_switch_on_eop: 17, 1;
        partial_es_wave_on / set_partial_es_wave_on: 18, 1;
        switch_on_eoi / set_switch_on_eoi: 19, 1;
        wd_switch_on_eop / set_wd_switch_on_eop: 20, 1;
        max_primgrp_in_wave / set_max_primgrp_in_wave: 28, 4;
    }
}

hw_reg! {
    VgtReuseOff @ 0xA2AD {
        reuse_off / set_reuse_off: 0, 1;
    }
}

hw_reg! {
    VgtShaderStagesEn @ 0xA2D5 {
        ls_en / set_ls_en: 0, 2;
        hs_en / set_hs_en: 2, 1;
        es_en / set_es_en: 3, 2;
        gs_en / set_gs_en: 5, 1;
        vs_en / set_vs_en: 6, 2;
        dynamic_hs / set_dynamic_hs: 8, 1;
    }
}

pub const ES_STAGE_REAL: u32 = 1;
pub const ES_STAGE_DS: u32 = 2;
pub const VS_STAGE_REAL: u32 = 0;
pub const VS_STAGE_DS: u32 = 1;
pub const VS_STAGE_COPY_SHADER: u32 = 2;

hw_reg! {
    VgtLsHsConfig @ 0xA2D6 {
        num_patches / set_num_patches: 0, 8;
        hs_num_input_cp / set_hs_num_input_cp: 8, 6;
        hs_num_output_cp / set_hs_num_output_cp: 14, 6;
    }
}

hw_reg! {
    VgtTfParam @ 0xA2DB {
        tess_type / set_tess_type: 0, 2;
        partitioning / set_partitioning: 2, 3;
        topology / set_topology: 5, 3;
    }
}

hw_reg! {
    DbAlphaToMask @ 0xA2DC {
        alpha_to_mask_enable / set_alpha_to_mask_enable: 0, 1;
    }
}

hw_reg! {
    PaScLineCntl @ 0xA2F7 {
        expand_line_width / set_expand_line_width: 9, 1;
        last_pixel / set_last_pixel: 10, 1;
        perpendicular_endcap_ena / set_perpendicular_endcap_ena: 11, 1;
        dx10_diamond_test_ena / set_dx10_diamond_test_ena: 12, 1;
    }
}

hw_reg! {
    PaSuVtxCntl @ 0xA2F9 {
        pix_center / set_pix_center: 0, 1;
        round_mode / set_round_mode: 1, 2;
        quant_mode / set_quant_mode: 3, 3;
    }
}

hw_reg! {
    VgtVertexReuseBlockCntl @ 0xA316 {
        vtx_reuse_depth / set_vtx_reuse_depth: 0, 8;
    }
}

// -------------------------------------------------------------------------------------------------
// Shader-stage context registers (owned by the stage chunks)
// -------------------------------------------------------------------------------------------------

pub const SPI_PS_INPUT_CNTL_0: u32 = 0xA191;
pub const SPI_VS_OUT_CONFIG: u32 = 0xA1B1;
pub const SPI_PS_INPUT_ENA: u32 = 0xA1B3;
pub const SPI_PS_INPUT_ADDR: u32 = 0xA1B4;
pub const SPI_PS_IN_CONTROL: u32 = 0xA1B6;
pub const SPI_BARYC_CNTL: u32 = 0xA1B8;
pub const SPI_SHADER_POS_FORMAT: u32 = 0xA1C3;
pub const SPI_SHADER_Z_FORMAT: u32 = 0xA1C4;
pub const SPI_SHADER_COL_FORMAT: u32 = 0xA1C5;
pub const PA_CL_VS_OUT_CNTL: u32 = 0xA207;
pub const VGT_HOS_MAX_TESS_LEVEL: u32 = 0xA286;
pub const VGT_HOS_MIN_TESS_LEVEL: u32 = 0xA287;
pub const VGT_GS_ONCHIP_CNTL: u32 = 0xA291;
pub const VGT_GSVS_RING_OFFSET_1: u32 = 0xA298;
pub const VGT_GSVS_RING_OFFSET_2: u32 = 0xA299;
pub const VGT_GSVS_RING_OFFSET_3: u32 = 0xA29A;
pub const VGT_GS_OUT_PRIM_TYPE: u32 = 0xA29B;
pub const VGT_PRIMITIVEID_EN: u32 = 0xA2A1;
pub const VGT_ESGS_RING_ITEMSIZE: u32 = 0xA2AB;
pub const VGT_GSVS_RING_ITEMSIZE: u32 = 0xA2AC;
pub const VGT_STRMOUT_VTX_STRIDE_0: u32 = 0xA2B5;
pub const VGT_GS_MAX_VERT_OUT: u32 = 0xA2CE;
pub const VGT_GS_VERT_ITEMSIZE: u32 = 0xA2D7;
pub const VGT_GS_VERT_ITEMSIZE_1: u32 = 0xA2D8;
pub const VGT_GS_VERT_ITEMSIZE_2: u32 = 0xA2D9;
pub const VGT_GS_VERT_ITEMSIZE_3: u32 = 0xA2DA;
pub const VGT_GS_INSTANCE_CNT: u32 = 0xA2E4;
pub const VGT_STRMOUT_CONFIG: u32 = 0xA2E5;
pub const VGT_STRMOUT_BUFFER_CONFIG: u32 = 0xA2E6;

/// Stride between consecutive `VGT_STRMOUT_VTX_STRIDE_n` registers.
pub const VGT_STRMOUT_VTX_STRIDE_STEP: u32 = 4;

hw_reg! {
    SpiVsOutConfig @ SPI_VS_OUT_CONFIG {
        vs_export_count / set_vs_export_count: 1, 5;
    }
}

hw_reg! {
    SpiPsInputEna @ SPI_PS_INPUT_ENA {
        persp_sample_ena / set_persp_sample_ena: 0, 1;
        linear_sample_ena / set_linear_sample_ena: 3, 1;
    }
}

hw_reg! {
    SpiPsInControl @ SPI_PS_IN_CONTROL {
        num_interp / set_num_interp: 0, 6;
        param_gen / set_param_gen: 6, 1;
    }
}

hw_reg! {
    VgtStrmoutBufferConfig @ VGT_STRMOUT_BUFFER_CONFIG {
        stream_0_buffer_en / set_stream_0_buffer_en: 0, 4;
        stream_1_buffer_en / set_stream_1_buffer_en: 4, 4;
        stream_2_buffer_en / set_stream_2_buffer_en: 8, 4;
        stream_3_buffer_en / set_stream_3_buffer_en: 12, 4;
    }
}

hw_reg! {
    VgtStrmoutVtxStride @ VGT_STRMOUT_VTX_STRIDE_0 {
        stride / set_stride: 0, 10;
    }
}

// -------------------------------------------------------------------------------------------------
// Persistent (SH) registers
// -------------------------------------------------------------------------------------------------

hw_reg! {
    SpiShaderLateAllocVs @ 0x2C47 {
        limit / set_limit: 0, 6;
    }
}

hw_reg! {
    SpiShaderPgmRsrc1 @ 0 {
        vgprs / set_vgprs: 0, 6;
        sgprs / set_sgprs: 6, 4;
    }
}

hw_reg! {
    SpiShaderPgmRsrc2 @ 0 {
        scratch_en / set_scratch_en: 0, 1;
        user_sgpr / set_user_sgpr: 1, 5;
    }
}

hw_reg! {
    SpiShaderPgmRsrc3 @ 0 {
        cu_en / set_cu_en: 0, 16;
        wave_limit / set_wave_limit: 16, 6;
        lock_low_threshold / set_lock_low_threshold: 22, 4;
    }
}

/// Largest value representable in `SPI_SHADER_PGM_RSRC3_*.WAVE_LIMIT`.
pub const WAVE_LIMIT_MAX: u32 = 0x3F;

/// Per-stage SH register block. The same layout repeats for every hardware stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageShRegs {
    pub pgm_rsrc3: u32,
    pub pgm_lo: u32,
    pub pgm_hi: u32,
    pub pgm_rsrc1: u32,
    pub pgm_rsrc2: u32,
    pub user_data_0: u32,
}

impl StageShRegs {
    const fn at(pgm_rsrc3: u32, pgm_lo: u32) -> Self {
        Self {
            pgm_rsrc3,
            pgm_lo,
            pgm_hi: pgm_lo + 1,
            pgm_rsrc1: pgm_lo + 2,
            pgm_rsrc2: pgm_lo + 3,
            user_data_0: pgm_lo + 4,
        }
    }

    pub const PS: Self = Self::at(0x2C07, 0x2C08);
    pub const VS: Self = Self::at(0x2C46, 0x2C48);
    pub const GS: Self = Self::at(0x2C87, 0x2C88);
    pub const ES: Self = Self::at(0x2CC7, 0x2CC8);
    pub const HS: Self = Self::at(0x2D07, 0x2D08);
    pub const LS: Self = Self::at(0x2D47, 0x2D48);

    pub const fn user_data(&self, index: usize) -> u32 {
        self.user_data_0 + index as u32
    }

    pub fn contains_user_data(&self, addr: u32) -> bool {
        addr >= self.user_data_0 && addr < self.user_data_0 + MAX_USER_DATA_REGS as u32
    }
}
