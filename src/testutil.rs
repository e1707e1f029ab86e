//! Builders for synthetic bitstreams used by the unit tests.

use bitstream_io::BitWrite as _;

pub struct BitWriter {
    inner: bitstream_io::BitWriter<Vec<u8>, bitstream_io::BigEndian>,
}
impl BitWriter {
    pub fn new() -> Self {
        BitWriter {
            inner: bitstream_io::BitWriter::endian(Vec::new(), bitstream_io::BigEndian),
        }
    }

    pub fn bit(&mut self, v: bool) -> &mut Self {
        self.inner.write_bit(v).unwrap();
        self
    }

    pub fn bits(&mut self, count: u32, v: u64) -> &mut Self {
        if count > 0 {
            self.inner.write_var::<u64>(count, v).unwrap();
        }
        self
    }

    pub fn ue(&mut self, v: u32) -> &mut Self {
        let x = u64::from(v) + 1;
        let len = 64 - x.leading_zeros();
        self.bits(len - 1, 0);
        self.bits(len, x)
    }

    pub fn se(&mut self, v: i32) -> &mut Self {
        let code = if v > 0 {
            (v as u32) * 2 - 1
        } else {
            v.unsigned_abs() * 2
        };
        self.ue(code)
    }

    /// `rbsp_stop_one_bit` plus alignment zeros.
    pub fn trailing_bits(&mut self) -> &mut Self {
        self.bit(true);
        self.inner.byte_align().unwrap();
        self
    }

    pub fn finish(&mut self) -> Vec<u8> {
        self.inner.byte_align().unwrap();
        std::mem::take(self.inner.writer().unwrap())
    }
}

/// Adds a NAL header byte and emulation prevention bytes to an RBSP.
pub fn nal(nal_ref_idc: u8, nal_unit_type: u8, rbsp: &[u8]) -> Vec<u8> {
    let mut out = vec![(nal_ref_idc << 5) | nal_unit_type];
    escape_into(&mut out, rbsp);
    out
}

/// Like [`nal`] for the three-byte MVC header extension units (types 14 and 20).
pub fn mvc_nal(
    nal_ref_idc: u8,
    nal_unit_type: u8,
    non_idr: bool,
    view_id: u16,
    anchor: bool,
    rbsp: &[u8],
) -> Vec<u8> {
    let mut ext = BitWriter::new();
    ext.bit(false) // svc_extension_flag
        .bit(non_idr)
        .bits(6, 0) // priority_id
        .bits(10, u64::from(view_id))
        .bits(3, 0) // temporal_id
        .bit(anchor)
        .bit(true) // inter_view_flag
        .bit(true); // reserved_one_bit
    let mut out = vec![(nal_ref_idc << 5) | nal_unit_type];
    out.extend_from_slice(&ext.finish());
    escape_into(&mut out, rbsp);
    out
}

fn escape_into(out: &mut Vec<u8>, rbsp: &[u8]) {
    let mut zeros = 0;
    for &b in rbsp {
        if zeros >= 2 && b <= 3 {
            out.push(0x03);
            zeros = 0;
        }
        out.push(b);
        zeros = if b == 0 { zeros + 1 } else { 0 };
    }
}

/// Joins NAL units with four-byte start codes.
pub fn annexb(units: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for u in units {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(u);
    }
    out
}

/// Joins NAL units with four-byte big-endian length prefixes.
pub fn avcc(units: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for u in units {
        out.extend_from_slice(&(u.len() as u32).to_be_bytes());
        out.extend_from_slice(u);
    }
    out
}

/// Parameters of the synthetic SPS built by [`sps_rbsp`].
#[derive(Clone)]
pub struct SpsParams {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub sps_id: u32,
    pub log2_max_frame_num_minus4: u32,
    pub poc_type: u32,
    pub log2_max_poc_lsb_minus4: u32,
    pub width_mbs: u32,
    pub height_map_units: u32,
    pub frame_mbs_only: bool,
}
impl Default for SpsParams {
    fn default() -> Self {
        SpsParams {
            profile_idc: 66,
            level_idc: 30,
            sps_id: 0,
            log2_max_frame_num_minus4: 0,
            poc_type: 2,
            log2_max_poc_lsb_minus4: 0,
            width_mbs: 4,
            height_map_units: 4,
            frame_mbs_only: true,
        }
    }
}

/// `seq_parameter_set_data()` without trailing bits, for profiles without chroma info.
pub fn sps_data(w: &mut BitWriter, p: &SpsParams) {
    w.bits(8, u64::from(p.profile_idc))
        .bits(8, 0) // constraint flags
        .bits(8, u64::from(p.level_idc))
        .ue(p.sps_id);
    if [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135].contains(&p.profile_idc) {
        w.ue(1) // chroma_format_idc
            .ue(0) // bit_depth_luma_minus8
            .ue(0) // bit_depth_chroma_minus8
            .bit(false) // qpprime_y_zero_transform_bypass_flag
            .bit(false); // seq_scaling_matrix_present_flag
    }
    w.ue(p.log2_max_frame_num_minus4).ue(p.poc_type);
    if p.poc_type == 0 {
        w.ue(p.log2_max_poc_lsb_minus4);
    }
    w.ue(1) // max_num_ref_frames
        .bit(false) // gaps_in_frame_num_value_allowed_flag
        .ue(p.width_mbs - 1)
        .ue(p.height_map_units - 1)
        .bit(p.frame_mbs_only);
    if !p.frame_mbs_only {
        w.bit(false); // mb_adaptive_frame_field_flag
    }
    w.bit(true) // direct_8x8_inference_flag
        .bit(false) // frame_cropping_flag
        .bit(false); // vui_parameters_present_flag
}

pub fn sps_rbsp(p: &SpsParams) -> Vec<u8> {
    let mut w = BitWriter::new();
    sps_data(&mut w, p);
    w.trailing_bits();
    w.finish()
}

/// A Stereo High subset SPS with views 0 and 2, view 2 predicting from view 0.
pub fn subset_sps_rbsp(sps_id: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    sps_data(
        &mut w,
        &SpsParams {
            profile_idc: 128,
            sps_id,
            ..SpsParams::default()
        },
    );
    w.bit(true) // bit_equal_to_one
        .ue(1) // num_views_minus1
        .ue(0)
        .ue(2)
        .ue(1) // num_anchor_refs_l0
        .ue(0)
        .ue(0) // num_anchor_refs_l1
        .ue(1) // num_non_anchor_refs_l0
        .ue(0)
        .ue(0) // num_non_anchor_refs_l1
        .ue(0) // num_level_values_signalled_minus1
        .bits(8, 40)
        .ue(0) // num_applicable_ops_minus1
        .bits(3, 0)
        .ue(1)
        .ue(0)
        .ue(2)
        .ue(1)
        .bit(false) // mvc_vui_parameters_present_flag
        .bit(false) // additional_extension2_flag
        .trailing_bits();
    w.finish()
}

/// A minimal PPS with a single slice group and no optional tail.
pub fn pps_rbsp(pps_id: u32, sps_id: u32, bottom_field_pic_order: bool) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.ue(pps_id)
        .ue(sps_id)
        .bit(false) // entropy_coding_mode_flag
        .bit(bottom_field_pic_order)
        .ue(0) // num_slice_groups_minus1
        .ue(0) // num_ref_idx_l0_default_active_minus1
        .ue(0) // num_ref_idx_l1_default_active_minus1
        .bit(false) // weighted_pred_flag
        .bits(2, 0) // weighted_bipred_idc
        .se(0) // pic_init_qp_minus26
        .se(0) // pic_init_qs_minus26
        .se(0) // chroma_qp_index_offset
        .bit(true) // deblocking_filter_control_present_flag
        .bit(false) // constrained_intra_pred_flag
        .bit(false) // redundant_pic_cnt_present_flag
        .trailing_bits();
    w.finish()
}

/// Slice header fields written by [`slice_rbsp`].
#[derive(Clone)]
pub struct SliceParams {
    pub first_mb: u32,
    /// 2 = I, 0 = P
    pub slice_type: u32,
    pub pps_id: u32,
    pub frame_num: u32,
    pub frame_num_bits: u32,
    pub idr_pic_id: Option<u32>,
    pub nal_ref_idc: u8,
    pub poc_lsb: Option<(u32, u32)>,
}
impl Default for SliceParams {
    fn default() -> Self {
        SliceParams {
            first_mb: 0,
            slice_type: 2,
            pps_id: 0,
            frame_num: 0,
            frame_num_bits: 4,
            idr_pic_id: Some(0),
            nal_ref_idc: 3,
            poc_lsb: None,
        }
    }
}

/// Slice header for a frame-only, single slice group, CAVLC stream as produced by
/// [`sps_rbsp`] and [`pps_rbsp`], followed by a few bytes of fake slice data.
pub fn slice_rbsp(p: &SliceParams) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.ue(p.first_mb)
        .ue(p.slice_type)
        .ue(p.pps_id)
        .bits(p.frame_num_bits, u64::from(p.frame_num));
    if let Some(id) = p.idr_pic_id {
        w.ue(id);
    }
    if let Some((bits, lsb)) = p.poc_lsb {
        w.bits(bits, u64::from(lsb));
    }
    if p.slice_type == 0 {
        w.bit(false) // num_ref_idx_active_override_flag
            .bit(false); // ref_pic_list_modification_flag_l0
    }
    if p.nal_ref_idc != 0 {
        if p.idr_pic_id.is_some() {
            w.bit(false) // no_output_of_prior_pics_flag
                .bit(false); // long_term_reference_flag
        } else {
            w.bit(false); // adaptive_ref_pic_marking_mode_flag
        }
    }
    w.se(0) // slice_qp_delta
        .ue(1); // disable_deblocking_filter_idc
    // stand-in for macroblock data
    w.bits(16, 0xA5C3).trailing_bits();
    w.finish()
}
