//! Sequence parameter set, `seq_parameter_set_data()` of section 7.3.2.1.1.
//!
//! Values outside their legal range are clamped to the nearest legal value and reported through
//! [`UnitErrors::RANGE_CLAMPED`] so that one bad field does not lose the whole sequence.

use super::scaling::{ResolvedScaling, ScalingMatrix, ScalingMatrixError};
use super::UnitErrors;
use crate::rbsp::{BitRead, BitReaderError};
use log::*;
use std::fmt::{self, Debug};

/// Largest frame of any level (Table A-1), in macroblocks.
pub(crate) const MAX_PIC_SIZE_IN_MAP_UNITS: u32 = 139_264;

#[derive(Debug, PartialEq, Eq)]
pub enum SeqParamSetIdError {
    IdTooLarge(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeqParamSetId(u8);
impl SeqParamSetId {
    pub fn from_u32(id: u32) -> Result<SeqParamSetId, SeqParamSetIdError> {
        if id > 31 {
            Err(SeqParamSetIdError::IdTooLarge(id))
        } else {
            Ok(SeqParamSetId(id as u8))
        }
    }
    pub fn id(self) -> u8 {
        self.0
    }
}

#[derive(Debug)]
pub enum SpsError {
    RbspReaderError(BitReaderError),
    InvalidPicOrderCountType(u32),
    ScalingMatrix(ScalingMatrixError),
    BadSeqParamSetId(SeqParamSetIdError),
    /// A field in the bitstream had a value too large for a subsequent calculation
    FieldValueTooLarge {
        name: &'static str,
        value: u32,
    },
    /// The frame-cropping values are too large vs. the coded picture size,
    CroppingError(FrameCropping),
}

impl From<BitReaderError> for SpsError {
    fn from(e: BitReaderError) -> Self {
        SpsError::RbspReaderError(e)
    }
}
impl From<ScalingMatrixError> for SpsError {
    fn from(e: ScalingMatrixError) -> Self {
        SpsError::ScalingMatrix(e)
    }
}
impl SpsError {
    /// The reader fault behind this error, if the unit simply ran out of data.
    pub fn reader_error(&self) -> Option<&BitReaderError> {
        match self {
            SpsError::RbspReaderError(e) | SpsError::ScalingMatrix(ScalingMatrixError::ReaderError(e)) => {
                Some(e)
            }
            _ => None,
        }
    }
}

/// Reads `ue(v)` and clamps it to `max`, noting the clamp in `errs`.
pub(crate) fn read_ue_clamped<R: BitRead>(
    r: &mut R,
    name: &'static str,
    max: u32,
    errs: &mut UnitErrors,
) -> Result<u32, BitReaderError> {
    let v = r.read_ue(name)?;
    if v > max {
        warn!("{} value {} out of range, clamped to {}", name, v, max);
        *errs |= UnitErrors::RANGE_CLAMPED;
        Ok(max)
    } else {
        Ok(v)
    }
}

/// Reads a signed value, clamping it into `min..=max`.
pub(crate) fn read_se_clamped<R: BitRead>(
    r: &mut R,
    name: &'static str,
    min: i32,
    max: i32,
    errs: &mut UnitErrors,
) -> Result<i32, BitReaderError> {
    let v = r.read_se(name)?;
    let clamped = v.clamp(min, max);
    if clamped != v {
        warn!("{} value {} out of range, clamped to {}", name, v, clamped);
        *errs |= UnitErrors::RANGE_CLAMPED;
    }
    Ok(clamped)
}

/// _Profile Indication_ value
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProfileIdc(pub u8);
impl ProfileIdc {
    pub const BASELINE: ProfileIdc = ProfileIdc(66);
    pub const MAIN: ProfileIdc = ProfileIdc(77);
    pub const EXTENDED: ProfileIdc = ProfileIdc(88);
    pub const HIGH: ProfileIdc = ProfileIdc(100);
    pub const HIGH10: ProfileIdc = ProfileIdc(110);
    pub const HIGH422: ProfileIdc = ProfileIdc(122);
    pub const HIGH444: ProfileIdc = ProfileIdc(244);
    pub const CAVLC444: ProfileIdc = ProfileIdc(44);
    pub const MULTIVIEW_HIGH: ProfileIdc = ProfileIdc(118);
    pub const STEREO_HIGH: ProfileIdc = ProfileIdc(128);

    pub fn has_chroma_info(self) -> bool {
        matches!(
            self.0,
            100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 134 | 135 | 138 | 139
        )
    }

    /// Profiles whose subset SPS carries the MVC extension.
    pub fn is_mvc(self) -> bool {
        matches!(self.0, 118 | 128 | 134)
    }
}
impl From<u8> for ProfileIdc {
    fn from(v: u8) -> Self {
        ProfileIdc(v)
    }
}
impl From<ProfileIdc> for u8 {
    fn from(v: ProfileIdc) -> Self {
        v.0
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ConstraintFlags(u8);
impl From<u8> for ConstraintFlags {
    fn from(v: u8) -> Self {
        ConstraintFlags(v)
    }
}
impl From<ConstraintFlags> for u8 {
    fn from(v: ConstraintFlags) -> Self {
        v.0
    }
}
impl ConstraintFlags {
    /// `constraint_set<n>_flag`, for `n` in `0..6`.
    pub fn flag(self, n: u8) -> bool {
        n < 6 && self.0 & (0b1000_0000 >> n) != 0
    }
    pub fn reserved_zero_two_bits(self) -> u8 {
        self.0 & 0b0000_0011
    }
}
impl Debug for ConstraintFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let mut l = f.debug_list();
        for n in 0..6 {
            l.entry(&self.flag(n));
        }
        l.finish()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChromaFormat {
    Monochrome,
    #[default]
    YUV420,
    YUV422,
    YUV444,
}
impl ChromaFormat {
    fn from_chroma_format_idc(chroma_format_idc: u32) -> ChromaFormat {
        match chroma_format_idc {
            0 => ChromaFormat::Monochrome,
            1 => ChromaFormat::YUV420,
            2 => ChromaFormat::YUV422,
            _ => ChromaFormat::YUV444,
        }
    }
    pub fn to_u32(self) -> u32 {
        match self {
            ChromaFormat::Monochrome => 0,
            ChromaFormat::YUV420 => 1,
            ChromaFormat::YUV422 => 2,
            ChromaFormat::YUV444 => 3,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChromaInfo {
    pub chroma_format: ChromaFormat,
    pub separate_colour_plane_flag: bool,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub qpprime_y_zero_transform_bypass_flag: bool,
    pub scaling_matrix: Option<ScalingMatrix>,
}
impl ChromaInfo {
    /// Returns `ChromaArrayType`: 0 if `separate_colour_plane_flag` is true, otherwise equal to
    /// `chroma_format_idc`.
    pub fn chroma_array_type(&self) -> u8 {
        if self.separate_colour_plane_flag {
            0
        } else {
            self.chroma_format.to_u32() as u8
        }
    }

    pub fn read<R: BitRead>(
        r: &mut R,
        profile_idc: ProfileIdc,
        errs: &mut UnitErrors,
    ) -> Result<ChromaInfo, SpsError> {
        if !profile_idc.has_chroma_info() {
            return Ok(ChromaInfo::default());
        }
        let chroma_format_idc = read_ue_clamped(r, "chroma_format_idc", 3, errs)?;
        let separate_colour_plane_flag = if chroma_format_idc == 3 {
            r.read_bool("separate_colour_plane_flag")?
        } else {
            false
        };
        let bit_depth_luma_minus8 = read_ue_clamped(r, "bit_depth_luma_minus8", 6, errs)? as u8;
        let bit_depth_chroma_minus8 = read_ue_clamped(r, "bit_depth_chroma_minus8", 6, errs)? as u8;
        let qpprime_y_zero_transform_bypass_flag =
            r.read_bool("qpprime_y_zero_transform_bypass_flag")?;
        let scaling_matrix = if r.read_bool("seq_scaling_matrix_present_flag")? {
            let count8x8 = if chroma_format_idc == 3 { 6 } else { 2 };
            Some(ScalingMatrix::read(r, count8x8)?)
        } else {
            None
        };
        Ok(ChromaInfo {
            chroma_format: ChromaFormat::from_chroma_format_idc(chroma_format_idc),
            separate_colour_plane_flag,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            qpprime_y_zero_transform_bypass_flag,
            scaling_matrix,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PicOrderCntType {
    TypeZero {
        log2_max_pic_order_cnt_lsb_minus4: u8,
    },
    TypeOne {
        delta_pic_order_always_zero_flag: bool,
        offset_for_non_ref_pic: i32,
        offset_for_top_to_bottom_field: i32,
        offsets_for_ref_frame: Vec<i32>,
    },
    TypeTwo,
}
impl PicOrderCntType {
    fn read<R: BitRead>(r: &mut R, errs: &mut UnitErrors) -> Result<PicOrderCntType, SpsError> {
        let pic_order_cnt_type = r.read_ue("pic_order_cnt_type")?;
        match pic_order_cnt_type {
            0 => Ok(PicOrderCntType::TypeZero {
                log2_max_pic_order_cnt_lsb_minus4: read_ue_clamped(
                    r,
                    "log2_max_pic_order_cnt_lsb_minus4",
                    12,
                    errs,
                )? as u8,
            }),
            1 => {
                let delta_pic_order_always_zero_flag =
                    r.read_bool("delta_pic_order_always_zero_flag")?;
                let offset_for_non_ref_pic = r.read_se("offset_for_non_ref_pic")?;
                let offset_for_top_to_bottom_field = r.read_se("offset_for_top_to_bottom_field")?;
                let count =
                    read_ue_clamped(r, "num_ref_frames_in_pic_order_cnt_cycle", 255, errs)?;
                let mut offsets_for_ref_frame = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    offsets_for_ref_frame.push(r.read_se("offset_for_ref_frame")?);
                }
                Ok(PicOrderCntType::TypeOne {
                    delta_pic_order_always_zero_flag,
                    offset_for_non_ref_pic,
                    offset_for_top_to_bottom_field,
                    offsets_for_ref_frame,
                })
            }
            2 => Ok(PicOrderCntType::TypeTwo),
            _ => Err(SpsError::InvalidPicOrderCountType(pic_order_cnt_type)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameMbsFlags {
    Frames,
    Fields { mb_adaptive_frame_field_flag: bool },
}
impl FrameMbsFlags {
    fn read<R: BitRead>(r: &mut R) -> Result<FrameMbsFlags, BitReaderError> {
        if r.read_bool("frame_mbs_only_flag")? {
            Ok(FrameMbsFlags::Frames)
        } else {
            Ok(FrameMbsFlags::Fields {
                mb_adaptive_frame_field_flag: r.read_bool("mb_adaptive_frame_field_flag")?,
            })
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameCropping {
    pub left_offset: u32,
    pub right_offset: u32,
    pub top_offset: u32,
    pub bottom_offset: u32,
}
impl FrameCropping {
    fn read<R: BitRead>(r: &mut R) -> Result<Option<FrameCropping>, BitReaderError> {
        Ok(if r.read_bool("frame_cropping_flag")? {
            Some(FrameCropping {
                left_offset: r.read_ue("left_offset")?,
                right_offset: r.read_ue("right_offset")?,
                top_offset: r.read_ue("top_offset")?,
                bottom_offset: r.read_ue("bottom_offset")?,
            })
        } else {
            None
        })
    }
}

/// Sample aspect ratios for `aspect_ratio_idc` 1 to 16, Table E-1.
const ASPECT_RATIOS: [(u16, u16); 16] = [
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];
const EXTENDED_SAR: u8 = 255;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AspectRatioInfo {
    pub aspect_ratio_idc: u8,
    /// `sar_width` and `sar_height`, present for `Extended_SAR`
    pub sar: Option<(u16, u16)>,
}
impl AspectRatioInfo {
    fn read<R: BitRead>(r: &mut R) -> Result<Option<AspectRatioInfo>, BitReaderError> {
        if !r.read_bool("aspect_ratio_info_present_flag")? {
            return Ok(None);
        }
        let aspect_ratio_idc = r.read(8, "aspect_ratio_idc")?;
        let sar = if aspect_ratio_idc == EXTENDED_SAR {
            Some((r.read(16, "sar_width")?, r.read(16, "sar_height")?))
        } else {
            None
        };
        Ok(Some(AspectRatioInfo {
            aspect_ratio_idc,
            sar,
        }))
    }

    /// Returns the aspect ratio as `(width, height)`, if specified.
    pub fn get(&self) -> Option<(u16, u16)> {
        match self.aspect_ratio_idc {
            1..=16 => Some(ASPECT_RATIOS[usize::from(self.aspect_ratio_idc) - 1]),
            // a zero sar_width or sar_height leaves the ratio unspecified (E.2.1)
            EXTENDED_SAR => self.sar.filter(|&(w, h)| w != 0 && h != 0),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColourDescription {
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VideoSignalType {
    /// 5 means unspecified
    pub video_format: u8,
    pub video_full_range_flag: bool,
    pub colour_description: Option<ColourDescription>,
}
impl VideoSignalType {
    fn read<R: BitRead>(r: &mut R) -> Result<Option<VideoSignalType>, BitReaderError> {
        if !r.read_bool("video_signal_type_present_flag")? {
            return Ok(None);
        }
        let video_format = r.read(3, "video_format")?;
        let video_full_range_flag = r.read_bool("video_full_range_flag")?;
        let colour_description = if r.read_bool("colour_description_present_flag")? {
            Some(ColourDescription {
                colour_primaries: r.read(8, "colour_primaries")?,
                transfer_characteristics: r.read(8, "transfer_characteristics")?,
                matrix_coefficients: r.read(8, "matrix_coefficients")?,
            })
        } else {
            None
        };
        Ok(Some(VideoSignalType {
            video_format,
            video_full_range_flag,
            colour_description,
        }))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimingInfo {
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub fixed_frame_rate_flag: bool,
}
impl TimingInfo {
    fn read<R: BitRead>(r: &mut R) -> Result<Option<TimingInfo>, BitReaderError> {
        Ok(if r.read_bool("timing_info_present_flag")? {
            Some(TimingInfo {
                num_units_in_tick: r.read(32, "num_units_in_tick")?,
                time_scale: r.read(32, "time_scale")?,
                fixed_frame_rate_flag: r.read_bool("fixed_frame_rate_flag")?,
            })
        } else {
            None
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpbSpec {
    pub bit_rate_value_minus1: u32,
    pub cpb_size_value_minus1: u32,
    pub cbr_flag: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HrdParameters {
    pub bit_rate_scale: u8,
    pub cpb_size_scale: u8,
    pub cpb_specs: Vec<CpbSpec>,
    pub initial_cpb_removal_delay_length_minus1: u8,
    pub cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,
    pub time_offset_length: u8,
}
impl HrdParameters {
    pub(crate) fn read<R: BitRead>(
        r: &mut R,
        errs: &mut UnitErrors,
    ) -> Result<HrdParameters, BitReaderError> {
        let cpb_cnt = read_ue_clamped(r, "cpb_cnt_minus1", 31, errs)? + 1;
        let bit_rate_scale = r.read(4, "bit_rate_scale")?;
        let cpb_size_scale = r.read(4, "cpb_size_scale")?;
        let mut cpb_specs = Vec::with_capacity(cpb_cnt as usize);
        for _ in 0..cpb_cnt {
            cpb_specs.push(CpbSpec {
                bit_rate_value_minus1: r.read_ue("bit_rate_value_minus1")?,
                cpb_size_value_minus1: r.read_ue("cpb_size_value_minus1")?,
                cbr_flag: r.read_bool("cbr_flag")?,
            });
        }
        Ok(HrdParameters {
            bit_rate_scale,
            cpb_size_scale,
            cpb_specs,
            initial_cpb_removal_delay_length_minus1: r
                .read(5, "initial_cpb_removal_delay_length_minus1")?,
            cpb_removal_delay_length_minus1: r.read(5, "cpb_removal_delay_length_minus1")?,
            dpb_output_delay_length_minus1: r.read(5, "dpb_output_delay_length_minus1")?,
            time_offset_length: r.read(5, "time_offset_length")?,
        })
    }

    fn read_optional<R: BitRead>(
        r: &mut R,
        name: &'static str,
        errs: &mut UnitErrors,
    ) -> Result<Option<HrdParameters>, BitReaderError> {
        if r.read_bool(name)? {
            Ok(Some(HrdParameters::read(r, errs)?))
        } else {
            Ok(None)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitstreamRestrictions {
    pub motion_vectors_over_pic_boundaries_flag: bool,
    pub max_bytes_per_pic_denom: u32,
    pub max_bits_per_mb_denom: u32,
    pub log2_max_mv_length_horizontal: u32,
    pub log2_max_mv_length_vertical: u32,
    pub max_num_reorder_frames: u32,
    pub max_dec_frame_buffering: u32,
}
impl BitstreamRestrictions {
    fn read<R: BitRead>(r: &mut R) -> Result<Option<BitstreamRestrictions>, BitReaderError> {
        if !r.read_bool("bitstream_restriction_flag")? {
            return Ok(None);
        }
        Ok(Some(BitstreamRestrictions {
            motion_vectors_over_pic_boundaries_flag: r
                .read_bool("motion_vectors_over_pic_boundaries_flag")?,
            max_bytes_per_pic_denom: r.read_ue("max_bytes_per_pic_denom")?,
            max_bits_per_mb_denom: r.read_ue("max_bits_per_mb_denom")?,
            log2_max_mv_length_horizontal: r.read_ue("log2_max_mv_length_horizontal")?,
            log2_max_mv_length_vertical: r.read_ue("log2_max_mv_length_vertical")?,
            max_num_reorder_frames: r.read_ue("max_num_reorder_frames")?,
            max_dec_frame_buffering: r.read_ue("max_dec_frame_buffering")?,
        }))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VuiParameters {
    pub aspect_ratio_info: Option<AspectRatioInfo>,
    /// `Some(overscan_appropriate_flag)` when overscan info is present
    pub overscan_appropriate: Option<bool>,
    pub video_signal_type: Option<VideoSignalType>,
    /// top and bottom field `chroma_sample_loc_type`
    pub chroma_loc_info: Option<(u32, u32)>,
    pub timing_info: Option<TimingInfo>,
    pub nal_hrd_parameters: Option<HrdParameters>,
    pub vcl_hrd_parameters: Option<HrdParameters>,
    pub low_delay_hrd_flag: Option<bool>,
    pub pic_struct_present_flag: bool,
    pub bitstream_restrictions: Option<BitstreamRestrictions>,
}
impl VuiParameters {
    pub(crate) fn read<R: BitRead>(
        r: &mut R,
        errs: &mut UnitErrors,
    ) -> Result<VuiParameters, BitReaderError> {
        let aspect_ratio_info = AspectRatioInfo::read(r)?;
        let overscan_appropriate = if r.read_bool("overscan_info_present_flag")? {
            Some(r.read_bool("overscan_appropriate_flag")?)
        } else {
            None
        };
        let video_signal_type = VideoSignalType::read(r)?;
        let chroma_loc_info = if r.read_bool("chroma_loc_info_present_flag")? {
            Some((
                r.read_ue("chroma_sample_loc_type_top_field")?,
                r.read_ue("chroma_sample_loc_type_bottom_field")?,
            ))
        } else {
            None
        };
        let timing_info = TimingInfo::read(r)?;
        let nal_hrd_parameters =
            HrdParameters::read_optional(r, "nal_hrd_parameters_present_flag", errs)?;
        let vcl_hrd_parameters =
            HrdParameters::read_optional(r, "vcl_hrd_parameters_present_flag", errs)?;
        let low_delay_hrd_flag = if nal_hrd_parameters.is_some() || vcl_hrd_parameters.is_some()
        {
            Some(r.read_bool("low_delay_hrd_flag")?)
        } else {
            None
        };
        Ok(VuiParameters {
            aspect_ratio_info,
            overscan_appropriate,
            video_signal_type,
            chroma_loc_info,
            timing_info,
            nal_hrd_parameters,
            vcl_hrd_parameters,
            low_delay_hrd_flag,
            pic_struct_present_flag: r.read_bool("pic_struct_present_flag")?,
            bitstream_restrictions: BitstreamRestrictions::read(r)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeqParameterSet {
    pub profile_idc: ProfileIdc,
    pub constraint_flags: ConstraintFlags,
    pub level_idc: u8,
    pub seq_parameter_set_id: SeqParamSetId,
    pub chroma_info: ChromaInfo,
    pub log2_max_frame_num_minus4: u8,
    pub pic_order_cnt: PicOrderCntType,
    pub max_num_ref_frames: u32,
    pub gaps_in_frame_num_value_allowed_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_flags: FrameMbsFlags,
    pub direct_8x8_inference_flag: bool,
    pub frame_cropping: Option<FrameCropping>,
    pub vui_parameters: Option<VuiParameters>,
}
impl SeqParameterSet {
    /// Parses `seq_parameter_set_data()` without consuming the RBSP trailing bits, so that the
    /// same code serves the SPS and the subset SPS.
    pub fn read<R: BitRead>(r: &mut R, errs: &mut UnitErrors) -> Result<SeqParameterSet, SpsError> {
        let profile_idc = ProfileIdc(r.read(8, "profile_idc")?);
        let constraint_flags = ConstraintFlags(r.read(8, "constraint_flags")?);
        let level_idc = r.read(8, "level_idc")?;
        let seq_parameter_set_id = SeqParamSetId::from_u32(r.read_ue("seq_parameter_set_id")?)
            .map_err(SpsError::BadSeqParamSetId)?;
        let chroma_info = ChromaInfo::read(r, profile_idc, errs)?;
        let log2_max_frame_num_minus4 =
            read_ue_clamped(r, "log2_max_frame_num_minus4", 12, errs)? as u8;
        let pic_order_cnt = PicOrderCntType::read(r, errs)?;
        let max_num_ref_frames = r.read_ue("max_num_ref_frames")?;
        let gaps_in_frame_num_value_allowed_flag =
            r.read_bool("gaps_in_frame_num_value_allowed_flag")?;
        let pic_width_in_mbs_minus1 = r.read_ue("pic_width_in_mbs_minus1")?;
        let pic_height_in_map_units_minus1 = r.read_ue("pic_height_in_map_units_minus1")?;
        let map_units = (u64::from(pic_width_in_mbs_minus1) + 1)
            * (u64::from(pic_height_in_map_units_minus1) + 1);
        if map_units > u64::from(MAX_PIC_SIZE_IN_MAP_UNITS) {
            return Err(SpsError::FieldValueTooLarge {
                name: "pic_width_in_mbs_minus1",
                value: pic_width_in_mbs_minus1,
            });
        }
        Ok(SeqParameterSet {
            profile_idc,
            constraint_flags,
            level_idc,
            seq_parameter_set_id,
            chroma_info,
            log2_max_frame_num_minus4,
            pic_order_cnt,
            max_num_ref_frames,
            gaps_in_frame_num_value_allowed_flag,
            pic_width_in_mbs_minus1,
            pic_height_in_map_units_minus1,
            frame_mbs_flags: FrameMbsFlags::read(r)?,
            direct_8x8_inference_flag: r.read_bool("direct_8x8_inference_flag")?,
            frame_cropping: FrameCropping::read(r)?,
            vui_parameters: if r.read_bool("vui_parameters_present_flag")? {
                Some(VuiParameters::read(r, errs)?)
            } else {
                None
            },
        })
    }

    /// Parses a complete `seq_parameter_set_rbsp()`, including the trailing bits.
    pub fn from_bits<R: BitRead>(mut r: R) -> Result<SeqParameterSet, SpsError> {
        let mut errs = UnitErrors::empty();
        let sps = Self::read(&mut r, &mut errs)?;
        r.finish_rbsp()?;
        Ok(sps)
    }

    pub fn id(&self) -> SeqParamSetId {
        self.seq_parameter_set_id
    }

    /// returned value will be in the range 4 to 16 inclusive
    pub fn log2_max_frame_num(&self) -> u8 {
        self.log2_max_frame_num_minus4 + 4
    }

    pub fn frame_mbs_only(&self) -> bool {
        self.frame_mbs_flags == FrameMbsFlags::Frames
    }

    pub fn scaling(&self) -> ResolvedScaling {
        ScalingMatrix::resolve_sequence(self.chroma_info.scaling_matrix.as_ref())
    }

    /// Helper to calculate the pixel-dimensions of the video image specified by this SPS, taking
    /// into account sample-format, interlacing and cropping.
    pub fn pixel_dimensions(&self) -> Result<(u32, u32), SpsError> {
        let too_large = |name, value| SpsError::FieldValueTooLarge { name, value };
        let width = self
            .pic_width_in_mbs_minus1
            .checked_add(1)
            .and_then(|w| w.checked_mul(16))
            .ok_or_else(|| too_large("pic_width_in_mbs_minus1", self.pic_width_in_mbs_minus1))?;
        let mul = if self.frame_mbs_only() { 1 } else { 2 };
        let height = self
            .pic_height_in_map_units_minus1
            .checked_add(1)
            .and_then(|h| h.checked_mul(mul * 16))
            .ok_or_else(|| {
                too_large(
                    "pic_height_in_map_units_minus1",
                    self.pic_height_in_map_units_minus1,
                )
            })?;
        let Some(crop) = &self.frame_cropping else {
            return Ok((width, height));
        };
        let (step_x, step_y) = match self.chroma_info.chroma_array_type() {
            1 => (2, 2 * mul),
            2 => (2, mul),
            _ => (1, mul),
        };
        let crop_w = crop
            .left_offset
            .checked_add(crop.right_offset)
            .and_then(|c| c.checked_mul(step_x));
        let crop_h = crop
            .top_offset
            .checked_add(crop.bottom_offset)
            .and_then(|c| c.checked_mul(step_y));
        match (
            crop_w.and_then(|c| width.checked_sub(c)),
            crop_h.and_then(|c| height.checked_sub(c)),
        ) {
            (Some(w), Some(h)) => Ok((w, h)),
            _ => Err(SpsError::CroppingError(crop.clone())),
        }
    }

    pub fn rfc6381(&self) -> rfc6381_codec::Codec {
        rfc6381_codec::Codec::avc1(self.profile_idc.0, self.constraint_flags.0, self.level_idc)
    }

    pub fn fps(&self) -> Option<f64> {
        let timing_info = self.vui_parameters.as_ref()?.timing_info.as_ref()?;
        Some(f64::from(timing_info.time_scale) / (2.0 * f64::from(timing_info.num_units_in_tick)))
    }

    pub fn pic_width_in_mbs(&self) -> u32 {
        self.pic_width_in_mbs_minus1.saturating_add(1)
    }

    /// `PicHeightInMapUnits = pic_height_in_map_units_minus1 + 1`
    pub fn pic_height_in_map_units(&self) -> u32 {
        self.pic_height_in_map_units_minus1.saturating_add(1)
    }

    /// `PicSizeInMapUnits = PicWidthInMbs * PicHeightInMapUnits`
    pub fn pic_size_in_map_units(&self) -> u32 {
        self.pic_width_in_mbs()
            .saturating_mul(self.pic_height_in_map_units())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rbsp::{decode_nal, BitReader};
    use crate::testutil::{self, BitWriter, SpsParams};
    use hex_literal::*;
    use test_case::test_case;

    #[test]
    fn test_it() {
        let data = hex!(
            "64 00 0A AC 72 84 44 26 84 00 00
            00 04 00 00 00 CA 3C 48 96 11 80"
        );
        let sps = SeqParameterSet::from_bits(BitReader::new(&data[..])).unwrap();
        assert!(!format!("{:?}", sps).is_empty());
        assert_eq!(ProfileIdc::HIGH, sps.profile_idc);
        assert_eq!(0, sps.constraint_flags.reserved_zero_two_bits());
        assert_eq!((64, 64), sps.pixel_dimensions().unwrap());
        assert!(sps.chroma_info.scaling_matrix.is_some());
        assert!(!sps.rfc6381().to_string().is_empty())
    }

    #[test]
    fn test_dahua() {
        // From a Dahua IPC-HDW5231R-Z's sub stream, which is anamorphic.
        let data = hex!(
            "64 00 16 AC 1B 1A 80 B0 3D FF FF
           00 28 00 21 6E 0C 0C 0C 80 00 01
           F4 00 00 27 10 74 30 07 D0 00 07
           A1 25 DE 5C 68 60 0F A0 00 0F 42
           4B BC B8 50"
        );
        let sps = SeqParameterSet::from_bits(BitReader::new(&data[..])).unwrap();
        assert_eq!(
            sps.vui_parameters.unwrap().aspect_ratio_info.unwrap().get(),
            Some((40, 33))
        );
    }

    #[test_case(
        &hex!("67 64 00 0c ac 3b 50 b0 4b 42 00 00 03 00 02 00 00 03 00 3d 08"),
        352, 288, 15.0; "352x288"
    )]
    #[test_case(
        &hex!("67 64 00 1f ac d9 40 50 05 bb 01 6c 80 00 00 03 00 80 00 00 1e 07 8c 18 cb"),
        1280, 720, 30.0; "1280x720"
    )]
    #[test_case(
        &[
            103, 77, 0, 41, 154, 100, 3, 192, 17, 63, 46, 2, 220, 4, 4, 5, 0, 0, 3, 3, 232, 0, 0,
            195, 80, 232, 96, 0, 186, 180, 0, 2, 234, 196, 187, 203, 141, 12, 0, 23, 86, 128, 0,
            93, 88, 151, 121, 112, 160,
        ],
        1920, 1080, 25.0; "1920x1080 hikvision nal hrd + vcl hrd"
    )]
    fn dimensions(nal: &[u8], width: u32, height: u32, fps: f64) {
        let rbsp = decode_nal(nal).unwrap();
        let sps = SeqParameterSet::from_bits(BitReader::new(&rbsp)).unwrap();
        assert_eq!((width, height), sps.pixel_dimensions().unwrap());
        assert_eq!(Some(fps), sps.fps());
    }

    #[test]
    fn hrd_fields() {
        let nal = [
            103, 77, 0, 41, 154, 100, 3, 192, 17, 63, 46, 2, 220, 4, 4, 5, 0, 0, 3, 3, 232, 0, 0,
            195, 80, 232, 96, 0, 186, 180, 0, 2, 234, 196, 187, 203, 141, 12, 0, 23, 86, 128, 0,
            93, 88, 151, 121, 112, 160,
        ];
        let rbsp = decode_nal(&nal).unwrap();
        let sps = SeqParameterSet::from_bits(BitReader::new(&rbsp)).unwrap();
        let vui = sps.vui_parameters.unwrap();
        let hrd = vui.nal_hrd_parameters.unwrap();
        assert_eq!(hrd.cpb_specs.len(), 1);
        assert_eq!(hrd.cpb_specs[0].bit_rate_value_minus1, 11948);
        assert_eq!(hrd.time_offset_length, 24);
        assert_eq!(vui.low_delay_hrd_flag, Some(false));
        assert!(vui.pic_struct_present_flag);
        assert_eq!(
            sps.frame_cropping,
            Some(FrameCropping {
                bottom_offset: 4,
                ..FrameCropping::default()
            })
        );
    }

    #[test]
    fn crop_removes_all_pixels() {
        let data = testutil::sps_rbsp(&SpsParams::default());
        let mut sps = SeqParameterSet::from_bits(BitReader::new(&data)).unwrap();
        sps.frame_cropping = Some(FrameCropping {
            bottom_offset: 20,
            left_offset: 20,
            right_offset: 20,
            top_offset: 20,
        });
        // should return Err, rather than assert due to integer underflow for example,
        assert!(matches!(
            sps.pixel_dimensions(),
            Err(SpsError::CroppingError(_))
        ));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut w = BitWriter::new();
        w.bits(8, 100) // profile_idc
            .bits(8, 0)
            .bits(8, 40)
            .ue(0) // seq_parameter_set_id
            .ue(1) // chroma_format_idc
            .ue(9) // bit_depth_luma_minus8
            .ue(0)
            .bit(false)
            .bit(false)
            .ue(14) // log2_max_frame_num_minus4
            .ue(0) // pic_order_cnt_type
            .ue(13) // log2_max_pic_order_cnt_lsb_minus4
            .ue(1)
            .bit(false)
            .ue(10)
            .ue(5)
            .bit(true)
            .bit(true)
            .bit(false)
            .bit(false)
            .trailing_bits();
        let data = w.finish();
        let mut errs = UnitErrors::empty();
        let sps = SeqParameterSet::read(&mut BitReader::new(&data), &mut errs).unwrap();
        assert!(errs.contains(UnitErrors::RANGE_CLAMPED));
        assert_eq!(sps.chroma_info.bit_depth_luma_minus8, 6);
        assert_eq!(sps.log2_max_frame_num(), 16);
        assert_eq!(
            sps.pic_order_cnt,
            PicOrderCntType::TypeZero {
                log2_max_pic_order_cnt_lsb_minus4: 12
            }
        );
        assert_eq!(sps.pixel_dimensions().unwrap(), (176, 96));
    }

    fn sized_sps(write_size: impl FnOnce(&mut BitWriter)) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.bits(8, 66)
            .bits(8, 0)
            .bits(8, 51)
            .ue(0)
            .ue(0) // log2_max_frame_num_minus4
            .ue(2) // pic_order_cnt_type
            .ue(1)
            .bit(false);
        write_size(&mut w);
        w.bit(true).bit(true).bit(false).bit(false).trailing_bits();
        w.finish()
    }

    #[test]
    fn largest_level_size_accepted() {
        let data = sized_sps(|w| {
            w.ue(511).ue(271);
        });
        let sps = SeqParameterSet::from_bits(BitReader::new(&data)).unwrap();
        assert_eq!(
            sps.pic_width_in_mbs() * sps.pic_height_in_map_units(),
            MAX_PIC_SIZE_IN_MAP_UNITS
        );
        assert_eq!(sps.pixel_dimensions().unwrap(), (8192, 4352));
    }

    #[test]
    fn oversized_picture_rejected() {
        let data = sized_sps(|w| {
            w.ue(600).ue(600);
        });
        assert!(matches!(
            SeqParameterSet::from_bits(BitReader::new(&data)),
            Err(SpsError::FieldValueTooLarge {
                name: "pic_width_in_mbs_minus1",
                value: 600
            })
        ));
    }

    #[test]
    fn sentinel_width_rejected() {
        // 31 leading zeros decode to the reserved u32::MAX code
        let data = sized_sps(|w| {
            w.bits(32, 1).ue(0);
        });
        let mut errs = UnitErrors::empty();
        assert!(matches!(
            SeqParameterSet::read(&mut BitReader::new(&data), &mut errs),
            Err(SpsError::FieldValueTooLarge {
                value: u32::MAX,
                ..
            })
        ));
    }

    #[test]
    fn id_too_large() {
        let mut w = BitWriter::new();
        w.bits(8, 66).bits(8, 0).bits(8, 30).ue(32).trailing_bits();
        let data = w.finish();
        assert!(matches!(
            SeqParameterSet::from_bits(BitReader::new(&data)),
            Err(SpsError::BadSeqParamSetId(SeqParamSetIdError::IdTooLarge(32)))
        ));
    }

    #[test]
    fn constraint_flags() {
        let flags = ConstraintFlags::from(0b0100_0100);
        assert!(!flags.flag(0));
        assert!(flags.flag(1));
        assert!(flags.flag(5));
        assert!(!flags.flag(6));
    }
}
