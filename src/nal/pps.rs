use super::scaling::{ResolvedScaling, ScalingMatrix, ScalingMatrixError};
use super::sps::{
    self, read_se_clamped, read_ue_clamped, SeqParamSetId, SeqParamSetIdError,
    MAX_PIC_SIZE_IN_MAP_UNITS,
};
use super::{ParamSets, UnitErrors};
use crate::rbsp::{self, BitRead};


#[derive(Debug)]
pub enum PpsError {
    RbspReaderError(rbsp::BitReaderError),
    InvalidSliceGroupMapType(u32),
    InvalidNumSliceGroupsMinus1(u32),
    UnknownSeqParamSetId(SeqParamSetId),
    BadPicParamSetId(PicParamSetIdError),
    BadSeqParamSetId(SeqParamSetIdError),
    ScalingMatrix(ScalingMatrixError),
    FieldValueTooLarge { name: &'static str, value: u32 },
}

impl From<rbsp::BitReaderError> for PpsError {
    fn from(e: rbsp::BitReaderError) -> Self {
        PpsError::RbspReaderError(e)
    }
}
impl From<ScalingMatrixError> for PpsError {
    fn from(e: ScalingMatrixError) -> Self {
        PpsError::ScalingMatrix(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceGroupChangeType {
    BoxOut,
    RasterScan,
    WipeOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceRect {
    pub top_left: u32,
    pub bottom_right: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceGroupMap {
    /// map type 0
    Interleaved { run_length_minus1: Vec<u32> },
    /// map type 1
    Dispersed,
    /// map type 2: one rectangle per foreground group, the last group takes the leftover
    ForegroundAndLeftover { rectangles: Vec<SliceRect> },
    /// map types 3 to 5
    Changing {
        change_type: SliceGroupChangeType,
        slice_group_change_direction_flag: bool,
        slice_group_change_rate_minus1: u32,
    },
    /// map type 6
    ExplicitAssignment { slice_group_id: Vec<u32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceGroups {
    pub num_slice_groups_minus1: u32,
    pub map: SliceGroupMap,
}
impl SliceGroups {
    fn read<R: BitRead>(r: &mut R, num_slice_groups_minus1: u32) -> Result<SliceGroups, PpsError> {
        let groups = num_slice_groups_minus1 + 1;
        let slice_group_map_type = r.read_ue("slice_group_map_type")?;
        let map = match slice_group_map_type {
            0 => {
                let mut run_length_minus1 = Vec::with_capacity(groups as usize);
                for _ in 0..groups {
                    run_length_minus1.push(r.read_ue("run_length_minus1")?);
                }
                SliceGroupMap::Interleaved { run_length_minus1 }
            }
            1 => SliceGroupMap::Dispersed,
            2 => {
                let mut rectangles = Vec::with_capacity(num_slice_groups_minus1 as usize);
                for _ in 0..num_slice_groups_minus1 {
                    rectangles.push(SliceRect {
                        top_left: r.read_ue("top_left")?,
                        bottom_right: r.read_ue("bottom_right")?,
                    });
                }
                SliceGroupMap::ForegroundAndLeftover { rectangles }
            }
            3..=5 => SliceGroupMap::Changing {
                change_type: match slice_group_map_type {
                    3 => SliceGroupChangeType::BoxOut,
                    4 => SliceGroupChangeType::RasterScan,
                    _ => SliceGroupChangeType::WipeOut,
                },
                slice_group_change_direction_flag: r
                    .read_bool("slice_group_change_direction_flag")?,
                slice_group_change_rate_minus1: r.read_ue("slice_group_change_rate_minus1")?,
            },
            6 => {
                let pic_size_in_map_units_minus1 = r.read_ue("pic_size_in_map_units_minus1")?;
                if pic_size_in_map_units_minus1 >= MAX_PIC_SIZE_IN_MAP_UNITS {
                    return Err(PpsError::FieldValueTooLarge {
                        name: "pic_size_in_map_units_minus1",
                        value: pic_size_in_map_units_minus1,
                    });
                }
                // Ceil(Log2(num_slice_groups_minus1 + 1))
                let bits = 32 - num_slice_groups_minus1.leading_zeros();
                let mut slice_group_id =
                    Vec::with_capacity(pic_size_in_map_units_minus1 as usize + 1);
                for _ in 0..=pic_size_in_map_units_minus1 {
                    slice_group_id.push(r.read_u32(bits, "slice_group_id")?);
                }
                SliceGroupMap::ExplicitAssignment { slice_group_id }
            }
            _ => return Err(PpsError::InvalidSliceGroupMapType(slice_group_map_type)),
        };
        Ok(SliceGroups {
            num_slice_groups_minus1,
            map,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PicParameterSetExtra {
    pub transform_8x8_mode_flag: bool,
    pub pic_scaling_matrix: Option<ScalingMatrix>,
    pub second_chroma_qp_index_offset: i32,
}
impl PicParameterSetExtra {
    fn read<R: BitRead>(
        r: &mut R,
        sps: &sps::SeqParameterSet,
        errs: &mut UnitErrors,
    ) -> Result<Option<PicParameterSetExtra>, PpsError> {
        if !r.has_more_rbsp_data("transform_8x8_mode_flag")? {
            return Ok(None);
        }
        let transform_8x8_mode_flag = r.read_bool("transform_8x8_mode_flag")?;
        let pic_scaling_matrix = if r.read_bool("pic_scaling_matrix_present_flag")? {
            let count8x8 = match (transform_8x8_mode_flag, sps.chroma_info.chroma_format) {
                (false, _) => 0,
                (true, sps::ChromaFormat::YUV444) => 6,
                (true, _) => 2,
            };
            Some(ScalingMatrix::read(r, count8x8)?)
        } else {
            None
        };
        Ok(Some(PicParameterSetExtra {
            transform_8x8_mode_flag,
            pic_scaling_matrix,
            second_chroma_qp_index_offset: read_se_clamped(
                r,
                "second_chroma_qp_index_offset",
                -12,
                12,
                errs,
            )?,
        }))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PicParamSetIdError {
    IdTooLarge(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PicParamSetId(u8);
impl PicParamSetId {
    pub fn from_u32(id: u32) -> Result<PicParamSetId, PicParamSetIdError> {
        if id > 255 {
            Err(PicParamSetIdError::IdTooLarge(id))
        } else {
            Ok(PicParamSetId(id as u8))
        }
    }
    pub fn id(self) -> u8 {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PicParameterSet {
    pub pic_parameter_set_id: PicParamSetId,
    pub seq_parameter_set_id: SeqParamSetId,
    pub entropy_coding_mode_flag: bool,
    pub bottom_field_pic_order_in_frame_present_flag: bool,
    pub slice_groups: Option<SliceGroups>,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_idc: u8,
    pub pic_init_qp_minus26: i32,
    pub pic_init_qs_minus26: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present_flag: bool,
    pub constrained_intra_pred_flag: bool,
    pub redundant_pic_cnt_present_flag: bool,
    pub extension: Option<PicParameterSetExtra>,
}
impl PicParameterSet {
    /// Parses `pic_parameter_set_rbsp()` up to, but not including, the trailing bits.
    ///
    /// The referenced SPS (or the SPS data of a subset SPS with that id) must already be known
    /// to `ctx`, since the interpretation of the optional tail depends on it.
    pub fn read<C: ParamSets + ?Sized, R: BitRead>(
        ctx: &C,
        r: &mut R,
        errs: &mut UnitErrors,
    ) -> Result<PicParameterSet, PpsError> {
        let pic_parameter_set_id = PicParamSetId::from_u32(r.read_ue("pic_parameter_set_id")?)
            .map_err(PpsError::BadPicParamSetId)?;
        let seq_parameter_set_id = SeqParamSetId::from_u32(r.read_ue("seq_parameter_set_id")?)
            .map_err(PpsError::BadSeqParamSetId)?;
        let seq_parameter_set = ctx
            .any_sps_by_id(seq_parameter_set_id)
            .ok_or(PpsError::UnknownSeqParamSetId(seq_parameter_set_id))?;
        let entropy_coding_mode_flag = r.read_bool("entropy_coding_mode_flag")?;
        let bottom_field_pic_order_in_frame_present_flag =
            r.read_bool("bottom_field_pic_order_in_frame_present_flag")?;
        let num_slice_groups_minus1 = r.read_ue("num_slice_groups_minus1")?;
        if num_slice_groups_minus1 > 7 {
            // 7 is the maximum allowed in any profile; some profiles restrict it to 0.
            return Err(PpsError::InvalidNumSliceGroupsMinus1(
                num_slice_groups_minus1,
            ));
        }
        let slice_groups = if num_slice_groups_minus1 > 0 {
            Some(SliceGroups::read(r, num_slice_groups_minus1)?)
        } else {
            None
        };
        // -QpBdOffsetY
        let min_qp = -26 - 6 * i32::from(seq_parameter_set.chroma_info.bit_depth_luma_minus8);
        Ok(PicParameterSet {
            pic_parameter_set_id,
            seq_parameter_set_id,
            entropy_coding_mode_flag,
            bottom_field_pic_order_in_frame_present_flag,
            slice_groups,
            num_ref_idx_l0_default_active_minus1: read_ue_clamped(
                r,
                "num_ref_idx_l0_default_active_minus1",
                31,
                errs,
            )?,
            num_ref_idx_l1_default_active_minus1: read_ue_clamped(
                r,
                "num_ref_idx_l1_default_active_minus1",
                31,
                errs,
            )?,
            weighted_pred_flag: r.read_bool("weighted_pred_flag")?,
            weighted_bipred_idc: r.read(2, "weighted_bipred_idc")?,
            pic_init_qp_minus26: read_se_clamped(r, "pic_init_qp_minus26", min_qp, 25, errs)?,
            pic_init_qs_minus26: read_se_clamped(r, "pic_init_qs_minus26", -26, 25, errs)?,
            chroma_qp_index_offset: read_se_clamped(r, "chroma_qp_index_offset", -12, 12, errs)?,
            deblocking_filter_control_present_flag: r
                .read_bool("deblocking_filter_control_present_flag")?,
            constrained_intra_pred_flag: r.read_bool("constrained_intra_pred_flag")?,
            redundant_pic_cnt_present_flag: r.read_bool("redundant_pic_cnt_present_flag")?,
            extension: PicParameterSetExtra::read(r, seq_parameter_set, errs)?,
        })
    }

    pub fn from_bits<C: ParamSets + ?Sized, R: BitRead>(
        ctx: &C,
        mut r: R,
    ) -> Result<PicParameterSet, PpsError> {
        let mut errs = UnitErrors::empty();
        let pps = Self::read(ctx, &mut r, &mut errs)?;
        r.finish_rbsp()?;
        Ok(pps)
    }

    pub fn id(&self) -> PicParamSetId {
        self.pic_parameter_set_id
    }

    pub fn num_slice_groups(&self) -> u32 {
        self.slice_groups
            .as_ref()
            .map_or(1, |g| g.num_slice_groups_minus1 + 1)
    }

    pub fn transform_8x8_mode(&self) -> bool {
        self.extension
            .as_ref()
            .is_some_and(|e| e.transform_8x8_mode_flag)
    }

    /// The scaling lists in effect for pictures using this PPS with the given SPS.
    pub fn scaling(&self, sps: &sps::SeqParameterSet) -> ResolvedScaling {
        ScalingMatrix::resolve_picture(
            self.extension
                .as_ref()
                .and_then(|e| e.pic_scaling_matrix.as_ref()),
            sps.chroma_info.scaling_matrix.as_ref(),
        )
    }
}
