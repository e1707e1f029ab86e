//! Slice header, `slice_header()` of section 7.3.3, including the MVC variant carried by slice
//! extension units (type 20).

pub mod new_picture;

use super::pps::{PicParamSetId, PicParamSetIdError, PicParameterSet, SliceGroupMap};
use super::sps::{self, read_se_clamped, read_ue_clamped, SeqParameterSet};
use super::{MvcHeader, NalHeader, ParamSets, UnitErrors, UnitType};
use crate::rbsp::{BitRead, BitReaderError};
use log::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceFamily {
    P,
    B,
    I,
    SP,
    SI,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceExclusive {
    /// All slices in the picture have the same type
    Exclusive,
    /// Other slices in the picture may have a different type than the current slice
    NonExclusive,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceType {
    pub family: SliceFamily,
    pub exclusive: SliceExclusive,
    /// The `slice_type` value as coded.
    pub raw: u32,
}
impl SliceType {
    /// Values above 9 are reduced modulo 5 like the legal ones, and flagged.
    fn read<R: BitRead>(r: &mut R, errs: &mut UnitErrors) -> Result<SliceType, BitReaderError> {
        let raw = r.read_ue("slice_type")?;
        if raw > 9 {
            warn!("slice_type {} out of range", raw);
            *errs |= UnitErrors::RANGE_CLAMPED;
        }
        let family = match raw % 5 {
            0 => SliceFamily::P,
            1 => SliceFamily::B,
            2 => SliceFamily::I,
            3 => SliceFamily::SP,
            _ => SliceFamily::SI,
        };
        let exclusive = if (5..=9).contains(&raw) {
            SliceExclusive::Exclusive
        } else {
            SliceExclusive::NonExclusive
        };
        Ok(SliceType {
            family,
            exclusive,
            raw,
        })
    }

    pub fn is_intra(&self) -> bool {
        matches!(self.family, SliceFamily::I | SliceFamily::SI)
    }
}

#[derive(Debug)]
pub enum SliceHeaderError {
    RbspError(BitReaderError),
    InvalidPicParamSetId(PicParamSetIdError),
    UndefinedPicParamSetId(PicParamSetId),
    UndefinedSeqParamSetId(sps::SeqParamSetId),
    ColourPlaneError(ColourPlaneError),
    InvalidModificationOfPicNumIdc(u32),
    InvalidMemoryManagementControlOperation(u32),
    InvalidCabacInitIdc(u32),
    InvalidDisableDeblockingFilterIdc(u32),
}
impl From<BitReaderError> for SliceHeaderError {
    fn from(e: BitReaderError) -> Self {
        SliceHeaderError::RbspError(e)
    }
}
impl From<ColourPlaneError> for SliceHeaderError {
    fn from(e: ColourPlaneError) -> Self {
        SliceHeaderError::ColourPlaneError(e)
    }
}
impl SliceHeaderError {
    /// The flag recorded against the unit when its header cannot be read.
    pub fn unit_error(&self) -> UnitErrors {
        match self {
            SliceHeaderError::RbspError(e) if e.fault().is_some() => UnitErrors::READER_EXCEPTION,
            SliceHeaderError::UndefinedPicParamSetId(_)
            | SliceHeaderError::UndefinedSeqParamSetId(_) => UnitErrors::MISSING_REFERENCE,
            _ => UnitErrors::MALFORMED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourPlane {
    /// Indicates the _chroma_ colour plane
    Y,
    /// Indicates the _blue-difference_ colour plane
    Cb,
    /// Indicates the _red-difference_ colour plane
    Cr,
}
#[derive(Debug)]
pub enum ColourPlaneError {
    InvalidId(u8),
}
impl ColourPlane {
    fn from_id(id: u8) -> Result<ColourPlane, ColourPlaneError> {
        match id {
            0 => Ok(ColourPlane::Y),
            1 => Ok(ColourPlane::Cb),
            2 => Ok(ColourPlane::Cr),
            _ => Err(ColourPlaneError::InvalidId(id)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPic {
    Frame,
    Field(Field),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PicOrderCountLsb {
    Frame(u32),
    FieldsAbsolute {
        pic_order_cnt_lsb: u32,
        delta_pic_order_cnt_bottom: i32,
    },
    /// `delta_pic_order_cnt[0..2]`, with an absent second value taken as zero
    FieldsDelta([i32; 2]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumRefIdxActive {
    P {
        num_ref_idx_l0_active_minus1: u32,
    },
    B {
        num_ref_idx_l0_active_minus1: u32,
        num_ref_idx_l1_active_minus1: u32,
    },
}
impl NumRefIdxActive {
    fn num_ref_idx_l0_active_minus1(&self) -> u32 {
        match *self {
            NumRefIdxActive::P {
                num_ref_idx_l0_active_minus1,
            }
            | NumRefIdxActive::B {
                num_ref_idx_l0_active_minus1,
                ..
            } => num_ref_idx_l0_active_minus1,
        }
    }
    fn num_ref_idx_l1_active_minus1(&self) -> Option<u32> {
        match *self {
            NumRefIdxActive::P { .. } => None,
            NumRefIdxActive::B {
                num_ref_idx_l1_active_minus1,
                ..
            } => Some(num_ref_idx_l1_active_minus1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModificationOfPicNums {
    Subtract(u32),
    Add(u32),
    LongTermRef(u32),
    /// `modification_of_pic_nums_idc` 4, inter-view reference in an MVC slice
    SubtractViewIdx(u32),
    /// `modification_of_pic_nums_idc` 5
    AddViewIdx(u32),
}
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefPicListModifications {
    I,
    P {
        ref_pic_list_modification_l0: Vec<ModificationOfPicNums>,
    },
    B {
        ref_pic_list_modification_l0: Vec<ModificationOfPicNums>,
        ref_pic_list_modification_l1: Vec<ModificationOfPicNums>,
    },
}
impl RefPicListModifications {
    fn read<R: BitRead>(
        slice_family: SliceFamily,
        r: &mut R,
        mvc: bool,
    ) -> Result<RefPicListModifications, SliceHeaderError> {
        Ok(match slice_family {
            SliceFamily::I | SliceFamily::SI => RefPicListModifications::I,
            SliceFamily::B => RefPicListModifications::B {
                ref_pic_list_modification_l0: Self::read_list(r, mvc)?,
                ref_pic_list_modification_l1: Self::read_list(r, mvc)?,
            },
            SliceFamily::P | SliceFamily::SP => RefPicListModifications::P {
                ref_pic_list_modification_l0: Self::read_list(r, mvc)?,
            },
        })
    }

    fn read_list<R: BitRead>(
        r: &mut R,
        mvc: bool,
    ) -> Result<Vec<ModificationOfPicNums>, SliceHeaderError> {
        let mut result = vec![];
        // either ref_pic_list_modification_flag_l0 or ref_pic_list_modification_flag_l1 depending
        // on call-site,
        if !r.read_bool("ref_pic_list_modification_flag")? {
            return Ok(result);
        }
        loop {
            match r.read_ue("modification_of_pic_nums_idc")? {
                0 => result.push(ModificationOfPicNums::Subtract(
                    r.read_ue("abs_diff_pic_num_minus1")?,
                )),
                1 => result.push(ModificationOfPicNums::Add(
                    r.read_ue("abs_diff_pic_num_minus1")?,
                )),
                2 => result.push(ModificationOfPicNums::LongTermRef(
                    r.read_ue("long_term_pic_num")?,
                )),
                3 => break,
                4 if mvc => result.push(ModificationOfPicNums::SubtractViewIdx(
                    r.read_ue("abs_diff_view_idx_minus1")?,
                )),
                5 if mvc => result.push(ModificationOfPicNums::AddViewIdx(
                    r.read_ue("abs_diff_view_idx_minus1")?,
                )),
                v => return Err(SliceHeaderError::InvalidModificationOfPicNumIdc(v)),
            }
        }
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredWeight {
    pub weight: i32,
    pub offset: i32,
}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredWeightTable {
    pub luma_log2_weight_denom: u32,
    pub chroma_log2_weight_denom: Option<u32>,
    pub luma_weights_l0: Vec<Option<PredWeight>>,
    pub chroma_weights_l0: Vec<Option<[PredWeight; 2]>>,
    pub luma_weights_l1: Vec<Option<PredWeight>>,
    pub chroma_weights_l1: Vec<Option<[PredWeight; 2]>>,
}
impl PredWeightTable {
    fn read<R: BitRead>(
        r: &mut R,
        slice_type: &SliceType,
        pps: &PicParameterSet,
        sps: &SeqParameterSet,
        num_ref_active: &Option<NumRefIdxActive>,
    ) -> Result<PredWeightTable, SliceHeaderError> {
        let chroma_present = sps.chroma_info.chroma_array_type() != 0;
        let luma_log2_weight_denom = r.read_ue("luma_log2_weight_denom")?;
        let chroma_log2_weight_denom = if chroma_present {
            Some(r.read_ue("chroma_log2_weight_denom")?)
        } else {
            None
        };
        let num_l0 = num_ref_active
            .as_ref()
            .map_or(pps.num_ref_idx_l0_default_active_minus1, |n| {
                n.num_ref_idx_l0_active_minus1()
            });
        let (luma_weights_l0, chroma_weights_l0) = Self::read_list(r, num_l0, chroma_present)?;
        let (luma_weights_l1, chroma_weights_l1) = if slice_type.family == SliceFamily::B {
            let num_l1 = num_ref_active
                .as_ref()
                .and_then(|n| n.num_ref_idx_l1_active_minus1())
                .unwrap_or(pps.num_ref_idx_l1_default_active_minus1);
            Self::read_list(r, num_l1, chroma_present)?
        } else {
            (vec![], vec![])
        };
        Ok(PredWeightTable {
            luma_log2_weight_denom,
            chroma_log2_weight_denom,
            luma_weights_l0,
            chroma_weights_l0,
            luma_weights_l1,
            chroma_weights_l1,
        })
    }

    #[allow(clippy::type_complexity)]
    fn read_list<R: BitRead>(
        r: &mut R,
        num_ref_idx_active_minus1: u32,
        chroma_present: bool,
    ) -> Result<(Vec<Option<PredWeight>>, Vec<Option<[PredWeight; 2]>>), SliceHeaderError> {
        let count = num_ref_idx_active_minus1 as usize + 1;
        let mut luma_weights = Vec::with_capacity(count);
        let mut chroma_weights = Vec::with_capacity(if chroma_present { count } else { 0 });
        for _ in 0..count {
            if r.read_bool("luma_weight_flag")? {
                luma_weights.push(Some(PredWeight {
                    weight: r.read_se("luma_weight")?,
                    offset: r.read_se("luma_offset")?,
                }));
            } else {
                luma_weights.push(None);
            }
            if chroma_present {
                if r.read_bool("chroma_weight_flag")? {
                    let cb = PredWeight {
                        weight: r.read_se("chroma_weight")?,
                        offset: r.read_se("chroma_offset")?,
                    };
                    let cr = PredWeight {
                        weight: r.read_se("chroma_weight")?,
                        offset: r.read_se("chroma_offset")?,
                    };
                    chroma_weights.push(Some([cb, cr]));
                } else {
                    chroma_weights.push(None);
                }
            }
        }
        Ok((luma_weights, chroma_weights))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryManagementControlOperation {
    /// `memory_management_control_operation` value of `1`
    ShortTermUnusedForRef { difference_of_pic_nums_minus1: u32 },
    /// `memory_management_control_operation` value of `2`
    LongTermUnusedForRef { long_term_pic_num: u32 },
    /// `memory_management_control_operation` value of `3`
    ShortTermUsedForLongTerm {
        difference_of_pic_nums_minus1: u32,
        long_term_frame_idx: u32,
    },
    /// `memory_management_control_operation` value of `4`
    MaxUsedLongTermFrameRef { max_long_term_frame_idx_plus1: u32 },
    /// `memory_management_control_operation` value of `5`
    AllRefPicturesUnused,
    /// `memory_management_control_operation` value of `6`
    CurrentUsedForLongTerm { long_term_frame_idx: u32 },
}

/// Decoded reference picture marking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecRefPicMarking {
    Idr {
        no_output_of_prior_pics_flag: bool,
        long_term_reference_flag: bool,
    },
    /// `adaptive_ref_pic_marking_mode_flag` equal to `0`
    SlidingWindow,
    /// `adaptive_ref_pic_marking_mode_flag` equal to `1`
    Adaptive(Vec<MemoryManagementControlOperation>),
}
impl DecRefPicMarking {
    fn read<R: BitRead>(r: &mut R, idr: bool) -> Result<DecRefPicMarking, SliceHeaderError> {
        if idr {
            return Ok(DecRefPicMarking::Idr {
                no_output_of_prior_pics_flag: r.read_bool("no_output_of_prior_pics_flag")?,
                long_term_reference_flag: r.read_bool("long_term_reference_flag")?,
            });
        }
        if !r.read_bool("adaptive_ref_pic_marking_mode_flag")? {
            return Ok(DecRefPicMarking::SlidingWindow);
        }
        let mut ctl = vec![];
        loop {
            let op = match r.read_ue("memory_management_control_operation")? {
                0 => break,
                1 => MemoryManagementControlOperation::ShortTermUnusedForRef {
                    difference_of_pic_nums_minus1: r.read_ue("difference_of_pic_nums_minus1")?,
                },
                2 => MemoryManagementControlOperation::LongTermUnusedForRef {
                    long_term_pic_num: r.read_ue("long_term_pic_num")?,
                },
                3 => MemoryManagementControlOperation::ShortTermUsedForLongTerm {
                    difference_of_pic_nums_minus1: r.read_ue("difference_of_pic_nums_minus1")?,
                    long_term_frame_idx: r.read_ue("long_term_frame_idx")?,
                },
                4 => MemoryManagementControlOperation::MaxUsedLongTermFrameRef {
                    max_long_term_frame_idx_plus1: r.read_ue("max_long_term_frame_idx_plus1")?,
                },
                5 => MemoryManagementControlOperation::AllRefPicturesUnused,
                6 => MemoryManagementControlOperation::CurrentUsedForLongTerm {
                    long_term_frame_idx: r.read_ue("long_term_frame_idx")?,
                },
                other => {
                    return Err(SliceHeaderError::InvalidMemoryManagementControlOperation(
                        other,
                    ))
                }
            };
            ctl.push(op);
        }
        Ok(DecRefPicMarking::Adaptive(ctl))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceHeader {
    pub first_mb_in_slice: u32,
    pub slice_type: SliceType,
    pub pic_parameter_set_id: PicParamSetId,
    pub colour_plane: Option<ColourPlane>,
    pub frame_num: u16,
    pub field_pic: FieldPic,
    pub idr_pic_id: Option<u32>,
    pub pic_order_cnt_lsb: Option<PicOrderCountLsb>,
    pub redundant_pic_cnt: Option<u32>,
    pub direct_spatial_mv_pred_flag: Option<bool>,
    pub num_ref_idx_active: Option<NumRefIdxActive>,
    pub ref_pic_list_modification: RefPicListModifications,
    pub pred_weight_table: Option<PredWeightTable>,
    pub dec_ref_pic_marking: Option<DecRefPicMarking>,
    pub cabac_init_idc: Option<u32>,
    pub slice_qp_delta: i32,
    pub sp_for_switch_flag: Option<bool>,
    pub slice_qs: Option<u32>,
    pub disable_deblocking_filter_idc: u8,
    pub slice_alpha_c0_offset_div2: i32,
    pub slice_beta_offset_div2: i32,
    pub slice_group_change_cycle: Option<u32>,
}
impl SliceHeader {
    /// Parses the header of a slice unit, returning it along with the parameter sets it refers
    /// to.
    ///
    /// `mvc` is the header extension of a slice extension unit; such slices take their SPS from
    /// the subset SPS with the PPS's `seq_parameter_set_id`.
    pub fn read<'a, C: ParamSets + ?Sized, R: BitRead>(
        ctx: &'a C,
        r: &mut R,
        header: NalHeader,
        mvc: Option<&MvcHeader>,
        errs: &mut UnitErrors,
    ) -> Result<(SliceHeader, &'a SeqParameterSet, &'a PicParameterSet), SliceHeaderError> {
        let first_mb_in_slice = r.read_ue("first_mb_in_slice")?;
        let slice_type = SliceType::read(r, errs)?;
        let pic_parameter_set_id = PicParamSetId::from_u32(r.read_ue("pic_parameter_set_id")?)
            .map_err(SliceHeaderError::InvalidPicParamSetId)?;
        let pps = ctx
            .pps_by_id(pic_parameter_set_id)
            .ok_or(SliceHeaderError::UndefinedPicParamSetId(pic_parameter_set_id))?;
        let sps = if mvc.is_some() {
            ctx.subset_sps_by_id(pps.seq_parameter_set_id)
                .map(|s| &s.sps)
        } else {
            ctx.sps_by_id(pps.seq_parameter_set_id)
        }
        .ok_or(SliceHeaderError::UndefinedSeqParamSetId(
            pps.seq_parameter_set_id,
        ))?;
        let idr = match mvc {
            Some(ext) => !ext.non_idr_flag,
            None => header.nal_unit_type() == UnitType::SliceLayerWithoutPartitioningIdr,
        };
        let colour_plane = if sps.chroma_info.separate_colour_plane_flag {
            Some(ColourPlane::from_id(r.read(2, "colour_plane_id")?)?)
        } else {
            None
        };
        let frame_num = r.read(u32::from(sps.log2_max_frame_num()), "frame_num")?;
        let field_pic = if let sps::FrameMbsFlags::Fields { .. } = sps.frame_mbs_flags {
            if r.read_bool("field_pic_flag")? {
                if r.read_bool("bottom_field_flag")? {
                    FieldPic::Field(Field::Bottom)
                } else {
                    FieldPic::Field(Field::Top)
                }
            } else {
                FieldPic::Frame
            }
        } else {
            FieldPic::Frame
        };
        let idr_pic_id = if idr {
            Some(r.read_ue("idr_pic_id")?)
        } else {
            None
        };
        let bottom_present =
            pps.bottom_field_pic_order_in_frame_present_flag && field_pic == FieldPic::Frame;
        let pic_order_cnt_lsb = match sps.pic_order_cnt {
            sps::PicOrderCntType::TypeZero {
                log2_max_pic_order_cnt_lsb_minus4,
            } => {
                let pic_order_cnt_lsb = r.read_u32(
                    u32::from(log2_max_pic_order_cnt_lsb_minus4) + 4,
                    "pic_order_cnt_lsb",
                )?;
                Some(if bottom_present {
                    PicOrderCountLsb::FieldsAbsolute {
                        pic_order_cnt_lsb,
                        delta_pic_order_cnt_bottom: r.read_se("delta_pic_order_cnt_bottom")?,
                    }
                } else {
                    PicOrderCountLsb::Frame(pic_order_cnt_lsb)
                })
            }
            sps::PicOrderCntType::TypeOne {
                delta_pic_order_always_zero_flag,
                ..
            } => {
                if delta_pic_order_always_zero_flag {
                    None
                } else {
                    let delta0 = r.read_se("delta_pic_order_cnt[0]")?;
                    let delta1 = if bottom_present {
                        r.read_se("delta_pic_order_cnt[1]")?
                    } else {
                        0
                    };
                    Some(PicOrderCountLsb::FieldsDelta([delta0, delta1]))
                }
            }
            sps::PicOrderCntType::TypeTwo => None,
        };
        let redundant_pic_cnt = if pps.redundant_pic_cnt_present_flag {
            Some(read_ue_clamped(r, "redundant_pic_cnt", 127, errs)?)
        } else {
            None
        };
        let direct_spatial_mv_pred_flag = if slice_type.family == SliceFamily::B {
            Some(r.read_bool("direct_spatial_mv_pred_flag")?)
        } else {
            None
        };
        let num_ref_idx_active = if slice_type.is_intra() {
            None
        } else if r.read_bool("num_ref_idx_active_override_flag")? {
            let num_ref_idx_l0_active_minus1 =
                read_ue_clamped(r, "num_ref_idx_l0_active_minus1", 31, errs)?;
            Some(if slice_type.family == SliceFamily::B {
                NumRefIdxActive::B {
                    num_ref_idx_l0_active_minus1,
                    num_ref_idx_l1_active_minus1: read_ue_clamped(
                        r,
                        "num_ref_idx_l1_active_minus1",
                        31,
                        errs,
                    )?,
                }
            } else {
                NumRefIdxActive::P {
                    num_ref_idx_l0_active_minus1,
                }
            })
        } else {
            None
        };
        let ref_pic_list_modification =
            RefPicListModifications::read(slice_type.family, r, mvc.is_some())?;
        let pred_weight_table = if (pps.weighted_pred_flag
            && matches!(slice_type.family, SliceFamily::P | SliceFamily::SP))
            || (pps.weighted_bipred_idc == 1 && slice_type.family == SliceFamily::B)
        {
            Some(PredWeightTable::read(
                r,
                &slice_type,
                pps,
                sps,
                &num_ref_idx_active,
            )?)
        } else {
            None
        };
        let dec_ref_pic_marking = if header.nal_ref_idc() == 0 {
            None
        } else {
            Some(DecRefPicMarking::read(r, idr)?)
        };
        let cabac_init_idc = if pps.entropy_coding_mode_flag && !slice_type.is_intra() {
            let v = r.read_ue("cabac_init_idc")?;
            if v > 2 {
                return Err(SliceHeaderError::InvalidCabacInitIdc(v));
            }
            Some(v)
        } else {
            None
        };
        let slice_qp_delta = read_qp_delta(r, pps, sps, errs)?;
        let mut sp_for_switch_flag = None;
        let mut slice_qs = None;
        if matches!(slice_type.family, SliceFamily::SP | SliceFamily::SI) {
            if slice_type.family == SliceFamily::SP {
                sp_for_switch_flag = Some(r.read_bool("sp_for_switch_flag")?);
            }
            let slice_qs_delta = r.read_se("slice_qs_delta")?;
            let qs_y = pps
                .pic_init_qs_minus26
                .saturating_add(26)
                .saturating_add(slice_qs_delta);
            if !(0..=51).contains(&qs_y) {
                warn!("QS_Y {} out of range, clamped", qs_y);
                *errs |= UnitErrors::RANGE_CLAMPED;
            }
            slice_qs = Some(qs_y.clamp(0, 51) as u32);
        }
        let mut disable_deblocking_filter_idc = 0;
        let mut slice_alpha_c0_offset_div2 = 0;
        let mut slice_beta_offset_div2 = 0;
        if pps.deblocking_filter_control_present_flag {
            let v = r.read_ue("disable_deblocking_filter_idc")?;
            if v > 6 {
                return Err(SliceHeaderError::InvalidDisableDeblockingFilterIdc(v));
            }
            disable_deblocking_filter_idc = v as u8;
            if disable_deblocking_filter_idc != 1 {
                slice_alpha_c0_offset_div2 =
                    read_se_clamped(r, "slice_alpha_c0_offset_div2", -6, 6, errs)?;
                slice_beta_offset_div2 =
                    read_se_clamped(r, "slice_beta_offset_div2", -6, 6, errs)?;
            }
        }
        let slice_group_change_cycle = match slice_group_change_cycle_bits(pps, sps) {
            Some(bits) => Some(r.read_u32(bits, "slice_group_change_cycle")?),
            None => None,
        };
        let header = SliceHeader {
            first_mb_in_slice,
            slice_type,
            pic_parameter_set_id,
            colour_plane,
            frame_num,
            field_pic,
            idr_pic_id,
            pic_order_cnt_lsb,
            redundant_pic_cnt,
            direct_spatial_mv_pred_flag,
            num_ref_idx_active,
            ref_pic_list_modification,
            pred_weight_table,
            dec_ref_pic_marking,
            cabac_init_idc,
            slice_qp_delta,
            sp_for_switch_flag,
            slice_qs,
            disable_deblocking_filter_idc,
            slice_alpha_c0_offset_div2,
            slice_beta_offset_div2,
            slice_group_change_cycle,
        };
        Ok((header, sps, pps))
    }

    pub fn is_idr(&self) -> bool {
        self.idr_pic_id.is_some()
    }
}

/// `slice_qp_delta`, keeping `SliceQPY` within `-QpBdOffsetY..=51`.
fn read_qp_delta<R: BitRead>(
    r: &mut R,
    pps: &PicParameterSet,
    sps: &SeqParameterSet,
    errs: &mut UnitErrors,
) -> Result<i32, BitReaderError> {
    let slice_qp_delta = r.read_se("slice_qp_delta")?;
    let qp_bd_offset_y = 6 * i32::from(sps.chroma_info.bit_depth_luma_minus8);
    let base = 26 + pps.pic_init_qp_minus26;
    let qp_y = base.saturating_add(slice_qp_delta);
    let clamped = qp_y.clamp(-qp_bd_offset_y, 51);
    if clamped != qp_y {
        warn!("SliceQPY {} out of range, clamped to {}", qp_y, clamped);
        *errs |= UnitErrors::RANGE_CLAMPED;
    }
    Ok(clamped - base)
}

/// Width of `slice_group_change_cycle`, present only for the changing map types:
/// `Ceil(Log2(PicSizeInMapUnits / SliceGroupChangeRate + 1))`.
pub fn slice_group_change_cycle_bits(pps: &PicParameterSet, sps: &SeqParameterSet) -> Option<u32> {
    let groups = pps.slice_groups.as_ref()?;
    let SliceGroupMap::Changing {
        slice_group_change_rate_minus1,
        ..
    } = groups.map
    else {
        return None;
    };
    let rate = u64::from(slice_group_change_rate_minus1) + 1;
    let target = u64::from(sps.pic_size_in_map_units()) + rate;
    let mut bits = 0;
    while (rate << bits) < target {
        bits += 1;
    }
    Some(bits)
}
