//! Subset sequence parameter set, `subset_seq_parameter_set_rbsp()` (NAL type 15).
//!
//! The MVC extension (profiles 118, 128 and 134) is parsed so that the views of a stream and
//! their decoding order are known. SVC and MVCD extensions are recognised, but their content is
//! skipped.

use super::sps::{SeqParameterSet, SpsError};
use super::UnitErrors;
use crate::rbsp::BitRead;

/// Profile-dependent extension data within a subset SPS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubsetSpsExtension {
    /// Profiles 83 and 86
    Svc,
    Mvc {
        ext: MvcSpsExtension,
        mvc_vui_parameters_present_flag: bool,
    },
    /// Profiles 135, 138 and 139
    Mvcd,
}

/// One view of `seq_parameter_set_mvc_extension()`, in view order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MvcView {
    pub view_id: u16,
    pub anchor_refs_l0: Vec<u16>,
    pub anchor_refs_l1: Vec<u16>,
    pub non_anchor_refs_l0: Vec<u16>,
    pub non_anchor_refs_l1: Vec<u16>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MvcApplicableOp {
    pub temporal_id: u8,
    pub target_view_ids: Vec<u16>,
    pub num_views_minus1: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MvcLevelValue {
    pub level_idc: u8,
    pub applicable_ops: Vec<MvcApplicableOp>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MvcSpsExtension {
    pub views: Vec<MvcView>,
    pub level_values: Vec<MvcLevelValue>,
}
impl MvcSpsExtension {
    fn read<R: BitRead>(r: &mut R) -> Result<MvcSpsExtension, SpsError> {
        let num_views = bounded(r, "num_views_minus1", 1023)? as usize + 1;
        let mut views = Vec::with_capacity(num_views);
        for _ in 0..num_views {
            views.push(MvcView {
                view_id: bounded(r, "view_id", 1023)?,
                ..MvcView::default()
            });
        }
        // the base view has no inter-view references
        for view in views.iter_mut().skip(1) {
            view.anchor_refs_l0 = read_refs(r, "num_anchor_refs_l0")?;
            view.anchor_refs_l1 = read_refs(r, "num_anchor_refs_l1")?;
        }
        for view in views.iter_mut().skip(1) {
            view.non_anchor_refs_l0 = read_refs(r, "num_non_anchor_refs_l0")?;
            view.non_anchor_refs_l1 = read_refs(r, "num_non_anchor_refs_l1")?;
        }
        let num_level_values = bounded(r, "num_level_values_signalled_minus1", 63)? as usize + 1;
        let mut level_values = Vec::with_capacity(num_level_values);
        for _ in 0..num_level_values {
            let level_idc = r.read(8, "level_idc")?;
            let num_ops = bounded(r, "num_applicable_ops_minus1", 1023)? as usize + 1;
            let mut applicable_ops = Vec::with_capacity(num_ops);
            for _ in 0..num_ops {
                let temporal_id = r.read(3, "applicable_op_temporal_id")?;
                let num_targets =
                    bounded(r, "applicable_op_num_target_views_minus1", 1023)? as usize + 1;
                let mut target_view_ids = Vec::with_capacity(num_targets);
                for _ in 0..num_targets {
                    target_view_ids.push(bounded(r, "applicable_op_target_view_id", 1023)?);
                }
                applicable_ops.push(MvcApplicableOp {
                    temporal_id,
                    target_view_ids,
                    num_views_minus1: bounded(r, "applicable_op_num_views_minus1", 1023)?,
                });
            }
            level_values.push(MvcLevelValue {
                level_idc,
                applicable_ops,
            });
        }
        Ok(MvcSpsExtension {
            views,
            level_values,
        })
    }
}

fn bounded<R: BitRead>(r: &mut R, name: &'static str, max: u32) -> Result<u16, SpsError> {
    let value = r.read_ue(name)?;
    if value > max {
        return Err(SpsError::FieldValueTooLarge { name, value });
    }
    Ok(value as u16)
}

/// A count (at most 15) followed by that many view ids.
fn read_refs<R: BitRead>(r: &mut R, count_name: &'static str) -> Result<Vec<u16>, SpsError> {
    let count = bounded(r, count_name, 15)?;
    (0..count).map(|_| bounded(r, "view_ref", 1023)).collect()
}

/// Parsed `subset_seq_parameter_set_rbsp()` (NAL unit type 15).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubsetSps {
    pub sps: SeqParameterSet,
    pub extension: Option<SubsetSpsExtension>,
}
impl SubsetSps {
    /// Parses the unit up to the end of the extension this crate understands. Whatever follows
    /// (VUI extensions, the SVC extension body) is left unread.
    pub fn read<R: BitRead>(r: &mut R, errs: &mut UnitErrors) -> Result<SubsetSps, SpsError> {
        let sps = SeqParameterSet::read(r, errs)?;
        let extension = match sps.profile_idc.0 {
            83 | 86 => Some(SubsetSpsExtension::Svc),
            118 | 128 | 134 => {
                r.read_bool("bit_equal_to_one")?;
                let ext = MvcSpsExtension::read(r)?;
                Some(SubsetSpsExtension::Mvc {
                    ext,
                    mvc_vui_parameters_present_flag: r
                        .read_bool("mvc_vui_parameters_present_flag")?,
                })
            }
            135 | 138 | 139 => Some(SubsetSpsExtension::Mvcd),
            _ => None,
        };
        Ok(SubsetSps { sps, extension })
    }

    /// Parses a whole unit, checking the trailing bits when nothing was left unread.
    pub fn from_bits<R: BitRead>(mut r: R) -> Result<SubsetSps, SpsError> {
        let mut errs = UnitErrors::empty();
        let subset = Self::read(&mut r, &mut errs)?;
        let fully_parsed = match &subset.extension {
            None => true,
            Some(SubsetSpsExtension::Mvc {
                mvc_vui_parameters_present_flag,
                ..
            }) => !mvc_vui_parameters_present_flag,
            Some(_) => false,
        };
        if fully_parsed {
            r.read_bool("additional_extension2_flag")?;
            // additional_extension2_data_flag values may follow; they carry nothing
        }
        Ok(subset)
    }

    pub fn mvc(&self) -> Option<&MvcSpsExtension> {
        match &self.extension {
            Some(SubsetSpsExtension::Mvc { ext, .. }) => Some(ext),
            _ => None,
        }
    }

    /// Position of `view_id` in view order, which is zero for the base view.
    pub fn view_index(&self, view_id: u16) -> Option<usize> {
        self.mvc()?.views.iter().position(|v| v.view_id == view_id)
    }

    pub fn num_views(&self) -> usize {
        self.mvc().map_or(1, |m| m.views.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rbsp::BitReader;
    use crate::testutil::{self, BitWriter, SpsParams};

    #[test]
    fn unknown_profile() {
        let mut w = BitWriter::new();
        testutil::sps_data(&mut w, &SpsParams::default());
        w.bit(false).trailing_bits(); // additional_extension2_flag
        let data = w.finish();
        let subset = SubsetSps::from_bits(BitReader::new(&data)).unwrap();
        assert_eq!(subset.sps.profile_idc.0, 66);
        assert!(subset.extension.is_none());
        assert_eq!(subset.num_views(), 1);
    }

    #[test]
    fn mvc_extension() {
        let data = testutil::subset_sps_rbsp(1);
        let subset = SubsetSps::from_bits(BitReader::new(&data)).unwrap();
        assert_eq!(subset.sps.id().id(), 1);
        let mvc = subset.mvc().unwrap();
        assert_eq!(mvc.views.len(), 2);
        assert_eq!(mvc.views[1].view_id, 2);
        assert_eq!(mvc.views[1].anchor_refs_l0, vec![0]);
        assert!(mvc.views[1].anchor_refs_l1.is_empty());
        assert_eq!(mvc.views[1].non_anchor_refs_l0, vec![0]);
        assert_eq!(mvc.level_values[0].level_idc, 40);
        assert_eq!(
            mvc.level_values[0].applicable_ops[0].target_view_ids,
            vec![0, 2]
        );
        assert_eq!(subset.view_index(2), Some(1));
        assert_eq!(subset.view_index(5), None);
    }

    #[test]
    fn too_many_refs() {
        let mut w = BitWriter::new();
        testutil::sps_data(
            &mut w,
            &SpsParams {
                profile_idc: 118,
                ..SpsParams::default()
            },
        );
        w.bit(true).ue(1).ue(0).ue(1).ue(16).trailing_bits();
        let data = w.finish();
        assert!(matches!(
            SubsetSps::from_bits(BitReader::new(&data)),
            Err(SpsError::FieldValueTooLarge {
                name: "num_anchor_refs_l0",
                value: 16
            })
        ));
    }
}
