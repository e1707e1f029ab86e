//! Detection of the first slice of a new primary coded picture (section 7.4.1.2.4).
//!
//! Consecutive slices are compared through an ordered cascade of tests; the first test that
//! reaches a decision wins, and later tests are not consulted.

use super::{FieldPic, PicOrderCountLsb, SliceHeader};
use crate::nal::pps::PicParamSetId;

/// The fields of a slice that take part in the comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousSlice {
    /// Index of the view in decoding order; zero for the base view.
    pub view_index: u8,
    pub nal_ref_idc: u8,
    pub idr: bool,
    pub frame_num: u16,
    pub pic_parameter_set_id: PicParamSetId,
    pub field_pic: FieldPic,
    pub pic_order_cnt: Option<PicOrderCountLsb>,
    pub idr_pic_id: Option<u32>,
    pub redundant_pic_cnt: u32,
    pub first_mb_in_slice: u32,
}
impl PreviousSlice {
    pub fn new(header: &SliceHeader, nal_ref_idc: u8, view_index: u8) -> PreviousSlice {
        PreviousSlice {
            view_index,
            nal_ref_idc,
            idr: header.is_idr(),
            frame_num: header.frame_num,
            pic_parameter_set_id: header.pic_parameter_set_id,
            field_pic: header.field_pic,
            pic_order_cnt: header.pic_order_cnt_lsb,
            idr_pic_id: header.idr_pic_id,
            redundant_pic_cnt: header.redundant_pic_cnt.unwrap_or(0),
            first_mb_in_slice: header.first_mb_in_slice,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    SamePicture,
    /// Another view component of the same access unit.
    NewView,
    NewPicture,
}

/// `(pic_order_cnt_lsb, delta_pic_order_cnt_bottom)` for POC type 0
fn lsb_fields(poc: Option<PicOrderCountLsb>) -> Option<(u32, i32)> {
    match poc? {
        PicOrderCountLsb::Frame(lsb) => Some((lsb, 0)),
        PicOrderCountLsb::FieldsAbsolute {
            pic_order_cnt_lsb,
            delta_pic_order_cnt_bottom,
        } => Some((pic_order_cnt_lsb, delta_pic_order_cnt_bottom)),
        PicOrderCountLsb::FieldsDelta(_) => None,
    }
}

fn delta_fields(poc: Option<PicOrderCountLsb>) -> Option<[i32; 2]> {
    match poc? {
        PicOrderCountLsb::FieldsDelta(d) => Some(d),
        _ => None,
    }
}

/// Classifies `cur` relative to the slice before it. `aud_seen` is true when an access unit
/// delimiter was found between the two.
pub fn boundary(prev: Option<&PreviousSlice>, cur: &PreviousSlice, aud_seen: bool) -> Boundary {
    let Some(prev) = prev else {
        return Boundary::NewPicture;
    };
    if prev.view_index != cur.view_index {
        return if cur.view_index > prev.view_index {
            Boundary::NewView
        } else {
            Boundary::NewPicture
        };
    }
    if aud_seen {
        return Boundary::NewPicture;
    }
    if cur.redundant_pic_cnt > 0 {
        return Boundary::SamePicture;
    }
    let new = prev.frame_num != cur.frame_num
        || prev.pic_parameter_set_id != cur.pic_parameter_set_id
        || prev.field_pic != cur.field_pic
        || (prev.nal_ref_idc == 0) != (cur.nal_ref_idc == 0)
        || match (lsb_fields(prev.pic_order_cnt), lsb_fields(cur.pic_order_cnt)) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        }
        || match (delta_fields(prev.pic_order_cnt), delta_fields(cur.pic_order_cnt)) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        }
        || prev.idr != cur.idr
        || (prev.idr && cur.idr && prev.idr_pic_id != cur.idr_pic_id);
    if new {
        Boundary::NewPicture
    } else {
        Boundary::SamePicture
    }
}

/// True when `cur` does not continue the macroblock order of the same picture.
pub fn is_discontinuous(prev: &PreviousSlice, cur: &PreviousSlice) -> bool {
    cur.first_mb_in_slice <= prev.first_mb_in_slice
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::nal::slice::Field;

    fn slice() -> PreviousSlice {
        PreviousSlice {
            view_index: 0,
            nal_ref_idc: 3,
            idr: false,
            frame_num: 4,
            pic_parameter_set_id: PicParamSetId::from_u32(0).unwrap(),
            field_pic: FieldPic::Frame,
            pic_order_cnt: Some(PicOrderCountLsb::Frame(8)),
            idr_pic_id: None,
            redundant_pic_cnt: 0,
            first_mb_in_slice: 0,
        }
    }

    #[test]
    fn first_slice() {
        assert_eq!(boundary(None, &slice(), false), Boundary::NewPicture);
    }

    #[test]
    fn same_picture_increasing_mb() {
        let a = slice();
        let b = PreviousSlice {
            first_mb_in_slice: 40,
            ..slice()
        };
        assert_eq!(boundary(Some(&a), &b, false), Boundary::SamePicture);
        assert!(!is_discontinuous(&a, &b));
    }

    #[test]
    fn same_picture_decreasing_mb() {
        let a = PreviousSlice {
            first_mb_in_slice: 40,
            ..slice()
        };
        let b = PreviousSlice {
            first_mb_in_slice: 10,
            ..slice()
        };
        assert_eq!(boundary(Some(&a), &b, false), Boundary::SamePicture);
        assert!(is_discontinuous(&a, &b));
    }

    #[test]
    fn frame_num_change() {
        let b = PreviousSlice {
            frame_num: 5,
            ..slice()
        };
        assert_eq!(boundary(Some(&slice()), &b, false), Boundary::NewPicture);
    }

    #[test]
    fn aud_forces_new_picture() {
        assert_eq!(boundary(Some(&slice()), &slice(), true), Boundary::NewPicture);
    }

    #[test]
    fn redundant_slice_is_same_picture() {
        let b = PreviousSlice {
            frame_num: 9,
            redundant_pic_cnt: 1,
            ..slice()
        };
        assert_eq!(boundary(Some(&slice()), &b, false), Boundary::SamePicture);
    }

    #[test]
    fn view_switch() {
        let a = slice();
        let b = PreviousSlice {
            view_index: 1,
            ..slice()
        };
        assert_eq!(boundary(Some(&a), &b, false), Boundary::NewView);
        assert_eq!(boundary(Some(&b), &a, false), Boundary::NewPicture);
    }

    #[test]
    fn field_and_poc_changes() {
        let top = PreviousSlice {
            field_pic: FieldPic::Field(Field::Top),
            ..slice()
        };
        let bottom = PreviousSlice {
            field_pic: FieldPic::Field(Field::Bottom),
            ..slice()
        };
        assert_eq!(boundary(Some(&top), &bottom, false), Boundary::NewPicture);

        let lsb = PreviousSlice {
            pic_order_cnt: Some(PicOrderCountLsb::Frame(10)),
            ..slice()
        };
        assert_eq!(boundary(Some(&slice()), &lsb, false), Boundary::NewPicture);

        let a = PreviousSlice {
            pic_order_cnt: Some(PicOrderCountLsb::FieldsDelta([1, 0])),
            ..slice()
        };
        let b = PreviousSlice {
            pic_order_cnt: Some(PicOrderCountLsb::FieldsDelta([1, 2])),
            ..slice()
        };
        assert_eq!(boundary(Some(&a), &b, false), Boundary::NewPicture);
    }

    #[test]
    fn nal_ref_idc_transition() {
        let b = PreviousSlice {
            nal_ref_idc: 1,
            ..slice()
        };
        assert_eq!(boundary(Some(&slice()), &b, false), Boundary::SamePicture);
        let c = PreviousSlice {
            nal_ref_idc: 0,
            ..slice()
        };
        assert_eq!(boundary(Some(&slice()), &c, false), Boundary::NewPicture);
    }

    #[test]
    fn idr_pic_id_change() {
        let a = PreviousSlice {
            idr: true,
            idr_pic_id: Some(0),
            frame_num: 0,
            ..slice()
        };
        let b = PreviousSlice {
            idr_pic_id: Some(1),
            ..a.clone()
        };
        assert_eq!(boundary(Some(&a), &b, false), Boundary::NewPicture);
        let non_idr = PreviousSlice {
            idr: false,
            idr_pic_id: None,
            ..a.clone()
        };
        assert_eq!(boundary(Some(&a), &non_idr, false), Boundary::NewPicture);
    }
}
