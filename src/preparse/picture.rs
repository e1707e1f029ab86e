//! What a pre-parse call reports, and the per-call picture state it is assembled from.

use super::pool::Handle;
use super::segment::{BuiltSegments, Bucket, Segment, SegmentFlags};
use super::{PictureDecoded, PreParseError};
use crate::nal::aud::PrimaryPicType;
use crate::nal::pps::PicParamSetId;
use crate::nal::slice::SliceHeader;
use crate::nal::sps::{SeqParamSetId, SeqParameterSet};
use crate::nal::subset_sps::SubsetSps;
use crate::nal::UnitErrors;

/// The segments of one view, in stream order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ViewSegments {
    /// Data ahead of the view's first slice.
    pub pre_picture_segments: Vec<Segment>,
    /// The view's slices and anything following them.
    pub picture_segments: Vec<Segment>,
}

/// The first slice of one view component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewPicture {
    pub view_id: u16,
    pub nal_ref_idc: u8,
    pub anchor_pic_flag: bool,
    pub sps_id: SeqParamSetId,
    pub pps_id: PicParamSetId,
    pub header: SliceHeader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureInfo {
    /// Base view first.
    pub views: Vec<ViewPicture>,
    pub idr: bool,
    pub primary_pic_type: Option<PrimaryPicType>,
    /// Cropped picture size, when the SPS gives a consistent one.
    pub dimensions: Option<(u32, u32)>,
    /// A slice did not follow on in macroblock order from the slice before it.
    pub discontinuous_mbs: bool,
    /// The slice group map puts some slice group in more than one run.
    pub discontiguous_slice_groups: bool,
    /// Data the decoder cannot handle, such as partitioned slices, was found with the picture.
    pub unsupported: bool,
    /// Slices of a following picture were found in the same call.
    pub multiple_pictures: bool,
    /// The SPS the picture holds a reference on. `None` when no view was parsed with a plain
    /// SPS, as when a call opens on a non-base view.
    pub held_sps_id: Option<SeqParamSetId>,
    /// The SPS named by the most recent buffering period SEI.
    pub sei_sps_id: Option<SeqParamSetId>,
    pub presentation_tag: Option<u64>,
    pub errors: UnitErrors,
}
impl PictureInfo {
    pub fn sps_id(&self) -> Option<SeqParamSetId> {
        self.views.first().map(|v| v.sps_id)
    }

    pub fn pps_id(&self) -> Option<PicParamSetId> {
        self.views.first().map(|v| v.pps_id)
    }

    pub fn second_pps_id(&self) -> Option<PicParamSetId> {
        self.views.get(1).map(|v| v.pps_id)
    }

    /// The notification to send once the decoder has finished with this picture.
    pub fn decoded_event(&self) -> Option<PictureDecoded> {
        Some(PictureDecoded {
            sequence_id: self.held_sps_id.map(|id| id.id()),
            pps_id: self.pps_id()?.id(),
            second_pps_id: self.second_pps_id().map(|id| id.id()),
        })
    }
}

/// The result of one pre-parse call.
#[derive(Debug, Default, Clone)]
pub struct PreParsedData {
    /// The picture uses a different SPS from the previous picture.
    pub new_sequence: bool,
    /// The secondary view uses a different subset SPS from the previous picture.
    pub new_sub_sequence: bool,
    /// The first slice of the call starts a new primary coded picture.
    pub new_picture: bool,
    pub closed_gop: bool,
    /// The call ended early because a pool or view limit was reached.
    pub resource_exhausted: bool,
    pub sequence_header: Option<SeqParameterSet>,
    pub sub_sequence_header: Option<SubsetSps>,
    pub picture: Option<PictureInfo>,
    /// Indexed by view order.
    pub views: Vec<ViewSegments>,
    /// Union of the problems found in every unit of the call.
    pub errors: UnitErrors,
    /// Why the unit loop stopped before the end of the data, if it did.
    pub early_stop: Option<PreParseError>,
}
impl PreParsedData {
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.views
            .iter()
            .flat_map(|v| v.pre_picture_segments.iter().chain(v.picture_segments.iter()))
    }

    pub fn total_bytes(&self) -> usize {
        self.segments().map(|s| s.byte_size).sum()
    }
}

/// The pooled sequence parameter set a view was parsed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SequenceRef {
    Sps(Handle),
    Subset(Handle),
}

/// Per-view state of the picture being assembled.
#[derive(Debug)]
pub(super) struct ViewState {
    pub picture: ViewPicture,
    pub pps: Handle,
    pub sequence: SequenceRef,
}

/// Everything learned about the call's picture while its units are parsed.
#[derive(Debug, Default)]
pub(super) struct PictureContext {
    pub views: Vec<ViewState>,
    /// A first slice was found, whether or not it could be read.
    pub started: bool,
    pub new_picture: bool,
    pub idr: bool,
    pub invalid: bool,
    pub unsupported: bool,
    pub multiple_pictures: bool,
    pub discontinuous_mbs: bool,
    pub discontiguous_slice_groups: bool,
    pub dimensions: Option<(u32, u32)>,
    pub primary_pic_type: Option<PrimaryPicType>,
    pub errors: UnitErrors,
}
impl PictureContext {
    /// The first view parsed with a plain SPS.
    pub fn sps_view(&self) -> Option<(&ViewState, Handle)> {
        self.views.iter().find_map(|v| match v.sequence {
            SequenceRef::Sps(h) => Some((v, h)),
            SequenceRef::Subset(_) => None,
        })
    }

    pub fn info(
        &self,
        sei_sps_id: Option<SeqParamSetId>,
        presentation_tag: Option<u64>,
    ) -> PictureInfo {
        PictureInfo {
            views: self.views.iter().map(|v| v.picture.clone()).collect(),
            idr: self.idr,
            primary_pic_type: self.primary_pic_type,
            dimensions: self.dimensions,
            discontinuous_mbs: self.discontinuous_mbs,
            discontiguous_slice_groups: self.discontiguous_slice_groups,
            unsupported: self.unsupported,
            multiple_pictures: self.multiple_pictures,
            held_sps_id: self.sps_view().map(|(v, _)| v.picture.sps_id),
            sei_sps_id,
            presentation_tag,
            errors: self.errors,
        }
    }
}

/// Flattens the buckets of each view into its two lists, reusing `spare` vectors.
///
/// `carried` segments go ahead of the base view's pre-picture segments.
pub(super) fn view_segments(
    built: BuiltSegments,
    carried: Vec<Segment>,
    skip_picture: bool,
    spare: &mut Vec<Vec<Segment>>,
) -> Vec<ViewSegments> {
    let mut out = Vec::with_capacity(built.views.len());
    let mut carried = Some(carried);
    for buckets in built.views {
        let mut pre = spare.pop().unwrap_or_default();
        let mut pic = spare.pop().unwrap_or_default();
        if let Some(c) = carried.take() {
            pre.extend(c);
        }
        let [pre0, pic0, pre1, pic1, overflow] = buckets;
        pre.extend(pre0);
        for list in [pic0, pre1, pic1, overflow] {
            pic.extend(list);
        }
        if skip_picture {
            for s in pic.iter_mut() {
                s.flags |= SegmentFlags::SKIP;
            }
        }
        out.push(ViewSegments {
            pre_picture_segments: pre,
            picture_segments: pic,
        });
    }
    if let Some(c) = carried {
        if !c.is_empty() {
            out.push(ViewSegments {
                pre_picture_segments: c,
                picture_segments: Vec::new(),
            });
        }
    }
    debug_assert_eq!(Bucket::Overflow.index() + 1, super::SEGMENT_LIST_BUCKETS);
    out
}
