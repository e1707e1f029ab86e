//! Byte-range segments and the cut timeline they are built from.
//!
//! While units are parsed the engine records cut points: from each cut onwards, bytes go to
//! the given list with the given flags, until the next cut. Once the call is over the timeline
//! is laid over the call's buffers, so every byte lands in exactly one segment and no segment
//! crosses a buffer boundary.

use crate::stream_reader::StreamPosition;
use bitflags::bitflags;
use log::*;

/// Upper bound on the segments of one list.
pub const MAX_SEGMENTS_PER_PICTURE: usize = 128;

/// Segment lists per view.
pub const SEGMENT_LIST_BUCKETS: usize = 5;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct SegmentFlags: u8 {
        /// The segment runs to the end of its buffer.
        const LAST_IN_BUFFER = 1 << 0;
        /// A start code must be written ahead of the segment, which holds a unit whose
        /// length prefix was stripped.
        const INSERT_START_CODE = 1 << 1;
        /// The segment is not to be passed to the decoder.
        const SKIP = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub buffer_map_id: u32,
    pub byte_offset: usize,
    pub byte_size: usize,
    pub flags: SegmentFlags,
}

/// The progression of lists a view's units are filed into. Each change between picture and
/// non-picture data moves to the next one; the last absorbs anything further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    PrePicture0,
    Picture0,
    PrePicture1,
    Picture1,
    Overflow,
}
impl Bucket {
    pub fn index(self) -> usize {
        self as usize
    }

    /// The bucket after this one, or `None` from `Overflow`.
    pub fn next(self) -> Option<Bucket> {
        match self {
            Bucket::PrePicture0 => Some(Bucket::Picture0),
            Bucket::Picture0 => Some(Bucket::PrePicture1),
            Bucket::PrePicture1 => Some(Bucket::Picture1),
            Bucket::Picture1 => Some(Bucket::Overflow),
            Bucket::Overflow => None,
        }
    }

    pub fn first_for(picture_data: bool) -> Bucket {
        if picture_data {
            Bucket::Picture0
        } else {
            Bucket::PrePicture0
        }
    }
}

/// Where the bytes following a cut go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    List { view: usize, bucket: Bucket },
    /// Held back for the following call.
    Carry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cut {
    pub pos: StreamPosition,
    pub target: Target,
    pub flags: SegmentFlags,
}

/// The identity and length of one buffer of the call.
#[derive(Debug, Clone, Copy)]
pub struct BufferExtent {
    pub map_id: u32,
    pub len: usize,
}

/// Segments per view and bucket, plus any carried over to the next call.
#[derive(Debug, Default)]
pub struct BuiltSegments {
    pub views: Vec<[Vec<Segment>; SEGMENT_LIST_BUCKETS]>,
    pub carry: Vec<Segment>,
    /// A list reached [`MAX_SEGMENTS_PER_PICTURE`].
    pub overflowed: bool,
}

#[derive(Debug, Default)]
pub struct Timeline {
    cuts: Vec<Cut>,
}
impl Timeline {
    pub fn clear(&mut self) {
        self.cuts.clear();
    }

    pub fn cuts(&self) -> &[Cut] {
        &self.cuts
    }

    /// The target of the most recent cut.
    pub fn current(&self) -> Option<Target> {
        self.cuts.last().map(|c| c.target)
    }

    /// Records a cut. Cuts must be pushed in stream order; a cut at the same position as the
    /// previous one replaces it.
    pub fn push(&mut self, cut: Cut) {
        if let Some(last) = self.cuts.last_mut() {
            debug_assert!(last.pos <= cut.pos, "cut {:?} before {:?}", cut.pos, last.pos);
            if last.pos == cut.pos {
                *last = cut;
                return;
            }
        }
        self.cuts.push(cut);
    }

    /// Sends everything from `index` onwards to `target`, keeping the flags.
    pub fn retarget_from(&mut self, index: usize, target: Target) {
        for c in self.cuts.iter_mut().skip(index) {
            c.target = target;
        }
    }

    /// Index of the first cut at or after `pos`.
    pub fn index_at(&self, pos: StreamPosition) -> usize {
        self.cuts.partition_point(|c| c.pos < pos)
    }

    /// Lays the cuts over `buffers`. Bytes before the first cut go to the first cut's target.
    pub fn build(&self, buffers: &[BufferExtent], views: usize) -> BuiltSegments {
        let mut out = BuiltSegments {
            views: (0..views).map(|_| Default::default()).collect(),
            ..Default::default()
        };
        if self.cuts.is_empty() {
            return out;
        }
        let end = StreamPosition {
            buffer: buffers.len(),
            offset: 0,
        };
        for (i, cut) in self.cuts.iter().enumerate() {
            let start = if i == 0 {
                StreamPosition::default()
            } else {
                cut.pos
            };
            let stop = self.cuts.get(i + 1).map_or(end, |c| c.pos);
            for buffer in start.buffer..=stop.buffer.min(buffers.len().saturating_sub(1)) {
                let extent = buffers[buffer];
                let from = if buffer == start.buffer {
                    start.offset.min(extent.len)
                } else {
                    0
                };
                let to = if buffer == stop.buffer {
                    stop.offset.min(extent.len)
                } else {
                    extent.len
                };
                if to <= from {
                    continue;
                }
                let mut flags = cut.flags;
                if to == extent.len {
                    flags |= SegmentFlags::LAST_IN_BUFFER;
                }
                let seg = Segment {
                    buffer_map_id: extent.map_id,
                    byte_offset: from,
                    byte_size: to - from,
                    flags,
                };
                let list = match cut.target {
                    Target::List { view, bucket } => match out.views.get_mut(view) {
                        Some(v) => &mut v[bucket.index()],
                        None => continue,
                    },
                    Target::Carry => &mut out.carry,
                };
                if append(list, seg) {
                    out.overflowed = true;
                }
            }
        }
        out
    }
}

/// Adds `seg`, merging it into the previous segment when contiguous. Returns true if the list
/// was already full.
fn append(list: &mut Vec<Segment>, seg: Segment) -> bool {
    if let Some(last) = list.last_mut() {
        let contiguous = last.buffer_map_id == seg.buffer_map_id
            && last.byte_offset + last.byte_size == seg.byte_offset
            && last.flags - SegmentFlags::LAST_IN_BUFFER == seg.flags - SegmentFlags::LAST_IN_BUFFER;
        if contiguous {
            last.byte_size += seg.byte_size;
            last.flags = seg.flags;
            return false;
        }
    }
    let full = list.len() >= MAX_SEGMENTS_PER_PICTURE;
    if full {
        warn!(
            "segment list holds {} segments, at the limit of {}",
            list.len(),
            MAX_SEGMENTS_PER_PICTURE
        );
    }
    list.push(seg);
    full
}
