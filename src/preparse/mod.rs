//! The pre-parse engine: finds picture and sequence boundaries in submitted buffers and
//! describes each call's data as segment lists, ready to be handed to a decoder.
//!
//! ```no_run
//! use bytes::Bytes;
//! use h264_preparser::preparse::*;
//!
//! let mut parser = PreParser::new(StreamConfig::default()).unwrap();
//! let data = Bytes::from_static(&[0, 0, 1, 0x65, 0x88, 0x84]);
//! parser
//!     .submit_buffer(InputBuffer::new(1, 1, data, ElementKind::PictureData))
//!     .unwrap();
//! let parsed = parser.preparse().unwrap();
//! if let Some(event) = parsed.picture.as_ref().and_then(|p| p.decoded_event()) {
//!     // once the decoder is done with the picture
//!     parser.decoded_events().picture_decoded(event);
//! }
//! parser.recycle(parsed);
//! ```

mod h264;
pub mod picture;
pub mod pool;
pub mod segment;

pub use picture::{PictureInfo, PreParsedData, ViewPicture, ViewSegments};
pub use segment::{Segment, SegmentFlags, MAX_SEGMENTS_PER_PICTURE, SEGMENT_LIST_BUCKETS};

use crate::nal::pps::{PicParamSetId, PicParameterSet};
use crate::nal::sps::{ProfileIdc, SeqParamSetId, SeqParameterSet};
use crate::nal::subset_sps::SubsetSps;
use crate::nal::{ParamSets, UnitErrors};
use crate::rbsp::ReadFault;
use crate::stream_reader::StreamReader;
use bytes::Bytes;
use log::*;
use parking_lot::Mutex;
use pool::ParamSetPool;
use segment::Timeline;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Distinct values of `seq_parameter_set_id`.
pub const MAX_SPS_ID_SLOTS: usize = 32;
/// Distinct values of `pic_parameter_set_id`.
pub const MAX_PPS_ID_SLOTS: usize = 256;

/// How units are framed in the submitted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitstreamFormat {
    /// Start-code delimited.
    #[default]
    AnnexB,
    /// Length-prefixed units, with an `AVCDecoderConfigurationRecord` as codec config.
    Avcc,
    /// Every call holds exactly one element and nothing is parsed.
    NoDelimiter,
}

/// What the caller says a buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElementKind {
    CodecConfig,
    PictureData,
    #[default]
    Unspecified,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Prefixes log messages, to tell streams apart.
    pub name: String,
    pub format: BitstreamFormat,
    /// Keep parsing after the first picture has been found, to detect further pictures and
    /// slice ordering problems in the same call.
    pub full_scan: bool,
    /// Treat slice extension units as MVC secondary views.
    pub mvc: bool,
    pub max_views: usize,
    /// Capacity of each of the SPS and subset SPS pools.
    pub sequence_pool_entries: usize,
    pub pps_pool_entries: usize,
    /// Sequence parameter sets with any other profile are reported unsupported and not stored.
    pub supported_profiles: Vec<ProfileIdc>,
}
impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            name: "h264".to_string(),
            format: BitstreamFormat::AnnexB,
            full_scan: false,
            mvc: false,
            max_views: 2,
            sequence_pool_entries: 16,
            pps_pool_entries: 64,
            supported_profiles: vec![
                ProfileIdc::BASELINE,
                ProfileIdc::MAIN,
                ProfileIdc::EXTENDED,
                ProfileIdc::HIGH,
                ProfileIdc::HIGH10,
                ProfileIdc::HIGH422,
                ProfileIdc::HIGH444,
                ProfileIdc::CAVLC444,
                ProfileIdc::MULTIVIEW_HIGH,
                ProfileIdc::STEREO_HIGH,
            ],
        }
    }
}

/// One caller buffer. `data` is trimmed to `declared_size` on submission.
#[derive(Debug, Clone)]
pub struct InputBuffer {
    /// Reported back through [`PreParser::released_buffers()`].
    pub id: u64,
    /// Copied into every [`Segment`] cut from this buffer.
    pub map_id: u32,
    pub data: Bytes,
    pub declared_size: usize,
    pub kind: ElementKind,
    pub presentation_tag: Option<u64>,
}
impl InputBuffer {
    pub fn new(id: u64, map_id: u32, data: Bytes, kind: ElementKind) -> InputBuffer {
        InputBuffer {
            id,
            map_id,
            declared_size: data.len(),
            data,
            kind,
            presentation_tag: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreParseError {
    InvalidParameters(&'static str),
    OutOfMemory,
    ResourceExhausted,
    UnsupportedFeature,
    Unrecoverable,
    InsufficientData,
    AccessBeyondEndOfData,
    AccessIntoDelimiter,
    StructuralInconsistency,
}
impl PreParseError {
    /// The most serious problem among `errs`, for reporting. Clamped fields and similar
    /// recoverable findings map to nothing.
    pub fn for_unit(errs: UnitErrors) -> Option<PreParseError> {
        if errs.contains(UnitErrors::VIEW_LIMIT) {
            Some(PreParseError::ResourceExhausted)
        } else if errs.intersects(UnitErrors::READER_EXCEPTION | UnitErrors::MALFORMED) {
            Some(PreParseError::Unrecoverable)
        } else if errs.contains(UnitErrors::MISSING_REFERENCE) {
            Some(PreParseError::StructuralInconsistency)
        } else if errs.contains(UnitErrors::UNSUPPORTED) {
            Some(PreParseError::UnsupportedFeature)
        } else {
            None
        }
    }
}
impl From<ReadFault> for PreParseError {
    fn from(f: ReadFault) -> Self {
        match f {
            ReadFault::InsufficientData => PreParseError::InsufficientData,
            ReadFault::AccessBeyondEndOfData => PreParseError::AccessBeyondEndOfData,
            ReadFault::AccessIntoDelimiter => PreParseError::AccessIntoDelimiter,
        }
    }
}
impl fmt::Display for PreParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreParseError::InvalidParameters(what) => write!(f, "invalid parameters: {}", what),
            PreParseError::OutOfMemory => f.write_str("out of memory"),
            PreParseError::ResourceExhausted => f.write_str("resources exhausted"),
            PreParseError::UnsupportedFeature => f.write_str("unsupported feature"),
            PreParseError::Unrecoverable => f.write_str("unrecoverable bitstream error"),
            PreParseError::InsufficientData => f.write_str("insufficient data"),
            PreParseError::AccessBeyondEndOfData => f.write_str("read beyond the end of data"),
            PreParseError::AccessIntoDelimiter => f.write_str("read into the next delimiter"),
            PreParseError::StructuralInconsistency => f.write_str("structural inconsistency"),
        }
    }
}
impl std::error::Error for PreParseError {}

/// Sent by the decoder side once a picture's parameter sets are no longer needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PictureDecoded {
    /// Absent when the picture took no SPS reference.
    pub sequence_id: Option<u8>,
    pub pps_id: u8,
    pub second_pps_id: Option<u8>,
}

/// A handle the decoder side can keep, possibly on another thread. Events are applied at the
/// start of the next [`PreParser::preparse()`] call.
#[derive(Debug, Clone)]
pub struct DecodedEventSender {
    queue: Arc<Mutex<VecDeque<PictureDecoded>>>,
}
impl DecodedEventSender {
    pub fn picture_decoded(&self, event: PictureDecoded) {
        self.queue.lock().push_back(event);
    }
}

/// The parameter set pools of one stream. Lookups by id see the newest instance.
#[derive(Debug)]
pub(crate) struct Pools {
    pub sps: ParamSetPool<SeqParameterSet>,
    pub subset: ParamSetPool<SubsetSps>,
    pub pps: ParamSetPool<PicParameterSet>,
}
impl ParamSets for Pools {
    fn sps_by_id(&self, id: SeqParamSetId) -> Option<&SeqParameterSet> {
        self.sps.latest(usize::from(id.id())).map(|(_, v)| v)
    }

    fn subset_sps_by_id(&self, id: SeqParamSetId) -> Option<&SubsetSps> {
        self.subset.latest(usize::from(id.id())).map(|(_, v)| v)
    }

    fn pps_by_id(&self, id: PicParamSetId) -> Option<&PicParameterSet> {
        self.pps.latest(usize::from(id.id())).map(|(_, v)| v)
    }
}

/// Pre-parser for one elementary stream.
pub struct PreParser {
    config: StreamConfig,
    reader: StreamReader,
    pending: Vec<InputBuffer>,
    pools: Pools,
    events: Arc<Mutex<VecDeque<PictureDecoded>>>,
    state: h264::H264State,
    timeline: Timeline,
    spare_segments: Vec<Vec<Segment>>,
    released: Vec<u64>,
}
impl PreParser {
    pub fn new(config: StreamConfig) -> Result<PreParser, PreParseError> {
        if config.sequence_pool_entries == 0 || config.pps_pool_entries == 0 {
            return Err(PreParseError::InvalidParameters("pool sizes must be non-zero"));
        }
        if config.max_views == 0 {
            return Err(PreParseError::InvalidParameters("max_views must be non-zero"));
        }
        debug!(
            "{}: created for {:?}, mvc={} full_scan={}",
            config.name, config.format, config.mvc, config.full_scan
        );
        Ok(PreParser {
            pools: Pools {
                sps: ParamSetPool::new(config.sequence_pool_entries, MAX_SPS_ID_SLOTS),
                subset: ParamSetPool::new(config.sequence_pool_entries, MAX_SPS_ID_SLOTS),
                pps: ParamSetPool::new(config.pps_pool_entries, MAX_PPS_ID_SLOTS),
            },
            config,
            reader: StreamReader::default(),
            pending: Vec::new(),
            events: Arc::default(),
            state: h264::H264State::default(),
            timeline: Timeline::default(),
            spare_segments: Vec::new(),
            released: Vec::new(),
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Adds a buffer to the chain for the next [`preparse()`](Self::preparse) call.
    pub fn submit_buffer(&mut self, mut buffer: InputBuffer) -> Result<(), PreParseError> {
        if buffer.declared_size > buffer.data.len() {
            return Err(PreParseError::InvalidParameters(
                "declared size exceeds the buffer data",
            ));
        }
        if let Some(first) = self.pending.first() {
            if first.kind != buffer.kind {
                return Err(PreParseError::InvalidParameters(
                    "codec config and picture data in the same call",
                ));
            }
        }
        self.pending
            .try_reserve(1)
            .map_err(|_| PreParseError::OutOfMemory)?;
        buffer.data.truncate(buffer.declared_size);
        self.pending.push(buffer);
        Ok(())
    }

    pub fn decoded_events(&self) -> DecodedEventSender {
        DecodedEventSender {
            queue: self.events.clone(),
        }
    }

    /// Parses the submitted chain.
    pub fn preparse(&mut self) -> Result<PreParsedData, PreParseError> {
        if self.pending.is_empty() {
            return Err(PreParseError::InvalidParameters("no buffers submitted"));
        }
        self.apply_decoded_events();
        let buffers = std::mem::take(&mut self.pending);
        let mut engine = h264::Engine {
            config: &self.config,
            reader: &mut self.reader,
            pools: &mut self.pools,
            state: &mut self.state,
            timeline: &mut self.timeline,
        };
        let (data, released) = engine.run(&buffers, &mut self.spare_segments);
        self.released.extend(released);
        Ok(data)
    }

    fn apply_decoded_events(&mut self) {
        let events: Vec<PictureDecoded> = self.events.lock().drain(..).collect();
        for ev in events {
            trace!("{}: picture decoded {:?}", self.config.name, ev);
            if let Some(id) = ev.sequence_id {
                if !self.pools.sps.release_oldest(usize::from(id)) {
                    warn!(
                        "{}: decoded event for SPS {} which holds no references",
                        self.config.name, id
                    );
                }
            }
            for pps in std::iter::once(ev.pps_id).chain(ev.second_pps_id) {
                if !self.pools.pps.release_oldest(usize::from(pps)) {
                    warn!(
                        "{}: decoded event for PPS {} which holds no references",
                        self.config.name, pps
                    );
                }
            }
        }
    }

    /// The newest SPS with the given id.
    pub fn sequence_header(&self, id: u8) -> Option<&SeqParameterSet> {
        self.pools.sps.latest(usize::from(id)).map(|(_, v)| v)
    }

    pub fn subset_sequence_header(&self, id: u8) -> Option<&SubsetSps> {
        self.pools.subset.latest(usize::from(id)).map(|(_, v)| v)
    }

    pub fn pps(&self, id: u8) -> Option<&PicParameterSet> {
        self.pools.pps.latest(usize::from(id)).map(|(_, v)| v)
    }

    /// Returns the segment lists of a finished call for reuse.
    pub fn recycle(&mut self, data: PreParsedData) {
        for view in data.views {
            for mut list in [view.pre_picture_segments, view.picture_segments] {
                list.clear();
                self.spare_segments.push(list);
            }
        }
    }

    /// Ids of the buffers the pre-parser no longer holds, since the last call to this method.
    pub fn released_buffers(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.released)
    }
}
