//! The H264 unit loop: walks the units of one call, parses what the pre-parser needs from each,
//! and records where its bytes go.

use super::picture::{self, PictureContext, SequenceRef, ViewPicture, ViewState};
use super::pool::Handle;
use super::segment::{BufferExtent, Bucket, Cut, Segment, SegmentFlags, Target, Timeline};
use super::{
    BitstreamFormat, ElementKind, InputBuffer, Pools, PreParseError, PreParsedData, StreamConfig,
};
use crate::annexb::START_CODE_PREFIX;
use crate::avcc::{AvccError, ConfigStep, ConfigWalker};
use crate::nal::aud::{AccessUnitDelimiter, AudError};
use crate::nal::fmo;
use crate::nal::pps::{PicParameterSet, PpsError};
use crate::nal::prefix::PrefixNalUnit;
use crate::nal::scaling::ScalingMatrixError;
use crate::nal::sei::read_sei;
use crate::nal::slice::new_picture::{self, Boundary, PreviousSlice};
use crate::nal::slice::SliceHeader;
use crate::nal::sps::{SeqParamSetId, SeqParameterSet, SpsError};
use crate::nal::subset_sps::SubsetSps;
use crate::nal::{MvcHeader, NalHeader, NalHeaderExtension, UnitClass, UnitErrors, UnitType};
use crate::rbsp::{BitRead, BitReaderError};
use crate::stream_reader::{Delimiter, EmulationPrevention, Seek, StreamPosition, StreamReader};
use log::*;

/// Length field width assumed for length-prefixed data when no decoder configuration was seen.
const DEFAULT_LENGTH_BITS: u32 = 32;

/// What persists from one call to the next.
#[derive(Debug, Default)]
pub(super) struct H264State {
    active_sps: Option<Handle>,
    active_subset: Option<Handle>,
    /// From the most recent buffering period SEI.
    sei_active_sps: Option<SeqParamSetId>,
    length_bits: Option<u32>,
    last_slice: Option<PreviousSlice>,
    /// Id of the most recently stored subset SPS, giving the number of views to expect.
    last_subset_id: Option<usize>,
    carried: Vec<Segment>,
    carried_buffers: Vec<u64>,
    carried_prefix: Option<MvcHeader>,
}

#[derive(Debug, Clone, Copy)]
struct Filing {
    bucket: Bucket,
    picture_data: bool,
}

#[derive(Debug, Clone, Copy)]
struct UnitAt {
    delim: StreamPosition,
    payload: StreamPosition,
    size_delimited: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// State of a single call.
#[derive(Debug, Default)]
struct CallState {
    view: usize,
    /// Bucket in use by each view.
    filing: Vec<Option<Filing>>,
    /// First cut of the non-picture units following the current view's latest picture data.
    non_picture_run: Option<usize>,
    picture: PictureContext,
    prev: Option<PreviousSlice>,
    aud_seen: bool,
    /// MVC header of a prefix unit not yet matched with its base view slice.
    prefix: Option<MvcHeader>,
    /// Set while the most recent unit is a prefix unit.
    last_prefix_at: Option<StreamPosition>,
    expected_views: usize,
    errors: UnitErrors,
    resource_exhausted: bool,
    early_stop: Option<PreParseError>,
}

pub(super) struct Engine<'a> {
    pub config: &'a StreamConfig,
    pub reader: &'a mut StreamReader,
    pub pools: &'a mut Pools,
    pub state: &'a mut H264State,
    pub timeline: &'a mut Timeline,
}
impl Engine<'_> {
    /// Parses one call's chain, returning the result and the ids of buffers no longer held.
    pub fn run(
        &mut self,
        buffers: &[InputBuffer],
        spare: &mut Vec<Vec<Segment>>,
    ) -> (PreParsedData, Vec<u64>) {
        let kind = buffers.first().map_or(ElementKind::Unspecified, |b| b.kind);
        self.timeline.clear();
        let mut call = CallState {
            prev: self.state.last_slice.take(),
            prefix: self.state.carried_prefix.take(),
            expected_views: 1,
            ..Default::default()
        };
        let delimiter = match self.config.format {
            BitstreamFormat::AnnexB => Delimiter::StartCode(START_CODE_PREFIX),
            BitstreamFormat::Avcc if kind != ElementKind::CodecConfig => Delimiter::Size {
                length_bits: self.length_bits(),
            },
            _ => Delimiter::None,
        };
        self.reader.start(
            delimiter,
            buffers.iter().map(|b| b.data.clone()).collect(),
            EmulationPrevention::ZeroZeroThree,
        );
        trace!(
            "{}: {} buffers, {} bytes, {:?}",
            self.config.name,
            buffers.len(),
            self.reader.total_size(),
            kind
        );
        match self.config.format {
            BitstreamFormat::NoDelimiter => self.whole_element(&mut call, kind),
            BitstreamFormat::Avcc if kind == ElementKind::CodecConfig => {
                self.codec_config(&mut call)
            }
            BitstreamFormat::Avcc => self.units(&mut call, true),
            BitstreamFormat::AnnexB => self.units(&mut call, false),
        }
        self.finish(call, buffers, spare)
    }

    fn length_bits(&mut self) -> u32 {
        let name = &self.config.name;
        *self.state.length_bits.get_or_insert_with(|| {
            warn!(
                "{}: no decoder configuration seen, assuming {}-bit unit lengths",
                name, DEFAULT_LENGTH_BITS
            );
            DEFAULT_LENGTH_BITS
        })
    }

    fn units(&mut self, call: &mut CallState, size_delimited: bool) {
        while self.reader.seek_delimiter_or_end() == Seek::Delimiter {
            if self.next_unit(call, size_delimited) == Flow::Stop {
                break;
            }
        }
    }

    /// The data is one opaque element; nothing is parsed.
    fn whole_element(&mut self, call: &mut CallState, kind: ElementKind) {
        let picture_data = kind == ElementKind::PictureData;
        self.file(call, StreamPosition::default(), 0, picture_data, SegmentFlags::empty());
        call.picture.new_picture = picture_data;
    }

    fn codec_config(&mut self, call: &mut CallState) {
        self.file(call, StreamPosition::default(), 0, false, SegmentFlags::SKIP);
        let mut walker = match ConfigWalker::start(self.reader) {
            Ok((header, walker)) => {
                debug!(
                    "{}: decoder configuration profile={} level={} length_bits={}",
                    self.config.name,
                    header.avc_profile_indication.0,
                    header.avc_level_indication,
                    header.length_bits()
                );
                self.state.length_bits = Some(header.length_bits());
                walker
            }
            Err(e) => {
                warn!("{}: bad decoder configuration: {}", self.config.name, e);
                Self::config_failed(call, e);
                return;
            }
        };
        let view = call.view;
        loop {
            match walker.advance(self.reader) {
                Ok(ConfigStep::Unit { gap_start }) => {
                    self.file(call, gap_start, view, false, SegmentFlags::SKIP);
                    if self.next_unit(call, true) == Flow::Stop {
                        break;
                    }
                }
                Ok(ConfigStep::End { gap_start }) => {
                    self.file(call, gap_start, view, false, SegmentFlags::SKIP);
                    break;
                }
                Err(e) => {
                    warn!("{}: decoder configuration cut short: {}", self.config.name, e);
                    Self::config_failed(call, e);
                    break;
                }
            }
        }
    }

    fn config_failed(call: &mut CallState, e: AvccError) {
        call.errors |= UnitErrors::MALFORMED;
        call.early_stop = Some(match e {
            AvccError::Reader(fault) => fault.into(),
            _ => PreParseError::Unrecoverable,
        });
    }

    /// Consumes the delimiter at the cursor and handles the unit behind it.
    fn next_unit(&mut self, call: &mut CallState, size_delimited: bool) -> Flow {
        let mut found = None;
        let consumed = self.reader.consume_delimiter(
            EmulationPrevention::ZeroZeroThree,
            None,
            |byte, pos| found = Some((byte, pos)),
        );
        if let Err(fault) = consumed {
            warn!(
                "{}: bad delimiter at {:?}: {:?}",
                self.config.name,
                self.reader.position(),
                fault
            );
            call.early_stop = Some(fault.into());
            return Flow::Stop;
        }
        let Some((byte, delim)) = found else {
            return Flow::Stop;
        };
        let at = UnitAt {
            delim,
            payload: self.reader.position(),
            size_delimited,
        };
        let class = UnitClass::classify(byte, self.config.mvc);
        trace!("{}: unit {:#04x} {:?} at {:?}", self.config.name, byte, class, delim);

        let mut errs = UnitErrors::empty();
        let flow = match NalHeader::new(byte) {
            Ok(header) if class != UnitClass::Unclassified => {
                match self.reader.skip(8, "nal_unit_header") {
                    Ok(()) => self.unit(call, header, class, at, &mut errs),
                    Err(e) => {
                        errs |= reader_error_flags(&e);
                        self.file_unit(call, class.is_picture_data(), at, SegmentFlags::empty());
                        Flow::Continue
                    }
                }
            }
            _ => {
                self.file_unit(call, false, at, SegmentFlags::empty());
                Flow::Continue
            }
        };

        if self.reader.take_invalid_emulation() {
            errs |= UnitErrors::INVALID_EMULATION;
        }
        if let Some(fault) = self.reader.take_exception() {
            trace!("{}: reader fault {:?} in unit at {:?}", self.config.name, fault, delim);
            errs |= UnitErrors::READER_EXCEPTION;
        }
        if let Some(err) = PreParseError::for_unit(errs) {
            warn!(
                "{}: unit type {} at {:?}: {} ({:?})",
                self.config.name,
                byte & 0x1f,
                delim,
                err,
                errs
            );
        }
        call.errors |= errs;
        if call.picture.started && class.is_picture_data() {
            call.picture.errors |= errs;
        }
        let is_prefix = class == UnitClass::NonPicture
            && UnitType::for_id(byte) == UnitType::PrefixNALUnit;
        call.last_prefix_at = if is_prefix { Some(delim) } else { None };
        flow
    }

    fn unit(
        &mut self,
        call: &mut CallState,
        header: NalHeader,
        class: UnitClass,
        at: UnitAt,
        errs: &mut UnitErrors,
    ) -> Flow {
        match class {
            UnitClass::Sequence => self.sequence(call, header, at, errs),
            UnitClass::Pps => self.pps(call, at, errs),
            UnitClass::Picture => self.slice(call, header, at, errs),
            UnitClass::SkipPicture => {
                self.file_unit(call, true, at, SegmentFlags::SKIP);
                Flow::Continue
            }
            UnitClass::Unsupported => {
                *errs |= UnitErrors::UNSUPPORTED;
                call.picture.unsupported = true;
                self.file_unit(call, true, at, SegmentFlags::empty());
                Flow::Continue
            }
            UnitClass::NonPicture | UnitClass::Unclassified => {
                self.non_picture(call, header, at, errs)
            }
        }
    }

    fn supported(&self, sps: &SeqParameterSet) -> bool {
        self.config.supported_profiles.contains(&sps.profile_idc)
    }

    fn sequence(
        &mut self,
        call: &mut CallState,
        header: NalHeader,
        at: UnitAt,
        errs: &mut UnitErrors,
    ) -> Flow {
        if header.nal_unit_type() == UnitType::SubsetSeqParameterSet {
            match SubsetSps::read(&mut *self.reader, errs) {
                Ok(subset) if !self.supported(&subset.sps) => {
                    debug!(
                        "{}: subset SPS with unsupported profile {}",
                        self.config.name, subset.sps.profile_idc.0
                    );
                    *errs |= UnitErrors::UNSUPPORTED;
                }
                Ok(subset) => {
                    let id = usize::from(subset.sps.id().id());
                    if self.pools.subset.insert(id, subset).is_err() {
                        return self.exhausted(call, "subset SPS");
                    }
                    self.state.last_subset_id = Some(id);
                }
                Err(e) => *errs |= sps_error_flags(&e),
            }
        } else {
            match SeqParameterSet::read(&mut *self.reader, errs) {
                Ok(sps) if !self.supported(&sps) => {
                    debug!(
                        "{}: SPS with unsupported profile {}",
                        self.config.name, sps.profile_idc.0
                    );
                    *errs |= UnitErrors::UNSUPPORTED;
                }
                Ok(sps) => {
                    if self.reader.check_more_trailing_data() {
                        *errs |= UnitErrors::TRAILING_DATA;
                    }
                    let id = usize::from(sps.id().id());
                    if self.pools.sps.insert(id, sps).is_err() {
                        return self.exhausted(call, "SPS");
                    }
                }
                Err(e) => *errs |= sps_error_flags(&e),
            }
        }
        self.file_unit(call, false, at, SegmentFlags::empty());
        Flow::Continue
    }

    fn pps(&mut self, call: &mut CallState, at: UnitAt, errs: &mut UnitErrors) -> Flow {
        match PicParameterSet::read(&*self.pools, &mut *self.reader, errs) {
            Ok(pps) => {
                if self.reader.check_more_trailing_data() {
                    *errs |= UnitErrors::TRAILING_DATA;
                }
                let id = usize::from(pps.id().id());
                if self.pools.pps.insert(id, pps).is_err() {
                    return self.exhausted(call, "PPS");
                }
            }
            Err(e) => *errs |= pps_error_flags(&e),
        }
        self.file_unit(call, false, at, SegmentFlags::empty());
        Flow::Continue
    }

    /// Ends the call early; the unit is left in whatever list is active.
    fn exhausted(&mut self, call: &mut CallState, what: &str) -> Flow {
        warn!("{}: {} pool exhausted", self.config.name, what);
        call.resource_exhausted = true;
        call.early_stop = Some(PreParseError::ResourceExhausted);
        Flow::Stop
    }

    fn non_picture(
        &mut self,
        call: &mut CallState,
        header: NalHeader,
        at: UnitAt,
        errs: &mut UnitErrors,
    ) -> Flow {
        match header.nal_unit_type() {
            UnitType::SEI => match read_sei(&*self.pools, &mut *self.reader, errs) {
                Ok(summary) => {
                    if let Some(id) = summary.active_sps {
                        self.state.sei_active_sps = Some(id);
                    }
                }
                Err(e) => *errs |= reader_error_flags(&e),
            },
            UnitType::AccessUnitDelimiter => match AccessUnitDelimiter::read(&mut *self.reader) {
                Ok(aud) => {
                    call.aud_seen = true;
                    if !call.picture.started {
                        call.picture.primary_pic_type = Some(aud.primary_pic_type);
                    }
                    if self.reader.check_more_trailing_data() {
                        *errs |= UnitErrors::TRAILING_DATA;
                    }
                }
                Err(AudError::RbspError(e)) => *errs |= reader_error_flags(&e),
            },
            UnitType::PrefixNALUnit => match PrefixNalUnit::read(&mut *self.reader) {
                Ok(prefix) => call.prefix = prefix.mvc().copied(),
                Err(e) => *errs |= reader_error_flags(&e),
            },
            UnitType::EndOfSeq | UnitType::EndOfStream => call.prev = None,
            _ => {}
        }
        self.file_unit(call, false, at, SegmentFlags::empty());
        Flow::Continue
    }

    fn slice(
        &mut self,
        call: &mut CallState,
        header: NalHeader,
        at: UnitAt,
        errs: &mut UnitErrors,
    ) -> Flow {
        let mvc = if header.nal_unit_type() == UnitType::SliceExtension {
            match NalHeaderExtension::read(&mut *self.reader) {
                Ok(NalHeaderExtension::Mvc(ext)) => Some(ext),
                Ok(NalHeaderExtension::Svc) => {
                    *errs |= UnitErrors::UNSUPPORTED;
                    call.picture.unsupported = true;
                    self.file_unit(call, true, at, SegmentFlags::SKIP);
                    return Flow::Continue;
                }
                Err(e) => {
                    *errs |= reader_error_flags(&e);
                    self.file_unit(call, true, at, SegmentFlags::empty());
                    return Flow::Continue;
                }
            }
        } else {
            None
        };
        let view_header = match mvc {
            Some(ext) => Some(ext),
            None => call.prefix.take(),
        };

        let parsed =
            SliceHeader::read(&*self.pools, &mut *self.reader, header, mvc.as_ref(), errs);
        let (slice, sps, pps) = match parsed {
            Ok(v) => v,
            Err(e) => {
                *errs |= e.unit_error();
                warn!(
                    "{}: unreadable slice header at {:?}: {:?}",
                    self.config.name, at.delim, e
                );
                return self.bad_slice(call, at);
            }
        };
        let pps_id = slice.pic_parameter_set_id;
        let sps_id = pps.seq_parameter_set_id;
        let dimensions = sps.pixel_dimensions().ok();
        let discontiguous = pps.num_slice_groups() > 1
            && fmo::is_discontiguous(&fmo::slice_group_map(
                pps,
                sps,
                slice.slice_group_change_cycle.unwrap_or(0),
            ));
        let pps_handle = self.pools.pps.latest(usize::from(pps_id.id())).map(|(h, _)| h);
        let sps_slot = usize::from(sps_id.id());
        let (sequence, view_index) = match mvc {
            Some(ext) => match self.pools.subset.latest(sps_slot) {
                Some((h, subset)) => {
                    (Some(SequenceRef::Subset(h)), subset.view_index(ext.view_id))
                }
                None => (None, None),
            },
            None => (
                self.pools.sps.latest(sps_slot).map(|(h, _)| SequenceRef::Sps(h)),
                Some(0),
            ),
        };
        let (Some(pps_handle), Some(sequence)) = (pps_handle, sequence) else {
            *errs |= UnitErrors::MISSING_REFERENCE;
            return self.bad_slice(call, at);
        };
        let Some(view_index) = view_index else {
            warn!(
                "{}: view_id {} is not in subset SPS {}",
                self.config.name,
                view_header.map_or(0, |h| h.view_id),
                sps_id.id()
            );
            *errs |= UnitErrors::MISSING_REFERENCE;
            self.file_unit(call, true, at, SegmentFlags::SKIP);
            return Flow::Continue;
        };
        if view_index >= self.config.max_views {
            warn!(
                "{}: view {} is beyond the limit of {} views",
                self.config.name, view_index, self.config.max_views
            );
            *errs |= UnitErrors::VIEW_LIMIT;
            return self.exhausted(call, "view");
        }

        let cur = PreviousSlice::new(&slice, header.nal_ref_idc(), view_index as u8);
        let boundary = new_picture::boundary(call.prev.as_ref(), &cur, call.aud_seen);
        call.aud_seen = false;
        let view = ViewState {
            picture: ViewPicture {
                view_id: view_header.map_or(0, |h| h.view_id),
                nal_ref_idc: header.nal_ref_idc(),
                anchor_pic_flag: view_header.is_some_and(|h| h.anchor_pic_flag),
                sps_id,
                pps_id,
                header: slice,
            },
            pps: pps_handle,
            sequence,
        };
        if !call.picture.started {
            call.picture.started = true;
            call.picture.new_picture = boundary == Boundary::NewPicture;
            call.picture.idr = view.picture.header.is_idr();
            call.picture.dimensions = dimensions;
            call.picture.discontiguous_slice_groups = discontiguous;
            call.expected_views = self.expected_views();
            self.switch_view(call, view_index);
            call.picture.views.push(view);
        } else {
            match boundary {
                Boundary::NewView => {
                    self.switch_view(call, view_index);
                    call.picture.views.push(view);
                }
                Boundary::NewPicture => {
                    if !call.picture.multiple_pictures {
                        warn!(
                            "{}: another picture starts at {:?} in the same call",
                            self.config.name, at.delim
                        );
                    }
                    call.picture.multiple_pictures = true;
                }
                Boundary::SamePicture => {
                    if call
                        .prev
                        .as_ref()
                        .is_some_and(|prev| new_picture::is_discontinuous(prev, &cur))
                    {
                        call.picture.discontinuous_mbs = true;
                    }
                }
            }
        }
        call.prev = Some(cur);
        self.file_unit(call, true, at, SegmentFlags::empty());
        if !self.config.full_scan && view_index + 1 >= call.expected_views {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    /// A slice whose header could not be used. If it was the first of the call, the picture
    /// is dropped.
    fn bad_slice(&mut self, call: &mut CallState, at: UnitAt) -> Flow {
        let first = !call.picture.started;
        if first {
            call.picture.started = true;
            call.picture.invalid = true;
        }
        self.file_unit(call, true, at, SegmentFlags::empty());
        if first && !self.config.full_scan {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    fn expected_views(&self) -> usize {
        if !self.config.mvc {
            return 1;
        }
        self.state
            .last_subset_id
            .and_then(|id| self.pools.subset.latest(id))
            .map_or(1, |(_, s)| s.num_views())
            .clamp(1, self.config.max_views)
    }

    /// Makes `view` the view units are filed into. Non-picture units seen since the previous
    /// view's picture data are moved ahead of the new view's picture.
    fn switch_view(&mut self, call: &mut CallState, view: usize) {
        if view == call.view {
            return;
        }
        if call.filing.len() <= view {
            call.filing.resize(view + 1, None);
        }
        if call.filing[view].is_none() {
            if let Some(run) = call.non_picture_run.take() {
                self.timeline.retarget_from(
                    run,
                    Target::List {
                        view,
                        bucket: Bucket::PrePicture0,
                    },
                );
                call.filing[view] = Some(Filing {
                    bucket: Bucket::PrePicture0,
                    picture_data: false,
                });
            }
        }
        call.view = view;
    }

    /// Files a unit into the current view.
    fn file_unit(
        &mut self,
        call: &mut CallState,
        picture_data: bool,
        at: UnitAt,
        flags: SegmentFlags,
    ) {
        let view = call.view;
        if at.size_delimited {
            self.file(call, at.delim, view, picture_data, SegmentFlags::SKIP);
            self.file(
                call,
                at.payload,
                view,
                picture_data,
                SegmentFlags::INSERT_START_CODE | flags,
            );
        } else {
            self.file(call, at.delim, view, picture_data, flags);
        }
    }

    /// Sends bytes from `pos` onwards to the active list of `view`, moving on to the next list
    /// when the data switches between picture and non-picture.
    fn file(
        &mut self,
        call: &mut CallState,
        pos: StreamPosition,
        view: usize,
        picture_data: bool,
        flags: SegmentFlags,
    ) {
        if call.filing.len() <= view {
            call.filing.resize(view + 1, None);
        }
        let bucket = match call.filing[view] {
            None => Bucket::first_for(picture_data),
            Some(f) if f.picture_data != picture_data => match f.bucket.next() {
                Some(next) => next,
                None => {
                    warn!(
                        "{}: too many picture/non-picture alternations in view {}",
                        self.config.name, view
                    );
                    f.bucket
                }
            },
            Some(f) => f.bucket,
        };
        call.filing[view] = Some(Filing {
            bucket,
            picture_data,
        });
        self.timeline.push(Cut {
            pos,
            target: Target::List { view, bucket },
            flags,
        });
        if picture_data {
            call.non_picture_run = None;
        } else if call.non_picture_run.is_none() {
            call.non_picture_run = Some(self.timeline.index_at(pos));
        }
    }

    fn finish(
        &mut self,
        mut call: CallState,
        buffers: &[InputBuffer],
        spare: &mut Vec<Vec<Segment>>,
    ) -> (PreParsedData, Vec<u64>) {
        if !call.picture.started {
            if let Some(pos) = call.last_prefix_at {
                // the prefix belongs with the first slice of the next call
                let i = self.timeline.index_at(pos);
                self.timeline.retarget_from(i, Target::Carry);
                self.state.carried_prefix = call.prefix.take();
            }
        }
        if self.timeline.cuts().is_empty() {
            self.file(&mut call, StreamPosition::default(), 0, false, SegmentFlags::empty());
        }
        let extents: Vec<BufferExtent> = buffers
            .iter()
            .map(|b| BufferExtent {
                map_id: b.map_id,
                len: b.data.len(),
            })
            .collect();
        let mut built = self.timeline.build(&extents, call.filing.len().max(1));
        let carry = std::mem::take(&mut built.carry);
        if built.overflowed && call.picture.started && !call.picture.invalid {
            warn!(
                "{}: picture needs more than {} segments in one list",
                self.config.name,
                super::MAX_SEGMENTS_PER_PICTURE
            );
            call.picture.invalid = true;
        }

        let mut data = PreParsedData {
            resource_exhausted: call.resource_exhausted,
            errors: call.errors,
            early_stop: call.early_stop.take(),
            ..Default::default()
        };
        let surfaced = call.picture.started && !call.picture.invalid;
        if surfaced {
            self.surface(&call.picture, &mut data);
            let tag = buffers.iter().find_map(|b| b.presentation_tag);
            data.picture = Some(call.picture.info(self.state.sei_active_sps, tag));
        } else {
            if call.picture.started {
                warn!("{}: dropping picture with an unusable first slice", self.config.name);
            }
            data.new_picture = call.picture.new_picture && !call.picture.started;
        }
        let skip = call.picture.started && !surfaced;
        let carried = std::mem::take(&mut self.state.carried);
        data.views = picture::view_segments(built, carried, skip, spare);

        let mut released = std::mem::take(&mut self.state.carried_buffers);
        let mut held = Vec::new();
        for b in buffers {
            if carry.iter().any(|s| s.buffer_map_id == b.map_id) {
                held.push(b.id);
            } else {
                released.push(b.id);
            }
        }
        self.state.carried = carry;
        self.state.carried_buffers = held;
        self.state.last_slice = call.prev;
        debug!(
            "{}: picture={} new_picture={} new_sequence={} segments={} bytes={}",
            self.config.name,
            data.picture.is_some(),
            data.new_picture,
            data.new_sequence,
            data.segments().count(),
            data.total_bytes()
        );
        (data, released)
    }

    /// Takes references on the picture's parameter sets and reports sequence changes.
    fn surface(&mut self, picture: &PictureContext, data: &mut PreParsedData) {
        data.new_picture = picture.new_picture;
        data.closed_gop = picture.idr;
        for view in picture.views.iter().take(2) {
            self.pools.pps.add_ref(view.pps);
        }
        let subset = picture.views.iter().find_map(|v| match v.sequence {
            SequenceRef::Subset(h) => Some(h),
            SequenceRef::Sps(_) => None,
        });
        if let Some((_, h)) = picture.sps_view() {
            self.pools.sps.add_ref(h);
            data.new_sequence = self.state.active_sps != Some(h);
            self.state.active_sps = Some(h);
            data.sequence_header = self.pools.sps.get(h).cloned();
        }
        if let Some(h) = subset {
            data.new_sub_sequence = self.state.active_subset != Some(h);
            self.state.active_subset = Some(h);
            data.sub_sequence_header = self.pools.subset.get(h).cloned();
        }
    }
}

fn reader_error_flags(e: &BitReaderError) -> UnitErrors {
    if e.fault().is_some() {
        UnitErrors::READER_EXCEPTION
    } else {
        UnitErrors::MALFORMED
    }
}

fn sps_error_flags(e: &SpsError) -> UnitErrors {
    match e {
        SpsError::BadSeqParamSetId(_) => UnitErrors::UNSUPPORTED,
        _ => match e.reader_error() {
            Some(r) => reader_error_flags(r),
            None => UnitErrors::MALFORMED,
        },
    }
}

fn pps_error_flags(e: &PpsError) -> UnitErrors {
    match e {
        PpsError::RbspReaderError(r)
        | PpsError::ScalingMatrix(ScalingMatrixError::ReaderError(r)) => reader_error_flags(r),
        PpsError::UnknownSeqParamSetId(_) => UnitErrors::MISSING_REFERENCE,
        PpsError::BadPicParamSetId(_) | PpsError::BadSeqParamSetId(_) => UnitErrors::UNSUPPORTED,
        _ => UnitErrors::MALFORMED,
    }
}
