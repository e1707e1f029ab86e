//! Supplemental enhancement information, `sei_rbsp()` of section 7.3.2.3.
//!
//! Payloads are walked one message at a time. Only the buffering period is decoded, since it
//! names the SPS that later SEI payloads are interpreted against; every other payload is
//! skipped by its declared size.

pub mod buffering_period;

use super::sps::SeqParamSetId;
use super::{ParamSets, UnitErrors};
use crate::rbsp::{BitRead, BitReaderError};
use buffering_period::{BufferingPeriod, BufferingPeriodError};
use log::*;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HeaderType {
    BufferingPeriod,
    PicTiming,
    PanScanRect,
    FillerPayload,
    UserDataRegisteredItuTT35,
    UserDataUnregistered,
    RecoveryPoint,
    DecRefPicMarkingRepetition,
    MvcScalableNesting,
    ViewScalabilityInfo,
    NonRequiredViewComponent,
    BaseViewTemporalHrd,
    FramePackingArrangement,
    Other(u32),
}
impl HeaderType {
    pub fn from_id(id: u32) -> HeaderType {
        match id {
            0 => HeaderType::BufferingPeriod,
            1 => HeaderType::PicTiming,
            2 => HeaderType::PanScanRect,
            3 => HeaderType::FillerPayload,
            4 => HeaderType::UserDataRegisteredItuTT35,
            5 => HeaderType::UserDataUnregistered,
            6 => HeaderType::RecoveryPoint,
            7 => HeaderType::DecRefPicMarkingRepetition,
            37 => HeaderType::MvcScalableNesting,
            38 => HeaderType::ViewScalabilityInfo,
            41 => HeaderType::NonRequiredViewComponent,
            44 => HeaderType::BaseViewTemporalHrd,
            45 => HeaderType::FramePackingArrangement,
            _ => HeaderType::Other(id),
        }
    }
}

/// The type and size preceding each SEI payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SeiHeader {
    pub payload_type: HeaderType,
    pub payload_size: u32,
}
impl SeiHeader {
    pub fn read<R: BitRead>(r: &mut R) -> Result<SeiHeader, BitReaderError> {
        let payload_type = read_ff_coded(r, "payload_type")?;
        let payload_size = read_ff_coded(r, "payload_size")?;
        Ok(SeiHeader {
            payload_type: HeaderType::from_id(payload_type),
            payload_size,
        })
    }
}

/// A value coded as a run of `0xFF` bytes, each adding 255, and a final byte.
fn read_ff_coded<R: BitRead>(r: &mut R, name: &'static str) -> Result<u32, BitReaderError> {
    let mut value = 0u32;
    loop {
        let b: u32 = r.read_u32(8, name)?;
        value = value.saturating_add(b);
        if b != 0xFF {
            return Ok(value);
        }
    }
}

fn skip_bits<R: BitRead>(r: &mut R, mut bits: u64) -> Result<(), BitReaderError> {
    while bits > 0 {
        let n = bits.min(1 << 20) as u32;
        r.skip(n, "sei_payload")?;
        bits -= u64::from(n);
    }
    Ok(())
}

/// What was learned from one SEI unit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeiSummary {
    pub payload_types: Vec<HeaderType>,
    /// The SPS named by a buffering period message.
    pub active_sps: Option<SeqParamSetId>,
    pub buffering_period: Option<BufferingPeriod>,
}

/// Walks every message of an SEI unit.
///
/// A buffering period that cannot be fully decoded still reports its SPS id; the failure is
/// noted in `errs`. Errors from the message framing itself end the walk.
pub fn read_sei<C: ParamSets + ?Sized, R: BitRead>(
    ctx: &C,
    r: &mut R,
    errs: &mut UnitErrors,
) -> Result<SeiSummary, BitReaderError> {
    let mut summary = SeiSummary::default();
    while r.has_more_rbsp_data("sei_message")? {
        let header = SeiHeader::read(r)?;
        let start = r.bits_consumed();
        summary.payload_types.push(header.payload_type);
        if header.payload_type == HeaderType::BufferingPeriod {
            match BufferingPeriod::read_sps_id(r) {
                Ok(id) => {
                    summary.active_sps = Some(id);
                    match BufferingPeriod::read_rest(ctx, r, id) {
                        Ok(bp) => summary.buffering_period = Some(bp),
                        Err(BufferingPeriodError::UndefinedSeqParamSetId(id)) => {
                            warn!("buffering_period refers to unknown SPS {}", id.id());
                            *errs |= UnitErrors::MISSING_REFERENCE;
                        }
                        Err(e) => {
                            warn!("failure reading buffering_period: {:?}", e);
                            *errs |= UnitErrors::MALFORMED;
                        }
                    }
                }
                Err(e) => {
                    warn!("failure reading buffering_period: {:?}", e);
                    *errs |= UnitErrors::MALFORMED;
                }
            }
        }
        let used = r.bits_consumed() - start;
        let size = u64::from(header.payload_size) * 8;
        if used > size {
            warn!(
                "{:?} payload overran its declared size of {} bytes",
                header.payload_type, header.payload_size
            );
            *errs |= UnitErrors::MALFORMED;
            break;
        }
        skip_bits(r, size - used)?;
    }
    Ok(summary)
}
