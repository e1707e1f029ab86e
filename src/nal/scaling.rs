//! Scaling matrices carried by the SPS and PPS, and their resolution into concrete lists
//! following the fall-back rules of Table 7-2.
//!
//! All lists are kept in the zig-zag scan order in which they are transmitted.

use crate::rbsp::{BitRead, BitReaderError};
use std::num::NonZeroU8;

pub const FLAT_4X4: [u8; 16] = [16; 16];
pub const FLAT_8X8: [u8; 64] = [16; 64];

pub const DEFAULT_4X4_INTRA: [u8; 16] = [
    6, 13, 13, 20, 20, 20, 28, 28, 28, 28, 32, 32, 32, 37, 37, 42,
];
pub const DEFAULT_4X4_INTER: [u8; 16] = [
    10, 14, 14, 20, 20, 20, 24, 24, 24, 24, 27, 27, 27, 30, 30, 34,
];
pub const DEFAULT_8X8_INTRA: [u8; 64] = [
    6, 10, 10, 13, 11, 13, 16, 16, 16, 16, 18, 18, 18, 18, 18, 23, 23, 23, 23, 23, 23, 25, 25, 25,
    25, 25, 25, 25, 27, 27, 27, 27, 27, 27, 27, 27, 29, 29, 29, 29, 29, 29, 29, 31, 31, 31, 31, 31,
    31, 33, 33, 33, 33, 33, 36, 36, 36, 36, 38, 38, 38, 40, 40, 42,
];
pub const DEFAULT_8X8_INTER: [u8; 64] = [
    9, 13, 13, 15, 13, 15, 17, 17, 17, 17, 19, 19, 19, 19, 19, 21, 21, 21, 21, 21, 21, 22, 22, 22,
    22, 22, 22, 22, 24, 24, 24, 24, 24, 24, 24, 24, 25, 25, 25, 25, 25, 25, 25, 27, 27, 27, 27, 27,
    27, 28, 28, 28, 28, 28, 30, 30, 30, 30, 32, 32, 32, 33, 33, 35,
];

#[derive(Debug)]
pub enum ScalingMatrixError {
    ReaderError(BitReaderError),
    /// The `delta_scale` field must be between -128 and 127 inclusive.
    DeltaScaleOutOfRange(i32),
}

impl From<BitReaderError> for ScalingMatrixError {
    fn from(e: BitReaderError) -> Self {
        ScalingMatrixError::ReaderError(e)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScalingList<const S: usize> {
    NotPresent,
    UseDefault,
    List([NonZeroU8; S]),
}

/// returns 'use_default_scaling_matrix_flag'
fn fill_scaling_list<R: BitRead>(
    r: &mut R,
    scaling_list: &mut [NonZeroU8],
) -> Result<bool, ScalingMatrixError> {
    // 8
    let mut last_scale = NonZeroU8::MIN.saturating_add(7);
    let mut next_scale = 8;
    let mut use_default_scaling_matrix_flag = false;

    for j in 0..scaling_list.len() {
        if next_scale != 0 {
            let delta_scale = r.read_se("delta_scale")?;
            if !(-128..=127).contains(&delta_scale) {
                return Err(ScalingMatrixError::DeltaScaleOutOfRange(delta_scale));
            }
            next_scale = (i32::from(last_scale.get()) + delta_scale + 256) % 256;
            use_default_scaling_matrix_flag = j == 0 && next_scale == 0;
            if use_default_scaling_matrix_flag {
                break;
            }
        }
        let new_value = NonZeroU8::new(next_scale as u8).unwrap_or(last_scale);
        scaling_list[j] = new_value;
        last_scale = new_value;
    }

    Ok(use_default_scaling_matrix_flag)
}

impl<const S: usize> ScalingList<S> {
    pub fn read<R: BitRead>(r: &mut R, present: bool) -> Result<ScalingList<S>, ScalingMatrixError> {
        if !present {
            return Ok(ScalingList::NotPresent);
        }
        let mut scaling_list = [NonZeroU8::MIN; S];

        let use_default_scaling_matrix_flag = fill_scaling_list(r, &mut scaling_list)?;
        if use_default_scaling_matrix_flag {
            Ok(ScalingList::UseDefault)
        } else {
            Ok(ScalingList::List(scaling_list))
        }
    }

    fn values(&self) -> Option<[u8; S]> {
        match self {
            ScalingList::List(l) => Some(l.map(NonZeroU8::get)),
            _ => None,
        }
    }
}

/// Where the values of one list come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSource {
    Explicit,
    UseDefault,
    Flat,
    DefaultIntra,
    DefaultInter,
    /// The list of the same index from the sequence-level matrix
    SequenceList(usize),
    /// The already resolved list of the given index in the same matrix
    Previous(usize),
}

/// Which column of Table 7-2 applies to lists that are not transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackRule {
    /// Rule A: no higher-level matrix, so fall back to the default lists.
    Defaults,
    /// Rule B: the PPS falls back to the lists of the SPS matrix.
    Sequence,
}

/// A transmitted scaling matrix, as found in either the SPS or the PPS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScalingMatrix {
    pub lists4x4: Vec<ScalingList<16>>,
    /// Zero, two or six entries depending on `chroma_format_idc` and, in the PPS,
    /// `transform_8x8_mode_flag`
    pub lists8x8: Vec<ScalingList<64>>,
}
impl ScalingMatrix {
    pub fn read<R: BitRead>(r: &mut R, count8x8: usize) -> Result<ScalingMatrix, ScalingMatrixError> {
        let mut lists4x4 = Vec::with_capacity(6);
        for _ in 0..6 {
            let present = r.read_bool("scaling_list_present_flag")?;
            lists4x4.push(ScalingList::<16>::read(r, present)?);
        }
        let mut lists8x8 = Vec::with_capacity(count8x8);
        for _ in 0..count8x8 {
            let present = r.read_bool("scaling_list_present_flag")?;
            lists8x8.push(ScalingList::<64>::read(r, present)?);
        }
        Ok(ScalingMatrix { lists4x4, lists8x8 })
    }

    pub fn source4x4(&self, i: usize, rule: FallbackRule) -> ListSource {
        match self.lists4x4.get(i) {
            Some(ScalingList::List(_)) => ListSource::Explicit,
            Some(ScalingList::UseDefault) => ListSource::UseDefault,
            _ => match (i, rule) {
                (0, FallbackRule::Defaults) => ListSource::DefaultIntra,
                (3, FallbackRule::Defaults) => ListSource::DefaultInter,
                (0 | 3, FallbackRule::Sequence) => ListSource::SequenceList(i),
                _ => ListSource::Previous(i - 1),
            },
        }
    }

    pub fn source8x8(&self, i: usize, rule: FallbackRule) -> ListSource {
        match self.lists8x8.get(i) {
            Some(ScalingList::List(_)) => ListSource::Explicit,
            Some(ScalingList::UseDefault) => ListSource::UseDefault,
            _ => match (i, rule) {
                (0, FallbackRule::Defaults) => ListSource::DefaultIntra,
                (1, FallbackRule::Defaults) => ListSource::DefaultInter,
                (0 | 1, FallbackRule::Sequence) => ListSource::SequenceList(i),
                _ => ListSource::Previous(i - 2),
            },
        }
    }

    fn resolve(&self, rule: FallbackRule, seq: &ResolvedScaling) -> ResolvedScaling {
        let mut out = ResolvedScaling::flat();
        for i in 0..6 {
            out.lists4x4[i] = match self.source4x4(i, rule) {
                ListSource::Explicit => self.lists4x4[i].values().unwrap_or(FLAT_4X4),
                ListSource::UseDefault if i < 3 => DEFAULT_4X4_INTRA,
                ListSource::UseDefault => DEFAULT_4X4_INTER,
                ListSource::DefaultIntra => DEFAULT_4X4_INTRA,
                ListSource::DefaultInter => DEFAULT_4X4_INTER,
                ListSource::SequenceList(j) => seq.lists4x4[j],
                ListSource::Previous(j) => out.lists4x4[j],
                ListSource::Flat => FLAT_4X4,
            };
        }
        for i in 0..6 {
            out.lists8x8[i] = match self.source8x8(i, rule) {
                ListSource::Explicit => self.lists8x8[i].values().unwrap_or(FLAT_8X8),
                ListSource::UseDefault if i % 2 == 0 => DEFAULT_8X8_INTRA,
                ListSource::UseDefault => DEFAULT_8X8_INTER,
                ListSource::DefaultIntra => DEFAULT_8X8_INTRA,
                ListSource::DefaultInter => DEFAULT_8X8_INTER,
                ListSource::SequenceList(j) => seq.lists8x8[j],
                ListSource::Previous(j) => out.lists8x8[j],
                ListSource::Flat => FLAT_8X8,
            };
        }
        out
    }

    /// Lists in effect for a sequence: `Flat_16` when the SPS carries no matrix.
    pub fn resolve_sequence(sps_matrix: Option<&ScalingMatrix>) -> ResolvedScaling {
        match sps_matrix {
            Some(m) => m.resolve(FallbackRule::Defaults, &ResolvedScaling::flat()),
            None => ResolvedScaling::flat(),
        }
    }

    /// Lists in effect for a picture, given the matrices of its PPS and SPS.
    pub fn resolve_picture(
        pps_matrix: Option<&ScalingMatrix>,
        sps_matrix: Option<&ScalingMatrix>,
    ) -> ResolvedScaling {
        let seq = Self::resolve_sequence(sps_matrix);
        match pps_matrix {
            None => seq,
            Some(m) if sps_matrix.is_some() => m.resolve(FallbackRule::Sequence, &seq),
            Some(m) => m.resolve(FallbackRule::Defaults, &seq),
        }
    }
}

/// Concrete weights for all twelve lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedScaling {
    pub lists4x4: [[u8; 16]; 6],
    pub lists8x8: [[u8; 64]; 6],
}
impl ResolvedScaling {
    pub fn flat() -> ResolvedScaling {
        ResolvedScaling {
            lists4x4: [FLAT_4X4; 6],
            lists8x8: [FLAT_8X8; 6],
        }
    }
}
