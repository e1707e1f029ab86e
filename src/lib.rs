//! Pre-parsing of H264 elementary streams ahead of a hardware decoder.
//!
//! [`preparse::PreParser`] takes chains of compressed buffers and, for each call, finds unit
//! boundaries, decodes just enough syntax to know where pictures and sequences begin, and
//! returns the original byte ranges as ordered segment lists per picture and per view.
//!
//! The syntax decoders in [`nal`] can also be used on their own, over an RBSP produced by
//! [`rbsp::decode_nal()`] and read with [`rbsp::BitReader`], using a [`Context`] to hold the
//! parameter sets that later units refer to.

pub mod annexb;
pub mod avcc;
pub mod nal;
pub mod preparse;
pub mod rbsp;
pub mod stream_reader;

#[cfg(test)]
mod testutil;

use nal::pps::{PicParamSetId, PicParameterSet};
use nal::sps::{SeqParamSetId, SeqParameterSet};
use nal::subset_sps::SubsetSps;

/// Contextual data that needs to be tracked between evaluations of different portions of H264
/// syntax.
///
/// Only the most recent parameter set for each id is kept.
pub struct Context {
    seq_param_sets: Vec<Option<SeqParameterSet>>,
    subset_seq_param_sets: Vec<Option<SubsetSps>>,
    pic_param_sets: Vec<Option<PicParameterSet>>,
}
impl Default for Context {
    fn default() -> Self {
        Context {
            seq_param_sets: vec![None; 32],
            subset_seq_param_sets: vec![None; 32],
            pic_param_sets: vec![None; 256],
        }
    }
}
impl Context {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn put_seq_param_set(&mut self, sps: SeqParameterSet) {
        let i = usize::from(sps.seq_parameter_set_id.id());
        self.seq_param_sets[i] = Some(sps);
    }

    pub fn put_subset_seq_param_set(&mut self, subset: SubsetSps) {
        let i = usize::from(subset.sps.seq_parameter_set_id.id());
        self.subset_seq_param_sets[i] = Some(subset);
    }

    pub fn put_pic_param_set(&mut self, pps: PicParameterSet) {
        let i = usize::from(pps.pic_parameter_set_id.id());
        self.pic_param_sets[i] = Some(pps);
    }
}
impl nal::ParamSets for Context {
    fn sps_by_id(&self, id: SeqParamSetId) -> Option<&SeqParameterSet> {
        self.seq_param_sets
            .get(usize::from(id.id()))
            .and_then(Option::as_ref)
    }

    fn subset_sps_by_id(&self, id: SeqParamSetId) -> Option<&SubsetSps> {
        self.subset_seq_param_sets
            .get(usize::from(id.id()))
            .and_then(Option::as_ref)
    }

    fn pps_by_id(&self, id: PicParamSetId) -> Option<&PicParameterSet> {
        self.pic_param_sets
            .get(usize::from(id.id()))
            .and_then(Option::as_ref)
    }
}
