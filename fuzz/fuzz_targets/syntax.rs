//! Runs the syntax decoders over arbitrary units, keeping parameter sets in a context so later
//! units can refer to them.

#![no_main]
use h264_preparser::nal::{
    aud, pps, sei, slice, sps, subset_sps, NalHeader, NalHeaderExtension, UnitErrors, UnitType,
};
use h264_preparser::rbsp::{decode_nal, BitRead, BitReader};
use h264_preparser::Context;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut ctx = Context::new();
    // units are separated by 0xff bytes, which never appear in a useful header position
    for unit in data.split(|&b| b == 0xff) {
        let Some(&first) = unit.first() else {
            continue;
        };
        let Ok(header) = NalHeader::new(first) else {
            continue;
        };
        let Ok(rbsp) = decode_nal(unit) else {
            continue;
        };
        let mut r = BitReader::new(&rbsp);
        let mut errs = UnitErrors::empty();
        match header.nal_unit_type() {
            UnitType::SeqParameterSet => {
                if let Ok(sps) = sps::SeqParameterSet::read(&mut r, &mut errs) {
                    let _ = sps.pixel_dimensions();
                    let _ = sps.fps();
                    ctx.put_seq_param_set(sps);
                }
            }
            UnitType::SubsetSeqParameterSet => {
                if let Ok(subset) = subset_sps::SubsetSps::read(&mut r, &mut errs) {
                    ctx.put_subset_seq_param_set(subset);
                }
            }
            UnitType::PicParameterSet => {
                if let Ok(pps) = pps::PicParameterSet::read(&ctx, &mut r, &mut errs) {
                    ctx.put_pic_param_set(pps);
                }
            }
            UnitType::AccessUnitDelimiter => {
                let _ = aud::AccessUnitDelimiter::read(&mut r);
            }
            UnitType::SEI => {
                while let Ok(h) = sei::SeiHeader::read(&mut r) {
                    if r.skip(h.payload_size.saturating_mul(8), "payload").is_err() {
                        break;
                    }
                }
            }
            t if t.has_header_extension() => {
                if let Ok(ext) = NalHeaderExtension::read(&mut r) {
                    if t == UnitType::SliceExtension {
                        let _ = slice::SliceHeader::read(&ctx, &mut r, header, ext.mvc(), &mut errs);
                    }
                }
            }
            UnitType::SliceLayerWithoutPartitioningIdr
            | UnitType::SliceLayerWithoutPartitioningNonIdr => {
                let _ = slice::SliceHeader::read(&ctx, &mut r, header, None, &mut errs);
            }
            _ => {}
        }
    }
});
