use bytes::Bytes;
use h264_preparser::annexb::{find_candidate, matches_across, START_CODE_PREFIX};
use h264_preparser::preparse::{ElementKind, InputBuffer, PreParser, StreamConfig};
use hex_slice::AsHex;
use std::io::Read;

fn main() {
    let path = {
        let mut args = std::env::args_os();
        if args.len() != 2 {
            eprintln!("Usage: dump path/to/data.h264");
            std::process::exit(1);
        }
        args.nth(1).unwrap()
    };

    let mut file = std::fs::File::open(path).expect("open");
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).expect("read");
    let data = Bytes::from(buf);

    let mut parser = PreParser::new(StreamConfig {
        name: "dump".to_owned(),
        mvc: true,
        full_scan: true,
        ..StreamConfig::default()
    })
    .expect("config");
    let events = parser.decoded_events();

    // one unit per call, start code included
    for (i, unit) in units(&data).into_iter().enumerate() {
        parser
            .submit_buffer(InputBuffer::new(
                i as u64,
                i as u32,
                unit.clone(),
                ElementKind::PictureData,
            ))
            .expect("submit");
        let parsed = parser.preparse().expect("preparse");
        println!(
            "unit {i}: {} bytes {:02x}",
            unit.len(),
            unit[..unit.len().min(8)].as_hex()
        );
        if parsed.new_sequence {
            println!("  new sequence: {:#?}", parsed.sequence_header);
        }
        if parsed.new_picture {
            println!("  new picture (closed_gop={})", parsed.closed_gop);
        }
        if let Some(picture) = &parsed.picture {
            println!(
                "  picture sps={:?} pps={:?} idr={} dims={:?} views={}",
                picture.sps_id(),
                picture.pps_id(),
                picture.idr,
                picture.dimensions,
                picture.views.len()
            );
            // nothing decodes here, so the references are dropped straight away
            if let Some(event) = picture.decoded_event() {
                events.picture_decoded(event);
            }
        }
        if !parsed.errors.is_empty() {
            println!("  errors: {:?}", parsed.errors);
        }
        for (view, lists) in parsed.views.iter().enumerate() {
            for s in lists
                .pre_picture_segments
                .iter()
                .chain(&lists.picture_segments)
            {
                println!(
                    "  view {view}: buffer {} [{}..{}] {:?}",
                    s.buffer_map_id,
                    s.byte_offset,
                    s.byte_offset + s.byte_size,
                    s.flags
                );
            }
        }
        parser.recycle(parsed);
        parser.released_buffers();
    }
}

/// Splits Annex B data ahead of each start code.
fn units(data: &Bytes) -> Vec<Bytes> {
    let chain = [data.clone()];
    let mut starts = Vec::new();
    let mut from = 0;
    while let Some(pos) = find_candidate(data, from, &START_CODE_PREFIX) {
        if matches_across(&chain, 0, pos, &START_CODE_PREFIX) {
            starts.push(pos);
            from = pos + START_CODE_PREFIX.len_bytes();
        } else {
            from = pos + 1;
        }
        if from >= data.len() {
            break;
        }
    }
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }
    starts
        .iter()
        .zip(starts.iter().skip(1).chain(std::iter::once(&data.len())))
        .filter(|(s, e)| e > s)
        .map(|(&s, &e)| data.slice(s..e))
        .collect()
}
