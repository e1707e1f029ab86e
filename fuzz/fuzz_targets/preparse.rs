//! Feeds arbitrary data through the pre-parser, as one buffer and again split in two, checking
//! that every segment stays inside the buffer it names.

#![no_main]
use bytes::Bytes;
use h264_preparser::preparse::{
    BitstreamFormat, ElementKind, InputBuffer, PreParsedData, PreParser, StreamConfig,
};
use libfuzzer_sys::fuzz_target;

fn check(parsed: &PreParsedData, lens: &[usize]) {
    for s in parsed.segments() {
        let len = lens[s.buffer_map_id as usize];
        assert!(s.byte_offset + s.byte_size <= len, "{s:?} outside buffer of {len}");
    }
    assert!(parsed.total_bytes() <= lens.iter().sum());
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, data)) = data.split_first() else {
        return;
    };
    let format = match selector % 3 {
        0 => BitstreamFormat::AnnexB,
        1 => BitstreamFormat::Avcc,
        _ => BitstreamFormat::NoDelimiter,
    };
    let config = StreamConfig {
        format,
        mvc: selector & 0x10 != 0,
        full_scan: selector & 0x20 != 0,
        ..StreamConfig::default()
    };
    let kind = if selector & 0x40 != 0 {
        ElementKind::CodecConfig
    } else {
        ElementKind::PictureData
    };
    let data = Bytes::copy_from_slice(data);

    let mut parser = PreParser::new(config.clone()).unwrap();
    parser
        .submit_buffer(InputBuffer::new(0, 0, data.clone(), kind))
        .unwrap();
    let parsed = parser.preparse().unwrap();
    check(&parsed, &[data.len()]);

    let split = data.len() / 2;
    let mut parser = PreParser::new(config).unwrap();
    parser
        .submit_buffer(InputBuffer::new(0, 0, data.slice(..split), kind))
        .unwrap();
    parser
        .submit_buffer(InputBuffer::new(1, 1, data.slice(split..), kind))
        .unwrap();
    let parsed = parser.preparse().unwrap();
    check(&parsed, &[split, data.len() - split]);
    if let Some(event) = parsed.picture.as_ref().and_then(|p| p.decoded_event()) {
        parser.decoded_events().picture_decoded(event);
    }
    parser.recycle(parsed);
    // a second call applies the event and must not disturb the pools
    parser
        .submit_buffer(InputBuffer::new(2, 0, data, kind))
        .unwrap();
    let _ = parser.preparse().unwrap();
});
