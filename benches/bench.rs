use bytes::Bytes;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use h264_preparser::preparse::{ElementKind, InputBuffer, PreParser, StreamConfig};
use std::fs::File;
use std::io::Read;

/// Access units of the test stream, split ahead of each access unit delimiter.
fn access_units(buf: &[u8]) -> Vec<Bytes> {
    let mut starts: Vec<usize> = buf
        .windows(4)
        .enumerate()
        .filter(|(_, w)| w[..3] == [0, 0, 1] && w[3] & 0x1f == 9)
        .map(|(i, _)| i)
        .collect();
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }
    starts.push(buf.len());
    starts
        .windows(2)
        .map(|w| Bytes::copy_from_slice(&buf[w[0]..w[1]]))
        .collect()
}

fn preparse(c: &mut Criterion) {
    let mut f = File::open("big_buck_bunny_1080p_24fps_h264.h264").expect("file not found");
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).unwrap();
    let units = access_units(&buf);

    let mut group = c.benchmark_group("preparse");
    group.throughput(Throughput::Bytes(buf.len() as u64));
    for full_scan in [false, true] {
        let name = if full_scan { "full_scan" } else { "first_picture" };
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut parser = PreParser::new(StreamConfig {
                    full_scan,
                    ..StreamConfig::default()
                })
                .unwrap();
                let events = parser.decoded_events();
                for (i, unit) in units.iter().enumerate() {
                    parser
                        .submit_buffer(InputBuffer::new(
                            i as u64,
                            i as u32,
                            unit.clone(),
                            ElementKind::PictureData,
                        ))
                        .unwrap();
                    let parsed = parser.preparse().unwrap();
                    if let Some(event) = parsed.picture.as_ref().and_then(|p| p.decoded_event()) {
                        events.picture_decoded(event);
                    }
                    parser.recycle(parsed);
                    parser.released_buffers();
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, preparse);
criterion_main!(benches);
