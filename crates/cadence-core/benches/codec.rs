//! Codec benchmarks

use cadence_core::{codec, events, Envelope, PlaylistState, Track};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

fn encode_benchmark(c: &mut Criterion) {
    let envelope = Envelope::new(events::PLAYLIST, Some(json!({ "cIndex": 3, "cTime": 127.4 })));

    c.bench_function("encode_cursor_update", |b| {
        b.iter(|| black_box(codec::encode(&envelope).unwrap()))
    });
}

fn decode_benchmark(c: &mut Criterion) {
    let envelope = Envelope::new(events::PLAYLIST, Some(json!({ "cIndex": 3, "cTime": 127.4 })));
    let encoded = codec::encode(&envelope).unwrap();

    c.bench_function("decode_cursor_update", |b| {
        b.iter(|| black_box(codec::decode(&encoded).unwrap()))
    });
}

fn playlist_response_benchmark(c: &mut Criterion) {
    let mut state = PlaylistState::new();
    for i in 0..50 {
        let track = Track::new(format!("https://cdn.example/{}.mp3", i))
            .with_title(format!("Episode {}", i))
            .with_podcast("1200361736", "Benchmark Show");
        state.add_track(track, false).unwrap();
    }

    c.bench_function("encode_playlist_response_50", |b| {
        b.iter(|| {
            let envelope = Envelope::with(events::PLAYLIST_DATA_RESPONSE, &state).unwrap();
            black_box(codec::encode(&envelope).unwrap())
        })
    });
}

criterion_group!(
    benches,
    encode_benchmark,
    decode_benchmark,
    playlist_response_benchmark
);
criterion_main!(benches);
