//! Dispatch benchmarks

use cadence_router::{Args, EventRouter, Handler, Signature};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

fn noop(params: &[&str]) -> Handler<()> {
    let signature = Signature::parse(params.iter().copied()).unwrap();
    Handler::new("noop", signature, |_: (), _: Args| async { Ok(()) })
}

fn playlist_router() -> EventRouter<()> {
    let mut router = EventRouter::new("playlist");
    for params in [
        &[][..],
        &["forceGet"][..],
        &["addedTrack", "$insert"][..],
        &["removeIndex", "$newIndex"][..],
        &["$cIndex", "$cTime"][..],
        &["$cont", "$repeat", "$vol"][..],
    ] {
        router.register(noop(params)).unwrap();
    }
    router
}

fn keys_benchmark(c: &mut Criterion) {
    let signature = Signature::parse(["id", "$a", "$b", "$c", "$d", "$e"]).unwrap();

    c.bench_function("dispatch_keys_5_optional", |b| {
        b.iter(|| black_box(signature.dispatch_keys().unwrap()))
    });
}

fn resolve_benchmark(c: &mut Criterion) {
    let router = playlist_router();
    let cursor = json!({ "cTime": 127.4, "cIndex": 3 });
    let options = json!({ "vol": 0.5, "repeat": true, "cont": false });

    c.bench_function("resolve_cursor_update", |b| {
        b.iter(|| black_box(router.resolve(Some(&cursor)).is_ok()))
    });
    c.bench_function("resolve_options_update", |b| {
        b.iter(|| black_box(router.resolve(Some(&options)).is_ok()))
    });
}

fn extract_benchmark(c: &mut Criterion) {
    let signature = Signature::parse(["addedTrack", "$insert"]).unwrap();
    let payload = json!({ "addedTrack": { "src": "https://cdn.example/1.mp3", "title": "One" } });

    c.bench_function("extract_add_track_args", |b| {
        b.iter(|| black_box(Args::extract(&signature, Some(&payload))))
    });
}

criterion_group!(benches, keys_benchmark, resolve_benchmark, extract_benchmark);
criterion_main!(benches);
