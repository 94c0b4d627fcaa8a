//! Benchmarks for the cost of recording a round trip

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hyper::{Request, Response};

use ghostwire::{Dump, Recorder, Redactor, RoundTripper, TransportError, WireDump};

/// Answers instantly with a fixed body
struct Immediate {
    body: Bytes,
}

impl RoundTripper for Immediate {
    fn round_trip(
        &self,
        _request: Option<Request<Bytes>>,
    ) -> impl Future<Output = Result<Response<Bytes>, TransportError>> + Send {
        let body = self.body.clone();
        async move { Ok(Response::new(body)) }
    }
}

fn request(size: usize) -> Request<Bytes> {
    Request::post("http://api.example.com/upload")
        .header("content-type", "application/octet-stream")
        .body(Bytes::from(vec![b'x'; size]))
        .unwrap()
}

fn bench_wire_dump(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire_dump");
    let dumper = WireDump::default();

    for size in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let request = request(size);
            b.iter(|| dumper.dump_request(black_box(&request)));
        });
    }

    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let transport = Arc::new(Immediate {
        body: Bytes::from(vec![b'y'; 1_000]),
    });
    let recorder = Recorder::new(Arc::clone(&transport));

    c.bench_function("direct_round_trip", |b| {
        b.iter(|| rt.block_on(transport.round_trip(Some(request(1_000)))));
    });

    c.bench_function("recorded_round_trip", |b| {
        b.iter(|| rt.block_on(recorder.round_trip(Some(request(1_000)))));
    });
}

fn bench_read_history(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let recorder = Recorder::builder()
        .transport(Arc::new(Immediate {
            body: Bytes::from_static(b"token=abc123"),
        }))
        .history_size(16)
        .response_redactor(Redactor::patterns([r"token=\w+"], "[REDACTED]").unwrap())
        .build()
        .unwrap();

    rt.block_on(async {
        for _ in 0..16 {
            let _ = recorder.round_trip(Some(request(100))).await;
        }
    });

    c.bench_function("render_history", |b| b.iter(|| black_box(recorder.render())));
}

criterion_group!(benches, bench_wire_dump, bench_round_trip, bench_read_history);
criterion_main!(benches);
