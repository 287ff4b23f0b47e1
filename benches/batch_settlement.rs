//! Benchmarks for batch settlement
//!
//! This benchmark measures:
//! - Fan-out and positional reassembly for growing batch sizes
//! - Partitioning cost with a mix of successes and failures

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use parallel_requests::batch::BatchOrchestrator;
use parallel_requests::transport::from_fn;
use parallel_requests::{RequestDescriptor, Response, Transport, TransportError};

fn instant_transport() -> std::sync::Arc<dyn Transport> {
    from_fn(|req: RequestDescriptor| async move {
        let id = req.extra.get("id").and_then(|v| v.as_u64()).unwrap_or(0);
        if id % 5 == 0 {
            Err(TransportError::Other(format!("item {} failed", id)))
        } else {
            Ok(Response::new(id))
        }
    })
}

fn bench_settlement(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("batch_settlement");

    for size in [10u64, 100, 1_000] {
        let orch: BatchOrchestrator<u64> = rt.block_on(async {
            BatchOrchestrator::builder()
                .transport(instant_transport())
                .build(|id: &u64| RequestDescriptor::new().extra("id", *id))
                .expect("orchestrator")
        });
        let inputs: Vec<u64> = (0..size).collect();

        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &inputs, |b, inputs| {
            b.to_async(&rt).iter(|| async {
                orch.exec(inputs.clone()).expect("exec");
                let snap = orch.settled().await.expect("settled");
                black_box(snap.failure_count())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_settlement);
criterion_main!(benches);
