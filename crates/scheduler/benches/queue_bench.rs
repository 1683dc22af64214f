//! 우선순위 대기열 벤치마크
//!
//! 혼합 우선순위 삽입 후 전체 꺼내기 비용을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use logwarden_scheduler::{PriorityQueue, Task, TaskPriority, TaskRequest};

fn make_tasks(n: usize) -> Vec<Task> {
    let priorities = [TaskPriority::Low, TaskPriority::Normal, TaskPriority::High];
    (0..n)
        .map(|i| {
            Task::from_request(TaskRequest::new(
                "classify",
                priorities[i % priorities.len()],
                serde_json::json!({ "log_id": i }),
            ))
        })
        .collect()
}

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("priority_queue");
    for size in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("push_pop", size), &size, |b, &size| {
            b.iter_batched(
                || make_tasks(size),
                |tasks| {
                    let mut queue = PriorityQueue::new();
                    for task in tasks {
                        queue.push(task);
                    }
                    while let Some(task) = queue.pop() {
                        black_box(task);
                    }
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_push_pop);
criterion_main!(benches);
