//! Audit log benchmark: single-row appends.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use retro_ids::audit::AuditLog;
use retro_ids::detect::DetectionRecord;
use tempfile::tempdir;

fn bench_append(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let log = AuditLog::open(dir.path().join("logs").join("ids_logs.csv")).unwrap();
    let record = DetectionRecord {
        connection_id: "bench".to_string(),
        predicted_label: "dos".to_string(),
        is_attack: true,
        class_index: 0,
        class_probabilities: vec![0.9, 0.1],
        timestamp: Utc::now(),
    };

    c.bench_function("audit_append", |b| {
        b.iter(|| log.append(black_box(&record)).unwrap())
    });
}

criterion_group!(benches, bench_append);
criterion_main!(benches);
