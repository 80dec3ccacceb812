//! Preprocessing benchmark: fit on a small dataset, then transform-only path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use retro_ids::dataset::{Dataset, Sample};
use retro_ids::features::Preprocessor;

fn training_csv(rows: usize) -> String {
    let protocols = ["tcp", "udp", "icmp"];
    let services = ["http", "ftp", "smtp", "dns"];
    let mut s = String::from("duration,protocol_type,service,src_bytes,dst_bytes,label\n");
    for i in 0..rows {
        let label = if i % 3 == 0 { "dos" } else { "normal" };
        s.push_str(&format!(
            "{},{},{},{},{},{}\n",
            i % 7,
            protocols[i % 3],
            services[i % 4],
            i * 13,
            i * 5,
            label
        ));
    }
    s
}

fn bench_fit(c: &mut Criterion) {
    let ds = Dataset::from_reader(training_csv(1000).as_bytes()).unwrap();
    let pre = Preprocessor::new("label");
    c.bench_function("preprocess_fit_1000", |b| b.iter(|| pre.fit(black_box(&ds)).unwrap()));
}

fn bench_transform_one(c: &mut Criterion) {
    let ds = Dataset::from_reader(training_csv(500).as_bytes()).unwrap();
    let pre = Preprocessor::new("label");
    let artifacts = pre.fit(&ds).unwrap().artifacts;
    let sample = Sample::new()
        .with("duration", 2.0)
        .with("protocol_type", "udp")
        .with("service", "gopher")
        .with("src_bytes", 300.0)
        .with("extra", 1.0);

    c.bench_function("preprocess_transform_one", |b| {
        b.iter(|| pre.transform_one(black_box(&sample), &artifacts).unwrap())
    });
}

criterion_group!(benches, bench_fit, bench_transform_one);
criterion_main!(benches);
