//! Audit log: header handling, concurrent appends, summary.

use chrono::Utc;
use retro_ids::{
    audit::{AuditLog, AUDIT_HEADER},
    detect::{DetectionRecord, Verdict},
    model::is_attack_label,
};
use std::sync::Arc;
use std::thread;

fn record(id: &str, label: &str) -> DetectionRecord {
    DetectionRecord {
        connection_id: id.to_string(),
        predicted_label: label.to_string(),
        is_attack: is_attack_label(label),
        class_index: 0,
        class_probabilities: vec![1.0],
        timestamp: Utc::now(),
    }
}

#[test]
fn header_written_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = AuditLog::open(dir.path().join("logs").join("ids_logs.csv")).unwrap();
    assert!(log.entries().unwrap().is_empty());

    log.append(&record("c1", "normal")).unwrap();
    log.append(&record("c2", "dos")).unwrap();

    let text = std::fs::read_to_string(log.path()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], AUDIT_HEADER.join(","));
    assert!(lines[1].ends_with(",c1,normal,normal"));
    assert!(lines[2].ends_with(",c2,dos,attack"));
}

#[test]
fn reopening_appends_without_new_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ids_logs.csv");
    AuditLog::open(&path).unwrap().append(&record("a", "normal")).unwrap();
    AuditLog::open(&path).unwrap().append(&record("b", "probe")).unwrap();

    let entries = AuditLog::open(&path).unwrap().entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].connection_id, "a");
    assert_eq!(entries[1].result, Verdict::Attack);
}

#[test]
fn concurrent_appends_stay_well_formed() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(AuditLog::open(dir.path().join("ids_logs.csv")).unwrap());
    let threads = 8;
    let per_thread = 25;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for i in 0..per_thread {
                    let label = if i % 2 == 0 { "normal" } else { "smurf, variant" };
                    log.append(&record(&format!("t{}-{}", t, i), label)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let text = std::fs::read_to_string(log.path()).unwrap();
    assert_eq!(text.lines().filter(|l| *l == AUDIT_HEADER.join(",")).count(), 1);
    let entries = log.entries().unwrap();
    assert_eq!(entries.len(), threads * per_thread);
    for e in &entries {
        assert!(!e.timestamp.is_empty());
        assert_eq!(e.result == Verdict::Attack, e.label != "normal");
    }
}

#[test]
fn summary_counts_verdicts_and_labels() {
    let dir = tempfile::tempdir().unwrap();
    let log = AuditLog::open(dir.path().join("ids_logs.csv")).unwrap();
    for (id, label) in [("1", "normal"), ("2", "dos"), ("3", "dos"), ("4", "Normal")] {
        log.append(&record(id, label)).unwrap();
    }
    let s = log.summary().unwrap();
    assert_eq!(s.total, 4);
    assert_eq!(s.normal, 2);
    assert_eq!(s.attacks, 2);
    assert_eq!(s.by_label.get("dos"), Some(&2));
}
