//! Artifact store: save/load, missing and corrupt files.

use retro_ids::{
    artifacts::{
        ArtifactStore, ENCODERS_FILE, MANIFEST_FILE, MODEL_FILE, SCALER_FILE, SCHEMA_FILE,
    },
    config::IdsConfig,
    dataset::Dataset,
    detect::DetectionSession,
    features::Preprocessor,
    model::MlpClassifier,
    ArtifactSet, IdsError,
};
use serde_json::json;

const TRAINING: &str = "\
duration,protocol_type,flag,src_bytes,label
0,tcp,SF,181,normal
0,udp,SF,105,normal
0,icmp,REJ,1032,smurf
2,tcp,S0,0,neptune
";

fn fitted() -> ArtifactSet {
    let ds = Dataset::from_reader(TRAINING.as_bytes()).unwrap();
    Preprocessor::new("label").fit(&ds).unwrap().artifacts
}

fn saved_store(dir: &std::path::Path) -> (ArtifactStore, ArtifactSet) {
    let store = ArtifactStore::new(dir.join("models"));
    let set = fitted();
    let model = MlpClassifier::new(set.schema.len(), &[4], 3, 1).unwrap();
    store.save(&set, &model).unwrap();
    (store, set)
}

#[test]
fn save_then_load_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    let (store, set) = saved_store(dir.path());
    assert!(store.exists());
    let loaded = store.load().unwrap();
    assert_eq!(loaded.schema, set.schema);
    assert_eq!(loaded.encoders, set.encoders);
    for (a, b) in loaded.scaler.mean().iter().zip(set.scaler.mean()) {
        assert!((a - b).abs() < 1e-9);
    }
    assert_eq!(loaded.scaler.n_features(), set.scaler.n_features());

    let manifest = store.manifest().unwrap();
    assert_eq!(manifest.feature_count, 4);
    assert_eq!(manifest.schema_fingerprint, set.schema.fingerprint());
    assert_eq!(manifest.files.len(), 4);
    assert!(manifest.files.contains_key(MODEL_FILE));

    let model: MlpClassifier = store.load_model().unwrap();
    assert_eq!(model.layer_sizes(), vec![4, 4, 3]);
}

#[test]
fn each_missing_file_is_reported() {
    for file in [SCALER_FILE, ENCODERS_FILE, SCHEMA_FILE, MANIFEST_FILE] {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = saved_store(dir.path());
        std::fs::remove_file(store.path(file)).unwrap();
        match store.load() {
            Err(IdsError::ArtifactMissing(p)) => assert_eq!(p, store.path(file)),
            other => panic!("{}: expected missing, got {:?}", file, other),
        }
    }
}

#[test]
fn missing_model_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = saved_store(dir.path());
    std::fs::remove_file(store.path(MODEL_FILE)).unwrap();
    assert!(!store.exists());
    assert!(matches!(
        store.load_model::<MlpClassifier>(),
        Err(IdsError::ArtifactMissing(_))
    ));
}

#[test]
fn garbage_file_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = saved_store(dir.path());
    std::fs::write(store.path(MANIFEST_FILE), b"not json").unwrap();
    assert!(matches!(store.load(), Err(IdsError::ArtifactCorrupt { .. })));
}

#[test]
fn tampered_file_fails_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = saved_store(dir.path());
    let path = store.path(SCHEMA_FILE);
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, text.replace("src_bytes", "dst_bytes")).unwrap();
    match store.load() {
        Err(e @ IdsError::ArtifactCorrupt { .. }) => assert!(e.is_artifact_error()),
        other => panic!("expected corrupt, got {:?}", other),
    }
}

#[test]
fn wrong_kind_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = saved_store(dir.path());
    std::fs::copy(store.path(SCALER_FILE), store.path(MODEL_FILE)).unwrap();
    assert!(matches!(
        store.load_model::<MlpClassifier>(),
        Err(IdsError::ArtifactCorrupt { .. })
    ));
}

fn open_with_model(model: serde_json::Value) -> (tempfile::TempDir, IdsConfig, ArtifactStore) {
    let dir = tempfile::tempdir().unwrap();
    let config = IdsConfig::with_data_dir(dir.path());
    let store = ArtifactStore::new(config.artifacts_dir());
    store.save(&fitted(), &model).unwrap();
    (dir, config, store)
}

fn assert_model_corrupt(config: &IdsConfig, store: &ArtifactStore) {
    match DetectionSession::open(config) {
        Err(IdsError::ArtifactCorrupt { path, .. }) => assert_eq!(path, store.path(MODEL_FILE)),
        Err(e) => panic!("expected corrupt model, got {}", e),
        Ok(_) => panic!("session opened with an unusable model"),
    }
}

#[test]
fn model_without_layers_is_corrupt() {
    let (_dir, config, store) = open_with_model(json!({
        "layers": [],
        "n_features": 4,
        "n_classes": 3
    }));
    assert_model_corrupt(&config, &store);
}

#[test]
fn model_with_unchained_layers_is_corrupt() {
    let (_dir, config, store) = open_with_model(json!({
        "layers": [{
            "weights": {"v": 1, "dim": [3, 2], "data": [0.1, 0.2, 0.3, 0.4, 0.5, 0.6]},
            "bias": {"v": 1, "dim": [2], "data": [0.0, 0.0]}
        }],
        "n_features": 4,
        "n_classes": 2
    }));
    assert_model_corrupt(&config, &store);
}

#[test]
fn model_from_another_run_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path().join("models"));
    let set = fitted();
    store
        .save(&set, &MlpClassifier::new(4, &[4], 3, 1).unwrap())
        .unwrap();
    let earlier = std::fs::read(store.path(MODEL_FILE)).unwrap();
    store
        .save(&set, &MlpClassifier::new(4, &[8], 3, 2).unwrap())
        .unwrap();

    std::fs::write(store.path(MODEL_FILE), earlier).unwrap();
    assert!(store.load().is_ok());
    assert!(matches!(
        store.load_model::<MlpClassifier>(),
        Err(IdsError::ArtifactCorrupt { .. })
    ));
}
