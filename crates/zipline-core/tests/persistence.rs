use zipline_core::{AddOutcome, ClusterError, Clustering, ClusteringConfig, ClusteringSnapshot};

fn lines() -> Vec<String> {
    let mut out = Vec::new();
    for i in 0..30 {
        out.push(format!("request {i} served from cache in ms"));
        out.push("worker pool exhausted, queue length over limit".to_string());
        out.push(format!("user u{i} changed password"));
    }
    out
}

#[test]
fn state_file_round_trip_resumes_clustering() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("state.json");

    let config = ClusteringConfig {
        max_parallelism: 2,
        ..ClusteringConfig::default()
    };
    let mut engine = Clustering::new(config).expect("engine");
    for (i, line) in lines().iter().enumerate() {
        engine.add_item(&format!("L{i}"), line).expect("add");
    }
    std::fs::write(&path, engine.to_json().expect("encode")).expect("write");

    let json = std::fs::read_to_string(&path).expect("read");
    let mut resumed = Clustering::from_json(&json).expect("decode");
    assert_eq!(resumed.cluster_item_ids(), engine.cluster_item_ids());
    assert_eq!(resumed.config().max_parallelism, 2);

    let owner = resumed.cluster_of("L1").map(|c| c.id()).expect("owner");
    let outcome = resumed
        .add_item("next", "worker pool exhausted, queue length over limit")
        .expect("add");
    assert_eq!(outcome.cluster(), Some(owner));
    assert_eq!(resumed.item_count(), engine.item_count() + 1);
}

#[test]
fn finalize_rejects_a_vocabulary_that_lost_tokens() {
    let mut engine = Clustering::new(ClusteringConfig::default()).expect("engine");
    engine.add_item("a", "gamma delta epsilon").expect("add");
    let mut snapshot: ClusteringSnapshot = engine.snapshot();
    snapshot.vocabulary.remove("delta");

    let err = snapshot.finalize().expect_err("missing token");
    assert!(matches!(err, ClusterError::TokenNotFound { .. }), "{err:?}");
    assert_eq!(err.code().code(), "ZL1001");
}

#[test]
fn persisted_config_is_validated() {
    let engine = Clustering::new(ClusteringConfig::default()).expect("engine");
    let mut snapshot = engine.snapshot();
    snapshot.config.min_cluster_affinity = 2.0;
    assert!(matches!(
        snapshot.finalize(),
        Err(ClusterError::InvalidConfig(_))
    ));
}

#[test]
fn duplicate_content_is_stored_once_per_cluster() {
    let mut engine = Clustering::new(ClusteringConfig::default()).expect("engine");
    for i in 0..10 {
        let outcome = engine
            .add_item(&format!("d{i}"), "the same line over and over")
            .expect("add");
        if i > 0 {
            assert!(matches!(outcome, AddOutcome::Admitted { .. }));
        }
    }
    let snapshot = engine.snapshot();
    let hashes = snapshot.clusters[0]
        .items
        .values()
        .filter(|i| i.hash.is_some())
        .count();
    assert_eq!(hashes, 1);
}
