// Whole runs through Session: ephemeral, durable, retry and metadata-only

use crate::common::helpers::{
    FakeEncoder, FakeProbe, MediaTree, RecordingTagWriter, ephemeral_store, schema_path,
};
use hevc_queue::engine::session::{Session, SessionOptions, SessionOutcome};
use hevc_queue::engine::{QueueStore, StoreError};
use tempfile::TempDir;

fn options(tree: &MediaTree) -> SessionOptions {
    SessionOptions {
        root: tree.root(),
        persist: false,
        batch: None,
        transcode: true,
        delete_originals: false,
        retry_failed: false,
        target_tag: "hvc1".to_string(),
    }
}

fn library() -> (MediaTree, FakeProbe) {
    let tree = MediaTree::new();
    tree.add("Alpha.mkv", 2048);
    tree.add("Bravo.mp4", 2048);
    tree.add("Charlie.mp4", 2048);
    let probe = FakeProbe::default()
        .with_tag("Bravo.mp4", "hvc1")
        .with_tag("Charlie.mp4", "avc1");
    (tree, probe)
}

#[test]
fn test_ephemeral_run_with_batch_cap() {
    let (tree, probe) = library();
    let store = ephemeral_store();
    let encoder = FakeEncoder::new(512);
    let tags = RecordingTagWriter::default();

    let session = Session {
        store: &store,
        probe: &probe,
        encoder: &encoder,
        tag_writer: &tags,
        options: SessionOptions {
            batch: Some("1".to_string()),
            ..options(&tree)
        },
    };
    let outcome = session.run().unwrap();

    assert!(outcome.is_success());
    let summary = outcome.summary();
    assert_eq!(summary.counts.done, 1);
    assert_eq!(summary.counts.queued, 1);
    assert_eq!(summary.counts.skipped, 1);
    assert_eq!(summary.session.attempted, 1);
    assert!(tags.calls.borrow().is_empty());
}

#[test]
fn test_empty_tree_is_fatal() {
    let tree = MediaTree::new();
    tree.add("notes.txt", 1);
    let store = ephemeral_store();
    let probe = FakeProbe::default();
    let encoder = FakeEncoder::new(1);
    let tags = RecordingTagWriter::default();

    let session = Session {
        store: &store,
        probe: &probe,
        encoder: &encoder,
        tag_writer: &tags,
        options: options(&tree),
    };
    let err = session.run().unwrap_err();
    assert!(format!("{:#}", err).contains("Is the volume mounted?"));
}

#[test]
fn test_nothing_queued_ends_as_empty_batch() {
    let tree = MediaTree::new();
    tree.add("Done.mp4", 10);
    let probe = FakeProbe::default().with_tag("Done.mp4", "hvc1");
    let store = ephemeral_store();
    let encoder = FakeEncoder::new(1);
    let tags = RecordingTagWriter::default();

    let session = Session {
        store: &store,
        probe: &probe,
        encoder: &encoder,
        tag_writer: &tags,
        options: options(&tree),
    };
    let outcome = session.run().unwrap();

    assert!(matches!(outcome, SessionOutcome::EmptyBatch(_)));
    assert!(!outcome.is_success());
    assert_eq!(outcome.summary().counts.skipped, 1);
    assert_eq!(encoder.attempt_count(), 0);
}

#[test]
fn test_durable_queue_skips_rescan() {
    let (tree, probe) = library();
    let db_dir = TempDir::new().unwrap();
    let db_path = db_dir.path().join("state").join("queue.db");
    let encoder = FakeEncoder::new(512);
    let tags = RecordingTagWriter::default();

    {
        let store = QueueStore::open_durable(&db_path, &schema_path()).unwrap();
        let session = Session {
            store: &store,
            probe: &probe,
            encoder: &encoder,
            tag_writer: &tags,
            options: SessionOptions {
                persist: true,
                batch: Some("1".to_string()),
                ..options(&tree)
            },
        };
        assert_eq!(session.populate().unwrap(), 3);
        session.process().unwrap();
    }

    // a file added between runs is not picked up while the queue has records
    tree.add("Delta.mkv", 2048);
    let store = QueueStore::open_durable(&db_path, &schema_path()).unwrap();
    assert!(!store.is_ephemeral());
    let session = Session {
        store: &store,
        probe: &probe,
        encoder: &encoder,
        tag_writer: &tags,
        options: SessionOptions {
            persist: true,
            ..options(&tree)
        },
    };
    assert_eq!(session.populate().unwrap(), 0);
    let outcome = session.process().unwrap();

    assert_eq!(store.count().unwrap(), 3);
    assert_eq!(outcome.summary().counts.done, 2);
    assert_eq!(outcome.summary().counts.queued, 0);
}

#[test]
fn test_durable_retry_runs_before_batch() {
    let (tree, probe) = library();
    let db_dir = TempDir::new().unwrap();
    let db_path = db_dir.path().join("queue.db");
    let tags = RecordingTagWriter::default();

    let first_encoder = FakeEncoder::new(512).always_failing("Charlie.mp4");
    let store = QueueStore::open_durable(&db_path, &schema_path()).unwrap();
    let first = Session {
        store: &store,
        probe: &probe,
        encoder: &first_encoder,
        tag_writer: &tags,
        options: SessionOptions {
            persist: true,
            ..options(&tree)
        },
    }
    .run()
    .unwrap();
    assert_eq!(first.summary().counts.failed, 1);
    assert_eq!(first.summary().counts.done, 1);

    let second_encoder = FakeEncoder::new(512);
    let second = Session {
        store: &store,
        probe: &probe,
        encoder: &second_encoder,
        tag_writer: &tags,
        options: SessionOptions {
            persist: true,
            retry_failed: true,
            ..options(&tree)
        },
    }
    .run()
    .unwrap();

    // the retry pass converted the failure; the batch itself was empty
    assert!(matches!(second, SessionOutcome::EmptyBatch(_)));
    assert_eq!(second.summary().counts.done, 2);
    assert_eq!(second.summary().counts.failed, 0);
    assert_eq!(second.summary().session.attempted, 1);
}

#[test]
fn test_retry_after_batch_in_same_run() {
    let (tree, probe) = library();
    let store = ephemeral_store();
    let encoder = FakeEncoder::new(512).failing_once("Charlie.mp4");
    let tags = RecordingTagWriter::default();

    let outcome = Session {
        store: &store,
        probe: &probe,
        encoder: &encoder,
        tag_writer: &tags,
        options: SessionOptions {
            retry_failed: true,
            ..options(&tree)
        },
    }
    .run()
    .unwrap();

    let summary = outcome.summary();
    assert_eq!(summary.counts.done, 2);
    assert_eq!(summary.counts.failed, 0);
    assert_eq!(summary.session.attempted, 3);
    assert_eq!(summary.session.failed, 1);
}

#[test]
fn test_metadata_only_pass_retags_mp4s() {
    let (tree, probe) = library();
    let store = ephemeral_store();
    let encoder = FakeEncoder::new(512);
    let tags = RecordingTagWriter::default();

    let outcome = Session {
        store: &store,
        probe: &probe,
        encoder: &encoder,
        tag_writer: &tags,
        options: SessionOptions {
            transcode: false,
            ..options(&tree)
        },
    }
    .run()
    .unwrap();

    match outcome {
        SessionOutcome::Retagged { retag, summary } => {
            assert_eq!(retag.updated, 2);
            assert_eq!(retag.not_mp4, 1);
            assert_eq!(summary.counts.queued, 2);
        }
        other => panic!("expected metadata pass, got {:?}", other),
    }
    assert_eq!(encoder.attempt_count(), 0);

    let titles: Vec<String> = tags.calls.borrow().iter().map(|(_, t)| t.clone()).collect();
    assert_eq!(titles, vec!["Bravo".to_string(), "Charlie".to_string()]);
}

#[test]
fn test_missing_schema_is_fatal() {
    let dir = TempDir::new().unwrap();
    let err = QueueStore::open_ephemeral(&dir.path().join("schema.sql")).unwrap_err();
    assert!(matches!(err, StoreError::SchemaMissing(_)));

    let err = QueueStore::open_durable(&dir.path().join("q.db"), &dir.path().join("nope.sql"))
        .unwrap_err();
    assert!(err.to_string().contains("Schema file not found"));
}
