// Discovery → classification → queue → conversion → retry, with fake tools

use crate::common::assertions::assert_status;
use crate::common::helpers::{FakeEncoder, FakeProbe, MediaTree, ephemeral_store};
use hevc_queue::engine::probe::classify_all;
use hevc_queue::engine::worker::{ConversionWorker, retry_failed};
use hevc_queue::engine::{ConvertFlag, QueueRecord, Status, resolve_batch_limit, scan};
use hevc_queue::summary::StatusCounts;
use proptest::prelude::*;
use std::fs;

fn three_file_tree() -> (MediaTree, FakeProbe) {
    let tree = MediaTree::new();
    tree.add("movies/Alpha.mkv", 4096);
    tree.add("movies/Bravo.mp4", 4096);
    tree.add("movies/Charlie.mp4", 4096);
    let probe = FakeProbe::default()
        .with_tag("Bravo.mp4", "hvc1")
        .with_tag("Charlie.mp4", "avc1");
    (tree, probe)
}

#[test]
fn test_three_files_batch_of_one() {
    let (tree, probe) = three_file_tree();
    let store = ephemeral_store();

    let files = scan(&tree.root()).unwrap();
    let records = classify_all(files, &probe, "hvc1");
    let report = store.insert_many(&records).unwrap();
    assert_eq!(report.inserted, 3);

    let limit = resolve_batch_limit(Some("1"));
    let batch = store.select_batch(limit).unwrap();
    assert_eq!(batch.len(), 1);
    assert!(
        batch
            .iter()
            .all(|r| r.status == Status::Queued && r.convert == ConvertFlag::Yes)
    );

    let encoder = FakeEncoder::new(1024);
    let worker = ConversionWorker::new(&store, &encoder, false);
    let session = worker.convert_all(&batch);
    assert_eq!(session.done, 1);
    assert_eq!(session.bytes_recovered, 4096 - 1024);

    let counts = StatusCounts::load(&store).unwrap();
    assert_eq!(counts.done, 1);
    assert_eq!(counts.queued, 1);
    assert_eq!(counts.skipped, 1);
    assert_eq!(counts.failed, 0);
    assert_eq!(counts.unknown, 0);
    assert_eq!(
        counts.to_string(),
        "1 done, 0 failed, 1 queued, 1 skipped, 0 unknown."
    );
}

#[test]
fn test_failed_conversion_cleans_up_then_retry_succeeds() {
    let (tree, probe) = three_file_tree();
    let store = ephemeral_store();
    let records = classify_all(scan(&tree.root()).unwrap(), &probe, "hvc1");
    store.insert_many(&records).unwrap();

    let dir = tree.dir_key("movies");
    let encoder = FakeEncoder::new(1024).failing_once("Charlie.mp4");
    let worker = ConversionWorker::new(&store, &encoder, false);

    let batch = store.select_batch(None).unwrap();
    assert_eq!(batch.len(), 2);
    let first = worker.convert_all(&batch);
    assert_eq!(first.done, 1);
    assert_eq!(first.failed, 1);

    assert_status(&store, &dir, "Charlie.mp4", Status::Failed);
    let partial = tree.root().join("movies/Charlie.h265");
    assert!(!partial.exists(), "partial output must be removed");

    let retry = retry_failed(&store, &worker).unwrap();
    assert_eq!(retry.attempted, 1);
    assert_eq!(retry.done, 1);
    assert_status(&store, &dir, "Charlie.mp4", Status::Done);
    assert!(partial.exists());

    // nothing left to retry, and done/skipped never come back
    assert!(store.select_failed().unwrap().is_empty());
    assert_eq!(retry_failed(&store, &worker).unwrap().attempted, 0);
    assert_eq!(encoder.attempt_count(), 3);
}

#[test]
fn test_retry_is_a_single_pass() {
    let (tree, probe) = three_file_tree();
    let store = ephemeral_store();
    store
        .insert_many(&classify_all(scan(&tree.root()).unwrap(), &probe, "hvc1"))
        .unwrap();

    let encoder = FakeEncoder::new(1024).always_failing("Charlie.mp4");
    let worker = ConversionWorker::new(&store, &encoder, false);
    worker.convert_all(&store.select_batch(None).unwrap());

    let retry = retry_failed(&store, &worker).unwrap();
    assert_eq!(retry.attempted, 1);
    assert_eq!(retry.failed, 1);

    let failed = store.select_failed().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].filename, "Charlie.mp4");
}

#[test]
fn test_duplicate_insert_keeps_existing_state() {
    let store = ephemeral_store();
    let record = QueueRecord {
        path: "/mnt/tv".to_string(),
        filename: "Pilot.mkv".to_string(),
        convert: ConvertFlag::Yes,
        status: Status::Queued,
    };

    assert_eq!(store.insert_many(&[record.clone()]).unwrap().inserted, 1);
    assert!(store.update_status("/mnt/tv", "Pilot.mkv", Status::Done));

    let again = store.insert_many(&[record.clone(), record.clone()]).unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(again.duplicates, 2);
    assert_eq!(store.count().unwrap(), 1);
    assert_status(&store, "/mnt/tv", "Pilot.mkv", Status::Done);

    assert!(store.insert(&record).is_err());
}

#[test]
fn test_rescan_does_not_duplicate() {
    let (tree, probe) = three_file_tree();
    let store = ephemeral_store();

    for _ in 0..2 {
        let records = classify_all(scan(&tree.root()).unwrap(), &probe, "hvc1");
        store.insert_many(&records).unwrap();
    }
    assert_eq!(store.count().unwrap(), 3);
}

#[test]
fn test_replace_originals_after_success() {
    let (tree, probe) = three_file_tree();
    let store = ephemeral_store();
    store
        .insert_many(&classify_all(scan(&tree.root()).unwrap(), &probe, "hvc1"))
        .unwrap();

    let encoder = FakeEncoder::new(100);
    let worker = ConversionWorker::new(&store, &encoder, true);
    let report = worker.convert_all(&store.select_batch(None).unwrap());
    assert_eq!(report.done, 2);

    let movies = tree.root().join("movies");
    // mkv: original removed, converted mp4 stands in its place
    assert!(!movies.join("Alpha.mkv").exists());
    assert_eq!(fs::metadata(movies.join("Alpha.mp4")).unwrap().len(), 100);
    // mp4: intermediate renamed over the original
    assert!(!movies.join("Charlie.h265").exists());
    assert_eq!(fs::metadata(movies.join("Charlie.mp4")).unwrap().len(), 100);
    // skipped file untouched
    assert_eq!(fs::metadata(movies.join("Bravo.mp4")).unwrap().len(), 4096);
}

#[test]
fn test_existing_output_is_left_alone_and_record_fails() {
    let tree = MediaTree::new();
    tree.add("Film.mkv", 2048);
    tree.add("Film.mp4", 512);
    let probe = FakeProbe::default().with_tag("Film.mp4", "hvc1");
    let store = ephemeral_store();
    store
        .insert_many(&classify_all(scan(&tree.root()).unwrap(), &probe, "hvc1"))
        .unwrap();

    let dir = tree.dir_key("");
    assert_status(&store, &dir, "Film.mp4", Status::Skipped);

    let encoder = FakeEncoder::new(100).always_failing("Film.mkv");
    let worker = ConversionWorker::new(&store, &encoder, true);
    let report = worker.convert_all(&store.select_batch(None).unwrap());
    assert_eq!(report.attempted, 1);
    assert_eq!(report.failed, 1);

    // the encoder never ran, and neither file was touched
    assert_eq!(encoder.attempt_count(), 0);
    assert_eq!(fs::metadata(tree.root().join("Film.mp4")).unwrap().len(), 512);
    assert_eq!(fs::metadata(tree.root().join("Film.mkv")).unwrap().len(), 2048);
    assert_status(&store, &dir, "Film.mkv", Status::Failed);
    assert_status(&store, &dir, "Film.mp4", Status::Skipped);

    // a retry hits the same collision
    let retry = retry_failed(&store, &worker).unwrap();
    assert_eq!(retry.failed, 1);
    assert_eq!(encoder.attempt_count(), 0);
    assert!(tree.root().join("Film.mp4").exists());
}

#[test]
fn test_unprobeable_mp4_is_unknown_and_never_selected() {
    let tree = MediaTree::new();
    tree.add("Broken.mp4", 10);
    tree.add("Odd.mp4", 10);
    let probe = FakeProbe::default()
        .with_tag("Odd.mp4", "")
        .with_container("Odd.mp4", "matroska,webm");
    let store = ephemeral_store();

    store
        .insert_many(&classify_all(scan(&tree.root()).unwrap(), &probe, "hvc1"))
        .unwrap();

    let dir = tree.dir_key("");
    assert_status(&store, &dir, "Broken.mp4", Status::Unknown);
    assert_status(&store, &dir, "Odd.mp4", Status::Queued);

    let batch = store.select_batch(None).unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].filename, "Odd.mp4");
}

fn arb_status() -> impl Strategy<Value = Status> {
    prop::sample::select(Status::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn proptest_aggregate_counts_sum_to_total(
        statuses in prop::collection::vec((arb_status(), any::<bool>()), 0..30)
    ) {
        let store = ephemeral_store();
        let records: Vec<QueueRecord> = statuses
            .iter()
            .enumerate()
            .map(|(i, (status, convert))| QueueRecord {
                path: "/mnt/lib".to_string(),
                filename: format!("file{:03}.mp4", i),
                convert: if *convert { ConvertFlag::Yes } else { ConvertFlag::No },
                status: *status,
            })
            .collect();
        store.insert_many(&records).unwrap();

        let counts = store.aggregate_by_status().unwrap();
        prop_assert_eq!(counts.len(), Status::ALL.len());
        prop_assert_eq!(counts.values().sum::<u64>(), records.len() as u64);
        prop_assert_eq!(StatusCounts::from_aggregate(&counts).total(), store.count().unwrap());
    }

    #[test]
    fn proptest_select_batch_respects_limit_and_filter(
        statuses in prop::collection::vec((arb_status(), any::<bool>()), 0..30),
        limit in prop::option::of(1usize..10)
    ) {
        let store = ephemeral_store();
        let records: Vec<QueueRecord> = statuses
            .iter()
            .enumerate()
            .map(|(i, (status, convert))| QueueRecord {
                path: "/mnt/lib".to_string(),
                filename: format!("file{:03}.mkv", i),
                convert: if *convert { ConvertFlag::Yes } else { ConvertFlag::No },
                status: *status,
            })
            .collect();
        store.insert_many(&records).unwrap();

        let eligible = records
            .iter()
            .filter(|r| r.status == Status::Queued && r.convert == ConvertFlag::Yes)
            .count();
        let batch = store.select_batch(limit).unwrap();

        prop_assert_eq!(batch.len(), limit.map_or(eligible, |l| eligible.min(l)));
        prop_assert!(batch.iter().all(|r| r.status == Status::Queued && r.convert == ConvertFlag::Yes));
    }
}
