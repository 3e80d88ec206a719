use hevc_queue::engine::{QueueStore, Status};

/// Command-line assertion utilities
#[allow(dead_code)]
pub fn assert_cmd_contains(cmd: &str, flag: &str) {
    assert!(
        cmd.contains(flag),
        "Expected ffmpeg command to contain '{}' but it didn't.\nCommand: {}",
        flag,
        cmd
    );
}

/// Check if a command contains a flag with a specific value
#[allow(dead_code)]
pub fn assert_cmd_has_flag_value(cmd: &str, flag: &str, value: &str) {
    let pattern = format!("{} {}", flag, value);
    assert!(
        cmd.contains(&pattern),
        "Expected ffmpeg command to contain '{} {}' but it didn't.\nCommand: {}",
        flag,
        value,
        cmd
    );
}

/// Check the stored status of one record
#[allow(dead_code)]
pub fn assert_status(store: &QueueStore, path: &str, filename: &str, expected: Status) {
    let record = store
        .get(path, filename)
        .expect("store query failed")
        .unwrap_or_else(|| panic!("no record for {}/{}", path, filename));
    assert_eq!(
        record.status, expected,
        "Unexpected status for {}/{}",
        path, filename
    );
}
