//! Tests for `src/tail/mod.rs` — cursor placement, rotation detection, and
//! idle reporting, against real files in a temp directory.

use std::io::Write;
use std::path::Path;

use tempfile::TempDir;

use bridgekeeper::tail::{LogTail, TailRead};

fn append(path: &Path, lines: &[&str]) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("open log for append");
    for line in lines {
        writeln!(file, "{line}").expect("append log line");
    }
    file.sync_all().expect("flush log");
}

/// Drain reads until `Idle`, collecting the lines seen on the way.
async fn drain(tail: &mut LogTail) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        match tail.next_read().await {
            TailRead::Line(line) => lines.push(line),
            TailRead::Idle => return lines,
        }
    }
}

#[tokio::test]
async fn existing_content_is_never_re_emitted() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("latest.log");
    append(&path, &["old line one", "old line two"]);

    let mut tail = LogTail::new(path.clone());
    assert_eq!(drain(&mut tail).await, Vec::<String>::new());

    append(&path, &["fresh line"]);
    assert_eq!(drain(&mut tail).await, vec!["fresh line"]);
}

#[tokio::test]
async fn appended_lines_arrive_in_order() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("latest.log");
    append(&path, &[]);

    let mut tail = LogTail::new(path.clone());
    assert_eq!(drain(&mut tail).await, Vec::<String>::new());

    append(&path, &["first", "second", "third"]);
    assert_eq!(drain(&mut tail).await, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn rotation_resumes_at_the_end_of_the_new_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("latest.log");
    append(&path, &["pre-rotation padding, long enough to shrink past"]);

    let mut tail = LogTail::new(path.clone());
    drain(&mut tail).await;

    // Rotation: the file is replaced by a shorter successor. Whatever was
    // in the new file before the tailer notices is skipped by contract.
    std::fs::write(&path, "carried\n").expect("replace log");
    assert_eq!(drain(&mut tail).await, Vec::<String>::new());

    append(&path, &["after rotation"]);
    assert_eq!(drain(&mut tail).await, vec!["after rotation"]);
}

#[tokio::test]
async fn missing_file_reports_idle_until_it_appears() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("latest.log");

    let mut tail = LogTail::new(path.clone());
    assert_eq!(drain(&mut tail).await, Vec::<String>::new());
    assert_eq!(drain(&mut tail).await, Vec::<String>::new());

    append(&path, &["born"]);
    // The file appeared between polls; the tailer opens it at the end and
    // only reports lines appended afterwards.
    drain(&mut tail).await;
    append(&path, &["alive"]);
    assert_eq!(drain(&mut tail).await, vec!["alive"]);
}

#[tokio::test]
async fn deleted_file_reports_idle_then_recovers() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("latest.log");
    append(&path, &["seed"]);

    let mut tail = LogTail::new(path.clone());
    drain(&mut tail).await;

    std::fs::remove_file(&path).expect("delete log");
    assert_eq!(drain(&mut tail).await, Vec::<String>::new());

    append(&path, &["recreated"]);
    drain(&mut tail).await;
    append(&path, &["back in business"]);
    assert_eq!(drain(&mut tail).await, vec!["back in business"]);
}

#[tokio::test]
async fn blank_lines_are_skipped() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("latest.log");
    append(&path, &[]);

    let mut tail = LogTail::new(path.clone());
    drain(&mut tail).await;

    append(&path, &["one", "", "", "two"]);
    assert_eq!(drain(&mut tail).await, vec!["one", "two"]);
}
