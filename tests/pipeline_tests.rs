//! Discovery run against an in-memory API: scanning, filtering, enrichment and output.

mod common;

use chrono::{TimeZone, Utc};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::time::sleep;

use banhammer::batch::read_ban_file;
use banhammer::config::ScanStrategy;
use banhammer::pipeline::{collect, run_discovery, DiscoveryOptions};
use banhammer::result_sink::SinkTarget;
use banhammer::scanner::{ScanCursor, ScanParams, StopReason};
use banhammer::{CancelToken, ScanWindow};

use common::fake_api::{channel, join_message, member, summary, text_message, FakeGroupApi};

fn window(from: i64, to: i64) -> ScanWindow {
    ScanWindow::new(
        Utc.timestamp_opt(from, 0).unwrap(),
        Utc.timestamp_opt(to, 0).unwrap(),
    )
}

fn options(strategy: ScanStrategy, page_size: usize) -> DiscoveryOptions {
    DiscoveryOptions {
        scan: ScanParams {
            strategy,
            window: window(100, 200),
            start_offset: 0,
            page_size,
            limit: None,
        },
        channel_capacity: 10,
        fetch_messages: false,
    }
}

fn ids(records: &[banhammer::EnrichedRecord]) -> Vec<i64> {
    records.iter().map(|r| r.subject_id).collect()
}

#[tokio::test]
async fn test_member_listing_advances_offset_by_page_size() {
    let mut fake = FakeGroupApi::new();
    fake.members = (1..=7).map(|id| member(id, 150)).collect();
    let api = Arc::new(fake);

    let mut opts = options(ScanStrategy::MemberListing, 3);
    opts.scan.start_offset = 2;
    let (sink, report) = collect(api.clone(), channel(), opts, CancelToken::new())
        .await
        .unwrap();

    assert_eq!(api.offsets(), vec![2, 5, 8]);
    assert_eq!(report.stop, StopReason::Exhausted);
    assert_eq!(report.cursor, ScanCursor::Offset(8));
    assert_eq!(report.pages, 2);
    assert_eq!(report.items_seen, 5);
    assert_eq!(ids(sink.records()), vec![3, 4, 5, 6, 7]);
}

#[tokio::test]
async fn test_member_listing_window_is_strict() {
    let mut fake = FakeGroupApi::new();
    fake.members = vec![member(1, 100), member(2, 101), member(3, 199), member(4, 200)];
    let api = Arc::new(fake);

    let (sink, _) = collect(
        api,
        channel(),
        options(ScanStrategy::MemberListing, 10),
        CancelToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(ids(sink.records()), vec![2, 3]);
}

#[tokio::test]
async fn test_member_listing_stops_at_limit() {
    let mut fake = FakeGroupApi::new();
    fake.members = (1..=10).map(|id| member(id, 150)).collect();
    let api = Arc::new(fake);

    let mut opts = options(ScanStrategy::MemberListing, 3);
    opts.scan.limit = Some(5);
    let (sink, report) = collect(api.clone(), channel(), opts, CancelToken::new())
        .await
        .unwrap();

    assert_eq!(api.offsets(), vec![0, 3]);
    assert_eq!(report.stop, StopReason::LimitReached);
    assert_eq!(sink.len(), 6);
}

#[tokio::test]
async fn test_fetch_error_ends_scan_but_keeps_earlier_pages() {
    let mut fake = FakeGroupApi::new();
    fake.members = (1..=6).map(|id| member(id, 150)).collect();
    fake.fail_members_at = Some(3);
    let api = Arc::new(fake);

    let (sink, report) = collect(
        api,
        channel(),
        options(ScanStrategy::MemberListing, 3),
        CancelToken::new(),
    )
    .await
    .unwrap();

    assert!(matches!(report.stop, StopReason::FetchFailed(_)));
    assert_eq!(ids(sink.records()), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_scanner_crash_keeps_drained_records() {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("crash.users.csv");
    let mut fake = FakeGroupApi::new();
    fake.members = (1..=6).map(|id| member(id, 150)).collect();
    fake.panic_members_at = Some(3);
    let api = Arc::new(fake);

    let summary = run_discovery(
        api,
        channel(),
        options(ScanStrategy::MemberListing, 3),
        &output,
        CancelToken::new(),
    )
    .await
    .unwrap();

    assert!(matches!(summary.scan.stop, StopReason::TaskFailed(_)));
    assert_eq!(summary.scan.cursor, ScanCursor::Offset(0));
    assert_eq!(summary.records, 3);
    let ids: Vec<i64> = read_ban_file(&output)
        .unwrap()
        .tasks
        .iter()
        .map(|t| t.user.user_id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_join_messages_resolve_each_join_and_drop_failures() {
    let mut fake = FakeGroupApi::new();
    fake.messages = vec![
        join_message(9, 150, 1),
        text_message(8, 140, 1, "hi"),
        join_message(7, 120, 2),
        join_message(6, 100, 3),
        join_message(5, 110, 4),
    ];
    fake.resolvable = [1, 3, 4].into_iter().map(|id| (id, summary(id))).collect();
    let api = Arc::new(fake);

    let (sink, report) = collect(
        api.clone(),
        channel(),
        options(ScanStrategy::JoinMessages, 2),
        CancelToken::new(),
    )
    .await
    .unwrap();

    let offsets: Vec<i64> = api.searches.lock().unwrap().iter().map(|q| q.offset_id).collect();
    assert_eq!(offsets, vec![0, 8, 6, 5]);
    assert_eq!(report.stop, StopReason::Exhausted);
    assert_eq!(*api.lookups.lock().unwrap(), vec![(1, 9), (2, 7), (4, 5)]);
    assert_eq!(ids(sink.records()), vec![1, 4]);

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("join.users.csv");
    assert_eq!(sink.finish(&path).unwrap(), SinkTarget::File(path.clone()));

    let file = read_ban_file(&path).unwrap();
    let pairs: Vec<(i64, i64)> = file
        .tasks
        .iter()
        .map(|t| (t.user.user_id, t.user.access_hash))
        .collect();
    assert_eq!(pairs, vec![(4, 4000), (1, 1000)]);
}

#[tokio::test]
async fn test_join_messages_send_window_to_server() {
    let mut fake = FakeGroupApi::new();
    fake.messages = vec![join_message(3, 150, 1)];
    fake.resolvable.insert(1, summary(1));
    let api = Arc::new(fake);

    collect(api.clone(), channel(), options(ScanStrategy::JoinMessages, 100), CancelToken::new())
        .await
        .unwrap();

    let searches = api.searches.lock().unwrap();
    assert_eq!(searches[0].min_date, 100);
    assert_eq!(searches[0].max_date, 200);
    assert_eq!(searches[0].limit, 100);
}

#[tokio::test]
async fn test_buffered_candidates_survive_cancellation() {
    let cancel = CancelToken::new();
    let gate = Arc::new(Semaphore::new(0));
    let mut fake = FakeGroupApi::new();
    fake.members = (1..=15).map(|id| member(id, 150)).collect();
    fake.cancel_after_pages = Some((2, cancel.clone()));
    fake.message_gate = Some(Arc::clone(&gate));
    let api = Arc::new(fake);

    let mut opts = options(ScanStrategy::MemberListing, 5);
    opts.fetch_messages = true;
    let run = tokio::spawn(collect(api.clone(), channel(), opts, cancel.clone()));

    // Consumer is stuck on the first record while the scanner fills the channel
    while !cancel.is_cancelled() {
        sleep(Duration::from_millis(1)).await;
    }
    sleep(Duration::from_millis(50)).await;
    assert_eq!(*api.message_lookups.lock().unwrap(), vec![1]);
    assert_eq!(api.offsets(), vec![0, 5]);

    gate.add_permits(1);
    let (sink, report) = run.await.unwrap().unwrap();

    assert_eq!(report.stop, StopReason::Cancelled);
    assert_eq!(report.candidates_sent, 10);
    assert_eq!(sink.len(), 10);
    assert_eq!(api.offsets(), vec![0, 5]);
    assert_eq!(api.message_lookups.lock().unwrap().len(), 10);
}

#[tokio::test]
async fn test_cancelled_before_start_fetches_nothing() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut fake = FakeGroupApi::new();
    fake.members = vec![member(1, 150)];
    let api = Arc::new(fake);

    let (sink, report) = collect(
        api.clone(),
        channel(),
        options(ScanStrategy::MemberListing, 5),
        cancel,
    )
    .await
    .unwrap();

    assert_eq!(report.stop, StopReason::Cancelled);
    assert!(api.offsets().is_empty());
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_enrichment_degrades_to_empty_message() {
    let mut fake = FakeGroupApi::new();
    fake.members = vec![member(1, 110), member(2, 120), member(3, 130)];
    fake.last_messages.insert(1, text_message(50, 109, 1, "buy\tnow"));
    fake.last_message_errors.insert(2);
    let api = Arc::new(fake);

    let mut opts = options(ScanStrategy::MemberListing, 10);
    opts.fetch_messages = true;
    let (sink, _) = collect(api, channel(), opts, CancelToken::new())
        .await
        .unwrap();

    let messages: Vec<&str> = sink.records().iter().map(|r| r.last_message.as_str()).collect();
    assert_eq!(messages, vec!["buy\tnow", "", ""]);
    assert_eq!(sink.records()[0].username, "user1");
    assert_eq!(sink.records()[0].language_code, "en");
}

#[tokio::test]
async fn test_messages_not_fetched_when_disabled() {
    let mut fake = FakeGroupApi::new();
    fake.members = vec![member(1, 110)];
    fake.last_messages.insert(1, text_message(50, 109, 1, "hello"));
    let api = Arc::new(fake);

    let (sink, _) = collect(
        api,
        channel(),
        options(ScanStrategy::MemberListing, 10),
        CancelToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(sink.records()[0].last_message, "");
}

#[tokio::test]
async fn test_scan_without_matches_writes_header_only() {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("empty.users.csv");
    let mut fake = FakeGroupApi::new();
    fake.members = vec![member(1, 50), member(2, 250)];
    let api = Arc::new(fake);

    let summary = run_discovery(
        api,
        channel(),
        options(ScanStrategy::MemberListing, 10),
        &output,
        CancelToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.records, 0);
    assert_eq!(summary.target, SinkTarget::File(output.clone()));
    let content = fs::read_to_string(&output).unwrap();
    assert_eq!(content.lines().count(), 1);
    assert!(content.starts_with(common::fixtures::HEADER));
}

#[tokio::test]
async fn test_output_sorted_by_join_time_and_reads_back_as_ban_file() {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("sorted.users.csv");
    let mut fake = FakeGroupApi::new();
    fake.members = vec![member(1, 150), member(2, 120), member(3, 180), member(4, 110)];
    let api = Arc::new(fake);

    let summary = run_discovery(
        api,
        channel(),
        options(ScanStrategy::MemberListing, 2),
        &output,
        CancelToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(summary.records, 4);

    let file = read_ban_file(&output).unwrap();
    let pairs: Vec<(i64, i64)> = file
        .tasks
        .iter()
        .map(|t| (t.user.user_id, t.user.access_hash))
        .collect();
    assert_eq!(pairs, vec![(4, 4000), (2, 2000), (1, 1000), (3, 3000)]);
}
