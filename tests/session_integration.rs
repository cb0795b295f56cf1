//! End-to-end sessions against a mock listing server.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dirpull::history::SYSTEM_URL;
use dirpull::{
    ExtensionFilter, HistorySink, HistoryStatus, MemoryHistory, ProgressCounters, SessionConfig,
    SessionController, SessionOutcome, SessionRunState,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::trickle::{FILE_NAME, LISTING_PATH, TrickleServer};
use support::{controller, fast_options, mount_file, mount_head, mount_listing, session_config};

async fn wait_for_state(controller: &SessionController, wanted: SessionRunState) {
    let mut rx = controller.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|state| *state == wanted))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
}

async fn wait_for_bytes(controller: &SessionController, at_least: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while controller.counters().downloaded_bytes < at_least {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("transfer never moved bytes");
}

/// Waits for the session while sampling the live counters.
async fn finish_sampled(controller: &SessionController) -> (SessionOutcome, Vec<ProgressCounters>) {
    let mut samples = Vec::new();
    let wait = tokio::time::timeout(Duration::from_secs(10), controller.wait());
    tokio::pin!(wait);
    let outcome = loop {
        tokio::select! {
            done = &mut wait => break done.expect("session did not finish"),
            () = tokio::time::sleep(Duration::from_millis(5)) => samples.push(controller.counters()),
        }
    };
    (outcome.expect("session produced no outcome"), samples)
}

fn trickle_config(server: &TrickleServer, destination: &Path) -> SessionConfig {
    SessionConfig::new(
        &format!("{}{LISTING_PATH}", server.uri()),
        0,
        ExtensionFilter::parse(".bsp").unwrap(),
        destination,
    )
    .unwrap()
}

/// Eight 64-byte pieces, 120 ms apart.
async fn trickle() -> TrickleServer {
    let pieces = (0..8u8).map(|i| vec![i; 64]).collect();
    TrickleServer::start(pieces, Duration::from_millis(120)).await
}

async fn finish(controller: &SessionController) -> SessionOutcome {
    tokio::time::timeout(Duration::from_secs(10), controller.wait())
        .await
        .expect("session did not finish")
        .expect("session produced no outcome")
}

#[tokio::test]
async fn test_session_mirrors_tree_and_counts_totals() {
    let server = MockServer::start().await;
    mount_listing(&server, "/maps/", &["a.bsp", "readme.txt", "sub/"]).await;
    mount_listing(&server, "/maps/sub/", &["b.bz2", "deeper/"]).await;
    mount_listing(&server, "/maps/sub/deeper/", &["c.bsp"]).await;
    mount_file(&server, "/maps/a.bsp", &[1u8; 10]).await;
    mount_file(&server, "/maps/sub/b.bz2", &[2u8; 20]).await;
    mount_file(&server, "/maps/sub/deeper/c.bsp", &[3u8; 40]).await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("SCRAPE_test");
    let history = Arc::new(MemoryHistory::new());
    let controller = controller(
        fast_options(4, 3),
        Arc::clone(&history) as Arc<dyn HistorySink>,
    );

    controller
        .start(session_config(&server, "/maps/", 1, ".bsp,.bz2", &dest))
        .unwrap();
    let outcome = finish(&controller).await;

    assert_eq!(outcome, SessionOutcome::Completed { files: 2 });
    assert_eq!(controller.state(), SessionRunState::Completed);
    assert_eq!(controller.status_message(), outcome.message());

    let counters = controller.counters();
    assert_eq!(counters.total_files, 2);
    assert_eq!(counters.total_bytes, 30);
    assert_eq!(counters.downloaded_files, 2);
    assert_eq!(counters.downloaded_bytes, 30);
    assert_eq!(counters.failed_files, 0);

    assert_eq!(std::fs::read(dest.join("a.bsp")).unwrap(), vec![1u8; 10]);
    assert_eq!(std::fs::read(dest.join("sub/b.bz2")).unwrap(), vec![2u8; 20]);
    assert!(!dest.join("readme.txt").exists());
    assert!(!dest.join("sub/deeper").exists());

    let url = format!("{}/maps/sub/b.bz2", server.uri());
    let statuses: Vec<_> = history
        .events_for(&url)
        .into_iter()
        .map(|e| e.status)
        .collect();
    assert_eq!(statuses, vec![HistoryStatus::Started, HistoryStatus::Completed]);
}

#[tokio::test]
async fn test_empty_tree_completes_with_zero_files() {
    let server = MockServer::start().await;
    mount_listing(&server, "/maps/", &["notes.txt"]).await;

    let temp = TempDir::new().unwrap();
    let controller = controller(fast_options(4, 3), Arc::new(MemoryHistory::new()));
    controller
        .start(session_config(&server, "/maps/", 2, ".bsp", temp.path()))
        .unwrap();

    assert_eq!(finish(&controller).await, SessionOutcome::Completed { files: 0 });
    assert_eq!(controller.counters().total_files, 0);
}

#[tokio::test]
async fn test_transient_failure_is_recovered_in_first_round() {
    let server = MockServer::start().await;
    mount_listing(&server, "/maps/", &["flaky.bsp"]).await;
    mount_head(&server, "/maps/flaky.bsp", 8).await;
    Mock::given(method("GET"))
        .and(path("/maps/flaky.bsp"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/maps/flaky.bsp"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 8]))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let controller = controller(fast_options(2, 3), Arc::new(MemoryHistory::new()));
    controller
        .start(session_config(&server, "/maps/", 0, ".bsp", temp.path()))
        .unwrap();

    assert_eq!(finish(&controller).await, SessionOutcome::Completed { files: 1 });

    let report = controller.retry_report();
    assert_eq!(report.rounds.len(), 1);
    let url = url::Url::parse(&format!("{}/maps/flaky.bsp", server.uri())).unwrap();
    assert_eq!(report.attempts_for(&url), 1);
    assert!(controller.failures().is_empty());

    let counters = controller.counters();
    assert_eq!(counters.failed_files, 0);
    assert_eq!(counters.downloaded_bytes, 8);
    assert_eq!(std::fs::read(temp.path().join("flaky.bsp")).unwrap(), vec![7u8; 8]);
}

#[tokio::test]
async fn test_persistent_failure_is_reported_after_all_rounds() {
    let server = MockServer::start().await;
    mount_listing(&server, "/maps/", &["good.bsp", "broken.bsp"]).await;
    mount_file(&server, "/maps/good.bsp", b"fine").await;
    mount_head(&server, "/maps/broken.bsp", 4).await;
    Mock::given(method("GET"))
        .and(path("/maps/broken.bsp"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let controller = controller(fast_options(2, 2), Arc::new(MemoryHistory::new()));
    controller
        .start(session_config(&server, "/maps/", 0, ".bsp", temp.path()))
        .unwrap();

    let outcome = finish(&controller).await;
    assert_eq!(
        outcome,
        SessionOutcome::CompletedWithFailures { files: 1, failed: 1 }
    );
    assert_eq!(controller.state(), SessionRunState::CompletedWithFailures);

    let failures = controller.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].task.source_url().path().ends_with("broken.bsp"));
    assert_eq!(controller.counters().failed_files, 1);
    assert!(!temp.path().join("broken.bsp").exists());
}

#[tokio::test]
async fn test_cancel_during_download_removes_partial_and_logs_marker() {
    let server = MockServer::start().await;
    mount_listing(&server, "/maps/", &["slow.bsp"]).await;
    mount_head(&server, "/maps/slow.bsp", 16).await;
    Mock::given(method("GET"))
        .and(path("/maps/slow.bsp"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 16])
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let history = Arc::new(MemoryHistory::new());
    let controller = controller(
        fast_options(1, 3),
        Arc::clone(&history) as Arc<dyn HistorySink>,
    );
    controller
        .start(session_config(&server, "/maps/", 0, ".bsp", temp.path()))
        .unwrap();

    wait_for_state(&controller, SessionRunState::Downloading).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(controller.cancel());
    assert!(!controller.cancel());

    let outcome = tokio::time::timeout(Duration::from_secs(2), controller.wait())
        .await
        .expect("cancellation must not wait for the slow response")
        .unwrap();
    assert_eq!(outcome, SessionOutcome::Cancelled { files: 0 });
    assert_eq!(controller.state(), SessionRunState::Cancelled);
    assert!(!temp.path().join("slow.bsp").exists());

    let system = history.events_for(SYSTEM_URL);
    assert_eq!(system.len(), 1);
    assert_eq!(system[0].status, HistoryStatus::Cancelled);
}

#[tokio::test]
async fn test_pause_holds_transfer_until_resume() {
    let server = MockServer::start().await;
    mount_listing(&server, "/maps/", &["held.bsp"]).await;
    mount_head(&server, "/maps/held.bsp", 12).await;
    Mock::given(method("GET"))
        .and(path("/maps/held.bsp"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![5u8; 12])
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let controller = controller(fast_options(1, 0), Arc::new(MemoryHistory::new()));
    controller
        .start(session_config(&server, "/maps/", 0, ".bsp", temp.path()))
        .unwrap();

    wait_for_state(&controller, SessionRunState::Downloading).await;
    assert!(controller.pause());
    assert_eq!(controller.state(), SessionRunState::Paused);
    assert_eq!(controller.status_message(), "Download paused");

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(controller.state(), SessionRunState::Paused);
    assert_eq!(controller.counters().downloaded_bytes, 0);
    assert_eq!(controller.counters().downloaded_files, 0);

    assert!(controller.resume());
    assert!(!controller.resume());
    assert_eq!(finish(&controller).await, SessionOutcome::Completed { files: 1 });
    assert_eq!(controller.counters().downloaded_bytes, 12);
}

#[tokio::test]
async fn test_start_rejected_while_active_and_allowed_after_finish() {
    let server = MockServer::start().await;
    mount_listing(&server, "/maps/", &["a.bsp"]).await;
    mount_head(&server, "/maps/a.bsp", 3).await;
    Mock::given(method("GET"))
        .and(path("/maps/a.bsp"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"abc".to_vec())
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let controller = controller(fast_options(1, 0), Arc::new(MemoryHistory::new()));
    controller
        .start(session_config(&server, "/maps/", 0, ".bsp", &temp.path().join("one")))
        .unwrap();

    let second = controller.start(session_config(
        &server,
        "/maps/",
        0,
        ".bsp",
        &temp.path().join("two"),
    ));
    assert!(matches!(
        second,
        Err(dirpull::SessionError::AlreadyActive { .. })
    ));

    assert_eq!(finish(&controller).await, SessionOutcome::Completed { files: 1 });

    controller
        .start(session_config(&server, "/maps/", 0, ".bsp", &temp.path().join("two")))
        .unwrap();
    assert_eq!(finish(&controller).await, SessionOutcome::Completed { files: 1 });
    assert_eq!(controller.counters().downloaded_files, 1);
    assert!(temp.path().join("two/a.bsp").exists());
}

#[tokio::test]
async fn test_skip_count_grows_totals_during_download() {
    let server = MockServer::start().await;
    mount_listing(&server, "/maps/", &["a.bsp", "b.bsp"]).await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/maps/a.bsp"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 6]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/maps/b.bsp"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 4]))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let mut options = fast_options(2, 0);
    options.skip_count_pass = true;
    let controller = controller(options, Arc::new(MemoryHistory::new()));
    controller
        .start(session_config(&server, "/maps/", 0, ".bsp", temp.path()))
        .unwrap();

    assert_eq!(finish(&controller).await, SessionOutcome::Completed { files: 2 });
    let counters = controller.counters();
    assert_eq!(counters.total_files, 2);
    assert_eq!(counters.total_bytes, 10);
    assert_eq!(counters.downloaded_bytes, 10);
}

#[tokio::test]
async fn test_pause_mid_transfer_freezes_bytes_and_resume_completes_file() {
    let server = trickle().await;
    let temp = TempDir::new().unwrap();
    let controller = controller(fast_options(1, 0), Arc::new(MemoryHistory::new()));
    controller.start(trickle_config(&server, temp.path())).unwrap();

    wait_for_bytes(&controller, 64).await;
    assert!(controller.pause());
    tokio::time::sleep(Duration::from_millis(50)).await;
    let held = controller.counters().downloaded_bytes;
    assert!(held >= 64 && held < server.body_len());

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(controller.counters().downloaded_bytes, held);
    assert_eq!(controller.state(), SessionRunState::Paused);

    assert!(controller.resume());
    let (outcome, samples) = finish_sampled(&controller).await;
    assert_eq!(outcome, SessionOutcome::Completed { files: 1 });
    assert!(samples.iter().all(|c| c.downloaded_bytes >= held));

    let counters = controller.counters();
    assert_eq!(counters.downloaded_bytes, server.body_len());
    assert_eq!(counters.total_bytes, server.body_len());
    assert_eq!(std::fs::read(temp.path().join(FILE_NAME)).unwrap(), server.body());
}

#[tokio::test]
async fn test_cancel_mid_transfer_stops_byte_growth() {
    let server = trickle().await;
    let temp = TempDir::new().unwrap();
    let controller = controller(fast_options(1, 3), Arc::new(MemoryHistory::new()));
    controller.start(trickle_config(&server, temp.path())).unwrap();

    wait_for_bytes(&controller, 64).await;
    assert!(controller.cancel());
    let outcome = tokio::time::timeout(Duration::from_secs(2), controller.wait())
        .await
        .expect("cancellation must not wait for the remaining pieces")
        .unwrap();
    assert_eq!(outcome, SessionOutcome::Cancelled { files: 0 });

    let saved = controller.counters().downloaded_bytes;
    assert!(saved >= 64 && saved < server.body_len());
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(controller.counters().downloaded_bytes, saved);
    assert!(!temp.path().join(FILE_NAME).exists());
}

#[tokio::test]
async fn test_downloaded_bytes_are_monotonic_and_within_fixed_totals() {
    let server = trickle().await;
    let temp = TempDir::new().unwrap();
    let controller = controller(fast_options(1, 0), Arc::new(MemoryHistory::new()));
    controller.start(trickle_config(&server, temp.path())).unwrap();

    let (outcome, samples) = finish_sampled(&controller).await;
    assert_eq!(outcome, SessionOutcome::Completed { files: 1 });
    assert!(samples.len() > 10, "too few samples: {}", samples.len());
    for pair in samples.windows(2) {
        assert!(pair[1].downloaded_bytes >= pair[0].downloaded_bytes, "{pair:?}");
    }
    for sample in &samples {
        assert!(sample.downloaded_bytes <= sample.total_bytes, "{sample:?}");
        assert!(sample.downloaded_files <= sample.total_files, "{sample:?}");
    }
    assert_eq!(controller.counters().downloaded_bytes, server.body_len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_racing_start_always_settles_cancelled() {
    let server = MockServer::start().await;
    mount_listing(&server, "/maps/", &["a.bsp"]).await;
    mount_file(&server, "/maps/a.bsp", b"abc").await;

    let temp = TempDir::new().unwrap();
    for round in 0..100 {
        let session = Arc::new(controller(fast_options(1, 0), Arc::new(MemoryHistory::new())));
        let canceller = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || {
                loop {
                    if session.cancel() {
                        return true;
                    }
                    if session.state().is_terminal() {
                        return false;
                    }
                    std::hint::spin_loop();
                }
            })
        };

        let dest = temp.path().join(round.to_string());
        session
            .start(session_config(&server, "/maps/", 0, ".bsp", &dest))
            .unwrap();
        let outcome = finish(&session).await;
        let accepted = canceller.join().unwrap();

        if accepted {
            assert!(
                matches!(outcome, SessionOutcome::Cancelled { .. }),
                "round {round}: accepted cancel ended as {outcome:?}"
            );
            assert_eq!(session.state(), SessionRunState::Cancelled);
        }
    }
}
