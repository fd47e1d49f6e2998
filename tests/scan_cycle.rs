//! Scan Cycle Integration Tests
//!
//! Runs scan cycles against the in-memory platform: forwarding, counters,
//! stop handling and failure tolerance.

use std::sync::Arc;
use std::time::Duration;

use vpnscan::adapters::memory::{Action, Op};
use vpnscan::adapters::{MemoryPlatform, Peer};
use vpnscan::core::{
    CycleOutcome, Journal, Orchestrator, ScanState, ScanTiming, ScannerState, StartOutcome,
};
use vpnscan::domain::Settings;

const DESTINATION: i64 = -900;

fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.apply("DELAY_BETWEEN_CHANNELS", "0").unwrap();
    settings.apply("DELAY_BETWEEN_MESSAGES", "0").unwrap();
    settings
}

fn orchestrator(platform: &Arc<MemoryPlatform>, settings: Settings) -> Arc<Orchestrator> {
    let state = Arc::new(ScannerState::new(settings, Some(DESTINATION)));
    let journal = Arc::new(Journal::new(platform.clone()));
    Arc::new(Orchestrator::new(
        platform.clone(),
        state,
        journal,
        ScanTiming {
            error_backoff: Duration::from_millis(10),
            restart_pause: Duration::from_millis(10),
        },
    ))
}

fn destination_texts(platform: &MemoryPlatform) -> Vec<String> {
    platform.sent_to(Peer::Chat(DESTINATION))
}

#[tokio::test]
async fn test_config_file_forwarded_once() {
    let platform = Arc::new(MemoryPlatform::new());
    platform.add_channel(-1, "Configs");
    let file_id = platform.post_file(-1, "FREE.OVPN", 1234);
    platform.post_file(-1, "cat.jpg", 99);

    let orchestrator = orchestrator(&platform, fast_settings());
    let state = orchestrator.state().clone();
    state.begin_run().unwrap();

    let outcome = orchestrator.run_cycle().await.unwrap();
    let CycleOutcome::Completed(tally) = outcome else {
        panic!("cycle interrupted: {:?}", outcome);
    };

    assert_eq!(tally.channels_scanned, 1);
    assert_eq!(tally.files_forwarded, 1);
    assert_eq!(state.stats().files_forwarded, 1);
    assert_eq!(state.stats().total_scans, 1);
    assert_eq!(platform.forwarded_to(Peer::Chat(DESTINATION)), vec![file_id]);
    assert!(destination_texts(&platform)
        .iter()
        .any(|t| t.contains("FREE.OVPN") && t.contains("1234 bytes")));
}

#[tokio::test]
async fn test_server_link_forwarded_with_caption() {
    let platform = Arc::new(MemoryPlatform::new());
    platform.add_channel(-1, "Free VPN");
    platform.post(-1, "check this vmess://ABC123 out");

    let orchestrator = orchestrator(&platform, fast_settings());
    orchestrator.state().begin_run().unwrap();
    orchestrator.run_cycle().await.unwrap();

    let sent = destination_texts(&platform);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("VMESS Server"));
    assert!(sent[0].contains("Source: Free VPN"));
    assert!(sent[0].contains("vmess://ABC123"));
    assert_eq!(orchestrator.state().stats().servers_found, 1);
}

#[tokio::test]
async fn test_disabled_features_forward_nothing() {
    let platform = Arc::new(MemoryPlatform::new());
    platform.add_channel(-1, "Mixed");
    platform.post(-1, "vmess://ABC123");
    platform.post_file(-1, "profile.conf", 10);

    let mut settings = fast_settings();
    settings.apply("ENABLED_SERVER_TYPES", "vless").unwrap();
    settings.toggle_file_forwarding();

    let orchestrator = orchestrator(&platform, settings);
    orchestrator.state().begin_run().unwrap();
    orchestrator.run_cycle().await.unwrap();

    assert!(destination_texts(&platform).is_empty());
    assert!(platform.forwarded_to(Peer::Chat(DESTINATION)).is_empty());
}

#[tokio::test]
async fn test_groups_are_not_scanned() {
    let platform = Arc::new(MemoryPlatform::new());
    platform.add_group(-2, "Chatter", Some(40));
    platform.post(-2, "vmess://ABC123");

    let orchestrator = orchestrator(&platform, fast_settings());
    orchestrator.state().begin_run().unwrap();
    let outcome = orchestrator.run_cycle().await.unwrap();

    assert!(matches!(outcome, CycleOutcome::Completed(t) if t.channels_scanned == 0));
    assert!(destination_texts(&platform).is_empty());
}

#[tokio::test]
async fn test_stop_mid_cycle_skips_remaining_work() {
    let platform = Arc::new(MemoryPlatform::new());
    platform.add_channel(-1, "First");
    platform.add_channel(-2, "Second");
    platform.post(-1, "vmess://AAAA");
    platform.post(-1, "vmess://BBBB");
    platform.post(-2, "vmess://CCCC");

    let orchestrator = orchestrator(&platform, fast_settings());
    let state = orchestrator.state().clone();
    state.begin_run().unwrap();

    let hook_state = state.clone();
    platform.on_action(move |action| {
        if let Action::Sent {
            peer: Peer::Chat(DESTINATION),
            ..
        } = action
        {
            hook_state.request_stop();
        }
    });

    let outcome = orchestrator.run_cycle().await.unwrap();

    assert!(matches!(outcome, CycleOutcome::Interrupted(_)));
    assert_eq!(destination_texts(&platform).len(), 1);
    assert_eq!(state.stats().servers_found, 1);
    assert_eq!(state.stats().total_scans, 0);
    assert_eq!(state.scan_state(), ScanState::StopRequested);
}

#[tokio::test]
async fn test_forward_failure_does_not_abort_cycle() {
    let platform = Arc::new(MemoryPlatform::new());
    platform.add_channel(-1, "Files");
    platform.add_channel(-2, "Links");
    platform.post_file(-1, "a.ovpn", 1);
    platform.post(-2, "trojan://pass@host:443");
    platform.fail(Op::Forward);

    let orchestrator = orchestrator(&platform, fast_settings());
    let state = orchestrator.state().clone();
    state.begin_run().unwrap();

    let outcome = orchestrator.run_cycle().await.unwrap();

    assert!(matches!(outcome, CycleOutcome::Completed(t) if t.channels_scanned == 2));
    assert_eq!(state.stats().files_forwarded, 0);
    assert_eq!(state.stats().servers_found, 1);
    assert!(platform
        .saved_texts()
        .iter()
        .any(|t| t.contains("Error forwarding content")));
}

#[tokio::test]
async fn test_unreadable_channel_is_skipped() {
    let platform = Arc::new(MemoryPlatform::new());
    platform.add_channel(-1, "Private");
    platform.fail(Op::Messages);

    let orchestrator = orchestrator(&platform, fast_settings());
    orchestrator.state().begin_run().unwrap();
    let outcome = orchestrator.run_cycle().await.unwrap();

    assert!(matches!(outcome, CycleOutcome::Completed(_)));
    assert!(platform
        .saved_texts()
        .iter()
        .any(|t| t.contains("Error scanning Private")));
}

#[tokio::test]
async fn test_listing_failure_fails_cycle() {
    let platform = Arc::new(MemoryPlatform::new());
    platform.fail(Op::Dialogs);

    let orchestrator = orchestrator(&platform, fast_settings());
    orchestrator.state().begin_run().unwrap();

    assert!(orchestrator.run_cycle().await.is_err());
    assert_eq!(orchestrator.state().stats().total_scans, 0);
}

#[tokio::test]
async fn test_stop_interrupts_interval_sleep() {
    let platform = Arc::new(MemoryPlatform::new());
    platform.add_channel(-1, "Feed");
    platform.post(-1, "vmess://ABC123");

    let orchestrator = orchestrator(&platform, fast_settings());
    let state = orchestrator.state().clone();

    assert_eq!(orchestrator.start().await, StartOutcome::Started);
    assert_eq!(orchestrator.start().await, StartOutcome::AlreadyRunning);

    tokio::time::timeout(Duration::from_secs(5), async {
        while state.stats().total_scans == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first cycle did not complete");

    assert!(orchestrator.stop().await);
    tokio::time::timeout(Duration::from_secs(2), orchestrator.wait_stopped())
        .await
        .expect("loop kept sleeping after stop");

    assert_eq!(state.scan_state(), ScanState::Idle);
    assert_eq!(state.stats().total_scans, 1);
    assert!(platform
        .saved_texts()
        .iter()
        .any(|t| t.contains("Scanner Stopped")));
}

#[tokio::test]
async fn test_start_refused_while_stopping() {
    let platform = Arc::new(MemoryPlatform::new());
    let orchestrator = orchestrator(&platform, fast_settings());
    let state = orchestrator.state().clone();

    state.begin_run().unwrap();
    state.request_stop();

    assert_eq!(orchestrator.start().await, StartOutcome::StillStopping);
    assert_eq!(state.scan_state(), ScanState::StopRequested);
}

#[tokio::test]
async fn test_restart_runs_a_fresh_loop() {
    let platform = Arc::new(MemoryPlatform::new());
    platform.add_channel(-1, "Feed");
    platform.post(-1, "vmess://AAA");

    let orchestrator = orchestrator(&platform, fast_settings());
    let state = orchestrator.state().clone();
    assert_eq!(orchestrator.start().await, StartOutcome::Started);

    tokio::time::timeout(Duration::from_secs(5), async {
        while state.stats().total_scans < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first scan did not complete");

    assert_eq!(orchestrator.restart().await, StartOutcome::Started);
    assert_eq!(state.scan_state(), ScanState::Running);

    tokio::time::timeout(Duration::from_secs(5), async {
        while state.stats().total_scans < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("scan after restart did not complete");

    assert_eq!(state.stats().servers_found, 2);
    assert_eq!(destination_texts(&platform).len(), 2);

    orchestrator.stop().await;
    orchestrator.wait_stopped().await;
    assert_eq!(state.scan_state(), ScanState::Idle);
}

#[tokio::test]
async fn test_destination_channel_is_not_scanned() {
    let platform = Arc::new(MemoryPlatform::new());
    platform.add_channel(-1, "Feed");
    platform.post(-1, "vmess://AAA");
    platform.add_channel(DESTINATION, "Collected");
    platform.post(DESTINATION, "vmess://OLD");

    let orchestrator = orchestrator(&platform, fast_settings());
    orchestrator.state().begin_run().unwrap();
    let outcome = orchestrator.run_cycle().await.unwrap();

    let CycleOutcome::Completed(tally) = outcome else {
        panic!("cycle interrupted: {:?}", outcome);
    };
    assert_eq!(tally.channels_scanned, 1);
    let sent = destination_texts(&platform);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("vmess://AAA"));
}
