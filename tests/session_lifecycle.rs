//! Session state machine driven through a scripted build service.

mod common;

use common::*;
use pinwire::BroadcastEvent;
use pinwire_shared::{DiagnosticKind, SessionState};
use std::time::Duration;

async fn next_diagnostic(engine: &mut Engine) -> (DiagnosticKind, String) {
    loop {
        if let BroadcastEvent::Diagnostic { kind, message, .. } = engine.next_event().await {
            return (kind, message);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_compile_run_reaches_running() {
    let gateway = ScriptedGateway::new().with_program("loop", &idle_loop_program());
    let mut engine = start_engine(gateway, settings(1_000, true));

    engine.session.compile_run("loop").await.unwrap();
    let compiling = engine.wait_for_state(SessionState::Compiling).await;
    let running = engine.wait_for_state(SessionState::Running).await;
    assert_eq!(compiling, running);

    let status = engine.session.status().await.unwrap();
    assert_eq!(status.state, SessionState::Running);
    assert_eq!(status.generation, running);
    assert_eq!(status.pins.get(13), Some(false));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_build_failure_returns_to_idle() {
    let gateway = ScriptedGateway::new().with("broken", Reply::Stderr("error: expected ';'".into()));
    let mut engine = start_engine(gateway, settings(1_000, true));

    engine.session.compile_run("broken").await.unwrap();
    let (kind, message) = next_diagnostic(&mut engine).await;
    assert_eq!(kind, DiagnosticKind::BuildFailure);
    assert!(message.contains("expected ';'"));
    engine.wait_for_state(SessionState::Idle).await;
    assert_eq!(engine.session.status().await.unwrap().state, SessionState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_build_service_is_a_build_failure() {
    let gateway = ScriptedGateway::new().with("sketch", Reply::Unreachable);
    let mut engine = start_engine(gateway, settings(1_000, true));

    engine.session.compile_run("sketch").await.unwrap();
    let (kind, message) = next_diagnostic(&mut engine).await;
    assert_eq!(kind, DiagnosticKind::BuildFailure);
    assert!(message.contains("unavailable"));
    engine.wait_for_state(SessionState::Idle).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_image_never_runs() {
    let gateway = ScriptedGateway::new().with("garbage", Reply::Hex(":0200000008".into()));
    let mut engine = start_engine(gateway, settings(1_000, true));

    engine.session.compile_run("garbage").await.unwrap();
    let mut saw_running = false;
    loop {
        match engine.next_event().await {
            BroadcastEvent::Status { state: SessionState::Running, .. } => saw_running = true,
            BroadcastEvent::Diagnostic { kind, .. } => {
                assert_eq!(kind, DiagnosticKind::MalformedImage);
                break;
            }
            _ => {}
        }
    }
    engine.wait_for_state(SessionState::Idle).await;
    assert!(!saw_running);
    let status = engine.session.status().await.unwrap();
    assert_eq!(status.state, SessionState::Idle);
    assert_eq!(status.cycles, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_opcode_faults_the_session() {
    let gateway = ScriptedGateway::new().with_program("bad", &invalid_opcode_program());
    let mut engine = start_engine(gateway, settings(1_000, true));

    engine.session.compile_run("bad").await.unwrap();
    let (kind, _) = next_diagnostic(&mut engine).await;
    assert_eq!(kind, DiagnosticKind::InvalidOpcode);
    engine.wait_for_state(SessionState::Faulted).await;

    // Stop has nothing to do once faulted.
    engine.session.stop().await.unwrap();
    assert_eq!(engine.session.status().await.unwrap().state, SessionState::Faulted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_compile_run_recovers_from_fault() {
    let gateway = ScriptedGateway::new()
        .with_program("bad", &invalid_opcode_program())
        .with_program("good", &idle_loop_program());
    let mut engine = start_engine(gateway, settings(1_000, true));

    engine.session.compile_run("bad").await.unwrap();
    engine.wait_for_state(SessionState::Faulted).await;
    engine.session.compile_run("good").await.unwrap();
    engine.wait_for_state(SessionState::Compiling).await;
    engine.wait_for_state(SessionState::Running).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_returns_to_idle() {
    let gateway = ScriptedGateway::new().with_program("blink", &blink_program());
    let mut engine = start_engine(gateway, settings(1_000, true));

    engine.session.compile_run("blink").await.unwrap();
    let running = engine.wait_for_state(SessionState::Running).await;
    engine.session.stop().await.unwrap();
    assert_eq!(engine.wait_for_state(SessionState::Stopping).await, running);
    let idle = engine.wait_for_state(SessionState::Idle).await;
    assert!(idle > running);

    let status = engine.session.status().await.unwrap();
    assert_eq!(status.state, SessionState::Idle);
    assert_eq!(status.cycles, 0);
    // Once idle, nothing more is published for the stopped session.
    let late = engine.collect_for(Duration::from_millis(200)).await;
    assert!(late.iter().all(|event| event.generation() != running));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_while_compiling_abandons_build() {
    let gateway = ScriptedGateway::new().with_delay(
        "slow",
        Duration::from_millis(300),
        Reply::Hex(pinwire_mcu::encoding::words_to_hex(&idle_loop_program())),
    );
    let mut engine = start_engine(gateway, settings(1_000, true));

    engine.session.compile_run("slow").await.unwrap();
    engine.wait_for_state(SessionState::Compiling).await;
    engine.session.stop().await.unwrap();
    engine.wait_for_state(SessionState::Idle).await;

    let late = engine.collect_for(Duration::from_millis(600)).await;
    assert!(
        late.iter()
            .all(|event| !matches!(event, BroadcastEvent::Status { state: SessionState::Running, .. })),
        "abandoned build must not start a session"
    );
    assert_eq!(engine.session.status().await.unwrap().state, SessionState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_newer_compile_run_wins_over_slow_build() {
    let gateway = ScriptedGateway::new()
        .with_delay(
            "slow",
            Duration::from_millis(300),
            Reply::Hex(pinwire_mcu::encoding::words_to_hex(&blink_program())),
        )
        .with_program("fast", &idle_loop_program());
    let mut engine = start_engine(gateway, settings(1_000, true));

    engine.session.compile_run("slow").await.unwrap();
    let abandoned = engine.wait_for_state(SessionState::Compiling).await;
    engine.session.compile_run("fast").await.unwrap();
    let running = engine.wait_for_state(SessionState::Running).await;
    assert!(running > abandoned);

    let late = engine.collect_for(Duration::from_millis(600)).await;
    assert!(late.iter().all(|event| event.generation() != abandoned));
    let status = engine.session.status().await.unwrap();
    assert_eq!(status.state, SessionState::Running);
    assert_eq!(status.generation, running);
    // The idle loop never drives pin 13; the blink program would have.
    assert_eq!(status.pins.get(13), Some(false));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_greeting_carries_program_text() {
    let gateway = ScriptedGateway::new().with_program("void loop() {}", &idle_loop_program());
    let mut engine = start_engine(gateway, settings(1_000, true));

    let greeting = engine.session.connect().await.unwrap();
    assert_eq!(greeting.code, "// placeholder");
    assert!(greeting.snapshot.iter().all(|(_, level)| !level));

    engine.session.compile_run("void loop() {}").await.unwrap();
    engine.wait_for_state(SessionState::Running).await;
    assert_eq!(engine.session.connect().await.unwrap().code, "void loop() {}");
}
