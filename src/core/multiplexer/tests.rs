use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::core::process::NoSecrets;
use crate::utils::test_utils::{RecordingMode, RecordingSink};

fn request(command: &str) -> SpawnRequest {
    SpawnRequest::new(command, std::env::temp_dir(), "/bin/sh")
}

fn fast_options() -> MultiplexerOptions {
    MultiplexerOptions {
        poll_interval: Duration::from_millis(20),
        exit_wait: Duration::from_millis(50),
        max_exit_wait: Duration::from_millis(300),
        ..MultiplexerOptions::default()
    }
}

async fn run_plain(command: &str, options: MultiplexerOptions) -> (ShellOutcome, RecordingSink) {
    let mut streamer = ShellStreamer::new(options);
    let mut sink = RecordingSink::default();
    let outcome = streamer
        .execute(
            request(command),
            &mut NoSecrets,
            without_input(),
            &mut sink,
            &CancellationToken::new(),
        )
        .await
        .expect("command runs");
    assert_eq!(streamer.state(), SessionState::Done);
    (outcome, sink)
}

#[tokio::test]
async fn partial_last_line_stays_in_tail() {
    let (outcome, sink) = run_plain("printf 'line1\\nline2\\npart'", fast_options()).await;

    assert_eq!(outcome.output, "line1\nline2\npart");
    assert_eq!(outcome.exit_code, Some(0));
    assert!(!outcome.cancelled);

    let last = sink.live.last().expect("live frame drawn");
    assert_eq!(
        last.body,
        FrameBody::Lines(vec!["line1".into(), "line2".into(), "part".into()])
    );

    let summary = sink.final_frame();
    assert_eq!(summary.title, " Shell Command - Complete");
    assert_eq!(summary.tone, FrameTone::Success);
    assert_eq!(
        summary.body,
        FrameBody::Lines(vec![" Exit code: 0".into(), "Output printed below.".into()])
    );
    assert_eq!(sink.statics.len(), 1);
}

#[tokio::test]
async fn first_live_frame_announces_command() {
    let (_, sink) = run_plain("true", fast_options()).await;
    let first = sink.live.first().expect("announcement");
    assert_eq!(first.tone, FrameTone::Info);
    assert_eq!(first.body, FrameBody::Notice("Executing: 'true'".into()));
}

#[tokio::test]
async fn stderr_is_merged_into_output() {
    for _ in 0..5 {
        let (outcome, _) = run_plain("echo a; echo b >&2; echo c", fast_options()).await;
        assert_eq!(outcome.output, "a\nb\nc\n");
    }
}

#[tokio::test]
async fn output_left_in_the_pipe_after_exit_is_drained() {
    let mut process = process::spawn(&request("printf 'last words'"), &mut NoSecrets)
        .await
        .expect("spawn");
    process.child.wait().await.expect("child exits");

    let mut decoder = Utf8Decoder::new();
    let mut buffer = RenderBuffer::new(5);
    assert!(drain_ready(&mut process.output, &mut decoder, &mut buffer).await);
    buffer.add_chunk(&decoder.finish());
    assert_eq!(buffer.into_full_output(), "last words");
}

#[tokio::test]
async fn drain_stops_when_the_pipe_would_block() {
    // A background writer keeps the pipe open with nothing buffered.
    let mut process = process::spawn(&request("sleep 5 & echo up"), &mut NoSecrets)
        .await
        .expect("spawn");
    process.child.wait().await.expect("child exits");

    let mut decoder = Utf8Decoder::new();
    let mut buffer = RenderBuffer::new(5);
    let started = Instant::now();
    assert!(drain_ready(&mut process.output, &mut decoder, &mut buffer).await);
    assert!(!drain_ready(&mut process.output, &mut decoder, &mut buffer).await);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(buffer.into_full_output(), "up\n");
}

#[tokio::test]
async fn failing_command_reports_exit_code_and_placeholder() {
    let (outcome, sink) = run_plain("exit 3", fast_options()).await;

    assert_eq!(outcome.exit_code, Some(3));
    assert_eq!(outcome.status(), CommandStatus::Failed);
    let summary = sink.final_frame();
    assert_eq!(summary.title, " Shell Command - Exit 3");
    assert_eq!(summary.tone, FrameTone::Error);
    assert_eq!(
        sink.statics[0].body,
        FrameBody::Lines(vec![NO_OUTPUT.to_string()])
    );
}

#[tokio::test]
async fn window_keeps_only_recent_lines() {
    let options = MultiplexerOptions {
        max_visible_lines: 5,
        ..fast_options()
    };
    let (outcome, sink) = run_plain("seq 1 40", options).await;

    assert_eq!(outcome.output.lines().count(), 40);
    let FrameBody::Lines(lines) = &sink.live.last().expect("live frame").body else {
        panic!("expected line body");
    };
    assert_eq!(lines, &["36", "37", "38", "39", "40"]);
    for frame in &sink.live {
        if let FrameBody::Lines(lines) = &frame.body {
            assert!(lines.len() <= 5);
        }
    }
}

#[tokio::test]
async fn summary_can_be_disabled() {
    let options = MultiplexerOptions {
        summary_panel: false,
        output_panel: false,
        ..fast_options()
    };
    let (_, sink) = run_plain("echo hi", options).await;

    assert_eq!(
        sink.final_frame().body,
        FrameBody::Notice("Command finished with exit code 0".into())
    );
    assert!(sink.statics[0].title.is_empty());
}

#[tokio::test]
async fn draw_failures_do_not_abort_the_session() {
    let mut streamer = ShellStreamer::new(fast_options());
    let mut sink = RecordingSink::failing();
    let outcome = streamer
        .execute(
            request("echo still here"),
            &mut NoSecrets,
            without_input(),
            &mut sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.output, "still here\n");
    assert_eq!(sink.finals.len(), 1);
}

#[tokio::test]
async fn keystrokes_are_forwarded_in_order() {
    let mode = RecordingMode::default();
    let (mut keyboard, reader) = tokio::io::duplex(64);
    keyboard.write_all(b"hel").await.unwrap();
    keyboard.write_all(b"lo\n").await.unwrap();

    let mut streamer = ShellStreamer::new(fast_options());
    let mut sink = RecordingSink::default();
    let outcome = streamer
        .execute(
            request("read line; echo \"got $line\""),
            &mut NoSecrets,
            Some(KeyInput {
                mode: mode.clone(),
                reader,
            }),
            &mut sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.output, "got hello\n");
    assert_eq!(mode.enters(), 1);
    assert_eq!(mode.restores(), 1);
}

#[tokio::test]
async fn ctrl_c_byte_cancels_and_restores_terminal_once() {
    let mode = RecordingMode::default();
    let (mut keyboard, reader) = tokio::io::duplex(64);

    let typist = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        keyboard.write_all(b"\x03").await.unwrap();
        keyboard
    });

    let mut streamer = ShellStreamer::new(fast_options());
    let mut sink = RecordingSink::default();
    let outcome = streamer
        .execute(
            request("echo started; sleep 5"),
            &mut NoSecrets,
            Some(KeyInput {
                mode: mode.clone(),
                reader,
            }),
            &mut sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    drop(typist.await.unwrap());

    assert!(outcome.cancelled);
    // SIGINT, or SIGKILL when the shell waits out its foreground child.
    assert!(matches!(outcome.exit_code, Some(130) | Some(137)));
    assert_eq!(mode.restores(), 1);

    let summary = sink.final_frame();
    assert_eq!(summary.title, " Shell Command - Cancelled");
    assert_eq!(summary.tone, FrameTone::Warning);
    assert_eq!(
        summary.body,
        FrameBody::Lines(vec![
            " Command cancelled. Partial output shown below.".into()
        ])
    );
}

#[tokio::test]
async fn host_interrupt_cancels_like_ctrl_c() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let mut streamer = ShellStreamer::new(fast_options());
    let mut sink = RecordingSink::default();
    let outcome = streamer
        .execute(
            request("sleep 5"),
            &mut NoSecrets,
            without_input(),
            &mut sink,
            &token,
        )
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert!(outcome.output.is_empty());
    assert!(sink.statics.is_empty(), "no placeholder after cancellation");
    assert_eq!(sink.finals.len(), 1);
}

#[tokio::test]
async fn cancelling_an_exited_child_still_restores_once() {
    let mode = RecordingMode::default();
    let (_keyboard, reader) = tokio::io::duplex(8);
    let token = CancellationToken::new();
    token.cancel();

    let mut streamer = ShellStreamer::new(fast_options());
    let mut sink = RecordingSink::default();
    let outcome = streamer
        .execute(
            request("true"),
            &mut NoSecrets,
            Some(KeyInput {
                mode: mode.clone(),
                reader,
            }),
            &mut sink,
            &token,
        )
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(mode.enters(), 1);
    assert_eq!(mode.restores(), 1);
    assert_eq!(sink.finals.len(), 1);
}

#[tokio::test]
async fn stubborn_child_is_killed_after_max_wait() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let mut streamer = ShellStreamer::new(fast_options());
    let mut sink = RecordingSink::default();
    let started = std::time::Instant::now();
    let outcome = streamer
        .execute(
            request("trap '' INT; sleep 5; :"),
            &mut NoSecrets,
            without_input(),
            &mut sink,
            &token,
        )
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.exit_code, Some(137));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn raw_mode_failure_falls_back_to_output_only() {
    let mode = RecordingMode::failing();
    let (_keyboard, reader) = tokio::io::duplex(8);

    let mut streamer = ShellStreamer::new(fast_options());
    let mut sink = RecordingSink::default();
    let outcome = streamer
        .execute(
            request("echo fine"),
            &mut NoSecrets,
            Some(KeyInput {
                mode: mode.clone(),
                reader,
            }),
            &mut sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.output, "fine\n");
    assert_eq!(mode.restores(), 0);
}

#[tokio::test]
async fn spawn_failure_ends_with_one_error_frame() {
    let mut streamer = ShellStreamer::new(fast_options());
    let mut sink = RecordingSink::default();
    let req = SpawnRequest::new("true", std::env::temp_dir(), "/no/such/shell");
    let err = streamer
        .execute(
            req,
            &mut NoSecrets,
            without_input(),
            &mut sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StreamError::SpawnFailure { .. }));
    assert_eq!(sink.final_frame().tone, FrameTone::Error);
    assert!(sink.live.is_empty());
}

#[tokio::test]
async fn missing_password_aborts_without_process() {
    let mode = RecordingMode::default();
    let (_keyboard, reader) = tokio::io::duplex(8);

    let mut streamer = ShellStreamer::new(fast_options());
    let mut sink = RecordingSink::default();
    let err = streamer
        .execute(
            request("sudo ls"),
            &mut NoSecrets,
            Some(KeyInput {
                mode: mode.clone(),
                reader,
            }),
            &mut sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StreamError::SecretNotProvided));
    assert_eq!(mode.enters(), 0);
    assert_eq!(sink.final_frame().tone, FrameTone::Warning);
}

#[test]
fn status_classification() {
    assert_eq!(CommandStatus::classify(false, Some(0)), CommandStatus::Success);
    assert_eq!(CommandStatus::classify(false, None), CommandStatus::Success);
    assert_eq!(CommandStatus::classify(false, Some(1)), CommandStatus::Failed);
    assert_eq!(CommandStatus::classify(true, Some(0)), CommandStatus::Cancelled);
    assert_eq!(CommandStatus::Warning.tone(), FrameTone::Warning);
}
