use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::stream;
use futures_util::StreamExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::core::error::ProducerError;
use crate::core::process::NoSecrets;
use crate::utils::test_utils::RecordingSink;

struct Harness {
    shell_sink: RecordingSink,
    ai_sink: RecordingSink,
    out: Vec<u8>,
    interrupt: Option<CancellationToken>,
}

impl Harness {
    fn new() -> Self {
        Self {
            shell_sink: RecordingSink::default(),
            ai_sink: RecordingSink::default(),
            out: Vec::new(),
            interrupt: None,
        }
    }

    async fn send(&mut self, session: &mut HybridSession, line: &str) -> Flow {
        let mut secrets = NoSecrets;
        let mut io = SessionIo {
            shell_sink: &mut self.shell_sink,
            ai_sink: &mut self.ai_sink,
            secrets: &mut secrets,
            out: &mut self.out,
            forward_keys: false,
            interrupt: self.interrupt.as_ref(),
        };
        session.handle_line(line, &mut io).await.expect("turn runs")
    }

    fn output(&self) -> String {
        String::from_utf8_lossy(&self.out).into_owned()
    }
}

fn shell_config() -> Config {
    let mut config = Config::default();
    config.shell.default_shell = Some("/bin/sh".to_string());
    config.shell.poll_interval_ms = Some(20);
    config.shell.exit_wait_ms = Some(50);
    config.shell.max_exit_wait_ms = Some(300);
    config
}

fn session_in(dir: &Path) -> HybridSession {
    HybridSession::new(shell_config(), dir.to_path_buf())
}

fn replying(chunks: &'static [&'static str]) -> SharedProducer {
    Arc::new(move |_messages: &[ChatMessage]| -> ChunkStream {
        stream::iter(chunks.iter().map(|c| Ok::<_, ProducerError>(c.to_string()))).boxed()
    })
}

/// Streams "Hel", "lo" and then cancels `trip` and stalls on the first
/// request; every later request streams " world".
fn interrupted_once(trip: CancellationToken, calls: Arc<AtomicUsize>) -> SharedProducer {
    Arc::new(move |_messages: &[ChatMessage]| -> ChunkStream {
        if calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return stream::iter([Ok::<_, ProducerError>(" world".to_string())]).boxed();
        }
        let trip = trip.clone();
        stream::iter(["Hel", "lo"].map(|c| Ok::<_, ProducerError>(c.to_string())))
            .chain(stream::once(async move {
                trip.cancel();
                std::future::pending::<Result<String, ProducerError>>().await
            }))
            .boxed()
    })
}

#[test]
fn lines_are_classified_by_mode() {
    assert_eq!(classify("  ", Mode::Shell), Input::Empty);
    assert_eq!(classify("exit", Mode::Ai), Input::Exit);
    assert_eq!(classify("/ai", Mode::Shell), Input::SwitchMode(Mode::Ai));
    assert_eq!(classify("/shell", Mode::Ai), Input::SwitchMode(Mode::Shell));
    assert_eq!(
        classify("/ai what is ls", Mode::Shell),
        Input::Ask("what is ls".into())
    );
    assert_eq!(classify("/shell ls", Mode::Ai), Input::Shell("ls".into()));
    assert_eq!(
        classify("? why did it fail", Mode::Shell),
        Input::Ask("why did it fail".into())
    );
    assert_eq!(classify("ls -la", Mode::Shell), Input::Shell("ls -la".into()));
    assert_eq!(classify("ls -la", Mode::Ai), Input::Ask("ls -la".into()));
    assert_eq!(classify("cd", Mode::Shell), Input::Cd(None));
    assert_eq!(classify("cd /tmp", Mode::Shell), Input::Cd(Some("/tmp".into())));
    assert_eq!(classify("cdrecord", Mode::Shell), Input::Shell("cdrecord".into()));
    assert_eq!(classify("/aibot", Mode::Shell), Input::Shell("/aibot".into()));
    assert_eq!(classify("resume", Mode::Shell), Input::Resume);
    assert_eq!(classify("cancelstate", Mode::Ai), Input::CancelState);
}

#[tokio::test]
async fn cd_moves_and_returns() {
    let root = TempDir::new().unwrap();
    let nested = root.path().join("nested");
    std::fs::create_dir(&nested).unwrap();
    let start = root.path().canonicalize().unwrap();

    let mut session = session_in(&start);
    let mut harness = Harness::new();

    harness.send(&mut session, "cd nested").await;
    assert_eq!(session.cwd(), nested.canonicalize().unwrap());

    harness.send(&mut session, "cd -").await;
    assert_eq!(session.cwd(), start);

    harness.send(&mut session, "cd missing").await;
    assert_eq!(session.cwd(), start);
    assert!(harness.output().contains("cd: no such directory"));
}

#[tokio::test]
async fn commands_run_in_the_session_directory() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("marker.txt"), "").unwrap();
    let mut session = session_in(root.path());
    let mut harness = Harness::new();

    harness.send(&mut session, "ls").await;

    let context: Vec<&str> = session.shell_context().collect();
    assert_eq!(context, ["$ ls\nmarker.txt"]);
    assert_eq!(harness.shell_sink.finals.len(), 1);
}

#[tokio::test]
async fn silent_commands_record_their_exit_code() {
    let root = TempDir::new().unwrap();
    let mut session = session_in(root.path());
    let mut harness = Harness::new();

    harness.send(&mut session, "exit 4").await;

    let context: Vec<&str> = session.shell_context().collect();
    assert_eq!(context, ["$ exit 4\nExit code: 4"]);
}

#[tokio::test]
async fn shell_context_is_bounded() {
    let root = TempDir::new().unwrap();
    let mut session = session_in(root.path());
    let mut harness = Harness::new();

    for n in 0..SHELL_CONTEXT_LIMIT + 2 {
        harness.send(&mut session, &format!("echo {n}")).await;
    }

    let context: Vec<&str> = session.shell_context().collect();
    assert_eq!(context.len(), SHELL_CONTEXT_LIMIT);
    assert_eq!(context[0], "$ echo 2\n2");
}

#[tokio::test]
async fn missing_command_suggests_asking_the_ai() {
    let root = TempDir::new().unwrap();
    let mut session = session_in(root.path());
    let mut harness = Harness::new();

    harness
        .send(&mut session, "simpl-definitely-not-a-command")
        .await;

    assert!(harness.output().contains("Command not found"));
}

#[tokio::test]
async fn completed_answers_join_the_conversation() {
    let root = TempDir::new().unwrap();
    let mut session = session_in(root.path()).with_producer(replying(&["Use ", "`ls -a`."]));
    let mut harness = Harness::new();

    harness.send(&mut session, "echo context-line").await;
    harness.send(&mut session, "? how do I list dotfiles").await;

    assert_eq!(
        session.conversation(),
        [
            ChatMessage::user("how do I list dotfiles"),
            ChatMessage::assistant("Use `ls -a`."),
        ]
    );
    let final_frame = harness.ai_sink.final_frame();
    assert_eq!(final_frame.title, "AI Assistant - Complete");
    assert!(final_frame
        .subtitle
        .as_deref()
        .is_some_and(|s| s.contains(" | stream ")));
}

#[tokio::test]
async fn requests_carry_shell_context_and_history() {
    let root = TempDir::new().unwrap();
    let seen: Arc<std::sync::Mutex<Vec<Vec<ChatMessage>>>> = Arc::default();
    let calls = Arc::clone(&seen);
    let producer: SharedProducer = Arc::new(move |messages: &[ChatMessage]| -> ChunkStream {
        calls.lock().unwrap().push(messages.to_vec());
        stream::iter([Ok::<_, ProducerError>("ok".to_string())]).boxed()
    });
    let mut session = session_in(root.path()).with_producer(producer);
    let mut harness = Harness::new();

    harness.send(&mut session, "echo hello-from-shell").await;
    harness.send(&mut session, "/ai first").await;
    harness.send(&mut session, "/ai second").await;

    let seen = seen.lock().unwrap();
    let second = &seen[1];
    assert!(second[0].content.contains("$ echo hello-from-shell\nhello-from-shell"));
    assert_eq!(second[1], ChatMessage::user("first"));
    assert_eq!(second[2], ChatMessage::assistant("ok"));
    assert_eq!(second[3], ChatMessage::user("second"));
}

#[tokio::test]
async fn failed_answers_are_not_recorded() {
    let root = TempDir::new().unwrap();
    let producer: SharedProducer = Arc::new(|_messages: &[ChatMessage]| -> ChunkStream {
        stream::iter([Err::<String, _>(ProducerError::new("API Error: boom"))]).boxed()
    });
    let mut session = session_in(root.path()).with_producer(producer);
    let mut harness = Harness::new();

    harness.send(&mut session, "? anything").await;

    assert!(session.conversation().is_empty());
    assert_eq!(harness.ai_sink.final_frame().tone, FrameTone::Error);
}

#[tokio::test]
async fn unconfigured_ai_explains_itself() {
    let root = TempDir::new().unwrap();
    let mut session = session_in(root.path()).without_producer("OPENAI_API_KEY is not set");
    let mut harness = Harness::new();

    harness.send(&mut session, "/ai").await;
    assert_eq!(session.mode(), Mode::Ai);
    harness.send(&mut session, "hello").await;

    assert!(harness.output().contains("OPENAI_API_KEY is not set"));
    assert!(harness.ai_sink.finals.is_empty());
}

#[tokio::test]
async fn resume_and_cancelstate_without_a_cancelled_turn() {
    let root = TempDir::new().unwrap();
    let mut session = session_in(root.path()).with_producer(replying(&["x"]));
    let mut harness = Harness::new();

    harness.send(&mut session, "resume").await;
    harness.send(&mut session, "cancelstate").await;

    let output = harness.output();
    assert!(output.contains("No cancelled response to resume."));
    assert!(output.contains("No cancelled response."));
    assert!(harness.ai_sink.finals.is_empty());
}

#[tokio::test]
async fn exit_ends_the_session() {
    let root = TempDir::new().unwrap();
    let mut session = session_in(root.path());
    let mut harness = Harness::new();

    assert_eq!(harness.send(&mut session, "help").await, Flow::Continue);
    assert!(harness.output().contains("cancelstate"));
    assert_eq!(harness.send(&mut session, "quit").await, Flow::Exit);
}

#[test]
fn long_output_keeps_its_tail() {
    let text = "a".repeat(10) + "tail";
    assert_eq!(tail_chars(&text, 4), "...tail");
    assert_eq!(tail_chars("short", 10), "short");
}

#[tokio::test]
async fn cancelled_answer_waits_for_resume_before_joining_the_conversation() {
    let root = TempDir::new().unwrap();
    let trip = CancellationToken::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut session = session_in(root.path())
        .with_producer(interrupted_once(trip.clone(), Arc::clone(&calls)));
    let mut harness = Harness::new();

    harness.interrupt = Some(trip);
    harness.send(&mut session, "? say hello world").await;

    assert!(session.conversation().is_empty());
    assert!(harness
        .output()
        .contains("Type 'resume' to continue the response."));
    assert_eq!(harness.ai_sink.final_frame().tone, FrameTone::Warning);

    harness.send(&mut session, "cancelstate").await;
    assert!(harness.output().contains("message: say hello world"));

    harness.interrupt = None;
    harness.send(&mut session, "resume").await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        session.conversation(),
        [
            ChatMessage::user("say hello world"),
            ChatMessage::assistant("Hello world"),
        ]
    );
    assert_eq!(
        harness.ai_sink.final_frame().title,
        "AI Assistant - Resume Complete"
    );

    harness.out.clear();
    harness.send(&mut session, "cancelstate").await;
    assert_eq!(harness.output(), "No cancelled response.\n");
}
