//! Cancellable, resumable streaming of generated text.
//!
//! [`GenerationController`] drives a [`ChunkProducer`] into the live frame and
//! owns the single cancellation slot. An interrupted generation leaves a
//! [`CancelledStreamState`] behind; [`GenerationController::resume`] replays the
//! partial text and re-opens the producer with the exact request that was
//! interrupted.

use chrono::{DateTime, Local};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::error::{ProducerError, StreamError};
use crate::core::message::ChatMessage;
use crate::core::render_buffer::{RenderBuffer, CURSOR_MARKER, DEFAULT_AI_VISIBLE_LINES};
use crate::ui::frame::{Frame, FrameBody, FramePacer, FrameSink, FrameTone};
use crate::utils::format::truncate_title;

/// Text handed back to callers that want a string for a cancelled turn.
pub const CANCELLED_SENTINEL: &str = " Response cancelled";

const CONNECTING_PLACEHOLDER: &str = " Connecting to AI...";
const BANNER_MAX_CHARS: usize = 50;

pub type ChunkStream = BoxStream<'static, Result<String, ProducerError>>;

/// Builds a fresh chunk stream for a message list.
pub trait ChunkProducer {
    fn open(&self, messages: &[ChatMessage]) -> ChunkStream;
}

impl<F> ChunkProducer for F
where
    F: Fn(&[ChatMessage]) -> ChunkStream,
{
    fn open(&self, messages: &[ChatMessage]) -> ChunkStream {
        self(messages)
    }
}

/// Builds the closing frame of a completed generation from the rendered body
/// and the full text.
pub type Finalizer = Box<dyn FnOnce(FrameBody, &str) -> Frame + Send>;

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// What the user typed; shown in the resume banner.
    pub user_message: String,
    /// The complete request sent to the producer.
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed(String),
    Cancelled,
    Failed(String),
}

impl GenerationOutcome {
    pub fn text(&self) -> &str {
        match self {
            GenerationOutcome::Completed(text) => text,
            GenerationOutcome::Cancelled => CANCELLED_SENTINEL,
            GenerationOutcome::Failed(message) => message,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenerationOutcome::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledStreamState {
    pub original_messages: Vec<ChatMessage>,
    pub partial_content: String,
    pub user_message: String,
    pub timestamp: DateTime<Local>,
    pub word_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledStateInfo {
    pub user_message: String,
    pub partial_word_count: usize,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub max_visible_lines: usize,
    pub refresh_per_second: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_visible_lines: DEFAULT_AI_VISIBLE_LINES,
            refresh_per_second: 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Fresh,
    Resume,
}

impl Pass {
    fn streaming_title(self) -> &'static str {
        match self {
            Pass::Fresh => "AI Assistant Response",
            Pass::Resume => "AI Assistant - Resuming",
        }
    }

    fn streaming_tone(self) -> FrameTone {
        match self {
            Pass::Fresh => FrameTone::Info,
            Pass::Resume => FrameTone::Warning,
        }
    }

    fn complete_title(self) -> &'static str {
        match self {
            Pass::Fresh => "AI Assistant - Complete",
            Pass::Resume => "AI Assistant - Resume Complete",
        }
    }

    fn cancelled_title(self) -> &'static str {
        match self {
            Pass::Fresh => "AI Assistant - Cancelled",
            Pass::Resume => "AI Assistant - Resume Cancelled",
        }
    }

    fn cancelled_notice(self) -> &'static str {
        match self {
            Pass::Fresh => " Response cancelled by user",
            Pass::Resume => " Resume cancelled by user",
        }
    }

    fn error_title(self) -> &'static str {
        match self {
            Pass::Fresh => "AI Assistant - Error",
            Pass::Resume => "AI Assistant - Resume Error",
        }
    }
}

enum DriveEnd {
    Exhausted,
    Interrupted,
    Failed(ProducerError),
}

pub struct GenerationController {
    options: GenerationOptions,
    buffer: RenderBuffer,
    cancelled: Option<CancelledStreamState>,
}

impl GenerationController {
    pub fn new(options: GenerationOptions) -> Self {
        let buffer = RenderBuffer::new(options.max_visible_lines);
        Self {
            options,
            buffer,
            cancelled: None,
        }
    }

    pub fn has_cancelled_stream(&self) -> bool {
        self.cancelled.is_some()
    }

    pub fn cancelled_state(&self) -> Option<&CancelledStreamState> {
        self.cancelled.as_ref()
    }

    pub fn cancelled_state_info(&self) -> Option<CancelledStateInfo> {
        self.cancelled.as_ref().map(|state| CancelledStateInfo {
            user_message: state.user_message.clone(),
            partial_word_count: state.word_count,
            timestamp: state.timestamp,
        })
    }

    /// Stream a new response. A pending cancellation from an earlier turn is
    /// left untouched unless this one is interrupted too.
    pub async fn generate(
        &mut self,
        request: GenerationRequest,
        producer: &dyn ChunkProducer,
        finalizer: Option<Finalizer>,
        sink: &mut dyn FrameSink,
        interrupt: &CancellationToken,
    ) -> GenerationOutcome {
        self.buffer.reset();
        draw(
            sink,
            &Frame::notice(
                "AI Assistant",
                FrameTone::Info,
                "Establishing connection to AI service...",
            ),
        );

        let end = self
            .drive(Pass::Fresh, &request.messages, producer, sink, interrupt)
            .await;
        self.conclude(Pass::Fresh, end, request.user_message, request.messages, finalizer, sink)
    }

    /// Continue the interrupted generation from its partial text.
    pub async fn resume(
        &mut self,
        producer: &dyn ChunkProducer,
        finalizer: Option<Finalizer>,
        sink: &mut dyn FrameSink,
        interrupt: &CancellationToken,
    ) -> Result<GenerationOutcome, StreamError> {
        let Some(state) = self.cancelled.as_ref() else {
            return Err(StreamError::NothingToResume);
        };
        let user_message = state.user_message.clone();
        let messages = state.original_messages.clone();
        self.buffer.seed(&state.partial_content);
        info!(
            partial_words = state.word_count,
            "resuming cancelled generation"
        );

        draw(
            sink,
            &Frame::notice(
                "AI Assistant - Resume",
                FrameTone::Warning,
                format!(
                    "Resuming response to: '{}'",
                    truncate_title(&user_message, BANNER_MAX_CHARS)
                ),
            ),
        );

        let end = self
            .drive(Pass::Resume, &messages, producer, sink, interrupt)
            .await;
        Ok(self.conclude(Pass::Resume, end, user_message, messages, finalizer, sink))
    }

    async fn drive(
        &mut self,
        pass: Pass,
        messages: &[ChatMessage],
        producer: &dyn ChunkProducer,
        sink: &mut dyn FrameSink,
        interrupt: &CancellationToken,
    ) -> DriveEnd {
        let mut stream = producer.open(messages);
        let mut pacer = FramePacer::new(self.options.refresh_per_second);

        loop {
            let next = tokio::select! {
                biased;
                _ = interrupt.cancelled() => return DriveEnd::Interrupted,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    self.buffer.add_chunk(&chunk);
                    pacer.mark_dirty();
                    if pacer.take_due() {
                        draw(sink, &self.streaming_frame(pass));
                    }
                }
                Some(Err(err)) => return DriveEnd::Failed(err),
                None => return DriveEnd::Exhausted,
            }
        }
    }

    fn conclude(
        &mut self,
        pass: Pass,
        end: DriveEnd,
        user_message: String,
        messages: Vec<ChatMessage>,
        finalizer: Option<Finalizer>,
        sink: &mut dyn FrameSink,
    ) -> GenerationOutcome {
        match end {
            DriveEnd::Exhausted => {
                let text = self.buffer.full_output().to_string();
                let body = FrameBody::Markdown(text.clone());
                let frame = match finalizer {
                    Some(finalizer) => finalizer(body, &text),
                    None => Frame::new(pass.complete_title(), FrameTone::Success, body),
                };
                finalize(sink, &frame);
                if pass == Pass::Resume {
                    self.cancelled = None;
                    debug!("cleared cancellation slot after resume");
                }
                GenerationOutcome::Completed(text)
            }
            DriveEnd::Interrupted => {
                let partial = self.buffer.full_output().to_string();
                let body = if partial.is_empty() {
                    FrameBody::Notice(pass.cancelled_notice().to_string())
                } else {
                    FrameBody::Markdown(partial.clone())
                };
                finalize(sink, &Frame::new(pass.cancelled_title(), FrameTone::Warning, body));

                info!(words = self.buffer.word_count(), "generation cancelled");
                self.cancelled = Some(CancelledStreamState {
                    original_messages: messages,
                    word_count: self.buffer.word_count(),
                    partial_content: partial,
                    user_message,
                    timestamp: Local::now(),
                });
                GenerationOutcome::Cancelled
            }
            DriveEnd::Failed(err) => {
                warn!(error = %err, "chunk producer failed");
                let message = format!(" Error: {err}");
                finalize(
                    sink,
                    &Frame::new(
                        pass.error_title(),
                        FrameTone::Error,
                        FrameBody::Markdown(message.clone()),
                    ),
                );
                GenerationOutcome::Failed(message)
            }
        }
    }

    fn streaming_frame(&self, pass: Pass) -> Frame {
        let lines = self.buffer.render_lines(true);
        let body = if lines.iter().all(|line| line.trim().is_empty()) {
            format!("{CONNECTING_PLACEHOLDER}{CURSOR_MARKER}")
        } else {
            lines.join("\n")
        };
        Frame::new(
            pass.streaming_title(),
            pass.streaming_tone(),
            FrameBody::Markdown(body),
        )
    }
}

impl Default for GenerationController {
    fn default() -> Self {
        Self::new(GenerationOptions::default())
    }
}

fn draw(sink: &mut dyn FrameSink, frame: &Frame) {
    if let Err(err) = sink.draw(frame) {
        debug!(error = %err, "live draw failed");
    }
}

fn finalize(sink: &mut dyn FrameSink, frame: &Frame) {
    if let Err(err) = sink.finalize(frame) {
        warn!(error = %err, "failed to render final frame");
    }
}
