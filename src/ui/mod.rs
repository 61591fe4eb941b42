//! Terminal presentation for streamed commands and AI responses.
//!
//! The streaming engines in [`crate::core`] describe what to show as
//! [`frame::Frame`] values. This layer decides how they look:
//! - [`live`]: the inline viewport that redraws a panel below the prompt and
//!   commits finished panels to scrollback, plus a plain-text fallback.
//! - [`markdown`]: renders AI replies into styled lines.
//! - [`theme`]: panel border and title styles per tone.
//! - [`prompt`]: the prompt line reader and the hidden password prompt.

pub mod frame;
pub mod live;
pub mod markdown;
pub mod prompt;
pub mod theme;
