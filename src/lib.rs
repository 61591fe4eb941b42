//! simpl is a line-oriented shell that can hand a line to an AI assistant.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns child processes, the shell output multiplexer, the AI
//!   generation controller with cancel and resume, and the hybrid session
//!   that routes each prompt line.
//! - [`ui`] turns frames into terminal output through an inline live region.
//! - [`api`] defines the chat-completions payloads sent to the provider.
//! - [`utils`] holds the line editor, logging setup and text helpers.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod ui;
pub mod utils;
