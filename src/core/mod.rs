pub mod config;
pub mod error;
pub mod generation;
pub mod interrupt;
pub mod message;
pub mod multiplexer;
pub mod process;
pub mod providers;
pub mod render_buffer;
pub mod session;
pub mod terminal_mode;
