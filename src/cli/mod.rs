//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod settings;

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::cli::settings::{set_key, unset_key, SettingRegistry};
use crate::core::config::Config;
use crate::core::providers::openai::OpenAiProducer;
use crate::core::providers::resolve_session;
use crate::core::session::{Flow, HybridSession, SessionIo};
use crate::core::terminal_mode::stdin_is_interactive;
use crate::ui::frame::FrameSink;
use crate::ui::live::stdout_sink;
use crate::ui::prompt::{LineReader, ReadOutcome, TerminalSecretPrompt};
use crate::ui::theme::PanelTheme;
use crate::utils::logging::init_tracing;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (git ",
    env!("VERGEN_GIT_SHA"),
    ")"
);

/// Exit status for a command that could not be started.
const SPAWN_FAILED_EXIT: i32 = 127;

#[derive(Parser, Debug)]
#[command(name = "simpl")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "An interactive shell with an AI chat mode")]
#[command(
    long_about = "simpl is a line-oriented shell that streams command output into a live \
panel and lets you switch to an AI assistant without leaving the prompt.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    API key for the AI assistant\n\
  OPENAI_BASE_URL   Custom API base URL (optional, defaults to https://api.openai.com/v1)\n\
  SIMPL_LOG_FILE    Write logs to this file (same as --log)\n\
  SIMPL_LOG         Log filter, e.g. debug or simpl=trace (default: info)\n\n\
Prompt:\n\
  ?<message>        Ask the AI from shell mode\n\
  /ai, /shell       Switch modes\n\
  resume            Continue the last cancelled AI response\n\
  cancelstate       Show the cancelled response waiting to resume\n\
  Ctrl+C            Cancel the running command or response\n\
  exit              Leave simpl"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Write logs to this file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Model to use for AI requests
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the interactive shell (default)
    Shell,
    /// Run one command with live output and exit with its status
    Run {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Ask the AI assistant a single question
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        message: Vec<String>,
    },
    /// Set configuration values; lists keys when none is given
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key (can be multiple words)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
    /// Print the effective configuration
    Config,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let log_path = init_tracing(args.log.as_deref())?;
    if let Some(path) = &log_path {
        info!(path = %path.display(), "logging enabled");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let code = runtime.block_on(async_main(args))?;
    // A reader thread may still be blocked on stdin.
    runtime.shutdown_background();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn async_main(args: Args) -> Result<i32, Box<dyn Error>> {
    match args.command.unwrap_or(Commands::Shell) {
        Commands::Shell => {
            let config = Config::load()?;
            let mut console = Console::open(&config);
            let mut session = build_session(config, args.model.as_deref())?;
            run_repl(&mut session, &mut console).await?;
            Ok(0)
        }
        Commands::Run { command } => {
            let config = Config::load()?;
            let mut console = Console::open(&config);
            let mut session = build_session(config, args.model.as_deref())?;
            run_once(&mut session, &mut console, &command.join(" ")).await
        }
        Commands::Ask { message } => {
            let config = Config::load()?;
            let mut console = Console::open(&config);
            let mut session = build_session(config, args.model.as_deref())?;
            ask_once(&mut session, &mut console, message.join(" ")).await
        }
        Commands::Set { key, value } => {
            let registry = SettingRegistry::new();
            let Some(key) = key else {
                list_settings(&registry)?;
                return Ok(0);
            };
            Ok(report(set_key(&registry, &key, &value)))
        }
        Commands::Unset { key } => {
            let registry = SettingRegistry::new();
            Ok(report(unset_key(&registry, &key)))
        }
        Commands::Config => {
            Config::load()?.print_all();
            Ok(0)
        }
    }
}

fn report(result: Result<String, settings::SettingError>) -> i32 {
    match result {
        Ok(message) => {
            println!("{message}");
            0
        }
        Err(err) => {
            err.print();
            err.exit_code()
        }
    }
}

fn list_settings(registry: &SettingRegistry) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    println!("Available keys (simpl set <key> <value>):");
    for line in registry.describe(&config) {
        println!("{line}");
    }
    Ok(())
}

fn build_session(
    config: Config,
    model_override: Option<&str>,
) -> Result<HybridSession, Box<dyn Error>> {
    let cwd = std::env::current_dir()?;
    let resolved = resolve_session(&config, model_override);
    let session = HybridSession::new(config, cwd);

    Ok(match resolved {
        Ok(provider) => {
            info!(
                provider = %provider.provider_display_name,
                model = %provider.model,
                "AI provider configured"
            );
            session.with_producer(Arc::new(OpenAiProducer::new(provider)))
        }
        Err(err) => {
            warn!(error = %err, "AI mode unavailable");
            let mut reason = err.to_string();
            reason.push_str("\nQuick fixes:");
            for fix in err.quick_fixes() {
                reason.push_str("\n  ");
                reason.push_str(fix);
            }
            session.without_producer(reason)
        }
    })
}

/// The sinks and prompt a session draws through on the real terminal.
struct Console {
    shell_sink: Box<dyn FrameSink>,
    ai_sink: Box<dyn FrameSink>,
    secrets: TerminalSecretPrompt,
    forward_keys: bool,
}

impl Console {
    fn open(config: &Config) -> Self {
        let theme = PanelTheme::from_config(config);
        Self {
            shell_sink: stdout_sink(
                theme.clone(),
                config.multiplexer_options().max_visible_lines,
            ),
            ai_sink: stdout_sink(theme, config.generation_options().max_visible_lines),
            secrets: TerminalSecretPrompt,
            forward_keys: stdin_is_interactive(),
        }
    }

    fn io<'a>(&'a mut self, out: &'a mut dyn Write) -> SessionIo<'a> {
        SessionIo {
            shell_sink: self.shell_sink.as_mut(),
            ai_sink: self.ai_sink.as_mut(),
            secrets: &mut self.secrets,
            out,
            forward_keys: self.forward_keys,
            interrupt: None,
        }
    }
}

async fn run_repl(
    session: &mut HybridSession,
    console: &mut Console,
) -> Result<(), Box<dyn Error>> {
    let mut reader = LineReader::stdin();
    let mut stdout = io::stdout();

    if stdin_is_interactive() {
        println!("simpl {} - type 'help' for commands.", env!("CARGO_PKG_VERSION"));
    }

    loop {
        let prompt = session.prompt();
        // The editor blocks on terminal input; keep it off the async workers.
        let (returned, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = reader.read(&prompt);
            (reader, outcome)
        })
        .await?;
        reader = returned;

        let line = match outcome? {
            ReadOutcome::Line(line) => line,
            ReadOutcome::Interrupted => continue,
            ReadOutcome::Eof => break,
        };

        let mut io = console.io(&mut stdout);
        let flow = session.handle_line(&line, &mut io).await?;
        stdout.flush()?;
        if flow == Flow::Exit {
            break;
        }
    }
    info!("session ended");
    Ok(())
}

async fn run_once(
    session: &mut HybridSession,
    console: &mut Console,
    command: &str,
) -> Result<i32, Box<dyn Error>> {
    let mut stdout = io::stdout();
    let mut io = console.io(&mut stdout);

    let code = match session.run_shell(command, &mut io).await? {
        Some(outcome) if outcome.cancelled => 130,
        Some(outcome) => outcome.exit_code.unwrap_or(0),
        None => SPAWN_FAILED_EXIT,
    };
    stdout.flush()?;
    Ok(code)
}

async fn ask_once(
    session: &mut HybridSession,
    console: &mut Console,
    message: String,
) -> Result<i32, Box<dyn Error>> {
    let mut stdout = io::stdout();
    let mut io = console.io(&mut stdout);

    let before = session.conversation().len();
    session.ask(message, &mut io).await?;
    stdout.flush()?;
    Ok(if session.conversation().len() > before {
        0
    } else {
        1
    })
}
