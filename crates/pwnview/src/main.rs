use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use pwnview_core::{Session, SessionConfig, SessionError, StopFlushPolicy};
use pwnview_utils::{LogLevel, info, init_logging_to_file, warn};

mod command;
mod event;
mod render;

use command::{Action, Flow};
use event::{Event, EventHandler};

/// Multi-pane GDB/pwndbg front end.
///
/// Lines typed at the prompt go to GDB; every pane (registers, stack,
/// disassembly, code, backtrace, heap, watches) is refreshed after each one.
/// Type `:help` for front-end commands.
#[derive(Parser, Debug)]
#[command(name = "pwnview")]
#[command(version)]
#[command(about = "Multi-pane GDB/pwndbg front end", long_about = None)]
struct Cli
{
    /// Executable to load
    #[arg(conflicts_with = "pid")]
    file: Option<PathBuf>,
    /// Attach to a running process instead of loading a file
    #[arg(short, long)]
    pid: Option<u32>,
    /// GDB executable (default: $PWNVIEW_GDB or gdb)
    #[arg(long)]
    gdb: Option<PathBuf>,
    /// Init file replayed at startup (default: ~/.gdbinit)
    #[arg(long, conflicts_with = "no_gdbinit")]
    gdbinit: Option<PathBuf>,
    /// Do not replay any init file
    #[arg(long, default_value_t = false)]
    no_gdbinit: bool,
    /// Default number of bytes dumped per watch
    #[arg(long)]
    watch_bytes: Option<usize>,
    /// How often the reader checks for shutdown, in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,
    /// Only flush the main pane on breakpoint hits, end of stepping and exits
    #[arg(long, default_value_t = false)]
    flush_listed_stops: bool,
    /// Log level (error, warn, info, debug, trace). Overrides `RUST_LOG`.
    #[arg(long)]
    log_level: Option<LogLevel>,
}

fn main()
{
    let cli = Cli::parse();

    // Pane output owns the terminal, so logs go to a file
    let (log_file, _guard) = match init_logging_to_file(cli.log_level) {
        Ok(logging) => logging,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };
    println!("Logging to {}", log_file.display());

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            process::exit(1);
        }
    };
    let result = rt.block_on(run(cli));
    // The stdin reader stays blocked in read_line until the next keypress
    rt.shutdown_timeout(Duration::from_millis(100));

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn session_config(cli: &Cli) -> Result<SessionConfig, SessionError>
{
    let mut config = SessionConfig::from_env()?;
    if let Some(gdb) = &cli.gdb {
        config.gdb_path.clone_from(gdb);
    }
    if cli.no_gdbinit {
        config.init_file = None;
    } else if let Some(init_file) = &cli.gdbinit {
        config.init_file = Some(init_file.clone());
    }
    if let Some(bytes) = cli.watch_bytes {
        if bytes == 0 {
            return Err(SessionError::Config("--watch-bytes must be positive".to_string()));
        }
        config.default_watch_bytes = bytes;
    }
    if let Some(millis) = cli.poll_ms {
        if millis == 0 {
            return Err(SessionError::Config("--poll-ms must be positive".to_string()));
        }
        config.poll_interval = Duration::from_millis(millis);
    }
    if cli.flush_listed_stops {
        config.stop_flush = StopFlushPolicy::ListedReasons;
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), SessionError>
{
    let config = session_config(&cli)?;
    info!("Starting {} {:?}", config.gdb_path.display(), config.gdb_args);
    let (mut session, events) = Session::start(config)?;

    if let Some(file) = &cli.file {
        session.dispatcher().set_file_target(file);
    } else if let Some(pid) = cli.pid {
        session.dispatcher().set_pid_target(pid);
    }

    let mut handler = EventHandler::new(events);
    loop {
        let Ok(next) = tokio::time::timeout(Duration::from_millis(100), handler.next()).await else {
            if !session.is_running() {
                println!("gdb exited");
                break;
            }
            continue;
        };

        match next {
            Some(Event::Input(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Action>() {
                    Ok(action) => match action.apply(&session) {
                        Ok(Flow::Quit) => break,
                        Ok(Flow::Continue) => {}
                        Err(e) => println!("{e}"),
                    },
                    Err(message) => println!("{message}"),
                }
            }
            Some(Event::Session(event)) => print!("{}", render::render(&event)),
            Some(Event::InputClosed) | None => break,
        }
    }

    if handler.running_tasks() > 1 {
        warn!("Input reader still blocked at exit");
    }
    handler.stop();
    session.shutdown();
    info!("Session closed");
    Ok(())
}

#[cfg(test)]
mod tests
{
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_targets_conflict()
    {
        assert!(Cli::try_parse_from(["pwnview", "./vuln", "--pid", "42"]).is_err());
        let cli = Cli::try_parse_from(["pwnview", "--pid", "42"]).unwrap();
        assert_eq!(cli.pid, Some(42));
        assert!(cli.file.is_none());
    }

    #[test]
    fn test_cli_overrides_config()
    {
        let cli = Cli::try_parse_from([
            "pwnview",
            "--gdb",
            "/opt/gdb",
            "--no-gdbinit",
            "--watch-bytes",
            "32",
            "--poll-ms",
            "20",
            "--flush-listed-stops",
        ])
        .unwrap();
        let config = session_config(&cli).unwrap();
        assert_eq!(config.gdb_path, PathBuf::from("/opt/gdb"));
        assert!(config.init_file.is_none());
        assert_eq!(config.default_watch_bytes, 32);
        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert_eq!(config.stop_flush, StopFlushPolicy::ListedReasons);
    }

    #[test]
    fn test_cli_rejects_zero()
    {
        let cli = Cli::try_parse_from(["pwnview", "--watch-bytes", "0"]).unwrap();
        assert!(matches!(session_config(&cli), Err(SessionError::Config(_))));
    }

    #[test]
    fn test_flush_listed_stops_help_matches_policy()
    {
        let command = Cli::command();
        let help = command
            .get_arguments()
            .find(|arg| arg.get_id() == "flush_listed_stops")
            .and_then(|arg| arg.get_help())
            .map(ToString::to_string)
            .unwrap();
        assert_eq!(StopFlushPolicy::LISTED, ["breakpoint-hit", "end-stepping-range", "exited"]);
        for word in ["breakpoint", "stepping", "exits"] {
            assert!(help.contains(word), "{help}");
        }
        assert!(!help.contains("signal"), "{help}");
    }

    #[test]
    fn test_cli_log_level()
    {
        let cli = Cli::try_parse_from(["pwnview", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
    }
}
