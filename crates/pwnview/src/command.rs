//! Front-end commands.
//!
//! Anything typed at the prompt goes to GDB as a user command, except lines
//! starting with `:`, which drive the session itself (targets, watches, heap
//! views). The `:` prefix never clashes with GDB syntax.

use std::path::PathBuf;
use std::str::FromStr;

use pwnview_core::{Result as SessionResult, Session};

/// Help text for `:help`.
pub const HELP: &str = "\
Lines without a ':' prefix are sent to gdb, followed by a refresh of every pane.

  :file <path>               load an executable
  :attach <pid>              attach to a running process
  :dir <path>                add a source directory
  :set <setting> <value>     change a gdb setting
  :exec <command>            run a command without refreshing the panes
  :refresh                   refresh every pane
  :heap | :bins | :fsbase    query a single view
  :tryfree <addr>            check whether free(<addr>) would succeed
  :xinfo <addr>              describe what an address points into
  :search <args>             search memory
  :stack-lines <n>           number of lines in the stack pane
  :catalog                   list pwndbg commands
  :watch add <expr> [bytes]  hexdump <expr> after every command
  :watch del <expr>          stop watching <expr>
  :watch bytes <expr> <n>    change how many bytes are dumped
  :watches                   list active watches
  :help                      show this help
  :quit                      exit
";

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action
{
    /// Send to GDB and refresh everything
    User(String),
    Exec(String),
    File(PathBuf),
    Attach(u32),
    SourceDir(PathBuf),
    Set(String),
    Refresh,
    Heap,
    Bins,
    FsBase,
    TryFree(String),
    AddressInfo(String),
    Search(String),
    StackLines(u32),
    Catalog,
    WatchAdd
    {
        expression: String,
        bytes: Option<usize>,
    },
    WatchDelete(String),
    WatchBytes
    {
        expression: String,
        bytes: usize,
    },
    ListWatches,
    Help,
    Quit,
}

/// What the input loop does after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow
{
    Continue,
    Quit,
}

fn required(command: &str, rest: &str) -> Result<String, String>
{
    let rest = rest.trim();
    if rest.is_empty() {
        Err(format!("Usage: :{command} <argument> (see :help)"))
    } else {
        Ok(rest.to_string())
    }
}

fn number<T: FromStr>(what: &str, value: &str) -> Result<T, String>
{
    value.trim().parse().map_err(|_| format!("Invalid {what}: '{}'", value.trim()))
}

fn parse_watch(rest: &str) -> Result<Action, String>
{
    let mut words = rest.split_whitespace();
    match (words.next(), words.collect::<Vec<_>>().as_slice()) {
        (Some("add"), [expression]) => Ok(Action::WatchAdd {
            expression: (*expression).to_string(),
            bytes: None,
        }),
        (Some("add"), [expression, bytes]) => Ok(Action::WatchAdd {
            expression: (*expression).to_string(),
            bytes: Some(number("byte count", bytes)?),
        }),
        (Some("del" | "delete" | "rm"), [expression]) => Ok(Action::WatchDelete((*expression).to_string())),
        (Some("bytes"), [expression, bytes]) => Ok(Action::WatchBytes {
            expression: (*expression).to_string(),
            bytes: number("byte count", bytes)?,
        }),
        _ => Err("Usage: :watch add <expr> [bytes] | :watch del <expr> | :watch bytes <expr> <n>".to_string()),
    }
}

impl FromStr for Action
{
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err>
    {
        let line = line.trim();
        if line.is_empty() {
            return Err("Empty command".to_string());
        }
        let Some(control) = line.strip_prefix(':') else {
            return Ok(Action::User(line.to_string()));
        };

        let (command, rest) = control.split_once(char::is_whitespace).unwrap_or((control, ""));
        match command {
            "file" => Ok(Action::File(PathBuf::from(required(command, rest)?))),
            "attach" => Ok(Action::Attach(number("pid", &required(command, rest)?)?)),
            "dir" => Ok(Action::SourceDir(PathBuf::from(required(command, rest)?))),
            "set" => Ok(Action::Set(required(command, rest)?)),
            "exec" => Ok(Action::Exec(required(command, rest)?)),
            "refresh" => Ok(Action::Refresh),
            "heap" => Ok(Action::Heap),
            "bins" => Ok(Action::Bins),
            "fsbase" => Ok(Action::FsBase),
            "tryfree" => Ok(Action::TryFree(required(command, rest)?)),
            "xinfo" => Ok(Action::AddressInfo(required(command, rest)?)),
            "search" => Ok(Action::Search(required(command, rest)?)),
            "stack-lines" => Ok(Action::StackLines(number("line count", &required(command, rest)?)?)),
            "catalog" => Ok(Action::Catalog),
            "watch" => parse_watch(rest),
            "watches" => Ok(Action::ListWatches),
            "help" | "h" => Ok(Action::Help),
            "quit" | "q" | "exit" => Ok(Action::Quit),
            other => Err(format!("Unknown command ':{other}' (see :help)")),
        }
    }
}

impl Action
{
    /// Carry out the action on `session`.
    ///
    /// ## Errors
    ///
    /// Returns watch errors (duplicate or unknown expression, zero byte count).
    pub fn apply(self, session: &Session) -> SessionResult<Flow>
    {
        let dispatcher = session.dispatcher();
        match self {
            Action::User(command) => dispatcher.send_user_command(&command),
            Action::Exec(command) => dispatcher.execute(&command),
            Action::File(path) => dispatcher.set_file_target(&path),
            Action::Attach(pid) => dispatcher.set_pid_target(pid),
            Action::SourceDir(dir) => dispatcher.set_source_dir(&dir),
            Action::Set(args) => dispatcher.change_setting(&args),
            Action::Refresh => dispatcher.refresh_all_contexts(),
            Action::Heap => dispatcher.heap(),
            Action::Bins => dispatcher.bins(),
            Action::FsBase => dispatcher.fs_base(),
            Action::TryFree(address) => dispatcher.try_free(&address),
            Action::AddressInfo(address) => dispatcher.lookup_address_info(&address),
            Action::Search(args) => dispatcher.search(&args),
            Action::StackLines(lines) => dispatcher.update_stack_lines(lines),
            Action::Catalog => dispatcher.request_command_catalog(),
            Action::WatchAdd { expression, bytes } => {
                let index = match bytes {
                    Some(bytes) => dispatcher.add_watch_with_bytes(&expression, bytes)?,
                    None => dispatcher.add_watch(&expression)?,
                };
                println!("Watching {expression} as {index}");
            }
            Action::WatchDelete(expression) => {
                let watch = dispatcher.delete_watch(&expression)?;
                println!("Stopped watching {}", watch.expression);
            }
            Action::WatchBytes { expression, bytes } => dispatcher.set_watch_byte_count(&expression, bytes)?,
            Action::ListWatches => {
                let watches = session.watches();
                if watches.is_empty() {
                    println!("No active watches");
                }
                for watch in watches {
                    println!("{:>4}  {:<24} {} bytes", watch.index.to_string(), watch.expression, watch.byte_count);
                }
            }
            Action::Help => print!("{HELP}"),
            Action::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }
}
