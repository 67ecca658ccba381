//! # pwnview-protocol
//!
//! Wire codec for the GDB Machine Interface (GDB/MI).
//!
//! GDB started with `--interpreter=mi3` prints one record per line. Every
//! record starts with a one-character prefix that tells you what kind of
//! record it is:
//!
//! | Prefix | Record | Example |
//! |---|---|---|
//! | `^` | result (completion of a command) | `12^done` |
//! | `*` | exec async (run state change) | `*stopped,reason="breakpoint-hit"` |
//! | `+` | status async | `+download,...` |
//! | `=` | notify async | `=thread-group-exited,id="i1"` |
//! | `~` | console stream | `~"0x7f0000\n"` |
//! | `@` | target stream | `@"hello"` |
//! | `&` | log stream | `&"hexdump 0x1000 64\n"` |
//!
//! Result and async records may be prefixed by a numeric token, which GDB
//! echoes from the command that produced them. Lines that match none of the
//! prefixes are the debuggee's own output (GDB shares its terminal with the
//! inferior unless told otherwise).
//!
//! ## Usage
//!
//! ```rust
//! use pwnview_protocol::{parse_line, Record, ResultClass};
//!
//! let record = parse_line(r#"11^error,msg="No registers.""#).unwrap().unwrap();
//! assert_eq!(record.token(), Some(11));
//! match record {
//!     Record::Result { class, .. } => assert_eq!(class, ResultClass::Error),
//!     _ => unreachable!(),
//! }
//! ```

pub mod encode;
pub mod error;
pub mod parser;
pub mod record;

pub use encode::encode_command;
pub use error::{ProtocolError, Result};
pub use parser::{decode_cstring, parse_line};
pub use record::{AsyncKind, Record, ResultClass, StreamKind, Value};
