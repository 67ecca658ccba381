//! Outbound command encoding.

use crate::error::{ProtocolError, Result};

/// Encode a command line tagged with a correlation token.
///
/// GDB/MI accepts plain CLI commands as well as `-`-prefixed MI commands after
/// the token; the text is passed through untouched apart from the trailing
/// newline that terminates the line.
///
/// ## Errors
///
/// Returns [`ProtocolError::EmbeddedNewline`] if `text` contains `\n` or `\r`.
///
/// ## Example
///
/// ```rust
/// use pwnview_protocol::encode_command;
///
/// assert_eq!(encode_command(5, "context regs").unwrap(), "5context regs\n");
/// ```
pub fn encode_command(token: u64, text: &str) -> Result<String>
{
    if text.contains(['\n', '\r']) {
        return Err(ProtocolError::EmbeddedNewline);
    }
    Ok(format!("{token}{text}\n"))
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_token_prefixes_text()
    {
        assert_eq!(encode_command(0, "set confirm off").unwrap(), "0set confirm off\n");
        assert_eq!(encode_command(1003, "hexdump 0x1000 64").unwrap(), "1003hexdump 0x1000 64\n");
    }

    #[test]
    fn test_line_breaks_rejected()
    {
        assert_eq!(encode_command(1, "run\nkill"), Err(ProtocolError::EmbeddedNewline));
        assert_eq!(encode_command(1, "run\r"), Err(ProtocolError::EmbeddedNewline));
    }
}
