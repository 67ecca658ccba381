//! # MI Line Parser
//!
//! Hand-written recursive descent over one output line, driven by a byte
//! cursor:
//!
//! ```text
//! record  := [token] ('^' class | '*' class | '+' class | '=' class) (',' result)*
//!          | ('~' | '@' | '&') c-string
//!          | "(gdb)"
//! result  := name '=' value
//! value   := c-string | '{' [result (',' result)*] '}' | '[' [item (',' item)*] ']'
//! item    := value | result
//! ```

use crate::error::{ProtocolError, Result};
use crate::record::{AsyncKind, MiResult, Record, StreamKind, Value};

/// Parse a single line of GDB/MI output.
///
/// Returns `Ok(None)` for blank lines. Lines that are not MI records are
/// returned as [`Record::Output`]: they come from the inferior writing to the
/// terminal it shares with GDB. That includes untagged lines that merely
/// start with an MI prefix character, such as `*** stack smashing detected ***`
/// or `+----+`.
///
/// ## Errors
///
/// Returns a [`ProtocolError`] when a line starts with a token and an MI
/// prefix but does not follow the grammar (unterminated strings, unknown
/// result class, trailing garbage).
///
/// ## Example
///
/// ```rust
/// use pwnview_protocol::{parse_line, Record, StreamKind};
///
/// let record = parse_line(r#"~"rax 0x0\n""#).unwrap();
/// assert_eq!(
///     record,
///     Some(Record::Stream { kind: StreamKind::Console, text: "rax 0x0\n".to_string() })
/// );
/// ```
pub fn parse_line(line: &str) -> Result<Option<Record>>
{
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }
    if line.trim_end() == "(gdb)" {
        return Ok(Some(Record::Prompt));
    }

    let tagged = line.starts_with(|c: char| c.is_ascii_digit());
    match parse_record(line) {
        Ok(record) => Ok(Some(record)),
        Err(_) if !tagged => Ok(Some(Record::Output(line.to_string()))),
        Err(e) => Err(e),
    }
}

fn parse_record(line: &str) -> Result<Record>
{
    let mut cursor = Cursor::new(line);

    let stream = match cursor.peek() {
        Some(b'~') => Some(StreamKind::Console),
        Some(b'@') => Some(StreamKind::Target),
        Some(b'&') => Some(StreamKind::Log),
        _ => None,
    };
    if let Some(kind) = stream {
        // A debuggee printing "~foo" is not an MI stream record
        if cursor.peek_at(1) != Some(b'"') {
            return Ok(Record::Output(line.to_string()));
        }
        cursor.bump();
        let text = cursor.cstring()?;
        cursor.expect_end()?;
        return Ok(Record::Stream { kind, text });
    }

    let digits = cursor.take_while(|b| b.is_ascii_digit());
    let prefix = cursor.peek();
    if !matches!(prefix, Some(b'^' | b'*' | b'+' | b'=')) {
        return Ok(Record::Output(line.to_string()));
    }
    let token = if digits.is_empty() {
        None
    } else {
        Some(
            digits
                .parse::<u64>()
                .map_err(|_| ProtocolError::InvalidToken(digits.to_string()))?,
        )
    };
    cursor.bump();

    if !cursor.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
        return Err(cursor.unexpected());
    }
    let class = cursor.take_while(is_name_byte);
    let results = cursor.results_until_end()?;

    let record = match prefix {
        Some(b'^') => Record::Result {
            token,
            class: class.parse()?,
            results,
        },
        Some(b'*') => Record::Async {
            kind: AsyncKind::Exec,
            token,
            class: class.to_string(),
            results,
        },
        Some(b'+') => Record::Async {
            kind: AsyncKind::Status,
            token,
            class: class.to_string(),
            results,
        },
        _ => Record::Async {
            kind: AsyncKind::Notify,
            token,
            class: class.to_string(),
            results,
        },
    };
    Ok(record)
}

/// Decode the body of a C-string literal (without the surrounding quotes).
///
/// GDB escapes non-ASCII bytes as three-digit octal sequences, so the decoded
/// bytes are not guaranteed to be UTF-8. Invalid sequences are replaced with
/// U+FFFD rather than rejected.
///
/// ## Errors
///
/// Returns [`ProtocolError::UnexpectedEnd`] if the body ends with a lone
/// backslash.
pub fn decode_cstring(body: &str) -> Result<String>
{
    let mut bytes = Vec::with_capacity(body.len());
    let mut iter = body.bytes().peekable();
    while let Some(b) = iter.next() {
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        let escaped = iter.next().ok_or(ProtocolError::UnexpectedEnd)?;
        match escaped {
            b'n' => bytes.push(b'\n'),
            b't' => bytes.push(b'\t'),
            b'r' => bytes.push(b'\r'),
            b'e' => bytes.push(0x1b),
            b'a' => bytes.push(0x07),
            b'b' => bytes.push(0x08),
            b'f' => bytes.push(0x0c),
            b'v' => bytes.push(0x0b),
            b'\\' | b'"' | b'\'' => bytes.push(escaped),
            b'0'..=b'7' => {
                let mut value = u32::from(escaped - b'0');
                for _ in 0..2 {
                    match iter.peek() {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            iter.next();
                        }
                        _ => break,
                    }
                }
                bytes.push((value & 0xff) as u8);
            }
            other => {
                bytes.push(b'\\');
                bytes.push(other);
            }
        }
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn is_name_byte(b: u8) -> bool
{
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

struct Cursor<'a>
{
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a>
{
    fn new(src: &'a str) -> Self
    {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<u8>
    {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8>
    {
        self.src.as_bytes().get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8>
    {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn eat(&mut self, expected: u8) -> bool
    {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: u8) -> Result<()>
    {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_end(&self) -> Result<()>
    {
        if self.pos == self.src.len() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> ProtocolError
    {
        match self.src[self.pos..].chars().next() {
            Some(found) => ProtocolError::UnexpectedChar { pos: self.pos, found },
            None => ProtocolError::UnexpectedEnd,
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str
    {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    /// Parse a quoted C-string; the cursor must sit on the opening quote.
    fn cstring(&mut self) -> Result<String>
    {
        let start = self.pos;
        self.expect(b'"')?;
        let body_start = self.pos;
        loop {
            match self.bump() {
                Some(b'\\') => {
                    if self.bump().is_none() {
                        return Err(ProtocolError::UnterminatedString(start));
                    }
                }
                Some(b'"') => break,
                Some(_) => {}
                None => return Err(ProtocolError::UnterminatedString(start)),
            }
        }
        decode_cstring(&self.src[body_start..self.pos - 1])
    }

    fn results_until_end(&mut self) -> Result<Vec<MiResult>>
    {
        let mut results = Vec::new();
        while self.eat(b',') {
            results.push(self.result()?);
        }
        self.expect_end()?;
        Ok(results)
    }

    fn result(&mut self) -> Result<MiResult>
    {
        let name = self.take_while(is_name_byte);
        if name.is_empty() {
            return Err(self.unexpected());
        }
        self.expect(b'=')?;
        let value = self.value()?;
        Ok((name.to_string(), value))
    }

    fn value(&mut self) -> Result<Value>
    {
        match self.peek() {
            Some(b'"') => self.cstring().map(Value::Const),
            Some(b'{') => self.tuple(),
            Some(b'[') => self.list(),
            _ => Err(self.unexpected()),
        }
    }

    fn tuple(&mut self) -> Result<Value>
    {
        self.expect(b'{')?;
        let mut results = Vec::new();
        if self.eat(b'}') {
            return Ok(Value::Tuple(results));
        }
        loop {
            results.push(self.result()?);
            if self.eat(b'}') {
                return Ok(Value::Tuple(results));
            }
            self.expect(b',')?;
        }
    }

    fn list(&mut self) -> Result<Value>
    {
        self.expect(b'[')?;
        let mut items = Vec::new();
        if self.eat(b']') {
            return Ok(Value::List(items));
        }
        loop {
            let item = if matches!(self.peek(), Some(b'"' | b'{' | b'[')) {
                self.value()?
            } else {
                let (name, value) = self.result()?;
                Value::Tuple(vec![(name, value)])
            };
            items.push(item);
            if self.eat(b']') {
                return Ok(Value::List(items));
            }
            self.expect(b',')?;
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::record::ResultClass;

    fn parse(line: &str) -> Record
    {
        parse_line(line).unwrap().unwrap()
    }

    #[test]
    fn test_blank_and_prompt_lines()
    {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   \r\n").unwrap(), None);
        assert_eq!(parse("(gdb) "), Record::Prompt);
    }

    #[test]
    fn test_result_with_token_and_error_message()
    {
        let record = parse(r#"5^error,msg="No symbol table is loaded.  Use the \"file\" command.""#);
        assert_eq!(record.token(), Some(5));
        assert_eq!(
            record.field_str("msg"),
            Some(r#"No symbol table is loaded.  Use the "file" command."#)
        );
        assert!(matches!(record, Record::Result { class: ResultClass::Error, .. }));
    }

    #[test]
    fn test_result_without_token()
    {
        let record = parse("^done");
        assert_eq!(record.token(), None);
        assert!(matches!(record, Record::Result { class: ResultClass::Done, ref results, .. } if results.is_empty()));
    }

    #[test]
    fn test_exec_async_stopped_with_frame()
    {
        let record = parse(
            r#"*stopped,reason="breakpoint-hit",disp="keep",bkptno="1",frame={addr="0x0000555555555131",func="main",args=[]},thread-id="1",stopped-threads="all""#,
        );
        match &record {
            Record::Async { kind, class, .. } => {
                assert_eq!(*kind, AsyncKind::Exec);
                assert_eq!(class, "stopped");
            }
            other => panic!("unexpected record {other:?}"),
        }
        assert_eq!(record.field_str("reason"), Some("breakpoint-hit"));
        let frame = record.field("frame").unwrap();
        assert_eq!(frame.field("func").and_then(Value::as_str), Some("main"));
        assert_eq!(frame.field("args"), Some(&Value::List(Vec::new())));
    }

    #[test]
    fn test_notify_records()
    {
        let record = parse(r#"=thread-group-exited,id="i1",exit-code="0""#);
        assert!(matches!(record, Record::Async { kind: AsyncKind::Notify, ref class, .. } if class == "thread-group-exited"));

        let record = parse(r#"=cmd-param-changed,param="context-stack-lines",value="12""#);
        assert_eq!(record.field_str("param"), Some("context-stack-lines"));
        assert_eq!(record.field_str("value"), Some("12"));
    }

    #[test]
    fn test_list_of_named_results()
    {
        let record = parse(r#"^done,stack=[frame={level="0",func="main"},frame={level="1",func="_start"}]"#);
        let Some(Value::List(frames)) = record.field("stack") else {
            panic!("expected list");
        };
        assert_eq!(frames.len(), 2);
        let level = frames[1].field("frame").and_then(|f| f.field("level"));
        assert_eq!(level.and_then(Value::as_str), Some("1"));
    }

    #[test]
    fn test_stream_records_decode_escapes()
    {
        assert_eq!(
            parse(r#"~"\033[31mred\033[0m\n""#),
            Record::Stream {
                kind: StreamKind::Console,
                text: "\x1b[31mred\x1b[0m\n".to_string()
            }
        );
        assert_eq!(
            parse(r#"&"hexdump 0x1000 64\n""#),
            Record::Stream {
                kind: StreamKind::Log,
                text: "hexdump 0x1000 64\n".to_string()
            }
        );
        assert!(matches!(parse(r#"@"x""#), Record::Stream { kind: StreamKind::Target, .. }));
    }

    #[test]
    fn test_octal_escapes_form_utf8()
    {
        // "é" is 0xc3 0xa9
        assert_eq!(decode_cstring(r"\303\251").unwrap(), "é");
        assert_eq!(decode_cstring(r"a\qb").unwrap(), r"a\qb");
        assert_eq!(decode_cstring("\\"), Err(ProtocolError::UnexpectedEnd));
    }

    #[test]
    fn test_non_mi_lines_are_inferior_output()
    {
        assert_eq!(parse("Hello, world!"), Record::Output("Hello, world!".to_string()));
        assert_eq!(parse("42 bottles"), Record::Output("42 bottles".to_string()));
        assert_eq!(parse("~tilde"), Record::Output("~tilde".to_string()));
    }

    #[test]
    fn test_inferior_lines_with_mi_prefix_are_output()
    {
        for line in [
            "*** stack smashing detected ***: terminated",
            "===== MENU =====",
            "+----+",
            "+----",
            "^^^",
            "=",
            r#"~"never closed"#,
            r#"^done,msg="a" trailing"#,
        ] {
            assert_eq!(parse(line), Record::Output(line.to_string()), "{line}");
        }
    }

    #[test]
    fn test_malformed_tagged_lines_are_errors()
    {
        assert!(matches!(
            parse_line("3^nonsense"),
            Err(ProtocolError::UnknownResultClass(class)) if class == "nonsense"
        ));
        assert!(matches!(
            parse_line(r#"4^done,msg="a" trailing"#),
            Err(ProtocolError::UnexpectedChar { found: ' ', .. })
        ));
        assert!(matches!(parse_line("99999999999999999999999^done"), Err(ProtocolError::InvalidToken(_))));
        assert!(matches!(parse_line("5^done,frame={"), Err(ProtocolError::UnexpectedEnd)));
        assert!(matches!(parse_line("6*"), Err(ProtocolError::UnexpectedEnd)));
    }
}
