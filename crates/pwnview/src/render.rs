//! Plain-terminal rendering of session events.
//!
//! Pane contents are printed as they come from pwndbg, colour escapes
//! included; a terminal renders them as-is. Every pane but main gets a
//! heading so the panes can be told apart in one scrolling stream.

use pwnview_core::{ContextPane, SessionEvent};

fn heading(title: &str) -> String
{
    format!("\u{2500}\u{2500}[ {title} ]{}\n", "\u{2500}".repeat(60usize.saturating_sub(title.len())))
}

fn with_newline(mut text: String) -> String
{
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Text to print for an event.
#[must_use]
pub fn render(event: &SessionEvent) -> String
{
    match event {
        SessionEvent::PaneUpdate { pane: ContextPane::Main, content } => String::from_utf8_lossy(content).into_owned(),
        SessionEvent::InferiorStateChanged { stopped: true } => "[inferior stopped]\n".to_string(),
        SessionEvent::InferiorStateChanged { stopped: false } => "[inferior running]\n".to_string(),
        SessionEvent::StackLinesChanged(lines) => format!("[stack pane shows {lines} lines]\n"),
        other => {
            let content = other.content().map(String::from_utf8_lossy).unwrap_or_default();
            heading(&other.label()) + &with_newline(content.into_owned())
        }
    }
}

#[cfg(test)]
mod tests
{
    use pwnview_core::WatchIndex;

    use super::*;

    #[test]
    fn test_main_printed_verbatim()
    {
        let event = SessionEvent::PaneUpdate { pane: ContextPane::Main, content: b"Breakpoint 1".to_vec() };
        assert_eq!(render(&event), "Breakpoint 1");
    }

    #[test]
    fn test_other_panes_get_heading()
    {
        let event = SessionEvent::PaneUpdate { pane: ContextPane::Registers, content: b"rax 0x0".to_vec() };
        let text = render(&event);
        assert!(text.starts_with("\u{2500}\u{2500}[ regs ]"));
        assert!(text.ends_with("rax 0x0\n"));

        let watch = SessionEvent::WatchResult {
            index: WatchIndex::from_raw(0),
            expression: "$rsp".to_string(),
            content: b"+0000 ...\n".to_vec(),
        };
        assert!(render(&watch).contains("[ watch $rsp ]"));
    }

    #[test]
    fn test_state_changes()
    {
        assert_eq!(render(&SessionEvent::InferiorStateChanged { stopped: true }), "[inferior stopped]\n");
        assert_eq!(render(&SessionEvent::StackLinesChanged(8)), "[stack pane shows 8 lines]\n");
    }
}
