//! End-to-end routing tests: a session over an in-memory transport, fed with
//! GDB/MI lines as GDB would print them.

use std::io::{self, Write};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pwnview_core::{ContextPane, InferiorState, Session, SessionConfig, SessionEvent, SessionEventReceiver, Token, WatchIndex};
use pwnview_protocol::{parse_line, Record};

const SYNC: &str = "--sync--";

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<u8>>>);

impl Write for Recorder
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>
    {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()>
    {
        Ok(())
    }
}

impl Recorder
{
    fn lines(&self) -> Vec<String>
    {
        String::from_utf8(self.0.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

struct Harness
{
    session: Session,
    events: SessionEventReceiver,
    records: Sender<Record>,
    sent: Recorder,
}

impl Harness
{
    fn new() -> Self
    {
        let config = SessionConfig {
            poll_interval: Duration::from_millis(5),
            init_file: None,
            ..SessionConfig::default()
        };
        let sent = Recorder::default();
        let (records, inbound) = mpsc::channel();
        let (session, events) = Session::with_transport(config, sent.clone(), inbound).unwrap();
        Self { session, events, records, sent }
    }

    fn feed(&self, lines: &[&str])
    {
        for line in lines {
            let record = parse_line(line).unwrap().unwrap();
            self.records.send(record).unwrap();
        }
    }

    /// Everything routed before a main-pane marker fed after the given lines.
    fn route(&self, lines: &[&str]) -> Vec<SessionEvent>
    {
        self.feed(lines);
        let marker = format!("~\"{SYNC}\"");
        self.feed(&[marker.as_str(), "1^done"]);

        let mut routed = Vec::new();
        loop {
            let event = self.events.recv_timeout(Duration::from_secs(5)).expect("reader stalled");
            if event == (SessionEvent::PaneUpdate { pane: ContextPane::Main, content: SYNC.as_bytes().to_vec() }) {
                return routed;
            }
            routed.push(event);
        }
    }

    fn stop(&self)
    {
        self.route(&["*stopped,reason=\"breakpoint-hit\",bkptno=\"1\""]);
        assert_eq!(self.session.inferior_state(), InferiorState::Stopped);
    }

    fn run(&self)
    {
        self.route(&["*running,thread-id=\"all\""]);
        assert_eq!(self.session.inferior_state(), InferiorState::Running);
    }
}

fn pane(pane: ContextPane, content: &str) -> SessionEvent
{
    SessionEvent::PaneUpdate { pane, content: content.as_bytes().to_vec() }
}

#[test]
fn test_context_panes_only_routed_while_stopped()
{
    let harness = Harness::new();
    harness.run();

    for pane in ContextPane::REFRESHED {
        let raw = Token::Context(pane).raw();
        let routed = harness.route(&["~\"stale\\n\"", format!("{raw}^done").as_str()]);
        assert!(routed.is_empty(), "{pane} routed while running: {routed:?}");
    }

    harness.stop();
    for pane_id in ContextPane::REFRESHED {
        let raw = Token::Context(pane_id).raw();
        let routed = harness.route(&["~\"fresh\\n\"", format!("{raw}^done").as_str()]);
        assert_eq!(routed, [pane(pane_id, "fresh\n")]);
    }
}

#[test]
fn test_main_routed_in_every_state()
{
    let harness = Harness::new();
    assert_eq!(harness.session.inferior_state(), InferiorState::Queued);
    assert_eq!(harness.route(&["~\"queued\\n\"", "1^done"]), [pane(ContextPane::Main, "queued\n")]);

    harness.run();
    assert_eq!(harness.route(&["~\"running\\n\"", "2^done"]), [pane(ContextPane::Main, "running\n")]);

    harness.route(&["=thread-group-exited,id=\"i1\""]);
    assert_eq!(harness.route(&["~\"exited\\n\"", "1^done"]), [pane(ContextPane::Main, "exited\n")]);
}

#[test]
fn test_breakpoint_stop_flushes_main_once()
{
    let harness = Harness::new();
    harness.run();

    let routed = harness.route(&[
        "~\"\\n\"",
        "~\"Breakpoint 1, main () at vuln.c:7\\n\"",
        "*stopped,reason=\"breakpoint-hit\",disp=\"keep\",bkptno=\"1\"",
    ]);
    assert_eq!(
        routed,
        [
            SessionEvent::InferiorStateChanged { stopped: true },
            pane(ContextPane::Main, "\nBreakpoint 1, main () at vuln.c:7\n"),
        ]
    );
}

#[test]
fn test_exited_not_overwritten_by_stop()
{
    let harness = Harness::new();
    harness.run();

    let routed = harness.route(&[
        "=thread-group-exited,id=\"i1\",exit-code=\"0\"",
        "*stopped,reason=\"exited-normally\"",
    ]);
    assert_eq!(harness.session.inferior_state(), InferiorState::Exited);
    assert!(!routed.contains(&SessionEvent::InferiorStateChanged { stopped: true }));
}

#[test]
fn test_duplicate_watch_not_reissued()
{
    let harness = Harness::new();
    let dispatcher = harness.session.dispatcher();

    let index = dispatcher.add_watch("0x1000").unwrap();
    assert!(dispatcher.add_watch("0x1000").is_err());

    assert_eq!(harness.session.watches().len(), 1);
    assert_eq!(harness.session.watches()[0].index, index);
    let queries: Vec<String> = harness.sent.lines().into_iter().filter(|line| line.contains("hexdump")).collect();
    assert_eq!(queries, ["1000hexdump 0x1000 64"]);
}

#[test]
fn test_late_result_for_deleted_watch_dropped()
{
    let harness = Harness::new();
    harness.stop();
    let dispatcher = harness.session.dispatcher();

    let index = dispatcher.add_watch("$rsp").unwrap();
    let raw = Token::Watch(index).raw();
    dispatcher.delete_watch("$rsp").unwrap();

    let routed = harness.route(&["~\"+0000 0x7ffd...\\n\"", format!("{raw}^done").as_str()]);
    assert!(routed.is_empty(), "late watch output routed: {routed:?}");
}

#[test]
fn test_error_falls_back_to_log_without_echo()
{
    let harness = Harness::new();
    let routed = harness.route(&["&\"frobnicate\\n\"", "&\"Undefined command: \\\"frobnicate\\\".\\n\"", "1^error"]);
    assert_eq!(routed, [pane(ContextPane::Main, "Undefined command: \"frobnicate\".\n")]);
}

#[test]
fn test_byte_count_change_issues_one_tagged_query()
{
    let harness = Harness::new();
    let dispatcher = harness.session.dispatcher();

    let index = dispatcher.add_watch("0x1000").unwrap();
    for bytes in [8, 256, 16] {
        dispatcher.set_watch_byte_count("0x1000", bytes).unwrap();
    }
    let before = harness.sent.lines().len();
    dispatcher.set_watch_byte_count("0x1000", 32).unwrap();

    let new_lines = harness.sent.lines()[before..].to_vec();
    assert_eq!(new_lines, [format!("{}hexdump 0x1000 32", Token::Watch(index).raw())]);
    assert_eq!(index, WatchIndex::from_raw(0));
}

#[test]
fn test_step_output_flushed_on_stop()
{
    let harness = Harness::new();
    let routed = harness.route(&["*running,thread-id=\"all\"", "~\"abc\"", "*stopped,reason=\"end-stepping-range\""]);
    let main: Vec<&SessionEvent> = routed
        .iter()
        .filter(|event| matches!(event, SessionEvent::PaneUpdate { pane: ContextPane::Main, .. }))
        .collect();
    assert_eq!(main, [&pane(ContextPane::Main, "abc")]);
}

#[test]
fn test_fs_base_routed_while_stopped()
{
    let harness = Harness::new();
    harness.stop();
    let routed = harness.route(&["~\"0x7f0000\"", "11^done"]);
    assert_eq!(routed, [SessionEvent::FsBase(b"0x7f0000".to_vec())]);
}

#[test]
fn test_watch_result_routed_with_expression()
{
    let harness = Harness::new();
    harness.stop();
    let index = harness.session.dispatcher().add_watch("$rsp").unwrap();

    let raw = Token::Watch(index).raw();
    let routed = harness.route(&["~\"+0000 0x7ffd...\\n\"", format!("{raw}^done").as_str()]);
    assert_eq!(
        routed,
        [SessionEvent::WatchResult {
            index,
            expression: "$rsp".to_string(),
            content: b"+0000 0x7ffd...\n".to_vec(),
        }]
    );
}

#[test]
fn test_pid_target_stops_file_target_queues()
{
    let harness = Harness::new();
    let dispatcher = harness.session.dispatcher();

    dispatcher.set_pid_target(31337);
    assert_eq!(harness.session.inferior_state(), InferiorState::Stopped);
    dispatcher.set_file_target(std::path::Path::new("./vuln"));
    assert_eq!(harness.session.inferior_state(), InferiorState::Queued);
}

#[test]
fn test_shutdown_sends_exit_and_is_idempotent()
{
    let mut harness = Harness::new();
    harness.session.shutdown();
    harness.session.shutdown();

    assert!(harness.session.is_shut_down());
    let exits = harness.sent.lines().iter().filter(|line| line.as_str() == "0-gdb-exit").count();
    assert_eq!(exits, 1);
}
