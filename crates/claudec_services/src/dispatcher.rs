use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use claudec_domain::{InterruptBus, ToolCall, ToolResult};
use tracing::{info, warn};

use crate::mcp::{McpToolLookup, ServerId};
use crate::tool::{MAX_OUTPUT_BYTES, Tool, ToolOutput, truncate_output};

/// How often the foreground loop polls in-flight workers for completion,
/// timeout expiry, and the interrupt bus. The dispatcher exits its wait
/// immediately once every worker has produced a result or been abandoned —
/// this bound is an upper limit on *idle* latency, not a fixed delay.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of one `dispatch` call: one [`ToolResult`] per requested
/// [`ToolCall`], plus whether the batch was cut short by an ESC interrupt.
/// When `interrupted` is true, `results` does NOT cover every tool call in
/// the input — the caller (which owns the conversation state) is
/// responsible for synthesizing `is_error` results for the rest via
/// [`claudec_domain::ConversationState::synthesize_interrupt_results`].
#[derive(Debug)]
pub struct DispatchReport {
    pub results: Vec<ToolResult>,
    pub interrupted: bool,
}

enum Resolution {
    Builtin(Arc<dyn Tool>),
    Mcp(ServerId),
    Unknown,
}

struct InFlight {
    tool_call: ToolCall,
    cancelled: Arc<AtomicBool>,
    rx: mpsc::Receiver<ToolOutput>,
    deadline: Option<Instant>,
    /// Taken and joined once the worker is known to be winding down —
    /// either because it produced a result or because the dispatcher
    /// stopped waiting on it (interrupt or timeout). `None` once joined.
    handle: Option<thread::JoinHandle<()>>,
}

/// Runs tool invocations requested by an assistant message on one OS thread
/// per call, enforcing a per-call timeout and reacting to the process-wide
/// [`InterruptBus`] within one poll interval. A tool's worker thread is
/// cooperative, not forcibly killed: on timeout or interrupt the dispatcher
/// stops waiting on it and synthesizes a result, but the thread keeps
/// running until the tool itself observes its `cancelled` flag.
pub struct ToolDispatcher {
    tools: HashMap<String, Arc<dyn Tool>>,
    mcp: Option<Arc<dyn McpToolLookup>>,
    interrupt: InterruptBus,
    default_timeout: Option<Duration>,
}

impl ToolDispatcher {
    pub fn new(
        tools: Vec<Arc<dyn Tool>>,
        mcp: Option<Arc<dyn McpToolLookup>>,
        interrupt: InterruptBus,
        default_timeout: Option<Duration>,
    ) -> Self {
        let tools = tools.into_iter().map(|t| (t.name().to_string(), t)).collect();
        Self { tools, mcp, interrupt, default_timeout }
    }

    fn resolve(&self, name: &str) -> Resolution {
        if let Some(tool) = self.tools.get(name) {
            return Resolution::Builtin(tool.clone());
        }
        if let Some(mcp) = &self.mcp
            && let Some(server) = mcp.find_server(name)
        {
            return Resolution::Mcp(server);
        }
        Resolution::Unknown
    }

    /// Extracts a per-call timeout override from `{"timeout": <seconds>}` in
    /// the tool-call arguments, falling back to the dispatcher's default
    /// (itself derived from `CLAUDE_C_BASH_TIMEOUT`). `0` in either place
    /// means unlimited.
    fn resolve_timeout(&self, arguments: &str) -> Option<Duration> {
        let from_args = serde_json::from_str::<serde_json::Value>(arguments)
            .ok()
            .and_then(|v| v.get("timeout").and_then(serde_json::Value::as_u64));
        match from_args {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => self.default_timeout,
        }
    }

    /// Dispatches every `tool_calls` entry in parallel and blocks until all
    /// have produced a result, the batch is interrupted, or individual
    /// calls time out.
    pub fn dispatch(&self, tool_calls: &[ToolCall]) -> DispatchReport {
        let mcp = self.mcp.clone();
        let mut in_flight: Vec<InFlight> = Vec::with_capacity(tool_calls.len());

        for tc in tool_calls {
            let (tx, rx) = mpsc::channel();
            let cancelled = Arc::new(AtomicBool::new(false));
            let deadline = self.resolve_timeout(&tc.arguments).map(|d| Instant::now() + d);

            let resolution = self.resolve(&tc.name);
            let arguments = tc.arguments.clone();
            let name = tc.name.clone();
            let cancelled_for_worker = cancelled.clone();
            let mcp_for_worker = mcp.clone();

            let spawn_result = thread::Builder::new().name(format!("tool-{}", tc.id)).spawn(move || {
                // Runs on thread exit (including unwind) so a panicking tool
                // never leaves its cancelled flag unset for the poller.
                struct MarkDoneOnDrop(Arc<AtomicBool>);
                impl Drop for MarkDoneOnDrop {
                    fn drop(&mut self) {
                        self.0.store(true, Ordering::Release);
                    }
                }
                let _cleanup = MarkDoneOnDrop(cancelled_for_worker.clone());

                let started = Instant::now();
                let output = match resolution {
                    Resolution::Builtin(tool) => tool
                        .execute(&arguments, &cancelled_for_worker)
                        .unwrap_or_else(|e| ToolOutput::error(format!("tool {name} failed: {e}"))),
                    Resolution::Mcp(server) => mcp_for_worker
                        .as_ref()
                        .expect("mcp resolution implies an mcp lookup was configured")
                        .invoke(&server, &name, &arguments)
                        .unwrap_or_else(|e| ToolOutput::error(format!("mcp tool {name} failed: {e}"))),
                    Resolution::Unknown => ToolOutput::error(format!("unknown tool: {name}")),
                };
                info!(tool = %name, duration_ms = started.elapsed().as_millis() as u64, is_error = output.is_error, "tool dispatched");
                let _ = tx.send(output);
            });

            match spawn_result {
                Ok(join) => {
                    in_flight.push(InFlight { tool_call: tc.clone(), cancelled, rx, deadline, handle: Some(join) });
                }
                Err(e) => {
                    return DispatchReport {
                        results: vec![ToolResult::error(tc.id.clone(), tc.name.clone(), format!("failed to spawn tool worker: {e}"))],
                        interrupted: false,
                    };
                }
            }
        }

        self.poll_until_done(in_flight)
    }

    fn poll_until_done(&self, mut in_flight: Vec<InFlight>) -> DispatchReport {
        let mut results = Vec::with_capacity(in_flight.len());
        let mut pending: Vec<usize> = (0..in_flight.len()).collect();

        loop {
            pending.retain(|&i| match in_flight[i].rx.try_recv() {
                Ok(output) => {
                    results.push(to_tool_result(&in_flight[i].tool_call, output));
                    join_worker(&mut in_flight[i]);
                    false
                }
                Err(TryRecvError::Disconnected) => {
                    results.push(ToolResult::error(
                        in_flight[i].tool_call.id.clone(),
                        in_flight[i].tool_call.name.clone(),
                        "tool worker terminated without producing a result",
                    ));
                    join_worker(&mut in_flight[i]);
                    false
                }
                Err(TryRecvError::Empty) => true,
            });

            // Exit the wait on the very next check after the last worker
            // finishes — no extra heartbeat past completion.
            if pending.is_empty() {
                return DispatchReport { results, interrupted: false };
            }

            if self.interrupt.is_requested() {
                for &i in &pending {
                    in_flight[i].cancelled.store(true, Ordering::Release);
                }
                // Cancelling is cooperative: the worker only stops once it
                // observes `cancelled`. Drain every outstanding worker
                // before returning so no thread keeps mutating the
                // environment after dispatch() hands control back.
                for &i in &pending {
                    join_worker(&mut in_flight[i]);
                }
                warn!(outstanding = pending.len(), "tool dispatch interrupted by user");
                return DispatchReport { results, interrupted: true };
            }

            let now = Instant::now();
            pending.retain(|&i| {
                let Some(deadline) = in_flight[i].deadline else { return true };
                if now < deadline {
                    return true;
                }
                in_flight[i].cancelled.store(true, Ordering::Release);
                warn!(tool = %in_flight[i].tool_call.name, id = %in_flight[i].tool_call.id, "tool call timed out");
                results.push(ToolResult::error(
                    in_flight[i].tool_call.id.clone(),
                    in_flight[i].tool_call.name.clone(),
                    "tool call timed out",
                ));
                join_worker(&mut in_flight[i]);
                false
            });

            if pending.is_empty() {
                return DispatchReport { results, interrupted: false };
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Joins a worker's thread if it hasn't been joined yet. Safe to call more
/// than once per entry — a no-op once `handle` is `None`. Blocking here is
/// bounded by the worker's cooperative check of `cancelled`, which every
/// caller of this function has already set before joining.
fn join_worker(entry: &mut InFlight) {
    if let Some(handle) = entry.handle.take() {
        let _ = handle.join();
    }
}

fn to_tool_result(tool_call: &ToolCall, output: ToolOutput) -> ToolResult {
    let (content, warning) = truncate_output(&output.content, MAX_OUTPUT_BYTES);
    let mut content = content;
    if let Some(warning) = warning.or(output.truncation_warning) {
        content = format!("{content}\n[{warning}]");
    }
    if output.is_error {
        ToolResult::error(tool_call.id.clone(), tool_call.name.clone(), content)
    } else {
        ToolResult::ok(tool_call.id.clone(), tool_call.name.clone(), serde_json::Value::String(content))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use claudec_domain::ToolCall;
    use pretty_assertions::assert_eq;

    use super::*;

    struct Echo;
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its argument"
        }
        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn execute(&self, arguments: &str, _cancelled: &AtomicBool) -> anyhow::Result<ToolOutput> {
            Ok(ToolOutput::ok(arguments.to_string()))
        }
    }

    struct Slow(Duration);
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps before returning"
        }
        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn execute(&self, _arguments: &str, cancelled: &AtomicBool) -> anyhow::Result<ToolOutput> {
            let deadline = Instant::now() + self.0;
            while Instant::now() < deadline {
                if cancelled.load(Ordering::Acquire) {
                    return Ok(ToolOutput::error("cancelled"));
                }
                thread::sleep(Duration::from_millis(5));
            }
            Ok(ToolOutput::ok("done"))
        }
    }

    fn tc(id: &str, name: &str, args: &str) -> ToolCall {
        ToolCall { id: id.to_string(), name: name.to_string(), arguments: args.to_string() }
    }

    #[test]
    fn dispatches_known_tool() {
        let dispatcher = ToolDispatcher::new(vec![Arc::new(Echo)], None, InterruptBus::new(), None);
        let report = dispatcher.dispatch(&[tc("1", "echo", "hello")]);
        assert!(!report.interrupted);
        assert_eq!(report.results.len(), 1);
        assert!(!report.results[0].is_error);
        assert_eq!(report.results[0].output_as_string(), "hello");
    }

    #[test]
    fn unknown_tool_produces_error_result() {
        let dispatcher = ToolDispatcher::new(vec![], None, InterruptBus::new(), None);
        let report = dispatcher.dispatch(&[tc("1", "nope", "{}")]);
        assert!(report.results[0].is_error);
    }

    #[test]
    fn interrupt_stops_waiting_on_outstanding_calls() {
        let interrupt = InterruptBus::new();
        let dispatcher = ToolDispatcher::new(
            vec![Arc::new(Echo), Arc::new(Slow(Duration::from_secs(5)))],
            None,
            interrupt.clone(),
            None,
        );

        let interrupt_clone = interrupt.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(120));
            interrupt_clone.request();
        });

        let report = dispatcher.dispatch(&[tc("a", "echo", "hi"), tc("b", "slow", "{}")]);
        assert!(report.interrupted);
        // The fast call completed before the interrupt landed; the slow one
        // did not and is left for the caller to synthesize.
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].tool_call_id, "a");
    }

    /// A tool that flips a shared flag right before it returns, so a test
    /// can tell the difference between "cancel was requested" and "the
    /// worker thread actually finished".
    struct SlowWithExitMarker(Duration, Arc<AtomicBool>);
    impl Tool for SlowWithExitMarker {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps, then marks its own exit"
        }
        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn execute(&self, _arguments: &str, cancelled: &AtomicBool) -> anyhow::Result<ToolOutput> {
            let deadline = Instant::now() + self.0;
            while Instant::now() < deadline {
                if cancelled.load(Ordering::Acquire) {
                    break;
                }
                thread::sleep(Duration::from_millis(5));
            }
            self.1.store(true, Ordering::Release);
            Ok(ToolOutput::error("cancelled"))
        }
    }

    #[test]
    fn interrupt_joins_outstanding_workers_before_returning() {
        let interrupt = InterruptBus::new();
        let exited = Arc::new(AtomicBool::new(false));
        let dispatcher = ToolDispatcher::new(
            vec![Arc::new(SlowWithExitMarker(Duration::from_millis(150), exited.clone()))],
            None,
            interrupt.clone(),
            None,
        );

        let interrupt_clone = interrupt.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            interrupt_clone.request();
        });

        let report = dispatcher.dispatch(&[tc("a", "slow", "{}")]);
        assert!(report.interrupted);
        // If dispatch() returned without joining, the worker could still be
        // running (and its exit marker unset) right after this call.
        assert!(exited.load(Ordering::Acquire), "dispatch() must drain the cancelled worker before returning");
    }

    #[test]
    fn per_call_timeout_from_arguments_produces_timeout_result() {
        // `timeout` in the tool-call arguments is read in whole seconds, so
        // exercise it against a tool that sleeps well past one second but
        // cooperates with `cancelled` quickly once the deadline fires.
        let dispatcher = ToolDispatcher::new(vec![Arc::new(Slow(Duration::from_secs(3)))], None, InterruptBus::new(), None);
        let report = dispatcher.dispatch(&[tc("a", "slow", r#"{"timeout": 1}"#)]);
        assert!(!report.interrupted);
        assert_eq!(report.results.len(), 1);
        assert!(report.results[0].is_error);
        assert!(report.results[0].output_as_string().contains("timed out"));
    }

    #[test]
    fn dispatch_report_is_thread_safe() {
        fn assert_send<T: Send>() {}
        assert_send::<DispatchReport>();
    }
}
