//! Scripted in-memory transport for tests.
//!
//! Stands in for a real host: tests enumerate the commands they expect
//! and the output each should produce, then assert on the recorded call
//! log afterwards. Any command without a matching rule fails the exec,
//! so a test that scripts only probe commands also proves that no
//! mutation was dispatched.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::ExecError;
use crate::quote;
use crate::transport::{CmdOutput, Transport};

/// How a rule matches the space-joined command line.
#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Prefix(String),
    Contains(String),
}

impl Matcher {
    fn matches(&self, cmdline: &str) -> bool {
        match self {
            Self::Exact(s) => cmdline == s,
            Self::Prefix(s) => cmdline.starts_with(s.as_str()),
            Self::Contains(s) => cmdline.contains(s.as_str()),
        }
    }
}

#[derive(Debug)]
struct Rule {
    matcher: Matcher,
    /// Responses served in order. The final response repeats, so a rule
    /// with one entry answers that command any number of times.
    queue: VecDeque<CmdOutput>,
}

/// One recorded exec call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Space-joined argv, quoted like a shell would need it.
    pub cmdline: String,
    /// Bytes piped to stdin, empty for plain exec.
    pub stdin: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    rules: Vec<Rule>,
    calls: Vec<RecordedCall>,
}

/// Test double replaying canned responses keyed on command lines.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    endpoint: String,
    state: Mutex<State>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            endpoint: "scripted".into(),
            state: Mutex::new(State::default()),
        }
    }

    /// A panicking test already failed; serve the state anyway so its
    /// drop/teardown assertions still produce readable output.
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn push_rule(&self, matcher: Matcher, responses: Vec<CmdOutput>) -> &Self {
        let mut state = self.state();
        state.rules.push(Rule {
            matcher,
            queue: responses.into(),
        });
        drop(state);
        self
    }

    /// Respond to a command line that matches exactly.
    pub fn on(&self, cmdline: &str, output: CmdOutput) -> &Self {
        self.push_rule(Matcher::Exact(cmdline.into()), vec![output])
    }

    /// Respond to any command line starting with `prefix`.
    pub fn on_prefix(&self, prefix: &str, output: CmdOutput) -> &Self {
        self.push_rule(Matcher::Prefix(prefix.into()), vec![output])
    }

    /// Respond to any command line containing `needle`.
    pub fn on_contains(&self, needle: &str, output: CmdOutput) -> &Self {
        self.push_rule(Matcher::Contains(needle.into()), vec![output])
    }

    /// Respond to an exact command line with a sequence of outputs, one
    /// per call, the last one repeating. Lets a test model state that
    /// changes after an apply (absent on the first probe, present after).
    pub fn on_seq(&self, cmdline: &str, outputs: Vec<CmdOutput>) -> &Self {
        self.push_rule(Matcher::Exact(cmdline.into()), outputs)
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// Command lines recorded so far, in order.
    pub fn cmdlines(&self) -> Vec<String> {
        self.state().calls.iter().map(|c| c.cmdline.clone()).collect()
    }

    /// Whether any recorded command line contains `needle`.
    pub fn saw(&self, needle: &str) -> bool {
        self.state().calls.iter().any(|c| c.cmdline.contains(needle))
    }

    fn dispatch(&self, argv: &[String], stdin: &[u8]) -> Result<CmdOutput, ExecError> {
        if argv.is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        let cmdline = quote::join(argv);
        let mut state = self.state();
        state.calls.push(RecordedCall {
            cmdline: cmdline.clone(),
            stdin: stdin.to_vec(),
        });

        for rule in &mut state.rules {
            if rule.matcher.matches(&cmdline) {
                let out = if rule.queue.len() > 1 {
                    rule.queue.pop_front()
                } else {
                    rule.queue.front().cloned()
                };
                if let Some(out) = out {
                    return Ok(out);
                }
            }
        }
        Err(ExecError::UnexpectedCommand { command: cmdline })
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn exec(&self, argv: &[String]) -> Result<CmdOutput, ExecError> {
        self.dispatch(argv, &[])
    }

    async fn exec_with_stdin(&self, argv: &[String], stdin: &[u8]) -> Result<CmdOutput, ExecError> {
        self.dispatch(argv, stdin)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
