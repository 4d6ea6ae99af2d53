//! Test doubles for the subprocess and prompt seams.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use crate::conflict::Prompter;
use crate::subprocess::{RunOutput, Runner, Tool, ToolError};

/// Scripted result for one invocation.
#[derive(Debug, Clone)]
pub enum Scripted {
    Output(RunOutput),
    NotFound,
    Timeout(u64),
}

/// A recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl Call {
    pub fn subcommand(&self) -> &str {
        self.args.first().map_or("", String::as_str)
    }
}

/// Records invocations and answers them from scripts keyed by
/// `(program, subcommand)`. Queued results are consumed in order and the last
/// one repeats. Unscripted commands behave like a missing binary.
#[derive(Default)]
pub struct FakeRunner {
    scripts: RefCell<HashMap<(String, String), VecDeque<Scripted>>>,
    calls: RefCell<Vec<Call>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, program: &str, subcommand: &str, result: Scripted) -> &Self {
        self.scripts
            .borrow_mut()
            .entry((program.to_string(), subcommand.to_string()))
            .or_default()
            .push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Call> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }

    /// `program subcommand` for every call, in order.
    pub fn call_summary(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|c| format!("{} {}", c.program, c.subcommand()))
            .collect()
    }
}

impl Runner for FakeRunner {
    fn run(&self, tool: &Tool) -> Result<RunOutput, ToolError> {
        self.calls.borrow_mut().push(Call {
            program: tool.program().to_string(),
            args: tool.arguments().to_vec(),
            envs: tool.envs().to_vec(),
            cwd: tool.cwd().map(PathBuf::from),
        });

        let key = (tool.program().to_string(), tool.subcommand().to_string());
        let mut scripts = self.scripts.borrow_mut();
        let next = scripts.get_mut(&key).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        });

        match next {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::Timeout(secs)) => Err(ToolError::Timeout {
                tool: tool.program().to_string(),
                timeout_secs: secs,
            }),
            Some(Scripted::NotFound) | None => Err(ToolError::NotFound {
                tool: tool.program().to_string(),
            }),
        }
    }
}

/// Answers every confirmation with a fixed response and records the questions.
pub struct FakePrompter {
    answer: bool,
    asked: RefCell<Vec<String>>,
}

impl FakePrompter {
    pub const fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: RefCell::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }
}

impl Prompter for FakePrompter {
    fn confirm(&self, question: &str) -> anyhow::Result<bool> {
        self.asked.borrow_mut().push(question.to_string());
        Ok(self.answer)
    }
}
