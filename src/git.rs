//! The two `git` queries ghwt needs: configured remotes and the repository root.

use std::path::PathBuf;
use std::time::Duration;

use tracing::Span;

use crate::error::ExitError;
use crate::subprocess::{Runner, Tool, truncate_safe};

pub const GIT_INSTALL_HINT: &str = "Install git from https://git-scm.com/ and make sure it is on PATH.";

/// One line of `git remote -v`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub url: String,
}

#[derive(Clone)]
pub struct Git<'a> {
    runner: &'a dyn Runner,
    program: String,
    timeout: Duration,
    span: Span,
}

impl<'a> Git<'a> {
    pub fn new(runner: &'a dyn Runner, program: &str, timeout: Duration, span: Span) -> Self {
        Self {
            runner,
            program: program.to_string(),
            timeout,
            span,
        }
    }

    /// Remotes in listing order. A failing `git` (e.g. not a repository)
    /// yields an empty list.
    pub fn remotes(&self) -> Result<Vec<Remote>, ExitError> {
        let _enter = self.span.enter();
        let tool = Tool::new(&self.program)
            .args(&["remote", "-v"])
            .timeout(self.timeout);
        tracing::debug!(command = %tool.display(), "listing git remotes");

        let output = self
            .runner
            .run(&tool)
            .map_err(|e| e.into_exit("listing git remotes", GIT_INSTALL_HINT))?;

        if !output.success() {
            tracing::warn!(
                exit_code = output.exit_code,
                stderr = truncate_safe(output.stderr.trim(), 500),
                "git remote -v failed"
            );
            return Ok(Vec::new());
        }

        tracing::debug!(stdout = truncate_safe(&output.stdout, 500), "git remote output");
        Ok(parse_remotes(&output.stdout))
    }

    /// Absolute path of the repository's working tree root.
    pub fn toplevel(&self) -> Result<PathBuf, ExitError> {
        let _enter = self.span.enter();
        let operation = "locating the git repository root";
        let tool = Tool::new(&self.program)
            .args(&["rev-parse", "--show-toplevel"])
            .timeout(self.timeout);

        let output = self
            .runner
            .run(&tool)
            .map_err(|e| e.into_exit(operation, GIT_INSTALL_HINT))?;

        match output.exit_code {
            0 => Ok(PathBuf::from(output.stdout.trim())),
            128 => Err(ExitError::Config(
                "not in a git repository; run ghwt inside a repository or pass --worktree-root"
                    .to_string(),
            )),
            code => Err(ExitError::ToolFailed {
                tool: self.program.clone(),
                operation: operation.to_string(),
                code,
                message: truncate_safe(output.stderr.trim(), 500).to_string(),
            }),
        }
    }
}

/// Parse `name<TAB>url (fetch|push)` lines. Malformed lines are skipped.
pub fn parse_remotes(stdout: &str) -> Vec<Remote> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let url = parts.next()?;
            Some(Remote {
                name: name.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}
