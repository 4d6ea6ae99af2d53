//! Wrapper around the external worktree manager (`workmux` by default).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::Span;

use crate::error::ExitError;
use crate::subprocess::{RunOutput, Runner, Tool, ToolError, truncate_safe};

pub const WORKMUX_INSTALL_HINT: &str =
    "Install workmux (https://github.com/raine/workmux) or set tools.worktree in the config.";

pub struct WorktreeManager<'a> {
    runner: &'a dyn Runner,
    program: String,
    timeout: Duration,
    span: Span,
}

impl<'a> WorktreeManager<'a> {
    pub fn new(runner: &'a dyn Runner, program: &str, timeout: Duration, span: Span) -> Self {
        Self {
            runner,
            program: program.to_string(),
            timeout,
            span,
        }
    }

    /// Raw result of `workmux list`. Callers decide how to treat failures.
    pub fn list(&self) -> Result<RunOutput, ToolError> {
        let _enter = self.span.enter();
        let tool = Tool::new(&self.program).arg("list").timeout(self.timeout);
        tracing::debug!(command = %tool.display(), "listing worktrees");
        self.runner.run(&tool)
    }

    pub fn remove(&self, name: &str) -> Result<(), ExitError> {
        let _enter = self.span.enter();
        let tool = Tool::new(&self.program)
            .args(&["remove", name])
            .timeout(self.timeout);
        tracing::info!(name, "removing existing worktree");

        let output = self.runner.run(&tool).map_err(|e| match e {
            ToolError::Timeout { .. } => e.into_exit("removing worktree", WORKMUX_INSTALL_HINT),
            other => ExitError::RemoveFailed {
                name: name.to_string(),
                message: other.to_string(),
            },
        })?;

        if !output.success() {
            let stderr = truncate_safe(output.stderr.trim(), 500);
            tracing::error!(name, exit_code = output.exit_code, stderr, "worktree removal failed");
            return Err(ExitError::RemoveFailed {
                name: name.to_string(),
                message: stderr.to_string(),
            });
        }
        Ok(())
    }

    /// Run `workmux add <name>` and return the worktree path it reports, or
    /// `{root}/{name}` when the output names none.
    pub fn add(&self, name: &str, root: &Path) -> Result<PathBuf, ExitError> {
        let _enter = self.span.enter();
        let tool = Tool::new(&self.program)
            .args(&["add", name])
            .timeout(self.timeout);
        tracing::info!(name, "creating worktree");

        let output = self
            .runner
            .run(&tool)
            .map_err(|e| e.into_exit("creating worktree", WORKMUX_INSTALL_HINT))?;

        if !output.success() {
            let stderr = truncate_safe(output.stderr.trim(), 500);
            tracing::error!(name, exit_code = output.exit_code, stderr, "worktree creation failed");
            return Err(ExitError::WorkspaceCreate {
                name: name.to_string(),
                message: stderr.to_string(),
            });
        }

        tracing::debug!(stdout = truncate_safe(&output.stdout, 500), "workmux output");
        if let Some(path) = parse_created_path(&output.stdout) {
            tracing::debug!(path = %path.display(), "worktree path from workmux output");
            return Ok(path);
        }

        let fallback = root.join(name);
        tracing::warn!(
            path = %fallback.display(),
            "could not find worktree path in workmux output, using fallback"
        );
        Ok(fallback)
    }
}

fn created_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Created worktree at (.+)").expect("created pattern is valid"))
}

/// Path from a `Created worktree at <path>` line.
pub fn parse_created_path(stdout: &str) -> Option<PathBuf> {
    let caps = created_pattern().captures(stdout)?;
    let raw = caps[1].trim().trim_matches(|c| matches!(c, '"' | '\'' | '`'));
    (!raw.is_empty()).then(|| PathBuf::from(raw))
}
