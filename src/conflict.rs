//! Detect an existing worktree for a derived name and ask whether to replace it.

use std::io::{BufRead, IsTerminal};

use anyhow::{Context, Result};
use tracing::Span;

use crate::branch::BranchName;
use crate::error::ExitError;
use crate::subprocess::{ToolError, truncate_safe};
use crate::worktree::{WORKMUX_INSTALL_HINT, WorktreeManager};

/// Yes/no questions to the operator.
pub trait Prompter {
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Asks on the terminal. With a non-interactive stdin a single line is read
/// and only `y`/`yes` count as agreement.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, question: &str) -> Result<bool> {
        if std::io::stdin().is_terminal() {
            return dialoguer::Confirm::new()
                .with_prompt(question)
                .default(false)
                .wait_for_newline(true)
                .interact()
                .context("reading user confirmation");
        }
        eprint!("{question} [y/N] ");
        read_answer(&mut std::io::stdin().lock())
    }
}

fn read_answer(input: &mut impl BufRead) -> Result<bool> {
    let mut line = String::new();
    input.read_line(&mut line).context("reading user confirmation")?;
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

pub struct ConflictResolver<'a> {
    worktrees: &'a WorktreeManager<'a>,
    prompter: &'a dyn Prompter,
    span: Span,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(worktrees: &'a WorktreeManager<'a>, prompter: &'a dyn Prompter, span: Span) -> Self {
        Self {
            worktrees,
            prompter,
            span,
        }
    }

    /// Make room for `name`: if the worktree manager already lists it, ask
    /// the operator and remove it, or fail with `UserCancelled`.
    pub fn check_and_resolve(&self, name: &BranchName) -> Result<(), ExitError> {
        let _enter = self.span.enter();

        let listing = match self.worktrees.list() {
            Ok(output) if output.success() => output.stdout,
            Ok(output) => {
                tracing::warn!(
                    exit_code = output.exit_code,
                    stderr = truncate_safe(output.stderr.trim(), 500),
                    "worktree listing failed, skipping conflict check"
                );
                return Ok(());
            }
            Err(ToolError::NotFound { tool }) => {
                tracing::warn!(tool, "worktree manager not found, skipping conflict check");
                return Ok(());
            }
            Err(e) => return Err(e.into_exit("listing worktrees", WORKMUX_INSTALL_HINT)),
        };

        if !listing.contains(name.as_str()) {
            tracing::debug!(branch = %name, "no existing worktree");
            return Ok(());
        }

        tracing::warn!(branch = %name, "branch already exists");
        let question = format!("Branch '{name}' already exists. Remove existing worktree?");
        let approved = self.prompter.confirm(&question).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read confirmation, treating as no");
            false
        });

        if !approved {
            tracing::info!(branch = %name, "user declined removal");
            return Err(ExitError::UserCancelled {
                branch: name.to_string(),
            });
        }

        self.worktrees.remove(name.as_str())?;
        tracing::info!(branch = %name, "existing worktree removed");
        Ok(())
    }
}
