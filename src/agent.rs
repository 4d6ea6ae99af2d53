//! Launching the coding agent on a freshly created workspace.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::config::AgentSettings;
use crate::subprocess::{Runner, Tool, truncate_safe};
use crate::template::TASK_FILE_NAME;

/// Value given to the permission variable for unattended runs.
pub const ALLOW_ALL: &str = r#"{"*":"allow"}"#;

/// Built-in instruction sets for the agent's first prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PromptPreset {
    RalphLoop,
    StandardOotl,
    Minimal,
}

impl PromptPreset {
    pub const fn name(self) -> &'static str {
        match self {
            Self::RalphLoop => "ralph-loop",
            Self::StandardOotl => "standard-ootl",
            Self::Minimal => "minimal",
        }
    }

    pub const fn text(self) -> &'static str {
        match self {
            Self::RalphLoop => RALPH_LOOP,
            Self::StandardOotl => STANDARD_OOTL,
            Self::Minimal => MINIMAL,
        }
    }
}

impl fmt::Display for PromptPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const RALPH_LOOP: &str = "\
Follow Ralph's autonomous development loop for all implementation work:

1. Read WT-TASK.md and consult @oracle immediately for assistance, reference WT-TASK.md, so oracle can gather critical research on the given task. Always use oracle on any issue you need more intelligence on during implementation.

2. Implement feature following the task requirements in WT-TASK.md

3. Create and update todo list to track all implementation steps

4. Run tests and ensure all pass

5. Verify code quality with linter checks

6. Update documentation as needed

7. Ask for final review from oracle before claiming completion
";

const STANDARD_OOTL: &str = "\
Standard out-of-the-loop agent instructions:

1. Read WT-TASK.md thoroughly to understand the task

2. Implement the feature according to the requirements

3. Write comprehensive tests before implementation (TDD)

4. Ensure all tests pass

5. Follow code quality standards and best practices

6. Update documentation with changes made

7. Verify the implementation meets all acceptance criteria
";

const MINIMAL: &str = "\
Minimal task execution:

1. Read WT-TASK.md to understand the task

2. Implement the required changes

3. Verify the implementation works correctly

4. Run existing tests and ensure they pass
";

/// What happened to the agent launch. Failures never abort the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    Skipped,
    Launched,
    Failed(String),
}

/// Initial prompt: explicit text, then preset, then the workspace's
/// `WT-TASK.md`. `no_prompt` wins over all of them.
pub fn resolve_prompt(settings: &AgentSettings, workspace: &Path) -> Option<String> {
    if settings.no_prompt {
        tracing::debug!("no-prompt set, launching without a prompt");
        return None;
    }
    if let Some(prompt) = settings.prompt.as_deref().filter(|p| !p.is_empty()) {
        tracing::debug!("using custom agent prompt");
        return Some(prompt.to_string());
    }
    if let Some(preset) = settings.preset {
        tracing::debug!(%preset, "using preset prompt");
        return Some(preset.text().to_string());
    }
    match std::fs::read_to_string(workspace.join(TASK_FILE_NAME)) {
        Ok(content) if !content.trim().is_empty() => {
            tracing::debug!(length = content.len(), "using task file as prompt");
            Some(content)
        }
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "task file unreadable, launching without a prompt");
            None
        }
    }
}

/// Build the agent invocation for `workspace`.
///
/// - no prompt: `agent <path>`
/// - interactive: `agent <path> --prompt <text>`
/// - ci: `agent run <text>` in the workspace, with the permission variable
///   set to allow everything for that child only
pub fn build_invocation(
    program: &str,
    settings: &AgentSettings,
    workspace: &Path,
    prompt: Option<&str>,
) -> Tool {
    let path = workspace.display().to_string();
    match prompt {
        None => Tool::new(program).arg(path),
        Some(text) if settings.ci => Tool::new(program)
            .arg("run")
            .arg(text)
            .env(&settings.permission_env, ALLOW_ALL)
            .current_dir(workspace),
        Some(text) => Tool::new(program).arg(path).arg("--prompt").arg(text),
    }
}

pub struct AgentLauncher<'a> {
    runner: &'a dyn Runner,
    program: String,
    timeout: Duration,
    settings: AgentSettings,
    span: Span,
}

impl<'a> AgentLauncher<'a> {
    pub fn new(
        runner: &'a dyn Runner,
        program: &str,
        timeout: Duration,
        settings: AgentSettings,
        span: Span,
    ) -> Self {
        Self {
            runner,
            program: program.to_string(),
            timeout,
            settings,
            span,
        }
    }

    pub fn launch(&self, workspace: &Path) -> AgentOutcome {
        let _enter = self.span.enter();
        let prompt = resolve_prompt(&self.settings, workspace);
        let tool = build_invocation(&self.program, &self.settings, workspace, prompt.as_deref())
            .timeout(self.timeout);

        tracing::info!(
            agent = %self.program,
            ci = self.settings.ci && prompt.is_some(),
            prompt_length = prompt.as_ref().map_or(0, String::len),
            "launching agent"
        );
        tracing::debug!(command = %tool.display(), "executing agent");

        match self.runner.run(&tool) {
            Ok(output) if output.success() => AgentOutcome::Launched,
            Ok(output) => {
                let detail = format!(
                    "exit code {}: {}",
                    output.exit_code,
                    truncate_safe(output.stderr.trim(), 200)
                );
                tracing::warn!(agent = %self.program, %detail, "agent exited with failure");
                AgentOutcome::Failed(detail)
            }
            Err(e) => {
                tracing::warn!(agent = %self.program, error = %e, "agent launch failed");
                AgentOutcome::Failed(e.to_string())
            }
        }
    }
}
