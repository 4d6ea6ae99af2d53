use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args};
use clap::builder::FalseyValueParser;

use crate::agent::{AgentOutcome, PromptPreset};
use crate::config::{Overrides, Settings};
use crate::conflict::TerminalPrompter;
use crate::model::ItemKind;
use crate::orchestrator::{Orchestrator, Outcome};
use crate::subprocess::SystemRunner;

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// GitHub issue/PR URL, or a bare number with --issue or --pr
    pub input: String,

    /// Treat a bare number as an issue
    #[arg(long, group = "kind")]
    pub issue: bool,
    /// Treat a bare number as a pull request
    #[arg(long, group = "kind")]
    pub pr: bool,

    /// Fetch and write WT-TASK.md only; no worktree manager or agent
    #[arg(long)]
    pub dry_run: bool,

    /// Directory that holds workspaces (default: <repo>/.worktrees)
    #[arg(long, env = "GHWT_WORKTREE_ROOT")]
    pub worktree_root: Option<PathBuf>,
    /// Template to render instead of the built-in WT-TASK.md
    #[arg(long = "template", env = "GHWT_TEMPLATE_PATH")]
    pub template_path: Option<PathBuf>,
    /// Config file (default: nearest .ghwt.toml, then the user config)
    #[arg(long, env = "GHWT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Initial prompt for the agent
    #[arg(long, env = "GHWT_AGENT_INIT_PROMPT", conflicts_with_all = ["agent_preset", "no_prompt"])]
    pub agent_prompt: Option<String>,
    /// Built-in prompt for the agent
    #[arg(long, env = "GHWT_AGENT_INIT_PRESET", value_enum, conflicts_with = "no_prompt")]
    pub agent_preset: Option<PromptPreset>,
    /// Start the agent without any prompt
    #[arg(long, env = "GHWT_NO_PROMPT", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    pub no_prompt: bool,
    /// Run the agent unattended (`agent run <prompt>`, all permissions granted)
    #[arg(long, env = "GHWT_CI", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new(), conflicts_with = "no_prompt")]
    pub ci: bool,

    /// Seconds to wait for gh
    #[arg(long, env = "GHWT_GH_TIMEOUT", value_parser = clap::value_parser!(u64).range(1..=300))]
    pub gh_timeout: Option<u64>,
    /// Seconds to wait for the worktree manager
    #[arg(long, env = "GHWT_WORKTREE_TIMEOUT", value_parser = clap::value_parser!(u64).range(1..=300))]
    pub worktree_timeout: Option<u64>,
    /// Seconds to wait for the agent launch
    #[arg(long, env = "GHWT_AGENT_TIMEOUT", value_parser = clap::value_parser!(u64).range(1..=60))]
    pub agent_timeout: Option<u64>,
}

impl CreateArgs {
    const fn kind(&self) -> Option<ItemKind> {
        if self.issue {
            Some(ItemKind::Issue)
        } else if self.pr {
            Some(ItemKind::PullRequest)
        } else {
            None
        }
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            worktree_root: self.worktree_root.clone(),
            template_path: self.template_path.clone(),
            agent_prompt: self.agent_prompt.clone(),
            agent_preset: self.agent_preset,
            no_prompt: self.no_prompt,
            ci: self.ci,
            gh_timeout: self.gh_timeout,
            worktree_timeout: self.worktree_timeout,
            agent_timeout: self.agent_timeout,
        }
    }

    /// Resolve effective settings: config file, then env and flags.
    pub fn settings(&self) -> Result<Settings> {
        let cwd = std::env::current_dir().context("reading current directory")?;
        let mut settings = Settings::discover(self.config.as_deref(), &cwd)?;
        settings.apply(self.overrides());
        settings.validate()?;
        Ok(settings)
    }

    pub fn execute(&self) -> Result<()> {
        let settings = self.settings()?;
        tracing::debug!(?settings, "effective settings");

        let runner = SystemRunner;
        let prompter = TerminalPrompter;
        let outcome = Orchestrator::new(&settings, &runner, &prompter, self.dry_run)?
            .run(&self.input, self.kind())?;

        print_summary(&outcome);
        Ok(())
    }
}

fn print_summary(outcome: &Outcome) {
    let details = &outcome.request;
    if outcome.dry_run {
        println!("✓ Dry run: task file written to {}", outcome.task_file.display());
        println!("  (no worktree created, agent not launched)");
    } else {
        println!("✓ Worktree created: {}", outcome.workspace.display());
        println!("  Task file: {}", outcome.task_file.display());
    }
    println!("  Branch: {}", outcome.branch);
    println!(
        "  {} {}/{}#{}: {}",
        details.kind.label(),
        details.owner,
        details.repo,
        details.number,
        outcome.title
    );
    match &outcome.agent {
        AgentOutcome::Skipped => {}
        AgentOutcome::Launched => println!("  Agent: launched"),
        AgentOutcome::Failed(reason) => println!("  Agent: not started ({reason})"),
    }
}
