use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::agent::PromptPreset;
use crate::error::ExitError;

/// Project-local config file name.
pub const CONFIG_FILE: &str = ".ghwt.toml";

/// Nearest `.ghwt.toml` in `dir` or any of its ancestors.
pub fn find_config(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .map(|d| d.join(CONFIG_FILE))
        .find(|p| p.is_file())
}

/// `<config dir>/ghwt/config.toml`, if it exists.
pub fn user_config() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("ghwt").join("config.toml"))
        .filter(|p| p.is_file())
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Effective settings for one invocation.
///
/// Built from defaults, then a config file, then [`Overrides`] gathered from
/// `GHWT_*` variables and flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Where workspaces are created. Defaults to `<repo>/.worktrees`.
    pub worktree_root: Option<PathBuf>,
    /// Override for the embedded `WT-TASK.md` template.
    pub template_path: Option<PathBuf>,
    pub github_host: String,
    pub timeouts: Timeouts,
    pub tools: Tools,
    pub agent: AgentSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            worktree_root: None,
            template_path: None,
            github_host: "github.com".to_string(),
            timeouts: Timeouts::default(),
            tools: Tools::default(),
            agent: AgentSettings::default(),
        }
    }
}

/// Subprocess bounds, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    pub gh: u64,
    pub git: u64,
    pub worktree: u64,
    pub agent: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            gh: 30,
            git: 5,
            worktree: 60,
            agent: 5,
        }
    }
}

impl Timeouts {
    pub const fn gh(&self) -> Duration {
        Duration::from_secs(self.gh)
    }

    pub const fn git(&self) -> Duration {
        Duration::from_secs(self.git)
    }

    pub const fn worktree(&self) -> Duration {
        Duration::from_secs(self.worktree)
    }

    pub const fn agent(&self) -> Duration {
        Duration::from_secs(self.agent)
    }
}

/// Executable names of the external tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tools {
    pub gh: String,
    pub git: String,
    pub worktree: String,
    pub agent: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            gh: "gh".into(),
            git: "git".into(),
            worktree: "workmux".into(),
            agent: "shuvcode".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSettings {
    pub prompt: Option<String>,
    pub preset: Option<PromptPreset>,
    pub no_prompt: bool,
    pub ci: bool,
    /// Variable set to allow-all for unattended runs.
    pub permission_env: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            prompt: None,
            preset: None,
            no_prompt: false,
            ci: false,
            permission_env: "PERMISSION_MODE".into(),
        }
    }
}

/// Values from the environment and command line. `None`/`false` leaves the
/// lower layer untouched.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub worktree_root: Option<PathBuf>,
    pub template_path: Option<PathBuf>,
    pub agent_prompt: Option<String>,
    pub agent_preset: Option<PromptPreset>,
    pub no_prompt: bool,
    pub ci: bool,
    pub gh_timeout: Option<u64>,
    pub worktree_timeout: Option<u64>,
    pub agent_timeout: Option<u64>,
}

impl Settings {
    /// Load a TOML config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).map_err(|e| {
            ExitError::Config(format!("invalid config {}: {e}", path.display())).into()
        })
    }

    /// Settings from `explicit`, else the nearest `.ghwt.toml` above `cwd`,
    /// else the user config, else defaults.
    pub fn discover(explicit: Option<&Path>, cwd: &Path) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            let path = expand_tilde(path);
            if !path.is_file() {
                return Err(ExitError::Config(format!(
                    "config file not found: {}",
                    path.display()
                ))
                .into());
            }
            tracing::debug!(path = %path.display(), "loading config");
            return Self::load(&path);
        }
        match find_config(cwd).or_else(user_config) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            None => {
                tracing::debug!("no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Layer `overrides` on top. Choosing any prompt source replaces the
    /// prompt source from lower layers.
    pub fn apply(&mut self, overrides: Overrides) {
        if overrides.worktree_root.is_some() {
            self.worktree_root = overrides.worktree_root;
        }
        if overrides.template_path.is_some() {
            self.template_path = overrides.template_path;
        }

        let agent = &mut self.agent;
        if overrides.agent_prompt.is_some() || overrides.agent_preset.is_some() || overrides.no_prompt
        {
            agent.prompt = overrides.agent_prompt;
            agent.preset = overrides.agent_preset;
            agent.no_prompt = overrides.no_prompt;
        }
        agent.ci |= overrides.ci;

        if let Some(secs) = overrides.gh_timeout {
            self.timeouts.gh = secs;
        }
        if let Some(secs) = overrides.worktree_timeout {
            self.timeouts.worktree = secs;
        }
        if let Some(secs) = overrides.agent_timeout {
            self.timeouts.agent = secs;
        }

        self.worktree_root = self.worktree_root.as_deref().map(expand_tilde);
        self.template_path = self.template_path.as_deref().map(expand_tilde);
    }

    pub fn validate(&self) -> Result<(), ExitError> {
        check_range("timeouts.gh", self.timeouts.gh, 300)?;
        check_range("timeouts.worktree", self.timeouts.worktree, 300)?;
        check_range("timeouts.git", self.timeouts.git, 60)?;
        check_range("timeouts.agent", self.timeouts.agent, 60)?;

        if self.github_host.trim().is_empty() {
            return Err(ExitError::Config("github_host must not be empty".into()));
        }
        for (key, value) in [
            ("tools.gh", &self.tools.gh),
            ("tools.git", &self.tools.git),
            ("tools.worktree", &self.tools.worktree),
            ("tools.agent", &self.tools.agent),
            ("agent.permission_env", &self.agent.permission_env),
        ] {
            if value.trim().is_empty() {
                return Err(ExitError::Config(format!("{key} must not be empty")));
            }
        }

        let agent = &self.agent;
        let sources = [agent.prompt.is_some(), agent.preset.is_some(), agent.no_prompt];
        if sources.iter().filter(|set| **set).count() > 1 {
            return Err(ExitError::Config(
                "cannot use --agent-prompt, --agent-preset, and --no-prompt together".into(),
            ));
        }
        if agent.ci && agent.no_prompt {
            return Err(ExitError::Config("cannot use --ci and --no-prompt together".into()));
        }

        if let Some(template) = &self.template_path
            && !template.is_file()
        {
            return Err(ExitError::Config(format!(
                "template file not found: {}",
                template.display()
            )));
        }
        Ok(())
    }
}

fn check_range(key: &str, value: u64, max: u64) -> Result<(), ExitError> {
    if (1..=max).contains(&value) {
        Ok(())
    } else {
        Err(ExitError::Config(format!(
            "{key} must be between 1 and {max} seconds, got {value}"
        )))
    }
}
