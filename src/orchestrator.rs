//! One invocation end to end: resolve, fetch, name, make room, create the
//! workspace, write the task brief, start the agent.

use std::path::{Path, PathBuf};

use tracing::Span;

use crate::agent::{AgentLauncher, AgentOutcome};
use crate::branch::{self, BranchName};
use crate::config::Settings;
use crate::conflict::{ConflictResolver, Prompter};
use crate::error::ExitError;
use crate::git::Git;
use crate::github::GithubClient;
use crate::model::{ItemKind, RemoteItem, WorkspaceRequest};
use crate::resolve::Resolver;
use crate::subprocess::Runner;
use crate::template::{TASK_FILE_NAME, TaskContext, TaskTemplate, WorkspaceInfo, today};
use crate::worktree::WorktreeManager;

/// Default workspace directory under the repository root.
pub const DEFAULT_ROOT_DIR: &str = ".worktrees";

const WRITE_CHECK_FILE: &str = ".ghwt-write-check";

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub request: WorkspaceRequest,
    pub title: String,
    pub branch: BranchName,
    pub workspace: PathBuf,
    pub task_file: PathBuf,
    pub dry_run: bool,
    pub agent: AgentOutcome,
}

pub struct Orchestrator<'a> {
    settings: &'a Settings,
    runner: &'a dyn Runner,
    prompter: &'a dyn Prompter,
    template: TaskTemplate,
    dry_run: bool,
    span: Span,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        settings: &'a Settings,
        runner: &'a dyn Runner,
        prompter: &'a dyn Prompter,
        dry_run: bool,
    ) -> Result<Self, ExitError> {
        let template = match &settings.template_path {
            Some(path) => TaskTemplate::from_path(path)?,
            None => TaskTemplate::embedded()?,
        };
        Ok(Self {
            settings,
            runner,
            prompter,
            template,
            dry_run,
            span: tracing::info_span!("ghwt", dry_run),
        })
    }

    fn child(&self, component: &'static str) -> Span {
        tracing::info_span!(parent: &self.span, "component", name = component)
    }

    pub fn run(&self, input: &str, kind: Option<ItemKind>) -> Result<Outcome, ExitError> {
        let _enter = self.span.enter();
        let Settings {
            tools, timeouts, ..
        } = self.settings;

        let git = Git::new(self.runner, &tools.git, timeouts.git(), self.child("git"));
        let resolver = Resolver::new(git.clone(), &self.settings.github_host, self.child("resolve"))?;
        let request = resolver.resolve(input, kind)?;
        tracing::info!(item = %request, "resolved input");

        let github = GithubClient::new(self.runner, &tools.gh, timeouts.gh(), self.child("github"));
        let item = github.fetch(&request)?;

        let branch = branch::derive(&item);
        tracing::info!(branch = %branch, "derived branch name");

        let root = self.worktree_root(&git)?;
        let worktrees = WorktreeManager::new(
            self.runner,
            &tools.worktree,
            timeouts.worktree(),
            self.child("worktree"),
        );
        if self.dry_run {
            tracing::debug!("dry run, skipping conflict check");
        } else {
            ConflictResolver::new(&worktrees, self.prompter, self.child("conflict"))
                .check_and_resolve(&branch)?;
        }

        let workspace = if self.dry_run {
            let dir = root.join(branch.as_str());
            std::fs::create_dir_all(&dir).map_err(|source| ExitError::TaskFileWrite {
                path: dir.clone(),
                source,
            })?;
            tracing::info!(path = %dir.display(), "dry run, created workspace directory");
            dir
        } else {
            worktrees.add(branch.as_str(), &root)?
        };

        let parent = root.parent().unwrap_or(&root);
        let task_file = self.write_task_file(&item, &branch, &workspace, parent)?;

        let agent = if self.dry_run {
            tracing::debug!("dry run, skipping agent launch");
            AgentOutcome::Skipped
        } else {
            AgentLauncher::new(
                self.runner,
                &tools.agent,
                timeouts.agent(),
                self.settings.agent.clone(),
                self.child("agent"),
            )
            .launch(&workspace)
        };

        tracing::info!(branch = %branch, path = %workspace.display(), "workspace ready");
        Ok(Outcome {
            request,
            title: item.title().to_string(),
            branch,
            workspace,
            task_file,
            dry_run: self.dry_run,
            agent,
        })
    }

    /// Configured root, else `<repo>/.worktrees`. Created when missing and
    /// checked for writability before anything is removed or created in it.
    fn worktree_root(&self, git: &Git<'_>) -> Result<PathBuf, ExitError> {
        let root = match &self.settings.worktree_root {
            Some(root) => root.clone(),
            None => git.toplevel()?.join(DEFAULT_ROOT_DIR),
        };

        std::fs::create_dir_all(&root).map_err(|e| {
            ExitError::Config(format!("cannot create worktree root {}: {e}", root.display()))
        })?;
        let check = root.join(WRITE_CHECK_FILE);
        std::fs::File::create(&check)
            .and_then(|_| std::fs::remove_file(&check))
            .map_err(|e| {
                ExitError::Config(format!("worktree root {} is not writable: {e}", root.display()))
            })?;
        tracing::debug!(root = %root.display(), "worktree root");
        Ok(root)
    }

    fn write_task_file(
        &self,
        item: &RemoteItem,
        branch: &BranchName,
        workspace: &Path,
        parent: &Path,
    ) -> Result<PathBuf, ExitError> {
        let worktree_name = workspace
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(branch.as_str());
        let info = WorkspaceInfo {
            parent_path: parent,
            worktree_name,
            branch_name: branch.as_str(),
            created_date: today(),
        };
        let content = self.template.render(&TaskContext::new(item, &info))?;

        let path = workspace.join(TASK_FILE_NAME);
        std::fs::write(&path, content).map_err(|source| {
            tracing::error!(path = %path.display(), error = %source, "failed to write task file");
            ExitError::TaskFileWrite {
                path: path.clone(),
                source,
            }
        })?;
        tracing::info!(path = %path.display(), "task file written");
        Ok(path)
    }
}
