//! Rendering of the `WT-TASK.md` brief written into each new workspace.

use std::path::Path;

use anyhow::Context;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

use crate::error::ExitError;
use crate::model::{Comment, ItemDetails, RemoteItem};

pub const TASK_FILE_NAME: &str = "WT-TASK.md";

const DEFAULT_TEMPLATE: &str = include_str!("templates/wt-task.md.jinja");
const TEMPLATE_NAME: &str = "WT-TASK.md";

/// Values available to the template.
#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TaskContext {
    pub parent_path: String,
    pub worktree_name: String,
    pub branch_name: String,
    pub created_date: String,
    pub issue_or_pr: &'static str,
    pub issue_or_pr_number: u64,
    pub issue_number: u64,
    pub title: String,
    pub author: String,
    pub state: String,
    pub labels: String,
    pub full_issue_or_pr_body_content: String,
    pub github_url: String,
    pub comments: Vec<CommentContext>,
    /// Comments pre-rendered as markdown, for templates that don't loop.
    pub github_comments: String,
    pub pr: Option<PrContext>,
}

#[derive(Debug, Serialize)]
pub struct CommentContext {
    pub author: String,
    pub body: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct PrContext {
    pub head_branch: String,
    pub base_branch: String,
    pub mergeable: &'static str,
    pub additions: String,
    pub deletions: String,
    pub changed_files: Vec<String>,
}

/// Where the workspace lives, alongside the item it was made for.
#[derive(Debug, Clone)]
pub struct WorkspaceInfo<'a> {
    pub parent_path: &'a Path,
    pub worktree_name: &'a str,
    pub branch_name: &'a str,
    pub created_date: String,
}

impl TaskContext {
    pub fn new(item: &RemoteItem, workspace: &WorkspaceInfo<'_>) -> Self {
        let (details, pr) = match item {
            RemoteItem::Issue(details) => (details, None),
            RemoteItem::PullRequest(pr) => (
                &pr.details,
                Some(PrContext {
                    head_branch: pr.head_branch.clone(),
                    base_branch: pr.base_branch.clone(),
                    mergeable: match pr.mergeable {
                        Some(true) => "yes",
                        Some(false) => "no",
                        None => "unknown",
                    },
                    additions: pr.additions.map_or_else(|| "?".into(), |n| n.to_string()),
                    deletions: pr.deletions.map_or_else(|| "?".into(), |n| n.to_string()),
                    changed_files: pr.changed_files.clone(),
                }),
            ),
        };
        let ItemDetails {
            title,
            body,
            number,
            author,
            labels,
            state,
            url,
            comments,
        } = details;

        Self {
            parent_path: workspace.parent_path.display().to_string(),
            worktree_name: workspace.worktree_name.to_string(),
            branch_name: workspace.branch_name.to_string(),
            created_date: workspace.created_date.clone(),
            issue_or_pr: item.kind().label(),
            issue_or_pr_number: *number,
            issue_number: *number,
            title: title.clone(),
            author: author.clone(),
            state: state.clone(),
            labels: if labels.is_empty() {
                "none".to_string()
            } else {
                labels.join(", ")
            },
            full_issue_or_pr_body_content: body.clone(),
            github_url: url.clone(),
            comments: comments.iter().map(CommentContext::from).collect(),
            github_comments: comments_markdown(comments),
            pr,
        }
    }
}

impl From<&Comment> for CommentContext {
    fn from(c: &Comment) -> Self {
        Self {
            author: c.author.clone(),
            body: c.body.clone(),
            created_at: c.created_at.clone(),
        }
    }
}

fn comments_markdown(comments: &[Comment]) -> String {
    comments
        .iter()
        .map(|c| format!("### Comment by {} on {}\n{}\n", c.author, c.created_at, c.body))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Today's date as written into the brief.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// A task template checked for syntax up front. Unknown placeholders are
/// render errors.
#[derive(Debug)]
pub struct TaskTemplate {
    source: String,
}

fn environment<'s>() -> Environment<'s> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env
}

impl TaskTemplate {
    pub fn embedded() -> Result<Self, ExitError> {
        Self::from_source(DEFAULT_TEMPLATE.to_string())
    }

    pub fn from_path(path: &Path) -> Result<Self, ExitError> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading template {}", path.display()))
            .map_err(|e| ExitError::Template(format!("{e:#}")))?;
        tracing::debug!(path = %path.display(), length = source.len(), "loaded template override");
        Self::from_source(source)
    }

    fn from_source(source: String) -> Result<Self, ExitError> {
        environment()
            .template_from_named_str(TEMPLATE_NAME, &source)
            .map_err(|e| ExitError::Template(e.to_string()))?;
        Ok(Self { source })
    }

    pub fn render(&self, ctx: &TaskContext) -> Result<String, ExitError> {
        let env = environment();
        let rendered = env
            .template_from_named_str(TEMPLATE_NAME, &self.source)
            .and_then(|t| t.render(ctx))
            .map_err(|e| ExitError::Template(e.to_string()))?;
        tracing::debug!(
            number = ctx.issue_or_pr_number,
            length = rendered.len(),
            "rendered task file"
        );
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PullRequest;

    fn details() -> ItemDetails {
        ItemDetails {
            title: "Test Issue".into(),
            body: "Steps: use {{ TITLE }} literally".into(),
            number: 42,
            author: "testuser".into(),
            labels: vec!["bug".into(), "high".into()],
            state: "OPEN".into(),
            url: "https://github.com/test/repo/issues/42".into(),
            comments: vec![Comment {
                author: "user2".into(),
                body: "I can reproduce".into(),
                created_at: "2024-01-01T10:00:00Z".into(),
            }],
        }
    }

    fn workspace() -> WorkspaceInfo<'static> {
        WorkspaceInfo {
            parent_path: Path::new("/home/dev/project"),
            worktree_name: "issue-42-test-issue",
            branch_name: "issue-42-test-issue",
            created_date: "2026-01-02".into(),
        }
    }

    const SECTIONS: [&str; 9] = [
        "SECTION 1: WORKTREE CONTEXT & RULES",
        "SECTION 2: HOTL (Human on the Loop) PROTOCOL",
        "SECTION 3: SELF-VERIFICATION CONDITIONS",
        "SECTION 4: EARLY PR CREATION GUIDANCE",
        "SECTION 5: ESCALATION CONDITIONS",
        "SECTION 6: STATUS TRACKING",
        "SECTION 7: GITHUB ISSUE/PR DATA",
        "SECTION 8: IMPLEMENTATION PLAN",
        "SECTION 9: NOTES & ARTIFACTS",
    ];

    #[test]
    fn embedded_template_renders_issue() {
        let item = RemoteItem::Issue(details());
        let out = TaskTemplate::embedded()
            .unwrap()
            .render(&TaskContext::new(&item, &workspace()))
            .unwrap();

        for section in SECTIONS {
            assert!(out.contains(section), "missing {section}");
        }
        assert!(out.contains("Issue #42 - Test Issue"));
        assert!(out.contains("/home/dev/project"));
        assert!(out.contains("bug, high"));
        assert!(out.contains("@user2"));
        assert!(out.contains("2026-01-02"));
        assert!(!out.contains("Pull Request Details"));
        // body text is inserted verbatim, not evaluated
        assert!(out.contains("use {{ TITLE }} literally"));
    }

    #[test]
    fn embedded_template_renders_pr() {
        let item = RemoteItem::PullRequest(PullRequest {
            details: ItemDetails {
                comments: vec![],
                labels: vec![],
                ..details()
            },
            head_branch: "feature/oauth".into(),
            base_branch: "main".into(),
            mergeable: None,
            additions: Some(150),
            deletions: None,
            changed_files: vec!["src/auth.rs".into()],
        });
        let out = TaskTemplate::embedded()
            .unwrap()
            .render(&TaskContext::new(&item, &workspace()))
            .unwrap();
        assert!(out.contains("Pull Request #42"));
        assert!(out.contains("`feature/oauth`"));
        assert!(out.contains("+150 / -?"));
        assert!(out.contains("**Mergeable:** unknown"));
        assert!(out.contains("`src/auth.rs`"));
        assert!(out.contains("**Labels:** none"));
        assert!(out.contains("No comments."));
    }

    #[test]
    fn override_template_with_unknown_placeholder_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.md");
        std::fs::write(&path, "# {{ TITLE }} by {{ OWNER_NAME }}\n").unwrap();
        let template = TaskTemplate::from_path(&path).unwrap();
        let err = template
            .render(&TaskContext::new(&RemoteItem::Issue(details()), &workspace()))
            .unwrap_err();
        assert!(matches!(err, ExitError::Template(_)));
    }

    #[test]
    fn override_template_with_flat_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.md");
        std::fs::write(&path, "{{ TITLE }}\n{{ GITHUB_COMMENTS }}").unwrap();
        let out = TaskTemplate::from_path(&path)
            .unwrap()
            .render(&TaskContext::new(&RemoteItem::Issue(details()), &workspace()))
            .unwrap();
        assert_eq!(
            out,
            "Test Issue\n### Comment by user2 on 2024-01-01T10:00:00Z\nI can reproduce\n"
        );
    }

    #[test]
    fn missing_override_is_an_error() {
        let err = TaskTemplate::from_path(Path::new("/definitely/not/here.md")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.md"));
    }
}
