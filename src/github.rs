//! Fetch issue and pull request data through the `gh` CLI.
//!
//! `gh ... --json` output is parsed tolerantly: missing optional fields take
//! defaults and the result is normalized into [`RemoteItem`].

use std::borrow::Cow;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::Span;

use crate::error::ExitError;
use crate::model::{Comment, ItemDetails, ItemKind, PullRequest, RemoteItem, WorkspaceRequest};
use crate::subprocess::{Runner, Tool, truncate_safe};

pub const GH_INSTALL_HINT: &str = "Install the GitHub CLI from https://cli.github.com/";

/// Body text used when an item has no description.
pub const EMPTY_BODY: &str = "No description provided.";

const ISSUE_FIELDS: &str = "title,body,number,author,labels,state,url,comments";
const PR_FIELDS: &str = "title,body,number,author,labels,state,url,comments,\
                         headRefName,baseRefName,mergeable,additions,deletions,files";

const STDERR_LIMIT: usize = 500;

pub struct GithubClient<'a> {
    runner: &'a dyn Runner,
    program: String,
    timeout: Duration,
    span: Span,
}

impl<'a> GithubClient<'a> {
    pub fn new(runner: &'a dyn Runner, program: &str, timeout: Duration, span: Span) -> Self {
        Self {
            runner,
            program: program.to_string(),
            timeout,
            span,
        }
    }

    pub fn fetch(&self, request: &WorkspaceRequest) -> Result<RemoteItem, ExitError> {
        let _enter = self.span.enter();
        let fields = match request.kind {
            ItemKind::Issue => ISSUE_FIELDS,
            ItemKind::PullRequest => PR_FIELDS,
        };
        let tool = Tool::new(&self.program)
            .args(&[request.kind.gh_subcommand(), "view"])
            .arg(request.number.to_string())
            .args(&["--repo", &request.slug(), "--json", fields])
            .timeout(self.timeout);

        let operation = format!(
            "fetching {} {}#{}",
            request.kind.gh_subcommand(),
            request.slug(),
            request.number
        );
        tracing::info!(item = %request, "fetching from GitHub");
        tracing::debug!(command = %tool.display(), "executing gh");

        let output = self
            .runner
            .run(&tool)
            .map_err(|e| e.into_exit(&operation, GH_INSTALL_HINT))?;

        if !output.success() {
            let stderr = truncate_safe(output.stderr.trim(), STDERR_LIMIT);
            tracing::error!(item = %request, stderr, "gh failed");
            return Err(ExitError::ToolFailed {
                tool: self.program.clone(),
                operation,
                code: output.exit_code,
                message: stderr.to_string(),
            });
        }

        let cleaned = strip_ansi(&output.stdout);
        if let Cow::Owned(ref stripped) = cleaned {
            tracing::warn!(
                original_len = output.stdout.len(),
                stripped_len = stripped.len(),
                "stripped ANSI escapes from gh output"
            );
        }

        let item = parse_item(request.kind, &cleaned).map_err(|e| {
            tracing::debug!(
                stdout_head = truncate_safe(&output.stdout, 100),
                error = %e,
                "gh JSON parse failed"
            );
            ExitError::ResponseFormat {
                tool: self.program.clone(),
                detail: e.to_string(),
            }
        })?;

        let details = item.details();
        tracing::info!(
            number = details.number,
            title = truncate_safe(&details.title, 50),
            state = %details.state,
            labels = details.labels.len(),
            comments = details.comments.len(),
            "fetched {}",
            item.kind().label()
        );
        Ok(item)
    }
}

fn ansi_escape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[mGKH]").expect("ANSI pattern is valid"))
}

/// Remove terminal color/cursor escapes. Borrows when there is nothing to strip.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ansi_escape().replace_all(text, "")
}

// --- gh JSON shapes ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhItem {
    title: String,
    number: u64,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    author: Option<GhActor>,
    #[serde(default)]
    labels: Vec<GhLabel>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    comments: Vec<GhComment>,
    #[serde(default)]
    head_ref_name: Option<String>,
    #[serde(default)]
    base_ref_name: Option<String>,
    #[serde(default)]
    mergeable: Option<Mergeable>,
    #[serde(default)]
    additions: Option<u64>,
    #[serde(default)]
    deletions: Option<u64>,
    #[serde(default)]
    files: Vec<GhFile>,
}

#[derive(Debug, Deserialize)]
struct GhActor {
    #[serde(default)]
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhComment {
    #[serde(default)]
    author: Option<GhActor>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct GhFile {
    path: String,
}

/// gh reports `mergeable` as `MERGEABLE`/`CONFLICTING`/`UNKNOWN`; older
/// tooling and fixtures use a plain boolean.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Mergeable {
    Flag(bool),
    Status(String),
}

impl Mergeable {
    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            Self::Status(s) => match s.to_ascii_uppercase().as_str() {
                "MERGEABLE" => Some(true),
                "CONFLICTING" => Some(false),
                _ => None,
            },
        }
    }
}

fn login(actor: Option<GhActor>) -> String {
    actor
        .map(|a| a.login)
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "ghost".to_string())
}

/// Parse `gh {issue|pr} view --json` output into a normalized item.
pub fn parse_item(kind: ItemKind, json: &str) -> Result<RemoteItem, serde_json::Error> {
    let raw: GhItem = serde_json::from_str(json)?;

    let body = raw
        .body
        .filter(|b| !b.trim().is_empty())
        .unwrap_or_else(|| EMPTY_BODY.to_string());

    let details = ItemDetails {
        title: raw.title,
        body,
        number: raw.number,
        author: login(raw.author),
        labels: raw.labels.into_iter().map(|l| l.name).collect(),
        state: raw.state,
        url: raw.url,
        comments: raw
            .comments
            .into_iter()
            .map(|c| Comment {
                author: login(c.author),
                body: c.body,
                created_at: c.created_at,
            })
            .collect(),
    };

    Ok(match kind {
        ItemKind::Issue => RemoteItem::Issue(details),
        ItemKind::PullRequest => RemoteItem::PullRequest(PullRequest {
            details,
            head_branch: raw.head_ref_name.unwrap_or_default(),
            base_branch: raw.base_ref_name.unwrap_or_default(),
            mergeable: raw.mergeable.as_ref().and_then(Mergeable::as_bool),
            additions: raw.additions,
            deletions: raw.deletions,
            changed_files: raw.files.into_iter().map(|f| f.path).collect(),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::subprocess::RunOutput;
    use crate::testing::{FakeRunner, Scripted};

    const ISSUE_JSON: &str = r#"{
        "title": "Fix database connection error",
        "body": "Database fails when connecting...",
        "number": 42,
        "author": {"login": "testuser", "name": "Test User"},
        "labels": [{"name": "bug", "color": "d73a4a"}, {"name": "high"}],
        "state": "OPEN",
        "url": "https://github.com/testuser/testrepo/issues/42",
        "comments": [
            {"author": {"login": "user2"}, "body": "I can reproduce", "createdAt": "2024-01-01T10:00:00Z"}
        ]
    }"#;

    const PR_JSON: &str = r#"{
        "title": "Add OAuth authentication",
        "body": "",
        "number": 123,
        "author": {"login": "contributor"},
        "labels": [],
        "state": "OPEN",
        "url": "https://github.com/o/r/pull/123",
        "comments": [],
        "headRefName": "feature/oauth",
        "baseRefName": "dev",
        "mergeable": "CONFLICTING",
        "additions": 150,
        "deletions": 50,
        "files": [{"path": "backend/api/auth.py", "additions": 100}, {"path": "frontend/auth.vue"}]
    }"#;

    fn request(kind: ItemKind, number: u64) -> WorkspaceRequest {
        WorkspaceRequest {
            kind,
            owner: "testuser".into(),
            repo: "testrepo".into(),
            number,
        }
    }

    fn client(runner: &FakeRunner) -> GithubClient<'_> {
        GithubClient::new(runner, "gh", Duration::from_secs(30), Span::none())
    }

    #[test]
    fn parse_issue_normalizes_nested_objects() {
        let item = parse_item(ItemKind::Issue, ISSUE_JSON).unwrap();
        let RemoteItem::Issue(issue) = item else {
            panic!("expected issue");
        };
        assert_eq!(issue.author, "testuser");
        assert_eq!(issue.labels, vec!["bug", "high"]);
        assert_eq!(issue.comments.len(), 1);
        assert_eq!(issue.comments[0].author, "user2");
        assert_eq!(issue.comments[0].created_at, "2024-01-01T10:00:00Z");
    }

    #[test]
    fn parse_pr_fields() {
        let item = parse_item(ItemKind::PullRequest, PR_JSON).unwrap();
        let RemoteItem::PullRequest(pr) = item else {
            panic!("expected pull request");
        };
        assert_eq!(pr.head_branch, "feature/oauth");
        assert_eq!(pr.base_branch, "dev");
        assert_eq!(pr.mergeable, Some(false));
        assert_eq!(pr.additions, Some(150));
        assert_eq!(pr.changed_files, vec!["backend/api/auth.py", "frontend/auth.vue"]);
        assert_eq!(pr.details.body, EMPTY_BODY);
    }

    #[test]
    fn mergeable_accepts_bool_and_unknown() {
        let json = PR_JSON.replace(r#""CONFLICTING""#, "true");
        let RemoteItem::PullRequest(pr) = parse_item(ItemKind::PullRequest, &json).unwrap() else {
            panic!("expected pull request");
        };
        assert_eq!(pr.mergeable, Some(true));

        let json = PR_JSON.replace(r#""CONFLICTING""#, r#""UNKNOWN""#);
        let RemoteItem::PullRequest(pr) = parse_item(ItemKind::PullRequest, &json).unwrap() else {
            panic!("expected pull request");
        };
        assert_eq!(pr.mergeable, None);
    }

    #[test]
    fn minimal_issue_uses_defaults() {
        let item = parse_item(ItemKind::Issue, r#"{"title": "T", "number": 1, "author": null}"#)
            .unwrap();
        let details = item.details();
        assert_eq!(details.body, EMPTY_BODY);
        assert_eq!(details.author, "ghost");
        assert!(details.labels.is_empty());
    }

    #[test]
    fn strip_ansi_borrows_clean_text() {
        assert!(matches!(strip_ansi("{\"a\":1}"), Cow::Borrowed(_)));
        assert_eq!(strip_ansi("\x1b[32m{\"a\":1}\x1b[0m\x1b[2K"), "{\"a\":1}");
    }

    #[test]
    fn fetch_issue_invokes_gh_with_issue_fields() {
        let runner = FakeRunner::new();
        runner.on("gh", "issue", Scripted::Output(RunOutput::ok(ISSUE_JSON)));
        let item = client(&runner).fetch(&request(ItemKind::Issue, 42)).unwrap();
        assert_eq!(item.title(), "Fix database connection error");

        let calls = runner.calls_to("gh");
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].args,
            vec!["issue", "view", "42", "--repo", "testuser/testrepo", "--json", ISSUE_FIELDS]
        );
    }

    #[test]
    fn fetch_pr_requests_pr_fields() {
        let runner = FakeRunner::new();
        runner.on("gh", "pr", Scripted::Output(RunOutput::ok(PR_JSON)));
        let item = client(&runner).fetch(&request(ItemKind::PullRequest, 123)).unwrap();
        assert_eq!(item.kind(), ItemKind::PullRequest);
        let args = &runner.calls_to("gh")[0].args;
        assert!(args.last().unwrap().contains("headRefName"));
        assert!(args.last().unwrap().contains("files"));
    }

    #[test]
    fn fetch_tolerates_colored_output() {
        let runner = FakeRunner::new();
        let colored = format!("\x1b[1m{ISSUE_JSON}\x1b[0m");
        runner.on("gh", "issue", Scripted::Output(RunOutput::ok(&colored)));
        let item = client(&runner).fetch(&request(ItemKind::Issue, 42)).unwrap();
        assert_eq!(item.number(), 42);
    }

    #[test]
    fn fetch_failure_truncates_stderr() {
        let runner = FakeRunner::new();
        let stderr = format!("GraphQL: Could not resolve to an issue {}", "x".repeat(2000));
        runner.on("gh", "issue", Scripted::Output(RunOutput::failed(1, &stderr)));
        let err = client(&runner).fetch(&request(ItemKind::Issue, 42)).unwrap_err();
        match err {
            ExitError::ToolFailed { ref message, code, .. } => {
                assert_eq!(code, 1);
                assert!(message.starts_with("GraphQL"));
                assert!(message.len() <= STDERR_LIMIT);
            }
            ref other => panic!("expected ToolFailed, got {other:?}"),
        }
        assert!(err.to_string().contains("testuser/testrepo#42"));
    }

    #[test]
    fn fetch_error_classes() {
        let runner = FakeRunner::new();
        runner.on("gh", "issue", Scripted::Timeout(30));
        let err = client(&runner).fetch(&request(ItemKind::Issue, 1)).unwrap_err();
        assert_eq!(err.class(), ErrorClass::ToolTimeout);

        let runner = FakeRunner::new();
        let err = client(&runner).fetch(&request(ItemKind::Issue, 1)).unwrap_err();
        assert_eq!(err.class(), ErrorClass::ToolMissing);
        assert!(err.to_string().contains("cli.github.com"));

        let runner = FakeRunner::new();
        runner.on("gh", "issue", Scripted::Output(RunOutput::ok("not json")));
        let err = client(&runner).fetch(&request(ItemKind::Issue, 1)).unwrap_err();
        assert!(matches!(err, ExitError::ResponseFormat { .. }));
    }
}
