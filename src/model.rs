//! Issue and pull request data as ghwt sees it after normalization.

use std::fmt;

/// Whether an input refers to an issue or a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Issue,
    PullRequest,
}

impl ItemKind {
    /// Prefix used in derived branch names.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::PullRequest => "pr",
        }
    }

    /// Human label used in the task brief.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Issue => "Issue",
            Self::PullRequest => "Pull Request",
        }
    }

    /// `gh` subcommand that views this kind of item.
    pub const fn gh_subcommand(self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::PullRequest => "pr",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub author: String,
    pub body: String,
    /// Opaque timestamp as reported by GitHub.
    pub created_at: String,
}

/// Fields shared by issues and pull requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDetails {
    pub title: String,
    pub body: String,
    pub number: u64,
    pub author: String,
    pub labels: Vec<String>,
    pub state: String,
    pub url: String,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub details: ItemDetails,
    pub head_branch: String,
    pub base_branch: String,
    pub mergeable: Option<bool>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub changed_files: Vec<String>,
}

/// A fetched issue or pull request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteItem {
    Issue(ItemDetails),
    PullRequest(PullRequest),
}

impl RemoteItem {
    pub const fn kind(&self) -> ItemKind {
        match self {
            Self::Issue(_) => ItemKind::Issue,
            Self::PullRequest(_) => ItemKind::PullRequest,
        }
    }

    pub const fn details(&self) -> &ItemDetails {
        match self {
            Self::Issue(details) => details,
            Self::PullRequest(pr) => &pr.details,
        }
    }

    pub const fn number(&self) -> u64 {
        self.details().number
    }

    pub fn title(&self) -> &str {
        &self.details().title
    }
}

/// What the resolver hands the orchestrator: one item to materialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRequest {
    pub kind: ItemKind,
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl WorkspaceRequest {
    /// `owner/repo`, as `gh --repo` expects it.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for WorkspaceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}#{}", self.kind, self.owner, self.repo, self.number)
    }
}
