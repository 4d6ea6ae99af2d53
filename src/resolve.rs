//! Turn operator input (a GitHub URL or a bare number) into a [`WorkspaceRequest`].

use regex::Regex;
use tracing::Span;

use crate::error::ExitError;
use crate::git::Git;
use crate::model::{ItemKind, WorkspaceRequest};

pub struct Resolver<'a> {
    git: Git<'a>,
    host: String,
    url_pattern: Regex,
    span: Span,
}

impl<'a> Resolver<'a> {
    pub fn new(git: Git<'a>, host: &str, span: Span) -> Result<Self, ExitError> {
        let pattern = format!(
            r"{}/([^/\s]+)/([^/\s]+)/(issues|pull)/(\d+)",
            regex::escape(host)
        );
        let url_pattern = Regex::new(&pattern)
            .map_err(|e| ExitError::Config(format!("invalid github host {host:?}: {e}")))?;
        Ok(Self {
            git,
            host: host.to_string(),
            url_pattern,
            span,
        })
    }

    /// Resolve `input` to kind, owner, repo and number.
    ///
    /// Bare numbers need `explicit_kind` and take owner/repo from the current
    /// repository's remotes. URLs carry their own kind; `explicit_kind` is
    /// ignored for them.
    pub fn resolve(
        &self,
        input: &str,
        explicit_kind: Option<ItemKind>,
    ) -> Result<WorkspaceRequest, ExitError> {
        let _enter = self.span.enter();
        let input = input.trim();

        if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
            tracing::debug!(number = input, kind = ?explicit_kind, "bare number, using git remote");
            let Some(kind) = explicit_kind else {
                return Err(ExitError::MissingKind {
                    number: input.to_string(),
                });
            };
            let number = parse_number(input)?;
            let (owner, repo) = self.detect_remote()?;
            return Ok(WorkspaceRequest {
                kind,
                owner,
                repo,
                number,
            });
        }

        let caps = self
            .url_pattern
            .captures(input)
            .ok_or_else(|| ExitError::InvalidUrl {
                input: input.to_string(),
            })?;

        let kind = if &caps[3] == "issues" {
            ItemKind::Issue
        } else {
            ItemKind::PullRequest
        };
        if let Some(flag) = explicit_kind
            && flag != kind
        {
            tracing::debug!(flag = %flag, url_kind = %kind, "kind flag ignored for URL input");
        }

        let request = WorkspaceRequest {
            kind,
            owner: caps[1].to_string(),
            repo: caps[2].to_string(),
            number: parse_number(&caps[4])?,
        };
        tracing::debug!(request = %request, "parsed GitHub URL");
        Ok(request)
    }

    /// First remote pointing at the configured host, as `(owner, repo)`.
    pub fn detect_remote(&self) -> Result<(String, String), ExitError> {
        let _enter = self.span.enter();
        for remote in self.git.remotes()? {
            if !remote.url.contains(&self.host) {
                continue;
            }
            if let Some((owner, repo)) = parse_remote_url(&remote.url) {
                tracing::debug!(remote = %remote.name, owner = %owner, repo = %repo, "detected GitHub remote");
                return Ok((owner, repo));
            }
        }
        tracing::warn!(host = %self.host, "no matching git remote");
        Err(ExitError::NoRemoteFound {
            host: self.host.clone(),
        })
    }
}

fn parse_number(digits: &str) -> Result<u64, ExitError> {
    match digits.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ExitError::InvalidNumber {
            input: digits.to_string(),
        }),
    }
}

/// Extract `(owner, repo)` from an https, ssh, or scp-style remote URL.
pub fn parse_remote_url(url: &str) -> Option<(String, String)> {
    let path = if let Some((_, rest)) = url.split_once("://") {
        // scheme://[user@]host[:port]/owner/repo
        rest.split_once('/')?.1
    } else {
        // [user@]host:owner/repo
        url.split_once(':')?.1
    };

    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);

    let mut segments = path.split('/');
    let owner = segments.next().filter(|s| !s.is_empty())?;
    let repo = segments.next().filter(|s| !s.is_empty())?;
    if segments.next().is_some() {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
