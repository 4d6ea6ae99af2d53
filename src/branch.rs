//! Branch/worktree name derivation.
//!
//! Names look like `issue-42-fix-database-error`: a kind prefix, the item
//! number, and at most three words of the title reduced to `[a-z0-9-]`.

use std::fmt;

use crate::model::{ItemKind, RemoteItem};

const MAX_TITLE_WORDS: usize = 3;

/// A derived worktree/branch name. Only `[a-z0-9-]`, no edge hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchName(String);

impl BranchName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the name for a fetched item.
pub fn derive(item: &RemoteItem) -> BranchName {
    derive_name(item.kind(), item.number(), item.title())
}

/// Derive the name from its inputs. Pure: same inputs, same name.
pub fn derive_name(kind: ItemKind, number: u64, title: &str) -> BranchName {
    let words = sanitize_title(title);
    if words.is_empty() {
        BranchName(format!("{}-{number}", kind.prefix()))
    } else {
        BranchName(format!("{}-{number}-{words}", kind.prefix()))
    }
}

/// Drop one leading `[Tag]` (and a single following space) from the title.
fn strip_tag(title: &str) -> &str {
    if let Some(rest) = title.strip_prefix('[')
        && let Some(end) = rest.find(']')
    {
        let after = &rest[end + 1..];
        return after.strip_prefix(' ').unwrap_or(after);
    }
    title
}

fn sanitize_title(title: &str) -> String {
    let lowered = strip_tag(title).to_lowercase();
    let words = lowered
        .split_whitespace()
        .take(MAX_TITLE_WORDS)
        .collect::<Vec<_>>()
        .join(" ");

    let mut out = String::with_capacity(words.len());
    let mut pending_hyphen = false;
    for c in words.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    out
}
