//! ghwt - create git worktrees from GitHub issues and pull requests

pub mod agent;
pub mod branch;
pub mod commands;
pub mod config;
pub mod conflict;
pub mod error;
pub mod git;
pub mod github;
pub mod model;
pub mod orchestrator;
pub mod resolve;
pub mod subprocess;
pub mod telemetry;
pub mod template;
pub mod worktree;

#[cfg(test)]
mod testing;
