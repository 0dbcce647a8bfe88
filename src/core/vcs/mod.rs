pub mod system_git;
mod system_git_ops;

pub use system_git::SystemGit;

/// Author and committer identity for release commits and tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
  pub name: String,
  pub email: String,
}
