//! External collaborators behind mockable seams: the git subprocess, the
//! container sandbox, and the code-forge REST API.

mod forge;
mod git;
mod sandbox;

pub use forge::{ForgeClient, ForgeError, GitHubForge, IssueRef, PullRequestRef};
pub use git::{GitError, GitRunner, SystemGit};
pub use sandbox::{
    DockerSandbox, Mount, SandboxError, SandboxResult, SandboxRunner, SandboxSpec,
};
