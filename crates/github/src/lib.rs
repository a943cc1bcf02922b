pub mod client;
pub mod error;
pub mod license;
pub mod traits;
pub mod types;

pub use client::GitHubClient;
pub use error::{GitHubError, Result};
pub use license::mit_license;
pub use traits::HostingProvider;
pub use types::{pages_url, repo_url, ArtifactUrls, CreateRepoRequest, HostedRepository};
