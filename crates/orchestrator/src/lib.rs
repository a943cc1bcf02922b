pub mod backoff;
pub mod builder;
pub mod error;
pub mod generation;
pub mod locks;
pub mod notifier;
pub mod poller;
pub mod queue;
pub mod state_machine;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use backoff::{BackoffPolicy, RetryOutcome};
pub use builder::{BuildConfig, BuildJobHandler, BuildOrchestrator, BuildOutcome};
pub use error::{OrchestratorError, Result};
pub use generation::{default_file_set, parse_file_map, GeneratedFiles};
pub use locks::ArtifactLocks;
pub use notifier::{DeliveryOutcome, Notifier};
pub use poller::{LivenessPoller, PollOutcome};
pub use queue::{JobHandler, JobQueue};
pub use state_machine::{BuildStage, BuildStateMachine};
