use appforge_core::RequirementsDocument;
use async_trait::async_trait;

use crate::error::GenerationResult;

/// Produces the raw text of a file map for a requirements document.
///
/// Implementations return the model output unparsed; turning it into files
/// (and falling back when that fails) is the caller's job.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, requirements: &RequirementsDocument) -> GenerationResult<String>;
}
