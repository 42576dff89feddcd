use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{Checkpoint, GenerationRequest};

/// Generation backend: turns a request into one utterance (or JSON object).
pub trait Generator: Send + Sync + 'static {
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'_, Result<String>>;
}

impl<G: Generator + ?Sized> Generator for Arc<G> {
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'_, Result<String>> {
        (**self).generate(request)
    }
}

/// Keyed snapshot storage.
///
/// Implementations must make `save` atomic per key: a concurrent `load`
/// observes either the previous checkpoint or the new one, never a mix.
pub trait CheckpointStore: Send + Sync + 'static {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    fn load(&self, key: &str) -> Result<Option<Checkpoint>>;

    /// Remove a key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}
