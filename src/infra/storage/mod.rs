//! Object store adapters.

mod fs;
mod s3;

use std::sync::Arc;

use crate::{
    application::storage::ObjectStore,
    config::{StorageBackend, StorageSettings},
};

use super::error::InfraError;

pub use fs::FilesystemObjectStore;
pub use s3::S3ObjectStore;

/// Build the store selected by `settings.backend`.
pub async fn connect(settings: &StorageSettings) -> Result<Arc<dyn ObjectStore>, InfraError> {
    match settings.backend {
        StorageBackend::S3 => {
            let store = S3ObjectStore::connect(&settings.region, settings.endpoint.as_deref()).await;
            Ok(Arc::new(store))
        }
        StorageBackend::Filesystem => {
            let store = FilesystemObjectStore::new(settings.root.clone())?;
            Ok(Arc::new(store))
        }
    }
}
