use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::binding::{BindingOptions, ModelBindingService};
use crate::compilation::{CompilerCache, CompilerCacheConfig, PrecompiledManifest};
use crate::config::{self, Settings};
use crate::metadata::ModelMetadataProvider;
use crate::validation::ExcludeFilterOptions;

use super::error::InfraError;
use super::telemetry;

/// Services assembled from one set of settings.
pub struct Runtime {
    pub binding: ModelBindingService,
    pub compiler_cache: Arc<CompilerCache>,
}

/// Activate the exclude filters, build the binding service and seed the
/// compiler cache from the precompiled manifest when one is configured.
pub async fn bootstrap(
    settings: &Settings,
    metadata_provider: Arc<dyn ModelMetadataProvider>,
) -> Result<Runtime, InfraError> {
    let binding = ModelBindingService::configure(
        metadata_provider,
        BindingOptions::from(&settings.binding),
        &ExcludeFilterOptions::from(&settings.validation),
    )?;

    let compiler_cache = Arc::new(CompilerCache::new(CompilerCacheConfig::from(
        &settings.compilation,
    )));
    if let Some(path) = settings.compilation.precompiled_manifest.as_deref() {
        let manifest = PrecompiledManifest::load(path).await?;
        compiler_cache.add_manifest(&manifest);
    }

    info!(
        exclude_filters = binding.validator().exclude_filters().len(),
        precompiled_views = compiler_cache.len(),
        "Runtime bootstrapped"
    );
    Ok(Runtime {
        binding,
        compiler_cache,
    })
}

/// Load settings, install telemetry, then [`bootstrap`].
pub async fn start(
    config_file: Option<&Path>,
    metadata_provider: Arc<dyn ModelMetadataProvider>,
) -> Result<Runtime, InfraError> {
    let settings = config::load(config_file)?;
    telemetry::init(&settings.logging)?;
    bootstrap(&settings, metadata_provider).await
}
