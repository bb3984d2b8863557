//! CLI command implementations

use std::sync::Arc;

use anyhow::Context;
use ssp_core::{Cache, CacheHandle, IdentityClaims, RequestRouter, query};
use ssp_files::FilesFamily;
use ssp_server::{AppState, SspServer};
use ssp_virtual::VirtualSensorsFamily;

use crate::config::Config;

fn spawn_cache(config: &Config) -> anyhow::Result<CacheHandle> {
    let store = config.cache.open_store().context("cannot open cache store")?;
    let cache = Cache::spawn(store, config.cache.cache_config())?;
    tracing::info!("Cache started ({:?} backend)", config.cache.backend);
    Ok(cache)
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let base_uri = config.server.base_uri();
    tracing::info!("Starting gateway on {}:{}", config.server.host, config.server.port);

    let cache = spawn_cache(&config)?;
    let claims = IdentityClaims::new();
    let mut router = RequestRouter::new(cache.clone(), claims.clone());

    if config.files.enabled {
        let files = Arc::new(
            FilesFamily::new(&config.files, &base_uri, cache.clone(), claims.clone())
                .context("cannot start the file family")?,
        );
        files.discover().await;
        // The task owns the watcher and runs until the process exits.
        files.watch().context("cannot watch the data directory")?;
        router = router.with_source(Arc::new(files.registry().clone()));
    }

    let mut sensors = None;
    if config.virtual_sensors.enabled {
        let family = Arc::new(VirtualSensorsFamily::new(
            &config.virtual_sensors,
            &base_uri,
            cache.clone(),
            claims.clone(),
        ));
        let created = family.create_configured(&config.virtual_sensors).await;
        tracing::info!("Created {} configured virtual sensors", created);
        router = router.with_source(Arc::new(family.registry().clone()));
        sensors = Some(family);
    }

    let mut state = AppState::new(router, base_uri);
    if let Some(family) = sensors {
        state = state.with_virtual_sensors(family);
    }

    SspServer::new(state, config.server).start().await
}

/// Register the configured files into a fresh cache and run `text` once.
pub async fn query(config: Config, text: &str) -> anyhow::Result<()> {
    let cache = spawn_cache(&config)?;
    let claims = IdentityClaims::new();
    let files = FilesFamily::new(&config.files, &config.server.base_uri(), cache.clone(), claims)
        .context("cannot open the data directory")?;
    files.discover().await;

    let results = query::execute(&cache, text).await?;
    tracing::info!("{} rows in {:?}", results.rows.len(), results.duration);
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

pub fn check_config(config: &Config) -> anyhow::Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
