//! Engine construction from configuration.

use crate::config::Config;
use crate::engine::{Engine, Upstream};
use crate::model::Simulation;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

/// Build an engine ready to serve: the simulation is imported and the
/// middleware installed before the configured mode is entered.
pub async fn build_engine(
    config: &Config,
    upstream: Arc<dyn Upstream>,
) -> Result<Engine, anyhow::Error> {
    let engine = Engine::new(config.engine_config(), upstream)?;

    if let Some(path) = &config.simulation {
        let simulation = Simulation::from_file(path)?;
        engine
            .put_simulation(simulation)
            .with_context(|| format!("Failed to import simulation {}", path))?;
        info!(
            "Imported {} templates and {} response delays from {}",
            engine.template_count(),
            engine.response_delays().len(),
            path
        );
    }

    let middleware = config.middleware.resolve()?;
    engine
        .set_middleware(&middleware.binary, &middleware.script, &middleware.remote)
        .await
        .context("Middleware failed validation")?;

    engine.set_mode(config.mode.as_str())?;
    Ok(engine)
}
