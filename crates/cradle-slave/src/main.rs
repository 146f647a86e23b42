//! cradle-slave: worker process hosting one sandbox for one app.
//!
//! Launched by the engine through an isolate with an identity passed as
//! argument pairs; connects back over the app's bus endpoint and serves
//! invocations until terminated, disowned, or evicted for idleness.
//!
//! Exits zero on a clean shutdown and non-zero when initialization or the
//! bus fails.

use anyhow::Context as _;
use cradle_core::{Config, Context};
use cradle_slave::config::SlaveConfig;
use cradle_slave::echo;
use cradle_slave::slave::Slave;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cradle_slave=debug".parse().unwrap()),
        )
        .init();

    let slave_config = SlaveConfig::from_args(std::env::args().skip(1))
        .context("unable to parse slave arguments")?;

    info!(
        slave_id = %slave_config.uuid,
        app = %slave_config.app,
        profile = %slave_config.profile,
        "cradle-slave starting"
    );

    let config = Config::from_env();
    config.validate_warn();

    let mut context = Context::new(config);

    // Built-in components, registered before anything looks them up.
    echo::register(context.repository_mut())?;

    let slave = Slave::connect(&context, slave_config).await?;
    let reason = slave.run().await?;

    info!(reason = ?reason, "cradle-slave stopped");
    Ok(())
}
