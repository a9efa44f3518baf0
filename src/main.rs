use domain::message_store::DbMessageStore;
use domain::token::TokenAuthenticator;
use log::*;
use migration::{Migrator, MigratorTrait};
use realtime::hub::Hub;
use service::{config::Config, logging::Logger, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logger: {e}");
        std::process::exit(1);
    }

    info!("Starting Switchboard ({} environment)", config.runtime_env());
    trace!("Using config: {config:?}");

    let db = match service::init_database(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to establish database connection: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = Migrator::up(db.as_ref(), None).await {
        error!("Failed to run database migrations: {e}");
        std::process::exit(1);
    }

    let hub = Hub::new(
        config.relay_config(),
        Arc::new(DbMessageStore::new(db.clone())),
        Arc::new(TokenAuthenticator::from_config(&config)),
    );
    let _sweeper = hub.spawn_liveness_sweeper();

    let app_state = AppState::new(config, &db, hub);

    if let Err(e) = web::init_server(app_state).await {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
