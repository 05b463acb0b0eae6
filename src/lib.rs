use std::sync::Arc;

use actix_web::web::{self, Data, JsonConfig, PathConfig, QueryConfig};
use actix_web::{App, HttpServer, ResponseError};
use mongodb::Client;
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

pub mod campaign;
pub mod chat;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod product;
pub mod realtime;
pub mod seed;
pub mod sweep;
pub mod tenant;
pub mod typedid;
pub mod user;
mod utils;

pub use campaign::{ApproveBody, CampaignBody, CreateCampaignBody, RejectBody, TransitionBody};
pub use chat::{ConversationBody, CreateConversationBody, MessageBody, PostMessageBody};
pub use error::Error;
pub use product::ProductBody;
pub use sweep::SweepBody;

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, DatabaseBackend};
use crate::database::{Database, MemoryDatabase, MongoDatabase};
use crate::realtime::transport::LocalTransport;
use crate::realtime::RealtimeHub;

/// Registers every endpoint. More specific routes come before the ones whose
/// path segments would swallow them.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(JsonConfig::default().error_handler(|err, _req| {
        // format json errors with custom format
        Error::InvalidJson(err).into()
    }))
    .app_data(PathConfig::default().error_handler(|err, _req| {
        // format path errors with custom format
        Error::InvalidPath(err).into()
    }))
    .app_data(QueryConfig::default().error_handler(|err, _req| {
        // format query errors with custom format
        Error::InvalidQuery(err).into()
    }))
    .service(campaign::endpoints::create_campaign)
    .service(campaign::endpoints::get_live_campaigns)
    .service(campaign::endpoints::submit_campaign)
    .service(campaign::endpoints::approve_campaign)
    .service(campaign::endpoints::reject_campaign)
    .service(campaign::endpoints::publish_campaign)
    .service(campaign::endpoints::get_campaign_by_id)
    .service(campaign::endpoints::get_tenant_campaigns)
    .service(sweep::endpoints::expire_launchpads)
    .service(product::endpoints::get_products)
    .service(product::endpoints::get_product_by_id)
    .service(chat::endpoints::create_conversation)
    .service(chat::endpoints::get_messages)
    .service(chat::endpoints::post_message)
    .service(realtime::endpoints::get_presence)
    .service(realtime::endpoints::stream_events);
}

pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::NEW)
        .compact()
        .init();
}

pub async fn run(config: Config) -> Result<(), Error> {
    let db: Arc<dyn Database> = match config.database_backend {
        DatabaseBackend::Mongo => {
            info!("connecting to db: {}", config.mongodb_uri);
            let client = Client::with_uri_str(&config.mongodb_uri).await?;
            let mut db = MongoDatabase::initialize(client.database(&config.database_name)).await?;
            if config.seed_database {
                // start from a clean slate, then recreate the indexes
                db.drop().await?;
                db = MongoDatabase::initialize(client.database(&config.database_name)).await?;
                seed::seed(&db).await?;
            }
            Arc::new(db)
        }
        DatabaseBackend::Memory => {
            info!("using the in-memory database");
            let db = MemoryDatabase::new();
            if config.seed_database {
                seed::seed(&db).await?;
            }
            Arc::new(db)
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let hub = RealtimeHub::new(Arc::new(LocalTransport::new()), config.reassembly_timeout);

    if config.sweep_interval.as_secs() > 0 {
        info!(interval = ?config.sweep_interval, "starting launchpad sweeper");
        sweep::spawn_sweeper(db.clone(), clock.clone(), config.sweep_interval);
    }

    let bind_address = config.bind_address.clone();
    let db = Data::from(db);
    let clock = Data::from(clock);
    let hub = Data::new(hub);
    let config = Data::new(config);

    info!("listening on {}", bind_address);
    HttpServer::new(move || {
        App::new()
            .app_data(db.clone())
            .app_data(clock.clone())
            .app_data(hub.clone())
            .app_data(config.clone())
            .wrap(TracingLogger::default())
            .configure(configure)
            .default_service(web::to(|| async { Error::PathNotFound.error_response() }))
    })
    .bind(bind_address)?
    .run()
    .await?;

    Ok(())
}
