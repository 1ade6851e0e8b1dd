use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use dotenvy::dotenv;

mod api;
mod config;
mod db;
mod docs;
mod engine;
mod error;
mod model;
mod models;
mod routes;
mod store;
mod utils;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::engine::presence::RetryPolicy;
use crate::engine::reader::{FeedSettings, ReaderFeed, Ura4Reader};
use crate::engine::{Engine, EngineSettings};
use crate::routes::RateLimits;
use crate::store::{AttendanceStore, MemoryStore, MySqlStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const WARMUP_BATCH: usize = 100;

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn AttendanceStore>> {
    match &config.database_url {
        Some(url) => {
            let pool = init_db(url)
                .await
                .context("Failed to connect to database")?;
            info!("Using MySQL attendance store");
            Ok(Arc::new(MySqlStore::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set, attendance is kept in memory only");
            Ok(Arc::new(MemoryStore::with_locations(
                config.antenna_locations.clone(),
            )?))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "timeroom.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let store = open_store(&config).await?;

    match store.list_locations().await {
        Ok(locations) if locations.is_empty() => {
            warn!("No locations configured, every scan will be reported as an unknown antenna")
        }
        Ok(locations) => {
            for location in &locations {
                info!(antenna = location.antenna_port, area = %location.area_name, "Monitoring location");
            }
        }
        Err(e) => error!(error = %e, "Could not list locations"),
    }

    let engine = Arc::new(Engine::new(
        store,
        EngineSettings {
            dwell_window: chrono::Duration::seconds(config.debounce_seconds),
            recent_capacity: config.recent_events,
            subscriber_queue: config.subscriber_queue,
            retry: RetryPolicy {
                max_attempts: config.store_write_attempts,
                ..RetryPolicy::default()
            },
            reader_address: config.reader_url.clone(),
        },
    ));

    let cancel = CancellationToken::new();
    let refresher = tokio::spawn(engine.clone().keep_identity_warm(
        WARMUP_BATCH,
        config.identity_refresh,
        cancel.clone(),
    ));

    let (tx, rx) = mpsc::channel(config.feed_channel);
    let reader = Ura4Reader::new(&config.reader_url, config.reader_timeout)?;
    let feed = ReaderFeed::new(
        reader,
        FeedSettings {
            poll_interval: config.reader_poll,
            max_backoff: config.reader_backoff_max,
        },
    )
    .spawn(tx, cancel.clone());
    let consumer = tokio::spawn(engine.clone().run_feed(rx, cancel.clone()));

    let server_addr = config.server_addr.clone();
    let limits = RateLimits::from_config(&config);
    let app_engine = engine.clone();
    info!(addr = %server_addr, "HTTP and WebSocket server listening");

    HttpServer::new(move || {
        let config = config.clone();
        let limits = limits.clone();
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::from(app_engine.clone()))
            .configure(move |cfg| routes::configure(cfg, &config, &limits))
    })
    .bind(&server_addr)?
    .run()
    .await?;

    info!("Server stopped, shutting down engine");
    cancel.cancel();
    engine.hub().shutdown();
    if let Err(e) = feed.await {
        error!(error = %e, "Reader feed task failed");
    }
    if let Err(e) = consumer.await {
        error!(error = %e, "Feed consumer task failed");
    }
    if let Err(e) = refresher.await {
        error!(error = %e, "Identity refresh task failed");
    }
    Ok(())
}
