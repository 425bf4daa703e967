// src/main.rs
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod clock_engine;
mod error;
mod handlers;
mod models;
mod planning;
mod resolver;
mod store;

#[cfg(test)]
mod planning_tests;

use resolver::{AttendanceCore, TimeSource};
use store::MemoryStore;

#[derive(Error, Debug)]
enum AppError {
    #[error("Invalid value for {key}: {value}")]
    InvalidEnvVar { key: String, value: String },
}

#[derive(Debug, Clone)]
struct AppConfig {
    host: [u8; 4],
    port: u16,
}

fn load_app_config() -> Result<AppConfig, AppError> {
    let host_raw = env::var("TIMECLOCK_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mut host = [0u8; 4];
    let octets: Vec<&str> = host_raw.split('.').collect();
    if octets.len() != 4 {
        return Err(AppError::InvalidEnvVar {
            key: "TIMECLOCK_HOST".to_string(),
            value: host_raw,
        });
    }
    for (i, octet) in octets.iter().enumerate() {
        host[i] = octet.parse().map_err(|_| AppError::InvalidEnvVar {
            key: "TIMECLOCK_HOST".to_string(),
            value: host_raw.clone(),
        })?;
    }
    let port = match env::var("TIMECLOCK_PORT") {
        Ok(raw) => raw.parse().map_err(|_| AppError::InvalidEnvVar {
            key: "TIMECLOCK_PORT".to_string(),
            value: raw,
        })?,
        Err(_) => 3000,
    };
    Ok(AppConfig { host, port })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting tracing subscriber failed")?;
    info!("Tracing subscriber initialized.");

    let config = load_app_config().context("Loading app configuration failed")?;
    info!("App configuration loaded.");

    let store = Arc::new(MemoryStore::new());
    let core = AttendanceCore::new(store, TimeSource::system());
    let app = handlers::router(core);

    let addr = SocketAddr::from((config.host, config.port));
    info!("Starting attendance server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Binding listener failed")?;
    axum::serve(listener, app).await.context("Server failed")?;

    Ok(())
}
