mod config;
mod db;
mod plate;
mod recent;
mod sightings;
mod types;
mod webhook;

use config::Config;
use env_logger::Env;
use log::{error, info};
use recent::RecentPlates;
use std::sync::Arc;
use tokio::sync::mpsc::channel;
use tokio::sync::Mutex;

#[macro_use]
extern crate failure;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("Starting plate-scanner");

    let config = Config::from_env();
    info!("Using {:?}", config);
    let db_conn = match db::open(&config.db_path) {
        Ok(conn) => Arc::new(Mutex::new(conn)),
        Err(e) => {
            error!("Unable to open database {}: {}", config.db_path, e);
            return;
        }
    };
    let recent = Arc::new(Mutex::new(RecentPlates::new(config.recent_capacity)));

    let (tx, rx) = channel(8);
    let sightings_task = tokio::spawn(sightings::run(rx, db_conn.clone(), recent.clone()));
    let webhook_task = tokio::spawn(webhook::run(webhook::State {
        config: Arc::new(config),
        db_conn,
        recent,
        tx,
    }));
    tokio::select! {
        result = sightings_task => {
            if let Err(e) = result {
                error!("Sightings task failed: {}", e);
            }
        }
        result = webhook_task => {
            if let Err(e) = result {
                error!("Webhook task failed: {}", e);
            }
        }
    }
    info!("Exiting main");
}
