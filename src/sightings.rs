use crate::db;
use crate::recent::RecentPlates;
use crate::types::{SpottedPlate, Vehicle};
use futures::StreamExt;
use log::{error, info};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tokio::sync::Mutex;

pub async fn run(
    rx: Receiver<SpottedPlate>,
    db_conn: Arc<Mutex<Connection>>,
    recent: Arc<Mutex<RecentPlates>>,
) {
    rx.for_each(|spotted_plate| async {
        handle_plate(spotted_plate, db_conn.clone(), recent.clone()).await;
    })
    .await;
    error!("Rx stream ended");
}

/// Records the sighting and returns the registered vehicle, if any.
async fn handle_plate(
    spotted_plate: SpottedPlate,
    db_conn: Arc<Mutex<Connection>>,
    recent: Arc<Mutex<RecentPlates>>,
) -> Option<Vehicle> {
    info!("Spotted plate {:?}", spotted_plate);
    let vehicle = {
        let conn = &db_conn.lock().await;
        db::record_sighting(conn, &spotted_plate.plate, spotted_plate.image_url.as_deref());
        db::vehicle_by_plate(conn, &spotted_plate.plate)
    };
    match &vehicle {
        Some(v) => {
            info!("Spotted registered vehicle {}", v.describe());
            // A registered vehicle ends the camera session.
            recent.lock().await.clear();
        }
        None => info!(
            "Plate {} ({}) is not registered",
            spotted_plate.plate, spotted_plate.format
        ),
    }
    vehicle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plate::PlateFormat;
    use crate::types::VehicleFields;

    fn spotted(plate: &str) -> SpottedPlate {
        SpottedPlate {
            plate: plate.to_string(),
            format: PlateFormat::Mercosul,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn unregistered_plate_is_recorded() {
        let db_conn = Arc::new(Mutex::new(db::open(":memory:").unwrap()));
        let recent = Arc::new(Mutex::new(RecentPlates::new(7)));
        recent.lock().await.remember("ABC1D23");

        let vehicle = handle_plate(spotted("ABC1D23"), db_conn.clone(), recent.clone()).await;
        assert_eq!(vehicle, None);
        assert_eq!(recent.lock().await.len(), 1);
        let sightings = db::list_sightings(&*db_conn.lock().await);
        assert_eq!(sightings.len(), 1);
        assert_eq!(sightings[0].plate, "ABC1D23");
    }

    #[tokio::test]
    async fn registered_vehicle_ends_session() {
        let db_conn = Arc::new(Mutex::new(db::open(":memory:").unwrap()));
        let recent = Arc::new(Mutex::new(RecentPlates::new(7)));
        let fields = VehicleFields {
            plate: "ABC1D23".to_string(),
            ..VehicleFields::default()
        };
        db::create_vehicle(&*db_conn.lock().await, &fields).unwrap();
        recent.lock().await.remember("ABC1D23");

        let vehicle = handle_plate(spotted("ABC1D23"), db_conn.clone(), recent.clone()).await;
        assert_eq!(vehicle.map(|v| v.fields), Some(fields));
        assert!(recent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn run_drains_channel() {
        let db_conn = Arc::new(Mutex::new(db::open(":memory:").unwrap()));
        let recent = Arc::new(Mutex::new(RecentPlates::new(7)));
        let (mut tx, rx) = tokio::sync::mpsc::channel(8);
        tx.send(spotted("ABC1D23")).await.unwrap();
        tx.send(spotted("XYZ9A87")).await.unwrap();
        drop(tx);
        run(rx, db_conn.clone(), recent).await;
        assert_eq!(db::list_sightings(&*db_conn.lock().await).len(), 2);
    }
}
