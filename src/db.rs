use crate::types::{Sighting, Vehicle, VehicleFields};
use log::error;
use rusqlite::{params, Connection, OptionalExtension, Result, Row, NO_PARAMS};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const VEHICLE_COLUMNS: &str = "id, created_at, updated_at, plate, brand, model, year, color, \
     contact_name, contact_phone, contact_email, comments";

pub fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sighting (
            id TEXT NOT NULL PRIMARY KEY,
            created_at REAL NOT NULL,
            plate TEXT NOT NULL,
            image_url TEXT
        );
        CREATE INDEX IF NOT EXISTS sighting_plate ON sighting(plate);
        CREATE TABLE IF NOT EXISTS vehicle (
            id TEXT NOT NULL PRIMARY KEY,
            created_at REAL NOT NULL,
            updated_at REAL NOT NULL,
            plate TEXT NOT NULL UNIQUE,
            brand TEXT,
            model TEXT,
            year INTEGER,
            color TEXT,
            contact_name TEXT,
            contact_phone TEXT,
            contact_email TEXT,
            comments TEXT
        );",
    )?;
    Ok(conn)
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn new_id() -> String {
    Uuid::new_v4().to_simple().to_string()
}

/// Inserts a row into 'sighting'.
pub fn record_sighting(conn: &Connection, plate: &str, image_url: Option<&str>) -> Option<Sighting> {
    match record_sighting_impl(conn, plate, image_url) {
        Ok(s) => Some(s),
        Err(e) => {
            error!("Error recording sighting of plate {}: {:?}", plate, e);
            None
        }
    }
}

fn record_sighting_impl(conn: &Connection, plate: &str, image_url: Option<&str>) -> Result<Sighting> {
    let sighting = Sighting {
        id: new_id(),
        created_at: now(),
        plate: plate.to_string(),
        image_url: image_url.map(str::to_string),
    };
    conn.execute(
        "INSERT INTO sighting(id, created_at, plate, image_url) VALUES (?1, ?2, ?3, ?4)",
        params![sighting.id, sighting.created_at, sighting.plate, sighting.image_url],
    )?;
    Ok(sighting)
}

/// Newest first.
pub fn list_sightings(conn: &Connection) -> Vec<Sighting> {
    list_sightings_impl(conn).unwrap_or_else(|e| {
        error!("Error listing sightings: {:?}", e);
        vec![]
    })
}

fn list_sightings_impl(conn: &Connection) -> Result<Vec<Sighting>> {
    let mut stmt = conn.prepare(
        "SELECT id, created_at, plate, image_url FROM sighting ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(NO_PARAMS, |row| {
        Ok(Sighting {
            id: row.get(0)?,
            created_at: row.get(1)?,
            plate: row.get(2)?,
            image_url: row.get(3)?,
        })
    })?;
    rows.collect()
}

pub fn delete_sighting(conn: &Connection, id: &str) -> bool {
    match conn.execute("DELETE FROM sighting WHERE id = ?1", params![id]) {
        Ok(n) => n > 0,
        Err(e) => {
            error!("Error deleting sighting {}: {:?}", id, e);
            false
        }
    }
}

fn vehicle_from_row(row: &Row) -> Result<Vehicle> {
    Ok(Vehicle {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        fields: VehicleFields {
            plate: row.get(3)?,
            brand: row.get(4)?,
            model: row.get(5)?,
            year: row.get(6)?,
            color: row.get(7)?,
            contact_name: row.get(8)?,
            contact_phone: row.get(9)?,
            contact_email: row.get(10)?,
            comments: row.get(11)?,
        },
    })
}

/// Newest first.
pub fn list_vehicles(conn: &Connection) -> Vec<Vehicle> {
    list_vehicles_impl(conn).unwrap_or_else(|e| {
        error!("Error listing vehicles: {:?}", e);
        vec![]
    })
}

fn list_vehicles_impl(conn: &Connection) -> Result<Vec<Vehicle>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM vehicle ORDER BY created_at DESC, rowid DESC",
        VEHICLE_COLUMNS
    ))?;
    let rows = stmt.query_map(NO_PARAMS, vehicle_from_row)?;
    rows.collect()
}

/// `plate` must already be canonical.
pub fn vehicle_by_plate(conn: &Connection, plate: &str) -> Option<Vehicle> {
    conn.query_row(
        &format!("SELECT {} FROM vehicle WHERE plate = ?1", VEHICLE_COLUMNS),
        params![plate],
        vehicle_from_row,
    )
    .optional()
    .unwrap_or_else(|e| {
        error!("Error looking up vehicle {}: {:?}", plate, e);
        None
    })
}

pub fn create_vehicle(conn: &Connection, fields: &VehicleFields) -> Option<Vehicle> {
    match create_vehicle_impl(conn, fields) {
        Ok(v) => Some(v),
        Err(e) => {
            error!("Error creating vehicle {}: {:?}", fields.plate, e);
            None
        }
    }
}

fn create_vehicle_impl(conn: &Connection, fields: &VehicleFields) -> Result<Vehicle> {
    let created_at = now();
    let vehicle = Vehicle {
        id: new_id(),
        created_at,
        updated_at: created_at,
        fields: fields.clone(),
    };
    let f = fields;
    conn.execute(
        &format!(
            "INSERT INTO vehicle({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            VEHICLE_COLUMNS
        ),
        params![
            vehicle.id,
            vehicle.created_at,
            vehicle.updated_at,
            f.plate,
            f.brand,
            f.model,
            f.year,
            f.color,
            f.contact_name,
            f.contact_phone,
            f.contact_email,
            f.comments
        ],
    )?;
    Ok(vehicle)
}

/// Replaces every editable field. False if the id is unknown or the new
/// plate belongs to another record.
pub fn update_vehicle(conn: &Connection, id: &str, fields: &VehicleFields) -> bool {
    let f = fields;
    let result = conn.execute(
        "UPDATE vehicle SET updated_at = ?2, plate = ?3, brand = ?4, model = ?5, year = ?6, \
         color = ?7, contact_name = ?8, contact_phone = ?9, contact_email = ?10, comments = ?11 \
         WHERE id = ?1",
        params![
            id,
            now(),
            f.plate,
            f.brand,
            f.model,
            f.year,
            f.color,
            f.contact_name,
            f.contact_phone,
            f.contact_email,
            f.comments
        ],
    );
    match result {
        Ok(n) => n > 0,
        Err(e) => {
            error!("Error updating vehicle {}: {:?}", id, e);
            false
        }
    }
}

pub fn delete_vehicle(conn: &Connection, id: &str) -> bool {
    match conn.execute("DELETE FROM vehicle WHERE id = ?1", params![id]) {
        Ok(n) => n > 0,
        Err(e) => {
            error!("Error deleting vehicle {}: {:?}", id, e);
            false
        }
    }
}
