use crate::config::Config;
use crate::db;
use crate::plate::{self, PlateFormat, ValidationResult};
use crate::recent::RecentPlates;
use crate::types::{SpottedPlate, VehicleFields};
use bytes::Buf;
use futures::StreamExt;
use image::imageops::FilterType;
use image::io::Reader as ImageReader;
use image::{DynamicImage, ImageFormat};
use log::{debug, error, info, warn};
use percent_encoding::percent_decode_str;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::Sender;
use tokio::sync::Mutex;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

const MAX_FRAME_BYTES: u64 = 10 * 1024 * 1024;
const MAX_FORM_BYTES: u64 = 16 * 1024;

#[derive(Debug)]
struct BadRequest(String);

impl warp::reject::Reject for BadRequest {}

#[derive(Debug)]
struct ServerError(String);

impl warp::reject::Reject for ServerError {}

#[derive(Clone)]
pub struct State {
    pub config: Arc<Config>,
    pub db_conn: Arc<Mutex<Connection>>,
    pub recent: Arc<Mutex<RecentPlates>>,
    pub tx: Sender<SpottedPlate>,
}

pub async fn run(state: State) {
    let port = state.config.port;
    info!("Listening on port {}", port);
    warp::serve(routes(state)).run(([0, 0, 0, 0], port)).await;
}

fn with_state(state: State) -> impl Filter<Extract = (State,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body() -> impl Filter<Extract = (Value,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_FORM_BYTES).and(warp::body::json())
}

pub fn routes(state: State) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let frame = warp::post()
        .and(warp::path!("frame"))
        .and(warp::filters::multipart::form().max_length(MAX_FRAME_BYTES))
        .and(with_state(state.clone()))
        .and_then(|form, state| async move {
            match handle_frame(form, &state).await {
                Ok(reply) => Ok(json_reply(&reply, StatusCode::OK)),
                Err(e) => {
                    error!("Error handling frame: {:?}", e);
                    // The sightings task is gone; the frame itself was fine.
                    if e.downcast_ref::<SendError<SpottedPlate>>().is_some() {
                        Err(warp::reject::custom(ServerError(e.to_string())))
                    } else {
                        Err(warp::reject::custom(BadRequest(e.to_string())))
                    }
                }
            }
        });
    let stop_session = warp::post()
        .and(warp::path!("session" / "stop"))
        .and(with_state(state.clone()))
        .and_then(stop_session);
    let list_sightings = warp::get()
        .and(warp::path!("sightings"))
        .and(with_state(state.clone()))
        .and_then(list_sightings);
    let delete_sighting = warp::delete()
        .and(warp::path!("sightings" / String))
        .and(with_state(state.clone()))
        .and_then(delete_sighting);
    let list_vehicles = warp::get()
        .and(warp::path!("vehicles"))
        .and(with_state(state.clone()))
        .and_then(list_vehicles);
    let get_vehicle = warp::get()
        .and(warp::path!("vehicles" / String))
        .and(with_state(state.clone()))
        .and_then(get_vehicle);
    let create_vehicle = warp::post()
        .and(warp::path!("vehicles"))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(create_vehicle);
    let update_vehicle = warp::put()
        .and(warp::path!("vehicles" / String))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(update_vehicle);
    let delete_vehicle = warp::delete()
        .and(warp::path!("vehicles" / String))
        .and(with_state(state))
        .and_then(delete_vehicle);

    frame
        .or(stop_session)
        .or(list_sightings)
        .or(delete_sighting)
        .or(list_vehicles)
        .or(get_vehicle)
        .or(create_vehicle)
        .or(update_vehicle)
        .or(delete_vehicle)
        .recover(handle_rejection)
}

fn json_reply(value: &Value, status: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(value), status)
}

fn error_reply(message: &str, status: StatusCode) -> WithStatus<Json> {
    json_reply(&json!({ "error": message }), status)
}

async fn handle_rejection(err: Rejection) -> Result<WithStatus<Json>, Infallible> {
    if err.is_not_found() {
        return Ok(error_reply("not found", StatusCode::NOT_FOUND));
    }
    if let Some(BadRequest(message)) = err.find::<BadRequest>() {
        return Ok(error_reply(message, StatusCode::BAD_REQUEST));
    }
    if err.find::<ServerError>().is_some() {
        return Ok(error_reply(
            "could not record sighting",
            StatusCode::INTERNAL_SERVER_ERROR,
        ));
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply("method not allowed", StatusCode::METHOD_NOT_ALLOWED));
    }
    warn!("Rejecting request: {:?}", err);
    Ok(error_reply("bad request", StatusCode::BAD_REQUEST))
}

async fn read_part(part: warp::filters::multipart::Part) -> Result<Vec<u8>, warp::Error> {
    let mut data: Vec<u8> = vec![];
    let mut stream = part.stream();
    while let Some(buf) = stream.next().await {
        data.extend_from_slice(buf?.bytes());
    }
    Ok(data)
}

async fn handle_frame(
    mut form: warp::filters::multipart::FormData,
    state: &State,
) -> Result<Value, failure::Error> {
    let mut json: Option<Value> = None;
    let mut image: Option<DynamicImage> = None;

    while let Some(part) = form.next().await {
        let part = part?;
        debug!("Got part {}", part.name());
        match part.name() {
            "json" => {
                let data = read_part(part).await?;
                json = Some(serde_json::from_slice::<Value>(&data)?);
            }
            "upload" => {
                let data = read_part(part).await?;
                // The snapshot is optional; a bad image does not reject the frame.
                image =
                    match ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg).decode() {
                        Ok(i) => Some(i),
                        Err(e) => {
                            warn!("Failed to decode image: {:?}", e);
                            None
                        }
                    }
            }
            _ => {
                warn!("Ignoring part {}", part.name());
            }
        }
    }

    let json = json.ok_or_else(|| format_err!("Missing JSON data"))?;
    process_frame(&json, image, state).await
}

/// Recognizes the plate in one frame of OCR blocks and hands new plates to
/// the sightings task.
async fn process_frame(
    json: &Value,
    image: Option<DynamicImage>,
    state: &State,
) -> Result<Value, failure::Error> {
    let blocks = json["blocks"]
        .as_array()
        .ok_or_else(|| format_err!("Missing blocks in JSON"))?;

    let mut texts: Vec<&str> = Vec::with_capacity(blocks.len());
    let mut reply_blocks: Vec<Value> = Vec::with_capacity(blocks.len());
    for block in blocks {
        let text = block["text"]
            .as_str()
            .ok_or_else(|| format_err!("Missing text field"))?;
        let found = plate::find_plate_in_text(text);
        reply_blocks.push(json!({
            "text": text,
            "bounding": block["bounding"],
            "valid": found.is_valid(),
            "plate": found.plate(),
            "format": found.format().map(PlateFormat::as_str),
        }));
        texts.push(text);
    }

    let mut reply = json!({
        "blocks": reply_blocks,
        "plate": null,
        "format": null,
        "duplicate": false,
    });
    if texts.is_empty() {
        return Ok(reply);
    }

    let joined = texts.join(" ");
    let (format, plate) = match plate::find_plate_in_text(&joined) {
        ValidationResult::Valid { format, plate } => (format, plate),
        ValidationResult::NotRecognized => {
            debug!("Text is not a plate: {:?}", joined);
            return Ok(reply);
        }
    };
    reply["plate"] = Value::from(plate.as_str());
    reply["format"] = json!(format.as_str());

    if !state.recent.lock().await.remember(&plate) {
        info!("Plate {} was read recently, ignoring", plate);
        reply["duplicate"] = json!(true);
        return Ok(reply);
    }

    let image_url = image.and_then(|i| save_snapshot(i, &state.config));
    info!("Sending plate {} to tx", plate);
    state
        .tx
        .clone()
        .send(SpottedPlate {
            plate,
            format,
            image_url,
        })
        .await?;
    Ok(reply)
}

fn save_snapshot(image: DynamicImage, config: &Config) -> Option<String> {
    let plates_url = config.plates_url.as_ref()?;
    let name = format!("{:x}.jpeg", Uuid::new_v4().to_simple());
    let path = config.snapshot_dir.join(&name);
    match image.resize(1024, 768, FilterType::Triangle).save(&path) {
        Ok(_) => Some(format!("{}{}", plates_url, name)),
        Err(e) => {
            warn!("Error saving image to {:?}: {:?}", path, e);
            None
        }
    }
}

async fn stop_session(state: State) -> Result<WithStatus<Json>, Rejection> {
    let mut recent = state.recent.lock().await;
    let cleared = recent.len();
    recent.clear();
    info!("Camera session stopped, forgot {} recent plates", cleared);
    Ok(json_reply(&json!({ "cleared": cleared }), StatusCode::OK))
}

async fn list_sightings(state: State) -> Result<WithStatus<Json>, Rejection> {
    let sightings = {
        let conn = &state.db_conn.lock().await;
        db::list_sightings(conn)
    };
    info!("{} sightings loaded", sightings.len());
    let body: Vec<Value> = sightings.iter().map(|s| s.to_json()).collect();
    Ok(json_reply(&json!(body), StatusCode::OK))
}

async fn delete_sighting(id: String, state: State) -> Result<WithStatus<Json>, Rejection> {
    let deleted = {
        let conn = &state.db_conn.lock().await;
        db::delete_sighting(conn, &id)
    };
    if deleted {
        info!("Sighting {} deleted", id);
        Ok(json_reply(&json!({ "deleted": id }), StatusCode::OK))
    } else {
        Ok(error_reply("sighting not found", StatusCode::NOT_FOUND))
    }
}

async fn list_vehicles(state: State) -> Result<WithStatus<Json>, Rejection> {
    let vehicles = {
        let conn = &state.db_conn.lock().await;
        db::list_vehicles(conn)
    };
    let body: Vec<Value> = vehicles.iter().map(|v| v.to_json()).collect();
    Ok(json_reply(&json!(body), StatusCode::OK))
}

async fn get_vehicle(plate: String, state: State) -> Result<WithStatus<Json>, Rejection> {
    // Path segments arrive still percent-encoded.
    let plate = percent_decode_str(&plate).decode_utf8_lossy();
    let canonical = match plate::validate(&plate) {
        ValidationResult::Valid { plate, .. } => plate,
        ValidationResult::NotRecognized => {
            return Ok(error_reply("invalid plate", StatusCode::BAD_REQUEST))
        }
    };
    let vehicle = {
        let conn = &state.db_conn.lock().await;
        db::vehicle_by_plate(conn, &canonical)
    };
    match vehicle {
        Some(v) => Ok(json_reply(&v.to_json(), StatusCode::OK)),
        None => Ok(error_reply("vehicle not found", StatusCode::NOT_FOUND)),
    }
}

/// Reads a registry form and replaces its plate with the canonical one.
fn vehicle_fields(body: &Value) -> Result<VehicleFields, WithStatus<Json>> {
    let mut fields = VehicleFields::from_json(body)
        .map_err(|msg| error_reply(&msg, StatusCode::BAD_REQUEST))?;
    match plate::validate(&fields.plate) {
        ValidationResult::Valid { plate, .. } => {
            fields.plate = plate;
            Ok(fields)
        }
        ValidationResult::NotRecognized => {
            warn!("Rejecting invalid plate {:?}", fields.plate);
            Err(error_reply("invalid plate", StatusCode::BAD_REQUEST))
        }
    }
}

async fn create_vehicle(body: Value, state: State) -> Result<WithStatus<Json>, Rejection> {
    let fields = match vehicle_fields(&body) {
        Ok(f) => f,
        Err(reply) => return Ok(reply),
    };
    let conn = &state.db_conn.lock().await;
    if db::vehicle_by_plate(conn, &fields.plate).is_some() {
        return Ok(error_reply("plate already registered", StatusCode::CONFLICT));
    }
    match db::create_vehicle(conn, &fields) {
        Some(v) => {
            info!("Registered vehicle {}", v.describe());
            Ok(json_reply(&v.to_json(), StatusCode::CREATED))
        }
        None => Ok(error_reply(
            "could not save vehicle",
            StatusCode::INTERNAL_SERVER_ERROR,
        )),
    }
}

async fn update_vehicle(
    id: String,
    body: Value,
    state: State,
) -> Result<WithStatus<Json>, Rejection> {
    let fields = match vehicle_fields(&body) {
        Ok(f) => f,
        Err(reply) => return Ok(reply),
    };
    let conn = &state.db_conn.lock().await;
    if let Some(owner) = db::vehicle_by_plate(conn, &fields.plate) {
        if owner.id != id {
            return Ok(error_reply("plate already registered", StatusCode::CONFLICT));
        }
    }
    if db::update_vehicle(conn, &id, &fields) {
        info!("Updated vehicle {}", id);
        Ok(json_reply(
            &json!({ "updated": id, "plate": fields.plate }),
            StatusCode::OK,
        ))
    } else {
        Ok(error_reply("vehicle not found", StatusCode::NOT_FOUND))
    }
}

async fn delete_vehicle(id: String, state: State) -> Result<WithStatus<Json>, Rejection> {
    let deleted = {
        let conn = &state.db_conn.lock().await;
        db::delete_vehicle(conn, &id)
    };
    if deleted {
        info!("Vehicle {} deleted", id);
        Ok(json_reply(&json!({ "deleted": id }), StatusCode::OK))
    } else {
        Ok(error_reply("vehicle not found", StatusCode::NOT_FOUND))
    }
}
