use crate::plate::PlateFormat;
use serde_json::{json, Value};

#[derive(Debug)]
pub struct SpottedPlate {
    pub plate: String,
    pub format: PlateFormat,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub id: String,
    pub created_at: f64,
    pub plate: String,
    pub image_url: Option<String>,
}

impl Sighting {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "created_at": self.created_at,
            "plate": self.plate,
            "image_url": self.image_url,
        })
    }
}

/// Editable part of a registry record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleFields {
    pub plate: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i64>,
    pub color: Option<String>,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub comments: Option<String>,
}

impl VehicleFields {
    /// Reads a registry form body. The plate is copied as given; callers
    /// canonicalize it. Empty strings count as absent.
    pub fn from_json(value: &Value) -> Result<VehicleFields, String> {
        let plate = value["plate"]
            .as_str()
            .ok_or_else(|| "Missing plate field".to_string())?
            .to_string();
        let year = match &value["year"] {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(
                s.trim()
                    .parse::<i64>()
                    .map_err(|_| format!("Invalid year {:?}", s))?,
            ),
            v => Some(v.as_i64().ok_or_else(|| format!("Invalid year {}", v))?),
        };
        Ok(VehicleFields {
            plate,
            brand: optional_text(value, "brand"),
            model: optional_text(value, "model"),
            year,
            color: optional_text(value, "color"),
            contact_name: optional_text(value, "contact_name"),
            contact_phone: optional_text(value, "contact_phone"),
            contact_email: optional_text(value, "contact_email"),
            comments: optional_text(value, "comments"),
        })
    }
}

fn optional_text(value: &Value, key: &str) -> Option<String> {
    value[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub id: String,
    pub created_at: f64,
    pub updated_at: f64,
    pub fields: VehicleFields,
}

impl Vehicle {
    pub fn to_json(&self) -> Value {
        let f = &self.fields;
        json!({
            "id": self.id,
            "created_at": self.created_at,
            "updated_at": self.updated_at,
            "plate": f.plate,
            "brand": f.brand,
            "model": f.model,
            "year": f.year,
            "color": f.color,
            "contact_name": f.contact_name,
            "contact_phone": f.contact_phone,
            "contact_email": f.contact_email,
            "comments": f.comments,
        })
    }

    /// Short human label for log lines.
    pub fn describe(&self) -> String {
        let f = &self.fields;
        let car: Vec<&str> = vec![f.brand.as_deref(), f.model.as_deref(), f.color.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        let owner = f.contact_name.as_deref().unwrap_or("unknown owner");
        if car.is_empty() {
            format!("{} ({})", f.plate, owner)
        } else {
            format!("{} {} ({})", f.plate, car.join(" "), owner)
        }
    }
}
