//! Business records consulted by the assistant's tools.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use ihos_core::error::IhosError;

use crate::documents::{Document, DocumentStore, ID_FIELD};

pub const HOSPITAL_COLLECTION: &str = "hospitals";
pub const ROOM_COLLECTION: &str = "meeting_rooms";
pub const EMPLOYEE_COLLECTION: &str = "employees";
pub const BOOKING_COLLECTION: &str = "room_bookings";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hospital {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub specialties: String,
    #[serde(default)]
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub department: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub email: String,
}

/// A reserved interval. `start_time` and `end_time` are zero-padded `HH:MM`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub room_name: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

fn to_document<T: Serialize>(record: &T) -> Result<Document, IhosError> {
    match serde_json::to_value(record)? {
        Value::Object(mut map) => {
            map.remove(ID_FIELD);
            Ok(map)
        }
        other => Err(IhosError::Serialization(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

fn from_documents<T: DeserializeOwned>(docs: Vec<Document>) -> Result<Vec<T>, IhosError> {
    docs.into_iter()
        .map(|doc| serde_json::from_value(Value::Object(doc)).map_err(IhosError::from))
        .collect()
}

fn field_filter(pairs: &[(&str, &str)]) -> Document {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

/// Typed access to hospitals, meeting rooms, employees and bookings.
#[derive(Clone)]
pub struct BusinessRepository {
    store: Arc<dyn DocumentStore>,
}

impl BusinessRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    // ---- Hospitals ----

    pub fn add_hospital(&self, hospital: &Hospital) -> Result<String, IhosError> {
        self.store
            .insert_one(HOSPITAL_COLLECTION, to_document(hospital)?)
    }

    /// Every whitespace token must appear (case-insensitively) in at least
    /// one of name, province, specialties or level. An empty keyword lists
    /// the first `limit` hospitals.
    pub fn search_hospitals_by_keyword(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<Hospital>, IhosError> {
        let tokens: Vec<String> = keyword
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        let all: Vec<Hospital> =
            from_documents(self.store.find_many(HOSPITAL_COLLECTION, &Document::new(), None)?)?;

        Ok(all
            .into_iter()
            .filter(|h| {
                let fields = [
                    h.name.to_lowercase(),
                    h.province.to_lowercase(),
                    h.specialties.to_lowercase(),
                    h.level.to_lowercase(),
                ];
                tokens
                    .iter()
                    .all(|t| fields.iter().any(|f| f.contains(t.as_str())))
            })
            .take(limit)
            .collect())
    }

    // ---- Rooms ----

    pub fn add_room(&self, room: &Room) -> Result<String, IhosError> {
        self.store.insert_one(ROOM_COLLECTION, to_document(room)?)
    }

    pub fn list_rooms(&self) -> Result<Vec<Room>, IhosError> {
        from_documents(self.store.find_many(ROOM_COLLECTION, &Document::new(), None)?)
    }

    // ---- Employees ----

    pub fn add_employee(&self, employee: &Employee) -> Result<String, IhosError> {
        self.store
            .insert_one(EMPLOYEE_COLLECTION, to_document(employee)?)
    }

    pub fn list_employees(&self) -> Result<Vec<Employee>, IhosError> {
        from_documents(self.store.find_many(EMPLOYEE_COLLECTION, &Document::new(), None)?)
    }

    /// Employees whose department matches one of `departments`, ignoring case
    /// and surrounding whitespace.
    pub fn employees_by_departments(
        &self,
        departments: &[String],
    ) -> Result<Vec<Employee>, IhosError> {
        let wanted: Vec<String> = departments
            .iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Ok(self
            .list_employees()?
            .into_iter()
            .filter(|e| wanted.contains(&e.department.trim().to_lowercase()))
            .collect())
    }

    // ---- Bookings ----

    pub fn bookings_for(&self, room_name: &str, date: &str) -> Result<Vec<Booking>, IhosError> {
        let filter = field_filter(&[("room_name", room_name), ("date", date)]);
        from_documents(self.store.find_many(BOOKING_COLLECTION, &filter, None)?)
    }

    /// Persist a booking. Conflict checking is the caller's job.
    pub fn insert_booking(&self, booking: &Booking) -> Result<Booking, IhosError> {
        let mut stored = booking.clone();
        if stored.created_at.is_none() {
            stored.created_at = Some(Utc::now().to_rfc3339());
        }
        let id = self
            .store
            .insert_one(BOOKING_COLLECTION, to_document(&stored)?)?;
        info!(booking_id = %id, room = %stored.room_name, date = %stored.date, "booking stored");
        stored.id = Some(id);
        Ok(stored)
    }
}
