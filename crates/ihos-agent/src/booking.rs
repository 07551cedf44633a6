//! Meeting-room booking with interval conflict detection.
//!
//! Times are zero-padded `HH:MM` strings, so plain string comparison
//! orders them chronologically. Inputs are validated against that shape
//! before any comparison happens. Dates are stored as `YYYY-MM-DD`
//! whatever form the caller used, so one day has exactly one key.

use std::sync::{LazyLock, Mutex};

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ihos_storage::{Booking, BusinessRepository};

use crate::error::ToolError;

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[01]\d|2[0-3]):[0-5]\d$").unwrap());

/// Accepted input forms for a booking date.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// Canonical `YYYY-MM-DD` form of `value`, which may be written
/// `YYYY-MM-DD`, `DD-MM-YYYY`, `DD/MM/YYYY` or `YYYY/MM/DD`.
pub fn normalize_date(value: &str) -> Result<String, ToolError> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
        .ok_or_else(|| ToolError::InvalidArguments(format!("unrecognised date '{}'", value)))
}

/// True when `[req_start, req_end)` overlaps `[ex_start, ex_end)`.
pub fn overlaps(req_start: &str, req_end: &str, ex_start: &str, ex_end: &str) -> bool {
    (req_start <= ex_start && ex_start < req_end)
        || (req_start < ex_end && ex_end <= req_end)
        || (ex_start <= req_start && ex_end >= req_end)
}

/// True for a zero-padded 24h `HH:MM` string.
pub fn is_valid_time(value: &str) -> bool {
    TIME_RE.is_match(value)
}

/// A requested reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub room_name: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub employee_name: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
}

impl BookingRequest {
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.room_name.trim().is_empty() {
            return Err(ToolError::InvalidArguments("room_name is empty".into()));
        }
        if self.date.trim().is_empty() {
            return Err(ToolError::InvalidArguments("date is empty".into()));
        }
        normalize_date(&self.date)?;
        validate_interval(&self.start_time, &self.end_time)
    }

    /// Validated copy with the date in canonical form.
    pub fn normalized(mut self) -> Result<Self, ToolError> {
        self.validate()?;
        self.date = normalize_date(&self.date)?;
        Ok(self)
    }

    fn into_booking(self) -> Booking {
        Booking {
            id: None,
            room_name: self.room_name,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            employee_name: self.employee_name,
            purpose: self.purpose,
            created_at: None,
        }
    }
}

fn validate_interval(start: &str, end: &str) -> Result<(), ToolError> {
    for (field, value) in [("start_time", start), ("end_time", end)] {
        if !is_valid_time(value) {
            return Err(ToolError::InvalidArguments(format!(
                "{} must be HH:MM, got '{}'",
                field, value
            )));
        }
    }
    if start >= end {
        return Err(ToolError::InvalidArguments(format!(
            "start_time {} must be before end_time {}",
            start, end
        )));
    }
    Ok(())
}

/// Result of a booking attempt. A conflict is an answer, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BookingOutcome {
    Booked {
        message: String,
        booking: Booking,
    },
    Conflict {
        message: String,
        conflicts: Vec<Booking>,
    },
}

impl BookingOutcome {
    pub fn is_booked(&self) -> bool {
        matches!(self, BookingOutcome::Booked { .. })
    }
}

/// Availability of one room for a requested interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomAvailability {
    pub room_name: String,
    pub available: bool,
    pub conflicts: Vec<Booking>,
}

/// Availability report across one or more rooms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailabilityReport {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub rooms: Vec<RoomAvailability>,
}

/// Checks and books rooms against the stored schedule.
///
/// Check-then-insert runs under one lock, so two concurrent bookings in
/// this process cannot both pass the conflict check.
pub struct BookingService {
    repo: BusinessRepository,
    lock: Mutex<()>,
}

impl BookingService {
    pub fn new(repo: BusinessRepository) -> Self {
        Self {
            repo,
            lock: Mutex::new(()),
        }
    }

    pub fn repository(&self) -> &BusinessRepository {
        &self.repo
    }

    fn conflicts(
        &self,
        room_name: &str,
        date: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<Booking>, ToolError> {
        Ok(self
            .repo
            .bookings_for(room_name, date)?
            .into_iter()
            .filter(|b| overlaps(start, end, &b.start_time, &b.end_time))
            .collect())
    }

    /// Availability for `room_name`, or for every known room when `None`.
    pub fn check_availability(
        &self,
        date: &str,
        start: &str,
        end: &str,
        room_name: Option<&str>,
    ) -> Result<AvailabilityReport, ToolError> {
        validate_interval(start, end)?;
        let date = normalize_date(date)?;
        let date = date.as_str();
        let names: Vec<String> = match room_name {
            Some(name) => vec![name.to_string()],
            None => self.repo.list_rooms()?.into_iter().map(|r| r.name).collect(),
        };

        let mut rooms = Vec::with_capacity(names.len());
        for name in names {
            let conflicts = self.conflicts(&name, date, start, end)?;
            rooms.push(RoomAvailability {
                room_name: name,
                available: conflicts.is_empty(),
                conflicts,
            });
        }
        debug!(date, start, end, rooms = rooms.len(), "availability checked");

        Ok(AvailabilityReport {
            date: date.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            rooms,
        })
    }

    /// Book the room unless an existing booking overlaps.
    pub fn book(&self, request: BookingRequest) -> Result<BookingOutcome, ToolError> {
        let request = request.normalized()?;
        let _guard = self
            .lock
            .lock()
            .map_err(|e| ToolError::Failed(format!("booking lock poisoned: {}", e)))?;

        let conflicts = self.conflicts(
            &request.room_name,
            &request.date,
            &request.start_time,
            &request.end_time,
        )?;
        if !conflicts.is_empty() {
            info!(
                room = %request.room_name,
                date = %request.date,
                conflicts = conflicts.len(),
                "booking rejected"
            );
            return Ok(BookingOutcome::Conflict {
                message: format!(
                    "Phòng {} đã có lịch trùng ngày {} trong khoảng {}-{}",
                    request.room_name, request.date, request.start_time, request.end_time
                ),
                conflicts,
            });
        }

        let booking = self.repo.insert_booking(&request.into_booking())?;
        Ok(BookingOutcome::Booked {
            message: format!(
                "Đã đặt phòng {} ngày {} từ {} đến {}",
                booking.room_name, booking.date, booking.start_time, booking.end_time
            ),
            booking,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ihos_storage::{Database, Room, SqliteDocumentStore};

    fn service() -> BookingService {
        let db = Arc::new(Database::in_memory().unwrap());
        BookingService::new(BusinessRepository::new(Arc::new(SqliteDocumentStore::new(db))))
    }

    fn request(room: &str, date: &str, start: &str, end: &str) -> BookingRequest {
        BookingRequest {
            room_name: room.to_string(),
            date: date.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            employee_name: None,
            purpose: None,
        }
    }

    // =====================================================================
    // Overlap predicate
    // =====================================================================

    #[test]
    fn test_contained_interval_overlaps() {
        assert!(overlaps("09:00", "10:00", "09:30", "09:45"));
    }

    #[test]
    fn test_request_inside_existing_overlaps() {
        assert!(overlaps("09:30", "09:45", "09:00", "10:00"));
    }

    #[test]
    fn test_partial_overlaps() {
        assert!(overlaps("09:00", "10:00", "09:30", "10:30"));
        assert!(overlaps("09:00", "10:00", "08:30", "09:30"));
    }

    #[test]
    fn test_touching_intervals_do_not_overlap() {
        assert!(!overlaps("09:00", "10:00", "10:00", "11:00"));
        assert!(!overlaps("09:00", "10:00", "08:00", "09:00"));
    }

    #[test]
    fn test_identical_intervals_overlap() {
        assert!(overlaps("09:00", "10:00", "09:00", "10:00"));
    }

    #[test]
    fn test_time_shape() {
        assert!(is_valid_time("00:00"));
        assert!(is_valid_time("23:59"));
        assert!(!is_valid_time("9:00"));
        assert!(!is_valid_time("24:00"));
        assert!(!is_valid_time("09:60"));
        assert!(!is_valid_time("09:00:00"));
    }

    // =====================================================================
    // Service
    // =====================================================================

    #[test]
    fn test_book_then_conflict() {
        let svc = service();
        let first = svc.book(request("A", "01-09-2023", "09:30", "09:45")).unwrap();
        assert!(first.is_booked());

        let second = svc.book(request("A", "01-09-2023", "09:00", "10:00")).unwrap();
        match second {
            BookingOutcome::Conflict { conflicts, .. } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].start_time, "09:30");
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_date_forms_share_one_day() {
        assert_eq!(normalize_date("01-09-2023").unwrap(), "2023-09-01");
        assert_eq!(normalize_date("01/09/2023").unwrap(), "2023-09-01");
        assert_eq!(normalize_date(" 2023-09-01 ").unwrap(), "2023-09-01");
        assert_eq!(normalize_date("2023/09/01").unwrap(), "2023-09-01");
        assert!(normalize_date("31-02-2023").is_err());
        assert!(normalize_date("").is_err());

        let svc = service();
        assert!(svc.book(request("A", "01-09-2023", "09:00", "10:00")).unwrap().is_booked());
        let second = svc.book(request("A", "2023-09-01", "09:30", "10:30")).unwrap();
        assert!(!second.is_booked());
        assert_eq!(svc.repository().bookings_for("A", "2023-09-01").unwrap().len(), 1);
    }

    #[test]
    fn test_other_room_or_date_is_free() {
        let svc = service();
        svc.book(request("A", "01-09-2023", "09:00", "10:00")).unwrap();
        assert!(svc
            .book(request("B", "01-09-2023", "09:00", "10:00"))
            .unwrap()
            .is_booked());
        assert!(svc
            .book(request("A", "02-09-2023", "09:00", "10:00"))
            .unwrap()
            .is_booked());
        assert!(svc
            .book(request("A", "01-09-2023", "10:00", "11:00"))
            .unwrap()
            .is_booked());
    }

    #[test]
    fn test_invalid_interval_is_error_not_conflict() {
        let svc = service();
        let err = svc.book(request("A", "2023-09-01", "10:00", "09:00")).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        let err = svc.book(request("A", "2023-09-01", "9h", "10:00")).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        let err = svc.book(request("A", "tomorrow", "09:00", "10:00")).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(svc.repository().bookings_for("A", "2023-09-01").unwrap().is_empty());
    }

    #[test]
    fn test_availability_over_all_rooms() {
        let svc = service();
        for name in ["A", "B"] {
            svc.repository()
                .add_room(&Room {
                    id: None,
                    name: name.to_string(),
                    capacity: 8,
                    location: String::new(),
                })
                .unwrap();
        }
        svc.book(request("A", "01-09-2023", "09:30", "09:45")).unwrap();

        let report = svc
            .check_availability("01-09-2023", "09:00", "10:00", None)
            .unwrap();
        assert_eq!(report.rooms.len(), 2);
        let a = report.rooms.iter().find(|r| r.room_name == "A").unwrap();
        let b = report.rooms.iter().find(|r| r.room_name == "B").unwrap();
        assert!(!a.available);
        assert!(b.available);

        let single = svc
            .check_availability("01-09-2023", "10:00", "11:00", Some("A"))
            .unwrap();
        assert!(single.rooms[0].available);
    }

    #[test]
    fn test_outcome_serialization() {
        let svc = service();
        let outcome = svc.book(request("A", "01/09/2023", "09:00", "10:00")).unwrap();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "booked");
        assert_eq!(json["booking"]["room_name"], "A");
        assert_eq!(json["booking"]["date"], "2023-09-01");
    }

    #[test]
    fn test_concurrent_bookings_admit_one() {
        let svc = Arc::new(service());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let svc = Arc::clone(&svc);
                std::thread::spawn(move || {
                    svc.book(request("A", "2023-09-01", "09:00", "10:00")).unwrap().is_booked()
                })
            })
            .collect();
        let booked = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|b| *b)
            .count();
        assert_eq!(booked, 1);
        assert_eq!(svc.repository().bookings_for("A", "2023-09-01").unwrap().len(), 1);
    }
}
