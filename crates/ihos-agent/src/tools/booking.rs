//! Room availability and booking tools.
//!
//! Both tools accept two argument shapes: the plain one declared in their
//! descriptors (`date`, `start_time`, `end_time`) and the one the booking
//! extraction prompt asks the model for (`booking_date`, `time_start`,
//! `time_end`, where the times may be ISO datetimes).

use std::sync::Arc;

use async_trait::async_trait;

use crate::booking::{BookingRequest, BookingService};
use crate::error::ToolError;
use crate::state::ToolArgs;
use crate::tools::{arg_str, require_str, Tool, ToolDescriptor, ToolParam};

/// Split `2023-09-01T09:00:00` into `(Some("2023-09-01"), "09:00")`.
/// Plain `HH:MM[:SS]` values come back without a date.
pub fn split_datetime(value: &str) -> (Option<String>, String) {
    let value = value.trim();
    let (date, time) = match value.split_once('T').or_else(|| value.split_once(' ')) {
        Some((d, t)) => (Some(d.trim().to_string()), t.trim()),
        None => (None, value),
    };
    let bytes = time.as_bytes();
    let time = if bytes.len() > 5 && bytes[2] == b':' && time.is_char_boundary(5) {
        &time[..5]
    } else {
        time
    };
    (date, time.to_string())
}

struct Interval {
    date: String,
    start: String,
    end: String,
}

fn interval_from_args(args: &ToolArgs) -> Result<Interval, ToolError> {
    let (start_date, start) = arg_str(args, "start_time")
        .or_else(|| arg_str(args, "time_start"))
        .map(|v| split_datetime(&v))
        .ok_or_else(|| ToolError::InvalidArguments("missing 'start_time'".into()))?;
    let (_, end) = arg_str(args, "end_time")
        .or_else(|| arg_str(args, "time_end"))
        .map(|v| split_datetime(&v))
        .ok_or_else(|| ToolError::InvalidArguments("missing 'end_time'".into()))?;

    // The interval's own day wins over `booking_date`.
    let date = arg_str(args, "date")
        .filter(|d| !d.trim().is_empty())
        .or(start_date)
        .or_else(|| arg_str(args, "booking_date"))
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidArguments("missing 'date'".into()))?;

    Ok(Interval { date, start, end })
}

fn optional(args: &ToolArgs, key: &str) -> Option<String> {
    arg_str(args, key).filter(|v| !v.trim().is_empty())
}

fn interval_params(descriptor: ToolDescriptor) -> ToolDescriptor {
    descriptor
        .param(ToolParam::required("date", "Ngày họp"))
        .param(ToolParam::required("start_time", "Giờ bắt đầu, định dạng HH:MM"))
        .param(ToolParam::required("end_time", "Giờ kết thúc, định dạng HH:MM"))
}

pub struct CheckRoomAvailabilityTool {
    descriptor: ToolDescriptor,
    bookings: Arc<BookingService>,
}

impl CheckRoomAvailabilityTool {
    pub fn new(bookings: Arc<BookingService>) -> Self {
        let descriptor = interval_params(ToolDescriptor::new(
            "check_room_availability",
            "Kiểm tra phòng họp còn trống trong khoảng thời gian. Bỏ trống room_name để xem tất cả phòng.",
        ))
        .param(ToolParam::optional("room_name", "Tên phòng họp", None));
        Self {
            descriptor,
            bookings,
        }
    }
}

#[async_trait]
impl Tool for CheckRoomAvailabilityTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: &ToolArgs) -> Result<String, ToolError> {
        let interval = interval_from_args(args)?;
        let room = optional(args, "room_name");
        let report = self.bookings.check_availability(
            &interval.date,
            &interval.start,
            &interval.end,
            room.as_deref(),
        )?;
        serde_json::to_string(&report).map_err(|e| ToolError::Failed(e.to_string()))
    }
}

pub struct BookMeetingRoomTool {
    descriptor: ToolDescriptor,
    bookings: Arc<BookingService>,
}

impl BookMeetingRoomTool {
    pub fn new(bookings: Arc<BookingService>) -> Self {
        let descriptor = interval_params(
            ToolDescriptor::new(
                "book_meeting_room",
                "Đặt phòng họp nếu không trùng lịch. Trả JSON với status booked hoặc conflict.",
            )
            .param(ToolParam::required("room_name", "Tên phòng họp")),
        )
        .param(ToolParam::optional("employee_name", "Người đặt", None))
        .param(ToolParam::optional("purpose", "Mục đích cuộc họp", None));
        Self {
            descriptor,
            bookings,
        }
    }
}

#[async_trait]
impl Tool for BookMeetingRoomTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: &ToolArgs) -> Result<String, ToolError> {
        let interval = interval_from_args(args)?;
        let request = BookingRequest {
            room_name: require_str(args, "room_name")?,
            date: interval.date,
            start_time: interval.start,
            end_time: interval.end,
            employee_name: optional(args, "employee_name"),
            purpose: optional(args, "purpose"),
        };
        let outcome = self.bookings.book(request)?;
        serde_json::to_string(&outcome).map_err(|e| ToolError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ihos_storage::{BusinessRepository, Database, SqliteDocumentStore};
    use serde_json::{json, Value};

    fn bookings() -> Arc<BookingService> {
        let db = Arc::new(Database::in_memory().unwrap());
        Arc::new(BookingService::new(BusinessRepository::new(Arc::new(
            SqliteDocumentStore::new(db),
        ))))
    }

    fn args(value: Value) -> ToolArgs {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_split_datetime() {
        assert_eq!(
            split_datetime("2023-09-01T09:00:00"),
            (Some("2023-09-01".to_string()), "09:00".to_string())
        );
        assert_eq!(
            split_datetime("2023-09-01 14:30"),
            (Some("2023-09-01".to_string()), "14:30".to_string())
        );
        assert_eq!(split_datetime("09:15"), (None, "09:15".to_string()));
        assert_eq!(split_datetime("09:15:30"), (None, "09:15".to_string()));
    }

    #[tokio::test]
    async fn test_book_with_plain_arguments() {
        let tool = BookMeetingRoomTool::new(bookings());
        let out = tool
            .invoke(&args(json!({
                "room_name": "A",
                "date": "01-09-2023",
                "start_time": "09:00",
                "end_time": "10:00"
            })))
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["status"], "booked");
        assert_eq!(v["booking"]["date"], "2023-09-01");
    }

    #[tokio::test]
    async fn test_same_slot_in_both_shapes_conflicts() {
        let tool = BookMeetingRoomTool::new(bookings());
        let out = tool
            .invoke(&args(json!({
                "room_name": "A",
                "date": "01-09-2023",
                "start_time": "09:00",
                "end_time": "10:00"
            })))
            .await
            .unwrap();
        let first: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(first["status"], "booked");

        let out = tool
            .invoke(&args(json!({
                "room_name": "A",
                "time_start": "2023-09-01T09:00:00",
                "time_end": "2023-09-01T10:00:00"
            })))
            .await
            .unwrap();
        let second: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(second["status"], "conflict");
        assert_eq!(second["conflicts"][0]["date"], "2023-09-01");
    }

    #[tokio::test]
    async fn test_unparseable_date_is_argument_error() {
        let tool = BookMeetingRoomTool::new(bookings());
        let err = tool
            .invoke(&args(json!({
                "room_name": "A",
                "date": "thứ hai",
                "start_time": "09:00",
                "end_time": "10:00"
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_book_with_extraction_shape() {
        let svc = bookings();
        let tool = BookMeetingRoomTool::new(Arc::clone(&svc));
        let out = tool
            .invoke(&args(json!({
                "employee_name": "Nguyễn Văn A",
                "room_name": "Phòng họp A",
                "time_start": "2023-09-01T09:00:00",
                "time_end": "2023-09-01T10:00:00",
                "booking_date": "2023-08-30",
                "purpose": "Họp dự án"
            })))
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["status"], "booked");
        assert_eq!(v["booking"]["date"], "2023-09-01");
        assert_eq!(v["booking"]["start_time"], "09:00");
        assert_eq!(v["booking"]["employee_name"], "Nguyễn Văn A");

        let check = CheckRoomAvailabilityTool::new(svc);
        let out = check
            .invoke(&args(json!({
                "room_name": "Phòng họp A",
                "date": "2023-09-01",
                "start_time": "09:30",
                "end_time": "11:00"
            })))
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["rooms"][0]["available"], false);
    }

    #[tokio::test]
    async fn test_missing_fields_are_argument_errors() {
        let tool = BookMeetingRoomTool::new(bookings());
        let err = tool
            .invoke(&args(json!({"room_name": "A", "start_time": "09:00", "end_time": "10:00"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid arguments: missing 'date'");

        let err = tool
            .invoke(&args(json!({"date": "d", "start_time": "09:00", "end_time": "10:00"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid arguments: missing 'room_name'");
    }
}
