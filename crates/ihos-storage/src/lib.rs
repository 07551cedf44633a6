//! IHOS storage crate - SQLite-backed document persistence.
//!
//! Provides a WAL-mode SQLite database holding schemaless JSON documents
//! grouped by collection, plus the conversation log and the business
//! records (hospitals, meeting rooms, employees, bookings) built on top.

pub mod conversation;
pub mod db;
pub mod documents;
pub mod migrations;
pub mod records;

pub use conversation::{ChatMessage, ConversationLog};
pub use db::{Database, Location};
pub use documents::{Document, DocumentStore, SqliteDocumentStore, Update, UpdateResult};
pub use records::{Booking, BusinessRepository, Employee, Hospital, Room};
