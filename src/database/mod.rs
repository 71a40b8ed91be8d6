pub mod backend;
pub mod document;
pub mod manager;
pub mod memory;
pub mod paging;
pub mod postgres;
pub mod store;

pub use backend::{DatabaseResult, DocumentBackend, FindQuery, StoredDocument, UpdateOutcome, UpdateSpec};
pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryDocumentBackend;
pub use paging::{pagination_schema, Page, PageRequest};
pub use postgres::PgDocumentBackend;
pub use store::{DeleteOutcome, DocumentStore};
