pub mod files;
pub mod request;
pub mod validator;

pub use files::{verify_files, UploadedFile, UploadedFiles};
pub use request::RequestParams;
pub use validator::{validate, FieldType, Schema, ValidatedParams, REDUNDANT_KEY};
