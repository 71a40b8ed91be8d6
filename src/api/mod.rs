pub mod envelope;

pub use envelope::{envelope, server_time, HostInfo};
