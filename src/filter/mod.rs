pub mod dates;
pub mod error;
pub mod filter;
pub mod filter_order;
pub mod filter_where;
pub mod identifiers;
pub mod matcher;
pub mod soft_delete;
pub mod types;

pub use error::FilterError;
pub use filter_order::FilterOrder;
pub use filter_where::FilterWhere;
pub use types::*;
