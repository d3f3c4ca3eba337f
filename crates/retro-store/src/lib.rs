pub mod database;
pub mod error;
pub mod groups;
pub mod items;
pub mod retros;
pub mod row_helpers;
pub mod schema;
pub mod votes;

pub use database::Database;
pub use error::StoreError;
