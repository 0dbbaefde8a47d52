//! Entity REST: generic create/read/update/delete and listing for any PostgreSQL table.

pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;
pub mod value;

pub use config::Settings;
pub use error::{AppError, ConfigError};
pub use routes::{build_router, common_routes, entity_routes};
pub use service::{EntityManager, EntityRepository, ListParams};
pub use state::AppState;
pub use value::{CellValue, Row};
