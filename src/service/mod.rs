//! Entity data access: result reading and the entity manager.

mod manager;
pub mod reader;
pub use manager::{
    EntityManager, EntityRepository, ListParams, DEFAULT_LIMIT, DEFAULT_OFFSET, PAGE_PARAM, PER_PAGE_PARAM,
    SORT_DIR_PARAM, SORT_FIELD_PARAM,
};
