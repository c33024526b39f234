//! Row storage for registry resources: PostgreSQL via the SQL builder, or process memory.

mod crud;
mod memory;
mod store;
mod validation;
pub use crud::CrudService;
pub use memory::MemoryResourceStore;
pub use store::{resolve_includes, ListQuery, ResourceStore};
pub use validation::RequestValidator;
