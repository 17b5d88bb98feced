pub mod generate;
pub mod health;
pub mod logs;
pub mod registry;

pub use generate::{generate, generate_stream};
pub use health::{health_check, HealthResponse};
pub use logs::{append_log, clear_logs, list_logs};
pub use registry::{create_entry, delete_entry, list_entries, update_entry, DeleteEntryRequest, SuccessResponse};
