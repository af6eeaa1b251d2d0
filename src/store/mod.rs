pub mod drafts;
pub mod sqlite;

pub use drafts::DraftStore;
pub use sqlite::{ImportReport, SqliteStore};
