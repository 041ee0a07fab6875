pub mod errors;
pub mod db;
pub mod record;
pub mod map_record;

pub use record::MapRecord;
