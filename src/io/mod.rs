pub mod config_io;
pub mod lock;
pub mod metadata_store;
