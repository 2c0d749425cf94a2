/// Player record model definitions.
pub mod models;
/// Player record persistence backends.
pub mod player_store;
/// Storage abstraction layer for database operations.
pub mod storage;
