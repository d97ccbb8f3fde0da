/// Quiz, session, player and answer persistence.
pub mod game_store;
/// Authenticated identity lookup.
pub mod identity;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
