/// Key-value store contract and its backends.
pub mod kv_store;
/// Store key layout for canvas cells and rate-limit records.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
