pub mod store;

pub use store::PostgresLongTermStore;
