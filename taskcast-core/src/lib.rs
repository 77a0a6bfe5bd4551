pub mod cleanup;
pub mod config;
pub mod engine;
pub mod filter;
pub mod memory_adapters;
pub mod series;
pub mod state_machine;
pub mod types;

pub use cleanup::*;
pub use engine::*;
pub use filter::*;
pub use memory_adapters::*;
pub use series::*;
pub use state_machine::*;
pub use types::*;
