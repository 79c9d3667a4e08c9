pub mod file;
pub mod migrate_config;
pub mod sources;
pub mod validation;

pub use file::*;
pub use migrate_config::*;
pub use sources::*;
pub use validation::*;
