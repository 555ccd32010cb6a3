pub mod defaults;
pub mod server_config;
pub mod validation;

pub use defaults::*;
pub use server_config::*;
pub use validation::*;
