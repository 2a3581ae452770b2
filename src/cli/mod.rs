// mod.rs - CLI module

pub mod device;
pub mod extra;
pub mod options;
pub mod parser;
pub mod schema;

// Re-export main types for convenience
pub use device::{DeviceKey, DeviceSelector, DeviceType, ExecutionStrategy};
pub use extra::{ArgFragment, ExtraArgs};
pub use options::{OptionKind, OptionSpec, ParsePass, Requirement, ScalarKind};
pub use parser::{LaunchParser, ParsedArgs};
pub use schema::OptionSchema;
