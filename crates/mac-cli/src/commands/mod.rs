//! CLI commands

pub mod generate;
pub mod list;
pub mod spoof;
pub mod validate;

pub use generate::GenerateCommand;
pub use list::ListCommand;
pub use spoof::SpoofCommand;
pub use validate::ValidateCommand;
