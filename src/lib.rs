pub mod collections;
pub mod discover;
pub mod driver;
pub mod error;
pub mod module;
pub mod patch;
pub mod resolver;

pub use driver::{Driver, Outcome, Report};
pub use error::Error;
pub use module::Module;
pub use patch::{PatchRule, Patcher};
pub use resolver::{Resolve, SearchPathResolver};
