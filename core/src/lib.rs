pub mod args;
pub mod catalog;
pub mod envelope;
pub mod error;
pub mod paths;
pub mod request;
pub mod validation;

pub use catalog::{ActionDescriptor, Catalog, CatalogError, ToolDescriptor};
pub use envelope::Envelope;
pub use error::{ToolError, codes};
pub use request::{PreparedAction, prepare};
