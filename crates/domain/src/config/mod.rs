mod hash;
mod repository;
mod template;

pub use hash::content_hash;
pub use repository::ConfigRepository;
pub use template::{ConfigScope, ConfigTemplate};
