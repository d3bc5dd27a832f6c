mod entity;
mod repository;

pub use entity::{ScriptTarget, ScriptVersion};
pub use repository::ScriptRepository;
