//! Collaborator contracts and their bundled implementations

pub mod document;
pub mod paths;
pub mod sqlite;
