//! Helpers shared by the domain modules.

pub mod pagination;
pub mod password;
pub mod validation;

pub use pagination::{PageQuery, PageWindow};
