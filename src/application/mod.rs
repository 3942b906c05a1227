//! Application services layer.

pub mod accounts;
pub mod error;
pub mod maintenance;
pub mod posts;
pub mod repos;
pub mod timeline;
