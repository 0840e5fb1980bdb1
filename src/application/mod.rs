//! Application services layer.

pub mod admin;
pub mod error;
pub mod gallery;
pub mod rate_limit;
pub mod repos;
pub mod theme;
pub mod views;
pub mod visitor;
