//! Atelier: a self-hosted media-gallery publisher.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
