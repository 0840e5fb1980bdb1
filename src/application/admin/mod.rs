//! Application services for the administrative surface.

mod commands;
mod service;
mod types;

pub use service::AdminContentService;
pub use types::{
    AdminContentError, BulkUploadCommand, CreateGroupPostCommand, CreateSinglePostCommand,
    GroupImageInput, MAX_BULK_UPLOAD, UpdateGroupPostCommand, UpdateSinglePostCommand,
    UpdateThemeCommand,
};
