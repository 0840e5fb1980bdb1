use tracing::info;

use crate::application::repos::{
    CreateGroupPostParams, CreateSinglePostParams, NewGroupImage, UpdateGroupPostParams,
    UpdateSinglePostParams, UpdateThemeParams,
};
use crate::domain::entities::{GroupPostRecord, SinglePostRecord, ThemeRecord};
use crate::domain::error::DomainError;
use crate::domain::posts::{
    MAX_GROUP_IMAGES, normalize_description, normalize_tags, normalize_title, validate_media_path,
    validate_optional_media_path,
};

use super::service::AdminContentService;
use super::types::{
    AdminContentError, BulkUploadCommand, CreateGroupPostCommand, CreateSinglePostCommand,
    GroupImageInput, MAX_BULK_UPLOAD, UpdateGroupPostCommand, UpdateSinglePostCommand,
    UpdateThemeCommand,
};

impl AdminContentService {
    pub async fn create_single(
        &self,
        command: CreateSinglePostCommand,
    ) -> Result<SinglePostRecord, AdminContentError> {
        let params = single_params(command)?;
        let post = self.writer.create_single(params).await?;

        self.trigger.single_post_upserted(post.id);
        info!(post_id = post.id, op = "single.create", "Single post created");
        Ok(post)
    }

    pub async fn update_single(
        &self,
        id: i64,
        command: UpdateSinglePostCommand,
    ) -> Result<SinglePostRecord, AdminContentError> {
        let params = UpdateSinglePostParams {
            id,
            title: normalize_title(&command.title)?,
            description: normalize_description(command.description.as_deref()),
            thumb_path: validate_optional_media_path("thumb_path", command.thumb_path.as_deref())?,
            tags: normalize_tags(&command.tags)?,
        };
        let post = self.writer.update_single(params).await?;

        self.trigger.single_post_upserted(post.id);
        info!(post_id = post.id, op = "single.update", "Single post updated");
        Ok(post)
    }

    pub async fn delete_single(&self, id: i64) -> Result<(), AdminContentError> {
        self.writer.delete_single(id).await?;

        self.trigger.single_post_deleted(id);
        info!(post_id = id, op = "single.delete", "Single post deleted");
        Ok(())
    }

    pub async fn create_group(
        &self,
        command: CreateGroupPostCommand,
    ) -> Result<GroupPostRecord, AdminContentError> {
        let params = CreateGroupPostParams {
            title: normalize_title(&command.title)?,
            description: normalize_description(command.description.as_deref()),
            tags: normalize_tags(&command.tags)?,
            images: group_images(command.images)?,
        };
        let post = self.writer.create_group(params).await?;

        self.trigger.group_post_upserted(post.id);
        info!(
            post_id = post.id,
            images = post.images.len(),
            op = "group.create",
            "Group post created"
        );
        Ok(post)
    }

    pub async fn update_group(
        &self,
        id: i64,
        command: UpdateGroupPostCommand,
    ) -> Result<GroupPostRecord, AdminContentError> {
        let images = match command.images {
            Some(images) => Some(group_images(images)?),
            None => None,
        };
        let params = UpdateGroupPostParams {
            id,
            title: normalize_title(&command.title)?,
            description: normalize_description(command.description.as_deref()),
            tags: normalize_tags(&command.tags)?,
            images,
        };
        let post = self.writer.update_group(params).await?;

        self.trigger.group_post_upserted(post.id);
        info!(post_id = post.id, op = "group.update", "Group post updated");
        Ok(post)
    }

    pub async fn delete_group(&self, id: i64) -> Result<(), AdminContentError> {
        self.writer.delete_group(id).await?;

        self.trigger.group_post_deleted(id);
        info!(post_id = id, op = "group.delete", "Group post deleted");
        Ok(())
    }

    /// Create many single posts in one transaction.
    pub async fn bulk_upload(
        &self,
        command: BulkUploadCommand,
    ) -> Result<Vec<SinglePostRecord>, AdminContentError> {
        if command.items.is_empty() {
            return Err(DomainError::validation("items", "must not be empty").into());
        }
        if command.items.len() > MAX_BULK_UPLOAD {
            return Err(DomainError::validation(
                "items",
                format!("at most {MAX_BULK_UPLOAD} posts per upload"),
            )
            .into());
        }

        let params = command
            .items
            .into_iter()
            .map(single_params)
            .collect::<Result<Vec<_>, _>>()?;
        let posts = self.writer.bulk_create_singles(params).await?;

        let ids: Vec<i64> = posts.iter().map(|post| post.id).collect();
        self.trigger.bulk_uploaded(ids);
        info!(created = posts.len(), op = "bulk.upload", "Bulk upload committed");
        Ok(posts)
    }

    pub async fn update_theme(
        &self,
        command: UpdateThemeCommand,
    ) -> Result<ThemeRecord, AdminContentError> {
        let name = command.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name", "must not be empty").into());
        }
        let accent_color = match command.accent_color.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(color) => Some(validate_hex_color(color)?),
        };

        let params = UpdateThemeParams {
            name: name.to_string(),
            header_html: command.header_html,
            footer_html: command.footer_html,
            accent_color,
        };
        let theme = self.themes.update_theme(params).await?;

        self.trigger.theme_updated();
        info!(theme = %theme.name, op = "theme.update", "Theme updated");
        Ok(theme)
    }

    /// Drop every cache entry. Returns the number removed.
    pub fn purge_cache(&self) -> usize {
        self.trigger.purge_all()
    }
}

fn single_params(command: CreateSinglePostCommand) -> Result<CreateSinglePostParams, DomainError> {
    Ok(CreateSinglePostParams {
        title: normalize_title(&command.title)?,
        description: normalize_description(command.description.as_deref()),
        image_path: validate_media_path("image_path", &command.image_path)?,
        thumb_path: validate_optional_media_path("thumb_path", command.thumb_path.as_deref())?,
        tags: normalize_tags(&command.tags)?,
    })
}

fn group_images(images: Vec<GroupImageInput>) -> Result<Vec<NewGroupImage>, DomainError> {
    if images.is_empty() {
        return Err(DomainError::validation(
            "images",
            "a group post needs at least one image",
        ));
    }
    if images.len() > MAX_GROUP_IMAGES {
        return Err(DomainError::validation(
            "images",
            format!("at most {MAX_GROUP_IMAGES} images per group"),
        ));
    }
    images
        .into_iter()
        .map(|image| {
            Ok(NewGroupImage {
                image_path: validate_media_path("image_path", &image.image_path)?,
                thumb_path: validate_optional_media_path(
                    "thumb_path",
                    image.thumb_path.as_deref(),
                )?,
            })
        })
        .collect()
}

fn validate_hex_color(raw: &str) -> Result<String, DomainError> {
    let digits = raw.strip_prefix('#').unwrap_or(raw);
    let valid = matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(DomainError::validation(
            "accent_color",
            format!("`{raw}` is not a hex color"),
        ));
    }
    Ok(format!("#{}", digits.to_ascii_lowercase()))
}
