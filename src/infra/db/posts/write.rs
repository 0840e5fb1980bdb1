use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;

use crate::application::repos::{
    CreateGroupPostParams, CreateSinglePostParams, NewGroupImage, PostsWriteRepo, RepoError,
    UpdateGroupPostParams, UpdateSinglePostParams,
};
use crate::domain::entities::{GroupPostRecord, SinglePostRecord};
use crate::infra::db::map_sqlx_error;

use super::PostgresRepositories;
use super::read::fetch_group_images;
use super::types::{GroupPostRow, SinglePostRow};

const SINGLE_RETURNING: &str =
    " RETURNING id, title, description, image_path, thumb_path, tags, created_at, updated_at";
const GROUP_RETURNING: &str = " RETURNING id, title, description, tags, created_at, updated_at";

async fn insert_single(
    tx: &mut Transaction<'_, Postgres>,
    params: CreateSinglePostParams,
    now: OffsetDateTime,
) -> Result<SinglePostRow, sqlx::Error> {
    let CreateSinglePostParams {
        title,
        description,
        image_path,
        thumb_path,
        tags,
    } = params;

    let mut qb = QueryBuilder::<Postgres>::new(
        "INSERT INTO posts_single \
         (title, description, image_path, thumb_path, tags, created_at, updated_at) VALUES (",
    );
    let mut values = qb.separated(", ");
    values.push_bind(title);
    values.push_bind(description);
    values.push_bind(image_path);
    values.push_bind(thumb_path);
    values.push_bind(tags);
    values.push_bind(now);
    values.push_bind(now);
    qb.push(")");
    qb.push(SINGLE_RETURNING);

    qb.build_query_as::<SinglePostRow>()
        .fetch_one(tx.as_mut())
        .await
}

async fn replace_group_images(
    tx: &mut Transaction<'_, Postgres>,
    group_id: i64,
    images: Vec<NewGroupImage>,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM group_images WHERE group_id = $1")
        .bind(group_id)
        .execute(tx.as_mut())
        .await?;

    if images.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Postgres>::new(
        "INSERT INTO group_images (group_id, position, image_path, thumb_path) ",
    );
    qb.push_values(
        images.into_iter().zip(0_i32..),
        |mut row, (image, position)| {
            row.push_bind(group_id)
                .push_bind(position)
                .push_bind(image.image_path)
                .push_bind(image.thumb_path);
        },
    );
    qb.build().execute(tx.as_mut()).await?;
    Ok(())
}

async fn load_group(
    tx: &mut Transaction<'_, Postgres>,
    row: GroupPostRow,
) -> Result<GroupPostRecord, sqlx::Error> {
    let images = fetch_group_images(tx.as_mut(), row.id).await?;
    Ok(row.into_record(images))
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_single(
        &self,
        params: CreateSinglePostParams,
    ) -> Result<SinglePostRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let row = insert_single(&mut tx, params, OffsetDateTime::now_utc())
            .await
            .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(SinglePostRecord::from(row))
    }

    async fn update_single(
        &self,
        params: UpdateSinglePostParams,
    ) -> Result<SinglePostRecord, RepoError> {
        let UpdateSinglePostParams {
            id,
            title,
            description,
            thumb_path,
            tags,
        } = params;

        let sql = format!(
            "UPDATE posts_single \
             SET title = $2, description = $3, thumb_path = $4, tags = $5, updated_at = $6 \
             WHERE id = $1{SINGLE_RETURNING}"
        );
        let row = sqlx::query_as::<_, SinglePostRow>(&sql)
            .bind(id)
            .bind(title)
            .bind(description)
            .bind(thumb_path)
            .bind(tags)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(SinglePostRecord::from(row))
    }

    async fn delete_single(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM posts_single WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn create_group(
        &self,
        params: CreateGroupPostParams,
    ) -> Result<GroupPostRecord, RepoError> {
        let CreateGroupPostParams {
            title,
            description,
            tags,
            images,
        } = params;

        let now = OffsetDateTime::now_utc();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let sql = format!(
            "INSERT INTO posts_group (title, description, tags, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4){GROUP_RETURNING}"
        );
        let row = sqlx::query_as::<_, GroupPostRow>(&sql)
            .bind(title)
            .bind(description)
            .bind(tags)
            .bind(now)
            .fetch_one(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;

        replace_group_images(&mut tx, row.id, images)
            .await
            .map_err(map_sqlx_error)?;
        let record = load_group(&mut tx, row).await.map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(record)
    }

    async fn update_group(
        &self,
        params: UpdateGroupPostParams,
    ) -> Result<GroupPostRecord, RepoError> {
        let UpdateGroupPostParams {
            id,
            title,
            description,
            tags,
            images,
        } = params;

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let sql = format!(
            "UPDATE posts_group \
             SET title = $2, description = $3, tags = $4, updated_at = $5 \
             WHERE id = $1{GROUP_RETURNING}"
        );
        let row = sqlx::query_as::<_, GroupPostRow>(&sql)
            .bind(id)
            .bind(title)
            .bind(description)
            .bind(tags)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;

        if let Some(images) = images {
            replace_group_images(&mut tx, id, images)
                .await
                .map_err(map_sqlx_error)?;
        }
        let record = load_group(&mut tx, row).await.map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(record)
    }

    async fn delete_group(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM posts_group WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn bulk_create_singles(
        &self,
        params: Vec<CreateSinglePostParams>,
    ) -> Result<Vec<SinglePostRecord>, RepoError> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let mut created = Vec::with_capacity(params.len());
        for item in params {
            let row = insert_single(&mut tx, item, now)
                .await
                .map_err(map_sqlx_error)?;
            created.push(SinglePostRecord::from(row));
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(created)
    }
}
