use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{RepoError, ThemesRepo, UpdateThemeParams};
use crate::domain::entities::ThemeRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ThemeRow {
    name: String,
    header_html: String,
    footer_html: String,
    accent_color: Option<String>,
    updated_at: OffsetDateTime,
}

impl From<ThemeRow> for ThemeRecord {
    fn from(row: ThemeRow) -> Self {
        Self {
            name: row.name,
            header_html: row.header_html,
            footer_html: row.footer_html,
            accent_color: row.accent_color,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ThemesRepo for PostgresRepositories {
    async fn load_theme(&self) -> Result<Option<ThemeRecord>, RepoError> {
        let row = sqlx::query_as::<_, ThemeRow>(
            "SELECT name, header_html, footer_html, accent_color, updated_at \
             FROM themes WHERE id = 1",
        )
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ThemeRecord::from))
    }

    async fn update_theme(&self, params: UpdateThemeParams) -> Result<ThemeRecord, RepoError> {
        let UpdateThemeParams {
            name,
            header_html,
            footer_html,
            accent_color,
        } = params;

        let row = sqlx::query_as::<_, ThemeRow>(
            r#"
            INSERT INTO themes (id, name, header_html, footer_html, accent_color, updated_at)
            VALUES (1, $1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = excluded.name,
                header_html = excluded.header_html,
                footer_html = excluded.footer_html,
                accent_color = excluded.accent_color,
                updated_at = excluded.updated_at
            RETURNING name, header_html, footer_html, accent_color, updated_at
            "#,
        )
        .bind(name)
        .bind(header_html)
        .bind(footer_html)
        .bind(accent_color)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ThemeRecord::from(row))
    }
}
