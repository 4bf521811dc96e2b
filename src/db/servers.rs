use crate::db::{DbPool, Server};

pub async fn find_server(pool: &DbPool, id: i64) -> Result<Option<Server>, sqlx::Error> {
    sqlx::query_as::<_, Server>("SELECT id, url FROM servers WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Registers or re-points a media server.
pub async fn upsert_server(pool: &DbPool, id: i64, url: &str) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO servers (id, url) VALUES (?, ?) ON CONFLICT(id) DO UPDATE SET url = excluded.url")
        .bind(id)
        .bind(url)
        .execute(pool)
        .await?;
    Ok(())
}
