use crate::db::schema::SCHEMA_SQL;
use crate::db::DbPool;

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    for sql in SCHEMA_SQL {
        sqlx::query(sql).execute(pool).await?;
    }
    Ok(())
}
