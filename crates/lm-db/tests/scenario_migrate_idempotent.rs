/// Migrating twice must be a no-op the second time.
///
/// DB-backed test, skipped if LM_DATABASE_URL is not set.
#[tokio::test]
async fn migrate_idempotent_and_schema_complete() -> anyhow::Result<()> {
    let url = match std::env::var(lm_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: LM_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;

    lm_db::migrate(&pool).await?;
    lm_db::migrate(&pool).await?;

    let st = lm_db::status(&pool).await?;
    assert!(st.ok);
    assert!(st.schema_ready(), "tables {}/{}", st.tables_present, st.tables_expected);
    assert!(st.open_exceptions.is_some());
    Ok(())
}
