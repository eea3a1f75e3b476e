//! Round trip against a live PostgreSQL server. Skipped unless `DATABASE_URL` is set
//! (a `.env` file is honored).

#![cfg(feature = "postgres")]

use admindb::{
    Database, DatabaseConfig, DatabaseList, OrmError, OrmResult, Parameters, Value, WhereState,
    values,
};
use std::time::{SystemTime, UNIX_EPOCH};

fn database_url() -> Option<String> {
    let _ = dotenvy::dotenv();
    std::env::var("DATABASE_URL").ok()
}

#[tokio::test]
async fn postgres_round_trip() -> OrmResult<()> {
    let Some(url) = database_url() else {
        eprintln!("DATABASE_URL is not set; skipping postgres_round_trip");
        return Ok(());
    };

    let list = DatabaseList::new().add(
        "default",
        DatabaseConfig {
            driver: "postgresql".to_string(),
            dsn: url,
            max_open_conns: 2,
            max_idle_conns: 1,
            ..Default::default()
        },
    );
    let db = Database::connect(&list).await?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before UNIX_EPOCH")
        .as_nanos();
    // Name contains `goadmin_users`, so inserts use RETURNING id.
    let table = format!("goadmin_users_it_{}_{}", std::process::id(), nanos);
    db.exec(
        &format!(
            "CREATE TABLE {table} (
                id SERIAL PRIMARY KEY,
                username VARCHAR(64) NOT NULL UNIQUE,
                level INT4 NOT NULL DEFAULT 1,
                price NUMERIC(10, 2) NOT NULL DEFAULT 9.90,
                created_at TIMESTAMP
            )"
        ),
        &[],
    )
    .await?;

    let result = exercise(&db, &table).await;
    db.exec(&format!("DROP TABLE {table}"), &[]).await?;
    result
}

async fn exercise(db: &Database, table: &str) -> OrmResult<()> {
    let id = db
        .table(table)
        .insert(values! {
            "username" => "admin",
            "level" => "3",
            "created_at" => "2024-01-02 03:04:05",
        })
        .await?;
    assert_eq!(id, 1);

    let row = db.table(table).find(id).await?;
    assert_eq!(row.get("username"), Some(&Value::from("admin")));
    assert_eq!(row.get("level"), Some(&Value::Int(3)));
    assert_eq!(row.get("price"), Some(&Value::Bytes(b"9.90".to_vec())));
    assert_eq!(
        row.get("created_at"),
        Some(&Value::from("2024-01-02 03:04:05"))
    );

    let err = db
        .table(table)
        .insert(values! { "username" => "admin" })
        .await
        .unwrap_err();
    assert!(err.is_unique_violation(), "{err}");

    let params = Parameters::from_query("level=abc", 10, "id");
    let filters = params.compile_plain(
        WhereState::new(),
        table,
        db.dialect("default")?.delimiters(),
        &["id", "username", "level"],
    );
    let err = db
        .table(table)
        .apply_where(&filters)
        .all()
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Query(_)), "{err}");

    let err = db
        .table(table)
        .where_eq("id", 404)
        .update(values! { "level" => 2 })
        .await
        .unwrap_err();
    assert!(err.is_no_affected_rows());

    let err = db
        .with_transaction(|tx| {
            let db = db.clone();
            let table = table.to_string();
            async move {
                db.table(&table)
                    .with_tx(&tx)
                    .insert(values! { "username" => "temp" })
                    .await?;
                Err::<(), _>(OrmError::validation("abort"))
            }
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
    assert_eq!(db.table(table).count().await?, 1);

    let tables = db.table(table).show_tables().await?;
    assert!(tables.iter().any(|t| t == table));
    Ok(())
}
