//! Admin list page over an in-memory SQLite database
//!
//! Run with: cargo run --example sqlite_admin -p admindb
//!
//! Pass a request query string as the first argument to filter the list, e.g.
//! `"name=a&name__goadmin_operator__=like&__sort_type=asc"`.

use admindb::{
    Database, DatabaseList, FromRow, OrmError, OrmResult, Parameters, Row, WhereState, values,
};

const CONFIG: &str = r#"
[default]
driver = "sqlite"
file = ":memory:"
slow_query_ms = 50
"#;

#[derive(Debug)]
#[allow(dead_code)]
struct User {
    id: i64,
    name: String,
    status: i64,
    created_at: Option<String>,
}

impl FromRow for User {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), OrmError> {
    let query = std::env::args().nth(1).unwrap_or_default();

    let db = Database::connect(&DatabaseList::from_toml(CONFIG)?).await?;
    db.exec(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name VARCHAR(64) NOT NULL,
            status INT NOT NULL DEFAULT 1,
            created_at DATETIME
        )",
        &[],
    )
    .await?;

    // ============================================
    // Seed inside one transaction
    // ============================================
    println!("=== Seed ===");
    let seeded = db
        .with_transaction(|tx| {
            let db = db.clone();
            async move {
                let mut ids = Vec::new();
                for (name, status) in [("alice", 1), ("bob", 0), ("carol", 1), ("dave", 1)] {
                    let id = db
                        .table("users")
                        .with_tx(&tx)
                        .insert(values! {
                            "name" => name,
                            "status" => status,
                            "created_at" => "2024-05-01T08:30:00Z",
                        })
                        .await?;
                    ids.push(id);
                }
                Ok(ids)
            }
        })
        .await?;
    println!("Inserted ids: {seeded:?}");

    // ============================================
    // Filtered, paginated list
    // ============================================
    println!("\n=== List ({query:?}) ===");
    let params = Parameters::from_query(&query, 2, "id");
    let columns = ["id", "name", "status", "created_at"];
    let filters = params.compile_plain(
        WhereState::new(),
        "users",
        db.dialect("default")?.delimiters(),
        &columns,
    );

    let total = db.table("users").apply_where(&filters).count().await?;
    let page: Vec<User> = db
        .table("users")
        .apply_where(&filters)
        .paginate(&params)
        .all_as()
        .await?;
    println!("{total} matching, page {} of size {}:", params.page, params.page_size);
    for user in &page {
        println!("  {user:?}");
    }

    // ============================================
    // Updates and the no-rows sentinel
    // ============================================
    println!("\n=== Update ===");
    let updated = db
        .table("users")
        .where_eq("status", 0)
        .update(values! { "status" => 1 })
        .await?;
    println!("Activated {updated} user(s)");

    match db
        .table("users")
        .where_eq("status", 0)
        .update(values! { "status" => 1 })
        .await
    {
        Err(e) if e.is_no_affected_rows() => println!("Nothing left to activate"),
        other => println!("Unexpected: {other:?}"),
    }

    // ============================================
    // Row as JSON
    // ============================================
    println!("\n=== JSON ===");
    let first = db.table("users").find(1).await?;
    println!(
        "{}",
        serde_json::to_string(&first).map_err(|e| OrmError::Other(e.to_string()))?
    );

    println!("\nTables: {:?}", db.table("users").show_tables().await?);
    Ok(())
}
