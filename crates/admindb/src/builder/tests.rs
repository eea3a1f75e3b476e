use super::*;
use crate::connection::{Connection, ExecResult, Transaction};
use crate::database::Database;
use crate::dialect::Dialect;
use crate::filter::Parameters;
use crate::values;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Default)]
struct Shared {
    log: Mutex<Vec<(String, Vec<Value>)>>,
    rows: Mutex<VecDeque<OrmResult<Vec<Row>>>>,
    execs: Mutex<VecDeque<OrmResult<ExecResult>>>,
}

impl Shared {
    fn record(&self, sql: &str, args: &[Value]) {
        self.log.lock().unwrap().push((sql.to_string(), args.to_vec()));
    }

    fn next_rows(&self) -> OrmResult<Vec<Row>> {
        self.rows.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
    }

    fn next_exec(&self) -> OrmResult<ExecResult> {
        self.execs.lock().unwrap().pop_front().unwrap_or(Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        }))
    }

    fn push_rows(&self, rows: OrmResult<Vec<Row>>) {
        self.rows.lock().unwrap().push_back(rows);
    }

    fn push_exec(&self, done: OrmResult<ExecResult>) {
        self.execs.lock().unwrap().push_back(done);
    }

    fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(sql, _)| sql.clone()).collect()
    }

    fn last(&self) -> (String, Vec<Value>) {
        self.log.lock().unwrap().last().cloned().unwrap()
    }
}

struct FakeConnection {
    kind: DialectKind,
    shared: Arc<Shared>,
}

#[async_trait]
impl Connection for FakeConnection {
    fn dialect(&self) -> &'static dyn Dialect {
        self.kind.dialect()
    }

    async fn query(&self, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>> {
        self.shared.record(sql, args);
        self.shared.next_rows()
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> OrmResult<ExecResult> {
        self.shared.record(sql, args);
        self.shared.next_exec()
    }

    async fn begin(&self, statements: &[String]) -> OrmResult<Box<dyn Transaction>> {
        for statement in statements {
            self.shared.record(statement, &[]);
        }
        Ok(Box::new(FakeTransaction {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct FakeTransaction {
    shared: Arc<Shared>,
}

#[async_trait]
impl Transaction for FakeTransaction {
    async fn query(&mut self, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>> {
        self.shared.record(sql, args);
        self.shared.next_rows()
    }

    async fn execute(&mut self, sql: &str, args: &[Value]) -> OrmResult<ExecResult> {
        self.shared.record(sql, args);
        self.shared.next_exec()
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.shared.record("COMMIT", &[]);
        Ok(())
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.shared.record("ROLLBACK", &[]);
        Ok(())
    }
}

fn fake(kind: DialectKind) -> (Database, Arc<Shared>) {
    let shared = Arc::new(Shared::default());
    let db = Database::builder()
        .connection(
            "default",
            Arc::new(FakeConnection {
                kind,
                shared: Arc::clone(&shared),
            }),
        )
        .build();
    (db, shared)
}

fn id_row(id: i64) -> Row {
    Row::new(vec!["id".to_string()], vec![Value::Int(id)])
}

#[tokio::test]
async fn all_renders_clauses_in_order() {
    let (db, shared) = fake(DialectKind::Mysql);

    db.table("users")
        .select(["id", "name"])
        .where_eq("status", 1)
        .where_in("role", ["a", "b"])
        .order_by("id", "DESC")
        .take(10)
        .skip(20)
        .all()
        .await
        .unwrap();

    let (sql, args) = shared.last();
    assert_eq!(
        sql,
        "SELECT `id`, `name` FROM `users` WHERE `status` = ? AND `role` IN (?, ?) \
         ORDER BY `id` DESC LIMIT 10 OFFSET 20"
    );
    assert_eq!(
        args,
        vec![Value::Int(1), Value::from("a"), Value::from("b")]
    );
}

#[tokio::test]
async fn first_limits_to_one_row_and_reports_not_found() {
    let (db, shared) = fake(DialectKind::Mysql);

    let err = db.table("users").find(3).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("no rows in users"), "{err}");
    assert_eq!(
        shared.last().0,
        "SELECT * FROM `users` WHERE `id` = ? LIMIT 1"
    );

    shared.push_rows(Ok(vec![id_row(3)]));
    let row = db.table("users").find(3).await.unwrap();
    assert_eq!(row.try_get::<i64>("id").unwrap(), 3);
}

#[tokio::test]
async fn select_parses_aggregates() {
    let (db, shared) = fake(DialectKind::Sqlite);

    db.table("orders")
        .select(["sum(total)", "user_id"])
        .group_by(["user_id"])
        .all()
        .await
        .unwrap();

    assert_eq!(
        shared.last().0,
        "SELECT sum(`total`), `user_id` FROM `orders` GROUP BY `user_id`"
    );
}

#[tokio::test]
async fn count_drops_order_and_reads_the_first_cell() {
    let (db, shared) = fake(DialectKind::Mysql);
    shared.push_rows(Ok(vec![Row::new(
        vec!["count(*)".to_string()],
        vec![Value::Int(12)],
    )]));

    let total = db
        .table("users")
        .where_eq("status", 1)
        .order_by("id", "asc")
        .count()
        .await
        .unwrap();

    assert_eq!(total, 12);
    assert_eq!(
        shared.last().0,
        "SELECT count(*) FROM `users` WHERE `status` = ?"
    );
}

#[tokio::test]
async fn update_binds_values_raws_then_wheres() {
    let (db, shared) = fake(DialectKind::Mysql);

    let affected = db
        .table("users")
        .where_eq("id", 7)
        .where_raw("deleted = ?", vec![Value::Int(0)])
        .update_raw("hits = hits + ?", vec![Value::Int(1)])
        .update(values! { "name" => "x" })
        .await
        .unwrap();

    assert_eq!(affected, 1);
    let (sql, args) = shared.last();
    assert_eq!(
        sql,
        "UPDATE `users` SET `name` = ?, hits = hits + ? WHERE `id` = ? AND deleted = ?"
    );
    assert_eq!(
        args,
        vec![Value::from("x"), Value::Int(1), Value::Int(7), Value::Int(0)]
    );
}

#[tokio::test]
async fn zero_affected_rows_is_the_sentinel() {
    let (db, shared) = fake(DialectKind::Postgresql);
    let nothing = || {
        Ok(ExecResult {
            rows_affected: 0,
            last_insert_id: None,
        })
    };

    shared.push_exec(nothing());
    let err = db
        .table("users")
        .where_eq("id", 1)
        .update(values! { "name" => "x" })
        .await
        .unwrap_err();
    assert!(err.is_no_affected_rows());

    shared.push_exec(nothing());
    let err = db.table("users").where_eq("id", 1).delete().await.unwrap_err();
    assert!(err.is_no_affected_rows());
    assert_eq!(shared.last().0, r#"DELETE FROM "users" WHERE "id" = $1"#);
}

#[tokio::test]
#[should_panic(expected = "update without values")]
async fn exec_without_raw_expressions_faults() {
    let (db, _) = fake(DialectKind::Mysql);
    let _ = db.table("users").where_eq("id", 1).exec().await;
}

#[test]
#[should_panic(expected = "IN condition on `role` without values")]
fn empty_in_list_faults() {
    let (db, _) = fake(DialectKind::Mysql);
    let _ = db.table("users").where_in("role", Vec::<i64>::new());
}

#[test]
#[should_panic(expected = "invalid sort direction `sideways`")]
fn bad_sort_direction_faults() {
    let (db, _) = fake(DialectKind::Mysql);
    let _ = db.table("users").order_by("id", "sideways");
}

#[tokio::test]
async fn components_return_to_the_pool_reset() {
    let (db, shared) = fake(DialectKind::Mysql);
    shared.push_rows(Err(OrmError::Query("boom".into())));

    let err = db
        .table("users")
        .where_eq("status", 1)
        .take(5)
        .all()
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Query(_)));
    assert_eq!(db.statement_pool().idle(), 1);

    let next = db.table("orders");
    assert_eq!(next.component().table, "orders");
    assert!(next.component().wheres.is_empty());
    assert!(next.component().args.is_empty());
    assert!(next.component().limit.is_empty());
}

#[tokio::test]
async fn insert_returns_the_generated_key() {
    let (db, shared) = fake(DialectKind::Mysql);
    shared.push_exec(Ok(ExecResult {
        rows_affected: 1,
        last_insert_id: Some(42),
    }));

    let id = db
        .table("users")
        .insert(values! { "name" => "ann", "age" => 30 })
        .await
        .unwrap();

    assert_eq!(id, 42);
    let (sql, args) = shared.last();
    assert_eq!(sql, "INSERT INTO `users` (`age`, `name`) VALUES (?, ?)");
    assert_eq!(args, vec![Value::Int(30), Value::from("ann")]);
}

#[tokio::test]
async fn postgres_insert_uses_returning_for_listed_tables() {
    let (db, shared) = fake(DialectKind::Postgresql);
    shared.push_rows(Ok(vec![id_row(5)]));

    let id = db
        .table("goadmin_users")
        .insert(values! { "name" => "ann" })
        .await
        .unwrap();

    assert_eq!(id, 5);
    assert_eq!(
        shared.statements(),
        vec![r#"INSERT INTO "goadmin_users" ("name") VALUES ($1) RETURNING id"#]
    );
}

#[tokio::test]
async fn postgres_insert_falls_back_to_max_id() {
    let (db, shared) = fake(DialectKind::Postgresql);
    shared.push_rows(Err(OrmError::Query(
        "Syntax error in SQL statement \"INSERT ... RETURNING\"".into(),
    )));
    shared.push_rows(Ok(vec![id_row(9)]));

    let id = db
        .table("goadmin_roles")
        .insert(values! { "name" => "ops" })
        .await
        .unwrap();

    assert_eq!(id, 9);
    assert_eq!(
        shared.statements(),
        vec![
            r#"INSERT INTO "goadmin_roles" ("name") VALUES ($1) RETURNING id"#,
            r#"INSERT INTO "goadmin_roles" ("name") VALUES ($1)"#,
            r#"SELECT max("id") AS id FROM "goadmin_roles""#,
        ]
    );
}

#[tokio::test]
async fn postgres_insert_elsewhere_is_plain() {
    let (db, shared) = fake(DialectKind::Postgresql);

    let id = db
        .table("orders")
        .insert(values! { "total" => 10 })
        .await
        .unwrap();

    assert_eq!(id, 0);
    assert_eq!(
        shared.statements(),
        vec![r#"INSERT INTO "orders" ("total") VALUES ($1)"#]
    );
}

#[tokio::test]
async fn show_tables_skips_sqlite_bookkeeping() {
    let (db, shared) = fake(DialectKind::Sqlite);
    let names = |n: &str| Row::new(vec!["tablename".to_string()], vec![Value::from(n)]);
    shared.push_rows(Ok(vec![names("users"), names("sqlite_sequence")]));

    let tables = db.table("").show_tables().await.unwrap();

    assert_eq!(tables, vec!["users"]);
}

#[tokio::test]
async fn request_filters_feed_in_as_one_condition() {
    let (db, shared) = fake(DialectKind::Mysql);
    let params = Parameters::new(10, "id")
        .with_page(3)
        .with_or_condition(["name", "email"], "%ann%");
    let filters = params.compile_plain(
        crate::filter::WhereState::new(),
        "users",
        db.dialect("default").unwrap().delimiters(),
        &["name", "email"],
    );

    db.table("users")
        .where_eq("status", 1)
        .apply_where(&filters)
        .paginate(&params)
        .all()
        .await
        .unwrap();

    let (sql, args) = shared.last();
    assert_eq!(
        sql,
        "SELECT * FROM `users` WHERE `status` = ? AND \
         (`users`.`name` LIKE ? OR `users`.`email` LIKE ?) \
         ORDER BY `id` DESC LIMIT 10 OFFSET 20"
    );
    assert_eq!(args.len(), 3);
}

#[test]
fn top_level_or_detection() {
    assert!(has_top_level_or("a = ? OR b = ?"));
    assert!(has_top_level_or("a = ? or(b = ?)"));
    assert!(!has_top_level_or("(a = ? OR b = ?)"));
    assert!(!has_top_level_or("a = ? AND b = 'x or y'"));
    assert!(!has_top_level_or("color = ? AND orders > 1"));
}

#[test]
fn debug_rendering_does_not_execute() {
    let (db, shared) = fake(DialectKind::Mssql);

    let (sql, args) = db
        .table("users")
        .where_eq("id", 1)
        .take(10)
        .skip(10)
        .to_select_sql();

    assert_eq!(sql, "SELECT * FROM [users] WHERE [id] = ? LIMIT 10,10");
    assert_eq!(args, vec![Value::Int(1)]);
    assert!(shared.statements().is_empty());
}

#[tokio::test]
async fn transaction_commits_on_ok() {
    let (db, shared) = fake(DialectKind::Mysql);

    let id = db
        .with_transaction_by_level(TransactionIsolation::ReadCommitted, |tx| {
            let db = db.clone();
            async move {
                db.table("users")
                    .with_tx(&tx)
                    .insert(values! { "name" => "ann" })
                    .await
            }
        })
        .await
        .unwrap();

    assert_eq!(id, 0);
    assert_eq!(
        shared.statements(),
        vec![
            "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            "START TRANSACTION",
            "INSERT INTO `users` (`name`) VALUES (?)",
            "COMMIT",
        ]
    );
}

#[tokio::test]
#[should_panic(expected = "nested transactions are not supported")]
async fn nested_transactions_fault() {
    let (db, _) = fake(DialectKind::Mysql);
    let _ = db
        .with_transaction(|tx| {
            let db = db.clone();
            async move {
                db.table("users")
                    .with_tx(&tx)
                    .with_transaction(|_| async { Ok(()) })
                    .await
            }
        })
        .await;
}
