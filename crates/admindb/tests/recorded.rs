//! Statements as the driver receives them, captured by a recording connection.

use admindb::{
    Connection, Database, DialectKind, ExecResult, MonitorSettings, OrmError, OrmResult, Row,
    StatsMonitor, Transaction, TransactionIsolation, Value, values,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Recorder {
    log: Mutex<Vec<(String, Vec<Value>)>>,
    fail_next: Mutex<Option<String>>,
}

impl Recorder {
    fn record(&self, sql: &str, args: &[Value]) -> OrmResult<()> {
        self.log.lock().unwrap().push((sql.to_string(), args.to_vec()));
        match self.fail_next.lock().unwrap().take() {
            Some(message) => Err(OrmError::Query(message)),
            None => Ok(()),
        }
    }

    fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(sql, _)| sql.clone()).collect()
    }

    fn last(&self) -> (String, Vec<Value>) {
        self.log.lock().unwrap().last().cloned().unwrap()
    }
}

struct Recording {
    kind: DialectKind,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl Connection for Recording {
    fn dialect(&self) -> &'static dyn admindb::Dialect {
        self.kind.dialect()
    }

    async fn query(&self, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>> {
        self.recorder.record(sql, args)?;
        Ok(Vec::new())
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> OrmResult<ExecResult> {
        self.recorder.record(sql, args)?;
        Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: Some(7),
        })
    }

    async fn begin(&self, statements: &[String]) -> OrmResult<Box<dyn Transaction>> {
        for statement in statements {
            self.recorder.record(statement, &[])?;
        }
        Ok(Box::new(RecordingTx {
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

struct RecordingTx {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl Transaction for RecordingTx {
    async fn query(&mut self, sql: &str, args: &[Value]) -> OrmResult<Vec<Row>> {
        self.recorder.record(sql, args)?;
        Ok(Vec::new())
    }

    async fn execute(&mut self, sql: &str, args: &[Value]) -> OrmResult<ExecResult> {
        self.recorder.record(sql, args)?;
        Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        })
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.recorder.record("COMMIT", &[])
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.recorder.record("ROLLBACK", &[])
    }
}

fn recording(kind: DialectKind, monitor: MonitorSettings) -> (Database, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let db = Database::builder()
        .connection(
            "default",
            Arc::new(Recording {
                kind,
                recorder: Arc::clone(&recorder),
            }),
        )
        .monitor(monitor)
        .build();
    (db, recorder)
}

#[tokio::test]
async fn mssql_ordered_page_uses_row_number_window() {
    let (db, recorder) = recording(DialectKind::Mssql, MonitorSettings::new());

    db.table("users")
        .order_by("id", "asc")
        .skip(20)
        .take(10)
        .all()
        .await
        .unwrap();

    assert_eq!(
        recorder.last().0,
        "SELECT * FROM (SELECT ROW_NUMBER() OVER (ORDER BY [id] ASC) AS ROWNUMBER_, * \
         FROM [users]) AS TMP_ WHERE ROWNUMBER_ > 20 AND ROWNUMBER_ <= 30"
    );
}

#[tokio::test]
async fn mssql_unordered_page_uses_top_and_numbered_params() {
    let (db, recorder) = recording(DialectKind::Mssql, MonitorSettings::new());

    db.table("users")
        .select(["id", "name"])
        .where_eq("status", 1)
        .where_eq("role", "admin")
        .take(5)
        .all()
        .await
        .unwrap();

    let (sql, args) = recorder.last();
    assert_eq!(
        sql,
        "SELECT TOP 5 * FROM (SELECT TOP 5 ROW_NUMBER() OVER (ORDER BY (SELECT 0)) \
         AS ROWNUMBER_, [id], [name] FROM [users] WHERE [status] = @p1 AND [role] = @p2) \
         AS TMP_ WHERE ROWNUMBER_ > 0"
    );
    assert_eq!(args, vec![Value::Int(1), Value::from("admin")]);
}

#[tokio::test]
async fn mssql_statements_without_limit_keep_their_shape() {
    let (db, recorder) = recording(DialectKind::Mssql, MonitorSettings::new());

    db.table("users").where_eq("id", 3).delete().await.unwrap();

    assert_eq!(recorder.last().0, "DELETE FROM [users] WHERE [id] = @p1");
}

#[tokio::test]
async fn mssql_transaction_sets_isolation_before_begin() {
    let (db, recorder) = recording(DialectKind::Mssql, MonitorSettings::new());

    db.with_transaction_by_level(TransactionIsolation::Serializable, |tx| {
        let db = db.clone();
        async move {
            db.table("users")
                .with_tx(&tx)
                .where_eq("id", 1)
                .update(values! { "name" => "ann" })
                .await
        }
    })
    .await
    .unwrap();

    assert_eq!(
        recorder.statements(),
        [
            "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
            "BEGIN TRANSACTION",
            "UPDATE [users] SET [name] = @p1 WHERE [id] = @p2",
            "COMMIT",
        ]
    );
}

#[tokio::test]
async fn postgres_numbers_placeholders_in_bind_order() {
    let (db, recorder) = recording(DialectKind::Postgresql, MonitorSettings::new());

    db.table("users")
        .where_in("id", [1, 2])
        .where_eq("name", "it's")
        .all()
        .await
        .unwrap();

    let (sql, args) = recorder.last();
    assert_eq!(
        sql,
        r#"SELECT * FROM "users" WHERE "id" IN ($1, $2) AND "name" = $3"#
    );
    assert_eq!(args.len(), 3);
}

#[tokio::test]
async fn stats_monitor_counts_every_statement() {
    let stats = Arc::new(StatsMonitor::new());
    let settings = MonitorSettings::new()
        .with_monitor(stats.clone())
        .with_slow_query_threshold(Duration::ZERO);
    let (db, recorder) = recording(DialectKind::Mysql, settings);

    db.table("users").all().await.unwrap();
    let id = db
        .table("users")
        .insert(values! { "name" => "ann" })
        .await
        .unwrap();
    db.table("users")
        .where_eq("id", id)
        .update(values! { "name" => "bob" })
        .await
        .unwrap();
    db.table("users").where_eq("id", id).delete().await.unwrap();

    *recorder.fail_next.lock().unwrap() = Some("syntax error".to_string());
    let err = db.table("users").count().await.unwrap_err();
    assert!(matches!(err, OrmError::Query(_)));

    let snapshot = stats.stats();
    assert_eq!(id, 7);
    assert_eq!(snapshot.total_queries, 5);
    assert_eq!(snapshot.failed_queries, 1);
    assert_eq!(snapshot.slow_queries, 5);
    assert_eq!(snapshot.select_count, 2);
    assert_eq!(snapshot.insert_count, 1);
    assert_eq!(snapshot.update_count, 1);
    assert_eq!(snapshot.delete_count, 1);

    stats.reset();
    assert_eq!(stats.stats(), Default::default());
}
