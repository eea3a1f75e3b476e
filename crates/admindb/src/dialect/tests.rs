use super::*;
use crate::value::Value;
use crate::values;

fn all() -> [&'static dyn Dialect; 4] {
    [
        DialectKind::Mysql.dialect(),
        DialectKind::Postgresql.dialect(),
        DialectKind::Mssql.dialect(),
        DialectKind::Sqlite.dialect(),
    ]
}

fn users_query() -> SqlComponent {
    let mut comp = SqlComponent::new("users");
    comp.fields = vec!["id".into(), "name".into()];
    comp.functions = vec![None, None];
    comp.wheres.push(Where {
        field: "status".into(),
        operator: "=".into(),
        placeholder: "?".into(),
    });
    comp.args.push(Value::from("active"));
    comp
}

#[test]
fn parses_known_identifiers_only() {
    assert_eq!("mysql".parse::<DialectKind>().unwrap(), DialectKind::Mysql);
    assert_eq!(
        "postgresql".parse::<DialectKind>().unwrap(),
        DialectKind::Postgresql
    );
    assert_eq!("mssql".parse::<DialectKind>().unwrap(), DialectKind::Mssql);
    assert_eq!("sqlite".parse::<DialectKind>().unwrap(), DialectKind::Sqlite);

    for bad in ["MySQL", "postgres", "oracle", ""] {
        let err = bad.parse::<DialectKind>().unwrap_err();
        assert!(matches!(err, OrmError::UnknownDialect(ref s) if s == bad));
    }
}

#[test]
fn delimiters_per_engine() {
    assert_eq!(Mysql.delimiters(), ("`", "`"));
    assert_eq!(Postgres.delimiters(), ("\"", "\""));
    assert_eq!(Mssql::new().delimiters(), ("[", "]"));
    assert_eq!(Sqlite.delimiters(), ("`", "`"));
}

#[test]
fn select_renders_quoted_fields_and_where() {
    let mut comp = users_query();
    assert_eq!(
        Mysql.select(&mut comp),
        "SELECT `id`, `name` FROM `users` WHERE `status` = ?"
    );
    assert_eq!(
        Postgres.select(&mut comp),
        r#"SELECT "id", "name" FROM "users" WHERE "status" = ?"#
    );
    assert_eq!(
        Mssql::new().select(&mut comp),
        "SELECT [id], [name] FROM [users] WHERE [status] = ?"
    );
    assert_eq!(comp.bound_args(), &[Value::from("active")]);
}

#[test]
fn rendering_twice_is_identical() {
    for dialect in all() {
        let mut comp = users_query();
        comp.where_raw.push("deleted_at IS NULL".into());
        comp.order = "id DESC".into();
        comp.limit = "10".into();
        comp.offset = "20".into();

        let first = dialect.select(&mut comp);
        let first_args = comp.bound_args().to_vec();
        let second = dialect.select(&mut comp);
        assert_eq!(first, second, "{}", dialect.name());
        assert_eq!(first_args, comp.bound_args(), "{}", dialect.name());
    }
}

#[test]
fn no_where_clause_without_conditions() {
    for dialect in all() {
        let mut comp = SqlComponent::new("users");
        let sql = dialect.select(&mut comp);
        assert!(!sql.contains("WHERE"), "{sql}");
        assert!(!sql.contains("1=1"), "{sql}");
    }
}

#[test]
fn lone_raw_where_is_verbatim() {
    let mut comp = SqlComponent::new("users");
    comp.where_raw.push("id > 10 OR name = 'x'".into());
    assert_eq!(
        Mysql.select(&mut comp),
        "SELECT * FROM `users` WHERE id > 10 OR name = 'x'"
    );
}

#[test]
fn raw_args_bind_after_structured_args() {
    let mut comp = users_query();
    comp.where_raw.push("age > ?".into());
    comp.where_raw_args.push(Value::Int(18));
    let sql = Sqlite.select(&mut comp);
    assert_eq!(
        sql,
        "SELECT `id`, `name` FROM `users` WHERE `status` = ? AND age > ?"
    );
    assert_eq!(comp.bound_args(), &[Value::from("active"), Value::Int(18)]);
}

#[test]
fn joins_are_left_joins() {
    let mut comp = SqlComponent::new("users");
    comp.fields = vec!["users.id".into(), "roles.name".into()];
    comp.functions = vec![None, None];
    comp.joins.push(Join {
        table: "roles".into(),
        left_field: "users.role_id".into(),
        operator: "=".into(),
        right_field: "roles.id".into(),
    });
    assert_eq!(
        Postgres.select(&mut comp),
        r#"SELECT "users"."id", "roles"."name" FROM "users" LEFT JOIN "roles" ON "users"."role_id" = "roles"."id""#
    );
}

#[test]
fn aggregate_functions_wrap_fields() {
    let mut comp = SqlComponent::new("orders");
    comp.fields = vec!["*".into(), "amount".into()];
    comp.functions = vec![Some("count".into()), Some("sum".into())];
    assert_eq!(
        Mysql.select(&mut comp),
        "SELECT count(*), sum(`amount`) FROM `orders`"
    );
}

#[test]
fn quoting_escapes_embedded_delimiters() {
    assert_eq!(Mysql.quote("we`ird"), "`we``ird`");
    assert_eq!(Postgres.quote(r#"we"ird"#), r#""we""ird""#);
    assert_eq!(Mssql::new().quote("we]ird"), "[we]]ird]");
    assert_eq!(Sqlite.quote("plain"), "`plain`");

    for dialect in all() {
        let (open, close) = dialect.delimiters();
        let quoted = dialect.quote(&format!("a{close}b"));
        assert!(quoted.starts_with(open) && quoted.ends_with(close));
        let inner = &quoted[open.len()..quoted.len() - close.len()];
        assert_eq!(inner.matches(close).count() % 2, 0, "{quoted}");
    }
}

#[test]
fn insert_column_order_matches_args() {
    let mut comp = SqlComponent::new("users");
    comp.values = values! { "name" => "alice", "age" => 30, "email" => "a@x.io" };
    let sql = Postgres.insert(&mut comp);
    assert_eq!(
        sql,
        r#"INSERT INTO "users" ("age", "email", "name") VALUES (?, ?, ?)"#
    );
    assert_eq!(
        comp.bound_args(),
        &[Value::Int(30), Value::from("a@x.io"), Value::from("alice")]
    );
}

#[test]
fn update_binds_values_then_raws_then_wheres() {
    let mut comp = users_query();
    comp.values = values! { "name" => "bob" };
    comp.update_raws.push(UpdateRaw {
        expression: "hits = hits + ?".into(),
        args: vec![Value::Int(1)],
    });
    let sql = Mysql.update(&mut comp);
    assert_eq!(
        sql,
        "UPDATE `users` SET `name` = ?, hits = hits + ? WHERE `status` = ?"
    );
    assert_eq!(
        comp.bound_args(),
        &[Value::from("bob"), Value::Int(1), Value::from("active")]
    );
}

#[test]
#[should_panic(expected = "update without values")]
fn update_without_values_is_a_fault() {
    let mut comp = SqlComponent::new("users");
    Mysql.update(&mut comp);
}

#[test]
fn count_reuses_the_update_renderer() {
    let mut comp = SqlComponent::new("users");
    comp.values = values! { "name" => "x" };
    assert_eq!(Mysql.count(&mut comp), Mysql.update(&mut comp));
}

#[test]
fn delete_renders_where() {
    let mut comp = users_query();
    assert_eq!(
        Sqlite.delete(&mut comp),
        "DELETE FROM `users` WHERE `status` = ?"
    );
}

#[test]
fn mssql_select_renders_limit_pair_for_rewrite() {
    let mut comp = users_query();
    comp.limit = "10".into();
    comp.offset = "20".into();
    let dialect = Mssql::new();
    let sql = dialect.select(&mut comp);
    assert_eq!(
        sql,
        "SELECT [id], [name] FROM [users] WHERE [status] = ? LIMIT 20,10"
    );
    assert_eq!(
        dialect.prepare(&sql),
        "SELECT TOP 10 * FROM (SELECT TOP 30 ROW_NUMBER() OVER (ORDER BY (SELECT 0)) \
         AS ROWNUMBER_, [id], [name] FROM [users] WHERE [status] = @p1) AS TMP_ \
         WHERE ROWNUMBER_ > 20"
    );
}

#[test]
fn mssql_prepare_without_limit_only_renames_placeholders() {
    let sql = "UPDATE [users] SET [name] = ? WHERE [id] = ?";
    assert_eq!(
        Mssql::new().prepare(sql),
        "UPDATE [users] SET [name] = @p1 WHERE [id] = @p2"
    );
}

#[test]
fn postgres_prepare_numbers_placeholders_outside_quotes() {
    let sql = r#"SELECT * FROM "t?" WHERE a = ? AND b = '?' AND c IN (?, ?)"#;
    assert_eq!(
        Postgres.prepare(sql),
        r#"SELECT * FROM "t?" WHERE a = $1 AND b = '?' AND c IN ($2, $3)"#
    );
    assert_eq!(Mysql.prepare("a = ?"), "a = ?");
}

#[test]
fn introspection_statements() {
    assert_eq!(Mysql.show_columns("users"), "SHOW COLUMNS IN `users`");
    assert_eq!(
        Postgres.show_columns("o'brien"),
        "SELECT * FROM information_schema.columns WHERE table_name = 'o''brien'"
    );
    assert_eq!(Sqlite.show_columns("users"), "PRAGMA table_info(`users`)");
    assert_eq!(Mssql::new().table_name_column(), Some("TABLE_NAME"));
    assert_eq!(Mysql.table_name_column(), None);
    assert!(Sqlite.show_tables().contains("sqlite_master"));
}

#[test]
fn begin_statements_per_isolation_level() {
    use TransactionIsolation as Iso;

    assert_eq!(Postgres.begin(Iso::Default).unwrap(), vec!["BEGIN"]);
    assert_eq!(
        Postgres.begin(Iso::RepeatableRead).unwrap(),
        vec!["BEGIN ISOLATION LEVEL REPEATABLE READ"]
    );
    assert!(Postgres.begin(Iso::Snapshot).is_err());

    assert_eq!(
        Mysql.begin(Iso::ReadCommitted).unwrap(),
        vec!["SET TRANSACTION ISOLATION LEVEL READ COMMITTED", "START TRANSACTION"]
    );
    assert_eq!(
        Mssql::new().begin(Iso::Snapshot).unwrap(),
        vec!["SET TRANSACTION ISOLATION LEVEL SNAPSHOT", "BEGIN TRANSACTION"]
    );

    assert_eq!(Sqlite.begin(Iso::Serializable).unwrap(), vec!["BEGIN"]);
    let err = Sqlite.begin(Iso::ReadUncommitted).unwrap_err();
    assert!(matches!(err, OrmError::UnsupportedIsolation { .. }));
}

#[test]
fn reset_clears_everything() {
    let mut comp = users_query();
    comp.limit = "5".into();
    Mysql.select(&mut comp);
    comp.reset();
    assert!(comp.is_reset());
}
