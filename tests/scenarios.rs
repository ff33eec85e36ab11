//! End-to-end behavior through the `quarry` facade.

use pretty_assertions::assert_eq;
use quarry::prelude::*;
use quarry::query::grammar::{COMMON_OPERATORS, MySqlGrammar, PostgresGrammar, SqliteGrammar};
use quarry::query::testing::RecordingDriver;
use quarry::query::{ErrorCode, QueryGrammar};
use serde::Deserialize;
use std::fs;
use tempfile::TempDir;

fn memory() -> Connection {
    quarry::connect("main", ConnectionConfig::sqlite_memory()).unwrap()
}

fn placeholders(sql: &str) -> usize {
    sql.matches('?').count() + sql.matches('$').count()
}

#[test]
fn test_one_placeholder_per_binding_in_call_order() {
    let grammars: [Box<dyn QueryGrammar>; 3] = [
        Box::new(SqliteGrammar::new("")),
        Box::new(MySqlGrammar::new("")),
        Box::new(PostgresGrammar::new("")),
    ];
    let scalar = ["=", "<", ">", "<=", ">=", "<>", "!=", "like", "not like"];
    assert!(scalar.iter().all(|op| COMMON_OPERATORS.contains(op)));

    let query = scalar
        .iter()
        .enumerate()
        .fold(Query::table("events"), |query, (i, op)| {
            query.where_op(format!("c{i}"), *op, i as i64)
        });

    for grammar in &grammars {
        let compiled = query.to_sql(grammar.as_ref()).unwrap();
        assert_eq!(placeholders(&compiled.sql), scalar.len(), "{}", compiled.sql);
        let expected: Vec<Value> = (0..scalar.len() as i64).map(Value::Int).collect();
        assert_eq!(compiled.bindings, expected);
    }
}

#[test]
fn test_dialects_differ_only_in_syntax() {
    let query = Query::table("users")
        .select(["id", "email"])
        .r#where("active", true)
        .where_in("role", ["admin", "owner"])
        .where_between("age", 18, 65)
        .order_by("email")
        .limit(5);

    let sqlite = query.to_sql(&SqliteGrammar::new("")).unwrap();
    let mysql = query.to_sql(&MySqlGrammar::new("")).unwrap();
    let pg = query.to_sql(&PostgresGrammar::new("")).unwrap();

    assert_ne!(sqlite.sql, mysql.sql);
    assert_ne!(mysql.sql, pg.sql);
    assert!(mysql.sql.contains("`email`"));
    assert!(pg.sql.contains("\"active\" = $1"));
    assert_eq!(sqlite.bindings, mysql.bindings);
    assert_eq!(mysql.bindings, pg.bindings);
}

#[test]
fn test_create_if_not_exists_is_idempotent() {
    let mut conn = memory();
    for _ in 0..2 {
        Schema::new(&mut conn)
            .create_if_not_exists("tags", |table| {
                table.increments("id");
                table.string("label", 50);
            })
            .unwrap();
    }
    assert_eq!(
        Schema::new(&mut conn).get_column_listing("tags").unwrap(),
        vec!["id", "label"]
    );
}

#[test]
fn test_nested_rollback_keeps_outer_work() {
    let mut conn = memory();
    Schema::new(&mut conn)
        .create("items", |table| {
            table.increments("id");
            table.string("name", 20);
        })
        .unwrap();

    conn.begin_transaction().unwrap();
    conn.begin_transaction().unwrap();
    conn.table("items").insert(&mut conn, [("name", "x")]).unwrap();
    conn.rollback(None).unwrap();
    conn.table("items").insert(&mut conn, [("name", "y")]).unwrap();
    conn.commit().unwrap();

    assert_eq!(conn.transaction_level(), 0);
    let names = conn.table("items").pluck(&mut conn, "name").unwrap();
    assert_eq!(names, vec![Value::from("y")]);
}

#[test]
fn test_deadlock_retried_until_third_attempt() {
    let mut conn = memory();
    Schema::new(&mut conn)
        .create("ledger", |table| {
            table.increments("id");
            table.integer("amount");
        })
        .unwrap();

    let mut attempts = 0;
    conn.transaction_with_attempts(3, |conn| {
        attempts += 1;
        conn.table("ledger").insert(conn, [("amount", 100)])?;
        if attempts < 3 {
            return Err(QueryError::deadlock("deadlock detected"));
        }
        Ok(())
    })
    .unwrap();

    assert_eq!(attempts, 3);
    assert_eq!(conn.table("ledger").count(&mut conn).unwrap(), 1);
}

#[test]
fn test_deadlock_attempts_exhausted() {
    let driver = RecordingDriver::new();
    let mut conn = driver.connection(Dialect::MySql);

    let err = conn
        .transaction_with_attempts(2, |_| -> QueryResult<()> { Err(QueryError::deadlock("deadlock detected")) })
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::DatabaseError);
    assert_eq!(conn.transaction_level(), 0);
    assert_eq!(driver.statements().iter().filter(|s| *s == "ROLLBACK").count(), 2);
}

#[test]
fn test_two_dropped_columns_never_reach_the_driver() {
    let driver = RecordingDriver::new();
    let mut conn = driver.connection(Dialect::Sqlite);

    let err = Schema::new(&mut conn)
        .table("users", |table| {
            table.drop_column("nickname");
            table.drop_column("avatar");
        })
        .unwrap_err();

    assert!(err.is_compile_error());
    assert!(driver.statements().is_empty());
}

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: i64,
    email: String,
    nickname: Option<String>,
}

#[test]
fn test_rows_decode_into_structs() {
    let mut conn = memory();
    Schema::new(&mut conn)
        .create("users", |table| {
            table.id();
            table.string("email", 255).unique();
            table.string("nickname", 50).nullable();
        })
        .unwrap();
    let id = conn
        .table("users")
        .insert_get_id(&mut conn, [("email", "ada@example.com")])
        .unwrap();

    let user: User = conn
        .table("users")
        .find(&mut conn, id)
        .unwrap()
        .unwrap()
        .deserialize()
        .unwrap();
    assert_eq!(
        user,
        User {
            id,
            email: "ada@example.com".into(),
            nickname: None,
        }
    );
}

#[test]
fn test_migration_lifecycle_through_settings() {
    let dir = TempDir::new().unwrap();
    let units = dir.path().join("migrations");
    for (name, up, down) in [
        (
            "2024_01_01_create_users",
            "create table users (id integer primary key autoincrement, name varchar(50));",
            "drop table users;",
        ),
        (
            "2024_01_02_add_email_to_users",
            "alter table users add column email varchar(255);",
            "alter table users drop column email;",
        ),
    ] {
        let unit = units.join(name);
        fs::create_dir_all(&unit).unwrap();
        fs::write(unit.join("up.sql"), up).unwrap();
        fs::write(unit.join("down.sql"), down).unwrap();
    }

    let settings = DatabaseSettings::from_toml(&format!(
        "default = \"app\"\n\n[migrations]\ntable = \"schema_versions\"\npath = \"{}\"\n\n[connections.app]\ndriver = \"sqlite\"\ndatabase = \"{}\"\n",
        units.display(),
        dir.path().join("app.db").display(),
    ))
    .unwrap();
    let mut manager = quarry::manager(settings.clone());
    let migrator = Migrator::from_settings(&settings.migrations);

    let report = migrator.migrate(&mut manager, MigrateOptions::new()).unwrap();
    assert_eq!(report.migrations.len(), 2);

    let conn = manager.connection(None).unwrap();
    let batches = conn.table("schema_versions").pluck(conn, "batch").unwrap();
    assert_eq!(batches, vec![Value::Int(1), Value::Int(1)]);
    assert!(Schema::new(conn).has_column("users", "email").unwrap());

    let rolled = migrator.rollback(&mut manager, RollbackOptions::new().step(1)).unwrap();
    assert_eq!(
        rolled.migrations,
        vec!["2024_01_02_add_email_to_users", "2024_01_01_create_users"]
    );

    let status = migrator.status(&mut manager).unwrap();
    assert!(status.applied().is_empty());
    assert_eq!(status.pending().len(), 2);
}
