//! Query builder and transactions against an in-memory SQLite database.

use pretty_assertions::assert_eq;
use quarry_query::{Connection, ConnectionConfig, QueryError, Value};
use quarry_sqlite::SqliteConnector;
use std::sync::Arc;

fn setup() -> Connection {
    let mut conn =
        Connection::open("sqlite", ConnectionConfig::sqlite_memory(), Arc::new(SqliteConnector)).unwrap();
    conn.unprepared(
        "create table users (id integer primary key autoincrement, email varchar not null unique, \
         votes integer not null default 0, name varchar)",
    )
    .unwrap();
    conn
}

fn seed(conn: &mut Connection) {
    conn.table("users")
        .insert_many(
            conn,
            vec![
                vec![("email", Value::from("a@x.io")), ("votes", Value::Int(3))],
                vec![("email", Value::from("b@x.io")), ("votes", Value::Int(10))],
                vec![("email", Value::from("c@x.io")), ("votes", Value::Int(7))],
            ],
        )
        .unwrap();
}

#[test]
fn test_insert_get_id_and_find() {
    let mut conn = setup();
    let id = conn
        .table("users")
        .insert_get_id(&mut conn, [("email", "first@x.io")])
        .unwrap();
    assert_eq!(id, 1);

    let row = conn.table("users").find(&mut conn, id).unwrap().unwrap();
    assert_eq!(row.get_str("email").unwrap(), "first@x.io");
    assert_eq!(row.get_i64("votes").unwrap(), 0);
}

#[test]
fn test_filters_ordering_and_aggregates() {
    let mut conn = setup();
    seed(&mut conn);

    let emails = conn
        .table("users")
        .where_op("votes", ">", 5)
        .order_by_desc("votes")
        .pluck(&mut conn, "email")
        .unwrap();
    assert_eq!(emails, vec![Value::from("b@x.io"), Value::from("c@x.io")]);

    let none = conn
        .table("users")
        .where_in("id", Vec::<i64>::new())
        .count(&mut conn)
        .unwrap();
    assert_eq!(none, 0);

    assert!(conn.table("users").where_null("name").exists(&mut conn).unwrap());
    let page = conn.table("users").order_by("id").offset(1).get(&mut conn).unwrap();
    assert_eq!(page.len(), 2);
}

#[test]
fn test_update_increment_delete_truncate() {
    let mut conn = setup();
    seed(&mut conn);

    let updated = conn
        .table("users")
        .r#where("email", "a@x.io")
        .update(&mut conn, [("name", "Ada")])
        .unwrap();
    assert_eq!(updated, 1);

    conn.table("users").increment(&mut conn, "votes", 2).unwrap();
    let votes = conn
        .table("users")
        .r#where("email", "a@x.io")
        .value(&mut conn, "votes")
        .unwrap();
    assert_eq!(votes, Some(Value::Int(5)));

    let deleted = conn.table("users").where_op("votes", "<", 6).delete(&mut conn).unwrap();
    assert_eq!(deleted, 1);

    conn.table("users").truncate(&mut conn).unwrap();
    assert_eq!(conn.table("users").count(&mut conn).unwrap(), 0);
    let id = conn
        .table("users")
        .insert_get_id(&mut conn, [("email", "fresh@x.io")])
        .unwrap();
    assert_eq!(id, 1);
}

#[test]
fn test_upsert_updates_on_conflict() {
    let mut conn = setup();
    seed(&mut conn);

    conn.table("users")
        .upsert(
            &mut conn,
            [("email", Value::from("a@x.io")), ("votes", Value::Int(99))],
            ["email"],
            [("votes", Value::Int(99))],
        )
        .unwrap();
    let votes = conn
        .table("users")
        .r#where("email", "a@x.io")
        .value(&mut conn, "votes")
        .unwrap();
    assert_eq!(votes, Some(Value::Int(99)));
    assert_eq!(conn.table("users").count(&mut conn).unwrap(), 3);
}

#[test]
fn test_transaction_rolls_back_on_error() {
    let mut conn = setup();

    let result: Result<(), QueryError> = conn.transaction(|conn| {
        conn.table("users").insert(conn, [("email", "t@x.io")])?;
        Err(QueryError::internal("abort"))
    });
    assert!(result.is_err());
    assert_eq!(conn.transaction_level(), 0);
    assert_eq!(conn.table("users").count(&mut conn).unwrap(), 0);
}

#[test]
fn test_nested_savepoint_rollback_keeps_outer_work() {
    let mut conn = setup();

    conn.begin_transaction().unwrap();
    conn.table("users").insert(&mut conn, [("email", "outer@x.io")]).unwrap();
    conn.begin_transaction().unwrap();
    conn.table("users").insert(&mut conn, [("email", "inner@x.io")]).unwrap();
    assert_eq!(conn.transaction_level(), 2);

    conn.rollback(None).unwrap();
    assert_eq!(conn.transaction_level(), 1);
    conn.commit().unwrap();

    let emails = conn.table("users").pluck(&mut conn, "email").unwrap();
    assert_eq!(emails, vec![Value::from("outer@x.io")]);
}

#[test]
fn test_unique_violation_is_not_retried() {
    let mut conn = setup();
    seed(&mut conn);

    let err = conn
        .table("users")
        .insert(&mut conn, [("email", "a@x.io")])
        .unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.context.sql.as_deref().is_some_and(|sql| sql.starts_with("insert into")));
}
