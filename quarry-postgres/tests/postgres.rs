//! Live PostgreSQL checks. Set `POSTGRES_URL` to run them; they pass vacuously otherwise.

use pretty_assertions::assert_eq;
use quarry_postgres::PgConnector;
use quarry_query::{Connection, ConnectionConfig, QueryError, Value};
use std::sync::Arc;

fn connect() -> Option<Connection> {
    let url = std::env::var("POSTGRES_URL").ok()?;
    let config = ConnectionConfig::from_url(&url).ok()?;
    Some(Connection::open("pgsql", config, Arc::new(PgConnector)).unwrap())
}

fn reset(conn: &mut Connection, table: &str) {
    conn.unprepared(&format!("drop table if exists {table}")).unwrap();
    conn.unprepared(&format!(
        "create table {table} (id bigserial primary key, email varchar(255) not null unique, \
         votes integer not null default 0, score numeric(8, 2), meta jsonb)"
    ))
    .unwrap();
}

#[test]
fn test_insert_get_id_and_typed_columns() {
    let Some(mut conn) = connect() else { return };
    reset(&mut conn, "quarry_pg_typed");

    let id = conn
        .table("quarry_pg_typed")
        .insert_get_id(
            &mut conn,
            [
                ("email", Value::from("a@x.io")),
                ("votes", Value::Int(3)),
                ("score", Value::Float(9.5)),
                ("meta", Value::Json(serde_json::json!({"tier": "gold"}))),
            ],
        )
        .unwrap();
    assert_eq!(id, 1);

    let row = conn.table("quarry_pg_typed").find(&mut conn, id).unwrap().unwrap();
    assert_eq!(row.get_i64("votes").unwrap(), 3);
    assert_eq!(row.get_str("score").unwrap(), "9.50");
    assert_eq!(row.get("meta"), Some(&Value::Json(serde_json::json!({"tier": "gold"}))));
    assert_eq!(conn.last_insert_id().unwrap(), Some(1));

    conn.unprepared("drop table quarry_pg_typed").unwrap();
}

#[test]
fn test_upsert_and_transaction_rollback() {
    let Some(mut conn) = connect() else { return };
    reset(&mut conn, "quarry_pg_tx");

    conn.table("quarry_pg_tx").insert(&mut conn, [("email", "a@x.io")]).unwrap();
    conn.table("quarry_pg_tx")
        .upsert(
            &mut conn,
            [("email", Value::from("a@x.io")), ("votes", Value::Int(5))],
            ["email"],
            [("votes", Value::Int(5))],
        )
        .unwrap();
    let votes = conn.table("quarry_pg_tx").value(&mut conn, "votes").unwrap();
    assert_eq!(votes, Some(Value::Int(5)));

    let result: Result<(), QueryError> = conn.transaction(|conn| {
        conn.table("quarry_pg_tx").delete(conn)?;
        Err(QueryError::internal("abort"))
    });
    assert!(result.is_err());
    assert_eq!(conn.table("quarry_pg_tx").count(&mut conn).unwrap(), 1);

    conn.unprepared("drop table quarry_pg_tx").unwrap();
}
