//! Live MySQL checks. Set `MYSQL_URL` to run them; they pass vacuously otherwise.

use pretty_assertions::assert_eq;
use quarry_mysql::MySqlConnector;
use quarry_query::{Connection, ConnectionConfig, Value};
use std::sync::Arc;

fn connect() -> Option<Connection> {
    let url = std::env::var("MYSQL_URL").ok()?;
    let config = ConnectionConfig::from_url(&url).ok()?;
    Some(Connection::open("mysql", config, Arc::new(MySqlConnector)).unwrap())
}

#[test]
fn test_round_trip_and_last_insert_id() {
    let Some(mut conn) = connect() else { return };
    conn.unprepared("drop table if exists quarry_my_users").unwrap();
    conn.unprepared(
        "create table quarry_my_users (id bigint unsigned auto_increment primary key, \
         email varchar(255) not null unique, score decimal(8, 2), born date, meta json)",
    )
    .unwrap();

    let id = conn
        .table("quarry_my_users")
        .insert_get_id(
            &mut conn,
            [
                ("email", Value::from("a@x.io")),
                ("score", Value::Float(9.5)),
                ("born", Value::from("1990-04-01")),
                ("meta", Value::Json(serde_json::json!({"tier": "gold"}))),
            ],
        )
        .unwrap();
    assert_eq!(id, 1);

    let row = conn.table("quarry_my_users").find(&mut conn, id).unwrap().unwrap();
    assert_eq!(row.get_str("score").unwrap(), "9.50");
    assert!(matches!(row.get("born"), Some(Value::Date(_))));
    assert_eq!(row.get("meta"), Some(&Value::Json(serde_json::json!({"tier": "gold"}))));

    conn.table("quarry_my_users")
        .upsert(
            &mut conn,
            [("email", Value::from("a@x.io")), ("score", Value::Float(1.0))],
            ["email"],
            Vec::<(&str, Value)>::new(),
        )
        .unwrap();
    assert_eq!(conn.table("quarry_my_users").count(&mut conn).unwrap(), 1);

    conn.unprepared("drop table quarry_my_users").unwrap();
}
