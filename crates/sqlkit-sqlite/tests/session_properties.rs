use sqlkit_sqlite::{
    Error, ErrorKind, OpenFlags, SqliteConfig, SqliteConnection, StatementKind, params,
};
use sqlkit_core::error::QueryErrorKind;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn store_path(dir: &TempDir) -> String {
    dir.path()
        .join("test.db")
        .to_str()
        .expect("utf-8 temp path")
        .to_string()
}

fn open_foo(path: &str) -> SqliteConnection {
    let conn = SqliteConnection::open_file(path).expect("open store");
    conn.execute(
        "create table if not exists foo(id int PRIMARY KEY, name string)",
        &[],
    )
    .expect("create table");
    conn
}

fn ids(conn: &SqliteConnection) -> Vec<i64> {
    conn.query("select id from foo order by id", &[])
        .expect("query ids")
        .mapped::<(i64,)>()
        .map(|r| r.map(|(id,)| id))
        .collect::<Result<_, _>>()
        .expect("scan ids")
}

#[test]
fn reopening_a_store_sees_existing_data() {
    let dir = TempDir::new().expect("temp dir");
    let path = store_path(&dir);

    let conn = open_foo(&path);
    conn.execute("insert into foo values(42, 'meaning of life')", &[])
        .expect("insert");
    conn.close().expect("close");
    assert!(Path::new(&path).exists());

    let conn = open_foo(&path);
    let (id, name): (i64, String) = conn
        .query_row("select id, name from foo", &[])
        .expect("row survives reopen")
        .scan()
        .expect("scan");
    assert_eq!((id, name.as_str()), (42, "meaning of life"));
    conn.close().expect("close");
}

#[test]
fn duplicate_primary_key_is_a_constraint_violation() {
    let conn = SqliteConnection::open_memory().expect("open");
    conn.execute("create table foo(id int PRIMARY KEY, name string)", &[])
        .expect("create");
    conn.execute("insert into foo values(42, 'meaning of life')", &[])
        .expect("first insert");

    let err = conn
        .execute("insert into foo values(42, 'something else')", &[])
        .expect_err("duplicate key must fail");
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    match &err {
        Error::Query(q) => {
            assert_eq!(q.kind, QueryErrorKind::Constraint);
            assert!(q.is_unique_violation());
        }
        other => panic!("expected query error, got {other:?}"),
    }

    let name: String = conn
        .query_row("select name from foo where id = ?", &params![42])
        .expect("row")
        .get_as(0)
        .expect("name");
    assert_eq!(name, "meaning of life");
}

#[test]
fn update_reports_rows_affected() {
    let conn = SqliteConnection::open_memory().expect("open");
    conn.execute("create table foo(id int PRIMARY KEY, name string)", &[])
        .expect("create");
    conn.execute("insert into foo values(42, 'meaning of life')", &[])
        .expect("insert 42");

    let only_one = conn
        .execute("UPDATE foo SET name='meaning of life' WHERE name='meaning of life'", &[])
        .expect("update one");
    assert_eq!(only_one.kind(), StatementKind::Update);
    assert_eq!(only_one.rows_affected().expect("count"), 1);

    assert!(conn
        .execute("insert into foo values(42, 'meaning of life')", &[])
        .is_err());
    conn.execute("insert into foo values(43, 'meaning of life')", &[])
        .expect("insert 43");

    let both = conn
        .execute("UPDATE foo SET name='mol' WHERE name='meaning of life'", &[])
        .expect("update two");
    assert_eq!(both.rows_affected().expect("count"), 2);
}

#[test]
fn ddl_has_no_rows_affected() {
    let conn = SqliteConnection::open_memory().expect("open");
    let res = conn
        .execute("create table foo(id int PRIMARY KEY, name string)", &[])
        .expect("create");
    assert_eq!(res.kind(), StatementKind::Ddl);
    let err = res.rows_affected().expect_err("ddl has no count");
    assert!(matches!(err, Error::Unsupported(_)));
}

#[test]
fn writing_cte_reports_rows_affected() {
    let conn = SqliteConnection::open_memory().expect("open");
    conn.execute("create table foo(id int PRIMARY KEY, name string)", &[])
        .expect("create");

    let res = conn
        .execute(
            "WITH n(i) AS (VALUES (1), (2), (3)) INSERT INTO foo SELECT i, 'n' FROM n",
            &[],
        )
        .expect("insert from cte");
    assert_eq!(res.kind(), StatementKind::Insert);
    assert_eq!(res.rows_affected().expect("count"), 3);
}

#[test]
fn rolled_back_statement_has_no_effect() {
    let conn = SqliteConnection::open_memory().expect("open");
    conn.execute("create table foo(id int PRIMARY KEY, name string)", &[])
        .expect("create");

    let tx = conn.begin().expect("begin");
    let mut stmt = conn.prepare("insert into foo values(?, ?)").expect("prepare");
    tx.stmt(&mut stmt)
        .expect("bind to tx")
        .execute(&params![666, "not happening"])
        .expect("insert in tx");
    tx.rollback().expect("rollback");
    drop(stmt);

    assert!(ids(&conn).is_empty());
}

#[test]
fn committed_statement_is_visible_only_after_commit() {
    let dir = TempDir::new().expect("temp dir");
    let path = store_path(&dir);
    let writer = open_foo(&path);
    let reader = SqliteConnection::open_file(path.as_str()).expect("second session");

    let tx = writer.begin().expect("begin");
    let mut stmt = writer
        .prepare("insert into foo values(?, ?)")
        .expect("prepare");
    let res = tx
        .stmt(&mut stmt)
        .expect("bind to tx")
        .execute(&params![999, "happening"])
        .expect("insert in tx");
    assert_eq!(res.rows_affected().expect("count"), 1);

    let (before,): (i64,) = reader
        .query_row("select count(*) from foo where id = 999", &[])
        .expect("count before commit")
        .scan()
        .expect("scan");
    assert_eq!(before, 0);

    tx.commit().expect("commit");
    drop(stmt);

    let (after,): (i64,) = reader
        .query_row("select count(*) from foo where id = 999", &[])
        .expect("count after commit")
        .scan()
        .expect("scan");
    assert_eq!(after, 1);
}

#[test]
fn iteration_yields_each_row_once() {
    let conn = SqliteConnection::open_memory().expect("open");
    conn.execute_batch(
        "create table foo(id int PRIMARY KEY, name string);
         insert into foo values(42, 'mol');
         insert into foo values(43, 'mol');
         insert into foo values(31337, 'so leet');",
    )
    .expect("seed");

    let mut rows = conn.query("select * from foo", &[]).expect("query");
    let mut seen = Vec::new();
    let mut steps = 0;
    while rows.next().expect("next") {
        steps += 1;
        let (id, _name): (i64, String) = rows.scan().expect("scan");
        seen.push(id);
    }
    assert_eq!(steps, 3);
    seen.sort_unstable();
    assert_eq!(seen, [42, 43, 31337]);
    assert!(!rows.next().expect("still exhausted"));
}

#[test]
fn parameterized_round_trip() {
    let conn = SqliteConnection::open_memory().expect("open");
    conn.execute("create table foo(id int PRIMARY KEY, name string)", &[])
        .expect("create");

    conn.execute("insert into foo values(?, ?)", &params![31337, "so leet"])
        .expect("insert");
    let (id, name): (i64, String) = conn
        .query_row("select id, name from foo where id = ?", &params![31337])
        .expect("row")
        .scan()
        .expect("scan");
    assert_eq!((id, name.as_str()), (31337, "so leet"));

    let missing = conn
        .query_row("select id from foo where id = ?", &params![1])
        .expect_err("no row");
    assert_eq!(missing.kind(), ErrorKind::NoRows);
}

#[test]
fn numeric_looking_names_round_trip() {
    let conn = SqliteConnection::open_memory().expect("open");
    conn.execute("create table foo(id int PRIMARY KEY, name string)", &[])
        .expect("create");

    for (id, name) in [(7, "42"), (8, "3.5"), (9, "-12345678901")] {
        conn.execute("insert into foo values(?, ?)", &params![id, name])
            .expect("insert");
        let (got_id, got_name): (i64, String) = conn
            .query_row("select id, name from foo where id = ?", &params![id])
            .expect("row")
            .scan()
            .expect("scan numeric name as text");
        assert_eq!((got_id, got_name.as_str()), (i64::from(id), name));
    }

    // The column has numeric affinity, so the engine kept a number
    let (stored,): (String,) = conn
        .query_row("select typeof(name) from foo where id = 7", &[])
        .expect("typeof")
        .scan()
        .expect("scan");
    assert_eq!(stored, "integer");
}

#[test]
fn syntax_errors_are_classified() {
    let conn = SqliteConnection::open_memory().expect("open");
    let err = conn
        .execute("creat table foo(id int)", &[])
        .expect_err("typo");
    assert_eq!(err.kind(), ErrorKind::SyntaxError);

    let err = conn.prepare("select * from").expect_err("incomplete");
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
}

#[test]
fn open_failure_is_reported() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("missing").join("test.db");
    let err = SqliteConnection::open_file(path.to_str().expect("utf-8 temp path"))
        .expect_err("parent directory does not exist");
    assert_eq!(err.kind(), ErrorKind::OpenFailure);

    let config = SqliteConfig::file(store_path(&dir)).flags(OpenFlags::read_write());
    let err = SqliteConnection::open(&config).expect_err("no create flag");
    assert_eq!(err.kind(), ErrorKind::OpenFailure);
}

#[test]
fn read_only_store_rejects_writes() {
    let dir = TempDir::new().expect("temp dir");
    let path = store_path(&dir);
    open_foo(&path).close().expect("close");

    let config = SqliteConfig::file(path.as_str()).flags(OpenFlags::read_only());
    let conn = SqliteConnection::open(&config).expect("open read-only");
    assert!(ids(&conn).is_empty());

    match conn.execute("insert into foo values(1, 'a')", &[]) {
        Err(Error::Query(q)) => assert_eq!(q.kind, QueryErrorKind::ReadOnly),
        other => panic!("expected read-only error, got {other:?}"),
    }
}

#[test]
fn session_is_shared_across_threads() {
    let conn = Arc::new(SqliteConnection::open_memory().expect("open"));
    conn.execute("create table foo(id int PRIMARY KEY, name string)", &[])
        .expect("create");

    std::thread::scope(|s| {
        for worker in 0..4_i64 {
            let conn = Arc::clone(&conn);
            s.spawn(move || {
                for n in 0..25_i64 {
                    conn.execute(
                        "insert into foo values(?, ?)",
                        &params![worker * 100 + n, format!("worker {worker}")],
                    )
                    .expect("insert from worker");
                }
            });
        }
    });

    assert_eq!(ids(&conn).len(), 100);
}
