use captains_db::{create_pool, open_database, run_migrations, DbRuntimeSettings, MIGRATION_COUNT};

#[test]
fn db_initialization_creates_log_tables() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("captains.db");
    let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default())
        .expect("failed to create pool");
    let conn = pool.get().expect("failed to get connection");
    let applied = run_migrations(&conn).expect("failed to run migrations");
    assert_eq!(applied, MIGRATION_COUNT);

    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type='table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .expect("failed to prepare table query");
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .expect("failed to execute table query")
        .map(|r| r.expect("failed to read table name"))
        .collect();

    assert_eq!(tables, vec!["_captains_migrations", "log_entries", "watermarks"]);
}

#[test]
fn reopening_a_database_keeps_its_rows() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("captains.db");
    let path = path.to_str().unwrap();

    {
        let pool = open_database(path, DbRuntimeSettings::default()).expect("first open");
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO log_entries (timestamp, username, project, message)
             VALUES ('2024-01-01T00:00:00.000Z', 'alice', 'demo', 'hello')",
            [],
        )
        .unwrap();
    }

    let pool = open_database(path, DbRuntimeSettings::default()).expect("second open");
    let conn = pool.get().unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM log_entries", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}
