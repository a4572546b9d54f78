use super::*;
use serde_json::json;
use tempfile::TempDir;

async fn create_test_backend() -> Result<(TempDir, SqliteBackend)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("shop.db");
    let backend = SqliteBackend::connect(&format!("sqlite://{}", db_path.display())).await?;

    for statement in [
        "CREATE TABLE customers (id INTEGER PRIMARY KEY AUTOINCREMENT, name VARCHAR(50) NOT NULL, email TEXT)",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER NOT NULL REFERENCES customers(id), total REAL DEFAULT 0, note BLOB)",
        "CREATE TABLE order_tags (order_id INTEGER, tag TEXT, PRIMARY KEY (order_id, tag), FOREIGN KEY (order_id) REFERENCES orders)",
    ] {
        sqlx::query(statement).execute(backend.pool()).await?;
    }

    Ok((temp_dir, backend))
}

#[tokio::test]
async fn lists_user_tables_sorted() -> Result<()> {
    let (_temp_dir, backend) = create_test_backend().await?;

    // AUTOINCREMENT creates sqlite_sequence, which must stay hidden
    let tables = backend.table_names().await?;
    assert_eq!(tables, vec!["customers", "order_tags", "orders"]);

    Ok(())
}

#[tokio::test]
async fn column_metadata() -> Result<()> {
    let (_temp_dir, backend) = create_test_backend().await?;

    let columns = backend.columns("customers").await?;
    assert_eq!(columns.len(), 3);

    assert_eq!(columns[0].name, "id");
    assert_eq!(columns[0].data_type, "INTEGER");
    assert!(columns[0].autoincrement);

    assert_eq!(columns[1].data_type, "VARCHAR(50)");
    assert!(!columns[1].nullable);
    assert!(!columns[1].autoincrement);

    assert!(columns[2].nullable);

    let order_columns = backend.columns("orders").await?;
    assert!(!order_columns[0].autoincrement);
    assert_eq!(order_columns[2].default.as_deref(), Some("0"));

    Ok(())
}

#[tokio::test]
async fn primary_and_foreign_keys() -> Result<()> {
    let (_temp_dir, backend) = create_test_backend().await?;

    assert_eq!(backend.primary_key("order_tags").await?, vec!["order_id", "tag"]);

    let keys = backend.foreign_keys("orders").await?;
    assert_eq!(
        keys,
        vec![ForeignKey {
            constrained_columns: vec!["customer_id".to_string()],
            referred_table: "customers".to_string(),
            referred_columns: vec!["id".to_string()],
        }]
    );

    // REFERENCES without a column list points at the primary key
    let implicit = backend.foreign_keys("order_tags").await?;
    assert_eq!(implicit[0].referred_columns, vec!["id"]);

    Ok(())
}

#[tokio::test]
async fn unknown_table_has_no_columns() -> Result<()> {
    let (_temp_dir, backend) = create_test_backend().await?;

    assert!(backend.columns("missing").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn execute_reports_affected_rows() -> Result<()> {
    let (_temp_dir, backend) = create_test_backend().await?;

    let params = json!({"name": "Ada", "email": null});
    let outcome = backend
        .execute(
            "INSERT INTO customers (name, email) VALUES (:name, :email)",
            params.as_object().expect("object"),
        )
        .await?;
    assert_eq!(outcome, QueryOutcome::Affected(1));

    let outcome = backend
        .execute("UPDATE customers SET email = 'x@example.com'", &Params::new())
        .await?;
    assert_eq!(outcome, QueryOutcome::Affected(1));

    Ok(())
}

#[tokio::test]
async fn execute_decodes_storage_classes() -> Result<()> {
    let (_temp_dir, backend) = create_test_backend().await?;

    sqlx::query("INSERT INTO customers (name) VALUES ('Ada')")
        .execute(backend.pool())
        .await?;
    sqlx::query("INSERT INTO orders (customer_id, total, note) VALUES (1, 12.5, x'CAFE')")
        .execute(backend.pool())
        .await?;

    let outcome = backend
        .execute(
            "SELECT o.id, c.name, o.total, o.note, c.email FROM orders o JOIN customers c ON c.id = o.customer_id",
            &Params::new(),
        )
        .await?;

    let QueryOutcome::Rows { columns, rows } = outcome else {
        panic!("expected rows");
    };
    assert_eq!(columns, vec!["id", "name", "total", "note", "email"]);
    assert_eq!(
        rows,
        vec![vec![
            CellValue::Int(1),
            CellValue::Text("Ada".to_string()),
            CellValue::Float(12.5),
            CellValue::Bytes(vec![0xCA, 0xFE]),
            CellValue::Null,
        ]]
    );

    Ok(())
}

#[tokio::test]
async fn empty_select_still_returns_columns() -> Result<()> {
    let (_temp_dir, backend) = create_test_backend().await?;

    let outcome = backend
        .execute("SELECT id, name FROM customers WHERE id = :id", &{
            let mut params = Params::new();
            params.insert("id".to_string(), json!(99));
            params
        })
        .await?;

    assert_eq!(
        outcome,
        QueryOutcome::Rows {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: Vec::new(),
        }
    );

    Ok(())
}

#[tokio::test]
async fn in_memory_database_survives_between_calls() -> Result<()> {
    let backend = SqliteBackend::connect("sqlite://:memory:").await?;

    backend
        .execute("CREATE TABLE t (x INTEGER)", &Params::new())
        .await?;
    backend
        .execute("INSERT INTO t VALUES (1)", &Params::new())
        .await?;

    assert_eq!(backend.table_names().await?, vec!["t"]);
    assert!(!backend.server_version().await?.is_empty());

    Ok(())
}
