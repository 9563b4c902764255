//! Seeded SQLite database and dataset catalog on disk

use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::TempDir;

const SCHEMA: &str = "
CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT NOT NULL, category TEXT NOT NULL);
CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    province TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    total REAL NOT NULL
);
CREATE TABLE order_items (
    order_id INTEGER NOT NULL REFERENCES orders (id),
    product_id INTEGER NOT NULL REFERENCES products (id),
    quantity INTEGER NOT NULL,
    unit_price REAL NOT NULL
);

INSERT INTO products (id, name, category) VALUES
    (1, 'Kopi Susu', 'drinks'),
    (2, 'Teh Tarik', 'drinks'),
    (3, 'Roti Bakar', 'food');

INSERT INTO orders (id, province, status, created_at, total) VALUES
    (1, 'Jakarta', 'paid', '2024-01-15', 60.0),
    (2, 'Jakarta', 'paid', '2024-02-03', 25.0),
    (3, 'Bali', 'paid', '2024-02-20', 40.0),
    (4, 'Banten', 'cancelled', '2024-03-11', 15.0),
    (5, 'Bali', 'paid', '2023-12-30', 30.0);

INSERT INTO order_items (order_id, product_id, quantity, unit_price) VALUES
    (1, 1, 4, 10.0),
    (1, 3, 2, 10.0),
    (2, 2, 5, 5.0),
    (3, 1, 4, 10.0),
    (4, 2, 3, 5.0),
    (5, 3, 3, 10.0);
";

const CATALOG: &str = r#"
version = 1

[[datasets]]
id = "topProducts"
description = "Best-selling products by revenue"
query = """
SELECT p.name AS product, SUM(oi.quantity) AS units, SUM(oi.quantity * oi.unit_price) AS revenue
FROM order_items oi
JOIN products p ON p.id = oi.product_id
JOIN orders o ON o.id = oi.order_id
WHERE (?1 IS NULL OR CAST(strftime('%Y', o.created_at) AS INTEGER) = ?1)
  AND o.status = 'paid'
GROUP BY p.name
ORDER BY revenue DESC
"""

[[datasets.filters]]
key = "year"
kind = "year"

[[datasets]]
id = "cancelledOrders"
query = "SELECT province, total FROM orders WHERE status = 'cancelled' AND (?1 IS NULL OR province = ?1)"

[[datasets.filters]]
key = "province"
kind = "text"
"#;

/// A shop database plus its catalog, removed on drop
pub struct SeededStore {
    dir: TempDir,
}

impl SeededStore {
    /// Create and seed the database, then write the catalog next to it
    pub async fn create() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(dir.path().join("shop.db"))
                    .create_if_missing(true),
            )
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&writer).await?;
        writer.close().await;

        std::fs::write(dir.path().join("catalog.toml"), CATALOG)?;

        Ok(Self { dir })
    }

    /// Store URL for the seeded database
    pub fn url(&self) -> String {
        format!("sqlite://{}", self.path().join("shop.db").display())
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.path().join("catalog.toml")
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}
