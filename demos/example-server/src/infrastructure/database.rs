use dashmap::DashMap;
use switchyard::DeriveInjectable;

/// In-memory table store.
#[derive(Default, DeriveInjectable)]
pub struct Database {
    tables: DashMap<String, DashMap<String, String>>,
}

impl Database {
    pub fn insert(&self, table: &str, id: &str, data: String) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), data);
    }

    pub fn get(&self, table: &str, id: &str) -> Option<String> {
        self.tables
            .get(table)
            .and_then(|rows| rows.get(id).map(|row| row.clone()))
    }

    pub fn scan(&self, table: &str) -> Vec<String> {
        self.tables
            .get(table)
            .map(|rows| rows.iter().map(|row| row.value().clone()).collect())
            .unwrap_or_default()
    }
}
