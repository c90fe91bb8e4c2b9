use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::{DbError, Result};
use crate::storage::{DbFile, HeapFile};
use crate::tuple::{Column, FieldType, Schema};

struct Table {
    file: Arc<dyn DbFile>,
    name: String,
    primary_key: Option<String>,
}

/// The catalog keeps track of every table in the database: id to file and
/// schema, name to id. It is populated at startup (programmatically or
/// from a catalog text file) and read concurrently afterwards; writers
/// exclude readers through the RwLocks.
#[derive(Default)]
pub struct Catalog {
    tables: RwLock<HashMap<u32, Table>>,
    names: RwLock<HashMap<String, u32>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table under a human name. The table id is the file id.
    /// A name collision keeps the most recent registration.
    pub fn add_table(
        &self,
        file: Arc<dyn DbFile>,
        name: impl Into<String>,
        primary_key: Option<String>,
    ) {
        let name = name.into();
        let id = file.id();
        let mut tables = self.tables.write();
        let mut names = self.names.write();
        tables.insert(
            id,
            Table {
                file,
                name: name.clone(),
                primary_key,
            },
        );
        names.insert(name, id);
    }

    /// Returns the id of the table with the given name.
    pub fn table_id(&self, name: &str) -> Result<u32> {
        self.names
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| DbError::NoSuchTable(name.to_string()))
    }

    /// Returns the file backing the table with the given id.
    pub fn file(&self, table_id: u32) -> Result<Arc<dyn DbFile>> {
        self.tables
            .read()
            .get(&table_id)
            .map(|t| t.file.clone())
            .ok_or(DbError::NoSuchTableId(table_id))
    }

    /// Returns the schema of the table with the given id.
    pub fn schema(&self, table_id: u32) -> Result<Arc<Schema>> {
        self.tables
            .read()
            .get(&table_id)
            .map(|t| t.file.schema().clone())
            .ok_or(DbError::NoSuchTableId(table_id))
    }

    /// Returns the name of the table with the given id.
    pub fn table_name(&self, table_id: u32) -> Result<String> {
        self.tables
            .read()
            .get(&table_id)
            .map(|t| t.name.clone())
            .ok_or(DbError::NoSuchTableId(table_id))
    }

    /// Returns the primary key field name of the table, if one was declared.
    pub fn primary_key(&self, table_id: u32) -> Result<Option<String>> {
        self.tables
            .read()
            .get(&table_id)
            .map(|t| t.primary_key.clone())
            .ok_or(DbError::NoSuchTableId(table_id))
    }

    /// Returns the ids of every registered table.
    pub fn table_ids(&self) -> Vec<u32> {
        self.tables.read().keys().copied().collect()
    }

    /// Loads table definitions from a catalog text file.
    ///
    /// One table per line: `name (field1 type1 [pk], field2 type2, ...)`,
    /// types `int` / `string` case-insensitive. Each table's data lives in
    /// `<name>.dat` next to the catalog file. Returns the loaded names.
    pub fn load_schema<P: AsRef<Path>>(&self, catalog_path: P) -> Result<Vec<String>> {
        let catalog_path = catalog_path.as_ref();
        let base_dir = catalog_path.parent().unwrap_or_else(|| Path::new("."));
        let reader = BufReader::new(File::open(catalog_path)?);

        let mut loaded = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (name, columns, primary_key) = parse_table_line(line)?;
            let schema = Arc::new(Schema::new(columns));
            let file = HeapFile::create(base_dir.join(format!("{name}.dat")), schema)?;
            self.add_table(Arc::new(file), name.clone(), primary_key);
            loaded.push(name);
        }
        Ok(loaded)
    }
}

fn parse_table_line(line: &str) -> Result<(String, Vec<Column>, Option<String>)> {
    let open = line
        .find('(')
        .ok_or_else(|| DbError::Db(format!("malformed catalog line: '{line}'")))?;
    let close = line
        .rfind(')')
        .filter(|&c| c > open)
        .ok_or_else(|| DbError::Db(format!("malformed catalog line: '{line}'")))?;

    let name = line[..open].trim().to_string();
    if name.is_empty() {
        return Err(DbError::Db(format!("missing table name: '{line}'")));
    }

    let mut columns = Vec::new();
    let mut primary_key = None;
    for column_def in line[open + 1..close].split(',') {
        let mut parts = column_def.split_whitespace();
        let field_name = parts
            .next()
            .ok_or_else(|| DbError::Db(format!("empty column definition in '{line}'")))?;
        let type_name = parts
            .next()
            .ok_or_else(|| DbError::Db(format!("field '{field_name}' has no type")))?;
        let field_type = FieldType::parse(type_name)?;
        if let Some(modifier) = parts.next() {
            if modifier.eq_ignore_ascii_case("pk") {
                primary_key = Some(field_name.to_string());
            } else {
                return Err(DbError::Db(format!("unknown field modifier '{modifier}'")));
            }
        }
        columns.push(Column::new(field_type, Some(field_name.to_string())));
    }
    if columns.is_empty() {
        return Err(DbError::Db(format!("table '{name}' has no fields")));
    }
    Ok((name, columns, primary_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_table_line() {
        let (name, columns, pk) =
            parse_table_line("users (id int pk, name string, age INT)").unwrap();
        assert_eq!(name, "users");
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].field_type(), FieldType::Int);
        assert_eq!(columns[1].field_type(), FieldType::Str);
        assert_eq!(columns[2].name(), Some("age"));
        assert_eq!(pk.as_deref(), Some("id"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_table_line("no parens here").is_err());
        assert!(parse_table_line("t (x float)").is_err());
        assert!(parse_table_line("t ()").is_err());
    }

    #[test]
    fn test_load_schema_registers_tables() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("catalog.txt");
        let mut f = File::create(&catalog_path).unwrap();
        writeln!(f, "users (id int pk, name string)").unwrap();
        writeln!(f, "orders (id int, user_id int)").unwrap();
        drop(f);

        let catalog = Catalog::new();
        let loaded = catalog.load_schema(&catalog_path).unwrap();
        assert_eq!(loaded, vec!["users", "orders"]);

        let users_id = catalog.table_id("users").unwrap();
        assert_eq!(catalog.table_name(users_id).unwrap(), "users");
        assert_eq!(catalog.primary_key(users_id).unwrap().as_deref(), Some("id"));
        assert_eq!(catalog.schema(users_id).unwrap().num_fields(), 2);
        assert!(dir.path().join("users.dat").exists());
        // A fresh table starts with one empty page on disk.
        assert_eq!(catalog.file(users_id).unwrap().num_pages().unwrap(), 1);

        assert!(matches!(
            catalog.table_id("missing"),
            Err(DbError::NoSuchTable(_))
        ));
    }

    #[test]
    fn test_name_collision_keeps_latest() {
        let dir = tempfile::tempdir().unwrap();
        let schema = Arc::new(Schema::of(&[FieldType::Int]));
        let f1 = Arc::new(HeapFile::create(dir.path().join("a.dat"), schema.clone()).unwrap());
        let f2 = Arc::new(HeapFile::create(dir.path().join("b.dat"), schema).unwrap());

        let catalog = Catalog::new();
        catalog.add_table(f1, "t", None);
        catalog.add_table(f2.clone(), "t", None);
        assert_eq!(catalog.table_id("t").unwrap(), f2.id());
    }
}
