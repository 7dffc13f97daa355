//! Schema types and the coordinator's on-disk catalog
//!
//! A schema maps collection name → index name → index path. The index
//! name is always the path segments joined with [`INDEX_PATH_SEPARATOR`].
//! The catalog is a JSON copy of the schema kept under the data directory.

use crate::common::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Index name → ordered path segments
pub type IndexMap = BTreeMap<String, Vec<String>>;

/// Collection name → indexes
pub type SchemaMap = BTreeMap<String, IndexMap>;

pub const INDEX_PATH_SEPARATOR: &str = ".";

const CATALOG_FILE: &str = "schema.json";

/// Name under which an index on `path` is registered
pub fn index_name(path: &[String]) -> String {
    path.join(INDEX_PATH_SEPARATOR)
}

/// Split a dotted path ("address.city") into segments
pub fn parse_index_path(path: &str) -> Result<Vec<String>> {
    let segments: Vec<String> = path
        .split(INDEX_PATH_SEPARATOR)
        .map(str::to_string)
        .collect();
    for segment in &segments {
        validate_name("index path segment", segment)?;
    }
    Ok(segments)
}

/// Collection names and path segments must be usable as file names on a
/// partition and must not contain the index separator.
pub fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidSchema(format!("{} cannot be empty", what)));
    }
    if name.len() > 255 {
        return Err(Error::InvalidSchema(format!(
            "{} too long (max 255 bytes): {}",
            what, name
        )));
    }
    if name.contains('/')
        || name.contains(INDEX_PATH_SEPARATOR)
        || name.chars().any(|c| c.is_control())
    {
        return Err(Error::InvalidSchema(format!(
            "{} contains invalid characters: {:?}",
            what, name
        )));
    }
    Ok(())
}

pub fn validate_schema(schema: &SchemaMap) -> Result<()> {
    for (collection, indexes) in schema {
        validate_name("collection name", collection)?;
        for (name, path) in indexes {
            if path.is_empty() {
                return Err(Error::InvalidSchema(format!(
                    "index {:?} of collection {} has an empty path",
                    name, collection
                )));
            }
            for segment in path {
                validate_name("index path segment", segment)?;
            }
            if *name != index_name(path) {
                return Err(Error::InvalidSchema(format!(
                    "index {:?} of collection {} does not match its path {:?}",
                    name, collection, path
                )));
            }
        }
    }
    Ok(())
}

/// Add every collection and index of `other` that `target` lacks.
/// Returns the number of definitions added.
pub fn merge_schema(target: &mut SchemaMap, other: &SchemaMap) -> usize {
    let mut added = 0;
    for (collection, indexes) in other {
        let entry = target.entry(collection.clone()).or_insert_with(|| {
            added += 1;
            IndexMap::new()
        });
        for (name, path) in indexes {
            if !entry.contains_key(name) {
                entry.insert(name.clone(), path.clone());
                added += 1;
            }
        }
    }
    added
}

/// Human-readable first difference between two schemas
pub fn describe_difference(expected: &SchemaMap, actual: &SchemaMap) -> Option<String> {
    for collection in expected.keys() {
        if !actual.contains_key(collection) {
            return Some(format!("missing collection {}", collection));
        }
    }
    for (collection, indexes) in actual {
        let Some(expected_indexes) = expected.get(collection) else {
            return Some(format!("unexpected collection {}", collection));
        };
        for name in expected_indexes.keys() {
            if !indexes.contains_key(name) {
                return Some(format!("collection {} is missing index {}", collection, name));
            }
        }
        for name in indexes.keys() {
            if !expected_indexes.contains_key(name) {
                return Some(format!("collection {} has unexpected index {}", collection, name));
            }
        }
    }
    None
}

/// JSON schema catalog stored in the coordinator's data directory
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    path: PathBuf,
}

impl SchemaCatalog {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(CATALOG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the catalog; a missing file is an empty schema.
    pub fn load(&self) -> Result<SchemaMap> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SchemaMap::new()),
            Err(e) => return Err(e.into()),
        };
        let schema: SchemaMap = serde_json::from_slice(&bytes)?;
        validate_schema(&schema)?;
        Ok(schema)
    }

    /// Replace the catalog atomically (write temp file, fsync, rename).
    pub fn save(&self, schema: &SchemaMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, schema)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn schema_with(collection: &str, paths: &[&[&str]]) -> SchemaMap {
        let mut schema = SchemaMap::new();
        let indexes = schema.entry(collection.to_string()).or_default();
        for path in paths {
            let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
            indexes.insert(index_name(&path), path);
        }
        schema
    }

    #[test]
    fn test_parse_index_path() {
        assert_eq!(parse_index_path("address.city").unwrap(), vec!["address", "city"]);
        assert!(parse_index_path("address..city").is_err());
        assert!(parse_index_path("").is_err());
    }

    #[test]
    fn test_validate_schema() {
        assert!(validate_schema(&schema_with("users", &[&["email"], &["a", "b"]])).is_ok());
        assert!(validate_schema(&schema_with("bad/name", &[])).is_err());

        let mut mislabeled = SchemaMap::new();
        mislabeled
            .entry("users".into())
            .or_default()
            .insert("by_email".into(), vec!["email".into()]);
        assert!(validate_schema(&mislabeled).is_err());
    }

    #[test]
    fn test_empty_index_path_rejected() {
        let empty = schema_with("users", &[&[]]);
        assert_eq!(empty["users"][""], Vec::<String>::new());
        match validate_schema(&empty) {
            Err(Error::InvalidSchema(msg)) => assert!(msg.contains("empty path")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_merge_schema() {
        let mut target = schema_with("users", &[&["email"]]);
        let mut other = schema_with("users", &[&["email"], &["name"]]);
        other.extend(schema_with("orders", &[&["total"]]));

        assert_eq!(merge_schema(&mut target, &other), 3);
        assert_eq!(target, other);
        assert_eq!(merge_schema(&mut target, &other), 0);
    }

    #[test]
    fn test_describe_difference() {
        let a = schema_with("users", &[&["email"]]);
        let b = schema_with("users", &[&["email"], &["name"]]);
        assert!(describe_difference(&a, &a).is_none());
        assert_eq!(
            describe_difference(&a, &b).unwrap(),
            "collection users has unexpected index name"
        );
        assert_eq!(
            describe_difference(&a, &SchemaMap::new()).unwrap(),
            "missing collection users"
        );
    }

    #[test]
    fn test_catalog_roundtrip() {
        let dir = tempdir().unwrap();
        let catalog = SchemaCatalog::new(dir.path().join("data"));

        assert!(catalog.load().unwrap().is_empty());

        let schema = schema_with("users", &[&["address", "city"]]);
        catalog.save(&schema).unwrap();
        assert_eq!(catalog.load().unwrap(), schema);
        assert!(!catalog.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_catalog_corrupted() {
        let dir = tempdir().unwrap();
        let catalog = SchemaCatalog::new(dir.path());
        std::fs::write(catalog.path(), b"{not json").unwrap();
        assert!(matches!(catalog.load(), Err(Error::Catalog(_))));
    }
}
