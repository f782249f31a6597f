//! JSON mapping files.
//!
//! ```json
//! {
//!   "options": { "strict": false },
//!   "models": {
//!     "User": {
//!       "aliases": { "fullName": "name", "town": "address.city" },
//!       "ignore": ["passwordHash"],
//!       "ignoreFilter": [],
//!       "ignoreSort": ["email"]
//!     }
//!   },
//!   "tables": { "User": "users" },
//!   "collections": {
//!     "User": { "tags": { "table": "user_tags", "foreignKey": "user_id", "valueColumn": "tag" } }
//!   }
//! }
//! ```
//!
//! Aliases map a source name to a target field path of the model.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mapping::{QueryMappingConfig, QueryOptions};
use crate::model::Model;
use crate::sql_compiler::{CollectionTable, SqlCompiler};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("cannot read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Mapping rules of one model, keyed by the model's descriptor name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSection {
    pub aliases: HashMap<String, String>,
    pub ignore: Vec<String>,
    pub ignore_filter: Vec<String>,
    pub ignore_sort: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MappingFile {
    pub options: QueryOptions,
    pub models: HashMap<String, ModelSection>,
    /// Entity name to table name.
    pub tables: HashMap<String, String>,
    /// Entity name to sequence path to child table.
    pub collections: HashMap<String, HashMap<String, CollectionTable>>,
}

impl MappingFile {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: MappingFile = serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        log::info!(
            "loaded mapping file {} ({} models, {} tables)",
            path.display(),
            file.models.len(),
            file.tables.len()
        );
        Ok(file)
    }

    pub fn from_json_str(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// The section for `name`, matched case-insensitively.
    pub fn model(&self, name: &str) -> Option<&ModelSection> {
        self.models
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, section)| section)
    }

    /// Applies the options and the section of `M` to `config`.
    pub fn configure<M: Model>(&self, config: QueryMappingConfig) -> QueryMappingConfig {
        let config = config.with_options(self.options.clone());
        let name = M::descriptor().name;
        let Some(section) = self.model(name) else {
            log::debug!("mapping file has no section for {}", name);
            return config;
        };

        config.for_model::<M>(|m| {
            for (source, target) in &section.aliases {
                m.property(target).map_from(source);
            }
            for property in &section.ignore {
                m.property(property).ignore();
            }
            for property in &section.ignore_filter {
                m.property(property).ignore_filter();
            }
            for property in &section.ignore_sort {
                m.property(property).ignore_sort();
            }
        })
    }

    /// A SQL compiler with the table and collection mappings of `entity`.
    pub fn sql_compiler(&self, entity: &str) -> SqlCompiler {
        let mut compiler = SqlCompiler::new();
        compiler.set_table_mapping(self.tables.clone());
        let collections = self
            .collections
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(entity))
            .flat_map(|(_, tables)| tables.iter());
        for (path, table) in collections {
            compiler = compiler.with_collection(path, table.clone());
        }
        compiler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldType, ModelDescriptor, Record};
    use crate::value::Value;
    use std::io::Write;

    struct User;

    impl Record for User {
        fn field(&self, _name: &str) -> Option<Value<'_>> {
            None
        }
    }

    impl Model for User {
        fn descriptor() -> ModelDescriptor {
            ModelDescriptor::of::<User>("User")
                .field("name", FieldType::String)
                .field("email", FieldType::String)
        }
    }

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("queryx-{}-{}", std::process::id(), name));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "{}", content).unwrap();
        path
    }

    #[test]
    fn test_load_valid_json_config() {
        let path = temp_file(
            "valid.json",
            r#"{
                "options": { "strict": true },
                "models": { "user": { "aliases": { "login": "name" }, "ignoreSort": ["email"] } },
                "tables": { "User": "users" }
            }"#,
        );

        let file = MappingFile::from_json_file(&path).unwrap();
        assert!(file.options.strict);
        assert_eq!(file.tables.get("User").map(String::as_str), Some("users"));

        let config = file.configure::<User>(QueryMappingConfig::new());
        assert!(config.is_strict());
        let mapping = config.mapping_of::<User>();
        assert_eq!(mapping.alias("LOGIN").map(|a| a.target.as_str()), Some("name"));
        assert!(mapping.sort_is_ignored("email"));
        assert!(!mapping.filter_is_ignored("email"));

        fs::remove_file(path).ok();
    }

    #[test]
    fn test_invalid_json_config() {
        let path = temp_file("invalid.json", "invalid json");
        let result = MappingFile::from_json_file(&path);
        assert!(matches!(result, Err(ConfigError::Json { .. })));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file() {
        let result = MappingFile::from_json_file("non_existent_file.json");
        assert!(matches!(result, Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_defaults_and_collections() {
        let file = MappingFile::from_json_str(
            r#"{ "collections": { "User": {
                "tags": { "table": "user_tags", "foreignKey": "user_id" }
            } } }"#,
        )
        .unwrap();
        assert!(!file.options.strict);
        assert!(file.model("User").is_none());

        let compiler = file.sql_compiler("user");
        assert_eq!(compiler.get_table_name("User"), "user");

        let tags = &file.collections["User"]["tags"];
        assert_eq!(tags.value_column, "value");
    }
}
