pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A raw configuration value as written in a stack file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

/// `omnicloud.<stack>.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackFile {
    #[serde(default)]
    pub config: BTreeMap<String, ConfigValue>,
}

/// Validated stack configuration. Every key is mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackConfig {
    pub domain_name: String,
    pub environment: String,
    pub aws_bucket_name: String,
    pub enable_azure_backup: bool,
    pub project_name: String,
    pub enable_public_access_block: bool,
    pub backup_retention_days: i64,
    pub gcp_primary_ttl: i64,
    pub gcp_backup_ttl: i64,
}

/// Namespace of this project's keys in a stack file
pub const CONFIG_NAMESPACE: &str = "omnicloud";

struct Values(BTreeMap<String, ConfigValue>);

impl Values {
    /// Keeps bare keys and keys in the project namespace, with the prefix
    /// dropped. Keys of other namespaces are ignored.
    fn new(raw: &BTreeMap<String, ConfigValue>) -> Result<Self> {
        let mut values = BTreeMap::new();
        for (raw_key, value) in raw {
            let key = match raw_key.split_once(':') {
                None => raw_key.as_str(),
                Some((namespace, key)) if namespace == CONFIG_NAMESPACE => key,
                Some((namespace, _)) => {
                    tracing::debug!(key = %raw_key, namespace, "ignoring key of another namespace");
                    continue;
                }
            };
            if values.insert(key.to_string(), value.clone()).is_some() {
                return Err(Self::invalid(key, "1回だけの指定", value));
            }
        }
        Ok(Self(values))
    }

    fn get(&self, key: &str) -> Result<&ConfigValue> {
        self.0
            .get(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    fn invalid(key: &str, expected: &'static str, value: &ConfigValue) -> ConfigError {
        ConfigError::InvalidValue {
            key: key.to_string(),
            expected,
            value: value.to_string(),
        }
    }

    fn string(&self, key: &str) -> Result<String> {
        match self.get(key)? {
            ConfigValue::String(s) if !s.trim().is_empty() => Ok(s.clone()),
            other => Err(Self::invalid(key, "空でない文字列", other)),
        }
    }

    fn bool(&self, key: &str) -> Result<bool> {
        let value = self.get(key)?;
        match value {
            ConfigValue::Bool(b) => Ok(*b),
            ConfigValue::Int(0) => Ok(false),
            ConfigValue::Int(1) => Ok(true),
            ConfigValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(Self::invalid(key, "真偽値", value)),
            },
            ConfigValue::Int(_) => Err(Self::invalid(key, "真偽値", value)),
        }
    }

    fn non_negative(&self, key: &str) -> Result<i64> {
        let value = self.get(key)?;
        let parsed = match value {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.trim().parse::<i64>().ok(),
            ConfigValue::Bool(_) => None,
        };
        match parsed {
            Some(i) if i >= 0 => Ok(i),
            _ => Err(Self::invalid(key, "0 以上の整数", value)),
        }
    }
}

impl StackConfig {
    /// Validates a flat mapping of configuration values
    pub fn from_map(raw: &BTreeMap<String, ConfigValue>) -> Result<Self> {
        let values = Values::new(raw)?;
        Ok(Self {
            domain_name: values.string("domain_name")?,
            environment: values.string("environment")?,
            aws_bucket_name: values.string("aws_bucket_name")?,
            enable_azure_backup: values.bool("enable_azure_backup")?,
            project_name: values.string("project_name")?,
            enable_public_access_block: values.bool("enable_public_access_block")?,
            backup_retention_days: values.non_negative("backup_retention_days")?,
            gcp_primary_ttl: values.non_negative("gcp_primary_ttl")?,
            gcp_backup_ttl: values.non_negative("gcp_backup_ttl")?,
        })
    }

    /// Parses the contents of a stack file
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: StackFile = serde_yaml::from_str(content)?;
        Self::from_map(&file.config)
    }
}

/// Stack file name for a stack
pub fn stack_file_name(stack: &str) -> String {
    format!("omnicloud.{}.yaml", stack)
}

/// スタックの設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 OMNICLOUD_CONFIG_PATH (直接パス指定)
/// 2. プロジェクトルート: omnicloud.<stack>.yaml
/// 3. <root>/.omnicloud/ ディレクトリ内
/// 4. ~/.config/omnicloud/omnicloud.<stack>.yaml (グローバル設定)
pub fn find_stack_file(root: &Path, stack: &str) -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var("OMNICLOUD_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(
            "OMNICLOUD_CONFIG_PATH does not exist: {}",
            path.display()
        );
    }

    let filename = stack_file_name(stack);

    // 2. プロジェクトルート
    let path = root.join(&filename);
    if path.exists() {
        return Ok(path);
    }

    // 3. ./.omnicloud/ ディレクトリ
    let path = root.join(".omnicloud").join(&filename);
    if path.exists() {
        return Ok(path);
    }

    // 4. グローバル設定
    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("omnicloud").join(&filename);
        if path.exists() {
            return Ok(path);
        }
    }

    Err(ConfigError::StackFileNotFound {
        stack: stack.to_string(),
    })
}

/// Finds, reads and validates the configuration of a stack
pub fn load_stack_config(root: &Path, stack: &str) -> Result<StackConfig> {
    let path = find_stack_file(root, stack)?;
    tracing::debug!("Loading stack config from {}", path.display());
    let content = std::fs::read_to_string(&path)?;
    StackConfig::from_yaml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    const DEV_STACK: &str = r#"
config:
  omnicloud:domain_name: example.com
  omnicloud:environment: dev
  omnicloud:aws_bucket_name: site-dev
  omnicloud:enable_azure_backup: "yes"
  omnicloud:project_name: site
  omnicloud:enable_public_access_block: true
  omnicloud:backup_retention_days: "7"
  omnicloud:gcp_primary_ttl: 300
  omnicloud:gcp_backup_ttl: 60
"#;

    fn full_map() -> BTreeMap<String, ConfigValue> {
        BTreeMap::from([
            ("domain_name".to_string(), "example.com".into()),
            ("environment".to_string(), "dev".into()),
            ("aws_bucket_name".to_string(), "site-dev".into()),
            ("enable_azure_backup".to_string(), true.into()),
            ("project_name".to_string(), "site".into()),
            ("enable_public_access_block".to_string(), false.into()),
            ("backup_retention_days".to_string(), 7.into()),
            ("gcp_primary_ttl".to_string(), 300.into()),
            ("gcp_backup_ttl".to_string(), 60.into()),
        ])
    }

    #[test]
    fn test_parse_stack_file() {
        let config = StackConfig::from_yaml_str(DEV_STACK).unwrap();
        assert_eq!(config.domain_name, "example.com");
        assert!(config.enable_azure_backup);
        assert!(config.enable_public_access_block);
        assert_eq!(config.backup_retention_days, 7);
        assert_eq!(config.gcp_primary_ttl, 300);
        assert_eq!(config.gcp_backup_ttl, 60);
    }

    #[test]
    fn test_missing_key() {
        let mut map = full_map();
        map.remove("gcp_backup_ttl");
        match StackConfig::from_map(&map) {
            Err(ConfigError::MissingKey(key)) => assert_eq!(key, "gcp_backup_ttl"),
            other => panic!("Expected MissingKey, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_values() {
        let mut map = full_map();
        map.insert("enable_azure_backup".to_string(), "maybe".into());
        assert!(matches!(
            StackConfig::from_map(&map),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut map = full_map();
        map.insert("gcp_primary_ttl".to_string(), "five minutes".into());
        assert!(matches!(
            StackConfig::from_map(&map),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut map = full_map();
        map.insert("backup_retention_days".to_string(), (-1).into());
        assert!(matches!(
            StackConfig::from_map(&map),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_foreign_namespace_is_ignored() {
        let content = format!("{}  zzz:domain_name: attacker.net\n", DEV_STACK);
        let config = StackConfig::from_yaml_str(&content).unwrap();
        assert_eq!(config.domain_name, "example.com");

        // a key only present in another namespace does not count
        let mut map = full_map();
        map.remove("gcp_backup_ttl");
        map.insert("aws:gcp_backup_ttl".to_string(), 60.into());
        assert!(matches!(
            StackConfig::from_map(&map),
            Err(ConfigError::MissingKey(key)) if key == "gcp_backup_ttl"
        ));
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let mut map = full_map();
        map.insert("omnicloud:domain_name".to_string(), "other.example".into());
        match StackConfig::from_map(&map) {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "domain_name"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_bool_spellings() {
        for (raw, expected) in [("TRUE", true), ("no", false), ("1", true), ("0", false)] {
            let mut map = full_map();
            map.insert("enable_public_access_block".to_string(), raw.into());
            let config = StackConfig::from_map(&map).unwrap();
            assert_eq!(config.enable_public_access_block, expected, "{}", raw);
        }
    }

    #[test]
    #[serial]
    fn test_find_stack_file_in_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("omnicloud.dev.yaml"), DEV_STACK).unwrap();

        temp_env::with_var_unset("OMNICLOUD_CONFIG_PATH", || {
            let path = find_stack_file(temp_dir.path(), "dev").unwrap();
            assert!(path.ends_with("omnicloud.dev.yaml"));

            let config = load_stack_config(temp_dir.path(), "dev").unwrap();
            assert_eq!(config.environment, "dev");
        });
    }

    #[test]
    #[serial]
    fn test_find_stack_file_in_omnicloud_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join(".omnicloud");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("omnicloud.prod.yaml"), DEV_STACK).unwrap();

        temp_env::with_var_unset("OMNICLOUD_CONFIG_PATH", || {
            let path = find_stack_file(temp_dir.path(), "prod").unwrap();
            assert!(path.ends_with(".omnicloud/omnicloud.prod.yaml"));
        });
    }

    #[test]
    #[serial]
    fn test_find_stack_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, DEV_STACK).unwrap();
        fs::write(temp_dir.path().join("omnicloud.dev.yaml"), DEV_STACK).unwrap();

        temp_env::with_var("OMNICLOUD_CONFIG_PATH", Some(&config_path), || {
            let path = find_stack_file(temp_dir.path(), "dev").unwrap();
            assert_eq!(path, config_path);
        });
    }

    #[test]
    #[serial]
    fn test_find_stack_file_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();

        temp_env::with_var_unset("OMNICLOUD_CONFIG_PATH", || {
            let result = find_stack_file(temp_dir.path(), "does-not-exist-anywhere");
            if let Err(ConfigError::StackFileNotFound { stack }) = result {
                assert_eq!(stack, "does-not-exist-anywhere");
            } else {
                panic!("Expected StackFileNotFound error");
            }
        });
    }
}
