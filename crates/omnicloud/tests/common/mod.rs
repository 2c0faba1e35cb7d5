use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const DEV_STACK: &str = r#"
config:
  omnicloud:domain_name: example.com
  omnicloud:environment: dev
  omnicloud:aws_bucket_name: site-dev-bucket
  omnicloud:enable_azure_backup: true
  omnicloud:project_name: site
  omnicloud:enable_public_access_block: true
  omnicloud:backup_retention_days: 7
  omnicloud:gcp_primary_ttl: 300
  omnicloud:gcp_backup_ttl: 60
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_stack(&self, stack: &str, content: &str) {
        let path = self.root.path().join(format!("omnicloud.{}.yaml", stack));
        fs::write(path, content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn state_path(&self, stack: &str) -> PathBuf {
        self.root
            .path()
            .join(".omnicloud")
            .join(stack)
            .join("state.json")
    }

    pub fn read_state(&self, stack: &str) -> serde_json::Value {
        let content = fs::read_to_string(self.state_path(stack)).unwrap();
        serde_json::from_str(&content).unwrap()
    }
}
