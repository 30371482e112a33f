use anyhow::Result;
use std::path::Path;

use crate::system::traits::FileSystemInterface;

/// Production implementation of FileSystemInterface using std::fs
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardFileSystem;

impl FileSystemInterface for StandardFileSystem {
    fn read_config_file(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))
    }

    fn write_config_file(&self, path: &Path, content: &str) -> Result<()> {
        std::fs::write(path, content)
            .map_err(|e| anyhow::anyhow!("Failed to write config file: {}", e))
    }

    fn config_file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_config_dir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .map_err(|e| anyhow::anyhow!("Failed to create config directory: {}", e))
    }

    fn get_config_modified_time(&self, path: &Path) -> Result<std::time::SystemTime> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| anyhow::anyhow!("Failed to get file metadata: {}", e))?;
        metadata
            .modified()
            .map_err(|e| anyhow::anyhow!("Failed to get modified time: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_through_real_file_system() {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().join("nested/dir");
        let config_path = config_dir.join("config.toml");
        let fs = StandardFileSystem;

        assert!(!fs.config_file_exists(&config_path));
        fs.create_config_dir(&config_dir).unwrap();
        fs.write_config_file(&config_path, "[general]\n").unwrap();

        assert!(fs.config_file_exists(&config_path));
        assert_eq!(fs.read_config_file(&config_path).unwrap(), "[general]\n");
        assert!(fs.get_config_modified_time(&config_path).is_ok());
    }
}
