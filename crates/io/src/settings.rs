use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use drive_core::{SettingsStore, StoreError};
use model::DriveModeSettings;

/// Settings kept as one pretty-printed JSON file per user under `dir`.
pub struct FileSettingsStore {
    dir: PathBuf,
}

impl FileSettingsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        let name: String = user_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self, user_id: &str) -> Result<Option<DriveModeSettings>, StoreError> {
        let path = self.path_for(user_id);
        let raw = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(anyhow::Error::new(e).context(format!("read {}", path.display())).into()),
        };
        let settings = serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
        Ok(Some(settings))
    }

    fn save(&self, user_id: &str, settings: &DriveModeSettings) -> Result<(), StoreError> {
        let path = self.path_for(user_id);
        fs::create_dir_all(&self.dir).with_context(|| format!("create {}", self.dir.display()))?;
        let body = serde_json::to_vec_pretty(settings).context("encode settings")?;
        // write-then-rename: readers never see a partial file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("rename to {}", path.display()))?;
        Ok(())
    }
}
