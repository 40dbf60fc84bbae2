use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;

/// Writes the run's accumulated tweets to one timestamped JSON file.
///
/// Every save rewrites the whole file with the full accumulated set, so the
/// operation is idempotent and a run killed between batches still leaves a
/// readable, self-consistent result file.
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// One file per run, named at construction time.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        JsonStore {
            path: dir.as_ref().join(format!("{stamp}_tweets.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save<T: Serialize>(&self, records: &[T]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating results dir {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, json)
            .with_context(|| format!("writing {}", self.path.display()))?;
        println!("💾 Saved {} tweets to {}", records.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        text: String,
    }

    #[test]
    fn save_creates_dir_and_rewrites_whole_file() {
        let dir = std::env::temp_dir().join(format!("tweet-crawler-test-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let store = JsonStore::new(dir.join("tweets"));
        store.save(&[Row { text: "a".into() }]).unwrap();
        store
            .save(&[Row { text: "a".into() }, Row { text: "b".into() }])
            .unwrap();

        let contents = fs::read_to_string(store.path()).unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 2);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn filename_is_timestamped_json() {
        let store = JsonStore::new("tweets");
        let name = store.path().file_name().unwrap().to_string_lossy();
        assert!(name.ends_with("_tweets.json"));
    }
}
