use std::path::{Path, PathBuf};

/// Load `.env` from the working directory. Returns the file that was loaded.
/// Variables already present in the environment are left alone.
pub fn load_dotenv() -> Option<PathBuf> {
    let dir = std::env::current_dir().ok()?;
    load_dotenv_from(&dir)
}

/// Load `dir/.env` if it exists.
pub fn load_dotenv_from(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(".env");
    if !path.is_file() {
        return None;
    }
    dotenvy::from_path(&path).ok().map(|_| path)
}
