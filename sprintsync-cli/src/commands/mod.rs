pub mod daemon;
pub mod preview;
pub mod sync;

use std::path::Path;

use anyhow::{Context, Result};

/// Load `.env` from the working directory, then its parent. Variables that
/// are already set win.
pub fn load_dotenv() {
    let Ok(cwd) = std::env::current_dir() else {
        return;
    };
    for dir in [Some(cwd.as_path()), cwd.parent()].into_iter().flatten() {
        load_env_file(&dir.join(".env"));
    }
}

fn load_env_file(path: &Path) {
    if path.is_file() {
        let _ = dotenvy::from_path(path);
    }
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
