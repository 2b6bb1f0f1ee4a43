use anyhow::{anyhow, Result};
use std::path::PathBuf;

use QuiverGist::GistIndex;

/// Открыть индекс (с реплеем WAL, если закрыт нечисто), сбросить страницы и закрыть чисто.
/// Требует эксклюзивный lock (<root>/LOCK). Если lock занят - вернёт ошибку.
pub fn exec(root: PathBuf) -> Result<()> {
    if !root.exists() {
        return Err(anyhow!("index root does not exist: {}", root.display()));
    }
    let idx = GistIndex::open(&root)?;
    idx.checkpoint()?;
    idx.close()?;
    println!("checkpoint: pages flushed, WAL truncated at {}", root.display());
    Ok(())
}
