use anyhow::Result;
use std::path::PathBuf;

use QuiverGist::consts::META_FILE;
use QuiverGist::meta::read_meta;
use QuiverGist::GistIndex;

pub fn exec(path: PathBuf, page_size: u32, unlogged: bool) -> Result<()> {
    if path.join(META_FILE).exists() {
        let m = read_meta(&path)?;
        if m.page_size != page_size {
            eprintln!(
                "warning: index already initialized with page_size={}, requested {} (keeping {})",
                m.page_size, page_size, m.page_size
            );
        }
        println!("Index already initialized at {}", path.display());
        return Ok(());
    }
    if unlogged {
        GistIndex::init_unlogged(&path, page_size)?;
    } else {
        GistIndex::init(&path, page_size)?;
    }
    println!(
        "Initialized {}index at {} (page_size={})",
        if unlogged { "unlogged " } else { "" },
        path.display(),
        page_size
    );
    Ok(())
}
