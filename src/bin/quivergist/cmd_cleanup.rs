use anyhow::{Context, Result};
use std::path::PathBuf;

use QuiverGist::metrics;
use QuiverGist::{GistConfig, GistIndex, IndexVacuumInfo};

/// CLI: cleanup - проход vacuum'а без callback'а удаления.
/// Требует writer (эксклюзивный lock). Вывод - текст/JSON.
pub fn exec(path: PathBuf, heap_tuples: Option<u64>, json: bool) -> Result<()> {
    let idx = GistIndex::open_with_config(&path, GistConfig::from_env())
        .with_context(|| format!("open index at {}", path.display()))?;

    let mut info = match heap_tuples {
        Some(n) => IndexVacuumInfo::exact(n as f64),
        None => IndexVacuumInfo::default(),
    };
    let stats = idx
        .vacuum_cleanup(&mut info, None)?
        .unwrap_or_default();
    idx.close()?;

    if json {
        let out = serde_json::json!({
            "stats": stats,
            "metrics": metrics::snapshot(),
        });
        println!("{}", serde_json::to_string(&out)?);
        return Ok(());
    }

    println!("Cleanup summary:");
    println!("  num_pages           = {}", stats.num_pages);
    println!("  pages_deleted       = {}", stats.pages_deleted);
    println!("  pages_newly_deleted = {}", stats.pages_newly_deleted);
    println!("  pages_free          = {}", stats.pages_free);
    println!("  num_index_tuples    = {}", stats.num_index_tuples);
    let m = metrics::snapshot();
    println!("  pages_scanned       = {} (revisits {:.1}%)",
        m.vacuum_pages_scanned, m.revisit_ratio() * 100.0);
    if m.vacuum_invalid_tuples > 0 {
        println!("  invalid_tuples      = {} (REINDEX recommended)", m.vacuum_invalid_tuples);
    }
    Ok(())
}
