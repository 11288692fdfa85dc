use std::fs::{remove_file, rename};
use std::path::{Path, PathBuf};

use memtable::Memtable;
use tracing::debug;

use crate::builder::{TableBuilder, TableSummary};
use crate::error::Result;
use crate::options::TableOptions;

/// Flushes `mem` to a new table file at `path`.
///
/// # Crash Safety
///
/// The table is built in `<path>.tmp`, finished (and fsynced when
/// `options.sync` is set), then atomically renamed onto `path`. If the
/// process dies mid-write only the temp file is left behind; `path` never
/// holds a partial table.
///
/// An empty memtable produces a valid table with no data blocks.
pub fn write_from_memtable(
    path: &Path,
    mem: &Memtable,
    options: &TableOptions,
) -> Result<TableSummary> {
    let tmp_path = tmp_path_for(path);

    let summary = match build_table(&tmp_path, mem, options) {
        Ok(summary) => summary,
        Err(e) => {
            // the temp file holds an unfinished table
            let _ = remove_file(&tmp_path);
            return Err(e);
        }
    };

    rename(&tmp_path, path)?;
    debug!(path = %path.display(), entries = summary.entries, "flushed memtable");
    Ok(summary)
}

/// `<path>.tmp`, keeping the full file name so distinct targets never share a
/// temp file.
fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn build_table(path: &Path, mem: &Memtable, options: &TableOptions) -> Result<TableSummary> {
    let mut builder = TableBuilder::create(path, *options)?;
    for (key, value) in mem.iter() {
        builder.add(key, value)?;
    }
    builder.finish()
}
