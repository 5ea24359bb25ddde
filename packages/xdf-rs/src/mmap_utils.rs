use crate::error::{Result, XDFError};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Open a recording and map it into memory (read-only). The mapping is
/// released when the returned value is dropped.
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    if !path.exists() {
        return Err(XDFError::FileNotFound(path.display().to_string()));
    }
    let file = File::open(path).map_err(XDFError::IoError)?;
    // The file is opened read-only and the map never outlives this process's
    // use of it; concurrent truncation by another process is not guarded.
    let mmap = unsafe { Mmap::map(&file).map_err(XDFError::IoError)? };
    log::debug!("Mapped {} ({} bytes)", path.display(), mmap.len());
    Ok(mmap)
}
