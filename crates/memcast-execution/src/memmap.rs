use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use memmap2::{Mmap, MmapOptions};
use tempfile::NamedTempFile;

use crate::array::ArrayLayout;
use crate::error::{ExecutionError, ExecutionResult};

/// A read-only array backed by a private (copy-on-write) mapping of a datastore file.
///
/// Every process mapping the same file shares the physical pages
/// through the virtual-memory subsystem of the operating system.
#[derive(Clone)]
pub struct MappedArray {
    path: PathBuf,
    layout: ArrayLayout,
    map: Arc<Mmap>,
}

impl std::fmt::Debug for MappedArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedArray")
            .field("path", &self.path)
            .field("layout", &self.layout)
            .finish()
    }
}

impl MappedArray {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> &ArrayLayout {
        &self.layout
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.map
    }
}

/// Writes the array bytes to `path` so that they can be memory-mapped later.
///
/// Nothing is done if the file already exists. The data is written to a temporary
/// file in the same directory and renamed into place, so a concurrent reader either
/// sees no file or the complete file. Returns whether this call created the file.
pub fn save_for_memmap(bytes: &[u8], path: &Path) -> ExecutionResult<bool> {
    if path.exists() {
        debug!("{} already exists", path.display());
        return Ok(false);
    }
    write_atomically(bytes, path)?;
    debug!("saved {} bytes to {}", bytes.len(), path.display());
    Ok(true)
}

/// Writes `bytes` to `path` through a temporary sibling file and an atomic rename.
/// An existing file at `path` is replaced.
pub fn write_atomically(bytes: &[u8], path: &Path) -> ExecutionResult<()> {
    let dir = match path.parent() {
        Some(x) if !x.as_os_str().is_empty() => x,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_data()?;
    file.persist(path).map_err(|e| ExecutionError::IoError(e.error))?;
    Ok(())
}

/// Maps an array file created by [`save_for_memmap`] with the given layout.
pub fn load_memmap(path: &Path, layout: &ArrayLayout) -> ExecutionResult<MappedArray> {
    let expected = layout.byte_len()?;
    if expected == 0 {
        return Err(ExecutionError::invalid(format!(
            "cannot memory-map an empty array: {layout}"
        )));
    }
    let file = File::open(path)?;
    let actual = file.metadata()?.len();
    if actual != expected as u64 {
        return Err(ExecutionError::invalid(format!(
            "{} has {actual} bytes but array {layout} requires {expected} bytes",
            path.display()
        )));
    }
    // SAFETY: The mapping is private and read-only. Datastore files are only ever
    // created by an atomic rename and are never modified in place afterwards.
    let map = unsafe { MmapOptions::new().len(expected).map_copy_read_only(&file)? };
    Ok(MappedArray {
        path: path.to_path_buf(),
        layout: layout.clone(),
        map: Arc::new(map),
    })
}

/// Reads the whole file sequentially so that its pages end up in the OS page cache.
/// Returns the number of bytes read.
pub fn warm_file(path: &Path, chunk_size: usize) -> ExecutionResult<u64> {
    let mut file = File::open(path)?;
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        total += n as u64;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{ArrayData, DType, Order};

    #[test]
    fn test_save_and_load_memmap() -> ExecutionResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("store").join("data");
        let array = ArrayData::from_f64(vec![2, 2], Order::F, &[1.0, 2.0, 3.0, 4.0])?;

        assert!(save_for_memmap(array.as_bytes(), &path)?);
        assert!(!save_for_memmap(array.as_bytes(), &path)?);

        let mapped = load_memmap(&path, array.layout())?;
        assert_eq!(mapped.as_bytes(), array.as_bytes());
        assert_eq!(mapped.path(), path.as_path());
        assert_eq!(mapped.layout().order, Order::F);
        Ok(())
    }

    #[test]
    fn test_save_keeps_existing_file() -> ExecutionResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data");
        fs::write(&path, b"old!")?;
        assert!(!save_for_memmap(b"new!", &path)?);
        assert_eq!(fs::read(&path)?, b"old!");
        Ok(())
    }

    #[test]
    fn test_load_memmap_rejects_wrong_length() -> ExecutionResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data");
        fs::write(&path, [0u8; 12])?;
        let layout = ArrayLayout::new(vec![4], DType::Float32, Order::C);
        assert!(matches!(
            load_memmap(&path, &layout),
            Err(ExecutionError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn test_load_memmap_rejects_empty_array() -> ExecutionResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data");
        fs::write(&path, b"")?;
        let layout = ArrayLayout::new(vec![0, 3], DType::Float32, Order::C);
        assert!(load_memmap(&path, &layout).is_err());
        Ok(())
    }

    #[test]
    fn test_warm_file() -> ExecutionResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data");
        fs::write(&path, vec![7u8; 1000])?;
        assert_eq!(warm_file(&path, 64)?, 1000);
        assert_eq!(warm_file(&path, 0)?, 1000);
        Ok(())
    }
}
