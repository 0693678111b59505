//! ZIP-backed conversion cache.
//!
//! One entry per converted row, keyed by the derived entry name
//! (`<key>_<method>.<ext>`). The archive on disk is the cache; the
//! in-memory name set mirrors it so membership checks never touch the disk.
//!
//! ## Replace by rebuild
//!
//! ZIP has no in-place delete, so every write rebuilds the container: all
//! other entries are raw-copied (no recompression) into a temp file in the
//! same directory, the new entry is appended, and the temp file is renamed
//! over the original. The rename is the only visible state transition, so an
//! interrupted write leaves the previous archive intact. Each write costs
//! O(archive size), which is fine for batches of tens to low thousands.

use crate::error::Pdf2ZipError;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Handle on a conversion archive plus the set of names it holds.
#[derive(Debug)]
pub struct ArchiveCache {
    path: PathBuf,
    names: BTreeSet<String>,
}

impl ArchiveCache {
    /// Open the archive at `path`, creating an empty one if it does not exist.
    pub fn ensure(path: impl AsRef<Path>) -> Result<Self, Pdf2ZipError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| io_err(&path, e))?;
            }
            let mut tmp = sibling_temp(&path).map_err(|e| io_err(&path, e))?;
            ZipWriter::new(tmp.as_file_mut())
                .finish()
                .map_err(|e| zip_err(&path, e))?;
            tmp.persist(&path).map_err(|e| io_err(&path, e.error))?;
            info!("Created empty archive: {}", path.display());
            return Ok(Self {
                path,
                names: BTreeSet::new(),
            });
        }

        let archive = open_archive(&path)?;
        let names: BTreeSet<String> = archive.file_names().map(str::to_string).collect();
        debug!("Archive {} holds {} entries", path.display(), names.len());
        Ok(Self { path, names })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Membership test against the loaded name set.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Entry names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Raw bytes of one entry.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, Pdf2ZipError> {
        let mut archive = open_archive(&self.path)?;
        let mut entry = archive.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => Pdf2ZipError::EntryNotFound {
                path: self.path.clone(),
                name: name.to_string(),
            },
            other => zip_err(&self.path, other),
        })?;
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut buf)
            .map_err(|e| io_err(&self.path, e))?;
        Ok(buf)
    }

    /// One entry decoded as UTF-8.
    pub fn read_to_string(&self, name: &str) -> Result<String, Pdf2ZipError> {
        String::from_utf8(self.read(name)?).map_err(|_| Pdf2ZipError::EntryNotUtf8 {
            path: self.path.clone(),
            name: name.to_string(),
        })
    }

    /// Insert or replace `name`. Last write wins; all other entries are kept.
    pub fn write(&mut self, name: &str, content: &[u8]) -> Result<(), Pdf2ZipError> {
        let tmp = self.rebuild(name, content)?;
        tmp.persist(&self.path)
            .map_err(|e| io_err(&self.path, e.error))?;
        self.names.insert(name.to_string());
        debug!(
            "Wrote {} ({} bytes) to {}",
            name,
            content.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Build the replacement archive in a temp file next to the original.
    ///
    /// The temp file is deleted when dropped, so any error before `persist`
    /// leaves nothing behind.
    fn rebuild(&self, name: &str, content: &[u8]) -> Result<NamedTempFile, Pdf2ZipError> {
        let mut source = open_archive(&self.path)?;
        let mut tmp = sibling_temp(&self.path).map_err(|e| io_err(&self.path, e))?;

        {
            let mut writer = ZipWriter::new(tmp.as_file_mut());
            for i in 0..source.len() {
                let entry = source
                    .by_index_raw(i)
                    .map_err(|e| zip_err(&self.path, e))?;
                if entry.name() == name {
                    continue;
                }
                writer
                    .raw_copy_file(entry)
                    .map_err(|e| zip_err(&self.path, e))?;
            }

            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            writer
                .start_file(name, options)
                .map_err(|e| zip_err(&self.path, e))?;
            writer
                .write_all(content)
                .map_err(|e| io_err(&self.path, e))?;
            writer.finish().map_err(|e| zip_err(&self.path, e))?;
        }

        tmp.as_file().sync_all().map_err(|e| io_err(&self.path, e))?;
        Ok(tmp)
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>, Pdf2ZipError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| zip_err(path, e))
}

/// Directory for temp files: must be on the same filesystem as the archive
/// for the final rename to be atomic.
fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Temp file next to `target`, to be persisted over it.
///
/// Gets the permissions `target` already has, or for a new file the
/// umask-filtered default a plain create would give.
pub(crate) fn sibling_temp(target: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".pdf2zip-");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    let tmp = builder.tempfile_in(parent_dir(target))?;
    if let Ok(meta) = std::fs::metadata(target) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    Ok(tmp)
}

fn io_err(path: &Path, source: std::io::Error) -> Pdf2ZipError {
    Pdf2ZipError::ArchiveIo {
        path: path.to_path_buf(),
        source,
    }
}

fn zip_err(path: &Path, source: ZipError) -> Pdf2ZipError {
    match source {
        ZipError::Io(e) => io_err(path, e),
        other => Pdf2ZipError::ArchiveFormat {
            path: path.to_path_buf(),
            source: other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut v: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        v.sort();
        v
    }

    #[test]
    fn ensure_creates_empty_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/cache.zip");

        let cache = ArchiveCache::ensure(&path).unwrap();
        assert!(path.exists());
        assert!(cache.is_empty());

        // A second ensure opens the same, still valid, archive.
        let again = ArchiveCache::ensure(&path).unwrap();
        assert_eq!(again.len(), 0);
    }

    #[test]
    fn write_then_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.zip");
        let mut cache = ArchiveCache::ensure(&path).unwrap();

        cache.write("doc1_pdfium.md", b"# Title\n").unwrap();
        assert!(cache.contains("doc1_pdfium.md"));
        assert_eq!(cache.read_to_string("doc1_pdfium.md").unwrap(), "# Title\n");

        let reopened = ArchiveCache::ensure(&path).unwrap();
        assert_eq!(reopened.names().collect::<Vec<_>>(), vec!["doc1_pdfium.md"]);
    }

    #[test]
    fn write_replaces_and_preserves_others() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.zip");
        let mut cache = ArchiveCache::ensure(&path).unwrap();

        cache.write("a.md", b"first a").unwrap();
        cache.write("b.md", b"only b").unwrap();
        cache.write("a.md", b"second a").unwrap();

        let reopened = ArchiveCache::ensure(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.read_to_string("a.md").unwrap(), "second a");
        assert_eq!(reopened.read_to_string("b.md").unwrap(), "only b");

        // One entry per name inside the container itself.
        let archive = open_archive(&path).unwrap();
        assert_eq!(archive.len(), 2);
    }

    #[test]
    fn interrupted_rebuild_keeps_previous_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.zip");
        let mut cache = ArchiveCache::ensure(&path).unwrap();
        cache.write("a.md", b"original").unwrap();

        // Build the replacement but never rename it into place.
        let tmp = cache.rebuild("a.md", b"replacement").unwrap();
        drop(tmp);

        let reopened = ArchiveCache::ensure(&path).unwrap();
        assert_eq!(reopened.read_to_string("a.md").unwrap(), "original");
        assert_eq!(dir_entries(dir.path()), vec!["cache.zip"]);
    }

    #[test]
    fn read_missing_entry() {
        let dir = TempDir::new().unwrap();
        let cache = ArchiveCache::ensure(dir.path().join("cache.zip")).unwrap();
        let err = cache.read("nope.md").unwrap_err();
        assert!(matches!(err, Pdf2ZipError::EntryNotFound { .. }), "got {err:?}");
    }

    #[test]
    fn non_utf8_entry_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut cache = ArchiveCache::ensure(dir.path().join("cache.zip")).unwrap();
        cache.write("bin.txt", &[0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            cache.read_to_string("bin.txt"),
            Err(Pdf2ZipError::EntryNotUtf8 { .. })
        ));
    }

    #[test]
    fn corrupt_archive_is_rejected_and_left_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.zip");
        let junk = "definitely not a zip file\n".repeat(8);
        std::fs::write(&path, &junk).unwrap();

        let err = ArchiveCache::ensure(&path).unwrap_err();
        assert!(matches!(err, Pdf2ZipError::ArchiveFormat { .. }), "got {err:?}");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), junk);
    }

    #[cfg(unix)]
    #[test]
    fn rewrite_keeps_archive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.zip");
        let mut cache = ArchiveCache::ensure(&path).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        cache.write("a.md", b"# A").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn new_archive_gets_default_create_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let reference = dir.path().join("plain");
        File::create(&reference).unwrap();
        let path = dir.path().join("cache.zip");

        ArchiveCache::ensure(&path).unwrap();

        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&path), mode(&reference));
    }

    #[test]
    fn relative_path_in_current_dir_has_parent() {
        assert_eq!(parent_dir(Path::new("cache.zip")), Path::new("."));
        assert_eq!(parent_dir(Path::new("/tmp/x/cache.zip")), Path::new("/tmp/x"));
    }
}
