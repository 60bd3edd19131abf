use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::trace;

use super::error::{FileError, FileResult};
use super::{PAGE_SIZE, PageNum};

/// Per-handle page I/O counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCounters {
    pub reads: u64,
    pub writes: u64,
    pub appends: u64,
}

/// Handle to an open paged file
///
/// A handle owns its file exclusively. It starts unbound and is bound by
/// [`PagedFileManager::open_file`].
#[derive(Debug, Default)]
pub struct FileHandle {
    file: Option<File>,
    path: Option<PathBuf>,
    counters: PageCounters,
}

impl FileHandle {
    /// Create an unbound handle with zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the handle is bound to a file
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Path of the bound file
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of the read/write/append counters
    pub fn counters(&self) -> PageCounters {
        self.counters
    }

    fn file_mut(&mut self) -> FileResult<&mut File> {
        self.file.as_mut().ok_or(FileError::HandleNotOpen)
    }

    /// Get the number of pages, derived from the file length
    pub fn page_count(&self) -> FileResult<PageNum> {
        let file = self.file.as_ref().ok_or(FileError::HandleNotOpen)?;
        let file_size = file.metadata()?.len();
        Ok((file_size / PAGE_SIZE as u64) as PageNum)
    }

    fn check_page(&self, page_num: PageNum) -> FileResult<()> {
        let page_count = self.page_count()?;
        if page_num >= page_count {
            return Err(FileError::PageNotFound {
                page_num,
                page_count,
            });
        }
        Ok(())
    }

    /// Read an existing page into `buffer`
    pub fn read_page(&mut self, page_num: PageNum, buffer: &mut [u8]) -> FileResult<()> {
        check_buffer(buffer.len())?;
        self.check_page(page_num)?;

        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(page_offset(page_num)))?;
        file.read_exact(buffer)
            .map_err(|e| short_io(e, "read", page_num))?;

        self.counters.reads += 1;
        Ok(())
    }

    /// Overwrite an existing page; never grows the file
    pub fn write_page(&mut self, page_num: PageNum, buffer: &[u8]) -> FileResult<()> {
        check_buffer(buffer.len())?;
        self.check_page(page_num)?;

        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(page_offset(page_num)))?;
        file.write_all(buffer)
            .map_err(|e| short_io(e, "write", page_num))?;

        self.counters.writes += 1;
        Ok(())
    }

    /// Append a page at the end of the file, returning its page number
    pub fn append_page(&mut self, buffer: &[u8]) -> FileResult<PageNum> {
        check_buffer(buffer.len())?;
        let page_num = self.page_count()?;

        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(page_offset(page_num)))?;
        file.write_all(buffer)
            .map_err(|e| short_io(e, "write", page_num))?;

        self.counters.appends += 1;
        trace!(page_num, "appended page");
        Ok(page_num)
    }
}

fn page_offset(page_num: PageNum) -> u64 {
    page_num as u64 * PAGE_SIZE as u64
}

fn check_buffer(len: usize) -> FileResult<()> {
    if len != PAGE_SIZE {
        return Err(FileError::InvalidPageSize {
            expected: PAGE_SIZE,
            actual: len,
        });
    }
    Ok(())
}

/// Map a truncated transfer to `ShortIo`, anything else to `Io`
fn short_io(e: io::Error, op: &'static str, page_num: PageNum) -> FileError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => FileError::ShortIo {
            op,
            page_num,
            expected: PAGE_SIZE,
        },
        _ => FileError::Io(e),
    }
}

/// Creates, destroys, opens and closes paged files
#[derive(Debug, Default)]
pub struct PagedFileManager;

impl PagedFileManager {
    /// Create a new paged file manager
    pub fn new() -> Self {
        Self
    }

    /// Create a new empty file
    pub fn create_file<P: AsRef<Path>>(&self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        if path.exists() {
            return Err(FileError::FileAlreadyExists(path.display().to_string()));
        }

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(())
    }

    /// Remove (delete) a file
    pub fn destroy_file<P: AsRef<Path>>(&self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(FileError::FileNotFound(path.display().to_string()));
        }

        std::fs::remove_file(path)?;
        Ok(())
    }

    /// Bind `handle` to an existing file
    pub fn open_file<P: AsRef<Path>>(&self, path: P, handle: &mut FileHandle) -> FileResult<()> {
        let path = path.as_ref();

        if let Some(bound) = handle.path() {
            return Err(FileError::HandleAlreadyOpen(bound.display().to_string()));
        }

        if !path.exists() {
            return Err(FileError::FileNotFound(path.display().to_string()));
        }

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        handle.file = Some(file);
        handle.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Flush and release the file bound to `handle`
    pub fn close_file(&self, handle: &mut FileHandle) -> FileResult<()> {
        let file = handle.file.take().ok_or(FileError::HandleNotOpen)?;
        handle.path = None;
        file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_dir() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    fn open_new(manager: &PagedFileManager, path: &Path) -> FileHandle {
        manager.create_file(path).unwrap();
        let mut handle = FileHandle::new();
        manager.open_file(path, &mut handle).unwrap();
        handle
    }

    #[test]
    fn test_create_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let manager = PagedFileManager::new();

        assert!(manager.create_file(&test_file).is_ok());
        assert!(test_file.exists());
    }

    #[test]
    fn test_create_file_already_exists() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let result = manager.create_file(&test_file);
        assert!(matches!(result, Err(FileError::FileAlreadyExists(_))));
    }

    #[test]
    fn test_open_close_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let manager = PagedFileManager::new();

        let mut handle = open_new(&manager, &test_file);
        assert!(handle.is_open());

        manager.close_file(&mut handle).unwrap();
        assert!(!handle.is_open());

        // Closing twice is an error
        let result = manager.close_file(&mut handle);
        assert!(matches!(result, Err(FileError::HandleNotOpen)));
    }

    #[test]
    fn test_open_nonexistent_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("nonexistent.db");
        let manager = PagedFileManager::new();

        let mut handle = FileHandle::new();
        let result = manager.open_file(&test_file, &mut handle);
        assert!(matches!(result, Err(FileError::FileNotFound(_))));
        assert!(!handle.is_open());
    }

    #[test]
    fn test_open_bound_handle() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let manager = PagedFileManager::new();

        let mut handle = open_new(&manager, &test_file);
        let result = manager.open_file(&test_file, &mut handle);
        assert!(matches!(result, Err(FileError::HandleAlreadyOpen(_))));
    }

    #[test]
    fn test_destroy_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        manager.destroy_file(&test_file).unwrap();
        assert!(!test_file.exists());

        let result = manager.destroy_file(&test_file);
        assert!(matches!(result, Err(FileError::FileNotFound(_))));
    }

    #[test]
    fn test_append_read_write_page() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let manager = PagedFileManager::new();
        let mut handle = open_new(&manager, &test_file);

        let mut write_buffer = vec![0u8; PAGE_SIZE];
        write_buffer[0] = 42;
        write_buffer[100] = 99;
        write_buffer[PAGE_SIZE - 1] = 255;

        assert_eq!(handle.append_page(&write_buffer).unwrap(), 0);

        let mut read_buffer = vec![0u8; PAGE_SIZE];
        handle.read_page(0, &mut read_buffer).unwrap();
        assert_eq!(read_buffer, write_buffer);

        write_buffer[1] = 7;
        handle.write_page(0, &write_buffer).unwrap();
        handle.read_page(0, &mut read_buffer).unwrap();
        assert_eq!(read_buffer[1], 7);
    }

    #[test]
    fn test_append_multiple_pages() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let manager = PagedFileManager::new();
        let mut handle = open_new(&manager, &test_file);

        for page_num in 0..10u32 {
            let mut buffer = vec![0u8; PAGE_SIZE];
            buffer[0] = page_num as u8;
            assert_eq!(handle.append_page(&buffer).unwrap(), page_num);
        }
        assert_eq!(handle.page_count().unwrap(), 10);

        for page_num in 0..10u32 {
            let mut buffer = vec![0u8; PAGE_SIZE];
            handle.read_page(page_num, &mut buffer).unwrap();
            assert_eq!(buffer[0], page_num as u8);
        }
    }

    #[test]
    fn test_read_write_past_end() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let manager = PagedFileManager::new();
        let mut handle = open_new(&manager, &test_file);

        let mut buffer = vec![0u8; PAGE_SIZE];
        let result = handle.read_page(0, &mut buffer);
        assert!(matches!(
            result,
            Err(FileError::PageNotFound {
                page_num: 0,
                page_count: 0
            })
        ));

        let result = handle.write_page(3, &buffer);
        assert!(matches!(result, Err(FileError::PageNotFound { .. })));
        // write_page never grows the file
        assert_eq!(handle.page_count().unwrap(), 0);
    }

    #[test]
    fn test_page_count_seen_across_handles() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let manager = PagedFileManager::new();
        let mut first = open_new(&manager, &test_file);
        let mut second = FileHandle::new();
        manager.open_file(&test_file, &mut second).unwrap();

        let buffer = vec![0u8; PAGE_SIZE];
        first.append_page(&buffer).unwrap();
        first.append_page(&buffer).unwrap();

        assert_eq!(second.page_count().unwrap(), 2);
        assert_eq!(second.append_page(&buffer).unwrap(), 2);
        assert_eq!(first.page_count().unwrap(), 3);
    }

    #[test]
    fn test_counters() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let manager = PagedFileManager::new();
        let mut handle = open_new(&manager, &test_file);

        let mut buffer = vec![0u8; PAGE_SIZE];
        handle.append_page(&buffer).unwrap();
        handle.append_page(&buffer).unwrap();
        handle.write_page(1, &buffer).unwrap();
        handle.read_page(0, &mut buffer).unwrap();
        handle.read_page(1, &mut buffer).unwrap();
        handle.read_page(1, &mut buffer).unwrap();

        // Failed calls are not counted
        let _ = handle.read_page(9, &mut buffer);

        assert_eq!(
            handle.counters(),
            PageCounters {
                reads: 3,
                writes: 1,
                appends: 2
            }
        );
    }

    #[test]
    fn test_invalid_buffer_size() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let manager = PagedFileManager::new();
        let mut handle = open_new(&manager, &test_file);

        let mut small_buffer = vec![0u8; PAGE_SIZE - 1];
        let result = handle.read_page(0, &mut small_buffer);
        assert!(matches!(result, Err(FileError::InvalidPageSize { .. })));

        let large_buffer = vec![0u8; PAGE_SIZE + 1];
        let result = handle.append_page(&large_buffer);
        assert!(matches!(result, Err(FileError::InvalidPageSize { .. })));
    }

    #[test]
    fn test_short_transfer_errors() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(
            short_io(eof, "read", 4),
            FileError::ShortIo {
                op: "read",
                page_num: 4,
                expected: PAGE_SIZE
            }
        ));
        let zero = io::Error::new(io::ErrorKind::WriteZero, "zero");
        assert!(matches!(
            short_io(zero, "write", 2),
            FileError::ShortIo { op: "write", .. }
        ));
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(short_io(denied, "read", 0), FileError::Io(_)));
    }

    #[test]
    fn test_partial_trailing_page_is_ignored() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        std::fs::write(&test_file, vec![7u8; PAGE_SIZE + PAGE_SIZE / 2]).unwrap();

        let manager = PagedFileManager::new();
        let mut handle = FileHandle::new();
        manager.open_file(&test_file, &mut handle).unwrap();
        assert_eq!(handle.page_count().unwrap(), 1);

        let mut buffer = vec![0u8; PAGE_SIZE];
        handle.read_page(0, &mut buffer).unwrap();
        assert!(buffer.iter().all(|&b| b == 7));
        assert!(matches!(
            handle.read_page(1, &mut buffer),
            Err(FileError::PageNotFound { .. })
        ));
    }

    #[test]
    fn test_unbound_handle() {
        let mut handle = FileHandle::new();
        let mut buffer = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            handle.read_page(0, &mut buffer),
            Err(FileError::HandleNotOpen)
        ));
        assert!(matches!(handle.page_count(), Err(FileError::HandleNotOpen)));
    }
}
