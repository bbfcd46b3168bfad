//! Per-invocation scratch storage for uploads and outputs.
//!
//! Each [`ScratchSpace`] owns a uniquely named temporary directory that is
//! removed when the space is dropped, so concurrent requests never see each
//! other's files. Outputs are written with [`write_atomic`]: a failed write
//! leaves no file at the destination.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tempfile::{NamedTempFile, TempDir};

use crate::detect::{validate_upload, DocumentKind};
use crate::error::{Error, Result};
use crate::timeout::run_with_timeout;

/// Default upload ceiling.
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 50 * 1024 * 1024;

/// Default limit for one filesystem call.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Names Windows reserves for devices.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("literal pattern"))
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("literal pattern"))
}

/// Reduce a client-supplied filename to a safe ASCII basename.
///
/// Path separators become spaces, whitespace runs become `_`, anything
/// outside `[A-Za-z0-9_.-]` is removed and leading or trailing `.`/`_`
/// are trimmed. Windows device names get a `_` prefix. The result may be
/// empty.
pub fn secure_filename(filename: &str) -> String {
    let flat = filename.replace(['/', '\\'], " ");
    let joined = whitespace().replace_all(flat.trim(), "_");
    let cleaned = unsafe_chars().replace_all(&joined, "");
    let name = cleaned.trim_matches(|c| c == '.' || c == '_').to_string();

    let stem = name.split('.').next().unwrap_or_default();
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem)) {
        return format!("_{}", name);
    }
    name
}

/// Download name for a compressed upload: `compressed_<name>.pdf`.
pub fn compressed_name(filename: &str) -> String {
    let safe = secure_filename(filename);
    let stem = safe
        .strip_suffix(".pdf")
        .or_else(|| safe.strip_suffix(".PDF"))
        .unwrap_or(&safe);
    if stem.is_empty() {
        "compressed.pdf".to_string()
    } else {
        format!("compressed_{}.pdf", stem)
    }
}

/// Reject sizes above `limit`.
pub fn check_size(size: u64, limit: u64) -> Result<()> {
    if size > limit {
        return Err(Error::OversizedInput { size, limit });
    }
    Ok(())
}

/// Read a file of at most `limit` bytes within `timeout`.
pub fn read_bounded(path: &Path, limit: u64, timeout: Duration) -> Result<Vec<u8>> {
    let path = path.to_path_buf();
    run_with_timeout("read", timeout, move || {
        let size = std::fs::metadata(&path)?.len();
        check_size(size, limit)?;
        Ok(std::fs::read(&path)?)
    })
}

/// Write `data` to `path` through a temporary sibling and rename it into place.
///
/// The write runs under `timeout`; the rename happens on the calling thread
/// only once the write has finished in time. A write that expires leaves
/// its temporary file to be deleted when the worker drops it.
pub fn write_atomic(path: &Path, data: &[u8], timeout: Duration) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let data = data.to_vec();
    let tmp = run_with_timeout("write", timeout, move || {
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    })?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// An upload written into a [`ScratchSpace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Location inside the scratch directory
    pub path: PathBuf,
    /// Name as supplied by the client
    pub original_name: String,
    /// Sanitised name used on disk
    pub stored_name: String,
    pub size: u64,
}

/// A uniquely named scratch directory owned by one invocation.
#[derive(Debug)]
pub struct ScratchSpace {
    dir: TempDir,
    max_upload_size: u64,
    io_timeout: Duration,
}

impl ScratchSpace {
    /// Scratch space under the system temporary directory.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("pdfeditz-").tempdir()?;
        Ok(Self::from_dir(dir))
    }

    /// Scratch space under `root`, which must exist.
    pub fn in_dir(root: impl AsRef<Path>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("pdfeditz-")
            .tempdir_in(root)?;
        Ok(Self::from_dir(dir))
    }

    fn from_dir(dir: TempDir) -> Self {
        log::debug!("Scratch space at {}", dir.path().display());
        Self {
            dir,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    /// Set the upload ceiling.
    pub fn with_max_upload_size(mut self, bytes: u64) -> Self {
        self.max_upload_size = bytes;
        self
    }

    /// Set the limit for each filesystem call.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Directory backing this space.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Upload ceiling in bytes.
    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    /// Per-call filesystem limit.
    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Validate an upload and write it into the space.
    ///
    /// The size ceiling is checked before anything else. Names that clash
    /// with an earlier upload get a numeric prefix.
    pub fn stage_upload(&self, filename: &str, data: &[u8], kind: DocumentKind) -> Result<StagedFile> {
        check_size(data.len() as u64, self.max_upload_size)?;
        validate_upload(filename, data, kind)?;

        let mut stored_name = secure_filename(filename);
        if stored_name.is_empty() || !stored_name.contains('.') {
            stored_name = format!("upload.{}", kind.extension());
        }
        let mut path = self.dir.path().join(&stored_name);
        let mut n = 1;
        while path.exists() {
            let candidate = format!("{}_{}", n, stored_name);
            path = self.dir.path().join(&candidate);
            if !path.exists() {
                stored_name = candidate;
                break;
            }
            n += 1;
        }

        write_atomic(&path, data, self.io_timeout)?;
        log::debug!("Staged {} as {} ({} bytes)", filename, stored_name, data.len());

        Ok(StagedFile {
            path,
            original_name: filename.to_string(),
            stored_name,
            size: data.len() as u64,
        })
    }

    /// Read a staged file back.
    pub fn read(&self, staged: &StagedFile) -> Result<Vec<u8>> {
        read_bounded(&staged.path, self.max_upload_size, self.io_timeout)
    }

    /// Path for an output named `name` inside the space.
    pub fn output_path(&self, name: &str) -> PathBuf {
        let safe = secure_filename(name);
        let safe = if safe.is_empty() { "output.pdf".to_string() } else { safe };
        self.dir.path().join(safe)
    }

    /// Atomically write an output into the space.
    pub fn write_output(&self, name: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.output_path(name);
        write_atomic(&path, data, self.io_timeout)?;
        Ok(path)
    }

    /// Remove the directory now, reporting failures.
    pub fn close(self) -> Result<()> {
        Ok(self.dir.close()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My cool movie.mov"), "My_cool_movie.mov");
        assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("i contain cool \u{fc}ml\u{e4}uts.txt"), "i_contain_cool_mluts.txt");
        assert_eq!(secure_filename("   "), "");
        assert_eq!(secure_filename("con.pdf"), "_con.pdf");
        assert_eq!(secure_filename("__report__.pdf"), "report__.pdf");
    }

    #[test]
    fn test_compressed_name() {
        assert_eq!(compressed_name("report.pdf"), "compressed_report.pdf");
        assert_eq!(compressed_name("Q3 plan.PDF"), "compressed_Q3_plan.pdf");
        assert_eq!(compressed_name("???"), "compressed.pdf");
    }

    #[test]
    fn test_check_size() {
        assert!(check_size(10, 10).is_ok());
        assert!(matches!(
            check_size(11, 10),
            Err(Error::OversizedInput { size: 11, limit: 10 })
        ));
    }

    #[test]
    fn test_stage_upload() {
        let space = ScratchSpace::new().unwrap();
        let staged = space
            .stage_upload("../a report.pdf", b"%PDF-1.4\n", DocumentKind::Pdf)
            .unwrap();
        assert_eq!(staged.stored_name, "a_report.pdf");
        assert!(staged.path.starts_with(space.path()));
        assert_eq!(space.read(&staged).unwrap(), b"%PDF-1.4\n");

        let again = space
            .stage_upload("a report.pdf", b"%PDF-1.5\n", DocumentKind::Pdf)
            .unwrap();
        assert_eq!(again.stored_name, "1_a_report.pdf");
    }

    #[test]
    fn test_stage_upload_ceiling_checked_first() {
        let space = ScratchSpace::new().unwrap().with_max_upload_size(4);
        let err = space
            .stage_upload("notes.txt", b"not a pdf", DocumentKind::Pdf)
            .unwrap_err();
        assert!(matches!(err, Error::OversizedInput { .. }));
    }

    #[test]
    fn test_spaces_are_isolated_and_removed() {
        let a = ScratchSpace::new().unwrap();
        let b = ScratchSpace::new().unwrap();
        assert_ne!(a.path(), b.path());

        let root = a.path().to_path_buf();
        a.write_output("merged.pdf", b"x").unwrap();
        drop(a);
        assert!(!root.exists());
        b.close().unwrap();
    }

    #[test]
    fn test_write_atomic_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        write_atomic(&path, b"one", DEFAULT_IO_TIMEOUT).unwrap();
        write_atomic(&path, b"two", DEFAULT_IO_TIMEOUT).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_read_bounded_rejects_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.pdf");
        std::fs::write(&path, vec![0u8; 64]).unwrap();
        assert!(matches!(
            read_bounded(&path, 32, DEFAULT_IO_TIMEOUT),
            Err(Error::OversizedInput { size: 64, limit: 32 })
        ));
    }
}
