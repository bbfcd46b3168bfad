//! Integration tests for per-request scratch storage.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pdfeditz::staging::{secure_filename, write_atomic, DEFAULT_IO_TIMEOUT};
use pdfeditz::{DocumentKind, Error, PdfEditz, ScratchSpace};

#[test]
fn test_concurrent_requests_do_not_share_files() {
    let service = Arc::new(PdfEditz::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let space = service.scratch().unwrap();
                let body = format!("%PDF-1.4\n% request {}\n", i);
                let staged = space
                    .stage_upload("upload.pdf", body.as_bytes(), DocumentKind::Pdf)
                    .unwrap();
                assert_eq!(staged.stored_name, "upload.pdf");
                assert_eq!(space.read(&staged).unwrap(), body.as_bytes());
                space.path().to_path_buf()
            })
        })
        .collect();

    let mut dirs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for dir in &dirs {
        assert!(!dir.exists());
    }
    dirs.sort();
    dirs.dedup();
    assert_eq!(dirs.len(), 8);
}

#[test]
fn test_scratch_root_is_respected() {
    let root = tempfile::tempdir().unwrap();
    let service = PdfEditz::new().with_scratch_root(root.path());
    let space = service.scratch().unwrap();
    assert!(space.path().starts_with(root.path()));
    assert!(space
        .path()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("pdfeditz-"));
}

#[test]
fn test_upload_validation() {
    let space = ScratchSpace::new().unwrap();
    assert!(matches!(
        space.stage_upload("a.pdf", b"", DocumentKind::Pdf),
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        space.stage_upload("a.pdf", b"<html>", DocumentKind::Pdf),
        Err(Error::UnknownFormat)
    ));
    assert!(space
        .stage_upload("letter.docx", b"PK\x03\x04 body", DocumentKind::Docx)
        .is_ok());
}

#[test]
fn test_failed_write_leaves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("missing").join("out.pdf");
    assert!(write_atomic(&target, b"data", DEFAULT_IO_TIMEOUT).is_err());
    assert!(!target.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_expired_write_never_appears() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.pdf");
    let data = vec![b'x'; 16 * 1024 * 1024];

    let err = write_atomic(&target, &data, Duration::from_micros(1)).unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));

    // the detached worker finishes its write, then discards it
    for _ in 0..40 {
        assert!(!target.exists());
        thread::sleep(Duration::from_millis(25));
    }
    for _ in 0..200 {
        if std::fs::read_dir(dir.path()).unwrap().count() == 0 {
            break;
        }
        thread::sleep(Duration::from_millis(25));
    }
    assert!(!target.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_secure_filename_strips_paths() {
    assert_eq!(secure_filename("C:\\Users\\me\\report.pdf"), "C_Users_me_report.pdf");
    assert_eq!(secure_filename("/tmp/../etc/shadow"), "tmp_.._etc_shadow");
}
