//! Input resolution: turn the CLI argument into an ordered list of PDFs.
//!
//! A file argument yields itself. A directory yields its `*.pdf` entries
//! sorted by file name; subdirectories are not descended. Contents are not
//! inspected here: [`check_pdf_magic`] runs per file in the batch, so a bad
//! file is reported like any other unopenable PDF instead of vanishing.

use crate::error::RecipeError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolve a file or directory into the PDFs to process, in processing order.
pub fn resolve_inputs(input: &Path) -> Result<Vec<PathBuf>, RecipeError> {
    if !input.exists() {
        return Err(RecipeError::FileNotFound {
            path: input.to_path_buf(),
        });
    }

    if input.is_dir() {
        return resolve_directory(input);
    }

    debug!("Resolved single PDF: {}", input.display());
    Ok(vec![input.to_path_buf()])
}

fn resolve_directory(dir: &Path) -> Result<Vec<PathBuf>, RecipeError> {
    let entries = std::fs::read_dir(dir).map_err(|e| map_io(dir, e))?;

    let mut pdfs: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| map_io(dir, e))?;
        let path = entry.path();
        if path.is_file() && has_pdf_extension(&path) {
            pdfs.push(path);
        }
    }

    // Stable order: by file name, then full path.
    pdfs.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));

    if pdfs.is_empty() {
        return Err(RecipeError::NoPdfsFound {
            path: dir.to_path_buf(),
        });
    }

    info!("Found {} PDF(s) in {}", pdfs.len(), dir.display());
    Ok(pdfs)
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Verify the file starts with `%PDF`. Files shorter than that fail too.
pub fn check_pdf_magic(path: &Path) -> Result<(), RecipeError> {
    let file = std::fs::File::open(path).map_err(|e| map_io(path, e))?;
    let mut head = Vec::with_capacity(4);
    file.take(4)
        .read_to_end(&mut head)
        .map_err(|e| map_io(path, e))?;

    if head != b"%PDF" {
        let mut magic = [0u8; 4];
        magic[..head.len()].copy_from_slice(&head);
        return Err(RecipeError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

fn map_io(path: &Path, e: std::io::Error) -> RecipeError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => RecipeError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => RecipeError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => RecipeError::Internal(format!("{}: {}", path.display(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, bytes).unwrap();
        p
    }

    #[test]
    fn missing_path_is_not_found() {
        let err = resolve_inputs(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, RecipeError::FileNotFound { .. }));
    }

    #[test]
    fn single_pdf_resolves_to_itself() {
        let tmp = TempDir::new().unwrap();
        let p = write(tmp.path(), "flan.pdf", b"%PDF-1.7\n");
        assert_eq!(resolve_inputs(&p).unwrap(), vec![p]);
    }

    #[test]
    fn non_pdf_content_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let p = write(tmp.path(), "notes.pdf", b"hello world");
        let err = check_pdf_magic(&p).unwrap_err();
        assert!(matches!(err, RecipeError::NotAPdf { magic, .. } if &magic == b"hell"));
        assert!(check_pdf_magic(&write(tmp.path(), "ok.pdf", b"%PDF-1.7\n")).is_ok());
    }

    #[test]
    fn short_files_are_not_pdfs() {
        let tmp = TempDir::new().unwrap();
        for (name, bytes) in [("empty.pdf", &b""[..]), ("tiny.pdf", &b"%P"[..])] {
            let err = check_pdf_magic(&write(tmp.path(), name, bytes)).unwrap_err();
            assert!(matches!(err, RecipeError::NotAPdf { .. }), "{name}: {err:?}");
        }
    }

    #[test]
    fn directory_is_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "b_tarta.pdf", b"%PDF-1.4");
        write(tmp.path(), "a_flan.PDF", b"%PDF-1.4");
        write(tmp.path(), "readme.txt", b"%PDF-1.4");
        write(tmp.path(), "c_broken.pdf", b"<html>");
        std::fs::create_dir(tmp.path().join("z_sub.pdf")).unwrap();

        let found = resolve_inputs(tmp.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        // Content is checked later, per file.
        assert_eq!(names, vec!["a_flan.PDF", "b_tarta.pdf", "c_broken.pdf"]);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "readme.txt", b"nothing");
        let err = resolve_inputs(tmp.path()).unwrap_err();
        assert!(matches!(err, RecipeError::NoPdfsFound { .. }));
    }
}
