use crate::config::FileEditPlan;
use crate::line::{LineError, LinePatcher, LiteralPatcher};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use thiserror::Error;
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Underlying cause of a failed edit or restore.
#[derive(Error, Debug)]
pub enum EditFailure {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("line {line} is past the end of the file ({total} lines)")]
    LineOutOfRange { line: usize, total: usize },

    #[error("line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: LineError,
    },

    #[error("file is read-only")]
    ReadOnly,

    #[error("content on disk does not match the backup")]
    ContentMismatch,
}

#[derive(Error, Debug)]
pub enum EditError {
    /// A directive names a variable that does not occur on its line.
    #[error("in {}: variable `{variable}` could not be found on line {line}", .file.display())]
    VariableNotFound {
        file: PathBuf,
        line: usize,
        variable: String,
    },

    /// Any other failure while backing up, scanning or rewriting a file.
    #[error("failed to edit file {}: {source}", .file.display())]
    FileEditFailed {
        file: PathBuf,
        #[source]
        source: EditFailure,
    },

    /// The pristine content could not be put back. The backup is kept.
    #[error("failed to restore {} from {}: {source}", .file.display(), .backup.display())]
    RestoreFailed {
        file: PathBuf,
        backup: PathBuf,
        #[source]
        source: EditFailure,
    },
}

/// Pristine copy of a file taken before it was patched.
///
/// A `Backup` exists exactly while its file is patched: [`Backup::restore`]
/// consumes it, and dropping it deletes the copy without touching the file.
#[must_use = "a Backup must be restored or discarded"]
pub struct Backup {
    file: PathBuf,
    copy: TempPath,
    /// xxh3 of the pristine bytes
    digest: u64,
}

impl fmt::Debug for Backup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backup")
            .field("file", &self.file)
            .field("copy", &self.copy.to_path_buf())
            .field("digest", &format_args!("{:016x}", self.digest))
            .finish()
    }
}

impl Backup {
    fn create(file: &Path, content: &[u8], dir: Option<&Path>) -> Result<Self, EditFailure> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(".softshell-backup-");
        let mut temp = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        temp.write_all(content)?;
        temp.as_file().sync_all()?;

        Ok(Self {
            file: file.to_path_buf(),
            copy: temp.into_temp_path(),
            digest: xxh3_64(content),
        })
    }

    /// The file this backup belongs to.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Where the pristine copy lives.
    pub fn path(&self) -> &Path {
        &self.copy
    }

    /// The pristine content.
    pub fn original(&self) -> Result<Vec<u8>, EditError> {
        fs::read(&self.copy).map_err(|e| self.restore_failed(e.into()))
    }

    /// Copy the pristine content back over the file and delete the backup.
    ///
    /// On failure the backup copy is kept on disk and its path is reported in
    /// [`EditError::RestoreFailed`].
    pub fn restore(self) -> Result<(), EditError> {
        if let Err(source) = self.write_back() {
            let file = self.file.clone();
            let backup = match self.copy.keep() {
                Ok(kept) => kept,
                Err(e) => e.path.to_path_buf(),
            };
            return Err(EditError::RestoreFailed {
                file,
                backup,
                source,
            });
        }

        debug!(file = %self.file.display(), "restored from backup");
        self.discard()
    }

    /// Delete the backup without restoring.
    pub fn discard(self) -> Result<(), EditError> {
        let file = self.file;
        let backup = self.copy.to_path_buf();
        self.copy.close().map_err(|e| EditError::RestoreFailed {
            file,
            backup,
            source: e.into(),
        })
    }

    fn write_back(&self) -> Result<(), EditFailure> {
        let content = fs::read(&self.copy)?;
        if xxh3_64(&content) != self.digest {
            return Err(EditFailure::ContentMismatch);
        }

        atomic_write(&self.file, &content)?;

        if xxh3_64(&fs::read(&self.file)?) != self.digest {
            return Err(EditFailure::ContentMismatch);
        }
        Ok(())
    }

    fn restore_failed(&self, source: EditFailure) -> EditError {
        EditError::RestoreFailed {
            file: self.file.clone(),
            backup: self.copy.to_path_buf(),
            source,
        }
    }
}

/// Backs up, patches and restores single files.
pub struct FileTransaction {
    patcher: Box<dyn LinePatcher>,
    backup_dir: Option<PathBuf>,
}

impl Default for FileTransaction {
    fn default() -> Self {
        Self::new(LiteralPatcher)
    }
}

impl FileTransaction {
    pub fn new(patcher: impl LinePatcher + 'static) -> Self {
        Self {
            patcher: Box::new(patcher),
            backup_dir: None,
        }
    }

    /// Keep backups in `dir` instead of the system temp directory.
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    /// Back up `file`, then apply every directive of `plan` to it.
    ///
    /// Symlinks are resolved first, so the link survives and its target is
    /// edited. Read-only files are refused.
    ///
    /// The file is written once, after all directives succeed. On any failure
    /// the file is restored from the backup before the error is returned.
    pub fn apply(&self, file: &Path, plan: &FileEditPlan) -> Result<Backup, EditError> {
        let failed = |source: EditFailure| EditError::FileEditFailed {
            file: file.to_path_buf(),
            source,
        };

        // Patch the file a symlink points at, never the link itself.
        let target = fs::canonicalize(file).map_err(|e| failed(e.into()))?;
        if fs::metadata(&target).map_err(|e| failed(e.into()))?.permissions().readonly() {
            return Err(failed(EditFailure::ReadOnly));
        }

        let original = fs::read(&target).map_err(|e| failed(e.into()))?;
        let backup =
            Backup::create(&target, &original, self.backup_dir.as_deref()).map_err(failed)?;
        info!(
            file = %file.display(),
            backup = %backup.path().display(),
            "backup created"
        );

        let written = self
            .patch(file, &original, plan)
            .and_then(|patched| atomic_write(&target, &patched).map_err(failed));

        match written {
            Ok(()) => {
                debug!(file = %file.display(), directives = plan.directives.len(), "file edited");
                Ok(backup)
            }
            Err(error) => {
                warn!(file = %file.display(), %error, "edit failed, reverting to original copy");
                if let Err(restore_error) = backup.restore() {
                    warn!(error = %restore_error, "revert after failed edit did not complete");
                }
                Err(error)
            }
        }
    }

    /// Compute the patched content without touching the disk.
    fn patch(&self, file: &Path, original: &[u8], plan: &FileEditPlan) -> Result<Vec<u8>, EditError> {
        let failed = |source: EditFailure| EditError::FileEditFailed {
            file: file.to_path_buf(),
            source,
        };

        let text = std::str::from_utf8(original).map_err(|e| failed(e.into()))?;
        let lines = plan.by_line();

        if let Some((&last, _)) = lines.last_key_value() {
            let total = text.split_inclusive('\n').count();
            if last > total {
                return Err(failed(EditFailure::LineOutOfRange { line: last, total }));
            }
        }

        let mut out = String::with_capacity(text.len() + 64);
        for (idx, raw) in text.split_inclusive('\n').enumerate() {
            let line_number = idx + 1;
            let Some(directives) = lines.get(&line_number) else {
                out.push_str(raw);
                continue;
            };

            let (body, ending) = split_line_ending(raw);
            let mut body = body.to_string();
            for directive in directives {
                let value = directive.value.to_string();
                body = self
                    .patcher
                    .edit(&body, &directive.variable, &value)
                    .map_err(|error| match error {
                        LineError::VariableNotFound { variable } => EditError::VariableNotFound {
                            file: file.to_path_buf(),
                            line: line_number,
                            variable,
                        },
                        other => failed(EditFailure::Line {
                            line: line_number,
                            source: other,
                        }),
                    })?;
                debug!(line = line_number, variable = %directive.variable, %value, "directive applied");
            }

            out.push_str(&body);
            out.push_str(ending);
        }

        Ok(out.into_bytes())
    }
}

fn split_line_ending(raw: &str) -> (&str, &str) {
    if let Some(body) = raw.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = raw.strip_suffix('\n') {
        (body, "\n")
    } else {
        (raw, "")
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// The replacement keeps the permissions of the file it replaces.
fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditFailure> {
    // Create tempfile in same directory to ensure same filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let permissions = fs::metadata(path)?.permissions();
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;

    temp.write_all(content)?;
    temp.as_file().set_permissions(permissions)?;
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EditDirective, Scalar};
    use crate::line::SpanPatcher;

    fn directive(line_number: usize, variable: &str, value: Scalar) -> EditDirective {
        EditDirective {
            line_number,
            variable: variable.to_string(),
            value,
        }
    }

    fn plan(directives: Vec<EditDirective>) -> FileEditPlan {
        FileEditPlan { directives }
    }

    const SOURCE: &str = "LEARNING_RATE = 0.1\nDECAY = 0.5\nmodel = build(lr=LEARNING_RATE, depth=4)\n";

    #[test]
    fn test_apply_then_restore_is_byte_exact() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("train.py");
        fs::write(&file, SOURCE).unwrap();

        let tx = FileTransaction::default();
        let backup = tx
            .apply(
                &file,
                &plan(vec![
                    directive(1, "LEARNING_RATE", Scalar::Float(0.3)),
                    directive(3, "depth", Scalar::Int(8)),
                ]),
            )
            .unwrap();

        let patched = fs::read_to_string(&file).unwrap();
        assert_eq!(
            patched,
            "LEARNING_RATE = 0.3\nDECAY = 0.5\nmodel = build(lr=LEARNING_RATE, depth=8)\n"
        );
        let backup_path = backup.path().to_path_buf();
        assert!(backup_path.exists());
        assert_eq!(backup.original().unwrap(), SOURCE.as_bytes());

        backup.restore().unwrap();
        assert_eq!(fs::read(&file).unwrap(), SOURCE.as_bytes());
        assert!(!backup_path.exists());
    }

    #[test]
    fn test_same_line_directives_apply_in_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, "f(a=1, b=2)\n").unwrap();

        let tx = FileTransaction::default();
        let backup = tx
            .apply(
                &file,
                &plan(vec![
                    directive(1, "b", Scalar::Int(5)),
                    directive(1, "a", Scalar::Int(3)),
                    directive(1, "b", Scalar::Int(6)),
                ]),
            )
            .unwrap();

        assert_eq!(fs::read_to_string(&file).unwrap(), "f(a=3, b=6)\n");
        backup.restore().unwrap();
    }

    #[test]
    fn test_failed_directive_leaves_file_untouched() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("train.py");
        fs::write(&file, SOURCE).unwrap();

        let tx = FileTransaction::default();
        let err = tx
            .apply(
                &file,
                &plan(vec![
                    directive(1, "LEARNING_RATE", Scalar::Float(0.3)),
                    directive(2, "MOMENTUM", Scalar::Float(0.9)),
                    directive(3, "depth", Scalar::Int(8)),
                ]),
            )
            .unwrap_err();

        match &err {
            EditError::VariableNotFound {
                file: path,
                line,
                variable,
            } => {
                assert_eq!(path, &file);
                assert_eq!(*line, 2);
                assert_eq!(variable, "MOMENTUM");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("MOMENTUM"));
        assert_eq!(fs::read_to_string(&file).unwrap(), SOURCE);
    }

    #[test]
    fn test_unassigned_variable_is_file_edit_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, "print(x)\n").unwrap();

        let err = FileTransaction::default()
            .apply(&file, &plan(vec![directive(1, "x", Scalar::Int(1))]))
            .unwrap_err();
        assert!(matches!(
            err,
            EditError::FileEditFailed {
                source: EditFailure::Line { line: 1, .. },
                ..
            }
        ));
        assert_eq!(fs::read_to_string(&file).unwrap(), "print(x)\n");
    }

    #[test]
    fn test_line_past_end_of_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, "x = 1\n").unwrap();

        let err = FileTransaction::default()
            .apply(&file, &plan(vec![directive(2, "x", Scalar::Int(1))]))
            .unwrap_err();
        assert!(matches!(
            err,
            EditError::FileEditFailed {
                source: EditFailure::LineOutOfRange { line: 2, total: 1 },
                ..
            }
        ));
    }

    #[test]
    fn test_missing_file_is_file_edit_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("missing.txt");

        let err = FileTransaction::default()
            .apply(&file, &plan(vec![directive(1, "x", Scalar::Int(1))]))
            .unwrap_err();
        assert!(matches!(
            err,
            EditError::FileEditFailed {
                source: EditFailure::Io(_),
                ..
            }
        ));
    }

    #[test]
    fn test_non_utf8_file_is_file_edit_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("blob.bin");
        fs::write(&file, [b'x', b'=', 0xff, b'\n']).unwrap();

        let err = FileTransaction::default()
            .apply(&file, &plan(vec![directive(1, "x", Scalar::Int(1))]))
            .unwrap_err();
        assert!(matches!(
            err,
            EditError::FileEditFailed {
                source: EditFailure::Utf8(_),
                ..
            }
        ));
        assert_eq!(fs::read(&file).unwrap(), vec![b'x', b'=', 0xff, b'\n']);
    }

    #[test]
    fn test_line_endings_and_missing_final_newline_preserved() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("a.cfg");
        fs::write(&file, "a = 1\r\nb = 2").unwrap();

        let backup = FileTransaction::new(SpanPatcher)
            .apply(
                &file,
                &plan(vec![
                    directive(1, "a", Scalar::Int(10)),
                    directive(2, "b", Scalar::Int(20)),
                ]),
            )
            .unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "a = 10\r\nb = 20");

        backup.restore().unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "a = 1\r\nb = 2");
    }

    #[test]
    fn test_empty_plan_rewrites_unchanged() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, SOURCE).unwrap();

        let backup = FileTransaction::default()
            .apply(&file, &FileEditPlan::default())
            .unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), SOURCE);
        backup.restore().unwrap();
    }

    #[test]
    fn test_discard_keeps_patched_content() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, "x = 1\n").unwrap();

        let backup = FileTransaction::default()
            .with_backup_dir(temp_dir.path())
            .apply(&file, &plan(vec![directive(1, "x", Scalar::Int(2))]))
            .unwrap();
        let backup_path = backup.path().to_path_buf();
        assert!(backup_path.starts_with(temp_dir.path()));

        backup.discard().unwrap();
        assert!(!backup_path.exists());
        assert_eq!(fs::read_to_string(&file).unwrap(), "x = 2\n");
    }

    #[test]
    fn test_restore_overwrites_external_changes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, "x = 1\n").unwrap();

        let backup = FileTransaction::default()
            .apply(&file, &plan(vec![directive(1, "x", Scalar::Int(2))]))
            .unwrap();
        fs::write(&file, "garbage written by the command\n").unwrap();

        backup.restore().unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "x = 1\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_permissions_survive_edit_and_restore() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("run.sh");
        fs::write(&file, "N=1\n").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o755)).unwrap();

        let backup = FileTransaction::default()
            .apply(&file, &plan(vec![directive(1, "N", Scalar::Int(4))]))
            .unwrap();
        let mode = fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);

        backup.restore().unwrap();
        let mode = fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_is_followed_and_kept() {
        let temp_dir = tempfile::tempdir().unwrap();
        let real = temp_dir.path().join("real.py");
        let link = temp_dir.path().join("link.py");
        fs::write(&real, "X = 0\n").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let backup = FileTransaction::default()
            .apply(&link, &plan(vec![directive(1, "X", Scalar::Int(5))]))
            .unwrap();
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real).unwrap(), "X = 5\n");
        assert_eq!(fs::read_to_string(&link).unwrap(), "X = 5\n");

        backup.restore().unwrap();
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), real);
        assert_eq!(fs::read_to_string(&real).unwrap(), "X = 0\n");
    }

    #[test]
    fn test_read_only_file_is_refused() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("locked.txt");
        fs::write(&file, "x = 1\n").unwrap();
        let mut permissions = fs::metadata(&file).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&file, permissions).unwrap();

        let err = FileTransaction::default()
            .apply(&file, &plan(vec![directive(1, "x", Scalar::Int(2))]))
            .unwrap_err();
        assert!(matches!(
            err,
            EditError::FileEditFailed {
                source: EditFailure::ReadOnly,
                ..
            }
        ));
        assert_eq!(fs::read_to_string(&file).unwrap(), "x = 1\n");

        let mut permissions = fs::metadata(&file).unwrap().permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
        fs::set_permissions(&file, permissions).unwrap();
    }

    #[test]
    fn test_tampered_backup_is_kept_on_restore_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, "x = 1\n").unwrap();

        let backup = FileTransaction::default()
            .with_backup_dir(backups.path())
            .apply(&file, &plan(vec![directive(1, "x", Scalar::Int(2))]))
            .unwrap();
        let copy = backup.path().to_path_buf();
        fs::write(&copy, "x = 999\n").unwrap();

        match backup.restore().unwrap_err() {
            EditError::RestoreFailed {
                backup: kept,
                source: EditFailure::ContentMismatch,
                ..
            } => {
                assert_eq!(kept, copy);
                assert!(kept.exists());
                assert_eq!(fs::read_to_string(&kept).unwrap(), "x = 999\n");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read_to_string(&file).unwrap(), "x = 2\n");
    }
}
