use std::{
    fmt,
    fs::{self, Permissions},
    io::{self, BufWriter, Stdout, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use tar::Builder;
use tempfile::NamedTempFile;

use crate::{utils::STDIO_PATH, OcidistError, OcidistResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const TEMP_PREFIX: &str = ".ocidist-";

const TEMP_SUFFIX: &str = ".tmp";

#[cfg(unix)]
const OUTPUT_MODE: u32 = 0o644;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Where a flattened archive goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// A file, replaced atomically once the archive is complete.
    File(PathBuf),

    /// Standard output.
    Stdout,
}

/// A byte sink for an [`OutputTarget`].
///
/// Nothing appears at a file target until [`commit`](OutputSink::commit). Dropping the sink
/// earlier removes the staged file.
pub struct OutputSink {
    inner: SinkInner,
}

enum SinkInner {
    Temp(BufWriter<NamedTempFile>, PathBuf),
    Stdout(BufWriter<Stdout>),
}

/// A tar builder bound to an [`OutputTarget`].
///
/// For file targets the archive is written to a temporary file next to the destination and only
/// renamed into place by [`finish`](StreamWriter::finish). Dropping the writer earlier removes
/// the temporary file and leaves any existing destination untouched.
pub struct StreamWriter {
    target: OutputTarget,
    archive: Builder<OutputSink>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl OutputTarget {
    /// Returns true if the archive goes to standard output.
    pub fn is_stdout(&self) -> bool {
        matches!(self, OutputTarget::Stdout)
    }

    /// Refuses standard output when it is a terminal, where binary output would only garble the
    /// screen.
    ///
    /// ## Errors
    ///
    /// Returns [`OcidistError::TerminalOutput`] if this is [`OutputTarget::Stdout`] and
    /// `stdout_is_terminal` is set.
    pub fn ensure_not_terminal(&self, stdout_is_terminal: bool) -> OcidistResult<()> {
        if self.is_stdout() && stdout_is_terminal {
            return Err(OcidistError::TerminalOutput);
        }

        Ok(())
    }
}

impl StreamWriter {
    /// Opens the sink for `target`.
    pub fn create(target: OutputTarget) -> OcidistResult<Self> {
        let sink = OutputSink::create(&target)?;
        Ok(Self {
            target,
            archive: Builder::new(sink),
        })
    }

    /// The tar builder entries are appended to.
    pub fn archive(&mut self) -> &mut Builder<OutputSink> {
        &mut self.archive
    }

    /// Writes the archive trailer, flushes, and moves the output into place.
    pub fn finish(self) -> OcidistResult<()> {
        self.archive.into_inner()?.commit()
    }
}

impl OutputSink {
    /// Opens a sink for `target`. File targets are staged in a temporary file next to the
    /// destination.
    pub fn create(target: &OutputTarget) -> OcidistResult<Self> {
        let inner = match target {
            OutputTarget::File(path) => {
                let parent = match path.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent,
                    _ => Path::new("."),
                };

                let file = tempfile::Builder::new()
                    .prefix(TEMP_PREFIX)
                    .suffix(TEMP_SUFFIX)
                    .tempfile_in(parent)?;
                tracing::debug!("staging output in {}", file.path().display());

                SinkInner::Temp(BufWriter::new(file), path.clone())
            }
            OutputTarget::Stdout => SinkInner::Stdout(BufWriter::new(io::stdout())),
        };

        Ok(Self { inner })
    }

    /// Flushes and, for file targets, syncs and renames the staged file over the destination.
    pub fn commit(self) -> OcidistResult<()> {
        match self.inner {
            SinkInner::Temp(writer, path) => {
                let file = writer.into_inner().map_err(|e| e.into_error())?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(file.path(), Permissions::from_mode(OUTPUT_MODE))?;
                }

                file.as_file().sync_all()?;
                file.persist(&path).map_err(|e| e.error)?;
                tracing::info!("wrote {}", path.display());
            }
            SinkInner::Stdout(mut writer) => writer.flush()?,
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for OutputTarget {
    type Err = OcidistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err(OcidistError::custom(anyhow::anyhow!("empty output path"))),
            STDIO_PATH => Ok(OutputTarget::Stdout),
            path => Ok(OutputTarget::File(PathBuf::from(path))),
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::File(path) => write!(f, "{}", path.display()),
            OutputTarget::Stdout => write!(f, "<stdout>"),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.inner {
            SinkInner::Temp(w, _) => w.write(buf),
            SinkInner::Stdout(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            SinkInner::Temp(w, _) => w.flush(),
            SinkInner::Stdout(w) => w.flush(),
        }
    }
}

impl fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamWriter")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Read;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_output_target_from_str() -> anyhow::Result<()> {
        assert_eq!("-".parse::<OutputTarget>()?, OutputTarget::Stdout);
        assert_eq!(
            "out/rootfs.tar".parse::<OutputTarget>()?,
            OutputTarget::File(PathBuf::from("out/rootfs.tar"))
        );
        assert!("".parse::<OutputTarget>().is_err());
        Ok(())
    }

    #[test]
    fn test_output_target_refuses_terminal_stdout() -> anyhow::Result<()> {
        let err = OutputTarget::Stdout.ensure_not_terminal(true).unwrap_err();
        assert!(matches!(err, OcidistError::TerminalOutput));

        OutputTarget::Stdout.ensure_not_terminal(false)?;
        OutputTarget::File(PathBuf::from("rootfs.tar")).ensure_not_terminal(true)?;
        Ok(())
    }

    #[test]
    fn test_stream_writer_persists_on_finish() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let dest = dir.path().join("rootfs.tar");

        let mut writer = StreamWriter::create(OutputTarget::File(dest.clone()))?;
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o600);
        writer
            .archive()
            .append_data(&mut header, "hello.txt", &b"hello"[..])?;
        assert!(!dest.exists());

        writer.finish()?;

        let mut archive = tar::Archive::new(fs::File::open(&dest)?);
        let mut entries = archive.entries()?;
        let mut entry = entries.next().expect("one entry")?;
        assert_eq!(entry.path()?.to_str(), Some("hello.txt"));
        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        assert_eq!(content, "hello");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(fs::metadata(&dest)?.permissions().mode() & 0o777, 0o644);
        }

        let leftovers: Vec<_> = fs::read_dir(dir.path())?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn test_stream_writer_drop_leaves_destination_untouched() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let dest = dir.path().join("rootfs.tar");
        fs::write(&dest, b"previous")?;

        {
            let mut writer = StreamWriter::create(OutputTarget::File(dest.clone()))?;
            let mut header = tar::Header::new_gnu();
            header.set_size(0);
            writer
                .archive()
                .append_data(&mut header, "partial", io::empty())?;
        }

        assert_eq!(fs::read(&dest)?, b"previous");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }
}
