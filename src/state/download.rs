use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};

/// Receives the body of a successful export. Called exactly once per successful submit.
pub trait DownloadSink {
    /// Store `payload` under `file_name`, returning where it ended up.
    fn deliver(&mut self, file_name: &str, payload: &[u8]) -> anyhow::Result<PathBuf>;
}

/// Saves downloads into a directory.
///
/// The payload is staged in a temporary file next to the target and renamed into place, so a
/// half-written download never shows up under the requested name. The staging file is removed
/// whenever the delivery does not complete.
#[derive(Debug, Clone)]
pub struct FileDownloadSink {
    output_dir: PathBuf,
}

impl FileDownloadSink {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }
}

/// Strip any directory part from a user supplied file name.
fn sanitize_file_name(file_name: &str) -> anyhow::Result<&str> {
    let name = Path::new(file_name.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("'{}' is not a usable file name", file_name))?;
    Ok(name)
}

impl DownloadSink for FileDownloadSink {
    fn deliver(&mut self, file_name: &str, payload: &[u8]) -> anyhow::Result<PathBuf> {
        let file_name = sanitize_file_name(file_name)?;
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Creating download directory {:?}", self.output_dir))?;

        let mut staged = tempfile::NamedTempFile::new_in(&self.output_dir)?;
        staged.write_all(payload)?;
        staged.flush()?;

        let target = self.output_dir.join(file_name);
        staged
            .persist(&target)
            .map_err(|err| anyhow!("Could not save download to {:?}: {}", target, err.error))?;
        log::info!("Saved {} bytes to {:?}", payload.len(), target);
        Ok(target)
    }
}

#[cfg(test)]
pub mod tests {
    use std::{fs, path::PathBuf};

    use anyhow::anyhow;
    use rstest::rstest;
    use testdir::testdir;

    use super::{DownloadSink, FileDownloadSink};

    /// Keeps deliveries in memory.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub deliveries: Vec<(String, Vec<u8>)>,
        pub fail: bool,
    }

    impl DownloadSink for RecordingSink {
        fn deliver(&mut self, file_name: &str, payload: &[u8]) -> anyhow::Result<PathBuf> {
            if self.fail {
                return Err(anyhow!("disk full"));
            }
            self.deliveries
                .push((file_name.to_string(), payload.to_vec()));
            Ok(PathBuf::from(file_name))
        }
    }

    #[rstest]
    fn test_file_sink_writes_payload_without_leftovers() {
        let test_dir = testdir!();
        let output_dir = test_dir.join("downloads");
        let mut sink = FileDownloadSink::new(&output_dir);

        let saved = sink.deliver("parcels.kml", b"<kml/>").unwrap();

        assert_eq!(saved, output_dir.join("parcels.kml"));
        assert_eq!(fs::read(&saved).unwrap(), b"<kml/>");
        assert_eq!(fs::read_dir(&output_dir).unwrap().count(), 1);
    }

    #[rstest]
    fn test_file_sink_strips_directories_from_name() {
        let test_dir = testdir!();
        let mut sink = FileDownloadSink::new(&test_dir);

        let saved = sink.deliver("../../etc/parcels.zip", b"PK").unwrap();

        assert_eq!(saved, test_dir.join("parcels.zip"));
    }

    #[rstest]
    #[case("")]
    #[case("..")]
    #[case("  ")]
    fn test_file_sink_rejects_unusable_names(#[case] file_name: &str) {
        let test_dir = testdir!();
        let output_dir = test_dir.join("downloads");
        let mut sink = FileDownloadSink::new(&output_dir);

        assert!(sink.deliver(file_name, b"data").is_err());
        assert!(!output_dir.exists());
    }
}
