use crate::config::StoreMode;
use std::path::{Path, PathBuf};

/// Suffix carried by every intermediate file.
pub const TEMP_SUFFIX: &str = ".tmp";

/// On-disk locations owned by a single transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Where the received (compressed) body is written
    pub received: PathBuf,
    /// Where the decompressor writes, only used when storing as mzML
    pub decompressed: PathBuf,
    /// The artifact external readers see once the transfer is stored
    pub final_path: PathBuf,
}

impl ArtifactPaths {
    pub fn new(output_dir: &Path, filename: &str, transfer_id: &str, store_as: StoreMode) -> Self {
        let stem = file_stem(filename);
        let final_name = match store_as {
            StoreMode::Msz => format!("{stem}.msz"),
            StoreMode::Mzml => format!("{stem}.mzML"),
        };

        Self {
            received: output_dir.join(format!("{stem}.{transfer_id}.msz{TEMP_SUFFIX}")),
            decompressed: output_dir.join(format!("{stem}.{transfer_id}.mzML{TEMP_SUFFIX}")),
            final_path: output_dir.join(final_name),
        }
    }

    /// Intermediates that must not outlive the transfer.
    pub fn temporaries(&self) -> [&Path; 2] {
        [self.received.as_path(), self.decompressed.as_path()]
    }
}

fn file_stem(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("unnamed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_for_msz_mode() {
        let paths = ArtifactPaths::new(Path::new("/out"), "run01.mzML", "abc", StoreMode::Msz);
        assert_eq!(paths.final_path, PathBuf::from("/out/run01.msz"));
        assert_eq!(paths.received, PathBuf::from("/out/run01.abc.msz.tmp"));
        assert!(paths.received.to_string_lossy().ends_with(TEMP_SUFFIX));
        assert!(!paths.final_path.to_string_lossy().ends_with(TEMP_SUFFIX));
    }

    #[test]
    fn test_paths_for_mzml_mode() {
        let paths = ArtifactPaths::new(Path::new("/out"), "run01.msz", "abc", StoreMode::Mzml);
        assert_eq!(paths.final_path, PathBuf::from("/out/run01.mzML"));
        assert_eq!(paths.decompressed, PathBuf::from("/out/run01.abc.mzML.tmp"));
        assert!(
            paths
                .temporaries()
                .iter()
                .all(|p| p.to_string_lossy().ends_with(TEMP_SUFFIX))
        );
    }

    #[test]
    fn test_stem_uses_last_extension_only() {
        let paths = ArtifactPaths::new(Path::new("out"), "a.b.mszx", "id", StoreMode::Msz);
        assert_eq!(paths.final_path, PathBuf::from("out/a.b.msz"));
    }
}
