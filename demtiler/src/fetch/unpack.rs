//! Placing a verified download at its final path.

use std::fs::File;
use std::io;
use std::path::Path;

use tempfile::NamedTempFile;

use super::FetchError;

/// How a verified download becomes the source's output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unpack {
    /// The download is the output file.
    Place,
    /// Extract one named member of a zip archive.
    ZipMember(String),
}

impl Unpack {
    /// Moves or extracts `download` onto `output`.
    ///
    /// Extraction goes through a temporary file next to `output`, so the
    /// final path only ever appears complete.
    pub fn apply(&self, download: NamedTempFile, output: &Path) -> Result<(), FetchError> {
        match self {
            Unpack::Place => persist(download, output),
            Unpack::ZipMember(member) => {
                let unpack_err = |reason: String| FetchError::Unpack {
                    path: output.to_path_buf(),
                    reason,
                };
                let file = File::open(download.path()).map_err(|e| FetchError::Io {
                    path: download.path().to_path_buf(),
                    source: e,
                })?;
                let mut archive = zip::ZipArchive::new(file)
                    .map_err(|e| unpack_err(format!("not a zip archive: {}", e)))?;
                let mut entry = archive
                    .by_name(member)
                    .map_err(|e| unpack_err(format!("member '{}': {}", member, e)))?;

                let mut extracted = temp_beside(output)?;
                io::copy(&mut entry, extracted.as_file_mut()).map_err(|e| FetchError::Io {
                    path: extracted.path().to_path_buf(),
                    source: e,
                })?;
                persist(extracted, output)
            }
        }
    }
}

/// Creates a hidden temporary file in the directory that will hold `path`.
pub(crate) fn temp_beside(path: &Path) -> Result<NamedTempFile, FetchError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| FetchError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    tempfile::Builder::new()
        .prefix(".download-")
        .tempfile_in(dir)
        .map_err(|e| FetchError::Io {
            path: dir.to_path_buf(),
            source: e,
        })
}

/// Mode given to every file this crate publishes. Temp files are created
/// owner-only, which would otherwise survive the rename.
#[cfg(unix)]
pub(crate) const PUBLISHED_MODE: u32 = 0o644;

/// Gives a finished temp file the mode of an ordinarily created file.
pub(crate) fn make_published(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(PUBLISHED_MODE))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

fn persist(file: NamedTempFile, output: &Path) -> Result<(), FetchError> {
    make_published(file.path()).map_err(|e| FetchError::Io {
        path: file.path().to_path_buf(),
        source: e,
    })?;
    file.persist(output).map_err(|e| FetchError::Io {
        path: output.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::verify::tests::write_zip;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_place_moves_download() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out").join("file.img");
        let mut download = temp_beside(&output).unwrap();
        download.write_all(b"elevation").unwrap();

        Unpack::Place.apply(download, &output).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"elevation");
    }

    #[cfg(unix)]
    #[test]
    fn test_unpacked_files_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let placed = temp.path().join("placed.img");
        let download = temp_beside(&placed).unwrap();
        std::fs::write(download.path(), b"elevation").unwrap();
        Unpack::Place.apply(download, &placed).unwrap();

        let extracted = temp.path().join("member.tif");
        let download = temp_beside(&extracted).unwrap();
        write_zip(download.path(), &[("member.tif", b"tiff".as_slice())]);
        Unpack::ZipMember("member.tif".to_string())
            .apply(download, &extracted)
            .unwrap();

        for path in [placed, extracted] {
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, PUBLISHED_MODE, "{}", path.display());
        }
    }

    #[test]
    fn test_zip_member_extracts_one_file() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("ETOPO1_Bed_g_geotiff.tif");
        let download = temp_beside(&output).unwrap();
        write_zip(
            download.path(),
            &[
                ("README.txt", b"readme".as_slice()),
                ("ETOPO1_Bed_g_geotiff.tif", b"tiff-bytes".as_slice()),
            ],
        );

        Unpack::ZipMember("ETOPO1_Bed_g_geotiff.tif".to_string())
            .apply(download, &output)
            .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"tiff-bytes");
    }

    #[test]
    fn test_missing_member_leaves_no_output() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("missing.tif");
        let download = temp_beside(&output).unwrap();
        write_zip(download.path(), &[("other.tif", b"x".as_slice())]);

        let result = Unpack::ZipMember("missing.tif".to_string()).apply(download, &output);
        assert!(matches!(result, Err(FetchError::Unpack { .. })));
        assert!(!output.exists());
    }
}
