//! Archive unpacking for the downloaded client

use flate2::read::GzDecoder;
use std::fs::File;
use std::path::Path;
use tar::Archive;

/// Unpacks a downloaded archive into a directory
pub trait ArchiveExtractor: Send + Sync {
    fn extract(&self, archive: &Path, destination: &Path) -> std::io::Result<()>;
}

/// Picks the format from the file name: `.zip`, otherwise gzipped tar
#[derive(Debug, Clone, Default)]
pub struct DefaultExtractor;

impl ArchiveExtractor for DefaultExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> std::io::Result<()> {
        tracing::debug!("Extracting {:?} into {:?}", archive, destination);
        std::fs::create_dir_all(destination)?;

        let is_zip = archive
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        if is_zip {
            extract_zip(archive, destination)
        } else {
            extract_tar_gz(archive, destination)
        }
    }
}

fn extract_tar_gz(archive: &Path, destination: &Path) -> std::io::Result<()> {
    let file = File::open(archive)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_preserve_ownerships(false);
    archive.unpack(destination)
}

fn extract_zip(archive: &Path, destination: &Path) -> std::io::Result<()> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    zip.extract(destination)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
