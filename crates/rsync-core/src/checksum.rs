//! MD5 integrity verification used by the checksum-suffix code path.

use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::file_system::FsError;

/// Computes the hex-encoded (lowercase, no newline) MD5 digest of a file.
pub fn md5_hex_of_file(path: &Path) -> Result<String, FsError> {
    let mut file = std::fs::File::open(path).map_err(|e| map_io_error(e, path))?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| map_io_error(e, path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn map_io_error(e: std::io::Error, path: &Path) -> FsError {
    match e.kind() {
        std::io::ErrorKind::NotFound => FsError::NotFound(path.display().to_string()),
        std::io::ErrorKind::PermissionDenied => {
            FsError::PermissionDenied(path.display().to_string())
        }
        _ => FsError::IoError(format!("{}: {}", path.display(), e)),
    }
}

/// Writes the checksum sidecar file (`<target>.md5`, no trailing newline).
pub fn write_sidecar(target: &Path, hex_digest: &str) -> Result<(), FsError> {
    let sidecar = sidecar_path(target);
    std::fs::write(&sidecar, hex_digest).map_err(|e| map_io_error(e, &sidecar))
}

pub fn sidecar_path(target: &Path) -> std::path::PathBuf {
    let mut s = target.as_os_str().to_os_string();
    s.push(".md5");
    std::path::PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn md5_of_known_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let digest = md5_hex_of_file(&path).unwrap();
        assert_eq!(digest, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn sidecar_path_appends_suffix() {
        let path = Path::new("/mnt/b/F/f.bin");
        assert_eq!(sidecar_path(path), Path::new("/mnt/b/F/f.bin.md5"));
    }

    #[test]
    fn write_and_read_sidecar() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("f.bin");
        std::fs::write(&target, b"data").unwrap();
        write_sidecar(&target, "deadbeef").unwrap();
        let contents = std::fs::read_to_string(sidecar_path(&target)).unwrap();
        assert_eq!(contents, "deadbeef");
    }
}
