//! Filesystem-type allowlist probe, mirroring the `FileSystem`/`RealFileSystem`
//! trait split so tests can substitute a fake without touching real mounts.

use std::ffi::CString;
use std::path::Path;

const NFS_MAGIC: i64 = 0x6969;
const LUSTRE_V1_MAGIC: i64 = 0x0BD0_0BD0;
const LUSTRE_V2_MAGIC: i64 = 0x0BD0_0BD1;

pub trait MountProbe {
    /// Returns the raw `statfs` magic number for the filesystem backing `path`,
    /// or `None` if the probe itself failed (path missing, syscall error).
    fn magic(&self, path: &Path) -> Option<i64>;
}

pub struct RealMountProbe;

impl RealMountProbe {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RealMountProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MountProbe for RealMountProbe {
    #[cfg(target_os = "linux")]
    fn magic(&self, path: &Path) -> Option<i64> {
        let c_path = CString::new(path.to_str()?).ok()?;
        unsafe {
            let mut stat: libc::statfs = std::mem::zeroed();
            if libc::statfs(c_path.as_ptr(), &mut stat) != 0 {
                return None;
            }
            Some(stat.f_type as i64)
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn magic(&self, _path: &Path) -> Option<i64> {
        None
    }
}

/// Returns `true` if `magic` is one of the allowed network-filesystem types
/// (NFS, Lustre v1, Lustre v2).
pub fn is_allowed_magic(magic: i64) -> bool {
    matches!(magic, NFS_MAGIC | LUSTRE_V1_MAGIC | LUSTRE_V2_MAGIC)
}

/// Checks `path` against the mount-type allowlist using `probe`. Returns
/// `Ok(())` if allowed, `Err(path)` (for the caller to turn into an
/// `UnavailableFilesystem` error) otherwise.
pub fn check_mount(probe: &dyn MountProbe, path: &Path) -> Result<(), ()> {
    match probe.magic(path) {
        Some(magic) if is_allowed_magic(magic) => Ok(()),
        _ => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProbe(Option<i64>);
    impl MountProbe for FakeProbe {
        fn magic(&self, _path: &Path) -> Option<i64> {
            self.0
        }
    }

    #[test]
    fn nfs_magic_is_allowed() {
        assert!(is_allowed_magic(NFS_MAGIC));
    }

    #[test]
    fn lustre_magics_are_allowed() {
        assert!(is_allowed_magic(LUSTRE_V1_MAGIC));
        assert!(is_allowed_magic(LUSTRE_V2_MAGIC));
    }

    #[test]
    fn unknown_magic_rejected() {
        assert!(!is_allowed_magic(0xEF53)); // ext4
    }

    #[test]
    fn check_mount_passes_for_allowed_probe() {
        let probe = FakeProbe(Some(NFS_MAGIC));
        assert!(check_mount(&probe, Path::new("/mnt/a")).is_ok());
    }

    #[test]
    fn check_mount_fails_for_unknown_probe() {
        let probe = FakeProbe(Some(0xEF53));
        assert!(check_mount(&probe, Path::new("/mnt/a")).is_err());
    }

    #[test]
    fn check_mount_fails_when_probe_returns_none() {
        let probe = FakeProbe(None);
        assert!(check_mount(&probe, Path::new("/mnt/a")).is_err());
    }
}
