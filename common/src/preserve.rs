use anyhow::{Context, Result};
use std::os::unix::fs::MetadataExt;

/// Carry permission bits and timestamps from `metadata` onto `dst`.
///
/// Matches whole-file copy semantics: mode plus atime/mtime, no ownership
/// changes. Runs on the blocking pool since the syscalls are synchronous.
pub async fn set_file_metadata(metadata: &std::fs::Metadata, dst: &std::path::Path) -> Result<()> {
    let metadata = metadata.to_owned();
    let dst = dst.to_owned();
    tokio::task::spawn_blocking(move || -> Result<()> {
        std::fs::set_permissions(&dst, metadata.permissions())
            .with_context(|| format!("cannot set {:?} permissions", &dst))?;
        let atime = nix::sys::time::TimeSpec::new(metadata.atime(), metadata.atime_nsec());
        let mtime = nix::sys::time::TimeSpec::new(metadata.mtime(), metadata.mtime_nsec());
        nix::sys::stat::utimensat(
            nix::fcntl::AT_FDCWD,
            &dst,
            &atime,
            &mtime,
            nix::sys::stat::UtimensatFlags::NoFollowSymlink,
        )
        .with_context(|| format!("failed setting timestamps for {:?}", &dst))?;
        Ok(())
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils;
    use std::os::unix::fs::PermissionsExt;

    #[tokio::test]
    async fn carries_mode_and_mtime() -> Result<()> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let src = tmp_dir.join("src.txt");
        let dst = tmp_dir.join("dst.txt");
        tokio::fs::write(&src, "x").await?;
        tokio::fs::write(&dst, "x").await?;
        tokio::fs::set_permissions(&src, std::fs::Permissions::from_mode(0o640)).await?;
        filetime::set_file_mtime(&src, filetime::FileTime::from_unix_time(1_400_000_000, 0))?;
        let src_metadata = tokio::fs::metadata(&src).await?;
        set_file_metadata(&src_metadata, &dst).await?;
        let dst_metadata = tokio::fs::metadata(&dst).await?;
        assert_eq!(dst_metadata.permissions().mode() & 0o7777, 0o640);
        assert_eq!(dst_metadata.mtime(), 1_400_000_000);
        Ok(())
    }
}
