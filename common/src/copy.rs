//! Transfer executor: copies file bytes and metadata, with a buffered rescue
//! path when the primary copy mechanism fails.
//!
//! Neither path is atomic per file: a run killed mid-copy can leave a partial
//! destination file behind. The next run's size/digest check classifies it as
//! different and recopies it.

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::instrument;

use crate::preserve;
use crate::progress;

/// Chunk size for the manual fallback copy.
const COPY_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Bytes landed; holds the number of bytes copied.
    Copied(u64),
    /// The source vanished between scan and copy; skipped, not an error.
    SrcMissing,
}

/// Copy `src` over `dst` (overwriting it), then carry the source's
/// permission bits and timestamps onto the destination.
///
/// A missing source is a warn-and-skip, not an error - the file may have
/// been deleted mid-run. Any other failure of the primary mechanism falls
/// back to a manual buffered copy before giving up.
#[instrument(skip(prog_track))]
pub async fn copy_file(
    prog_track: &'static progress::Progress,
    src: &std::path::Path,
    dst: &std::path::Path,
) -> Result<Outcome> {
    let src_metadata = match tokio::fs::metadata(src).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("file not found during copy: {:?}", &src);
            prog_track.files_missing.inc();
            return Ok(Outcome::SrcMissing);
        }
        Err(error) => {
            return Err(error).with_context(|| format!("failed reading metadata from {:?}", &src));
        }
    };
    tracing::info!("copying file {:?} -> {:?}", &src, &dst);
    if let Err(error) = tokio::fs::copy(src, dst).await {
        if error.kind() == std::io::ErrorKind::NotFound && !src.exists() {
            tracing::warn!("file not found during copy: {:?}", &src);
            prog_track.files_missing.inc();
            return Ok(Outcome::SrcMissing);
        }
        tracing::warn!(
            "copying {:?} -> {:?} failed ({}), falling back to a buffered copy",
            &src,
            &dst,
            &error
        );
        buffered_copy(src, dst)
            .await
            .with_context(|| format!("failed copying {:?} to {:?}", &src, &dst))?;
    }
    preserve::set_file_metadata(&src_metadata, dst).await?;
    prog_track.files_copied.inc();
    prog_track.bytes_copied.add(src_metadata.len());
    Ok(Outcome::Copied(src_metadata.len()))
}

/// Manual rescue path: read/write in 4 KiB chunks.
async fn buffered_copy(src: &std::path::Path, dst: &std::path::Path) -> Result<()> {
    let mut reader = tokio::fs::File::open(src)
        .await
        .with_context(|| format!("cannot open {:?} for reading", &src))?;
    let mut writer = tokio::fs::File::create(dst)
        .await
        .with_context(|| format!("cannot open {:?} for writing", &dst))?;
    let mut chunk = vec![0u8; COPY_CHUNK_SIZE];
    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .with_context(|| format!("failed reading from {:?}", &src))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&chunk[..n])
            .await
            .with_context(|| format!("failed writing to {:?}", &dst))?;
    }
    writer
        .flush()
        .await
        .with_context(|| format!("failed flushing {:?}", &dst))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils;

    static PROG_TRACK: std::sync::LazyLock<progress::Progress> =
        std::sync::LazyLock::new(progress::Progress::new);

    #[tokio::test]
    async fn copies_content_and_timestamps() -> Result<()> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let src = tmp_dir.join("src.txt");
        let dst = tmp_dir.join("dst.txt");
        tokio::fs::write(&src, "payload").await?;
        // backdate the source so the carried-over mtime is observable
        let old = filetime::FileTime::from_unix_time(1_500_000_000, 0);
        filetime::set_file_mtime(&src, old)?;
        let outcome = copy_file(std::sync::LazyLock::force(&PROG_TRACK), &src, &dst).await?;
        assert_eq!(outcome, Outcome::Copied(7));
        assert_eq!(tokio::fs::read_to_string(&dst).await?, "payload");
        let dst_mtime = filetime::FileTime::from_last_modification_time(&dst.metadata()?);
        assert_eq!(dst_mtime.unix_seconds(), 1_500_000_000);
        Ok(())
    }

    #[tokio::test]
    async fn overwrites_existing_destination() -> Result<()> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let src = tmp_dir.join("src.txt");
        let dst = tmp_dir.join("dst.txt");
        tokio::fs::write(&src, "new content").await?;
        tokio::fs::write(&dst, "old").await?;
        copy_file(std::sync::LazyLock::force(&PROG_TRACK), &src, &dst).await?;
        assert_eq!(tokio::fs::read_to_string(&dst).await?, "new content");
        Ok(())
    }

    #[tokio::test]
    async fn missing_source_is_a_skip() -> Result<()> {
        let tmp_dir = testutils::create_temp_dir().await?;
        let outcome = copy_file(
            std::sync::LazyLock::force(&PROG_TRACK),
            &tmp_dir.join("gone.txt"),
            &tmp_dir.join("dst.txt"),
        )
        .await?;
        assert_eq!(outcome, Outcome::SrcMissing);
        Ok(())
    }
}
