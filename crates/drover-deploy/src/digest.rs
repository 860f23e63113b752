use std::fs::File;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

use crate::error::{DeployError, DeployResult};

/// Returns a shell command that prints the content digest of a remote file tree.
///
/// The digest is the MD5 of the concatenation of all regular files under `path`,
/// ordered by byte-wise sorted path, which is what [`local_digest`] computes.
pub fn remote_digest_command(path: &str) -> String {
    format!("find {path} -type f -print0 | LC_ALL=C sort -z | xargs -0 cat | md5sum")
}

/// Extracts the hex digest from the output of [`remote_digest_command`].
pub(crate) fn parse_digest(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .next()
        .filter(|x| x.len() == 32 && x.chars().all(|c| c.is_ascii_hexdigit()))
        .map(|x| x.to_ascii_lowercase())
}

/// Computes the content digest of a local file or directory tree.
pub async fn local_digest(path: &Path) -> DeployResult<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || compute_digest(&path)).await?
}

fn compute_digest(path: &Path) -> DeployResult<String> {
    let files = if path.symlink_metadata()?.is_file() {
        vec![path.to_path_buf()]
    } else {
        list_files(path)?
    };
    let mut hasher = Md5::new();
    for file in files {
        let mut file = File::open(file)?;
        std::io::copy(&mut file, &mut hasher)?;
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn list_files(root: &Path) -> DeployResult<Vec<PathBuf>> {
    let pattern = format!(
        "{}/**/*",
        glob::Pattern::escape(&root.display().to_string())
    );
    let paths = glob::glob(&pattern).map_err(|e| DeployError::InternalError(e.to_string()))?;
    let mut files = vec![];
    for entry in paths {
        let path = entry.map_err(|e| DeployError::InternalError(e.to_string()))?;
        if path.symlink_metadata()?.is_file() {
            files.push(path);
        }
    }
    // `sort` on the remote side compares raw bytes, not path components.
    files.sort_by(|a, b| {
        a.as_os_str()
            .as_encoded_bytes()
            .cmp(b.as_os_str().as_encoded_bytes())
    });
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn scratch_dir() -> DeployResult<PathBuf> {
        let dir = std::env::temp_dir().join(format!("drover-digest-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    #[test]
    fn test_remote_digest_command() {
        assert_eq!(
            remote_digest_command("~/.drover/abc/lib"),
            "find ~/.drover/abc/lib -type f -print0 | LC_ALL=C sort -z | xargs -0 cat | md5sum"
        );
    }

    #[test]
    fn test_parse_digest() {
        assert_eq!(
            parse_digest("D41D8CD98F00B204E9800998ECF8427E  -\n").as_deref(),
            Some("d41d8cd98f00b204e9800998ecf8427e")
        );
        assert_eq!(parse_digest("find: no such file"), None);
        assert_eq!(parse_digest(""), None);
    }

    #[tokio::test]
    async fn test_local_digest_orders_files_by_bytes() -> DeployResult<()> {
        let dir = scratch_dir()?;
        fs::create_dir_all(dir.join("a"))?;
        fs::write(dir.join("a").join("b"), "second")?;
        fs::write(dir.join("a-c"), "first")?;
        fs::write(dir.join(".hidden"), "zeroth ")?;
        let digest = local_digest(&dir).await?;
        let expected = format!("{:x}", Md5::digest(b"zeroth firstsecond"));
        fs::remove_dir_all(&dir)?;
        assert_eq!(digest, expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_local_digest_of_empty_directory() -> DeployResult<()> {
        let dir = scratch_dir()?;
        let digest = local_digest(&dir).await?;
        fs::remove_dir_all(&dir)?;
        assert_eq!(digest, "d41d8cd98f00b204e9800998ecf8427e");
        Ok(())
    }

    #[tokio::test]
    async fn test_local_digest_of_single_file() -> DeployResult<()> {
        let dir = scratch_dir()?;
        let file = dir.join("worker.sh");
        fs::write(&file, "echo hello")?;
        let digest = local_digest(&file).await?;
        fs::remove_dir_all(&dir)?;
        assert_eq!(digest, format!("{:x}", Md5::digest(b"echo hello")));
        Ok(())
    }
}
