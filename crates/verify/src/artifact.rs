//! Durable storage for captured artifacts
//!
//! Artifacts live at `<root>/<scenario>/<name>.<ext>`. Re-running a scenario
//! overwrites artifacts of the same name; there is no versioning.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::ArtifactError;

#[cfg(unix)]
const ARTIFACT_MODE: u32 = 0o644;

/// Kind of captured output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Screenshot,
    Log,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Screenshot => "png",
            ArtifactKind::Log => "log",
        }
    }
}

/// A stored artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub size: u64,

    /// SHA-256 of the stored bytes, hex encoded
    pub sha256: String,

    /// Index of the step that produced it
    pub step_index: usize,

    pub captured_at: DateTime<Utc>,

    /// Width and height for screenshots that decode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<(u32, u32)>,

    /// Free-form context, e.g. the condition a diagnostic was taken for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Name of the diagnostic artifact for a scenario
pub fn diagnostic_name(scenario: &str) -> String {
    format!("error-{}", scenario)
}

/// Names are used as path components, so keep them to a safe alphabet
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Filesystem-backed artifact store
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where an artifact of this name lands
    pub fn path_for(&self, scenario: &str, name: &str, kind: ArtifactKind) -> PathBuf {
        self.root
            .join(scenario)
            .join(format!("{}.{}", name, kind.extension()))
    }

    /// Write an artifact, replacing any previous one of the same name
    pub fn write(
        &self,
        scenario: &str,
        name: &str,
        kind: ArtifactKind,
        step_index: usize,
        data: &[u8],
    ) -> Result<Artifact, ArtifactError> {
        let fail = |reason: String| ArtifactError {
            name: name.to_string(),
            reason,
        };

        if !is_valid_name(scenario) || !is_valid_name(name) {
            return Err(fail(format!("'{}/{}' is not a safe artifact path", scenario, name)));
        }

        let path = self.path_for(scenario, name, kind);
        let dir = path
            .parent()
            .ok_or_else(|| fail("artifact path has no parent".to_string()))?;
        std::fs::create_dir_all(dir).map_err(|e| fail(e.to_string()))?;

        // Stage next to the destination so the rename stays on one filesystem
        let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(|e| fail(e.to_string()))?;
        staged.write_all(data).map_err(|e| fail(e.to_string()))?;
        staged.flush().map_err(|e| fail(e.to_string()))?;
        // Temp files start out owner-only; artifacts are for everyone reading the run
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            staged
                .as_file()
                .set_permissions(std::fs::Permissions::from_mode(ARTIFACT_MODE))
                .map_err(|e| fail(e.to_string()))?;
        }
        staged.persist(&path).map_err(|e| fail(e.error.to_string()))?;

        let dimensions = match kind {
            ArtifactKind::Screenshot => image_dimensions(data),
            ArtifactKind::Log => None,
        };

        debug!(artifact = name, path = %path.display(), bytes = data.len(), "Stored artifact");

        Ok(Artifact {
            name: name.to_string(),
            kind,
            path,
            size: data.len() as u64,
            sha256: hex::encode(Sha256::digest(data)),
            step_index,
            captured_at: Utc::now(),
            dimensions,
            note: None,
        })
    }

    /// List the artifacts currently stored for a scenario
    pub fn list(&self, scenario: &str) -> std::io::Result<Vec<PathBuf>> {
        let dir = self.root.join(scenario);
        let mut paths = Vec::new();
        if dir.exists() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_file() {
                    paths.push(path);
                }
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Reads the image header only
fn image_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_write_screenshot_records_hash_and_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let png = tiny_png();

        let artifact = store
            .write("dark-mode", "toggled", ArtifactKind::Screenshot, 3, &png)
            .unwrap();

        assert_eq!(artifact.path, dir.path().join("dark-mode/toggled.png"));
        assert_eq!(std::fs::read(&artifact.path).unwrap(), png);
        assert_eq!(artifact.dimensions, Some((3, 2)));
        assert_eq!(artifact.sha256.len(), 64);
        assert_eq!(artifact.step_index, 3);
    }

    #[test]
    fn test_dimensions_come_from_header_alone() {
        let png = tiny_png();
        let image_data = png.windows(4).position(|w| w == b"IDAT").unwrap();

        assert_eq!(image_dimensions(&png[..image_data + 6]), Some((3, 2)));
        assert_eq!(image_dimensions(b"not an image"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_artifacts_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let shot = store
            .write("perms", "shot", ArtifactKind::Screenshot, 0, &tiny_png())
            .unwrap();
        let log = store
            .write("perms", "note", ArtifactKind::Log, 1, b"hello\n")
            .unwrap();

        for path in [shot.path, log.path] {
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o644, "{}", path.display());
        }
    }

    #[test]
    fn test_rewrite_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        store.write("s", "final", ArtifactKind::Log, 0, b"first").unwrap();
        let second = store.write("s", "final", ArtifactKind::Log, 0, b"second").unwrap();

        assert_eq!(std::fs::read(&second.path).unwrap(), b"second");
        assert_eq!(store.list("s").unwrap(), vec![second.path.clone()]);
    }

    #[test]
    fn test_undecodable_screenshot_has_no_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = store
            .write("s", "garbage", ArtifactKind::Screenshot, 0, b"not a png")
            .unwrap();
        assert_eq!(artifact.dimensions, None);
    }

    #[test]
    fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(store.write("..", "x", ArtifactKind::Log, 0, b"").is_err());
        assert!(store.write("s", "../x", ArtifactKind::Log, 0, b"").is_err());
    }

    #[test]
    fn test_name_rules() {
        assert!(is_valid_name("error-login_flow.v2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a/b"));
        assert!(!is_valid_name("with space"));
        assert_eq!(diagnostic_name("login"), "error-login");
    }
}
