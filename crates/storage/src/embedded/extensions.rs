//! Native extension resolution and loading for the embedded backend.
//!
//! The vector (`vector0`) and graph (`libgraph`) libraries are resolved for
//! the current OS/architecture from an external directory and loaded into a
//! connection with the file suffix stripped, as the driver expects. When no
//! directory is configured the loader never runs; the embedded query paths
//! are plain SQL plus in-memory math and do not depend on the extensions.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tracing::debug;

use ragstore_core::{Error, Result};

/// Library names looked up on every connection open.
const EXTENSION_NAMES: &[&str] = &["vector0", "libgraph"];

/// Platform tag (`linux-x86_64`, `darwin-aarch64`, `windows-x86_64`, ...)
/// for the running build.
pub fn platform_tag() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    format!("{os}-{}", std::env::consts::ARCH)
}

/// Shared-library suffix for the running build.
pub fn library_suffix() -> &'static str {
    match std::env::consts::OS {
        "macos" => ".dylib",
        "windows" => ".dll",
        _ => ".so",
    }
}

pub struct ExtensionLoader {
    directory: PathBuf,
}

impl ExtensionLoader {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    /// Resolve one library: prefer a per-platform subdirectory, fall back to
    /// the directory root.
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let platform = platform_tag();
        let file_name = format!("{name}{}", library_suffix());
        let candidates = [
            self.directory.join(&platform).join(&file_name),
            self.directory.join(&file_name),
        ];
        for candidate in &candidates {
            if candidate.is_file() {
                return Ok(candidate.clone());
            }
        }
        Err(Error::ExtensionLoad {
            name: name.to_string(),
            platform,
            path: self.directory.join(file_name),
            reason: "library file not found".to_string(),
        })
    }

    /// Load both native libraries into the connection.
    pub fn load_all(&self, conn: &Connection) -> Result<()> {
        for name in EXTENSION_NAMES {
            let path = self.resolve(name)?;
            load_into(conn, name, &path)?;
        }
        Ok(())
    }
}

fn load_into(conn: &Connection, name: &str, path: &Path) -> Result<()> {
    // The driver appends the platform suffix itself.
    let stripped = path.with_extension("");
    let outcome = unsafe {
        conn.load_extension_enable().and_then(|()| {
            let loaded = conn.load_extension(&stripped, None);
            conn.load_extension_disable()?;
            loaded
        })
    };
    outcome.map_err(|e| Error::ExtensionLoad {
        name: name.to_string(),
        platform: platform_tag(),
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    debug!(name, path = %path.display(), "loaded native extension");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_tag_has_os_and_arch() {
        let tag = platform_tag();
        assert!(tag.contains('-'));
        assert!(!tag.contains("macos"), "darwin replaces macos in the tag");
    }

    #[test]
    fn missing_library_carries_context() {
        let dir = std::env::temp_dir().join("ragstore-no-extensions-here");
        let loader = ExtensionLoader::new(dir);
        let err = loader.resolve("vector0").unwrap_err();
        match err {
            Error::ExtensionLoad { name, platform, .. } => {
                assert_eq!(name, "vector0");
                assert_eq!(platform, platform_tag());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
