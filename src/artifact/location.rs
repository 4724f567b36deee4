//! Remote/local coordinates of the standalone jar

use std::path::{Path, PathBuf};

const GROUP_PATH: &str = "com/github/tomakehurst";
const ARTIFACT_ID: &str = "wiremock-standalone";

/// Where an artifact is fetched from and where it is cached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub remote_url: String,
    pub local_path: PathBuf,
}

impl ArtifactLocation {
    pub fn new(remote_url: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            remote_url: remote_url.into(),
            local_path: local_path.into(),
        }
    }

    /// Location of `wiremock-standalone-{version}.jar` in a Maven layout repository
    pub fn wiremock(base_url: &str, version: &str, install_dir: &Path) -> Self {
        let file_name = jar_file_name(version);
        let remote_url = format!(
            "{}/{}/{}/{}/{}",
            base_url.trim_end_matches('/'),
            GROUP_PATH,
            ARTIFACT_ID,
            version,
            file_name
        );
        Self::new(remote_url, install_dir.join(file_name))
    }

    pub fn exists(&self) -> bool {
        self.local_path.is_file()
    }
}

/// `wiremock-standalone-{version}.jar`
pub fn jar_file_name(version: &str) -> String {
    format!("{}-{}.jar", ARTIFACT_ID, version)
}
