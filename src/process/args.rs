//! Launch argument construction

use std::ffi::OsString;
use std::path::Path;

use crate::config::LaunchConfig;

pub const LAUNCH_FLAG: &str = "-jar";
pub const PORT_FLAG: &str = "-port";
pub const ROOT_DIR_FLAG: &str = "-root-dir";

/// `-jar <artifact> -port <port> -root-dir <root_dir> <extra_args...>`
///
/// The artifact path is made absolute; `root_dir` already is.
pub fn launch_args(launch: &LaunchConfig, artifact_path: &Path) -> Vec<OsString> {
    let artifact = std::path::absolute(artifact_path).unwrap_or_else(|_| artifact_path.to_path_buf());

    let mut args: Vec<OsString> = vec![
        LAUNCH_FLAG.into(),
        artifact.into_os_string(),
        PORT_FLAG.into(),
        launch.port.to_string().into(),
        ROOT_DIR_FLAG.into(),
        launch.root_dir.clone().into_os_string(),
    ];
    args.extend(launch.extra_args.iter().map(OsString::from));
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StdioMode;
    use std::path::PathBuf;

    fn launch(extra_args: Vec<String>) -> LaunchConfig {
        LaunchConfig {
            port: 9090,
            root_dir: PathBuf::from("/work/m"),
            artifact_version: "2.26.0".to_string(),
            artifact_base_url: "http://mirror".to_string(),
            skip_fetch: true,
            extra_args,
            java_bin: "java".to_string(),
            install_dir: PathBuf::from("/cache"),
            stdio: StdioMode::Ignore,
        }
    }

    fn as_strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_argument_order() {
        let args = launch_args(&launch(vec![]), Path::new("/cache/wiremock-standalone-2.26.0.jar"));
        assert_eq!(
            as_strings(args),
            vec![
                "-jar",
                "/cache/wiremock-standalone-2.26.0.jar",
                "-port",
                "9090",
                "-root-dir",
                "/work/m",
            ]
        );
    }

    #[test]
    fn test_extra_args_appended_in_order() {
        let extra = vec!["--verbose".to_string(), "--https-port".to_string(), "8443".to_string()];
        let args = as_strings(launch_args(&launch(extra), Path::new("/a.jar")));
        assert_eq!(&args[6..], &["--verbose", "--https-port", "8443"]);
    }

    #[test]
    fn test_relative_artifact_path_is_resolved() {
        let args = launch_args(&launch(vec![]), Path::new("wiremock.jar"));
        assert!(Path::new(&args[1]).is_absolute());
    }
}
