//! Build-time metadata stamped by `build.rs`.

use serde::Serialize;

pub const BUILD_VERSION: &str = env!("APP_BUILD_VERSION");
pub const BUILD_COMMIT: &str = env!("APP_BUILD_COMMIT");
pub const BUILD_TIMESTAMP: &str = env!("APP_BUILD_TIMESTAMP");

/// Version block returned by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub package: &'static str,
    pub version: &'static str,
    pub build: &'static str,
    pub commit: &'static str,
    pub built_at: &'static str,
}

pub fn current() -> BuildInfo {
    BuildInfo {
        package: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        build: BUILD_VERSION,
        commit: BUILD_COMMIT,
        built_at: BUILD_TIMESTAMP,
    }
}

/// One-line summary for startup logs.
pub fn summary() -> String {
    let info = current();
    format!(
        "{} {} (build {}, commit {}, built at {})",
        info.package, info.version, info.build, info.commit, info.built_at
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_names_the_package() {
        assert!(summary().starts_with("lab-interpreter "));
        assert_eq!(current().version, env!("CARGO_PKG_VERSION"));
    }
}
