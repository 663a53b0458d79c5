//! Semantic version of the current build.

pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;
pub const VERSION_RELEASE_LEVEL: &str = "beta";
pub const VERSION_RELEASE_NUMBER: u32 = 1;

/// Short commit hash, set at build time with `GIT_VERSION=$(git rev-parse --short HEAD)`.
pub const GIT_VERSION: Option<&str> = option_env!("GIT_VERSION");

pub fn version() -> String {
    format_version(GIT_VERSION)
}

fn format_version(git: Option<&str>) -> String {
    let mut version = format!("{}.{}.{}", VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH);
    if !VERSION_RELEASE_LEVEL.is_empty() {
        if VERSION_RELEASE_NUMBER > 0 {
            version = format!("{}-{}.{}", version, VERSION_RELEASE_LEVEL, VERSION_RELEASE_NUMBER);
        } else {
            version = format!("{}-{}", version, VERSION_RELEASE_LEVEL);
        }
    }

    match git.filter(|g| !g.is_empty()) {
        Some(git) => format!("{} ({})", version, git),
        None => version,
    }
}
