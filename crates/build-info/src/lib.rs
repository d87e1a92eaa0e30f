use once_cell::sync::Lazy;

#[derive(Debug)]
struct BuildMeta {
    build_id: String,
    build_time: String,
    git_label: String,
}

impl BuildMeta {
    fn collect() -> Self {
        Self {
            build_id: option_env!("DANDY_BUILD_ID")
                .unwrap_or("unknown build")
                .to_string(),
            build_time: option_env!("DANDY_BUILD_TIME")
                .unwrap_or("unknown time")
                .to_string(),
            git_label: option_env!("DANDY_BUILD_GIT")
                .unwrap_or("unknown git")
                .to_string(),
        }
    }
}

static META: Lazy<BuildMeta> = Lazy::new(BuildMeta::collect);

/// Full build identifier, e.g. `"2026-10-16 09:12:44 UTC | v0.1.0-3-g8a4f1d2"`.
///
/// This is the body served by `GET /version`.
pub fn build_id() -> &'static str {
    META.build_id.as_str()
}

/// UTC timestamp captured at build time.
pub fn build_timestamp() -> &'static str {
    META.build_time.as_str()
}

/// Output of `git describe` at build time.
pub fn git_label() -> &'static str {
    META.git_label.as_str()
}

/// One-line banner for a binary's startup log, e.g.
/// `"dandyd 0.1.0 (built 2026-10-16 09:12:44 UTC, git v0.1.0-3-g8a4f1d2)"`.
pub fn formatted_banner(package: &str, version: &str) -> String {
    format!(
        "{} {} (built {}, git {})",
        package,
        version,
        build_timestamp(),
        git_label()
    )
}
