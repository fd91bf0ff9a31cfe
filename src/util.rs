use std::path::{Path, PathBuf};

/// Memory assumed when the platform cannot report it.
const FALLBACK_MEMORY_MB: u64 = 2048;

/// Walk up from `start` looking for a directory named `containing`.
///
/// Returns the first `<ancestor>/<containing>` that is a directory, stopping
/// before the filesystem root.
pub fn find_dir(start: &Path, containing: &str) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.parent().is_none() {
            return None;
        }
        let candidate = dir.join(containing);
        if candidate.is_dir() {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}

/// [`find_dir`] starting at the current working directory.
pub fn find_path(containing: &str) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_dir(&cwd, containing)
}

/// Physical memory in megabytes (10^6 bytes).
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn memory_mb() -> u64 {
    use nix::unistd::{sysconf, SysconfVar};

    let pages = sysconf(SysconfVar::_PHYS_PAGES).ok().flatten();
    let page_size = sysconf(SysconfVar::PAGE_SIZE).ok().flatten();
    match (pages, page_size) {
        (Some(pages), Some(size)) if pages > 0 && size > 0 => {
            (pages as u64).saturating_mul(size as u64) / 1_000_000
        }
        _ => FALLBACK_MEMORY_MB,
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn memory_mb() -> u64 {
    FALLBACK_MEMORY_MB
}
