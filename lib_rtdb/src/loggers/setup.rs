use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Maps a level name to a filter. Unknown names fall back to `Info`.
pub fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Installs the global logger, writing to stdout and to a fresh
/// `<prefix>_<timestamp>.log` under `log_dir`. Older logs are removed first.
///
/// Returns the path of the new log file.
pub fn setup_logging(log_dir: &Path, prefix: &str, log_level: &str) -> Result<PathBuf, fern::InitError> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    cleanup_old_logs(log_dir, 0)?;

    let log_file_name = format!("{}_{}.log", prefix, chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
    let log_path = log_dir.join(log_file_name);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        .chain(std::io::stdout())
        .chain(fern::log_file(&log_path)?)
        .apply()?;

    Ok(log_path)
}

/// Deletes `.log` files in `log_dir`, keeping the `keep` most recently
/// modified ones. Returns how many were removed.
pub fn cleanup_old_logs(log_dir: &Path, keep: usize) -> std::io::Result<usize> {
    let mut entries: Vec<(SystemTime, PathBuf)> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "log"))
        .map(|p| {
            let modified = fs::metadata(&p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, p)
        })
        .collect();

    // Newest first
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    let mut removed = 0;
    for (_, path) in entries.iter().skip(keep) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to delete old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), log::LevelFilter::Debug);
        assert_eq!(parse_level("warn"), log::LevelFilter::Warn);
        assert_eq!(parse_level("nonsense"), log::LevelFilter::Info);
    }

    #[test]
    fn test_cleanup_keeps_newest_logs() {
        let dir = tempdir().unwrap();
        let now = SystemTime::now();
        for (i, name) in ["a.log", "b.log", "c.log"].iter().enumerate() {
            let file = File::create(dir.path().join(name)).unwrap();
            file.set_modified(now - Duration::from_secs(100 * (3 - i as u64))).unwrap();
        }
        File::create(dir.path().join("notes.txt")).unwrap();

        assert_eq!(cleanup_old_logs(dir.path(), 1).unwrap(), 2);
        assert!(dir.path().join("c.log").exists());
        assert!(!dir.path().join("a.log").exists());
        assert!(!dir.path().join("b.log").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_cleanup_missing_dir_errors() {
        let dir = tempdir().unwrap();
        assert!(cleanup_old_logs(&dir.path().join("missing"), 1).is_err());
    }
}
