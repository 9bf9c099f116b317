use {
    crate::ProvisionError,
    log::{debug, trace},
    std::{
        fs,
        io::{Cursor, Write},
        path::{Path, PathBuf},
    },
    zip::{write::FileOptions, CompressionMethod, DateTime, ZipWriter},
};

/// Source file extensions picked up from the top level of a function directory.
const SOURCE_EXTENSIONS: &[&str] = &["py", "js"];

/// Dependency directories bundled in full when present.
const DEPENDENCY_DIRS: &[&str] = &["site-packages", "node_modules"];

/// Build a deployment archive from a function's source directory.
///
/// Top-level `*.py` and `*.js` files are included, along with everything under `site-packages/` and `node_modules/`.
/// Entries are written in sorted order with a fixed 1980-01-01 timestamp so the same tree always produces the same
/// bytes, and therefore the same digest.
pub fn bundle_directory<P: AsRef<Path>>(dir: P) -> Result<Vec<u8>, ProvisionError> {
    let dir = dir.as_ref();
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_source =
            path.extension().and_then(|ext| ext.to_str()).map_or(false, |ext| SOURCE_EXTENSIONS.contains(&ext));
        if is_source && path.is_file() {
            files.push(path);
        }
    }

    for deps in DEPENDENCY_DIRS {
        let deps = dir.join(deps);
        if deps.is_dir() {
            collect_files(&deps, &mut files)?;
        }
    }

    let mut entries: Vec<(String, PathBuf)> = Vec::with_capacity(files.len());
    for path in files {
        entries.push((entry_name(dir, &path)?, path));
    }
    entries.sort();

    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, path) in &entries {
        trace!("Adding {} to archive", name);
        writer.start_file(name.as_str(), options)?;
        writer.write_all(&fs::read(path)?)?;
    }

    let archive = writer.finish()?.into_inner();
    debug!("Bundled {} files from {} into {} bytes", entries.len(), dir.display(), archive.len());
    Ok(archive)
}

// Symlinked directories are never descended into. Symlinked files are bundled with their target's contents.
fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), ProvisionError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&path, files)?;
        } else if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
            files.push(path);
        } else {
            trace!("Skipping {}", path.display());
        }
    }
    Ok(())
}

// Archive entry names always use forward slashes.
fn entry_name(base: &Path, path: &Path) -> Result<String, ProvisionError> {
    let relative = path.strip_prefix(base).map_err(|e| ProvisionError::Io(format!("{}: {}", path.display(), e)))?;
    let parts: Vec<String> = relative.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use {
        super::bundle_directory,
        crate::digest::compute_digest,
        pretty_assertions::assert_eq,
        std::{fs, io::Cursor},
    };

    fn names(archive: &[u8]) -> Vec<String> {
        let zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
        zip.file_names().map(str::to_string).collect()
    }

    #[test_log::test]
    fn test_selects_sources_and_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("handler.py"), "def handler(event, context):\n    return {}\n").unwrap();
        fs::write(dir.path().join("index.js"), "exports.handler = async () => ({});\n").unwrap();
        fs::write(dir.path().join("README.md"), "not shipped").unwrap();
        fs::write(dir.path().join("requirements.txt"), "requests\n").unwrap();
        fs::create_dir_all(dir.path().join("site-packages/requests")).unwrap();
        fs::write(dir.path().join("site-packages/requests/__init__.py"), "").unwrap();
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        fs::write(dir.path().join("tests/test_handler.py"), "").unwrap();

        let archive = bundle_directory(dir.path()).unwrap();
        let mut entries = names(&archive);
        entries.sort();
        assert_eq!(entries, vec!["handler.py", "index.js", "site-packages/requests/__init__.py"]);

        let mut zip = zip::ZipArchive::new(Cursor::new(&archive[..])).unwrap();
        let entry = zip.by_name("handler.py").unwrap();
        let modified = entry.last_modified();
        assert_eq!((modified.year(), modified.month(), modified.day()), (1980, 1, 1));
        assert_eq!((modified.hour(), modified.minute(), modified.second()), (0, 0, 0));
    }

    #[test_log::test]
    fn test_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.py"), "B = 2\n").unwrap();
        fs::write(dir.path().join("a.py"), "A = 1\n").unwrap();

        let first = bundle_directory(dir.path()).unwrap();
        let second = bundle_directory(dir.path()).unwrap();
        assert_eq!(compute_digest(&first), compute_digest(&second));

        fs::write(dir.path().join("a.py"), "A = 3\n").unwrap();
        let third = bundle_directory(dir.path()).unwrap();
        assert_ne!(compute_digest(&first), compute_digest(&third));
    }

    #[test_log::test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(bundle_directory(dir.path().join("missing")).is_err());
    }

    #[cfg(unix)]
    #[test_log::test]
    fn test_symlinked_directories_are_not_followed() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.js"), "exports.handler = () => 1;").unwrap();
        fs::create_dir_all(dir.path().join("node_modules/left-pad")).unwrap();
        fs::write(dir.path().join("node_modules/left-pad/index.js"), "module.exports = 1;").unwrap();
        symlink(dir.path().join("node_modules"), dir.path().join("node_modules/left-pad/loop")).unwrap();
        symlink(dir.path().join("node_modules/left-pad/index.js"), dir.path().join("node_modules/alias.js")).unwrap();
        symlink(dir.path().join("missing.js"), dir.path().join("node_modules/dangling.js")).unwrap();

        let archive = bundle_directory(dir.path()).unwrap();
        let mut entries = names(&archive);
        entries.sort();
        assert_eq!(entries, vec!["index.js", "node_modules/alias.js", "node_modules/left-pad/index.js"]);
    }
}
