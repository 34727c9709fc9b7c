use std::path::{Path, PathBuf};

use crate::CliError;

pub(crate) fn read_file(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read {}: {e}", path.display())))
}

pub(crate) fn write_file(path: &Path, contents: &[u8]) -> Result<(), CliError> {
    std::fs::write(path, contents)
        .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))
}

/// Resolve a path from a project file relative to the project file's directory.
pub(crate) fn resolve(config_path: &Path, file: &str) -> PathBuf {
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    base.join(file)
}

/// Name shown in errors for a loaded file.
pub(crate) fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_relative_to_config_dir() {
        let p = resolve(Path::new("projects/beer/beer.zeroer.toml"), "candset.csv");
        assert_eq!(p, PathBuf::from("projects/beer/candset.csv"));
        let p = resolve(Path::new("beer.zeroer.toml"), "candset.csv");
        assert_eq!(p, PathBuf::from("candset.csv"));
    }
}
