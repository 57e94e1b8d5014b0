use anyhow::Context;
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Raw text of `path`, or stdin for `-`.
pub fn read_source(path: &str) -> anyhow::Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))
}

/// One ticket record or an array of them. Records are decoded later, one at
/// a time, so a bad record fails alone.
pub fn parse_records(text: &str, origin: &str) -> anyhow::Result<Vec<Value>> {
    let value: Value =
        serde_json::from_str(text).with_context(|| format!("{origin}: invalid JSON"))?;
    Ok(match value {
        Value::Array(items) => items,
        other => vec![other],
    })
}

/// Expand directories into their `*.json` files, sorted by name.
pub fn collect_files(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("failed to read directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && has_json_extension(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn has_json_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn single_and_array_inputs() {
        let one = parse_records(r#"{"id": "A-1"}"#, "one").unwrap();
        assert_eq!(one.len(), 1);
        let many = parse_records(r#"[{"id": "A-1"}, {"key": "A-2"}, 42]"#, "many").unwrap();
        assert_eq!(many.len(), 3);
    }

    #[test]
    fn invalid_json_names_its_origin() {
        let err = parse_records("{nope", "tickets.json").unwrap_err();
        assert!(format!("{err:#}").starts_with("tickets.json: invalid JSON"));
    }

    #[test]
    fn directories_expand_to_sorted_json_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a.JSON"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        let files = collect_files(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JSON", "b.json"]);
    }
}
