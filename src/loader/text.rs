use std::fs;
use std::path::Path;

use serde_yaml::Value;

use super::{LoadError, normalize_path};

/// Read a whole file as UTF-8.
pub fn read_utf8(path: &Path) -> Result<String, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: normalize_path(path),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|_| LoadError::Encoding {
        path: normalize_path(path),
    })?;
    // Strip a UTF-8 BOM; some editors on Windows add one.
    Ok(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
}

/// Parse a YAML file and render it as one `dotted.key: value` line per scalar.
///
/// Multi-document files are rendered document by document, separated by a
/// blank line.
pub fn flatten_yaml(path: &Path) -> Result<String, LoadError> {
    let raw = read_utf8(path)?;
    let mut lines = Vec::new();

    for document in serde_yaml::Deserializer::from_str(&raw) {
        let value = <Value as serde::Deserialize>::deserialize(document).map_err(|e| {
            LoadError::Yaml {
                path: normalize_path(path),
                message: e.to_string(),
            }
        })?;
        if !lines.is_empty() {
            lines.push(String::new());
        }
        flatten_value("", &value, &mut lines);
    }

    Ok(lines.join("\n"))
}

fn flatten_value(prefix: &str, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                let key = scalar_to_string(k).unwrap_or_else(|| "?".to_string());
                let path = if prefix.is_empty() {
                    key
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_value(&path, v, out);
            }
        }
        Value::Sequence(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_value(&format!("{prefix}[{i}]"), v, out);
            }
        }
        Value::Tagged(tagged) => flatten_value(prefix, &tagged.value, out),
        scalar => {
            let rendered = scalar_to_string(scalar).unwrap_or_default();
            if prefix.is_empty() {
                out.push(rendered);
            } else {
                out.push(format!("{prefix}: {rendered}"));
            }
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some("null".to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_flatten_nested_yaml() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("api.yaml");
        fs::write(
            &file,
            "paths:\n  /users:\n    get:\n      responses:\n        200: ok\n        404: missing\ntags: [auth, users]\n",
        )
        .unwrap();

        let text = flatten_yaml(&file).unwrap();
        assert!(text.contains("paths./users.get.responses.200: ok"));
        assert!(text.contains("paths./users.get.responses.404: missing"));
        assert!(text.contains("tags[0]: auth"));
        assert!(text.contains("tags[1]: users"));
    }

    #[test]
    fn test_invalid_yaml_is_load_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("broken.yml");
        fs::write(&file, "key: [unclosed\n").unwrap();
        assert!(matches!(flatten_yaml(&file), Err(LoadError::Yaml { .. })));
    }

    #[test]
    fn test_bom_is_stripped() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        fs::write(&file, "\u{feff}hello").unwrap();
        assert_eq!(read_utf8(&file).unwrap(), "hello");
    }
}
