//! File helpers shared by the client programs

use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Read a JSON document from `path`
pub fn load_json(path: impl AsRef<Path>) -> io::Result<Value> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(io::Error::from)
}

/// Overwrite `path` with `value`, pretty-printed
pub fn write_pretty(path: impl AsRef<Path>, value: &Value) -> io::Result<()> {
    let mut content = serde_json::to_string_pretty(value)?;
    content.push('\n');
    fs::write(path, content)
}

/// Append `value` to `path` as a pretty-printed block
pub fn append_pretty(path: impl AsRef<Path>, value: &Value) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let content = serde_json::to_string_pretty(value)?;
    writeln!(file, "{}", content)?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_append_keeps_previous_blocks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notifications.json");

        append_pretty(&path, &json!({"id": "1"})).unwrap();
        append_pretty(&path, &json!({"id": "2"})).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let values: Vec<Value> = serde_json::Deserializer::from_str(&content)
            .into_iter::<Value>()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(values, vec![json!({"id": "1"}), json!({"id": "2"})]);
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("response.json");

        write_pretty(&path, &json!({"id": "42", "found": false})).unwrap();
        assert_eq!(load_json(&path).unwrap(), json!({"id": "42", "found": false}));
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(load_json(&path).is_err());
    }
}
