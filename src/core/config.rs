use crate::error::{Error, Result};
use serde_json::Value;
use std::path::Path;

// ============================================================================
// File Parsing (internal)
// ============================================================================

/// Formats accepted for site definition files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileFormat {
    Json,
    Toml,
    Yaml,
}

impl FileFormat {
    pub(crate) fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "yaml" | "yml" => Some(FileFormat::Yaml),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Json => "json",
            FileFormat::Toml => "toml",
            FileFormat::Yaml => "yaml",
        }
    }
}

/// Read a JSON, TOML or YAML file into a JSON value.
pub(crate) fn read_value(path: &Path) -> Result<Value> {
    let format = FileFormat::from_path(path).ok_or_else(|| {
        Error::config_invalid_value(
            "site",
            Some(path.display().to_string()),
            "Unsupported file extension (expected .json, .toml, .yaml or .yml)",
        )
    })?;

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    parse_value_str(&content, format, &path.display().to_string())
}

pub(crate) fn parse_value_str(content: &str, format: FileFormat, origin: &str) -> Result<Value> {
    let parsed: std::result::Result<Value, String> = match format {
        FileFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        FileFormat::Toml => toml::from_str::<Value>(content).map_err(|e| e.to_string()),
        FileFormat::Yaml => serde_yml::from_str::<Value>(content).map_err(|e| e.to_string()),
    };

    parsed.map_err(|e| Error::config_parse_failed(origin, format.as_str(), e))
}

// ============================================================================
// Merge Operations (internal)
// ============================================================================

/// Merge `patch` into `base`. Objects merge recursively, arrays and scalars
/// are replaced, and a `null` in the patch removes the key so the field
/// falls back to its default.
pub(crate) fn deep_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_obj), Value::Object(patch_obj)) => {
            for (key, value) in patch_obj {
                if value.is_null() {
                    base_obj.remove(&key);
                } else {
                    deep_merge(base_obj.entry(key).or_insert(Value::Null), value);
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

// ============================================================================
// Dotted Key Assignment (internal)
// ============================================================================

/// Set `database.name`-style keys inside a JSON object, creating
/// intermediate objects as needed.
pub(crate) fn set_dotted(root: &mut Value, key: &str, new_value: Value) -> Result<()> {
    let tokens: Vec<&str> = key.split('.').collect();
    if tokens.iter().any(|t| t.trim().is_empty()) {
        return Err(Error::validation_invalid_argument(
            "set",
            format!("Invalid settings key '{}'", key),
            Some(key.to_string()),
            None,
        ));
    }

    let (last, parents) = match tokens.split_last() {
        Some(split) => split,
        None => return Ok(()),
    };

    let mut current = root;
    for token in parents {
        if current.is_null() {
            *current = Value::Object(serde_json::Map::new());
        }
        current = match current {
            Value::Object(map) => map
                .entry(token.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new())),
            Value::Array(arr) => {
                let index = parse_array_index(token)?;
                let len = arr.len();
                arr.get_mut(index).ok_or_else(|| {
                    Error::config_invalid_value(
                        key,
                        Some(index.to_string()),
                        format!("Array index out of bounds (length {})", len),
                    )
                })?
            }
            other => {
                return Err(Error::config_invalid_value(
                    key,
                    Some(value_type_name(other).to_string()),
                    "Expected object/array while following key",
                ))
            }
        };
    }

    match current {
        Value::Object(map) => {
            map.insert(last.to_string(), new_value);
            Ok(())
        }
        Value::Array(arr) => {
            let index = parse_array_index(last)?;
            match arr.get_mut(index) {
                Some(slot) => {
                    *slot = new_value;
                    Ok(())
                }
                None => Err(Error::config_invalid_value(
                    key,
                    Some(index.to_string()),
                    "Array index out of bounds",
                )),
            }
        }
        other => Err(Error::config_invalid_value(
            key,
            Some(value_type_name(other).to_string()),
            "Cannot set child on non-container",
        )),
    }
}

fn parse_array_index(token: &str) -> Result<usize> {
    token.parse::<usize>().map_err(|_| {
        Error::validation_invalid_argument(
            "arrayIndex",
            "Invalid array index token",
            Some(token.to_string()),
            None,
        )
    })
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse a command-line string value into the matching JSON type.
/// Order: JSON literal → bool → number → string
pub(crate) fn parse_value(s: &str) -> Value {
    if let Ok(v) = serde_json::from_str(s) {
        return v;
    }
    if s == "true" {
        return Value::Bool(true);
    }
    if s == "false" {
        return Value::Bool(false);
    }
    if let Ok(n) = s.parse::<i64>() {
        return Value::from(n);
    }
    Value::String(s.to_string())
}

/// Parse a command-line value for `key`, typed after what `root` already
/// holds there. Strings, nulls and `vars.*` entries keep the raw text;
/// unknown keys and typed values go through [`parse_value`].
pub(crate) fn parse_value_at(root: &Value, key: &str, raw: &str) -> Value {
    if key.starts_with("vars.") {
        return Value::String(raw.to_string());
    }
    let pointer = format!("/{}", key.replace('.', "/"));
    match root.pointer(&pointer) {
        Some(Value::String(_)) | Some(Value::Null) => Value::String(raw.to_string()),
        _ => parse_value(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_replaces_arrays_and_removes_nulls() {
        let mut base = json!({
            "database": {"host": "localhost", "port": 3306, "password": "x"},
            "requirements": ["a.txt", "b.txt"],
        });
        deep_merge(
            &mut base,
            json!({
                "database": {"port": 3307, "password": null},
                "requirements": ["c.txt"],
            }),
        );
        assert_eq!(
            base,
            json!({
                "database": {"host": "localhost", "port": 3307},
                "requirements": ["c.txt"],
            })
        );
    }

    #[test]
    fn set_dotted_creates_nested_objects() {
        let mut root = json!({});
        set_dotted(&mut root, "settings.redis.db", json!(2)).unwrap();
        assert_eq!(root, json!({"settings": {"redis": {"db": 2}}}));
    }

    #[test]
    fn set_dotted_indexes_arrays() {
        let mut root = json!({"repos": [{"name": "invenio"}]});
        set_dotted(&mut root, "repos.0.ref", json!("maint-1.1")).unwrap();
        assert_eq!(root["repos"][0]["ref"], "maint-1.1");
        assert!(set_dotted(&mut root, "repos.3.ref", json!("x")).is_err());
    }

    #[test]
    fn set_dotted_rejects_empty_segments() {
        let mut root = json!({});
        assert!(set_dotted(&mut root, "database..name", json!("x")).is_err());
    }

    #[test]
    fn parse_value_types() {
        assert_eq!(parse_value("3306"), json!(3306));
        assert_eq!(parse_value("false"), json!(false));
        assert_eq!(parse_value("[\"a\"]"), json!(["a"]));
        assert_eq!(parse_value("atlantis"), json!("atlantis"));
    }

    #[test]
    fn parse_formats() {
        let toml = parse_value_str("name = \"atlantis\"\n", FileFormat::Toml, "x.toml").unwrap();
        assert_eq!(toml["name"], "atlantis");

        let yaml = parse_value_str("name: atlantis\n", FileFormat::Yaml, "x.yaml").unwrap();
        assert_eq!(yaml["name"], "atlantis");

        let err = parse_value_str("{", FileFormat::Json, "x.json").unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ConfigParseFailed);
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(FileFormat::from_path(Path::new("a/site.yml")), Some(FileFormat::Yaml));
        assert_eq!(FileFormat::from_path(Path::new("site.ini")), None);
    }

    #[test]
    fn command_line_values_follow_existing_types() {
        let root = json!({
            "http_port": 4000,
            "database": {"password": null, "drop_allowed": false, "name": "atlantis"},
            "vars": {},
        });
        assert_eq!(parse_value_at(&root, "database.password", "123456"), json!("123456"));
        assert_eq!(parse_value_at(&root, "database.name", "2024"), json!("2024"));
        assert_eq!(parse_value_at(&root, "vars.CFG_MISCUTIL_SMTP_PORT", "25"), json!("25"));
        assert_eq!(parse_value_at(&root, "database.drop_allowed", "true"), json!(true));
        assert_eq!(parse_value_at(&root, "http_port", "8080"), json!(8080));
        assert_eq!(parse_value_at(&root, "settings.redis.db", "2"), json!(2));
    }
}
