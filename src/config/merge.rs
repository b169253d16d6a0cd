//! Layer merge logic
//!
//! - Tables: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use toml::Value;

/// Deep merge two TOML values, `overlay` taking precedence.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Table(mut base_map), Value::Table(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Table(base_map)
        }

        // Arrays are replaced, never concatenated
        (Value::Array(_), overlay @ Value::Array(_)) => overlay,

        (_, overlay) => overlay,
    }
}

/// Merge layers in order; the last has the highest precedence.
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers
        .into_iter()
        .reduce(deep_merge)
        .unwrap_or_else(|| Value::Table(toml::Table::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Value {
        Value::Table(text.parse::<toml::Table>().unwrap())
    }

    #[test]
    fn test_scalar_override() {
        let result = deep_merge(parse("nworkers = 8"), parse("nworkers = 2"));
        assert_eq!(result["nworkers"].as_integer(), Some(2));
    }

    #[test]
    fn test_table_deep_merge() {
        let base = parse(
            r#"
            [db]
            driver = "postgres"
            dsn = "dbname=hkp"
            "#,
        );
        let overlay = parse(
            r#"
            [db]
            dsn = "dbname=keys"
            "#,
        );
        let result = deep_merge(base, overlay);
        assert_eq!(result["db"]["driver"].as_str(), Some("postgres"));
        assert_eq!(result["db"]["dsn"].as_str(), Some("dbname=keys"));
    }

    #[test]
    fn test_array_replace() {
        let result = deep_merge(parse(r#"to = ["a", "b", "c"]"#), parse(r#"to = ["x"]"#));
        let to = result["to"].as_array().unwrap();
        assert_eq!(to.len(), 1);
        assert_eq!(to[0].as_str(), Some("x"));
    }

    #[test]
    fn test_add_new_key() {
        let result = deep_merge(parse("a = 1"), parse("b = 2"));
        assert_eq!(result["a"].as_integer(), Some(1));
        assert_eq!(result["b"].as_integer(), Some(2));
    }

    #[test]
    fn test_merge_layers() {
        let builtin = parse("loglevel = \"INFO\"\n[openpgp]\nnworkers = 8\nverifySigs = false");
        let file = parse("[openpgp]\nnworkers = 4");
        let cli = parse("[openpgp]\nverifySigs = true");

        let result = merge_layers(vec![builtin, file, cli]);
        assert_eq!(result["loglevel"].as_str(), Some("INFO"));
        assert_eq!(result["openpgp"]["nworkers"].as_integer(), Some(4));
        assert_eq!(result["openpgp"]["verifySigs"].as_bool(), Some(true));
        assert!(merge_layers(Vec::new()).as_table().unwrap().is_empty());
    }
}
