use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OwnershipError;

use super::{Rule, VERSION};

/// The JSON form of a rule set: `{"$version": 1, "rules": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "$version")]
    pub version: u32,
    pub rules: Vec<Rule>,
}

pub fn dump_schema(rules: &[Rule]) -> Schema {
    Schema {
        version: VERSION,
        rules: rules.to_vec(),
    }
}

/// Load the rules of a schema. A schema of any other version is rejected
/// as a whole.
pub fn load_schema(schema: &Value) -> Result<Vec<Rule>, OwnershipError> {
    let version = schema.get("$version").cloned().unwrap_or(Value::Null);
    if version != Value::from(VERSION) {
        return Err(OwnershipError::SchemaVersion { found: version });
    }
    let schema: Schema = serde_json::from_value(schema.clone())?;
    Ok(schema.rules)
}

/// Render a schema as ownership rule text, one rule per line.
pub fn convert_schema_to_rules_text(schema: &Value) -> Result<String, OwnershipError> {
    let rules = load_schema(schema)?;
    Ok(rules.iter().map(|rule| format!("{rule}\n")).collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ownership::parser::parse_rules;

    const RULES: &str = "\
url:*.example.com/checkout* #payments
path:src/billing/** alice@example.com #billing
module:app.auth.* bob@example.com
tags.browser.name:Chrome* #web
codeowners:/docs/ #docs
";

    #[test]
    fn test_dump_and_load() {
        let rules = parse_rules(RULES).unwrap();
        let dumped = serde_json::to_value(dump_schema(&rules)).unwrap();
        assert_eq!(dumped["$version"], json!(1));
        assert_eq!(
            dumped["rules"][0],
            json!({
                "matcher": {"type": "url", "pattern": "*.example.com/checkout*"},
                "owners": [{"type": "team", "identifier": "payments"}],
            })
        );
        assert_eq!(
            dumped["rules"][3]["matcher"],
            json!({"type": "tags.browser.name", "pattern": "Chrome*"})
        );

        assert_eq!(load_schema(&dumped).unwrap(), rules);
    }

    #[test]
    fn test_version_mismatch() {
        for version in [json!(2), json!("1"), Value::Null] {
            let schema = json!({"$version": version, "rules": []});
            match load_schema(&schema) {
                Err(OwnershipError::SchemaVersion { found }) => assert_eq!(found, version),
                other => panic!("unexpected result for {version}: {other:?}"),
            }
        }
        assert!(matches!(
            load_schema(&json!({"rules": []})),
            Err(OwnershipError::SchemaVersion { found: Value::Null })
        ));
    }

    #[test]
    fn test_invalid_schema() {
        let schema = json!({
            "$version": 1,
            "rules": [{"matcher": {"type": "unknown", "pattern": "x"}, "owners": []}],
        });
        assert!(matches!(
            load_schema(&schema),
            Err(OwnershipError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_convert_schema_to_rules_text() {
        let rules = parse_rules(RULES).unwrap();
        let schema = serde_json::to_value(dump_schema(&rules)).unwrap();
        assert_eq!(convert_schema_to_rules_text(&schema).unwrap(), RULES);

        let rules = parse_rules("\"src/with space/*\" a").unwrap();
        let schema = serde_json::to_value(dump_schema(&rules)).unwrap();
        let text = convert_schema_to_rules_text(&schema).unwrap();
        assert_eq!(text, "path:\"src/with space/*\" a\n");
        assert_eq!(parse_rules(&text).unwrap(), rules);
    }
}
