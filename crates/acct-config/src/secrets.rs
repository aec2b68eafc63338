//! Credential literals in configuration.
//!
//! Keystone tokens, application credential secrets and sink keys come from
//! the environment. A config leaf that looks like one aborts loading; the
//! error names the JSON pointer of the leaf and never its value.

use anyhow::{bail, Result};
use serde_json::Value;

/// Shorter strings never match. Keeps ids such as `sk-1` loadable.
const MIN_SECRET_LEN: usize = 8;

const CREDENTIAL_PREFIXES: &[&str] = &[
    "gAAAAA",     // keystone fernet token
    "sk-",        // generic API key
    "AKIA",       // AWS access key id
    "-----BEGIN", // PEM private key
    "ghp_",       // GitHub PAT
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
];

/// Fails with `CONFIG_SECRET_DETECTED leaf=<pointer> value=REDACTED` on the
/// first credential-shaped string, in document order.
pub(crate) fn reject_credentials(doc: &Value) -> Result<()> {
    let mut pointer = String::new();
    if find_credential(doc, &mut pointer) {
        bail!("CONFIG_SECRET_DETECTED leaf={pointer} value=REDACTED");
    }
    Ok(())
}

/// Depth-first walk. On a hit `pointer` is left addressing the offending leaf.
fn find_credential(v: &Value, pointer: &mut String) -> bool {
    let depth = pointer.len();
    match v {
        Value::String(s) => return is_credential(s),
        Value::Object(map) => {
            for (key, child) in map {
                pointer.push('/');
                pointer.push_str(&key.replace('~', "~0").replace('/', "~1"));
                if find_credential(child, pointer) {
                    return true;
                }
                pointer.truncate(depth);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                pointer.push('/');
                pointer.push_str(&i.to_string());
                if find_credential(child, pointer) {
                    return true;
                }
                pointer.truncate(depth);
            }
        }
        _ => {}
    }
    false
}

fn is_credential(s: &str) -> bool {
    let t = s.trim();
    t.len() >= MIN_SECRET_LEN && CREDENTIAL_PREFIXES.iter().any(|p| t.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_values_are_not_credentials() {
        assert!(!is_credential("sk-1"));
        assert!(is_credential("  AKIAABCDEFGHIJ"));
    }

    #[test]
    fn pointer_escapes_slashes_and_indexes_arrays() {
        let doc = json!({"a/b": {"c": [true, "ghp_0123456789abcdef"]}});
        let err = reject_credentials(&doc).unwrap_err().to_string();
        assert_eq!(err, "CONFIG_SECRET_DETECTED leaf=/a~1b/c/1 value=REDACTED");
    }

    #[test]
    fn first_hit_in_key_order_is_reported() {
        let doc = json!({
            "sinks": [{"key": "sk-aaaaaaaaaaaa"}],
            "provider": {"token": "gAAAAABzzzzzzzz"},
        });
        let err = reject_credentials(&doc).unwrap_err().to_string();
        assert!(err.contains("leaf=/provider/token"), "{err}");
    }

    #[test]
    fn clean_document_passes() {
        let doc = json!({"site_name": "SITE-A", "projects": ["proj-1"], "page_limit": 200});
        assert!(reject_credentials(&doc).is_ok());
    }
}
