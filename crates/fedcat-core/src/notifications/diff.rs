//! Structural JSON diff as RFC 6902 patch operations.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
}

/// Operations that turn `old` into `new`.
///
/// Arrays are compared by position; removals of trailing elements are
/// emitted highest index first so the patch applies in order.
pub fn diff(old: &Value, new: &Value) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    diff_at("", old, new, &mut ops);
    ops
}

fn diff_at(path: &str, old: &Value, new: &Value, ops: &mut Vec<PatchOperation>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, old_value) in a {
                let child = format!("{}/{}", path, escape(key));
                match b.get(key) {
                    Some(new_value) => diff_at(&child, old_value, new_value, ops),
                    None => ops.push(PatchOperation::Remove { path: child }),
                }
            }
            for (key, new_value) in b {
                if !a.contains_key(key) {
                    ops.push(PatchOperation::Add {
                        path: format!("{}/{}", path, escape(key)),
                        value: new_value.clone(),
                    });
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            let common = a.len().min(b.len());
            for i in 0..common {
                diff_at(&format!("{}/{}", path, i), &a[i], &b[i], ops);
            }
            for (i, value) in b.iter().enumerate().skip(common) {
                ops.push(PatchOperation::Add {
                    path: format!("{}/{}", path, i),
                    value: value.clone(),
                });
            }
            for i in (common..a.len()).rev() {
                ops.push(PatchOperation::Remove {
                    path: format!("{}/{}", path, i),
                });
            }
        }
        _ if old != new => ops.push(PatchOperation::Replace {
            path: path.to_string(),
            value: new.clone(),
        }),
        _ => {}
    }
}

// RFC 6901 token escaping
fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_values_yield_nothing() {
        let v = json!({"a": [1, 2, {"b": null}], "c": "x"});
        assert!(diff(&v, &v).is_empty());
    }

    #[test]
    fn test_object_changes() {
        let old = json!({"owner": "alice", "properties": {"a": "1", "gone": "x"}});
        let new = json!({"owner": "bob", "properties": {"a": "1", "new/key": "y"}});
        let ops = diff(&old, &new);
        assert_eq!(
            ops,
            vec![
                PatchOperation::Replace {
                    path: "/owner".into(),
                    value: json!("bob")
                },
                PatchOperation::Remove {
                    path: "/properties/gone".into()
                },
                PatchOperation::Add {
                    path: "/properties/new~1key".into(),
                    value: json!("y")
                },
            ]
        );
    }

    #[test]
    fn test_array_growth_and_shrink() {
        let ops = diff(&json!({"f": [1]}), &json!({"f": [1, 2, 3]}));
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops[0],
            PatchOperation::Add {
                path: "/f/1".into(),
                value: json!(2)
            }
        );

        let ops = diff(&json!([1, 2, 3]), &json!([9]));
        assert_eq!(
            ops,
            vec![
                PatchOperation::Replace {
                    path: "/0".into(),
                    value: json!(9)
                },
                PatchOperation::Remove { path: "/2".into() },
                PatchOperation::Remove { path: "/1".into() },
            ]
        );
    }

    #[test]
    fn test_type_change_replaces_whole_value() {
        let ops = diff(&json!({"x": {"y": 1}}), &json!({"x": [1]}));
        assert_eq!(
            ops,
            vec![PatchOperation::Replace {
                path: "/x".into(),
                value: json!([1])
            }]
        );
    }

    #[test]
    fn test_operations_serialize_with_op_tag() {
        let op = PatchOperation::Remove { path: "/a".into() };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"op": "remove", "path": "/a"})
        );
    }
}
