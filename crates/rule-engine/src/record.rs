//! 采购记录字段访问
//!
//! 记录是字符串键的 JSON 映射。字段路径以点号分隔，数字段可索引数组，
//! 如 `items.0.unitPrice`。

use serde_json::{Map, Value};

/// 被评估的采购记录
pub type Record = Map<String, Value>;

static NULL_VALUE: Value = Value::Null;

/// 字段解析结果
///
/// 区分"存在但为 null"与"不存在"：中间任意一级缺失都视为不存在。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Present(&'a Value),
    Null,
    Absent,
}

impl<'a> FieldValue<'a> {
    fn from_value(value: &'a Value) -> Self {
        if value.is_null() {
            Self::Null
        } else {
            Self::Present(value)
        }
    }

    /// 存在且非 null
    pub fn exists(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// 转为可序列化的值；不存在时为 None，null 时为 Some(Null)
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Self::Present(v) => Some((*v).clone()),
            Self::Null => Some(Value::Null),
            Self::Absent => None,
        }
    }

    /// 以 JSON 值视图访问，null 视为 `Value::Null`
    pub fn as_value(&self) -> Option<&'a Value> {
        match self {
            Self::Present(v) => Some(v),
            Self::Null => Some(&NULL_VALUE),
            Self::Absent => None,
        }
    }
}

/// 按点号路径解析字段
pub fn resolve<'a>(record: &'a Record, path: &str) -> FieldValue<'a> {
    let mut parts = path.split('.');

    let Some(first) = parts.next() else {
        return FieldValue::Absent;
    };
    let Some(mut current) = record.get(first) else {
        return FieldValue::Absent;
    };

    for part in parts {
        let next = match current {
            Value::Object(map) => map.get(part),
            Value::Array(arr) => part.parse::<usize>().ok().and_then(|i| arr.get(i)),
            _ => None,
        };

        match next {
            Some(v) => current = v,
            None => return FieldValue::Absent,
        }
    }

    FieldValue::from_value(current)
}

/// 按点号路径写入字段，缺失的中间层级自动创建为对象
///
/// 中间层级存在但不是对象时返回 false，记录保持不变。
pub fn set_path(record: &mut Record, path: &str, value: Value) -> bool {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        return false;
    };
    if parts.iter().any(|p| p.is_empty()) {
        return false;
    }

    let mut current = record;
    for part in parents {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match entry {
            Value::Object(map) => current = map,
            _ => return false,
        }
    }

    current.insert(last.to_string(), value);
    true
}

/// 从 JSON 值转换记录，非对象返回 None
pub fn from_value(value: Value) -> Option<Record> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Record {
        from_value(json!({
            "prNumber": "PR-1001",
            "totalAmount": 15000,
            "approver": null,
            "vendor": {
                "name": "Acme",
                "rating": null,
                "address": { "country": "DE" }
            },
            "items": [
                {"itemId": "I-1", "quantity": 2, "unitPrice": 500},
                {"itemId": "I-2", "quantity": 1, "unitPrice": 250}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_resolve_tri_state() {
        let record = sample();

        assert_eq!(resolve(&record, "totalAmount"), FieldValue::Present(&json!(15000)));
        assert_eq!(resolve(&record, "approver"), FieldValue::Null);
        assert_eq!(resolve(&record, "vendor.rating"), FieldValue::Null);
        assert_eq!(resolve(&record, "missing"), FieldValue::Absent);
        // 中间层级缺失
        assert_eq!(resolve(&record, "buyer.name"), FieldValue::Absent);
        // 穿过标量
        assert_eq!(resolve(&record, "totalAmount.value"), FieldValue::Absent);
        // 穿过 null
        assert_eq!(resolve(&record, "approver.name"), FieldValue::Absent);
    }

    #[test]
    fn test_resolve_nested_and_array_index() {
        let record = sample();

        assert_eq!(
            resolve(&record, "vendor.address.country"),
            FieldValue::Present(&json!("DE"))
        );
        assert_eq!(
            resolve(&record, "items.1.unitPrice"),
            FieldValue::Present(&json!(250))
        );
        assert_eq!(resolve(&record, "items.5.unitPrice"), FieldValue::Absent);
        assert_eq!(resolve(&record, "items.x"), FieldValue::Absent);
    }

    #[test]
    fn test_field_value_views() {
        let record = sample();

        assert!(resolve(&record, "prNumber").exists());
        assert!(!resolve(&record, "approver").exists());
        assert_eq!(resolve(&record, "approver").to_value(), Some(Value::Null));
        assert_eq!(resolve(&record, "nope").to_value(), None);
        assert!(resolve(&record, "nope").is_absent());
    }

    #[test]
    fn test_set_path() {
        let mut record = sample();

        assert!(set_path(&mut record, "status", json!("Approved")));
        assert_eq!(record["status"], json!("Approved"));

        assert!(set_path(&mut record, "audit.approval.level", json!(2)));
        assert_eq!(resolve(&record, "audit.approval.level"), FieldValue::Present(&json!(2)));

        // 中间层级是标量时拒绝写入
        assert!(!set_path(&mut record, "totalAmount.net", json!(1)));
        assert_eq!(record["totalAmount"], json!(15000));

        assert!(!set_path(&mut record, "", json!(1)));
        assert!(!set_path(&mut record, "a..b", json!(1)));
    }
}
