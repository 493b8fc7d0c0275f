//! Conversions between JSON and ABI values, driven by declared parameter types.

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, Specifier},
    json_abi::{Event, Param},
};
use serde_json::{Map, Value};

use crate::abi::codec::{CallOutput, DecodedEvent};
use crate::error::{BindingError, Result};

/// Converts call parameters given either as a JSON array (positional) or a
/// JSON object (by parameter name).
pub fn params_from_json(name: &str, params: &[Param], value: &Value) -> Result<Vec<DynSolValue>> {
    match value {
        Value::Array(items) => {
            if items.len() != params.len() {
                return Err(BindingError::ArgumentCount {
                    name: name.to_string(),
                    expected: params.len(),
                    actual: items.len(),
                });
            }
            params
                .iter()
                .zip(items)
                .map(|(param, item)| param_from_json(param, item))
                .collect()
        }
        Value::Object(obj) => params
            .iter()
            .map(|param| {
                let item = obj.get(&param.name).ok_or_else(|| BindingError::InvalidArgument {
                    param: param.name.clone(),
                    ty: param.ty.clone(),
                    reason: "missing".to_string(),
                })?;
                param_from_json(param, item)
            })
            .collect(),
        Value::Null if params.is_empty() => Ok(Vec::new()),
        other => Err(BindingError::InvalidArgument {
            param: name.to_string(),
            ty: "parameters".to_string(),
            reason: format!("expected an array or object, got {}", other),
        }),
    }
}

fn param_from_json(param: &Param, value: &Value) -> Result<DynSolValue> {
    let invalid = |reason: String| BindingError::InvalidArgument {
        param: param.name.clone(),
        ty: param.ty.clone(),
        reason,
    };
    let ty = param.resolve().map_err(|e| invalid(e.to_string()))?;
    json_to_value(value, &ty).map_err(invalid)
}

/// Converts indexed-parameter filter rules, one entry per indexed parameter
/// in declaration order. An entry is `null` (any value), a single value, or
/// an array of accepted values. Array-typed parameters always need the outer
/// array.
pub fn topic_rules_from_json(event: &Event, value: &Value) -> Result<Vec<Vec<DynSolValue>>> {
    let rules = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(rules) => rules,
        other => {
            return Err(BindingError::InvalidArgument {
                param: event.name.clone(),
                ty: "topic rules".to_string(),
                reason: format!("expected an array, got {}", other),
            })
        }
    };

    let indexed: Vec<_> = event.inputs.iter().filter(|input| input.indexed).collect();
    if rules.len() > indexed.len() {
        return Err(BindingError::TooManyTopicRules {
            event: event.name.clone(),
            indexed: indexed.len(),
            rules: rules.len(),
        });
    }

    indexed
        .iter()
        .zip(rules)
        .map(|(input, rule)| {
            let invalid = |reason: String| BindingError::InvalidArgument {
                param: input.name.clone(),
                ty: input.ty.clone(),
                reason,
            };
            let ty = input.resolve().map_err(|e| invalid(e.to_string()))?;
            match rule {
                Value::Null => Ok(Vec::new()),
                Value::Array(values) => values
                    .iter()
                    .map(|value| json_to_value(value, &ty).map_err(invalid))
                    .collect(),
                single => Ok(vec![json_to_value(single, &ty).map_err(invalid)?]),
            }
        })
        .collect()
}

/// Converts one JSON value into an ABI value of the given type.
///
/// Strings go through alloy's coercion rules, so addresses, hex and decimal
/// numbers and unit suffixes such as `1 gwei` are all accepted.
pub fn json_to_value(value: &Value, ty: &DynSolType) -> Result<DynSolValue, String> {
    match (value, ty) {
        (Value::String(s), _) => ty.coerce_str(s).map_err(|e| e.to_string()),
        (Value::Number(n), DynSolType::Uint(_) | DynSolType::Int(_)) => {
            ty.coerce_str(&n.to_string()).map_err(|e| e.to_string())
        }
        (Value::Bool(b), DynSolType::Bool) => Ok(DynSolValue::Bool(*b)),
        (Value::Array(items), DynSolType::Array(inner)) => items
            .iter()
            .map(|item| json_to_value(item, inner))
            .collect::<Result<Vec<_>, _>>()
            .map(DynSolValue::Array),
        (Value::Array(items), DynSolType::FixedArray(inner, len)) => {
            if items.len() != *len {
                return Err(format!("expected {} elements, got {}", len, items.len()));
            }
            items
                .iter()
                .map(|item| json_to_value(item, inner))
                .collect::<Result<Vec<_>, _>>()
                .map(DynSolValue::FixedArray)
        }
        (Value::Array(items), DynSolType::Tuple(types)) => {
            if items.len() != types.len() {
                return Err(format!(
                    "expected {} tuple components, got {}",
                    types.len(),
                    items.len()
                ));
            }
            items
                .iter()
                .zip(types)
                .map(|(item, ty)| json_to_value(item, ty))
                .collect::<Result<Vec<_>, _>>()
                .map(DynSolValue::Tuple)
        }
        (other, ty) => Err(format!("cannot convert {} to {}", other, ty.sol_type_name())),
    }
}

/// Converts an ABI value into JSON. Integers become decimal strings so that
/// 256-bit values survive the trip.
pub fn value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Address(addr) => Value::String(addr.to_checksum(None)),
        DynSolValue::Uint(num, _) => Value::String(num.to_string()),
        DynSolValue::Int(num, _) => Value::String(num.to_string()),
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Function(function) => {
            Value::String(format!("0x{}", hex::encode(function.as_slice())))
        }
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(value_to_json).collect())
        }
        #[allow(unreachable_patterns)]
        other => Value::String(format!("{:?}", other)),
    }
}

fn fields_to_json(fields: &[(String, DynSolValue)]) -> Value {
    let mut obj = Map::new();
    for (i, (name, value)) in fields.iter().enumerate() {
        let key = if name.is_empty() {
            i.to_string()
        } else {
            name.clone()
        };
        obj.insert(key, value_to_json(value));
    }
    Value::Object(obj)
}

/// A call result as JSON: the bare value for single outputs, an object keyed
/// by output name otherwise.
pub fn output_to_json(output: &CallOutput) -> Value {
    match output.single() {
        Some(value) => value_to_json(value),
        None if output.is_empty() => Value::Null,
        None => fields_to_json(output.fields()),
    }
}

pub fn event_to_json(event: &DecodedEvent) -> Value {
    serde_json::json!({
        "event": event.name,
        "address": event.raw.address().to_checksum(None),
        "block_number": event.raw.block_number,
        "transaction_hash": event.raw.transaction_hash.map(|h| format!("{:#x}", h)),
        "log_index": event.raw.log_index,
        "fields": fields_to_json(&event.fields),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, U256};
    use serde_json::json;

    fn param(name: &str, ty: &str) -> Param {
        serde_json::from_value(json!({ "name": name, "type": ty })).unwrap()
    }

    #[test]
    fn test_positional_and_named_params() {
        let params = vec![param("to", "address"), param("amount", "uint64")];

        let positional = params_from_json(
            "transfer",
            &params,
            &json!(["0x00000000000000000000000000000000000010aa", 12]),
        )
        .unwrap();
        let named = params_from_json(
            "transfer",
            &params,
            &json!({"amount": "12", "to": "0x00000000000000000000000000000000000010aa"}),
        )
        .unwrap();

        assert_eq!(positional, named);
        assert_eq!(
            positional,
            vec![
                DynSolValue::Address(address!("00000000000000000000000000000000000010aa")),
                DynSolValue::Uint(U256::from(12u64), 64),
            ]
        );
    }

    #[test]
    fn test_param_errors() {
        let params = vec![param("validator", "address")];

        assert!(matches!(
            params_from_json("deposit", &params, &json!([])),
            Err(BindingError::ArgumentCount { .. })
        ));
        assert!(matches!(
            params_from_json("deposit", &params, &json!(["not an address"])),
            Err(BindingError::InvalidArgument { .. })
        ));
        assert!(matches!(
            params_from_json("deposit", &params, &json!({})),
            Err(BindingError::InvalidArgument { .. })
        ));
        assert!(params_from_json("init", &[], &Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_topic_rules_from_json() {
        let event = Event::parse(
            "event validatorFelony(uint64 indexed sequence, address indexed validator, uint256 amount)",
        )
        .unwrap();

        let rules = topic_rules_from_json(
            &event,
            &json!([null, ["0x00000000000000000000000000000000000000aa", "0x00000000000000000000000000000000000000bb"]]),
        )
        .unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules[0].is_empty());
        assert_eq!(rules[1].len(), 2);

        let single = topic_rules_from_json(&event, &json!([7])).unwrap();
        assert_eq!(single, vec![vec![DynSolValue::Uint(U256::from(7u64), 64)]]);

        assert!(topic_rules_from_json(&event, &Value::Null).unwrap().is_empty());
        assert!(matches!(
            topic_rules_from_json(&event, &json!([null, null, null])),
            Err(BindingError::TooManyTopicRules { .. })
        ));
        assert!(topic_rules_from_json(&event, &json!(["x"])).is_err());
    }

    #[test]
    fn test_nested_arrays() {
        let ty = DynSolType::Array(Box::new(DynSolType::Uint(256)));
        let value = json_to_value(&json!([1, "0x10"]), &ty).unwrap();
        assert_eq!(
            value,
            DynSolValue::Array(vec![
                DynSolValue::Uint(U256::from(1u64), 256),
                DynSolValue::Uint(U256::from(16u64), 256),
            ])
        );

        let fixed = DynSolType::FixedArray(Box::new(DynSolType::Bool), 2);
        assert!(json_to_value(&json!([true]), &fixed).is_err());
    }

    #[test]
    fn test_value_to_json() {
        assert_eq!(
            value_to_json(&DynSolValue::Uint(U256::MAX, 256)),
            json!(U256::MAX.to_string())
        );
        assert_eq!(
            value_to_json(&DynSolValue::Bytes(vec![0xab, 0xcd])),
            json!("0xabcd")
        );
        assert_eq!(
            value_to_json(&DynSolValue::Array(vec![DynSolValue::Bool(false)])),
            json!([false])
        );
    }
}
