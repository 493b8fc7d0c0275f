//! Encoding of call data and decoding of call results and event logs.
//!
//! The byte-level packing follows the standard contract ABI and is delegated
//! to `alloy::dyn_abi`. This module adds the shape checks and naming that the
//! bound contract relies on.

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, EventExt, FunctionExt, JsonAbiExt, Specifier},
    json_abi::{Event, Function, Param},
    primitives::{keccak256, Bytes, B256},
    rpc::types::Log,
};

use crate::error::{BindingError, Result};

/// The decoded return values of a contract call, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutput {
    fields: Vec<(String, DynSolValue)>,
}

impl CallOutput {
    pub fn fields(&self) -> &[(String, DynSolValue)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns a named return value.
    pub fn get(&self, name: &str) -> Option<&DynSolValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Returns the value when the method declares exactly one output.
    pub fn single(&self) -> Option<&DynSolValue> {
        match self.fields.as_slice() {
            [(_, value)] => Some(value),
            _ => None,
        }
    }

    pub fn into_single(self) -> Option<DynSolValue> {
        let mut fields = self.fields;
        if fields.len() == 1 {
            fields.pop().map(|(_, value)| value)
        } else {
            None
        }
    }

    pub fn into_values(self) -> Vec<DynSolValue> {
        self.fields.into_iter().map(|(_, value)| value).collect()
    }
}

/// A log decoded against an event definition.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub name: String,
    /// Event parameters in declaration order. Indexed parameters of dynamic
    /// type carry the 32-byte hash stored in the topic.
    pub fields: Vec<(String, DynSolValue)>,
    pub raw: Log,
}

impl DecodedEvent {
    pub fn get(&self, name: &str) -> Option<&DynSolValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn block_number(&self) -> Option<u64> {
        self.raw.block_number
    }

    pub fn log_index(&self) -> Option<u64> {
        self.raw.log_index
    }
}

/// Encodes a function call: selector followed by the packed arguments.
pub fn encode_call(function: &Function, args: &[DynSolValue]) -> Result<Bytes> {
    if args.len() != function.inputs.len() {
        return Err(BindingError::ArgumentCount {
            name: function.name.clone(),
            expected: function.inputs.len(),
            actual: args.len(),
        });
    }

    function
        .abi_encode_input(args)
        .map(Bytes::from)
        .map_err(|source| BindingError::Encode {
            name: function.name.clone(),
            source,
        })
}

/// Encodes return values the way the contract would. Mostly useful for
/// backends that answer calls locally.
pub fn encode_output(function: &Function, values: &[DynSolValue]) -> Result<Bytes> {
    if values.len() != function.outputs.len() {
        return Err(BindingError::ArgumentCount {
            name: function.name.clone(),
            expected: function.outputs.len(),
            actual: values.len(),
        });
    }

    function
        .abi_encode_output(values)
        .map(Bytes::from)
        .map_err(|source| BindingError::Encode {
            name: function.name.clone(),
            source,
        })
}

/// Decodes the raw result of a call into the function's declared outputs.
pub fn decode_output(function: &Function, data: &[u8]) -> Result<CallOutput> {
    let expected = min_encoded_len(&function.outputs);
    if data.len() < expected {
        return Err(BindingError::ShortOutput {
            name: function.name.clone(),
            expected,
            actual: data.len(),
        });
    }

    let values = function
        .abi_decode_output(data, false)
        .map_err(|source| BindingError::Decode {
            name: function.name.clone(),
            source,
        })?;

    let fields = function
        .outputs
        .iter()
        .map(|param| param.name.clone())
        .zip(values)
        .collect();

    Ok(CallOutput { fields })
}

/// Decodes a raw log into the given event.
pub fn decode_log(event: &Event, log: &Log) -> Result<DecodedEvent> {
    if !event.anonymous {
        let expected = event.selector();
        let found = log.topics().first().copied();
        if found != Some(expected) {
            return Err(BindingError::EventMismatch {
                event: event.name.clone(),
                expected,
                found,
            });
        }
    }

    let decoded = event
        .decode_log_parts(log.topics().iter().copied(), &log.data().data, false)
        .map_err(|source| BindingError::Decode {
            name: event.name.clone(),
            source,
        })?;

    let mut indexed = decoded.indexed.into_iter();
    let mut body = decoded.body.into_iter();
    let mut fields = Vec::with_capacity(event.inputs.len());
    for input in &event.inputs {
        let value = if input.indexed {
            indexed.next()
        } else {
            body.next()
        };
        match value {
            Some(value) => fields.push((input.name.clone(), value)),
            None => {
                return Err(BindingError::Decode {
                    name: event.name.clone(),
                    source: alloy::dyn_abi::Error::TopicLengthMismatch {
                        expected: event.inputs.iter().filter(|i| i.indexed).count()
                            + usize::from(!event.anonymous),
                        actual: log.topics().len(),
                    },
                })
            }
        }
    }

    Ok(DecodedEvent {
        name: event.name.clone(),
        fields,
        raw: log.clone(),
    })
}

/// Turns per-parameter filter values into topic sets, one set per indexed
/// parameter in declaration order. An empty set matches any value.
pub fn topic_rules(event: &Event, rules: &[Vec<DynSolValue>]) -> Result<Vec<Vec<B256>>> {
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
        .map(|(param, values)| {
            let ty = param
                .resolve()
                .map_err(|e| BindingError::InvalidArgument {
                    param: param.name.clone(),
                    ty: param.ty.clone(),
                    reason: e.to_string(),
                })?;

            values
                .iter()
                .map(|value| {
                    if !ty.matches(value) {
                        return Err(BindingError::InvalidArgument {
                            param: param.name.clone(),
                            ty: param.ty.clone(),
                            reason: format!("value {:?} does not match", value),
                        });
                    }
                    Ok(topic_word(value))
                })
                .collect()
        })
        .collect()
}

/// The topic a value occupies when it is an indexed event parameter.
pub fn topic_word(value: &DynSolValue) -> B256 {
    match value.as_word() {
        Some(word) => word,
        None => keccak256(value.abi_encode_packed()),
    }
}

/// Smallest byte length a valid encoding of `params` can have: one head slot
/// per dynamic parameter, the full inline size for static ones.
fn min_encoded_len(params: &[Param]) -> usize {
    params
        .iter()
        .map(|param| param.resolve().map(|ty| head_words(&ty)).unwrap_or(1))
        .sum::<usize>()
        * 32
}

fn head_words(ty: &DynSolType) -> usize {
    if is_dynamic(ty) {
        return 1;
    }
    match ty {
        DynSolType::FixedArray(inner, len) => head_words(inner) * len,
        DynSolType::Tuple(inner) => inner.iter().map(head_words).sum(),
        _ => 1,
    }
}

/// Whether values of `ty` are encoded behind an offset.
fn is_dynamic(ty: &DynSolType) -> bool {
    match ty {
        DynSolType::String | DynSolType::Bytes | DynSolType::Array(_) => true,
        DynSolType::FixedArray(inner, _) => is_dynamic(inner),
        DynSolType::Tuple(inner) => inner.iter().any(is_dynamic),
        _ => false,
    }
}
