//! Parsed contract ABIs and the codec that moves values across them.
//!
//! An [`AbiDescriptor`] is built once from ABI JSON and never changes
//! afterwards. Bound contracts share it through an `Arc`.

pub mod builtin;
pub mod codec;
pub mod values;

use alloy::{
    json_abi::{Event, Function, JsonAbi},
    primitives::{Selector, B256},
};
use std::collections::HashMap;

use crate::error::{BindingError, Result};

/// A contract ABI with selector and topic lookup tables.
#[derive(Debug, Clone)]
pub struct AbiDescriptor {
    abi: JsonAbi,
    /// 4-byte selector to function definition.
    functions: HashMap<Selector, Function>,
    /// 32-byte event topic to event definition. Anonymous events have no
    /// topic of their own and are absent here.
    events: HashMap<B256, Event>,
}

impl From<JsonAbi> for AbiDescriptor {
    fn from(abi: JsonAbi) -> Self {
        let functions = abi
            .functions()
            .map(|func| (func.selector(), func.clone()))
            .collect();

        let events = abi
            .events()
            .filter(|event| !event.anonymous)
            .map(|event| (event.selector(), event.clone()))
            .collect();

        Self {
            abi,
            functions,
            events,
        }
    }
}

impl AbiDescriptor {
    /// Parses a JSON ABI array.
    pub fn from_json(json: &str) -> Result<Self> {
        let abi: JsonAbi = serde_json::from_str(json)?;
        tracing::debug!(
            "Parsed ABI with {} functions and {} events",
            abi.functions().count(),
            abi.events().count()
        );
        Ok(Self::from(abi))
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    /// Looks up a function by plain name, or by canonical signature
    /// (`name(type,...)`) when the name is overloaded.
    pub fn function(&self, name: &str) -> Result<&Function> {
        if name.contains('(') {
            let base = name.split('(').next().unwrap_or_default();
            return self
                .abi
                .function(base)
                .and_then(|overloads| overloads.iter().find(|f| f.signature() == name))
                .ok_or_else(|| BindingError::MethodNotFound(name.to_string()));
        }

        match self.abi.function(name).map(Vec::as_slice) {
            Some([function]) => Ok(function),
            Some(overloads) if !overloads.is_empty() => Err(BindingError::AmbiguousMethod {
                name: name.to_string(),
                candidates: overloads
                    .iter()
                    .map(|f| f.signature())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
            _ => Err(BindingError::MethodNotFound(name.to_string())),
        }
    }

    /// Looks up an event by plain name, or by canonical signature when the
    /// name is overloaded.
    pub fn event(&self, name: &str) -> Result<&Event> {
        if name.contains('(') {
            let base = name.split('(').next().unwrap_or_default();
            return self
                .abi
                .event(base)
                .and_then(|overloads| overloads.iter().find(|e| e.signature() == name))
                .ok_or_else(|| BindingError::EventNotFound(name.to_string()));
        }

        match self.abi.event(name).map(Vec::as_slice) {
            Some([event]) => Ok(event),
            Some(overloads) if !overloads.is_empty() => Err(BindingError::AmbiguousEvent {
                name: name.to_string(),
                candidates: overloads
                    .iter()
                    .map(|e| e.signature())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
            _ => Err(BindingError::EventNotFound(name.to_string())),
        }
    }

    pub fn function_by_selector(&self, selector: &Selector) -> Option<&Function> {
        self.functions.get(selector)
    }

    pub fn event_by_topic(&self, topic: &B256) -> Option<&Event> {
        self.events.get(topic)
    }

    /// All functions with their selectors, sorted by signature.
    pub fn selectors(&self) -> Vec<(String, Selector)> {
        let mut out: Vec<_> = self
            .functions
            .iter()
            .map(|(selector, f)| (f.signature(), *selector))
            .collect();
        out.sort();
        out
    }

    /// All non-anonymous events with their topics, sorted by signature.
    pub fn topics(&self) -> Vec<(String, B256)> {
        let mut out: Vec<_> = self
            .events
            .iter()
            .map(|(topic, e)| (e.signature(), *topic))
            .collect();
        out.sort();
        out
    }
}
