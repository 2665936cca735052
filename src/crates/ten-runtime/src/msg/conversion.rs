//! Per-edge message conversion: `from_original` (copy a value by path from
//! the source message) and `fixed_value` (literal), applied before a message
//! crosses a graph-declared connection.
//!
//! Grounded on `msg_conversion_context.c`: a context is keyed by
//! `(src_loc, msg_name)`, produces zero or more outbound messages, and may
//! carry a result-conversion applied to the inbound result when it returns.

use crate::location::Location;
use crate::msg::Message;
use crate::value::Value;

#[derive(Debug, Clone)]
pub enum ConversionMode {
    /// Copy `original_path` from the source message's properties into
    /// `path` on the outbound message.
    FromOriginal { original_path: String },
    /// Set `path` to a literal value on the outbound message.
    FixedValue { value: Value },
}

#[derive(Debug, Clone)]
pub struct ConversionRule {
    pub path: String,
    pub mode: ConversionMode,
}

/// Optional conversion to apply to the result before it's handed back to the
/// original caller.
#[derive(Debug, Clone, Default)]
pub struct ResultConversion {
    pub rules: Vec<ConversionRule>,
}

impl ResultConversion {
    pub fn apply(&self, result: &Message) -> Message {
        apply_rules(result, &self.rules)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MsgConversion {
    pub rules: Vec<ConversionRule>,
    pub result_conversion: Option<ResultConversion>,
}

/// Registered per `(src_loc, msg_name)`; `dest` is where the converted
/// message should be sent (the connection's target extension).
#[derive(Debug, Clone)]
pub struct ConversionContext {
    pub src_loc: Location,
    pub msg_name: String,
    pub dest: Location,
    pub conversion: MsgConversion,
}

#[derive(Debug, Default)]
pub struct ConversionTable {
    contexts: Vec<ConversionContext>,
}

impl ConversionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ctx: ConversionContext) {
        self.contexts.push(ctx);
    }

    fn matching(&self, src_loc: &Location, msg_name: &str) -> Vec<&ConversionContext> {
        self.contexts
            .iter()
            .filter(|c| &c.src_loc == src_loc && c.msg_name == msg_name)
            .collect()
    }

    /// Apply all matching conversion contexts to `msg`, producing the
    /// outbound messages. If nothing matches, the original message passes
    /// through unchanged (testable property 8: conversion idempotence).
    pub fn convert(&self, msg: &Message) -> Vec<(Location, Message, Option<ResultConversion>)> {
        let matches = self.matching(&msg.src, &msg.name);
        if matches.is_empty() {
            let Ok(dest) = msg.sole_dest() else {
                return vec![];
            };
            return vec![(dest.clone(), msg.clone(), None)];
        }

        matches
            .into_iter()
            .map(|ctx| {
                let converted = apply_rules(msg, &ctx.conversion.rules);
                (ctx.dest.clone(), converted, ctx.conversion.result_conversion.clone())
            })
            .collect()
    }
}

fn apply_rules(msg: &Message, rules: &[ConversionRule]) -> Message {
    let mut out = msg.clone_for_fanout();
    for rule in rules {
        match &rule.mode {
            ConversionMode::FromOriginal { original_path } => {
                if let Ok(v) = msg.properties.get(original_path) {
                    let _ = out.properties.set(&rule.path, v);
                }
            }
            ConversionMode::FixedValue { value } => {
                let _ = out.properties.set(&rule.path, value.clone());
            }
        }
    }
    out
}
