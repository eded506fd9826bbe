//! Calling conventions a tool's code can follow.
//!
//! After the code has been evaluated, each [`ToolUnit`] inspects the context
//! for its entry point; the first that finds one runs the tool.

use std::time::Instant;

use boa_engine::property::Attribute;
use boa_engine::{Context, JsString, JsValue, Source};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use super::conversion::{ConversionLimits, js_to_json, json_to_js};
use super::prelude::is_identifier;
use super::promise::{describe_js_error, settle};
use crate::{ToolError, ToolResult};

/// Message returned by a bare script that never assigns `result`.
pub const IMPLICIT_SUCCESS: &str = "Tool executed successfully";

/// Which convention ran the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Convention {
    /// `handler(event, context)`
    EventHandler,
    /// `main(...)` or `execute(...)` with the input fields as arguments
    KeywordCall,
    /// Top-level code leaving its output in `result`
    BareScript,
}

/// Everything a unit needs to run one invocation.
pub struct Invocation<'call> {
    pub tool_name: &'call str,
    pub source: &'call str,
    pub code: &'call str,
    pub input: &'call Value,
    pub function_version: &'call str,
    pub memory_limit_mb: u32,
    pub deadline: Instant,
    pub max_result_elements: usize,
}

impl Invocation<'_> {
    fn conversion_limits(&self) -> ConversionLimits {
        ConversionLimits {
            max_elements: self.max_result_elements,
            deadline: Some(self.deadline),
        }
    }
}

/// One calling convention.
pub trait ToolUnit {
    /// Convention this unit implements.
    fn convention(&self) -> Convention;

    /// Whether the evaluated code exposes this unit's entry point.
    ///
    /// # Errors
    /// Returns error if the context cannot be inspected
    fn supports(&self, context: &mut Context) -> ToolResult<bool>;

    /// Run the entry point and return its settled value.
    ///
    /// # Errors
    /// Returns error if the tool throws or its Promise rejects
    fn invoke(&self, context: &mut Context, call: &Invocation<'_>) -> ToolResult<Value>;
}

/// Run the first unit, in precedence order, whose entry point exists.
///
/// # Errors
/// Returns error if the selected unit fails
pub fn dispatch(context: &mut Context, call: &Invocation<'_>) -> ToolResult<(Convention, Value)> {
    let units: [&dyn ToolUnit; 3] = [&EventHandlerUnit, &KeywordCallUnit, &BareScriptUnit];
    for unit in units {
        if unit.supports(context)? {
            tracing::debug!(
                tool_name = call.tool_name,
                convention = ?unit.convention(),
                "Dispatching tool"
            );
            let value = unit.invoke(context, call)?;
            return Ok((unit.convention(), value));
        }
    }
    Err(ToolError::ExecutionFailed(
        "tool code exposes no entry point".to_owned(),
    ))
}

struct EventHandlerUnit;

impl ToolUnit for EventHandlerUnit {
    fn convention(&self) -> Convention {
        Convention::EventHandler
    }

    fn supports(&self, context: &mut Context) -> ToolResult<bool> {
        is_function(context, "handler")
    }

    fn invoke(&self, context: &mut Context, call: &Invocation<'_>) -> ToolResult<Value> {
        let remaining = call
            .deadline
            .saturating_duration_since(Instant::now())
            .as_millis();
        let event = json!({
            "tool_input": call.input,
            "tool_name": call.tool_name,
            "source": call.source,
        });
        let request = json!({
            "requestId": format!("tool-{}-{}", call.tool_name, Uuid::new_v4()),
            "functionName": format!("custom-tool-{}", call.tool_name),
            "functionVersion": call.function_version,
            "memoryLimitInMb": call.memory_limit_mb,
            "remainingTimeInMillis": u64::try_from(remaining).unwrap_or(u64::MAX),
        });
        bind(context, "__lore_event__", &event)?;
        bind(context, "__lore_request__", &request)?;
        call_expression(context, "handler(__lore_event__, __lore_request__)", call)
    }
}

struct KeywordCallUnit;

impl KeywordCallUnit {
    const ENTRY_POINTS: [&'static str; 2] = ["main", "execute"];

    fn entry_point(context: &mut Context) -> ToolResult<Option<&'static str>> {
        for name in Self::ENTRY_POINTS {
            if is_function(context, name)? {
                return Ok(Some(name));
            }
        }
        Ok(None)
    }
}

impl ToolUnit for KeywordCallUnit {
    fn convention(&self) -> Convention {
        Convention::KeywordCall
    }

    fn supports(&self, context: &mut Context) -> ToolResult<bool> {
        Ok(Self::entry_point(context)?.is_some())
    }

    fn invoke(&self, context: &mut Context, call: &Invocation<'_>) -> ToolResult<Value> {
        let Some(name) = Self::entry_point(context)? else {
            return Err(ToolError::ExecutionFailed(
                "no main or execute function".to_owned(),
            ));
        };

        let mut params = declared_params(call.code, name);
        if params.is_none() {
            params = params_from_signature(&function_text(context, name)?);
        }
        let args = params
            .and_then(|params| keyword_args(&params, call.input))
            .unwrap_or_else(|| {
                tracing::debug!(
                    tool_name = call.tool_name,
                    entry_point = name,
                    "Arguments do not match parameters, passing input object"
                );
                vec![Some(call.input.clone())]
            });

        let bound = args.iter().map(|arg| arg.clone().unwrap_or(Value::Null));
        bind(context, "__lore_args__", &Value::Array(bound.collect()))?;
        call_expression(context, &spread_call(name, &args), call)
    }
}

struct BareScriptUnit;

impl ToolUnit for BareScriptUnit {
    fn convention(&self) -> Convention {
        Convention::BareScript
    }

    fn supports(&self, _context: &mut Context) -> ToolResult<bool> {
        Ok(true)
    }

    fn invoke(&self, context: &mut Context, call: &Invocation<'_>) -> ToolResult<Value> {
        let value = eval(
            context,
            "typeof result === 'undefined' ? undefined : result",
        )?;
        let value = settle(value, context)?;
        if value.is_undefined() {
            return Ok(Value::String(IMPLICIT_SUCCESS.to_owned()));
        }
        js_to_json(&value, context, &call.conversion_limits())
    }
}

fn eval(context: &mut Context, code: &str) -> ToolResult<JsValue> {
    context.eval(Source::from_bytes(code)).map_err(|err| {
        let message = describe_js_error(&err, context);
        ToolError::ExecutionFailed(format!("JavaScript error: {message}"))
    })
}

fn is_function(context: &mut Context, name: &str) -> ToolResult<bool> {
    let is_fn = eval(context, &format!("typeof {name} === 'function'"))?;
    Ok(is_fn.to_boolean())
}

fn function_text(context: &mut Context, name: &str) -> ToolResult<String> {
    let text = eval(context, &format!("String({name})"))?;
    Ok(text
        .as_string()
        .map(|js_str| js_str.to_std_string_escaped())
        .unwrap_or_default())
}

fn bind(context: &mut Context, name: &str, value: &Value) -> ToolResult<()> {
    let js_value = json_to_js(value, context)
        .map_err(|err| ToolError::ExecutionFailed(format!("Failed to convert {name}: {err}")))?;
    context
        .register_global_property(JsString::from(name), js_value, Attribute::all())
        .map_err(|err| ToolError::ExecutionFailed(format!("Failed to define {name}: {err}")))
}

fn call_expression(
    context: &mut Context,
    expression: &str,
    call: &Invocation<'_>,
) -> ToolResult<Value> {
    let value = eval(context, expression)?;
    let value = settle(value, context)?;
    js_to_json(&value, context, &call.conversion_limits())
}

/// A declared function parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Param {
    /// `name` or `name = default`
    Named { name: String, has_default: bool },
    /// Destructuring or rest parameter
    Pattern,
}

/// Positional arguments for `params` drawn from `input`, or `None` when the
/// fields and parameters do not line up one to one.
///
/// A defaulted parameter with no matching field yields `None` so the callee
/// sees `undefined` and applies its default.
fn keyword_args(params: &[Param], input: &Value) -> Option<Vec<Option<Value>>> {
    let fields = input.as_object()?;
    let mut args = Vec::with_capacity(params.len());
    for param in params {
        let Param::Named { name, has_default } = param else {
            return None;
        };
        match fields.get(name) {
            Some(value) => args.push(Some(value.clone())),
            None if *has_default => args.push(None),
            None => return None,
        }
    }
    let consumed = args.iter().filter(|arg| arg.is_some()).count();
    (consumed == fields.len()).then_some(args)
}

/// Call expression passing `args` through the bound `__lore_args__` array.
fn spread_call(function: &str, args: &[Option<Value>]) -> String {
    let list = args
        .iter()
        .enumerate()
        .map(|(position, arg)| {
            if arg.is_some() {
                format!("__lore_args__[{position}]")
            } else {
                "undefined".to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{function}({list})")
}

/// Parameters of the function `name` as declared in `code`.
///
/// Recognises `function name(...)`, `name = function (...)` and
/// `name = (...) =>` forms, with or without `async`.
fn declared_params(code: &str, name: &str) -> Option<Vec<Param>> {
    let bytes = code.as_bytes();
    let mut search_from = 0;
    while let Some(offset) = code.get(search_from..)?.find(name) {
        let start = search_from + offset;
        let end = start + name.len();
        search_from = end;

        let bounded_left = start == 0 || !is_ident_byte(bytes[start - 1]);
        let bounded_right = end == bytes.len() || !is_ident_byte(bytes[end]);
        if !bounded_left || !bounded_right {
            continue;
        }

        let before = code[..start].trim_end();
        let after = code[end..].trim_start();
        if before.ends_with("function") && after.starts_with('(') {
            return Some(split_params(parenthesized(after)?));
        }
        if let Some(rhs) = after.strip_prefix('=')
            && !rhs.starts_with('=')
            && !rhs.starts_with('>')
            && let Some(params) = params_from_signature(rhs)
        {
            return Some(params);
        }
    }
    None
}

/// Parameters of a function expression or declaration starting at `text`.
fn params_from_signature(text: &str) -> Option<Vec<Param>> {
    let mut rest = text.trim_start();
    if let Some(stripped) = rest.strip_prefix("async")
        && stripped.starts_with(|ch: char| ch.is_whitespace() || ch == '(')
    {
        rest = stripped.trim_start();
    }
    if let Some(stripped) = rest.strip_prefix("function") {
        let stripped = stripped.trim_start().trim_start_matches('*');
        let open = stripped.find('(')?;
        return Some(split_params(parenthesized(&stripped[open..])?));
    }
    if rest.starts_with('(') {
        let inner = parenthesized(rest)?;
        let tail = rest[inner.len() + 2..].trim_start();
        return tail.starts_with("=>").then(|| split_params(inner));
    }

    let ident_len = rest
        .bytes()
        .take_while(|byte| is_ident_byte(*byte))
        .count();
    let (ident, tail) = rest.split_at(ident_len);
    (is_identifier(ident) && tail.trim_start().starts_with("=>")).then(|| {
        vec![Param::Named {
            name: ident.to_owned(),
            has_default: false,
        }]
    })
}

/// Text between the opening parenthesis at the start of `text` and its match.
fn parenthesized(text: &str) -> Option<&str> {
    let mut depth = 0_usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;
    for (position, byte) in text.bytes().enumerate() {
        if let Some(open_quote) = quote {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == open_quote {
                quote = None;
            }
            continue;
        }
        match byte {
            b'\'' | b'"' | b'`' => quote = Some(byte),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return text.get(1..position);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_params(list: &str) -> Vec<Param> {
    let mut params = Vec::new();
    let mut depth = 0_usize;
    let mut quote: Option<u8> = None;
    let mut piece_start = 0;
    let bytes = list.as_bytes();
    for (position, byte) in bytes.iter().copied().enumerate() {
        if let Some(open_quote) = quote {
            if byte == open_quote && (position == 0 || bytes[position - 1] != b'\\') {
                quote = None;
            }
            continue;
        }
        match byte {
            b'\'' | b'"' | b'`' => quote = Some(byte),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                params.extend(parse_param(&list[piece_start..position]));
                piece_start = position + 1;
            }
            _ => {}
        }
    }
    params.extend(parse_param(&list[piece_start..]));
    params
}

fn parse_param(piece: &str) -> Option<Param> {
    let piece = piece.trim();
    if piece.is_empty() {
        return None;
    }
    if piece.starts_with("...") || piece.starts_with('{') || piece.starts_with('[') {
        return Some(Param::Pattern);
    }
    let (name, has_default) = piece
        .split_once('=')
        .map_or((piece, false), |(name, _default)| (name.trim(), true));
    Some(if is_identifier(name) {
        Param::Named {
            name: name.to_owned(),
            has_default,
        }
    } else {
        Param::Pattern
    })
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$'
}
