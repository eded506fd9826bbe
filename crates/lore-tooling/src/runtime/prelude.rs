//! Globals every tool context starts with: `console`, `require` and the input.

use std::collections::BTreeMap;

use boa_engine::property::Attribute;
use boa_engine::{Context, JsResult, JsString, JsValue, NativeFunction, Source, js_string};
use serde_json::Value;

use super::conversion::{ConversionLimits, js_to_json, json_to_js};
use super::promise::describe_js_error;
use crate::{ToolError, ToolResult};

/// Wires `console.*` to the native logger and defines a module-style `require`
/// over `__lore_modules__`.
const BOOTSTRAP: &str = r#"
(function () {
    const emit = __lore_console__;
    globalThis.console = {
        log: (...args) => emit("info", ...args),
        info: (...args) => emit("info", ...args),
        warn: (...args) => emit("warn", ...args),
        error: (...args) => emit("error", ...args),
        debug: (...args) => emit("debug", ...args),
    };

    const sources = __lore_modules__;
    const cache = {};
    globalThis.require = function require(id) {
        const name = String(id).replace(/^\.\//, "").replace(/\.js$/, "");
        if (Object.prototype.hasOwnProperty.call(cache, name)) {
            return cache[name].exports;
        }
        if (!Object.prototype.hasOwnProperty.call(sources, name)) {
            throw new Error("Cannot find module '" + id + "'");
        }
        const module = { exports: {} };
        cache[name] = module;
        const factory = new Function("module", "exports", "require", sources[name]);
        factory(module, module.exports, require);
        return module.exports;
    };
})();
"#;

/// Install `console` and `require`, with `modules` mapping module ids to source.
///
/// # Errors
/// Returns error if the bootstrap script fails to evaluate
pub fn install(context: &mut Context, modules: &BTreeMap<String, String>) -> ToolResult<()> {
    context
        .register_global_callable(
            js_string!("__lore_console__"),
            1,
            NativeFunction::from_fn_ptr(console_emit),
        )
        .map_err(|err| ToolError::ExecutionFailed(format!("Failed to register console: {err}")))?;

    let sources = Value::Object(
        modules
            .iter()
            .map(|(id, source)| (id.clone(), Value::String(source.clone())))
            .collect(),
    );
    let sources = json_to_js(&sources, context)
        .map_err(|err| ToolError::ExecutionFailed(format!("Failed to load modules: {err}")))?;
    context
        .register_global_property(js_string!("__lore_modules__"), sources, Attribute::all())
        .map_err(|err| ToolError::ExecutionFailed(format!("Failed to load modules: {err}")))?;

    context
        .eval(Source::from_bytes(BOOTSTRAP))
        .map_err(|err| {
            let message = describe_js_error(&err, context);
            ToolError::ExecutionFailed(format!("Failed to bootstrap sandbox: {message}"))
        })?;
    Ok(())
}

fn console_emit(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let level = args
        .first()
        .and_then(|level| level.as_string().map(|text| text.to_std_string_escaped()))
        .unwrap_or_default();
    let message = args
        .iter()
        .skip(1)
        .map(|arg| render_log_arg(arg, context))
        .collect::<Vec<_>>()
        .join(" ");

    match level.as_str() {
        "error" => tracing::error!(target: "tool", "{message}"),
        "warn" => tracing::warn!(target: "tool", "{message}"),
        "debug" => tracing::debug!(target: "tool", "{message}"),
        _ => tracing::info!(target: "tool", "{message}"),
    }
    Ok(JsValue::undefined())
}

fn render_log_arg(arg: &JsValue, context: &mut Context) -> String {
    if let Some(text) = arg.as_string() {
        return text.to_std_string_escaped();
    }
    if arg.is_object()
        && !arg.is_callable()
        && let Ok(json) = js_to_json(arg, context, &ConversionLimits::default())
    {
        return json.to_string();
    }
    arg.display().to_string()
}

/// Expose `input` as the global `input` and each of its fields as a global
/// of the same name.
///
/// Fields named `result`, fields that are not valid identifiers and fields
/// that would shadow an existing global are left out.
///
/// # Errors
/// Returns error if a value cannot be defined in the context
pub fn inject_input(context: &mut Context, input: &Value) -> ToolResult<()> {
    define_global(context, "input", input)?;

    let Some(fields) = input.as_object() else {
        return Ok(());
    };
    for (name, value) in fields {
        if name == "result" || !is_identifier(name) {
            continue;
        }
        if global_exists(context, name)? {
            tracing::debug!(field = %name, "Input field shadows a global, skipping");
            continue;
        }
        define_global(context, name, value)?;
    }
    Ok(())
}

fn define_global(context: &mut Context, name: &str, value: &Value) -> ToolResult<()> {
    let js_value = json_to_js(value, context)
        .map_err(|err| ToolError::ExecutionFailed(format!("Failed to convert {name}: {err}")))?;
    context
        .register_global_property(JsString::from(name), js_value, Attribute::all())
        .map_err(|err| ToolError::ExecutionFailed(format!("Failed to define {name}: {err}")))
}

fn global_exists(context: &mut Context, name: &str) -> ToolResult<bool> {
    let check = format!("'{name}' in globalThis");
    context
        .eval(Source::from_bytes(&check))
        .map(|found| found.to_boolean())
        .map_err(|err| ToolError::ExecutionFailed(format!("Failed to look up {name}: {err}")))
}

/// Whether `name` is a plain identifier that is not a reserved word.
pub fn is_identifier(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
        "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for",
        "function", "if", "import", "in", "instanceof", "let", "new", "null", "return",
        "static", "super", "switch", "this", "throw", "true", "try", "typeof", "var", "void",
        "while", "with", "yield",
    ];

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '$')
        && !RESERVED.contains(&name)
}
