//! Promise settling and JavaScript error messages.

use boa_engine::property::Attribute;
use boa_engine::{Context, JsError, JsValue, Source, js_string};

use crate::{ToolError, ToolResult};

/// Run every queued job.
///
/// # Errors
/// Returns error if a job fails in a way the script cannot catch, such as
/// hitting the loop iteration limit
pub fn drain_jobs(context: &mut Context) -> ToolResult<()> {
    context.run_jobs().map_err(|err| {
        let message = describe_js_error(&err, context);
        ToolError::ExecutionFailed(format!("JavaScript error: {message}"))
    })
}

/// Drain the job queue and, if `value` is a Promise, replace it with its
/// fulfilled value.
///
/// # Errors
/// Returns error if a job fails, or the Promise rejected or never settled
pub fn settle(value: JsValue, context: &mut Context) -> ToolResult<JsValue> {
    drain_jobs(context)?;

    if !is_promise(&value, context) {
        return Ok(value);
    }

    tracing::debug!("Tool returned a Promise, extracting settled value");

    context
        .register_global_property(js_string!("__lore_promise__"), value, Attribute::all())
        .map_err(|err| ToolError::ExecutionFailed(format!("Failed to register promise: {err}")))?;

    let setup_handler = r"
        var __lore_settled__ = false;
        var __lore_value__;
        var __lore_rejection__;
        var __lore_rejected__ = false;
        __lore_promise__.then(
            value => { __lore_settled__ = true; __lore_value__ = value; },
            error => { __lore_settled__ = true; __lore_rejected__ = true; __lore_rejection__ = error; }
        );
    ";
    context
        .eval(Source::from_bytes(setup_handler))
        .map_err(|err| {
            ToolError::ExecutionFailed(format!("Failed to set up promise handler: {err}"))
        })?;

    drain_jobs(context)?;

    if eval_flag(context, "__lore_rejected__")? {
        let rejection = eval_global(context, "__lore_rejection__")?;
        let message = extract_error_message(&rejection, context);
        return Err(ToolError::ExecutionFailed(format!(
            "Promise rejected: {message}"
        )));
    }
    if !eval_flag(context, "__lore_settled__")? {
        return Err(ToolError::ExecutionFailed(
            "Promise never settled".to_owned(),
        ));
    }
    eval_global(context, "__lore_value__")
}

fn is_promise(value: &JsValue, context: &mut Context) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let constructor = obj.get(js_string!("constructor"), context).ok();
    let constructor_obj = constructor.as_ref().and_then(JsValue::as_object);
    let name = constructor_obj.and_then(|ctor| ctor.get(js_string!("name"), context).ok());
    name.as_ref()
        .and_then(|ctor_name| ctor_name.as_string().map(|js_str| js_str.to_std_string_escaped()))
        .is_some_and(|text| text == "Promise")
}

fn eval_global(context: &mut Context, name: &str) -> ToolResult<JsValue> {
    context
        .eval(Source::from_bytes(name))
        .map_err(|err| ToolError::ExecutionFailed(format!("Failed to read {name}: {err}")))
}

fn eval_flag(context: &mut Context, name: &str) -> ToolResult<bool> {
    Ok(eval_global(context, name)?.to_boolean())
}

/// Message of a thrown JavaScript value: its `message` property, the string
/// itself, or its display form.
pub fn extract_error_message(thrown: &JsValue, context: &mut Context) -> String {
    if let Some(text) = thrown.as_string() {
        return text.to_std_string_escaped();
    }
    let message = thrown
        .as_object()
        .and_then(|err_obj| err_obj.get(js_string!("message"), context).ok());
    message
        .as_ref()
        .and_then(|val| val.as_string().map(|js_str| js_str.to_std_string_escaped()))
        .unwrap_or_else(|| thrown.display().to_string())
}

/// Message of an engine error: the thrown value's message, or the native error text.
pub fn describe_js_error(error: &JsError, context: &mut Context) -> String {
    error.as_opaque().map_or_else(
        || error.to_string(),
        |thrown| extract_error_message(thrown, context),
    )
}
