//! JavaScript/JSON value conversion.

use std::time::Instant;

use boa_engine::object::JsObject;
use boa_engine::object::builtins::JsArray;
use boa_engine::property::PropertyKey;
use boa_engine::{Context, JsNativeError, JsResult, JsString, JsValue, js_string};
use serde_json::{Map, Number, Value};

use crate::{ToolError, ToolResult};

/// Objects nested deeper than this are treated as cyclic.
const MAX_DEPTH: usize = 64;

/// Largest integer an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Array elements converted per value unless configured otherwise.
pub const DEFAULT_MAX_ELEMENTS: usize = 100_000;

/// Bounds on converting a value produced by tool code.
#[derive(Debug, Clone, Copy)]
pub struct ConversionLimits {
    /// Most array elements converted across the whole value
    pub max_elements: usize,
    /// Conversion fails once this instant has passed
    pub deadline: Option<Instant>,
}

impl Default for ConversionLimits {
    fn default() -> Self {
        Self {
            max_elements: DEFAULT_MAX_ELEMENTS,
            deadline: None,
        }
    }
}

/// Convert a JS value to JSON the way `JSON.stringify` would see it:
/// functions and `undefined` properties are dropped, `NaN`/`Infinity` become null.
///
/// # Errors
/// Returns error if a property getter throws, the value is too deeply nested,
/// holds more array elements than `limits` allow, or the deadline passes
pub fn js_to_json(
    value: &JsValue,
    context: &mut Context,
    limits: &ConversionLimits,
) -> ToolResult<Value> {
    let mut converter = Converter {
        limits,
        remaining: limits.max_elements,
    };
    converter
        .convert(value, context, 0)
        .map_err(|err| ToolError::ExecutionFailed(format!("Failed to convert JS value: {err}")))
}

struct Converter<'limits> {
    limits: &'limits ConversionLimits,
    remaining: usize,
}

impl Converter<'_> {
    fn convert(&mut self, value: &JsValue, context: &mut Context, depth: usize) -> JsResult<Value> {
        if depth > MAX_DEPTH {
            return Err(JsNativeError::range()
                .with_message("value is nested too deeply")
                .into());
        }

        if value.is_null() || value.is_undefined() || value.is_callable() || value.is_symbol() {
            Ok(Value::Null)
        } else if let Some(boolean) = value.as_boolean() {
            Ok(Value::Bool(boolean))
        } else if let Some(number) = value.as_number() {
            Ok(number_to_json(number))
        } else if let Some(string) = value.as_string() {
            Ok(Value::String(string.to_std_string_escaped()))
        } else if let Some(obj) = value.as_object() {
            if obj.is_array() {
                self.convert_array(&obj, context, depth)
            } else {
                self.convert_object(&obj, context, depth)
            }
        } else {
            Ok(Value::String(value.display().to_string()))
        }
    }

    fn convert_array(
        &mut self,
        obj: &JsObject,
        context: &mut Context,
        depth: usize,
    ) -> JsResult<Value> {
        let length = obj
            .get(js_string!("length"), context)?
            .to_u32(context)
            .unwrap_or(0);
        let count = usize::try_from(length).unwrap_or(usize::MAX);
        if count > self.remaining {
            return Err(JsNativeError::range()
                .with_message(format!(
                    "array of {length} elements exceeds the limit of {}",
                    self.limits.max_elements
                ))
                .into());
        }
        self.remaining -= count;

        let mut array = Vec::new();
        for index in 0..length {
            self.check_deadline()?;
            let element = obj.get(index, context)?;
            array.push(self.convert(&element, context, depth + 1)?);
        }
        Ok(Value::Array(array))
    }

    fn convert_object(
        &mut self,
        obj: &JsObject,
        context: &mut Context,
        depth: usize,
    ) -> JsResult<Value> {
        let mut map = Map::new();
        for key in obj.own_property_keys(context)? {
            self.check_deadline()?;
            if matches!(key, PropertyKey::Symbol(_)) {
                continue;
            }
            let prop_value = obj.get(key.clone(), context)?;
            if prop_value.is_undefined() || prop_value.is_callable() {
                continue;
            }
            let key_string = JsValue::from(key).to_string(context)?;
            map.insert(
                key_string.to_std_string_escaped(),
                self.convert(&prop_value, context, depth + 1)?,
            );
        }
        Ok(Value::Object(map))
    }

    fn check_deadline(&self) -> JsResult<()> {
        match self.limits.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(JsNativeError::error()
                .with_message("conversion ran past the execution deadline")
                .into()),
            _ => Ok(()),
        }
    }
}

fn number_to_json(number: f64) -> Value {
    if number.is_finite() && number.fract() == 0.0 && number.abs() <= MAX_SAFE_INTEGER {
        Value::Number(Number::from(number as i64))
    } else {
        Number::from_f64(number).map_or(Value::Null, Value::Number)
    }
}

/// Convert JSON into a JS value.
///
/// # Errors
/// Returns error if an array or object property cannot be set
pub fn json_to_js(value: &Value, context: &mut Context) -> JsResult<JsValue> {
    match value {
        Value::Null => Ok(JsValue::null()),
        Value::Bool(boolean) => Ok(JsValue::from(*boolean)),
        Value::Number(number) => Ok(number.as_i64().map_or_else(
            || JsValue::from(number.as_f64().unwrap_or(0.0)),
            JsValue::from,
        )),
        Value::String(string) => Ok(JsValue::from(JsString::from(string.as_str()))),
        Value::Array(array) => {
            let js_array = JsArray::new(context);
            for (index, element) in array.iter().enumerate() {
                let js_element = json_to_js(element, context)?;
                js_array.set(index, js_element, true, context)?;
            }
            Ok(js_array.into())
        }
        Value::Object(fields) => {
            let js_obj = JsObject::with_object_proto(context.intrinsics());
            for (key, field) in fields {
                let js_field = json_to_js(field, context)?;
                js_obj.set(JsString::from(key.as_str()), js_field, true, context)?;
            }
            Ok(js_obj.into())
        }
    }
}
