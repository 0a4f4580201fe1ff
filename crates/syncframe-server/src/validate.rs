//! Per-field validation for panel forms.
//!
//! A field change fires `_panelValidate` with the field as trigger. Only that
//! field is validated; the fieldset wrapping it (`#<id>-fs`) gets `.invalid`
//! toggled and re-rendered, and `#submit-btn` is disabled while any field of
//! the form is invalid. Messages are kept in `state._formErrors` keyed by the
//! field's element id.

use serde_json::{Map, Value};
use tracing::warn;

use crate::{
    context::{RenderContext, Targets},
    state::{ConnectionState, FORM_ERRORS_KEY},
};

/// Id of the button disabled while the form has errors.
pub const SUBMIT_BUTTON_ID: &str = "#submit-btn";

/// Validation rules for one form.
pub trait FieldSchema: Send + Sync {
    /// Error message for `value` in field `name`, or `None` if valid.
    fn validate_field(&self, name: &str, value: &str) -> Option<String>;
}

/// Validate the triggering field and emit the fieldset update.
pub(crate) fn validate_trigger(
    ctx: &mut RenderContext,
    mut state: ConnectionState,
    schema: &dyn FieldSchema,
) -> ConnectionState {
    let Some(trigger) = ctx.trigger.clone() else {
        warn!("field validation needs a trigger");
        return state;
    };
    if trigger.id.is_empty() || trigger.name.is_empty() {
        warn!("field validation needs a trigger with an id and a name");
        return state;
    }

    let message = schema.validate_field(&trigger.name, &trigger.value);

    let errors = state.entry(FORM_ERRORS_KEY).or_insert_with(|| Value::Object(Map::new()));
    if !errors.is_object() {
        *errors = Value::Object(Map::new());
    }
    let Value::Object(errors) = errors else {
        return state;
    };

    let previous = errors.get(&trigger.id).and_then(Value::as_str);
    if previous == message.as_deref() {
        return state;
    }

    let fieldset = format!("#{}-fs", trigger.id);
    match message {
        Some(message) => {
            errors.insert(trigger.id.clone(), Value::String(message));
            ctx.add_class(&fieldset, &[".invalid"]);
        },
        None => {
            errors.remove(&trigger.id);
            ctx.remove_class(&fieldset, &[".invalid"]);
        },
    }

    if errors.is_empty() {
        ctx.remove_attribute(SUBMIT_BUTTON_ID, &["disabled"]);
    } else {
        ctx.set_attribute(SUBMIT_BUTTON_ID, "disabled", "");
    }

    ctx.render(state, Targets::id(fieldset))
}
