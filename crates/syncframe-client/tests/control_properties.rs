//! Property tests for live form controls.
//!
//! Whatever the user did to a form locally, applying server markup must
//! leave the controls exactly as the markup declares them, and the form
//! must serialize accordingly.

use proptest::prelude::*;
use serde_json::Value;
use syncframe_client::{ClientEvent, ClientRuntime, form};
use syncframe_proto::{Instructions, ServerMessage};

fn form_markup(checked: &[bool], value: &str) -> String {
    let boxes: String = checked
        .iter()
        .enumerate()
        .map(|(i, on)| {
            let flag = if *on { " checked" } else { "" };
            format!(r#"<input id="c{i}" type="checkbox" name="c{i}"{flag}>"#)
        })
        .collect();
    format!(r#"<form id="f" s-submit="save">{boxes}<input id="t" name="t" value="{value}"></form>"#)
}

fn page(checked: &[bool]) -> String {
    format!("<html><body>{}</body></html>", form_markup(checked, "server"))
}

fn flags() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 1..8)
}

proptest! {
    /// Server markup wins over local checkbox and input state.
    ///
    /// ORACLE: after the update each checkbox's live `checked` equals the
    /// presence of `checked` in the new markup, and the text input holds the
    /// markup's `value`.
    #[test]
    fn prop_markup_overrides_user_toggles(
        (initial, toggled, declared) in flags().prop_flat_map(|initial| {
            let n = initial.len();
            (Just(initial), prop::collection::vec(any::<bool>(), n), prop::collection::vec(any::<bool>(), n))
        }),
        typed in "[a-z]{0,6}",
    ) {
        let mut runtime = ClientRuntime::load("/", &page(&initial));
        for (i, toggle) in toggled.iter().enumerate() {
            if *toggle {
                let node = runtime.element_by_id(&format!("c{i}")).unwrap();
                let current = runtime.document().element(node).unwrap().live.checked;
                runtime.set_checked(node, !current);
            }
        }
        let text = runtime.element_by_id("t").unwrap();
        runtime.set_value(text, typed);

        let mut instructions = Instructions::default();
        instructions.elements_to_sync.insert("#f".into(), form_markup(&declared, "fresh"));
        runtime.handle(ClientEvent::Server(ServerMessage::Morph(instructions))).unwrap();

        for (i, expected) in declared.iter().enumerate() {
            let node = runtime.element_by_id(&format!("c{i}")).unwrap();
            prop_assert_eq!(runtime.document().element(node).unwrap().live.checked, *expected);
        }
        let text = runtime.element_by_id("t").unwrap();
        prop_assert_eq!(runtime.document().element(text).unwrap().live.value.as_str(), "fresh");
    }

    /// Form data contains exactly the checked boxes.
    ///
    /// ORACLE: a checkbox named `c{i}` appears with value `"on"` iff it is
    /// checked; the text input always appears.
    #[test]
    fn prop_form_data_lists_checked_boxes(checked in flags()) {
        let runtime = ClientRuntime::load("/", &page(&checked));
        let form_node = runtime.element_by_id("f").unwrap();
        let data = form::form_data(runtime.document(), form_node);

        for (i, on) in checked.iter().enumerate() {
            let entry = data.get(&format!("c{i}"));
            if *on {
                prop_assert_eq!(entry, Some(&Value::String("on".into())));
            } else {
                prop_assert!(entry.is_none());
            }
        }
        prop_assert_eq!(data.get("t"), Some(&Value::String("server".into())));
        prop_assert_eq!(data.len(), checked.iter().filter(|on| **on).count() + 1);
    }
}

#[test]
fn user_toggled_checkbox_is_checked_again_by_markup() {
    let mut runtime = ClientRuntime::load("/", &page(&[true]));
    let node = runtime.element_by_id("c0").unwrap();
    runtime.set_checked(node, false);

    let mut instructions = Instructions::default();
    instructions.elements_to_sync.insert("#f".into(), form_markup(&[true], "server"));
    runtime.apply(&instructions);

    assert!(runtime.document().element(node).unwrap().live.checked);
}
