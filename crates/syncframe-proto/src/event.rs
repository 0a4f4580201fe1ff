//! DOM event types that can carry a declarative action binding.

use std::fmt;

/// A DOM event type the client runtime binds through an `s-<event>`
/// attribute.
///
/// `Submit` is special: it is only bound on `form[s-submit]` and sends the
/// serialized form instead of a literal payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// `click`
    Click,
    /// `dblclick`
    DblClick,
    /// `mousedown`
    MouseDown,
    /// `mouseup`
    MouseUp,
    /// `mouseover`
    MouseOver,
    /// `mousemove`
    MouseMove,
    /// `mouseout`
    MouseOut,
    /// `dragstart`
    DragStart,
    /// `drag`
    Drag,
    /// `dragenter`
    DragEnter,
    /// `dragleave`
    DragLeave,
    /// `dragover`
    DragOver,
    /// `drop`
    Drop,
    /// `dragend`
    DragEnd,
    /// `select`
    Select,
    /// `change`
    Change,
    /// `input`
    Input,
    /// `reset`
    Reset,
    /// `focus`
    Focus,
    /// `blur`
    Blur,
    /// `submit` (forms only)
    Submit,
}

impl EventType {
    /// Event types bound through `s-<event>` attributes on any element.
    pub const ATTRIBUTE_BOUND: [Self; 20] = [
        Self::Click,
        Self::DblClick,
        Self::MouseDown,
        Self::MouseUp,
        Self::MouseOver,
        Self::MouseMove,
        Self::MouseOut,
        Self::DragStart,
        Self::Drag,
        Self::DragEnter,
        Self::DragLeave,
        Self::DragOver,
        Self::Drop,
        Self::DragEnd,
        Self::Select,
        Self::Change,
        Self::Input,
        Self::Reset,
        Self::Focus,
        Self::Blur,
    ];

    /// DOM name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::DblClick => "dblclick",
            Self::MouseDown => "mousedown",
            Self::MouseUp => "mouseup",
            Self::MouseOver => "mouseover",
            Self::MouseMove => "mousemove",
            Self::MouseOut => "mouseout",
            Self::DragStart => "dragstart",
            Self::Drag => "drag",
            Self::DragEnter => "dragenter",
            Self::DragLeave => "dragleave",
            Self::DragOver => "dragover",
            Self::Drop => "drop",
            Self::DragEnd => "dragend",
            Self::Select => "select",
            Self::Change => "change",
            Self::Input => "input",
            Self::Reset => "reset",
            Self::Focus => "focus",
            Self::Blur => "blur",
            Self::Submit => "submit",
        }
    }

    /// Parse a DOM event name. `None` for unsupported events.
    pub fn parse(name: &str) -> Option<Self> {
        if name == "submit" {
            return Some(Self::Submit);
        }
        Self::ATTRIBUTE_BOUND.into_iter().find(|event| event.as_str() == name)
    }

    /// Markup attribute naming the bound action, e.g. `s-click`.
    pub fn binding_attribute(self) -> String {
        format!("s-{}", self.as_str())
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
