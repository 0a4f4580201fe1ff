//! Route modules and handler tables.
//!
//! A route's server-side behavior lives in a [`RouteModule`] registered at
//! boot. The module exposes a closed list of action names; compiling a route
//! resolves that list into a [`HandlerTable`] once, so dispatch never does
//! string lookups into module code.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;

use crate::{
    context::{RenderContext, Targets},
    error::HandlerError,
    state::ConnectionState,
    validate::FieldSchema,
};

/// What a handler hands back: the next connection state, or `None` if the
/// handler forgot to return one.
pub type HandlerResult = Result<Option<ConnectionState>, HandlerError>;

/// Identifies one action of a module.
///
/// `index` is the position in [`RouteModule::actions`], so modules can match
/// on either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId {
    /// Position in the module's action list.
    pub index: usize,
    /// Action name as declared.
    pub name: &'static str,
}

/// Server-side behavior of a route.
#[async_trait]
pub trait RouteModule: Send + Sync {
    /// Action names this module handles.
    fn actions(&self) -> &'static [&'static str] {
        &[]
    }

    /// Schema used by `_panelValidate`. `None` disables field validation.
    fn schema(&self) -> Option<&dyn FieldSchema> {
        None
    }

    /// Produce the initial state on HTTP GET. The default renders the full
    /// document with empty state.
    async fn mount(&self, ctx: &mut RenderContext, state: ConnectionState) -> HandlerResult {
        Ok(Some(ctx.render(state, Targets::Document)))
    }

    /// Handle one action.
    async fn handle(
        &self,
        action: ActionId,
        _ctx: &mut RenderContext,
        _state: ConnectionState,
    ) -> HandlerResult {
        Err(HandlerError::Unhandled(action.name.to_string()))
    }
}

/// Module used by routes without server code.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticModule;

impl RouteModule for StaticModule {}

/// Modules available to the route compiler, keyed by name.
///
/// A route finds its module under the `module` key of its server block, or
/// under its own endpoint (`/counter`, `/docs/:name`) when the block omits it.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<dyn RouteModule>>,
}

impl ModuleRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `module` under `name`.
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, module: impl RouteModule + 'static) -> Self {
        self.modules.insert(name.into(), Arc::new(module));
        self
    }

    /// Look up a module.
    pub fn get(&self, name: &str) -> Option<Arc<dyn RouteModule>> {
        self.modules.get(name).cloned()
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.modules.keys().collect();
        names.sort();
        f.debug_struct("ModuleRegistry").field("modules", &names).finish()
    }
}

/// Built-in panel actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelAction {
    /// `_panelSubmit`
    Submit,
    /// `_panelBtn`
    Button,
    /// `_panelEasyClose`
    EasyClose,
    /// `_panelValidate`
    Validate,
}

impl PanelAction {
    /// All built-ins.
    pub const ALL: [Self; 4] = [Self::Submit, Self::Button, Self::EasyClose, Self::Validate];

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Submit => "_panelSubmit",
            Self::Button => "_panelBtn",
            Self::EasyClose => "_panelEasyClose",
            Self::Validate => "_panelValidate",
        }
    }

    /// Parse a wire name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.name() == name)
    }
}

/// A resolved action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Module action.
    App(ActionId),
    /// Built-in panel action.
    Panel(PanelAction),
}

/// Action name to handler mapping for one compiled route.
#[derive(Clone)]
pub struct HandlerTable {
    module: Arc<dyn RouteModule>,
    actions: HashMap<&'static str, ActionId>,
    panel: bool,
    functional: bool,
}

impl HandlerTable {
    /// Table for a route without server code: mount renders, no actions.
    pub fn static_route() -> Self {
        Self {
            module: Arc::new(StaticModule),
            actions: HashMap::new(),
            panel: false,
            functional: true,
        }
    }

    /// Table for a route whose server block failed to load. GET still
    /// renders; every action is rejected.
    pub fn disabled() -> Self {
        Self { functional: false, ..Self::static_route() }
    }

    /// Expose `declared` (or every module action if `None`).
    ///
    /// Returns the first declared name the module does not handle.
    pub fn for_module(
        module: Arc<dyn RouteModule>,
        declared: Option<&[String]>,
        panel: bool,
    ) -> Result<Self, String> {
        let available = module.actions();
        let mut actions = HashMap::new();

        match declared {
            None => {
                for (index, &name) in available.iter().enumerate() {
                    actions.insert(name, ActionId { index, name });
                }
            },
            Some(declared) => {
                for wanted in declared {
                    let Some(index) = available.iter().position(|name| name == wanted) else {
                        return Err(wanted.clone());
                    };
                    let name = available[index];
                    actions.insert(name, ActionId { index, name });
                }
            },
        }

        Ok(Self { module, actions, panel, functional: true })
    }

    /// Resolve an action name. `None` for unknown names and for every name
    /// on a disabled table.
    pub fn resolve(&self, name: &str) -> Option<Action> {
        if !self.functional {
            return None;
        }
        if self.panel {
            if let Some(builtin) = PanelAction::parse(name) {
                return Some(Action::Panel(builtin));
            }
        }
        self.actions.get(name).copied().map(Action::App)
    }

    /// Resolve a module action by name (panels name their actions this way).
    pub fn app_action(&self, name: &str) -> Option<ActionId> {
        if !self.functional {
            return None;
        }
        self.actions.get(name).copied()
    }

    /// The route's module.
    pub fn module(&self) -> &Arc<dyn RouteModule> {
        &self.module
    }

    /// `true` if panel built-ins are enabled.
    pub fn panels_enabled(&self) -> bool {
        self.panel
    }

    /// `false` if the server block failed to load.
    pub fn is_functional(&self) -> bool {
        self.functional
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<_> = self.actions.keys().collect();
        actions.sort();
        f.debug_struct("HandlerTable")
            .field("actions", &actions)
            .field("panel", &self.panel)
            .field("functional", &self.functional)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter;

    impl RouteModule for Counter {
        fn actions(&self) -> &'static [&'static str] {
            &["increment", "decrement"]
        }
    }

    #[test]
    fn every_module_action_is_exposed_by_default() {
        let table = HandlerTable::for_module(Arc::new(Counter), None, false).unwrap();

        assert_eq!(
            table.resolve("decrement"),
            Some(Action::App(ActionId { index: 1, name: "decrement" }))
        );
        assert_eq!(table.resolve("reset"), None);
    }

    #[test]
    fn declared_actions_must_exist() {
        let declared = vec!["increment".to_string(), "reset".to_string()];
        let err = HandlerTable::for_module(Arc::new(Counter), Some(&declared), false).unwrap_err();
        assert_eq!(err, "reset");
    }

    #[test]
    fn declared_subset_hides_the_rest() {
        let declared = vec!["increment".to_string()];
        let table = HandlerTable::for_module(Arc::new(Counter), Some(&declared), false).unwrap();

        assert!(table.resolve("increment").is_some());
        assert!(table.resolve("decrement").is_none());
    }

    #[test]
    fn panel_builtins_need_opt_in() {
        let plain = HandlerTable::for_module(Arc::new(Counter), None, false).unwrap();
        let panel = HandlerTable::for_module(Arc::new(Counter), None, true).unwrap();

        assert_eq!(plain.resolve("_panelSubmit"), None);
        assert_eq!(panel.resolve("_panelSubmit"), Some(Action::Panel(PanelAction::Submit)));
    }

    #[test]
    fn disabled_table_rejects_everything() {
        let table = HandlerTable::disabled();
        assert!(!table.is_functional());
        assert_eq!(table.resolve("anything"), None);
    }
}
