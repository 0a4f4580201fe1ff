//! Route compilation.
//!
//! Compiling a route file goes through these stages, each a pure function of
//! the routes tree:
//!
//! 1. The `<script server>` block is cut out and parsed as a TOML manifest
//!    naming the module, its exposed actions and whether panel built-ins are
//!    enabled. The manifest becomes the route's [`HandlerTable`].
//! 2. Unless the route contains `{{ nolayout }}`, the nearest `_layout.html`
//!    wraps the content at its `{{ slot }}` marker.
//! 3. `{{ partial 'path' }}` tags are replaced by the named files, recursively.
//! 4. The markup is parsed, conditional-class directives are rewritten into
//!    template tags, and the result is compiled into a document template plus
//!    one fragment template per element with a static `id`.
//!
//! A marker preceded by a backslash is escaped and left alone.

use std::{
    collections::HashMap,
    fmt,
    ops::Range,
    sync::{Arc, LazyLock},
};

use futures_util::future::BoxFuture;
use regex::Regex;
use serde::Deserialize;
use syncframe_core::{
    Document, Scope, Template,
    directive::expand_directives,
    dom::parse_document,
};
use tracing::{debug, error, warn};

use crate::{
    error::{CompileError, SourceError},
    module::{HandlerTable, ModuleRegistry, StaticModule},
    routes::RouteEntry,
    source::TemplateSource,
};

/// Partials nested deeper than this are left unexpanded.
pub const MAX_PARTIAL_DEPTH: usize = 16;

const LAYOUT_FILE: &str = "_layout.html";

#[allow(clippy::expect_used)]
static SERVER_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<script\s+server\s*>(.*?)</script>").expect("static pattern"));

#[allow(clippy::expect_used)]
static SLOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\\?)\{\{[ \t]*slot[ \t]*\}\}").expect("static pattern"));

#[allow(clippy::expect_used)]
static NOLAYOUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\\?)\{\{[ \t]*nolayout[ \t]*\}\}").expect("static pattern"));

#[allow(clippy::expect_used)]
static PARTIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\\?)\{\{[ \t]*partial[ \t]*['"]?([\w\-/.]+)['"]?[ \t]*\}\}"#).expect("static pattern")
});

/// Declarative contents of a `<script server>` block.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerBlock {
    /// Registry key of the route module. Defaults to the route's endpoint.
    module: Option<String>,
    /// Actions to expose. Defaults to every action of the module.
    actions: Option<Vec<String>>,
    /// Enable `_panelSubmit`, `_panelBtn`, `_panelEasyClose`, `_panelValidate`.
    #[serde(default)]
    panel: bool,
}

/// A route ready to render.
///
/// Built once per endpoint on first request and cached until restart.
pub struct CompiledRoute {
    endpoint: String,
    file: String,
    tree: Document,
    document: Template,
    fragments: HashMap<String, Template>,
    handlers: HandlerTable,
}

impl CompiledRoute {
    /// Primary endpoint (`/docs/:name`).
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Route file relative to the routes root.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Parsed template markup after layout, partial and directive expansion.
    pub fn tree(&self) -> &Document {
        &self.tree
    }

    /// Action table.
    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Render the full document.
    pub fn render_document(&self, scope: &Scope) -> String {
        self.document.render(scope)
    }

    /// Render the element with `#id`.
    ///
    /// Elements whose id is static render from their own fragment template.
    /// Anything else (ids produced by the template itself) is located in a
    /// full render.
    pub fn render_fragment(&self, id: &str, scope: &Scope) -> Option<String> {
        let id = id.strip_prefix('#').unwrap_or(id);
        if let Some(fragment) = self.fragments.get(id) {
            return Some(fragment.render(scope));
        }
        let rendered = parse_document(&self.document.render(scope));
        rendered.get_element_by_id(id).map(|node| rendered.outer_html(node))
    }
}

impl fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("endpoint", &self.endpoint)
            .field("file", &self.file)
            .field("fragments", &self.fragments.len())
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

/// Compile one route.
pub async fn compile(
    source: &dyn TemplateSource,
    modules: &ModuleRegistry,
    entry: &RouteEntry,
) -> Result<CompiledRoute, CompileError> {
    let raw = source
        .read(&entry.file)
        .await?
        .ok_or_else(|| SourceError::NotFound(entry.file.clone()))?;

    let (content, block) = split_server_block(&raw);
    let handlers = handler_table(modules, &entry.endpoint, &entry.file, block.as_deref());

    let markup = wrap_with_layout(source, &entry.file, content).await?;
    let markup = expand_partials(source, &entry.file, markup, 0).await?;

    let mut tree = parse_document(&markup);
    expand_directives(&mut tree);
    let document = Template::parse(&tree.to_html())
        .map_err(|source| CompileError::Template { file: entry.file.clone(), source })?;
    let fragments = fragment_templates(&tree);

    debug!(
        "compiled {} from {} ({} fragments)",
        entry.endpoint,
        entry.file,
        fragments.len()
    );

    Ok(CompiledRoute {
        endpoint: entry.endpoint.clone(),
        file: entry.file.clone(),
        tree,
        document,
        fragments,
        handlers,
    })
}

/// Compile the `_404.html` / `_500.html` page nearest to `dir`.
///
/// Error pages get the same layout and partial treatment as routes. With no
/// such file anywhere up to the root the built-in page is used.
pub async fn compile_error_page(
    source: &dyn TemplateSource,
    dir: &str,
    status: u16,
) -> Result<Template, CompileError> {
    let name = format!("_{status}.html");
    let Some((path, content)) = find_nearest(source, dir, &name).await? else {
        return Template::parse(BUILTIN_ERROR_PAGE)
            .map_err(|source| CompileError::Template { file: name, source });
    };

    let markup = wrap_with_layout(source, &path, content).await?;
    let markup = expand_partials(source, &path, markup, 0).await?;
    let mut tree = parse_document(&markup);
    expand_directives(&mut tree);
    Template::parse(&tree.to_html()).map_err(|source| CompileError::Template { file: path, source })
}

const BUILTIN_ERROR_PAGE: &str = "<!DOCTYPE html>\n<html>\n<head><title><%= error.title %></title></head>\n\
<body>\n<h1><%= error.title %></h1>\n<p><%= error.message %></p>\n</body>\n</html>\n";

/// Separate the route content from its server block.
fn split_server_block(raw: &str) -> (String, Option<String>) {
    match SERVER_BLOCK.captures(raw) {
        Some(captures) => {
            let block = captures.get(1).map(|m| m.as_str().to_string());
            let whole = captures.get(0).map_or(0..0, |m| m.range());
            let mut content = String::with_capacity(raw.len());
            content.push_str(&raw[..whole.start]);
            content.push_str(&raw[whole.end..]);
            (content.trim().to_string(), block)
        },
        None => (raw.to_string(), None),
    }
}

fn handler_table(
    modules: &ModuleRegistry,
    endpoint: &str,
    file: &str,
    block: Option<&str>,
) -> HandlerTable {
    let manifest = match block {
        None => {
            return match modules.get(endpoint) {
                Some(module) => HandlerTable::for_module(module, None, false)
                    .unwrap_or_else(|_| HandlerTable::disabled()),
                None => HandlerTable::static_route(),
            };
        },
        Some(text) => match toml::from_str::<ServerBlock>(text) {
            Ok(manifest) => manifest,
            Err(e) => {
                error!("unable to parse server block in {file}: {e}");
                return HandlerTable::disabled();
            },
        },
    };

    let name = manifest.module.as_deref().unwrap_or(endpoint);
    let implicit = manifest.module.is_none() && manifest.actions.as_ref().is_none_or(Vec::is_empty);
    let module = match modules.get(name) {
        Some(module) => module,
        None if implicit => Arc::new(StaticModule),
        None => {
            error!("server block in {file} names unknown module `{name}`");
            return HandlerTable::disabled();
        },
    };

    match HandlerTable::for_module(module, manifest.actions.as_deref(), manifest.panel) {
        Ok(table) => table,
        Err(missing) => {
            error!("server block in {file} declares action `{missing}` but module `{name}` has no handler for it");
            HandlerTable::disabled()
        },
    }
}

/// First marker match not preceded by a backslash.
fn find_unescaped(pattern: &Regex, text: &str) -> Option<Range<usize>> {
    pattern
        .captures_iter(text)
        .find(|c| c.get(1).is_some_and(|m| m.as_str().is_empty()))
        .and_then(|c| c.get(0))
        .map(|m| m.range())
}

fn splice(text: &str, range: Range<usize>, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len() + replacement.len());
    out.push_str(&text[..range.start]);
    out.push_str(replacement);
    out.push_str(&text[range.end..]);
    out
}

async fn wrap_with_layout(
    source: &dyn TemplateSource,
    file: &str,
    content: String,
) -> Result<String, CompileError> {
    if find_unescaped(&NOLAYOUT, &content).is_some() {
        let mut content = content;
        while let Some(range) = find_unescaped(&NOLAYOUT, &content) {
            content = splice(&content, range, "");
        }
        return Ok(content);
    }

    let Some((path, layout)) = find_nearest(source, parent_dir(file), LAYOUT_FILE).await? else {
        return Ok(content);
    };
    match find_unescaped(&SLOT, &layout) {
        Some(range) => Ok(splice(&layout, range, &content)),
        None => {
            warn!("layout {path} has no {{{{ slot }}}} marker; serving {file} unwrapped");
            Ok(content)
        },
    }
}

/// Look for `name` in `dir`, then each parent up to the routes root.
async fn find_nearest(
    source: &dyn TemplateSource,
    dir: &str,
    name: &str,
) -> Result<Option<(String, String)>, SourceError> {
    let mut dir = dir.trim_matches('/').to_string();
    loop {
        let path = if dir.is_empty() { name.to_string() } else { format!("{dir}/{name}") };
        if let Some(contents) = source.read(&path).await? {
            return Ok(Some((path, contents)));
        }
        if dir.is_empty() {
            return Ok(None);
        }
        dir = parent_dir(&dir).to_string();
    }
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Resolve a partial reference against the including file.
fn resolve_partial(including: &str, reference: &str) -> String {
    let last = reference.rsplit('/').next().unwrap_or(reference);
    let with_ext =
        if last.contains('.') { reference.to_string() } else { format!("{reference}.html") };

    let joined = match with_ext.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => {
            let dir = parent_dir(including);
            if dir.is_empty() { with_ext } else { format!("{dir}/{with_ext}") }
        },
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                segments.pop();
            },
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn expand_partials<'a>(
    source: &'a dyn TemplateSource,
    file: &'a str,
    template: String,
    depth: usize,
) -> BoxFuture<'a, Result<String, CompileError>> {
    Box::pin(async move {
        let tags: Vec<(Range<usize>, String)> = PARTIAL
            .captures_iter(&template)
            .filter(|c| c.get(1).is_some_and(|m| m.as_str().is_empty()))
            .filter_map(|c| Some((c.get(0)?.range(), c.get(2)?.as_str().to_string())))
            .collect();
        if tags.is_empty() {
            return Ok(template);
        }
        if depth >= MAX_PARTIAL_DEPTH {
            error!("partials nested deeper than {MAX_PARTIAL_DEPTH} in {file}; leaving tags unexpanded");
            return Ok(template);
        }

        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for (range, reference) in tags {
            out.push_str(&template[last..range.start]);
            let path = resolve_partial(file, &reference);
            match source.read(&path).await? {
                Some(body) => {
                    let body = expand_partials(source, &path, body, depth + 1).await?;
                    out.push_str(&body);
                },
                None => {
                    error!(
                        "failed to process partial tag {} in {file}: no file found at {path}",
                        &template[range.clone()]
                    );
                    out.push_str(&template[range.clone()]);
                },
            }
            last = range.end;
        }
        out.push_str(&template[last..]);
        Ok(out)
    })
}

/// One template per element whose `id` is fixed at compile time.
fn fragment_templates(tree: &Document) -> HashMap<String, Template> {
    let mut fragments = HashMap::new();
    for node in tree.elements_with_attr("id") {
        let Some(id) = tree.attr(node, "id") else { continue };
        if id.is_empty() || id.contains("<%") || fragments.contains_key(id) {
            continue;
        }
        match Template::parse(&tree.outer_html(node)) {
            Ok(template) => {
                fragments.insert(id.to_string(), template);
            },
            Err(e) => debug!("no fragment template for #{id}: {e}"),
        }
    }
    fragments
}
