use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::builtin;
use crate::content::{ContentError, ContentRule};
use crate::editor::{ApplyError, Editor};
use crate::model::{Attrs, Document, Node};
use crate::ops::Transaction;
use crate::schema::AttrSpec;
use crate::selection::{self, Selection};

/// Content rule of the document root.
pub const ROOT_CONTENT: &str = "block+";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate node type: {0}")]
    DuplicateNodeType(String),
    #[error("duplicate mark type: {0}")]
    DuplicateMarkType(String),
    #[error("markup mapping `{0}` is already taken")]
    DuplicateMarkup(String),
    #[error("duplicate command id: {0}")]
    DuplicateCommand(String),
    #[error("duplicate query id: {0}")]
    DuplicateQuery(String),
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),
    #[error("node type `{kind}` has an invalid content rule: {reason}")]
    InvalidContent { kind: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("invalid arguments for `{command}`: {reason}")]
    InvalidArgs { command: String, reason: String },
    #[error("not applicable: {0}")]
    NotApplicable(String),
}

impl CommandError {
    pub fn not_applicable(reason: impl Into<String>) -> Self {
        CommandError::NotApplicable(reason.into())
    }

    pub fn invalid_args(command: impl Into<String>, reason: impl Into<String>) -> Self {
        CommandError::InvalidArgs {
            command: command.into(),
            reason: reason.into(),
        }
    }
}

impl From<ApplyError> for CommandError {
    fn from(err: ApplyError) -> Self {
        CommandError::NotApplicable(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("unknown query: {0}")]
    UnknownQuery(String),
    #[error("invalid query arguments: {0}")]
    InvalidArgs(String),
    #[error("failed to decode query result: {0}")]
    Decode(String),
}

/// Deserializes command arguments, treating missing arguments as `{}`.
pub fn command_args<T: DeserializeOwned>(
    command: &str,
    args: Option<Value>,
) -> Result<T, CommandError> {
    let value = args.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(value).map_err(|err| CommandError::invalid_args(command, err.to_string()))
}

pub type CommandHandler =
    Arc<dyn Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync>;

pub type QueryHandler = Arc<dyn Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync>;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub args_example: Option<Value>,
    pub hidden: bool,
    pub handler: CommandHandler,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut Editor, Option<Value>) -> Result<(), CommandError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            args_example: None,
            hidden: false,
            handler: Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn args_example(mut self, args_example: Value) -> Self {
        self.args_example = Some(args_example);
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: QueryHandler,
}

impl QuerySpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            handler: Arc::new(handler),
        }
    }
}

/// How a node type maps onto portable markup.
#[derive(Debug, Clone)]
pub struct MarkupSpec {
    pub tag: String,
    /// `data-type` discriminator; custom blocks are `<div data-type="...">`.
    pub data_type: Option<String>,
    pub tag_aliases: Vec<String>,
    /// Derives the tag from attributes, e.g. `h2` for a level-2 heading.
    pub render_tag: Option<fn(&Attrs) -> String>,
    /// Extra element wrapped around the children, e.g. `<code>` in `<pre>`.
    pub inner_wrapper: Option<String>,
    /// Newlines are kept as text instead of becoming `<br>`.
    pub preserve_newlines: bool,
}

impl MarkupSpec {
    fn custom(name: &str) -> Self {
        Self {
            tag: "div".to_string(),
            data_type: Some(name.to_string()),
            tag_aliases: Vec::new(),
            render_tag: None,
            inner_wrapper: None,
            preserve_newlines: false,
        }
    }

    fn matches_tag(&self, tag: &str) -> bool {
        self.tag == tag || self.tag_aliases.iter().any(|alias| alias == tag)
    }
}

/// How the plain-text dialect renders a node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlainTextRule {
    Paragraph,
    Heading,
    Blockquote,
    CodeBlock,
    Divider,
    Image,
    BulletedList,
    OrderedList,
    ListItem,
    Table,
    TableRow,
    TableCell,
    /// Only the children are kept.
    Flatten,
    /// Rendered as a `[[block:<name>]]` token.
    Placeholder,
}

#[derive(Debug, Clone)]
pub struct NodeType {
    pub name: String,
    pub group: Option<String>,
    pub content: String,
    pub attrs: Vec<AttrSpec>,
    pub atomic: bool,
    pub markup: MarkupSpec,
    pub plain_text: PlainTextRule,
}

impl NodeType {
    /// A container outside any group. Maps to `<div data-type=name>` until a
    /// tag is set.
    pub fn element(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            markup: MarkupSpec::custom(&name),
            name,
            group: None,
            content: content.into(),
            attrs: Vec::new(),
            atomic: false,
            plain_text: PlainTextRule::Flatten,
        }
    }

    /// A container in the `block` group.
    pub fn block(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::element(name, content).group("block")
    }

    /// An atomic block with no editable children.
    pub fn atomic(name: impl Into<String>) -> Self {
        let mut node_type = Self::block(name, "");
        node_type.atomic = true;
        node_type.plain_text = PlainTextRule::Placeholder;
        node_type
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn attr(mut self, spec: AttrSpec) -> Self {
        self.attrs.push(spec);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.markup.tag = tag.into();
        self.markup.data_type = None;
        self
    }

    pub fn tag_alias(mut self, tag: impl Into<String>) -> Self {
        self.markup.tag_aliases.push(tag.into());
        self
    }

    pub fn render_tag(mut self, render: fn(&Attrs) -> String) -> Self {
        self.markup.render_tag = Some(render);
        self
    }

    pub fn inner_wrapper(mut self, tag: impl Into<String>) -> Self {
        self.markup.inner_wrapper = Some(tag.into());
        self
    }

    pub fn preserve_newlines(mut self) -> Self {
        self.markup.preserve_newlines = true;
        self
    }

    pub fn plain_text(mut self, rule: PlainTextRule) -> Self {
        self.plain_text = rule;
        self
    }

    pub fn attr_spec(&self, name: &str) -> Option<&AttrSpec> {
        self.attrs.iter().find(|spec| spec.name == name)
    }

    pub fn is_inline(&self) -> bool {
        self.group.as_deref() == Some("inline")
    }

    pub fn tag_for(&self, attrs: &Attrs) -> String {
        match self.markup.render_tag {
            Some(render) => render(attrs),
            None => self.markup.tag.clone(),
        }
    }
}

/// How the plain-text dialect renders a mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkPlainText {
    Delimiter(&'static str),
    Link,
    Dropped,
}

#[derive(Debug, Clone)]
pub struct MarkType {
    pub name: String,
    pub attrs: Vec<AttrSpec>,
    pub tag: String,
    pub tag_aliases: Vec<String>,
    /// Emits `data-mark="<name>"` so several marks can share a tag.
    pub data_mark: bool,
    pub plain_text: MarkPlainText,
}

impl MarkType {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            tag: tag.into(),
            tag_aliases: Vec::new(),
            data_mark: false,
            plain_text: MarkPlainText::Dropped,
        }
    }

    pub fn attr(mut self, spec: AttrSpec) -> Self {
        self.attrs.push(spec);
        self
    }

    pub fn tag_alias(mut self, tag: impl Into<String>) -> Self {
        self.tag_aliases.push(tag.into());
        self
    }

    pub fn data_mark(mut self) -> Self {
        self.data_mark = true;
        self
    }

    pub fn plain_text(mut self, rule: MarkPlainText) -> Self {
        self.plain_text = rule;
        self
    }

    fn matches_tag(&self, tag: &str) -> bool {
        self.tag == tag || self.tag_aliases.iter().any(|alias| alias == tag)
    }
}

pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<crate::ops::Op>;
}

#[derive(Debug, Clone)]
pub struct TransactionPreview {
    pub doc: Document,
    pub selection: Selection,
}

pub trait TransactionTransform: Send + Sync {
    fn id(&self) -> &'static str;
    fn transform(&self, editor: &Editor, tx: &Transaction) -> Option<Transaction>;
}

pub trait EditorPlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn node_types(&self) -> Vec<NodeType> {
        Vec::new()
    }
    fn mark_types(&self) -> Vec<MarkType> {
        Vec::new()
    }
    fn transaction_transforms(&self) -> Vec<Box<dyn TransactionTransform>> {
        Vec::new()
    }
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
}

pub struct PluginRegistry {
    plugin_ids: Vec<&'static str>,
    node_types: Vec<NodeType>,
    node_index: HashMap<String, usize>,
    content_rules: HashMap<String, ContentRule>,
    root_rule: ContentRule,
    mark_types: Vec<MarkType>,
    mark_index: HashMap<String, usize>,
    transaction_transforms: Vec<Box<dyn TransactionTransform>>,
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugin_ids)
            .field("node_types", &self.node_index.keys().collect::<Vec<_>>())
            .field("marks", &self.mark_index.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl PluginRegistry {
    pub fn new(plugins: impl IntoIterator<Item = Box<dyn EditorPlugin>>) -> Result<Self, RegistryError> {
        let root_rule =
            ContentRule::parse(ROOT_CONTENT).map_err(|err| RegistryError::InvalidContent {
                kind: "document".to_string(),
                reason: err.to_string(),
            })?;
        let mut registry = Self {
            plugin_ids: Vec::new(),
            node_types: Vec::new(),
            node_index: HashMap::new(),
            content_rules: HashMap::new(),
            root_rule,
            mark_types: Vec::new(),
            mark_index: HashMap::new(),
            transaction_transforms: Vec::new(),
            normalize_passes: Vec::new(),
            commands: HashMap::new(),
            queries: HashMap::new(),
        };
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    /// Paragraphs, dividers, text editing commands and normalization.
    pub fn core() -> Self {
        Self::new(builtin::core_plugins()).expect("core registry must be valid")
    }

    /// Every built-in node type, mark and command.
    pub fn richtext() -> Self {
        Self::new(builtin::richtext_plugins()).expect("richtext registry must be valid")
    }

    /// Registers everything `plugin` contributes. Nothing is registered when
    /// any contribution collides with an existing one.
    pub fn register_plugin(&mut self, plugin: Box<dyn EditorPlugin>) -> Result<(), RegistryError> {
        let node_types = plugin.node_types();
        let mark_types = plugin.mark_types();
        let commands = plugin.commands();
        let queries = plugin.queries();

        let mut compiled = Vec::with_capacity(node_types.len());
        let mut seen_markup: Vec<String> = Vec::new();
        for node_type in &node_types {
            if self.node_index.contains_key(&node_type.name)
                || compiled.iter().any(|(name, _)| name == &node_type.name)
            {
                return Err(RegistryError::DuplicateNodeType(node_type.name.clone()));
            }
            for key in markup_keys(node_type) {
                if seen_markup.contains(&key) || self.markup_taken(&key) {
                    return Err(RegistryError::DuplicateMarkup(key));
                }
                seen_markup.push(key);
            }
            let rule = ContentRule::parse(&node_type.content).map_err(|err| {
                RegistryError::InvalidContent {
                    kind: node_type.name.clone(),
                    reason: match err {
                        ContentError::InvalidRule { reason, .. } => reason,
                        other => other.to_string(),
                    },
                }
            })?;
            compiled.push((node_type.name.clone(), rule));
        }

        for (ix, mark) in mark_types.iter().enumerate() {
            if self.mark_index.contains_key(&mark.name)
                || mark_types[..ix].iter().any(|m| m.name == mark.name)
            {
                return Err(RegistryError::DuplicateMarkType(mark.name.clone()));
            }
        }
        for (ix, cmd) in commands.iter().enumerate() {
            if self.commands.contains_key(&cmd.id) || commands[..ix].iter().any(|c| c.id == cmd.id) {
                return Err(RegistryError::DuplicateCommand(cmd.id.clone()));
            }
        }
        for (ix, query) in queries.iter().enumerate() {
            if self.queries.contains_key(&query.id)
                || queries[..ix].iter().any(|q| q.id == query.id)
            {
                return Err(RegistryError::DuplicateQuery(query.id.clone()));
            }
        }

        for (node_type, (name, rule)) in node_types.into_iter().zip(compiled) {
            self.node_index.insert(name.clone(), self.node_types.len());
            self.content_rules.insert(name, rule);
            self.node_types.push(node_type);
        }
        for mark in mark_types {
            self.mark_index.insert(mark.name.clone(), self.mark_types.len());
            self.mark_types.push(mark);
        }
        self.transaction_transforms
            .extend(plugin.transaction_transforms());
        self.normalize_passes.extend(plugin.normalize_passes());
        for cmd in commands {
            self.commands.insert(cmd.id.clone(), cmd);
        }
        for query in queries {
            self.queries.insert(query.id.clone(), query);
        }

        tracing::debug!(plugin = plugin.id(), "registered plugin");
        self.plugin_ids.push(plugin.id());
        Ok(())
    }

    fn markup_taken(&self, key: &str) -> bool {
        self.node_types
            .iter()
            .any(|node_type| markup_keys(node_type).iter().any(|k| k == key))
    }

    pub fn plugin_ids(&self) -> &[&'static str] {
        &self.plugin_ids
    }

    pub fn node_types(&self) -> &[NodeType] {
        &self.node_types
    }

    pub fn get(&self, name: &str) -> Option<&NodeType> {
        self.node_index.get(name).map(|&ix| &self.node_types[ix])
    }

    pub fn resolve(&self, name: &str) -> Result<&NodeType, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::UnknownNodeType(name.to_string()))
    }

    pub fn content_rule(&self, kind: &str) -> Option<&ContentRule> {
        self.content_rules.get(kind)
    }

    pub fn root_rule(&self) -> &ContentRule {
        &self.root_rule
    }

    /// The node type for a markup element. A `data-type` discriminator only
    /// matches custom types; plain tags only match types without one.
    pub fn resolve_markup(&self, tag: &str, data_type: Option<&str>) -> Option<&NodeType> {
        match data_type {
            Some(data_type) => self
                .node_types
                .iter()
                .find(|t| t.markup.data_type.as_deref() == Some(data_type)),
            None => self
                .node_types
                .iter()
                .find(|t| t.markup.data_type.is_none() && t.markup.matches_tag(tag)),
        }
    }

    pub fn mark(&self, name: &str) -> Option<&MarkType> {
        self.mark_index.get(name).map(|&ix| &self.mark_types[ix])
    }

    /// Mark types in registration order, which is also their nesting order
    /// in markup (outermost first).
    pub fn marks(&self) -> &[MarkType] {
        &self.mark_types
    }

    pub fn mark_rank(&self, name: &str) -> usize {
        self.mark_index.get(name).copied().unwrap_or(usize::MAX)
    }

    pub fn resolve_mark_markup(&self, tag: &str, data_mark: Option<&str>) -> Option<&MarkType> {
        match data_mark {
            Some(name) => self.mark(name).filter(|m| m.data_mark),
            None => self
                .mark_types
                .iter()
                .find(|m| !m.data_mark && m.matches_tag(tag)),
        }
    }

    pub fn transaction_transforms(&self) -> &[Box<dyn TransactionTransform>] {
        &self.transaction_transforms
    }

    pub fn normalize_passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.normalize_passes
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn queries(&self) -> &HashMap<String, QuerySpec> {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }

    pub fn normalize_selection(&self, doc: &Document, selection: &Selection) -> Selection {
        selection::normalize_selection(doc, selection)
    }

    /// Checks content rules, attribute shapes and marks for the whole tree.
    pub fn validate_document(&self, doc: &Document) -> Result<(), ContentError> {
        self.root_rule.check("document", &doc.children, self)?;
        doc.children
            .iter()
            .try_for_each(|node| self.validate_node(node))
    }

    pub fn validate_node(&self, node: &Node) -> Result<(), ContentError> {
        match node {
            Node::Opaque(_) => Ok(()),
            Node::Text(t) => t.marks.iter().try_for_each(|(name, attrs)| {
                let mark = self
                    .mark(name)
                    .ok_or_else(|| ContentError::UnknownMark(name.clone()))?;
                validate_attrs(&mark.name, &mark.attrs, attrs)
            }),
            Node::Void(v) => {
                let node_type = self
                    .get(&v.kind)
                    .ok_or_else(|| ContentError::UnknownType(v.kind.clone()))?;
                if !node_type.atomic {
                    return Err(ContentError::NotAtomic(v.kind.clone()));
                }
                validate_attrs(&v.kind, &node_type.attrs, &v.attrs)
            }
            Node::Element(el) => {
                let node_type = self
                    .get(&el.kind)
                    .ok_or_else(|| ContentError::UnknownType(el.kind.clone()))?;
                if node_type.atomic {
                    return Err(ContentError::AtomicWithChildren(el.kind.clone()));
                }
                validate_attrs(&el.kind, &node_type.attrs, &el.attrs)?;
                if let Some(rule) = self.content_rule(&el.kind) {
                    rule.check(&el.kind, &el.children, self)?;
                }
                el.children
                    .iter()
                    .try_for_each(|child| self.validate_node(child))
            }
        }
    }
}

fn validate_attrs(kind: &str, specs: &[AttrSpec], attrs: &Attrs) -> Result<(), ContentError> {
    for (name, value) in attrs {
        let spec = specs
            .iter()
            .find(|spec| &spec.name == name)
            .ok_or_else(|| ContentError::UnknownAttr {
                kind: kind.to_string(),
                attr: name.clone(),
            })?;
        if spec.coerce(value).as_ref() != Some(value) {
            return Err(ContentError::InvalidAttr {
                kind: kind.to_string(),
                attr: name.clone(),
            });
        }
    }
    Ok(())
}

fn markup_keys(node_type: &NodeType) -> Vec<String> {
    match &node_type.markup.data_type {
        Some(data_type) => vec![format!("data-type={data_type}")],
        None => std::iter::once(&node_type.markup.tag)
            .chain(node_type.markup.tag_aliases.iter())
            .map(|tag| format!("<{tag}>"))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget(&'static str);

    impl EditorPlugin for Widget {
        fn id(&self) -> &'static str {
            "test.widget"
        }

        fn node_types(&self) -> Vec<NodeType> {
            vec![NodeType::atomic(self.0)]
        }
    }

    #[test]
    fn duplicate_node_types_are_rejected() {
        let mut registry = PluginRegistry::core();
        registry.register_plugin(Box::new(Widget("widget"))).unwrap();
        assert_eq!(
            registry.register_plugin(Box::new(Widget("widget"))).unwrap_err(),
            RegistryError::DuplicateNodeType("widget".to_string())
        );
        assert_eq!(
            registry.register_plugin(Box::new(Widget("paragraph"))).unwrap_err(),
            RegistryError::DuplicateNodeType("paragraph".to_string())
        );
    }

    #[test]
    fn resolve_reports_unknown_types() {
        let registry = PluginRegistry::richtext();
        assert_eq!(registry.resolve("heading").unwrap().name, "heading");
        assert_eq!(
            registry.resolve("carousel").unwrap_err(),
            RegistryError::UnknownNodeType("carousel".to_string())
        );
    }

    #[test]
    fn markup_resolution_separates_custom_types() {
        let mut registry = PluginRegistry::richtext();
        registry.register_plugin(Box::new(Widget("widget"))).unwrap();
        assert_eq!(registry.resolve_markup("h3", None).unwrap().name, "heading");
        assert_eq!(
            registry.resolve_markup("div", Some("widget")).unwrap().name,
            "widget"
        );
        assert!(registry.resolve_markup("div", None).is_none());
        assert!(registry.resolve_markup("div", Some("carousel")).is_none());
    }
}
