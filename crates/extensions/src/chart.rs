//! Charts are atomic blocks whose data lives in a single structured
//! attribute. Edits go through `chart.set_data`, which validates the whole
//! data set before committing it.

use blockdoc_core::builtin::insert_block;
use blockdoc_core::{
    AttrSpec, CommandError, CommandSpec, EditorPlugin, Node, NodeType, QuerySpec, command_args,
    read_attrs, write_attrs,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::common::{attrs_of, focused, require_focused, set_attrs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    #[default]
    Bar,
    Line,
    Pie,
}

impl ChartType {
    fn as_str(self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    #[serde(default)]
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartDataError {
    #[error("series `{name}` has {found} values for {expected} labels")]
    LengthMismatch {
        name: String,
        found: usize,
        expected: usize,
    },
    #[error("a pie chart shows exactly one series, got {0}")]
    PieSeries(usize),
    #[error("pie values must not be negative")]
    NegativePieValue,
}

impl ChartData {
    pub fn validate(&self, chart_type: ChartType) -> Result<(), ChartDataError> {
        for series in &self.series {
            if series.values.len() != self.labels.len() {
                return Err(ChartDataError::LengthMismatch {
                    name: series.name.clone(),
                    found: series.values.len(),
                    expected: self.labels.len(),
                });
            }
        }
        if chart_type == ChartType::Pie {
            if self.series.len() != 1 {
                return Err(ChartDataError::PieSeries(self.series.len()));
            }
            if self.series.iter().flat_map(|s| &s.values).any(|v| *v < 0.0) {
                return Err(ChartDataError::NegativePieValue);
            }
        }
        Ok(())
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| empty_data())
    }
}

fn empty_data() -> Value {
    json!({ "labels": [], "series": [] })
}

/// Typed view of a chart node's attributes. Also the arguments of
/// `chart.insert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartAttrs {
    #[serde(default)]
    pub chart_type: ChartType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub data: ChartData,
}

/// Reads a chart node. `None` for other nodes and for data that does not
/// fit the typed shape.
pub fn chart_attrs(node: &Node) -> Option<ChartAttrs> {
    match node {
        Node::Void(v) if v.kind == "chart" => read_attrs(&v.attrs).ok(),
        _ => None,
    }
}

pub(crate) struct ChartPlugin;

#[derive(Deserialize)]
struct DataArgs {
    data: ChartData,
}

#[derive(Deserialize)]
struct TypeArgs {
    chart_type: ChartType,
}

impl EditorPlugin for ChartPlugin {
    fn id(&self) -> &'static str {
        "ext.chart"
    }

    fn node_types(&self) -> Vec<NodeType> {
        vec![
            NodeType::atomic("chart")
                .attr(AttrSpec::enumeration("chart_type", &["bar", "line", "pie"], "bar"))
                .attr(AttrSpec::string("title", ""))
                .attr(AttrSpec::json("data", empty_data())),
        ]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("chart.insert", "Insert chart", |editor, args| {
                let args: ChartAttrs = command_args("chart.insert", args)?;
                args.data
                    .validate(args.chart_type)
                    .map_err(|err| CommandError::invalid_args("chart.insert", err.to_string()))?;
                let attrs = write_attrs(&args)
                    .map_err(|err| CommandError::invalid_args("chart.insert", err.to_string()))?;
                let node = Node::void("chart", attrs);
                insert_block(editor, node, "command:chart.insert")
            })
            .description("Insert a bar, line or pie chart.")
            .keywords(["chart", "graph", "plot", "bar", "pie"])
            .args_example(json!({
                "chart_type": "bar",
                "title": "Sales",
                "data": { "labels": ["Q1", "Q2"], "series": [{ "name": "2024", "values": [3, 5] }] }
            })),
            CommandSpec::new("chart.set_data", "Update chart data", |editor, args| {
                let args: DataArgs = command_args("chart.set_data", args)?;
                let path = require_focused(editor, "chart")?;
                let chart_type = editor
                    .doc()
                    .node(&path)
                    .and_then(chart_attrs)
                    .map(|attrs| attrs.chart_type)
                    .unwrap_or_default();
                args.data
                    .validate(chart_type)
                    .map_err(|err| CommandError::invalid_args("chart.set_data", err.to_string()))?;
                set_attrs(
                    editor,
                    path,
                    attrs_of([("data", args.data.to_value())]),
                    "command:chart.set_data",
                )
            })
            .hidden(true),
            CommandSpec::new("chart.set_type", "Change chart type", |editor, args| {
                let args: TypeArgs = command_args("chart.set_type", args)?;
                let path = require_focused(editor, "chart")?;
                let data = editor
                    .doc()
                    .node(&path)
                    .and_then(chart_attrs)
                    .map(|attrs| attrs.data)
                    .unwrap_or_default();
                data.validate(args.chart_type)
                    .map_err(|err| CommandError::not_applicable(err.to_string()))?;
                set_attrs(
                    editor,
                    path,
                    attrs_of([("chart_type", json!(args.chart_type.as_str()))]),
                    "command:chart.set_type",
                )
            })
            .args_example(json!({ "chart_type": "line" })),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("chart.data", |editor, _args| {
            let data = focused(editor, "chart")
                .and_then(|path| editor.doc().node(&path))
                .and_then(chart_attrs)
                .map(|attrs| attrs.data.to_value());
            Ok(data.unwrap_or(Value::Null))
        })]
    }
}
