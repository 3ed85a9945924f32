use blockdoc_core::markup::{DecodeWarning, decode_with_report};
use blockdoc_core::{CommandError, Editor, Point, Selection};
use blockdoc_extensions::{ChartData, ChartType, Series, chart_attrs};
use serde_json::json;

fn sales() -> serde_json::Value {
    json!({
        "labels": ["Q1", "Q2"],
        "series": [{ "name": "2024", "values": [3, 5] }]
    })
}

/// An editor holding a bar chart with the caret on it.
fn with_chart() -> Editor {
    let mut editor = Editor::empty(blockdoc_extensions::registry());
    editor
        .run_command(
            "chart.insert",
            Some(json!({ "chart_type": "bar", "title": "Sales", "data": sales() })),
        )
        .unwrap();
    editor.set_selection(Selection::collapsed(Point::new(vec![0], 0)));
    editor
}

fn data(editor: &Editor) -> Option<ChartData> {
    editor.run_query::<Option<ChartData>>("chart.data", None).unwrap()
}

#[test]
fn inserted_chart_reads_back_typed() {
    let editor = with_chart();
    let attrs = chart_attrs(&editor.doc().children[0]).unwrap();
    assert_eq!(attrs.chart_type, ChartType::Bar);
    assert_eq!(attrs.title, "Sales");
    assert_eq!(
        attrs.data,
        ChartData {
            labels: vec!["Q1".to_string(), "Q2".to_string()],
            series: vec![Series {
                name: "2024".to_string(),
                values: vec![3.0, 5.0],
            }],
        }
    );
    assert_eq!(data(&editor), Some(attrs.data));
}

#[test]
fn set_data_validates_before_committing() {
    let mut editor = with_chart();
    let err = editor
        .run_command(
            "chart.set_data",
            Some(json!({ "data": { "labels": ["a", "b", "c"], "series": [{ "name": "s", "values": [1] }] } })),
        )
        .unwrap_err();
    assert!(matches!(err, CommandError::InvalidArgs { .. }));
    assert_eq!(data(&editor).unwrap().labels.len(), 2);

    editor
        .run_command(
            "chart.set_data",
            Some(json!({ "data": { "labels": ["a"], "series": [{ "name": "s", "values": [9] }] } })),
        )
        .unwrap();
    assert_eq!(data(&editor).unwrap().series[0].values, vec![9.0]);

    assert!(editor.undo());
    assert_eq!(data(&editor).unwrap().labels.len(), 2);
}

#[test]
fn pie_charts_take_exactly_one_series() {
    let mut editor = Editor::empty(blockdoc_extensions::registry());
    let two_series = json!({
        "labels": ["a"],
        "series": [{ "name": "x", "values": [1] }, { "name": "y", "values": [2] }]
    });
    let err = editor
        .run_command("chart.insert", Some(json!({ "chart_type": "pie", "data": two_series })))
        .unwrap_err();
    assert!(matches!(err, CommandError::InvalidArgs { .. }));

    let mut editor = with_chart();
    editor
        .run_command("chart.set_type", Some(json!({ "chart_type": "pie" })))
        .unwrap();
    assert_eq!(
        chart_attrs(&editor.doc().children[0]).unwrap().chart_type,
        ChartType::Pie
    );

    let err = editor
        .run_command("chart.set_data", Some(json!({ "data": two_series })))
        .unwrap_err();
    assert!(matches!(err, CommandError::InvalidArgs { .. }));
}

#[test]
fn chart_commands_need_a_chart_under_the_caret() {
    let mut editor = with_chart();
    editor.set_selection(Selection::collapsed(Point::new(vec![1, 0], 0)));
    let err = editor
        .run_command("chart.set_data", Some(json!({ "data": sales() })))
        .unwrap_err();
    assert!(matches!(err, CommandError::NotApplicable(_)));
    assert_eq!(data(&editor), None);
}

#[test]
fn malformed_chart_data_decodes_to_empty_chart() {
    let registry = blockdoc_extensions::registry();
    let decoded = decode_with_report(
        "<div data-type=\"chart\" data-chart-type=\"bar\" data-data=\"{oops\"></div>",
        &registry,
    )
    .unwrap();
    assert_eq!(
        decoded.warnings,
        vec![DecodeWarning::MalformedAttr {
            kind: "chart".to_string(),
            attr: "data".to_string(),
            raw: "{oops".to_string(),
        }]
    );
    let attrs = chart_attrs(&decoded.document.children[0]).unwrap();
    assert_eq!(attrs.data, ChartData::default());
}
