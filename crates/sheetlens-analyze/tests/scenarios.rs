use sheetlens_analyze::{AnalyzeOptions, MemoryWorkbook, analyze};

fn run(wb: &mut MemoryWorkbook) -> sheetlens_analyze::AnalysisResult {
    analyze(wb, &AnalyzeOptions::default()).unwrap()
}

fn node<'a>(
    result: &'a sheetlens_analyze::AnalysisResult,
    id: &str,
) -> &'a sheetlens_analyze::result::NodeDoc {
    result
        .graph
        .nodes
        .iter()
        .find(|n| n.id == id)
        .unwrap_or_else(|| panic!("node {id} missing"))
}

fn anomaly_types(result: &sheetlens_analyze::AnalysisResult) -> Vec<String> {
    result
        .anomalies
        .anomalies
        .iter()
        .map(|a| serde_json::to_value(a.kind).unwrap().as_str().unwrap().to_string())
        .collect()
}

#[test]
fn simple_sum_graph() {
    // S!A1=1, S!A2=2, S!A3==A1+A2.
    let mut wb = MemoryWorkbook::new();
    wb.set_value("S", 1, 1, 1i64)
        .set_value("S", 2, 1, 2i64)
        .set_formula("S", 3, 1, "=A1+A2");
    let result = run(&mut wb);

    assert_eq!(result.graph.metrics.node_count, 3);
    assert_eq!(result.graph.metrics.edge_count, 2);
    assert_eq!(result.anomalies.total_count, 0);
    assert!(node(&result, "S!A3").is_output);
    assert!(node(&result, "S!A1").is_input);
    assert!(node(&result, "S!A2").is_input);
    assert_eq!(result.metrics.formula_count, 1);
    assert_eq!(result.metrics.input_count, 2);
    assert_eq!(result.graph.metrics.max_depth, 1);
}

#[test]
fn two_cell_cycle() {
    let mut wb = MemoryWorkbook::new();
    wb.set_formula("S", 1, 1, "=B1").set_formula("S", 1, 2, "=A1");
    let result = run(&mut wb);

    assert_eq!(result.anomalies.total_count, 1);
    let anomaly = &result.anomalies.anomalies[0];
    assert_eq!(anomaly.cell_address, "S!A1");
    assert_eq!(
        anomaly.metadata["cycle"],
        serde_json::json!(["S!A1", "S!B1"])
    );
    assert_eq!(result.graph.metrics.max_depth, 1);
}

#[test]
fn self_loop_is_circular() {
    let mut wb = MemoryWorkbook::new();
    wb.set_formula("S", 1, 1, "=A1+1");
    let result = run(&mut wb);
    assert_eq!(anomaly_types(&result), ["circular_reference"]);
    assert_eq!(
        result.anomalies.anomalies[0].metadata["cycle"],
        serde_json::json!(["S!A1"])
    );
}

#[test]
fn cross_sheet_range_membership() {
    let mut wb = MemoryWorkbook::new();
    wb.set_formula("Summary", 1, 1, "=SUM(Data!B2:B4)");
    for row in 2..=4 {
        wb.set_value("Data", row, 2, row as i64);
    }
    let result = run(&mut wb);

    let range_edges: Vec<_> = result
        .graph
        .edges
        .iter()
        .filter(|e| e.source == "Summary!A1")
        .collect();
    assert_eq!(range_edges.len(), 3);
    let targets: Vec<_> = range_edges.iter().map(|e| e.target.as_str()).collect();
    assert_eq!(targets, ["Data!B2", "Data!B3", "Data!B4"]);
    for edge in &range_edges {
        assert_eq!(serde_json::to_value(edge.kind).unwrap(), "range_member");
    }
    assert_eq!(result.anomalies.total_count, 0);
}

#[test]
fn missing_sheet_reference() {
    let mut wb = MemoryWorkbook::new();
    wb.set_formula("S", 1, 1, "=Missing!X9");
    let result = run(&mut wb);

    assert_eq!(result.graph.metrics.node_count, 2);
    let ghost = node(&result, "Missing!X9");
    assert!(!ghost.has_formula && !ghost.is_input && !ghost.is_output && !ghost.has_error);
    assert_eq!(anomaly_types(&result), ["missing_dependency"]);
    assert_eq!(result.anomalies.anomalies[0].cell_address, "S!A1");
    assert!(!node(&result, "S!A1").has_error);
}

#[test]
fn indirect_concat_unresolved_by_default() {
    let mut wb = MemoryWorkbook::new();
    wb.set_formula("S", 1, 1, "=INDIRECT(\"S!B\"&\"2\")")
        .set_value("S", 2, 2, 5i64);
    let result = run(&mut wb);

    assert!(result.graph.edges.is_empty());
    assert!(anomaly_types(&result).contains(&"dynamic_unresolved".to_string()));
}

#[test]
fn indirect_concat_resolves_with_folding() {
    let mut wb = MemoryWorkbook::new();
    wb.set_formula("S", 1, 1, "=INDIRECT(\"S!B\"&\"2\")")
        .set_value("S", 2, 2, 5i64);
    let options = AnalyzeOptions { fold_string_concat: true, ..Default::default() };
    let result = analyze(&mut wb, &options).unwrap();

    assert_eq!(result.graph.edges.len(), 1);
    let edge = &result.graph.edges[0];
    assert_eq!((edge.source.as_str(), edge.target.as_str()), ("S!A1", "S!B2"));
    assert_eq!(serde_json::to_value(edge.kind).unwrap(), "dynamic");
    assert!(!anomaly_types(&result).contains(&"dynamic_unresolved".to_string()));
}

#[test]
fn orphan_formula_is_unused() {
    let mut wb = MemoryWorkbook::new();
    wb.set_formula("S", 99, 26, "=1+1");
    let result = run(&mut wb);

    assert_eq!(anomaly_types(&result), ["unused_formula"]);
    let anomaly = &result.anomalies.anomalies[0];
    assert_eq!(anomaly.cell_address, "S!Z99");
    assert_eq!(serde_json::to_value(anomaly.severity).unwrap(), "low");
}

#[test]
fn empty_workbook() {
    let mut wb = MemoryWorkbook::new();
    let result = run(&mut wb);
    assert_eq!(result.graph.metrics.node_count, 0);
    assert_eq!(result.graph.metrics.edge_count, 0);
    assert_eq!(result.graph.metrics.max_depth, 0);
    assert_eq!(result.anomalies.total_count, 0);
    assert_eq!(result.cost_drivers.total_drivers, 0);
    assert_eq!(result.metrics.avg_complexity, 0.0);
}

#[test]
fn single_cell_range_coalesces_with_direct() {
    // A direct A1 and the single-member range A1:A1 produce one edge, the
    // stronger (direct) kind winning.
    let mut wb = MemoryWorkbook::new();
    wb.set_value("S", 1, 1, 1i64)
        .set_formula("S", 1, 2, "=SUM(A1:A1)+A1");
    let result = run(&mut wb);

    assert_eq!(result.graph.metrics.edge_count, 1);
    assert_eq!(serde_json::to_value(result.graph.edges[0].kind).unwrap(), "direct");
}

#[test]
fn named_range_edges() {
    let mut wb = MemoryWorkbook::new();
    wb.set_value("Rates", 2, 2, 0.19f64)
        .set_formula("S", 1, 1, "=Amount*TaxRate")
        .set_value("S", 2, 1, 100i64)
        .define_name("TaxRate", "Rates!B2")
        .define_name("Amount", "S!A2");
    let result = run(&mut wb);

    let kinds: Vec<_> = result
        .graph
        .edges
        .iter()
        .map(|e| (e.target.clone(), serde_json::to_value(e.kind).unwrap()))
        .collect();
    assert!(kinds.contains(&("Rates!B2".to_string(), "named".into())));
    assert!(kinds.contains(&("S!A2".to_string(), "named".into())));
    assert_eq!(result.anomalies.total_count, 0);
}

#[test]
fn unknown_name_is_missing_dependency() {
    let mut wb = MemoryWorkbook::new();
    wb.set_formula("S", 1, 1, "=Ghost*2");
    let result = run(&mut wb);
    // No edge can be built, so the formula is also unused.
    let types = anomaly_types(&result);
    assert!(types.contains(&"missing_dependency".to_string()));
    assert_eq!(result.anomalies.anomalies[0].metadata["name"], "Ghost");
}

#[test]
fn named_definition_cycle_reported() {
    let mut wb = MemoryWorkbook::new();
    wb.set_formula("S", 1, 1, "=Alpha")
        .define_name("Alpha", "=Beta+1")
        .define_name("Beta", "=Alpha+1");
    let result = run(&mut wb);
    let types = anomaly_types(&result);
    assert!(types.contains(&"circular_reference".to_string()));
}

#[test]
fn high_complexity_flagged() {
    let mut wb = MemoryWorkbook::new();
    wb.set_value("S", 1, 1, 1i64)
        .set_formula("S", 1, 2, "=(A1+1)*(A1+2)/(A1+3)");
    let result = run(&mut wb);
    let types = anomaly_types(&result);
    assert!(types.contains(&"high_complexity".to_string()));
}

#[test]
fn hard_coded_overwrite_detected() {
    let mut wb = MemoryWorkbook::new();
    // A formula column and row with one literal stuck in the middle.
    for row in 1..=9 {
        if row == 5 {
            continue;
        }
        wb.set_formula("S", row, 5, "=B1");
    }
    for col in 1..=9 {
        if col == 5 {
            continue;
        }
        wb.set_formula("S", 5, col, "=B1");
    }
    wb.set_value("S", 5, 5, 42i64);
    wb.set_value("S", 1, 2, 7i64); // B1, the shared dependency
    let result = run(&mut wb);
    let types = anomaly_types(&result);
    assert!(types.contains(&"hard_coded_overwrite".to_string()));
    let hc = result
        .anomalies
        .anomalies
        .iter()
        .find(|a| serde_json::to_value(a.kind).unwrap() == "hard_coded_overwrite")
        .unwrap();
    assert_eq!(hc.cell_address, "S!E5");
}

#[test]
fn broken_reference_from_unparseable_formula() {
    let mut wb = MemoryWorkbook::new();
    wb.set_formula("S", 1, 1, "=A1+@@@");
    let result = run(&mut wb);
    let types = anomaly_types(&result);
    assert!(types.contains(&"broken_reference".to_string()));
    // The A1 reference extracted before the error is kept: a self-loop.
    assert!(types.contains(&"circular_reference".to_string()));
}

#[test]
fn error_literal_in_formula_is_broken_reference() {
    let mut wb = MemoryWorkbook::new();
    wb.set_value("S", 1, 1, 1i64)
        .set_formula("S", 1, 2, "=A1+#REF!");
    let result = run(&mut wb);
    assert!(anomaly_types(&result).contains(&"broken_reference".to_string()));
}

#[test]
fn options_disable_passes() {
    let mut wb = MemoryWorkbook::new();
    wb.set_formula("S", 1, 1, "=B1").set_formula("S", 1, 2, "=A1");
    let options = AnalyzeOptions {
        detect_anomalies: false,
        identify_cost_drivers: false,
        ..Default::default()
    };
    let result = analyze(&mut wb, &options).unwrap();
    assert_eq!(result.anomalies.total_count, 0);
    assert_eq!(result.cost_drivers.total_drivers, 0);
    // The graph itself is still built.
    assert_eq!(result.graph.metrics.edge_count, 2);
}

#[test]
fn include_values_false_strips_values() {
    let mut wb = MemoryWorkbook::new();
    wb.set_value("S", 1, 1, 42i64).set_formula("S", 1, 2, "=A1");
    let options = AnalyzeOptions { include_values: false, ..Default::default() };
    let result = analyze(&mut wb, &options).unwrap();
    let json = result.to_json().unwrap();
    assert!(!json.contains("\"value\""));
    // Flags derived from values survive the stripping.
    assert!(node(&result, "S!A1").is_input);
}

#[test]
fn top_driver_invariants_hold() {
    let mut wb = MemoryWorkbook::new();
    wb.set_value("S", 1, 1, 1i64);
    for row in 2..=20 {
        wb.set_formula("S", row, 1, "=A1");
    }
    wb.set_formula("S", 21, 1, "=SUM(A2:A20)");
    let result = run(&mut wb);

    let drivers = &result.cost_drivers.top_drivers;
    assert!(!drivers.is_empty());
    assert_eq!(drivers[0].cell_address, "S!A1");
    let n = result.graph.metrics.node_count as u64;
    for pair in drivers.windows(2) {
        assert!(
            pair[0].impact_score > pair[1].impact_score
                || (pair[0].impact_score == pair[1].impact_score
                    && pair[0].dependent_count >= pair[1].dependent_count),
            "drivers out of order: {pair:?}"
        );
    }
    for d in drivers {
        assert!((0.0..=1.0).contains(&d.impact_score));
        assert!((0.0..=1.0).contains(&d.centrality_score));
        assert!(d.dependent_count <= n - 1);
    }
}
