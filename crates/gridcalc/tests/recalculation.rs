//! Tests for incremental recalculation and structural edits

use gridcalc::prelude::*;
use gridcalc::serialize_formula;
use pretty_assertions::assert_eq;

fn at(sheet: usize, a1: &str) -> CellCoordinate {
    CellCoordinate::parse(a1, sheet).unwrap()
}

fn c(a1: &str) -> CellCoordinate {
    at(0, a1)
}

fn n(v: f64) -> FormulaValue {
    FormulaValue::Number(v)
}

fn err(e: CellError) -> FormulaValue {
    FormulaValue::Error(e)
}

/// Changing an input dirties its dependents and recomputes them exactly once
#[test]
fn test_incremental_update() {
    let mut engine = Engine::new();
    engine.set_value(c("A1"), 5.0).unwrap();
    engine.set_formula(c("B1"), "=A1+1").unwrap();

    assert_eq!(engine.get_value(c("B1")), n(6.0));
    assert_eq!(engine.cell_state(c("B1")), Some(CellState::Clean));
    let count = engine.evaluation_count(c("B1"));

    // Clean reads come from the cache
    assert_eq!(engine.get_value(c("B1")), n(6.0));
    assert_eq!(engine.evaluation_count(c("B1")), count);

    engine.set_value(c("A1"), 10.0).unwrap();
    assert_eq!(engine.cell_state(c("B1")), Some(CellState::Dirty));
    assert_eq!(engine.get_value(c("B1")), n(11.0));
    assert_eq!(engine.evaluation_count(c("B1")), count + 1);
}

/// Blank cells read as Blank, or 0 in arithmetic
#[test]
fn test_blank_reads() {
    let mut engine = Engine::new();
    engine.set_formula(c("B1"), "=A1").unwrap();
    engine.set_formula(c("B2"), "=A1+0").unwrap();
    assert_eq!(engine.get_value(c("B1")), FormulaValue::Blank);
    assert_eq!(engine.get_value(c("B2")), n(0.0));
    assert_eq!(engine.get_value(c("Z99")), FormulaValue::Blank);
}

/// Two cells referring to each other both show #CYCLE!
#[test]
fn test_mutual_cycle() {
    let mut engine = Engine::new();
    engine.set_formula(c("A1"), "=B1").unwrap();
    engine.set_formula(c("B1"), "=A1").unwrap();

    assert_eq!(engine.get_value(c("A1")), err(CellError::Cycle));
    assert_eq!(engine.get_value(c("B1")), err(CellError::Cycle));

    let stats = engine.calculate();
    assert_eq!(stats.circular_references, 2);
    assert_eq!(stats.errors, 2);

    // Replacing one side with a fresh formula breaks the cycle
    engine.set_formula(c("B1"), "=7").unwrap();
    assert_eq!(engine.get_value(c("A1")), n(7.0));
}

/// Errors stored in cells propagate through functions
#[test]
fn test_error_values_propagate() {
    let mut engine = Engine::new();
    engine.set_value(c("A1"), CellError::Ref).unwrap();
    engine.set_value(c("B1"), 5.0).unwrap();
    engine.set_formula(c("C1"), "=SUM(A1,B1)").unwrap();
    engine.set_formula(c("D1"), "=1/0").unwrap();
    assert_eq!(engine.get_value(c("C1")), err(CellError::Ref));
    assert_eq!(engine.get_value(c("D1")), err(CellError::Div0));
}

/// Replacing a formula with a constant removes it from the graph
#[test]
fn test_set_value_replaces_formula() {
    let mut engine = Engine::new();
    engine.set_formula(c("A1"), "=2*3").unwrap();
    engine.set_formula(c("B1"), "=A1+1").unwrap();
    assert_eq!(engine.get_value(c("B1")), n(7.0));

    engine.set_value(c("A1"), 1.0).unwrap();
    assert_eq!(engine.formula_text(c("A1")), None);
    assert_eq!(engine.get_value(c("B1")), n(2.0));

    engine.clear(c("A1")).unwrap();
    assert_eq!(engine.get_value(c("B1")), n(1.0));
}

/// invalidate forces a recomputation
#[test]
fn test_invalidate() {
    let mut engine = Engine::new();
    engine.set_formula(c("A1"), "=PI()").unwrap();
    engine.get_value(c("A1"));
    engine.invalidate(c("A1"));
    assert_eq!(engine.cell_state(c("A1")), Some(CellState::Dirty));
    engine.get_value(c("A1"));
    assert_eq!(engine.evaluation_count(c("A1")), 2);
}

/// Names: defining, using, redefining and removing
#[test]
fn test_name_lifecycle() {
    let mut engine = Engine::new();
    engine.set_value(c("A1"), 200.0).unwrap();
    engine.define_name(DefinedName::workbook_scope("Rate", "0.05")).unwrap();
    engine.set_formula(c("B1"), "=A1*Rate").unwrap();
    assert_eq!(engine.get_value(c("B1")), n(10.0));

    engine.define_name(DefinedName::workbook_scope("Rate", "0.1")).unwrap();
    assert_eq!(engine.cell_state(c("B1")), Some(CellState::Dirty));
    assert_eq!(engine.get_value(c("B1")), n(20.0));

    assert!(engine.remove_name("Rate", NameScope::Workbook).is_some());
    assert_eq!(engine.get_value(c("B1")), err(CellError::Name));
    assert!(matches!(
        engine.cell_error(c("B1")),
        Some(FormulaError::Reference(_))
    ));
}

/// A formula that failed on an unknown name binds once the name exists
#[test]
fn test_late_name_definition() {
    let mut engine = Engine::new();
    assert!(engine.set_formula(c("A1"), "=Bonus*2").is_err());
    assert_eq!(engine.get_value(c("A1")), err(CellError::Name));

    engine.set_value(c("Z1"), 21.0).unwrap();
    engine
        .define_name(DefinedName::workbook_scope("Bonus", "=Sheet1!$Z$1"))
        .unwrap();
    assert_eq!(engine.get_value(c("A1")), n(42.0));

    // The name's target is a precedent of the formula
    engine.set_value(c("Z1"), 1.0).unwrap();
    assert_eq!(engine.get_value(c("A1")), n(2.0));
}

/// Sheet-scoped names shadow workbook-scoped ones on their sheet
#[test]
fn test_sheet_scoped_names() {
    let mut engine = Engine::new();
    engine.add_sheet("Data").unwrap();
    engine.define_name(DefinedName::workbook_scope("Limit", "10")).unwrap();
    engine.set_formula(at(0, "A1"), "=Limit").unwrap();
    engine.set_formula(at(1, "A1"), "=Limit").unwrap();
    assert_eq!(engine.get_value(at(1, "A1")), n(10.0));

    engine.define_name(DefinedName::sheet_scope("Limit", "99", 1)).unwrap();
    assert_eq!(engine.get_value(at(0, "A1")), n(10.0));
    assert_eq!(engine.get_value(at(1, "A1")), n(99.0));
}

/// Names with parameters behave as functions
#[test]
fn test_user_functions() {
    let mut engine = Engine::new();
    engine
        .define_function("Hyp", ["a", "b"], "=SQRT(a^2+b^2)")
        .unwrap();
    engine.set_value(c("A1"), 6.0).unwrap();
    engine.set_formula(c("B1"), "=Hyp(A1, 8)").unwrap();
    assert_eq!(engine.get_value(c("B1")), n(10.0));

    engine.set_value(c("A1"), 5.0).unwrap();
    match engine.get_value(c("B1")) {
        FormulaValue::Number(v) => assert!((v - 89f64.sqrt()).abs() < 1e-12),
        other => panic!("expected a number, got {:?}", other),
    }

    let error = engine.set_formula(c("B2"), "=Hyp(1)").unwrap_err();
    assert!(matches!(
        error,
        Error::Formula(FormulaError::ArgumentCount { actual: 1, .. })
    ));
    assert_eq!(engine.get_value(c("B2")), err(CellError::Value));
}

/// Renaming a sheet keeps formulas pointing at it
#[test]
fn test_rename_sheet() {
    let mut engine = Engine::new();
    engine.add_sheet("Inputs").unwrap();
    engine.set_value(at(1, "B2"), 3.0).unwrap();
    engine.set_formula(c("A1"), "=Inputs!B2*2").unwrap();
    engine
        .define_name(DefinedName::workbook_scope("Seed", "=Inputs!$B$2"))
        .unwrap();
    engine.set_formula(c("A2"), "=Seed+1").unwrap();
    assert_eq!(engine.get_value(c("A1")), n(6.0));

    engine.rename_sheet(1, "Q1 Inputs").unwrap();
    assert_eq!(engine.formula_text(c("A1")), Some("='Q1 Inputs'!B2*2"));
    assert_eq!(engine.get_value(c("A1")), n(6.0));
    assert_eq!(engine.get_value(c("A2")), n(4.0));
    assert_eq!(
        engine.workbook().get_name("Seed", 0).unwrap().refers_to,
        "='Q1 Inputs'!$B$2"
    );
}

/// Adding a sheet repairs formulas that named it before it existed
#[test]
fn test_add_sheet_rebinds() {
    let mut engine = Engine::new();
    assert!(engine.set_formula(c("A1"), "=Later!A1+1").is_err());
    assert_eq!(engine.get_value(c("A1")), err(CellError::Ref));

    engine.add_sheet("Later").unwrap();
    assert_eq!(engine.get_value(c("A1")), n(1.0));
}

/// Removing a sheet drops its cells and shifts later sheets down
#[test]
fn test_remove_sheet() {
    let mut engine = Engine::new();
    engine.add_sheet("Middle").unwrap();
    engine.add_sheet("Last").unwrap();
    engine.set_value(at(1, "A1"), 5.0).unwrap();
    engine.set_value(at(2, "A1"), 7.0).unwrap();
    engine.set_formula(c("B1"), "=Middle!A1").unwrap();
    engine.set_formula(at(2, "B1"), "=A1*2").unwrap();
    assert_eq!(engine.get_value(c("B1")), n(5.0));

    engine.remove_sheet(1).unwrap();
    assert_eq!(engine.get_value(c("B1")), err(CellError::Ref));
    assert_eq!(engine.formula_text(at(1, "B1")), Some("=A1*2"));
    assert_eq!(engine.get_value(at(1, "B1")), n(14.0));
    assert_eq!(engine.formula_cells(), vec![c("B1"), at(1, "B1")]);
}

/// calculate() evaluates every dirty cell and reports what happened
#[test]
fn test_calculate_stats() {
    let mut engine = Engine::new();
    engine.set_value(c("A1"), 1.0).unwrap();
    engine.set_formula(c("A2"), "=A1*2").unwrap();
    engine.set_formula(c("A3"), "=A2/0").unwrap();
    let _ = engine.set_formula(c("A4"), "=NOPE()");

    let stats = engine.calculate();
    assert_eq!(
        stats,
        CalculationStats {
            formula_count: 4,
            cells_calculated: 2,
            circular_references: 0,
            errors: 2,
        }
    );

    // Nothing is dirty the second time
    assert_eq!(engine.calculate().cells_calculated, 0);
}

/// Parsing and binding can be done in two steps
#[test]
fn test_parse_then_bind() {
    let mut engine = Engine::new();
    let parsed = engine.parse_formula("=SUM(1,2)").unwrap();
    assert_eq!(serialize_formula(parsed.expr()), "=SUM(1,2)");
    engine.bind_formula(c("A1"), parsed).unwrap();
    assert_eq!(engine.get_value(c("A1")), n(3.0));

    let options = CalculationOptions {
        max_parse_depth: 2,
        ..CalculationOptions::default()
    };
    let shallow = Engine::new().with_options(options);
    assert!(shallow.parse_formula("=((((1))))").is_err());
}

/// Dependencies through ranges on other sheets
#[test]
fn test_cross_sheet_ranges() {
    let mut engine = Engine::new();
    engine.add_sheet("Jan").unwrap();
    engine.add_sheet("Feb").unwrap();
    engine.set_value(at(1, "A1"), 10.0).unwrap();
    engine.set_value(at(2, "A1"), 20.0).unwrap();
    engine.set_formula(at(2, "A2"), "=A1*3").unwrap();
    engine.set_formula(c("A1"), "=SUM(Jan:Feb!A1:A2)").unwrap();
    assert_eq!(engine.get_value(c("A1")), n(90.0));

    engine.set_value(at(1, "A2"), 5.0).unwrap();
    assert_eq!(engine.cell_state(c("A1")), Some(CellState::Dirty));
    assert_eq!(engine.get_value(c("A1")), n(95.0));
}

/// Formula text past the parse limits is stored as #NAME?, and name
/// expansion past the evaluation limit reads as #NUM!
#[test]
fn test_depth_limits() {
    let mut engine = Engine::new();
    let chain = format!("={}", vec!["1"; 4000].join("+"));
    let error = engine.set_formula(c("A1"), &chain).unwrap_err();
    assert!(matches!(error, Error::Formula(FormulaError::Parse(_))));
    assert_eq!(engine.get_value(c("A1")), err(CellError::Name));

    let options = CalculationOptions {
        max_eval_depth: 1,
        ..CalculationOptions::default()
    };
    let mut shallow = Engine::new().with_options(options);
    shallow.define_name(DefinedName::workbook_scope("Inner", "=2")).unwrap();
    shallow.define_name(DefinedName::workbook_scope("Outer", "=Inner+1")).unwrap();
    shallow.set_formula(c("A1"), "=Inner").unwrap();
    shallow.set_formula(c("A2"), "=Outer").unwrap();
    assert_eq!(shallow.get_value(c("A1")), n(2.0));
    assert_eq!(shallow.get_value(c("A2")), err(CellError::Num));
}

/// Ranges covering a whole sheet read only the cells that hold something
#[test]
fn test_whole_sheet_ranges() {
    let mut engine = Engine::new();
    engine.set_value(c("C5"), 2.0).unwrap();
    engine.set_value(c("XFD1048576"), 3.0).unwrap();
    engine.set_formula(c("A1"), "=SUM(C1:XFD1048576)").unwrap();
    engine.set_formula(c("A2"), "=COUNTBLANK(C1:C1048576)").unwrap();
    engine.set_formula(c("C7"), "=C5*10").unwrap();

    assert_eq!(engine.get_value(c("A1")), n(25.0));
    assert_eq!(engine.get_value(c("A2")), n(1048574.0));

    engine.set_value(c("XFD1048576"), 30.0).unwrap();
    assert_eq!(engine.cell_state(c("A1")), Some(CellState::Dirty));
    assert_eq!(engine.get_value(c("A1")), n(52.0));
}

/// A name pointing back at the cell that uses it is a cycle
#[test]
fn test_cycle_through_name() {
    let mut engine = Engine::new();
    engine
        .define_name(DefinedName::workbook_scope("X", "=Sheet1!A1"))
        .unwrap();
    engine.set_formula(c("A1"), "=X+1").unwrap();
    assert_eq!(engine.get_value(c("A1")), err(CellError::Cycle));
    assert_eq!(engine.calculate().circular_references, 1);

    engine
        .define_name(DefinedName::workbook_scope("X", "=Sheet1!B1"))
        .unwrap();
    engine.set_value(c("B1"), 4.0).unwrap();
    assert_eq!(engine.get_value(c("A1")), n(5.0));
}

/// `Sheet!Name` reads a name scoped to another sheet
#[test]
fn test_sheet_qualified_names() {
    let mut engine = Engine::new();
    engine.add_sheet("Data").unwrap();
    engine.set_value(at(1, "A1"), 8.0).unwrap();
    engine.define_name(DefinedName::sheet_scope("Rate", "=A1", 1)).unwrap();
    engine.set_formula(c("B1"), "=Data!Rate*2").unwrap();
    assert_eq!(engine.get_value(c("B1")), n(16.0));

    engine.set_value(at(1, "A1"), 1.0).unwrap();
    assert_eq!(engine.get_value(c("B1")), n(2.0));

    let error = engine.set_formula(c("B2"), "=Sheet1!Rate").unwrap_err();
    assert!(matches!(error, Error::Formula(FormulaError::Reference(_))));
}
