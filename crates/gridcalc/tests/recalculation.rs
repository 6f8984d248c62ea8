//! Tests for incremental recalculation through the public `Sheet` API

use gridcalc::prelude::*;
use gridcalc::{evaluate, parse_formula, Error};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

fn a(s: &str) -> CellAddress {
    CellAddress::parse(s).unwrap()
}

fn eval(formula: &str) -> Value {
    let ast = parse_formula(formula).unwrap();
    evaluate(&ast, &|_: CellAddress| Value::Empty)
}

/// Test basic formula evaluation without cell references
#[test]
fn test_evaluate_simple_formulas() {
    assert_eq!(eval("=1+2*3"), Value::Number(7.0));
    assert_eq!(eval("=2^3^2"), Value::Number(512.0));
    assert_eq!(eval("=1/0"), Value::Error(ErrorKind::DivByZero));
    assert_eq!(eval("=IF(1=1, 5, 1/0)"), Value::Number(5.0));
    assert_eq!(eval("=\"Hello \"&\"World\""), Value::text("Hello World"));
    assert_eq!(eval("=5>3"), Value::Boolean(true));
}

/// Test that dependents follow an edit
#[test]
fn test_edit_propagates_to_dependents() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "2").unwrap();
    sheet.set("A2", "3").unwrap();
    sheet.set("A3", "=A1+A2").unwrap();
    sheet.set("C5", "=1+1").unwrap();
    assert_eq!(sheet.value(a("A3")), Value::Number(5.0));

    let report = sheet.set("A1", "10").unwrap();
    assert_eq!(sheet.value(a("A3")), Value::Number(13.0));
    assert_eq!(report.affected_cells, vec![a("A1"), a("A3")]);
    assert!(!report.superseded);

    for addr in ["A1", "A2", "A3", "C5"] {
        assert!(!sheet.is_dirty(a(addr)), "{} is dirty", addr);
    }
}

/// Test that a two-cell cycle is reported and cleared again
#[test]
fn test_cycle_reported_and_cleared() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "=B1").unwrap();
    let report = sheet.set("B1", "=A1").unwrap();

    assert_eq!(report.circular, vec![a("A1"), a("B1")]);
    assert_eq!(sheet.value(a("A1")), Value::Error(ErrorKind::CircularRef));
    assert_eq!(sheet.value(a("B1")), Value::Error(ErrorKind::CircularRef));
    assert_eq!(sheet.value(a("A1")).to_string(), "#CIRCULAR!");
    assert!(sheet.is_circular(a("A1")));

    let report = sheet.set("B1", "5").unwrap();
    assert!(report.circular.is_empty());
    assert_eq!(sheet.value(a("B1")), Value::Number(5.0));
    assert_eq!(sheet.value(a("A1")), Value::Number(5.0));
    assert!(!sheet.is_circular(a("A1")));
    assert!(!sheet.is_circular(a("B1")));
}

#[test]
fn test_self_reference_is_circular() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "=A1+1").unwrap();
    assert_eq!(sheet.value(a("A1")), Value::Error(ErrorKind::CircularRef));

    sheet.set("B1", "=SUM(B1:B3)").unwrap();
    assert_eq!(sheet.value(b1()), Value::Error(ErrorKind::CircularRef));

    sheet.set("A1", "=2").unwrap();
    assert_eq!(sheet.value(a("A1")), Value::Number(2.0));
    assert_eq!(sheet.circular_cells(), vec![b1()]);
}

fn b1() -> CellAddress {
    a("B1")
}

/// Test that a cycle does not block unrelated cells, and readers of a
/// cycle see the error
#[test]
fn test_cycle_is_localized() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "=B1").unwrap();
    sheet.set("B1", "=A1").unwrap();
    sheet.set("C1", "=A1+1").unwrap();
    sheet.set("D1", "7").unwrap();
    sheet.set("E1", "=D1*2").unwrap();

    assert_eq!(sheet.value(a("C1")), Value::Error(ErrorKind::CircularRef));
    assert!(!sheet.is_circular(a("C1")));
    assert_eq!(sheet.value(a("E1")), Value::Number(14.0));

    sheet.set("D1", "8").unwrap();
    assert_eq!(sheet.value(a("E1")), Value::Number(16.0));
    assert!(sheet.is_circular(a("A1")));

    sheet.set("A1", "1").unwrap();
    assert_eq!(sheet.value(a("B1")), Value::Number(1.0));
    assert_eq!(sheet.value(a("C1")), Value::Number(2.0));
}

/// Test that cells reading a cycle through a chain pick up the error when
/// the cycle closes after they were entered
#[test]
fn test_cycle_closed_under_existing_readers() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "1").unwrap();
    sheet.set("Z1", "=A1").unwrap();
    sheet.set("C1", "=Z1+1").unwrap();
    sheet.set("B1", "=A1").unwrap();
    assert_eq!(sheet.value(a("C1")), Value::Number(2.0));

    sheet.set("A1", "=B1").unwrap();
    for addr in ["A1", "B1", "Z1", "C1"] {
        assert_eq!(sheet.value(a(addr)), Value::Error(ErrorKind::CircularRef), "{}", addr);
    }
    assert_eq!(sheet.circular_cells(), vec![a("A1"), a("B1")]);

    sheet.set("B1", "4").unwrap();
    assert_eq!(sheet.value(a("Z1")), Value::Number(4.0));
    assert_eq!(sheet.value(a("C1")), Value::Number(5.0));
}

#[test]
fn test_date_functions_in_cells() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "=DATE(2024, 3, 15)").unwrap();
    sheet.set("A2", "=YEAR(A1)*10000+MONTH(A1)*100+DAY(A1)").unwrap();
    sheet.set("A3", "=DATEVALUE(\"2024-04-01\")-A1").unwrap();
    sheet.set("A4", "=TODAY()>=A1").unwrap();

    assert_eq!(sheet.value(a("A1")), Value::Number(45366.0));
    assert_eq!(sheet.value(a("A2")), Value::Number(20240315.0));
    assert_eq!(sheet.value(a("A3")), Value::Number(17.0));
    assert_eq!(sheet.value(a("A4")), Value::Boolean(true));
}

/// Test that a longer cycle through a range is found
#[test]
fn test_cycle_through_range() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "=SUM(B1:B2)").unwrap();
    sheet.set("B1", "1").unwrap();
    sheet.set("B2", "=C1").unwrap();
    assert_eq!(sheet.value(a("A1")), Value::Number(1.0));

    let report = sheet.set("C1", "=A1").unwrap();
    assert_eq!(report.circular, vec![a("A1"), a("C1"), a("B2")]);

    sheet.set("C1", "100").unwrap();
    assert_eq!(sheet.value(a("B2")), Value::Number(100.0));
    assert_eq!(sheet.value(a("A1")), Value::Number(101.0));
}

#[test]
fn test_sum_skips_text() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "1").unwrap();
    sheet.set("A2", "x").unwrap();
    sheet.set("A3", "2").unwrap();
    sheet.set("B1", "=SUM(A1:A3)").unwrap();
    assert_eq!(sheet.value(a("B1")), Value::Number(3.0));
    assert_eq!(sheet.evaluate_formula("=A1+A2").unwrap(), Value::Error(ErrorKind::ValueError));
}

#[test]
fn test_vlookup_exact() {
    let mut sheet = Sheet::new();
    for (addr, input) in [
        ("A1", "1"),
        ("A2", "2"),
        ("A3", "3"),
        ("B1", "x"),
        ("B2", "y"),
        ("B3", "z"),
    ] {
        sheet.set(addr, input).unwrap();
    }
    sheet.set("C1", "=VLOOKUP(2, A1:B3, 2, FALSE)").unwrap();
    assert_eq!(sheet.value(a("C1")), Value::text("y"));

    sheet.set("B2", "why").unwrap();
    assert_eq!(sheet.value(a("C1")), Value::text("why"));
}

/// Test that range readers recalculate when any covered cell changes
#[test]
fn test_range_dependents() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "1").unwrap();
    sheet.set("B1", "=SUM(A1:A100)").unwrap();
    sheet.set("C1", "=AVERAGE(A1:A100)").unwrap();

    sheet.set("A50", "9").unwrap();
    assert_eq!(sheet.value(a("B1")), Value::Number(10.0));
    assert_eq!(sheet.value(a("C1")), Value::Number(5.0));
    assert_eq!(sheet.dependents(a("A77")), vec![a("B1"), a("C1")]);

    sheet.set("A101", "1000").unwrap();
    assert_eq!(sheet.value(a("B1")), Value::Number(10.0));
}

/// Test evaluation order along a chain entered bottom-up
#[test]
fn test_chain_entered_in_any_order() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "=A2+1").unwrap();
    sheet.set("A2", "=A3+1").unwrap();
    sheet.set("A3", "=A4+1").unwrap();
    assert_eq!(sheet.value(a("A1")), Value::Number(3.0));

    let report = sheet.set("A4", "10").unwrap();
    assert_eq!(report.evaluated, 3);
    assert_eq!(sheet.value(a("A1")), Value::Number(13.0));
}

/// Test that each dependent is evaluated once in a diamond
#[test]
fn test_diamond_evaluates_each_cell_once() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "1").unwrap();
    sheet.set("B1", "=A1*2").unwrap();
    sheet.set("C1", "=A1*3").unwrap();
    sheet.set("D1", "=B1+C1").unwrap();

    let report = sheet.set("A1", "2").unwrap();
    assert_eq!(report.evaluated, 3);
    assert_eq!(sheet.value(a("D1")), Value::Number(10.0));
    assert_eq!(report.affected_cells, vec![a("A1"), a("B1"), a("C1"), a("D1")]);
}

#[test]
fn test_rewriting_formula_moves_edges() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "1").unwrap();
    sheet.set("A2", "2").unwrap();
    sheet.set("B1", "=A1").unwrap();
    assert_eq!(sheet.dependents(a("A1")), vec![a("B1")]);

    sheet.set("B1", "=A2*10").unwrap();
    assert!(sheet.dependents(a("A1")).is_empty());
    assert_eq!(sheet.precedents(a("B1")), vec![Reference::Cell(a("A2"))]);

    let report = sheet.set("A1", "50").unwrap();
    assert_eq!(report.evaluated, 0);
    assert_eq!(sheet.value(a("B1")), Value::Number(20.0));

    // Replacing a formula with a literal drops its edges too
    sheet.set("B1", "hello").unwrap();
    assert!(sheet.dependents(a("A2")).is_empty());
    assert_eq!(sheet.formula(a("B1")), None);
}

#[test]
fn test_clear_and_set_value() {
    let mut sheet = Sheet::new();
    sheet.set_value(a("A1"), 4.0);
    sheet.set("B1", "=ISBLANK(A1)").unwrap();
    sheet.set("C1", "=A1&\"!\"").unwrap();
    assert_eq!(sheet.value(b1()), Value::Boolean(false));

    let report = sheet.clear(a("A1"));
    assert!(report.affected_cells.contains(&a("A1")));
    assert_eq!(sheet.value(a("A1")), Value::Empty);
    assert_eq!(sheet.value(b1()), Value::Boolean(true));
    assert_eq!(sheet.input(a("A1")), None);

    sheet.set_value(a("A1"), "123");
    assert_eq!(sheet.value(a("A1")), Value::text("123"));
    assert_eq!(sheet.value(a("C1")), Value::text("123!"));

    sheet.set_value(a("A1"), true);
    assert_eq!(sheet.value(a("C1")), Value::text("TRUE!"));
}

#[test]
fn test_literal_inputs() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "TRUE").unwrap();
    sheet.set("A2", "-2.5").unwrap();
    sheet.set("A3", "  some text ").unwrap();
    sheet.set("A4", "").unwrap();

    assert_eq!(sheet.value(a("A1")), Value::Boolean(true));
    assert_eq!(sheet.value(a("A2")), Value::Number(-2.5));
    assert_eq!(sheet.value(a("A3")), Value::text("  some text "));
    assert_eq!(sheet.value(a("A4")), Value::Empty);
    assert_eq!(sheet.store().len(), 3);
}

#[test]
fn test_formula_is_normalized() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "= sum( b1 : b3 ) * (1+2)").unwrap();
    assert_eq!(sheet.formula(a("A1")).as_deref(), Some("=SUM(B1:B3)*(1+2)"));
    assert_eq!(sheet.input(a("A1")).as_deref(), Some("= sum( b1 : b3 ) * (1+2)"));
}

#[test]
fn test_values_in() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "1").unwrap();
    sheet.set("B2", "=A1+1").unwrap();

    let grid = sheet.values_in(CellRange::parse("A1:B2").unwrap()).unwrap();
    assert_eq!(
        grid,
        vec![
            vec![Value::Number(1.0), Value::Empty],
            vec![Value::Empty, Value::Number(2.0)],
        ]
    );

    let whole_sheet = CellRange::parse("A1:XFD1048576").unwrap();
    assert!(matches!(
        sheet.values_in(whole_sheet),
        Err(Error::RangeTooLarge(_, _))
    ));
}

#[test]
fn test_whole_sheet_range_formula() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "1").unwrap();
    sheet.set("A1001", "=SUM(A1:XFD1000)").unwrap();
    assert_eq!(sheet.value(a("A1001")), Value::Error(ErrorKind::RefError));
    assert_eq!(sheet.dependents(a("XFD1000")), vec![a("A1001")]);

    sheet.set("B1", "=SUM(A1:XFD1048576)").unwrap();
    assert!(sheet.is_circular(a("B1")));
}

#[test]
fn test_unknown_function_is_name_error() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "=NOSUCH(1)").unwrap();
    assert_eq!(sheet.value(a("A1")).to_string(), "#NAME?");
}

#[test]
fn test_nesting_limit_from_options() {
    let mut sheet = Sheet::new().with_options(CalculationOptions {
        max_nesting_depth: 4,
        ..CalculationOptions::default()
    });
    assert!(sheet.set("A1", "=(((((1)))))").is_err());
    assert!(sheet.set("A1", "=((1))").is_ok());
    assert!(matches!(
        sheet.evaluate_formula("=(((((((1)))))))"),
        Err(FormulaError::NestingTooDeep { .. })
    ));
}

#[test]
fn test_custom_registry() {
    let mut registry = FunctionRegistry::with_builtins();
    registry
        .register_custom("TWICE", 1, Some(1), |args| match args[0].scalar() {
            Value::Number(n) => Value::Number(n * 2.0),
            _ => Value::Error(ErrorKind::ValueError),
        })
        .unwrap();

    let mut sheet = Sheet::new().with_registry(Arc::new(registry));
    sheet.set("A1", "21").unwrap();
    sheet.set("B1", "=TWICE(A1)").unwrap();
    assert_eq!(sheet.value(b1()), Value::Number(42.0));
}

#[test]
fn test_change_log_sink() {
    let batches = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&batches);

    let mut sheet = Sheet::new();
    sheet.set_change_sink(move |cells: &[CellAddress]| {
        if let Ok(mut batches) = recorded.lock() {
            batches.push(cells.to_vec());
        }
    });

    sheet.set("A1", "=B1+1").unwrap();
    sheet.set("B1", "1").unwrap();
    assert!(sheet.take_change_sink().is_some());
    sheet.set("B1", "2").unwrap();

    let batches = batches.lock().unwrap();
    assert_eq!(*batches, vec![vec![a("A1")], vec![a("A1"), a("B1")]]);
}

#[test]
fn test_worker_thread_owns_sheet() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "20").unwrap();

    let worker = std::thread::spawn(move || {
        sheet.set("A2", "=A1+22").unwrap();
        sheet
    });
    let sheet = worker.join().unwrap();
    assert_eq!(sheet.value(a("A2")), Value::Number(42.0));
}

/// Evaluating the same formula twice gives bit-identical values
#[test]
fn test_evaluation_is_idempotent() {
    let mut sheet = Sheet::new();
    sheet.set("A1", "0.1").unwrap();
    sheet.set("A2", "0.2").unwrap();

    for formula in ["=A1+A2", "=A1/3", "=AVERAGE(A1:A2)*7", "=A1^0.5"] {
        let first = sheet.evaluate_formula(formula).unwrap();
        let second = sheet.evaluate_formula(formula).unwrap();
        assert!(first.is_identical(&second), "{}", formula);
    }
}

proptest! {
    /// Entering the same cells in any order yields the same values
    #[test]
    fn prop_edit_order_does_not_matter(order in Just(vec![0usize, 1, 2, 3, 4]).prop_shuffle()) {
        let inputs = [
            ("A1", "3"),
            ("A2", "=A1*2"),
            ("A3", "=A2+A1"),
            ("B1", "=SUM(A1:A3)"),
            ("B2", "=IF(B1>10, B1, 0)"),
        ];

        let mut sheet = Sheet::new();
        for i in order {
            let (addr, input) = inputs[i];
            sheet.set(addr, input).unwrap();
        }

        prop_assert_eq!(sheet.value(a("A3")), Value::Number(9.0));
        prop_assert_eq!(sheet.value(a("B1")), Value::Number(18.0));
        prop_assert_eq!(sheet.value(a("B2")), Value::Number(18.0));
    }

    /// Every cell reading a cycle, directly or through other cells, shows
    /// the circular error whatever order the cells were entered in
    #[test]
    fn prop_cycle_readers_are_circular(order in Just(vec![0usize, 1, 2, 3, 4, 5, 6]).prop_shuffle()) {
        let inputs = [
            ("A1", "=B1"),
            ("B1", "=A1"),
            ("Z1", "=A1"),
            ("C1", "=Z1+1"),
            ("A2", "=C1*2"),
            ("B3", "=SUM(A2:A2)"),
            ("D4", "5"),
        ];

        let mut sheet = Sheet::new();
        for i in order {
            let (addr, input) = inputs[i];
            sheet.set(addr, input).unwrap();
        }

        for addr in ["A1", "B1", "Z1", "C1", "A2", "B3"] {
            prop_assert_eq!(sheet.value(a(addr)), Value::Error(ErrorKind::CircularRef), "{}", addr);
        }
        prop_assert_eq!(sheet.value(a("D4")), Value::Number(5.0));
        prop_assert_eq!(sheet.circular_cells(), vec![a("A1"), a("B1")]);
    }
}
