//! Scenario fixtures - order input files and their expected log output.
//!
//! Both files are comma-separated, one record per line. A line starting
//! with `#` opens a new scenario (its text becomes the scenario name);
//! blank lines are ignored.
//!
//! Input records:
//!
//! ```text
//! N, <user>, <symbol>, <price>, <qty>, <B|S>, <user order id>
//! C, <user>, <user order id>
//! F
//! ```
//!
//! Expected output records are log lines in their rendered form.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::command::Order;
use crate::error::{EngineError, Result};

/// One named group of fixture records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scenario<T> {
    /// Header text after the `#`, trimmed
    pub name: String,
    pub records: Vec<T>,
}

/// Scenarios of order input
pub type InputScenario = Scenario<Order>;

/// Scenarios of expected log lines
pub type ExpectedScenario = Scenario<String>;

/// Parse an order input fixture.
pub fn read_scenarios<R: Read>(input: R) -> Result<Vec<InputScenario>> {
    group(input, parse_order)
}

/// Parse an expected output fixture.
pub fn read_expected<R: Read>(input: R) -> Result<Vec<ExpectedScenario>> {
    group(input, |record, _| Ok(record.iter().collect::<Vec<_>>().join(", ")))
}

pub fn load_scenarios(path: impl AsRef<Path>) -> Result<Vec<InputScenario>> {
    read_scenarios(File::open(path)?)
}

pub fn load_expected(path: impl AsRef<Path>) -> Result<Vec<ExpectedScenario>> {
    read_expected(File::open(path)?)
}

/// Split records into scenarios at `#` lines.
fn group<R, T, F>(input: R, mut parse: F) -> Result<Vec<Scenario<T>>>
where
    R: Read,
    F: FnMut(&StringRecord, u64) -> Result<T>,
{
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .quoting(false)
        .from_reader(input);

    let mut scenarios = Vec::new();
    let mut current: Option<Scenario<T>> = None;

    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |pos| pos.line());

        if let Some(header) = record.get(0).and_then(|first| first.strip_prefix('#')) {
            scenarios.extend(current.take().filter(|s| !s.records.is_empty()));
            // A comma inside the header splits it; put it back together
            let mut name = header.trim().to_owned();
            for field in record.iter().skip(1) {
                name.push_str(", ");
                name.push_str(field);
            }
            current = Some(Scenario {
                name,
                records: Vec::new(),
            });
            continue;
        }

        let item = parse(&record, line)?;
        current.get_or_insert_with(|| Scenario {
            name: String::new(),
            records: Vec::new(),
        })
        .records
        .push(item);
    }

    scenarios.extend(current.filter(|s| !s.records.is_empty()));
    Ok(scenarios)
}

fn parse_order(record: &StringRecord, line: u64) -> Result<Order> {
    let tag = record.get(0).unwrap_or_default();
    let expect_fields = |count: usize| {
        if record.len() == count {
            Ok(())
        } else {
            Err(EngineError::Fixture {
                line,
                reason: format!("`{tag}` record needs {count} fields, found {}", record.len()),
            })
        }
    };

    match tag {
        "N" => {
            expect_fields(7)?;
            let user_id = field(record, 1, line)?;
            let symbol = record[2].to_owned();
            let price = field(record, 3, line)?;
            let quantity = field(record, 4, line)?;
            let user_order_id = field(record, 6, line)?;
            match &record[5] {
                "B" => Ok(Order::buy(user_id, user_order_id, symbol, price, quantity)),
                "S" => Ok(Order::sell(user_id, user_order_id, symbol, price, quantity)),
                other => Err(EngineError::Fixture {
                    line,
                    reason: format!("side must be B or S, found `{other}`"),
                }),
            }
        }
        "C" => {
            expect_fields(3)?;
            Ok(Order::cancel(field(record, 1, line)?, field(record, 2, line)?))
        }
        "F" => {
            expect_fields(1)?;
            Ok(Order::flush())
        }
        other => Err(EngineError::UnknownOrderKind(other.to_owned())),
    }
}

fn field<T: FromStr>(record: &StringRecord, index: usize, line: u64) -> Result<T> {
    let raw = &record[index];
    raw.parse().map_err(|_| EngineError::Fixture {
        line,
        reason: format!("field {} is not a valid number: `{raw}`", index + 1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = "\
#name: scenario 1
#descr: balanced book

N, 1, IBM, 10, 100, B, 1
N, 2, IBM, 12, 100, S, 102
C, 1, 1
F

#name: scenario 2
N, 1, VAL, 0, 50, S, 3
F
";

    #[test]
    fn test_read_scenarios() {
        let scenarios = read_scenarios(INPUT.as_bytes()).unwrap();

        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].name, "descr: balanced book");
        assert_eq!(
            scenarios[0].records,
            vec![
                Order::buy(1, 1, "IBM", 10, 100),
                Order::sell(2, 102, "IBM", 12, 100),
                Order::cancel(1, 1),
                Order::flush(),
            ]
        );
        assert_eq!(scenarios[1].records[0], Order::sell(1, 3, "VAL", 0, 50));
    }

    #[test]
    fn test_read_expected_keeps_line_text() {
        let output = "#scenario 1\nA, 1, 1\nB, B, 10, 100\nB, S, -, -\n#scenario 2\nC, 1, 1, 2\n";

        let expected = read_expected(output.as_bytes()).unwrap();

        assert_eq!(expected.len(), 2);
        assert_eq!(expected[0].records, vec!["A, 1, 1", "B, B, 10, 100", "B, S, -, -"]);
        assert_eq!(expected[1].records, vec!["C, 1, 1, 2"]);
    }

    #[test]
    fn test_records_before_first_header() {
        let scenarios = read_scenarios("F\n".as_bytes()).unwrap();
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].name, "");
    }

    #[test]
    fn test_unknown_tag_is_fatal() {
        let err = read_scenarios("#s\nX, 1, 2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, EngineError::UnknownOrderKind(tag) if tag == "X"));
    }

    #[test]
    fn test_malformed_fields_report_line() {
        let err = read_scenarios("#s\nF\nN, 1, IBM, ten, 100, B, 1\n".as_bytes()).unwrap_err();
        match err {
            EngineError::Fixture { line, reason } => {
                assert_eq!(line, 3);
                assert!(reason.contains("ten"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = read_scenarios("C, 1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, EngineError::Fixture { line: 1, .. }));

        let err = read_scenarios("N, 1, IBM, 10, 100, X, 1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, EngineError::Fixture { .. }));
    }
}
