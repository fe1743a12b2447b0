//! Turns two successive counter readings into per-second rates.
//!
//! The calculator holds no state of its own: everything it needs from the
//! previous cycle arrives as [`Accumulators`], and the new accumulators are
//! returned alongside the metrics.

use thiserror::Error;

use super::models::{Accumulators, Metrics, Variables};
use super::reading::RawReading;

/// Statement counters that count as reads.
pub const READ_COUNTERS: &[&str] = &["COM_SELECT", "COM_INSERT_SELECT", "COM_REPLACE_SELECT"];

/// Statement counters that count as writes. The `*_SELECT` hybrids appear in
/// both lists.
pub const WRITE_COUNTERS: &[&str] = &[
    "COM_INSERT",
    "COM_UPDATE",
    "COM_DELETE",
    "COM_REPLACE",
    "COM_INSERT_SELECT",
    "COM_REPLACE_SELECT",
];

/// A raw counter value that is not an unsigned integer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot parse {counter} value {raw_value:?} as an integer")]
pub struct MetricParseError {
    pub counter: String,
    pub raw_value: String,
}

/// Output of one [`compute`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct Computed {
    pub metrics: Metrics,
    pub variables: Variables,
    pub accumulators: Accumulators,
    pub errors: Vec<MetricParseError>,
}

/// State of one total while the reading is being folded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Total {
    #[default]
    Absent,
    Value(u64),
    Invalid,
}

impl Total {
    fn set(&mut self, parsed: Option<u64>) {
        *self = match parsed {
            Some(v) => Total::Value(v),
            None => Total::Invalid,
        };
    }

    /// Add one contributing counter. An unparsable contributor poisons the
    /// total for the rest of the cycle.
    fn add(&mut self, parsed: Option<u64>) {
        *self = match (*self, parsed) {
            (Total::Invalid, _) | (_, None) => Total::Invalid,
            (Total::Absent, Some(v)) => Total::Value(v),
            (Total::Value(sum), Some(v)) => Total::Value(sum.saturating_add(v)),
        };
    }

    fn value(self) -> Option<u64> {
        match self {
            Total::Value(v) => Some(v),
            Total::Absent | Total::Invalid => None,
        }
    }
}

/// Everything recognized in one status reading, before any diffing.
#[derive(Debug, Default)]
struct Folded {
    current_connections: Option<u64>,
    uptime: Option<u64>,
    connections: Total,
    aborted_connections: Total,
    queries: Total,
    reads: Total,
    writes: Total,
}

/// Result of diffing one total against its accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Rate {
    total: u64,
    per_second: f64,
    accumulator: Option<u64>,
}

fn parse(counter: &str, raw: &str, errors: &mut Vec<MetricParseError>) -> Option<u64> {
    match raw.trim().parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            errors.push(MetricParseError {
                counter: counter.to_string(),
                raw_value: raw.to_string(),
            });
            None
        }
    }
}

fn fold(status: &RawReading, errors: &mut Vec<MetricParseError>) -> Folded {
    let mut folded = Folded::default();

    for (name, raw) in status.iter() {
        let reads = READ_COUNTERS.contains(&name);
        let writes = WRITE_COUNTERS.contains(&name);

        match name {
            "THREADS_CONNECTED" => folded.current_connections = parse(name, raw, errors),
            "UPTIME" => folded.uptime = parse(name, raw, errors),
            "CONNECTIONS" => folded.connections.set(parse(name, raw, errors)),
            "ABORTED_CONNECTS" => folded.aborted_connections.set(parse(name, raw, errors)),
            "QUERIES" => folded.queries.set(parse(name, raw, errors)),
            _ if reads || writes => {
                let parsed = parse(name, raw, errors);
                if reads {
                    folded.reads.add(parsed);
                }
                if writes {
                    folded.writes.add(parsed);
                }
            }
            _ => {}
        }
    }

    folded
}

/// Diff a total against the previous accumulator.
///
/// A missing or unparsable current value keeps the previous total and
/// reports no rate. Without a previous value the rate is zero and the
/// current total becomes the baseline. A counter that went backwards (server
/// restart) or a non-positive interval also yields zero.
fn diff(previous: Option<u64>, current: Option<u64>, elapsed_secs: f64) -> Rate {
    match (previous, current) {
        (_, None) => Rate {
            total: previous.unwrap_or(0),
            per_second: 0.0,
            accumulator: previous,
        },
        (None, Some(current)) => Rate {
            total: current,
            per_second: 0.0,
            accumulator: Some(current),
        },
        (Some(previous), Some(current)) => {
            let delta = current.saturating_sub(previous);
            let per_second = if delta > 0 && elapsed_secs > 0.0 {
                delta as f64 / elapsed_secs
            } else {
                0.0
            };
            Rate {
                total: current,
                per_second,
                accumulator: Some(current),
            }
        }
    }
}

/// Compute a status record from the previous accumulators and the current
/// readings.
///
/// `elapsed_secs` is the time between the reading that produced `previous`
/// and this one. Parse failures never abort the computation; they are
/// collected in [`Computed::errors`].
pub fn compute(
    previous: Option<&Accumulators>,
    status: &RawReading,
    variables: &RawReading,
    elapsed_secs: f64,
) -> Computed {
    let previous = previous.cloned().unwrap_or_default();
    let mut errors = Vec::new();

    let folded = fold(status, &mut errors);

    let connections = diff(previous.connections, folded.connections.value(), elapsed_secs);
    let aborted = diff(
        previous.aborted_connections,
        folded.aborted_connections.value(),
        elapsed_secs,
    );
    let queries = diff(previous.queries, folded.queries.value(), elapsed_secs);

    // Reads and writes are derived from summed totals, so they are diffed
    // only once every contributing row has been folded in.
    let reads = diff(previous.reads, folded.reads.value(), elapsed_secs);
    let writes = diff(previous.writes, folded.writes.value(), elapsed_secs);

    let max_connections = variables
        .get("MAX_CONNECTIONS")
        .and_then(|raw| parse("MAX_CONNECTIONS", raw, &mut errors))
        .unwrap_or(0);

    Computed {
        metrics: Metrics {
            current_connections: folded.current_connections.unwrap_or(0),
            connections: connections.total,
            connections_per_second: connections.per_second,
            aborted_connections: aborted.total,
            aborted_connections_per_second: aborted.per_second,
            queries: queries.total,
            queries_per_second: queries.per_second,
            reads: reads.total,
            reads_per_second: reads.per_second,
            writes: writes.total,
            writes_per_second: writes.per_second,
            uptime: folded.uptime.unwrap_or(0),
        },
        variables: Variables { max_connections },
        accumulators: Accumulators {
            connections: connections.accumulator,
            aborted_connections: aborted.accumulator,
            queries: queries.accumulator,
            reads: reads.accumulator,
            writes: writes.accumulator,
        },
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(pairs: &[(&str, &str)]) -> RawReading {
        pairs.iter().copied().collect()
    }

    fn queries(value: u64) -> RawReading {
        reading(&[("QUERIES", &value.to_string())])
    }

    #[test]
    fn test_rate_is_diff_over_elapsed() {
        let cases = [(0u64, 0u64, 1.0), (100, 350, 1.0), (100, 350, 2.0), (7, 8, 0.5)];

        for (previous, current, elapsed) in cases {
            let prev = Accumulators {
                queries: Some(previous),
                ..Default::default()
            };
            let out = compute(Some(&prev), &queries(current), &RawReading::new(), elapsed);
            let expected = (current - previous) as f64 / elapsed;
            assert_eq!(out.metrics.queries_per_second, expected, "{previous} -> {current}");
            assert_eq!(out.metrics.queries, current);
            assert_eq!(out.accumulators.queries, Some(current));
        }
    }

    #[test]
    fn test_counter_reset_clamps_to_zero() {
        let prev = Accumulators {
            connections: Some(5_000),
            queries: Some(1_000_000),
            ..Default::default()
        };
        let status = reading(&[("CONNECTIONS", "12"), ("QUERIES", "3")]);

        let out = compute(Some(&prev), &status, &RawReading::new(), 1.0);

        assert_eq!(out.metrics.connections_per_second, 0.0);
        assert_eq!(out.metrics.queries_per_second, 0.0);
        assert_eq!(out.metrics.connections, 12);
        assert_eq!(out.accumulators.queries, Some(3));
    }

    #[test]
    fn test_non_positive_elapsed_yields_zero_rate() {
        let prev = Accumulators {
            queries: Some(10),
            ..Default::default()
        };

        for elapsed in [0.0, -1.0, f64::NAN] {
            let out = compute(Some(&prev), &queries(20), &RawReading::new(), elapsed);
            assert_eq!(out.metrics.queries_per_second, 0.0);
            assert_eq!(out.accumulators.queries, Some(20));
        }
    }

    #[test]
    fn test_cold_start_reports_zero_rates() {
        let status = reading(&[
            ("CONNECTIONS", "900"),
            ("ABORTED_CONNECTS", "4"),
            ("QUERIES", "123456"),
            ("COM_SELECT", "800"),
            ("COM_UPDATE", "77"),
        ]);

        let out = compute(None, &status, &RawReading::new(), 1.0);

        let m = &out.metrics;
        assert_eq!(m.connections_per_second, 0.0);
        assert_eq!(m.aborted_connections_per_second, 0.0);
        assert_eq!(m.queries_per_second, 0.0);
        assert_eq!(m.reads_per_second, 0.0);
        assert_eq!(m.writes_per_second, 0.0);
        assert_eq!(m.queries, 123_456);
        assert_eq!(
            out.accumulators,
            Accumulators {
                connections: Some(900),
                aborted_connections: Some(4),
                queries: Some(123_456),
                reads: Some(800),
                writes: Some(77),
            }
        );
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_three_cycles_with_restart() {
        let empty = RawReading::new();

        let first = compute(None, &queries(1000), &empty, 1.0);
        assert_eq!(first.metrics.queries, 1000);
        assert_eq!(first.metrics.queries_per_second, 0.0);

        let second = compute(Some(&first.accumulators), &queries(1250), &empty, 1.0);
        assert_eq!(second.metrics.queries, 1250);
        assert_eq!(second.metrics.queries_per_second, 250.0);

        let third = compute(Some(&second.accumulators), &queries(300), &empty, 1.0);
        assert_eq!(third.metrics.queries, 300);
        assert_eq!(third.metrics.queries_per_second, 0.0);
    }

    #[test]
    fn test_read_write_classification() {
        let status = reading(&[
            ("COM_SELECT", "10"),
            ("COM_INSERT", "4"),
            ("COM_INSERT_SELECT", "2"),
        ]);

        let out = compute(None, &status, &RawReading::new(), 1.0);

        assert_eq!(out.metrics.reads, 12);
        assert_eq!(out.metrics.writes, 6);
    }

    #[test]
    fn test_read_write_rates_use_combined_totals() {
        let prev = Accumulators {
            reads: Some(12),
            writes: Some(6),
            ..Default::default()
        };
        let status = reading(&[
            ("COM_SELECT", "20"),
            ("COM_INSERT", "5"),
            ("COM_UPDATE", "3"),
            ("COM_DELETE", "1"),
            ("COM_REPLACE", "0"),
            ("COM_INSERT_SELECT", "2"),
            ("COM_REPLACE_SELECT", "1"),
        ]);

        let out = compute(Some(&prev), &status, &RawReading::new(), 1.0);

        assert_eq!(out.metrics.reads, 23);
        assert_eq!(out.metrics.reads_per_second, 11.0);
        assert_eq!(out.metrics.writes, 12);
        assert_eq!(out.metrics.writes_per_second, 6.0);
    }

    #[test]
    fn test_parse_error_keeps_previous_values() {
        let prev = Accumulators {
            queries: Some(500),
            connections: Some(10),
            ..Default::default()
        };
        let status = reading(&[("QUERIES", "lots"), ("CONNECTIONS", "15")]);

        let out = compute(Some(&prev), &status, &RawReading::new(), 1.0);

        assert_eq!(
            out.errors,
            vec![MetricParseError {
                counter: "QUERIES".to_string(),
                raw_value: "lots".to_string(),
            }]
        );
        assert_eq!(out.metrics.queries, 500);
        assert_eq!(out.metrics.queries_per_second, 0.0);
        assert_eq!(out.accumulators.queries, Some(500));
        // Other counters still compute.
        assert_eq!(out.metrics.connections_per_second, 5.0);
    }

    #[test]
    fn test_bad_contributor_invalidates_derived_total() {
        let prev = Accumulators {
            reads: Some(3),
            writes: Some(3),
            ..Default::default()
        };
        let status = reading(&[("COM_SELECT", "9"), ("COM_INSERT", "-1"), ("COM_UPDATE", "4")]);

        let out = compute(Some(&prev), &status, &RawReading::new(), 1.0);

        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].counter, "COM_INSERT");
        assert_eq!(out.metrics.writes, 3);
        assert_eq!(out.metrics.writes_per_second, 0.0);
        assert_eq!(out.accumulators.writes, Some(3));
        assert_eq!(out.metrics.reads_per_second, 6.0);
    }

    #[test]
    fn test_pass_through_fields() {
        let status = reading(&[("Threads_connected", "17"), ("Uptime", "86400")]);
        let variables = reading(&[("max_connections", "151")]);

        let out = compute(None, &status, &variables, 1.0);

        assert_eq!(out.metrics.current_connections, 17);
        assert_eq!(out.metrics.uptime, 86_400);
        assert_eq!(out.variables.max_connections, 151);
    }

    #[test]
    fn test_malformed_pass_through_fields() {
        let prev = Accumulators {
            queries: Some(1000),
            connections: Some(40),
            ..Default::default()
        };
        let status = reading(&[
            ("THREADS_CONNECTED", "n/a"),
            ("QUERIES", "1200"),
            ("CONNECTIONS", "50"),
        ]);
        let variables = reading(&[("MAX_CONNECTIONS", "")]);

        let out = compute(Some(&prev), &status, &variables, 2.0);

        let mut counters: Vec<_> = out.errors.iter().map(|e| e.counter.as_str()).collect();
        counters.sort_unstable();
        assert_eq!(counters, vec!["MAX_CONNECTIONS", "THREADS_CONNECTED"]);
        assert_eq!(out.metrics.current_connections, 0);
        assert_eq!(out.variables.max_connections, 0);

        assert_eq!(out.metrics.queries_per_second, 100.0);
        assert_eq!(out.metrics.connections_per_second, 5.0);
        assert_eq!(out.accumulators.queries, Some(1200));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let status = reading(&[("INNODB_BUFFER_POOL_PAGES_FREE", "abc"), ("QUERIES", "1")]);

        let out = compute(None, &status, &RawReading::new(), 1.0);

        assert!(out.errors.is_empty());
        assert_eq!(out.metrics.queries, 1);
    }

    #[test]
    fn test_missing_counter_carries_accumulator() {
        let prev = Accumulators {
            aborted_connections: Some(8),
            ..Default::default()
        };

        let out = compute(Some(&prev), &queries(1), &RawReading::new(), 1.0);

        assert!(out.errors.is_empty());
        assert_eq!(out.metrics.aborted_connections, 8);
        assert_eq!(out.accumulators.aborted_connections, Some(8));
    }

    #[test]
    fn test_compute_is_pure() {
        let prev = Accumulators {
            queries: Some(10),
            reads: Some(1),
            ..Default::default()
        };
        let status = reading(&[("QUERIES", "30"), ("COM_SELECT", "x"), ("UPTIME", "5")]);
        let variables = reading(&[("MAX_CONNECTIONS", "100")]);

        let a = compute(Some(&prev), &status, &variables, 2.0);
        let b = compute(Some(&prev), &status, &variables, 2.0);

        assert_eq!(a, b);
    }
}
