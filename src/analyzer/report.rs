//! Text report over aggregated log state.

use std::fmt;

use super::{LogAggregator, TargetClass, TargetStats};

/// Deterministic report; render with `to_string()` or `{}`.
pub struct Report<'a> {
    aggregator: &'a LogAggregator,
}

impl LogAggregator {
    pub fn report(&self) -> Report<'_> {
        Report { aggregator: self }
    }
}

/// Rounded percentage, 0 for an empty total.
pub fn percent(count: usize, total: usize) -> u64 {
    if total == 0 {
        return 0;
    }
    (count as f64 * 100.0 / total as f64).round() as u64
}

fn json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn counts(stats: Option<&TargetStats>) -> String {
    let stats = stats.cloned().unwrap_or_default();
    format!(
        "linesInLog: {} ok: {} fail: {}",
        stats.line_count, stats.success_count, stats.failure_count
    )
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let agg = self.aggregator;

        for (n, (error, targets)) in agg.errors().iter().enumerate() {
            writeln!(f, "ERROR#{}: {} ({} targets)", n + 1, error, targets.len())?;
            for (i, target) in targets.keys().enumerate() {
                let stats = agg.target(target).cloned().unwrap_or_default();
                writeln!(
                    f,
                    "{}. {} successTrue: {} successFalse: {}",
                    i + 1,
                    target,
                    stats.success_count,
                    stats.failure_count
                )?;
            }
        }

        let total = agg.targets().len();
        let classes = [
            ("Number of targets with no errors (successes only)", TargetClass::SuccessOnly),
            ("Number of targets only with errors", TargetClass::FailureOnly),
            ("Number of targets with errors and no errors", TargetClass::Mixed),
        ];
        writeln!(f)?;
        for (label, class) in classes {
            let count = agg.class_count(class);
            writeln!(f, "{}: {} (of {}) ({}%)", label, count, total, percent(count, total))?;
        }

        writeln!(f, "Total number of targets: {}", total)?;
        for (i, (target, stats)) in agg.targets().iter().enumerate() {
            writeln!(
                f,
                "{}: {}: {} {}",
                i + 1,
                target,
                json_list(&stats.serial_names),
                counts(Some(stats))
            )?;
        }

        writeln!(f, "Number of targets with detected serial names: {}", agg.serial_targets().len())?;
        for (i, (serial, targets)) in agg.serial_targets().iter().enumerate() {
            let per_target: Vec<String> = targets.iter().map(|t| counts(agg.target(t))).collect();
            writeln!(
                f,
                "{}: {}: {} {}",
                i + 1,
                serial,
                json_list(targets),
                json_list(&per_target)
            )?;
        }

        Ok(())
    }
}
