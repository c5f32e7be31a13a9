use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::decimal::Rate;
use crate::errors::{LoanError, Result};
use crate::schedule::frequency::Frequency;
use crate::types::BenchmarkId;

/// how an account's effective rate is derived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RateSpec {
    Fixed { rate: Rate },
    Floating {
        benchmark_id: BenchmarkId,
        spread: Rate,
        floor: Option<Rate>,
        cap: Option<Rate>,
        reset_frequency: Frequency,
    },
}

impl RateSpec {
    pub fn is_floating(&self) -> bool {
        matches!(self, RateSpec::Floating { .. })
    }
}

/// a benchmark rate series: publication history keyed by effective date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkCurve {
    pub id: BenchmarkId,
    pub code: String,
    publications: BTreeMap<NaiveDate, Rate>,
}

impl BenchmarkCurve {
    pub fn new(id: BenchmarkId, code: impl Into<String>) -> Self {
        Self { id, code: code.into(), publications: BTreeMap::new() }
    }

    /// record a published value; re-publishing a date overwrites it
    pub fn publish(&mut self, effective_date: NaiveDate, rate: Rate) {
        self.publications.insert(effective_date, rate);
    }

    /// value effective on a date: the latest publication on or before it
    pub fn rate_on(&self, as_of: NaiveDate) -> Option<Rate> {
        self.publications.range(..=as_of).next_back().map(|(_, r)| *r)
    }

    pub fn is_empty(&self) -> bool {
        self.publications.is_empty()
    }
}

/// read-only lookup over the benchmark curves an engine is configured with
pub trait BenchmarkSource {
    fn curve(&self, id: BenchmarkId) -> Option<&BenchmarkCurve>;
}

impl BenchmarkSource for BTreeMap<BenchmarkId, BenchmarkCurve> {
    fn curve(&self, id: BenchmarkId) -> Option<&BenchmarkCurve> {
        self.get(&id)
    }
}

/// effective rate for a spec on a date: fixed as-is, floating as
/// clamp(benchmark + spread, floor, cap) with fall-back to the latest
/// earlier publication
pub fn effective_rate(
    spec: &RateSpec,
    benchmarks: &impl BenchmarkSource,
    as_of: NaiveDate,
) -> Result<Rate> {
    match spec {
        RateSpec::Fixed { rate } => Ok(*rate),
        RateSpec::Floating { benchmark_id, spread, floor, cap, .. } => {
            let curve = benchmarks.curve(*benchmark_id).ok_or(LoanError::NotFound {
                entity: "benchmark",
                id: *benchmark_id,
            })?;
            let benchmark = curve.rate_on(as_of).ok_or(LoanError::BenchmarkUnavailable {
                benchmark_id: *benchmark_id,
                as_of,
            })?;

            let mut rate = benchmark + *spread;
            if let Some(floor) = floor {
                rate = rate.max(*floor);
            }
            if let Some(cap) = cap {
                rate = rate.min(*cap);
            }
            Ok(rate)
        }
    }
}

/// outcome of a floating-rate reset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateReset {
    pub reset_date: NaiveDate,
    pub old_rate: Rate,
    pub new_rate: Rate,
    pub next_reset_date: NaiveDate,
}

/// resolve a reset: new effective rate plus the next reset date per the
/// spec's reset frequency
pub fn resolve_reset(
    spec: &RateSpec,
    current_rate: Rate,
    benchmarks: &impl BenchmarkSource,
    reset_date: NaiveDate,
) -> Result<RateReset> {
    let reset_frequency = match spec {
        RateSpec::Floating { reset_frequency, .. } => *reset_frequency,
        RateSpec::Fixed { .. } => {
            return Err(LoanError::conflicting_state("rate reset on a fixed-rate account"));
        }
    };

    let new_rate = effective_rate(spec, benchmarks, reset_date)?;
    Ok(RateReset {
        reset_date,
        old_rate: current_rate,
        new_rate,
        next_reset_date: reset_frequency.add_periods(reset_date, 1),
    })
}
