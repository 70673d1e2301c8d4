//! The three pipeline stages wired to a [`PipelineConfig`].
//!
//! Each `run_*` method is one independent invocation: it scans its configured
//! input, builds a plan, materializes it into its configured output and
//! returns a report. Invocations share nothing but the configuration.

use std::fmt;

use log::{debug, info};

use crate::config::PipelineConfig;
use crate::engine::{materialize, CsvSink, RunReport};
use crate::error::EtlResult;
use crate::plan::LazyTable;
use crate::stages::{
    activity_rates, count_share, ActivityRates, CategoryReport, FileOutcome, ProjectionOptimizer,
};
use crate::table::Value;

/// Progress of a single invocation. There is no resume: a failed
/// invocation is simply run again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Unscanned,
    PlanBuilt,
    Materializing,
    Materialized,
    Failed,
}

impl InvocationState {
    pub fn can_advance_to(self, next: InvocationState) -> bool {
        use InvocationState::*;
        matches!(
            (self, next),
            (Unscanned, PlanBuilt)
                | (Unscanned, Failed)
                | (PlanBuilt, Materializing)
                | (Materializing, Materialized)
                | (Materializing, Failed)
        )
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvocationState::Unscanned => "unscanned",
            InvocationState::PlanBuilt => "plan_built",
            InvocationState::Materializing => "materializing",
            InvocationState::Materialized => "materialized",
            InvocationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of the region stage.
#[derive(Debug, Clone)]
pub struct RegionOutcome {
    pub share: CategoryReport,
    pub run: RunReport,
}

/// Runs pipeline stages against one configuration.
pub struct Pipeline {
    config: PipelineConfig,
    state: InvocationState,
    trail: Vec<InvocationState>,
    stage: &'static str,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            state: InvocationState::Unscanned,
            trail: vec![InvocationState::Unscanned],
            stage: "idle",
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// State reached by the most recent invocation.
    pub fn state(&self) -> InvocationState {
        self.state
    }

    /// Every state the most recent invocation passed through, in order.
    pub fn trail(&self) -> &[InvocationState] {
        &self.trail
    }

    fn begin(&mut self, stage: &'static str) {
        self.stage = stage;
        self.state = InvocationState::Unscanned;
        self.trail = vec![InvocationState::Unscanned];
        debug!("{stage}: {}", self.state);
    }

    fn advance(&mut self, next: InvocationState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "{} -> {} is not a valid transition",
            self.state,
            next
        );
        debug!("{}: {} -> {}", self.stage, self.state, next);
        self.state = next;
        self.trail.push(next);
    }

    /// Run `work` as the materializing step, recording how it ended.
    fn materializing<T>(&mut self, work: impl FnOnce() -> EtlResult<T>) -> EtlResult<T> {
        self.advance(InvocationState::Materializing);
        match work() {
            Ok(value) => {
                self.advance(InvocationState::Materialized);
                Ok(value)
            }
            Err(err) => {
                self.advance(InvocationState::Failed);
                Err(err)
            }
        }
    }

    fn planned<T>(&mut self, plan: EtlResult<T>) -> EtlResult<T> {
        match plan {
            Ok(plan) => {
                self.advance(InvocationState::PlanBuilt);
                Ok(plan)
            }
            Err(err) => {
                self.advance(InvocationState::Failed);
                Err(err)
            }
        }
    }

    /// Plan that turns the raw export into the strict clean table.
    ///
    /// Drops the catalog's unwanted columns, parses both timestamps, applies
    /// every null filter in catalog order, appends the derived columns and
    /// finally fills the configured nulls.
    pub fn clean_plan(&self) -> EtlResult<LazyTable> {
        let clean = &self.config.clean;
        let scan = self.config.engine.scan_options()?;

        let mut table = LazyTable::scan(&self.config.paths.raw, &scan)?
            .drop(&self.config.catalog.columns_to_drop)
            .parse_timestamp(&clean.start_column)?
            .parse_timestamp(&clean.end_column)?;
        for subset in &self.config.catalog.required_non_null {
            table = table.filter_null_subset(subset)?;
        }
        for spec in &clean.derive {
            table = table.derive(&spec.name, spec.expr.clone())?;
        }
        for rule in &clean.fill {
            table = table.fill_null(&rule.column, Value::from(&rule.value))?;
        }
        Ok(table)
    }

    /// Raw export to the strict clean file.
    pub fn run_clean(&mut self) -> EtlResult<RunReport> {
        self.begin("clean");
        let plan = self.clean_plan();
        let plan = self.planned(plan)?;
        debug!("clean plan:\n{}", plan.describe());

        let output = self.config.paths.cleaned.clone();
        let exec = self.config.engine.exec_options();
        let report = self.materializing(|| {
            let mut sink = CsvSink::create(&output)?;
            materialize(&plan, &mut sink, &exec)
        })?;

        info!(
            "clean: {} -> {} rows ({:.1}% dropped), wrote {}",
            report.rows_before,
            report.rows_after,
            report.percent_dropped(),
            output.display()
        );
        info!("clean report: {}", report.to_json());
        Ok(report)
    }

    /// Clean file to the single-region file, with the region's share.
    ///
    /// Planning only reads the clean file's header. The share count and the
    /// filtered write are both data passes and run as the materializing step.
    pub fn run_region(&mut self) -> EtlResult<RegionOutcome> {
        self.begin("region");
        let region = &self.config.region;
        let exec = self.config.engine.exec_options();

        let plan = self
            .config
            .engine
            .scan_options()
            .and_then(|scan| LazyTable::scan(&self.config.paths.cleaned, &scan))
            .and_then(|base| {
                let filtered =
                    base.filter_equals(&region.column, Value::from(&region.value))?;
                Ok((base, filtered))
            });
        let (base, filtered) = self.planned(plan)?;

        let output = self.config.paths.region.clone();
        let (share, run) = self.materializing(|| {
            let share = count_share(&base, &filtered, &exec)?;
            let mut sink = CsvSink::create(&output)?;
            let run = materialize(&filtered, &mut sink, &exec)?;
            Ok((share, run))
        })?;

        info!(
            "region: kept {} of {} rows ({:.2}%), wrote {}",
            share.matched,
            share.total,
            share.percent(),
            output.display()
        );
        Ok(RegionOutcome { share, run })
    }

    /// Project every configured file onto the minimal columns.
    ///
    /// Per-file outcomes are returned rather than short-circuited. Files
    /// are rewritten in place, so no plan state is tracked here.
    pub fn run_optimize(&self) -> Vec<FileOutcome> {
        let optimizer = ProjectionOptimizer::new(self.config.catalog.minimal_columns.clone())
            .with_contract(self.config.consumer.clone());
        let outcomes = optimizer.optimize_files(&self.config.paths.optimize);

        let failed = outcomes.iter().filter(|o| o.is_failed()).count();
        let optimized = outcomes
            .iter()
            .filter(|o| matches!(o, FileOutcome::Optimized(_)))
            .count();
        info!(
            "optimize: {} optimized, {} skipped, {} failed",
            optimized,
            outcomes.len() - optimized - failed,
            failed
        );
        outcomes
    }

    /// Dashboard rates over the region file.
    pub fn run_rates(&mut self) -> EtlResult<ActivityRates> {
        self.begin("rates");
        let plan = self
            .config
            .engine
            .scan_options()
            .and_then(|scan| LazyTable::scan(&self.config.paths.region, &scan));
        let plan = self.planned(plan)?;

        let column = self.config.consumer.timestamp_column.clone();
        let exec = self.config.engine.exec_options();
        self.materializing(|| activity_rates(&plan, &column, &exec))
    }
}
