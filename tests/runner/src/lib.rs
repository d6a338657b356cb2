//! Test harness binary: every registered case becomes one libtest trial run
//! on the local wgpu adapter, strictly one at a time.

use anyhow::{Context, Result};
use libtest_mimic::{Arguments, Failed, Trial};
use report::{Report, Summary};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use subgroup_cts::{
    CaseDefinition, CaseOutcome, Device, HarnessConfig, Orchestrator, Support, TestStatus, registry,
};
use subgroup_cts_wgpu::WgpuDevice;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

mod report;

/// State shared by all trials.
struct Session {
    device: WgpuDevice,
    config: HarnessConfig,
    outcomes: Mutex<Vec<CaseOutcome>>,
    /// Set once the device is lost or the harness hits a bug; every later
    /// trial fails without touching the device.
    aborted: AtomicBool,
}

impl Session {
    fn record(&self, outcome: CaseOutcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push(outcome);
        }
    }

    fn run_case(&self, case: &CaseDefinition) -> Result<(), Failed> {
        if self.aborted.load(Ordering::SeqCst) {
            return Err("aborted after a fatal error".into());
        }
        let outcome = match Orchestrator::new(&self.device, &self.config).run(case) {
            Ok(outcome) => outcome,
            Err(err) => {
                if err.is_fatal() {
                    error!("{}: {err}, aborting the run", case.name());
                    self.aborted.store(true, Ordering::SeqCst);
                }
                let outcome = CaseOutcome::failed(case.name(), err.to_string());
                self.record(outcome);
                return Err(err.to_string().into());
            }
        };
        let status = outcome.status.clone();
        self.record(outcome);
        match status {
            TestStatus::Pass => Ok(()),
            TestStatus::NotSupported(reason) => {
                info!("{}: not supported: {reason}", case.name());
                Ok(())
            }
            TestStatus::Fail(reason) => Err(reason.into()),
        }
    }
}

/// libtest filters match `::`-separated names.
fn trial_name(case: &CaseDefinition) -> String {
    case.name().replace('/', "::")
}

pub fn run() -> Result<ExitCode> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set global subscriber")?;

    let mut args = Arguments::from_args();
    // One submission in flight at a time.
    args.test_threads = Some(1);
    if let Some(filter) = &mut args.filter {
        *filter = filter.replace('/', "::");
    }

    let cases = registry::all_cases();
    if args.list {
        let trials = cases
            .iter()
            .map(|case| Trial::test(trial_name(case), || Ok(())))
            .collect();
        return Ok(libtest_mimic::run(&args, trials).exit_code());
    }

    let config = HarnessConfig::from_env().context("loading the harness configuration")?;
    config.validate()?;
    let device = WgpuDevice::new()?;
    let session = Arc::new(Session {
        device,
        config,
        outcomes: Mutex::new(Vec::new()),
        aborted: AtomicBool::new(false),
    });
    debug!("{} registered cases", cases.len());

    let orchestrator = Orchestrator::new(&session.device, &session.config);
    let trials = cases
        .into_iter()
        .map(|case| {
            let name = trial_name(&case);
            let kind = case.operation().family();
            match orchestrator.support(&case) {
                Support::NotSupported(reason) => {
                    session.record(CaseOutcome::not_supported(case.name(), reason));
                    Trial::test(name, || Ok(())).with_kind(kind).with_ignored_flag(true)
                }
                Support::Supported | Support::Broken(_) => {
                    let session = Arc::clone(&session);
                    Trial::test(name, move || session.run_case(&case)).with_kind(kind)
                }
            }
        })
        .collect();
    let conclusion = libtest_mimic::run(&args, trials);

    let outcomes = session
        .outcomes
        .lock()
        .map(|outcomes| outcomes.clone())
        .unwrap_or_default();
    let summary = Summary::of(&outcomes);
    info!(
        "{} passed, {} failed, {} not supported; {} results checked, {} unverified",
        summary.passed, summary.failed, summary.not_supported, summary.checked, summary.unverified
    );
    if let Some(table) = report::failure_table(&outcomes) {
        println!("\n{table}");
    }
    if let Some(path) = &session.config.report_path {
        let info = session.device.adapter_info();
        Report {
            adapter: info.name.clone(),
            backend: format!("{:?}", info.backend),
            dialect: session.device.dialect().to_string(),
            seed: session.config.seed,
            summary,
            cases: &outcomes,
        }
        .write(path)?;
        info!("report written to {}", path.display());
    }
    Ok(conclusion.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use subgroup_cts::op::{QuadOp, Operation};
    use subgroup_cts::{Format, ResultMode, ShaderStage, StageTarget};

    #[test]
    fn trial_names_use_path_separators() {
        let case = CaseDefinition::new(
            Operation::Quad(QuadOp::SwapVertical),
            Format::u32(),
            StageTarget::Framebuffer(ShaderStage::TessEval),
            ResultMode::CheckMask,
        )
        .unwrap();
        let name = trial_name(&case);
        assert!(!name.contains('/'), "{name}");
        assert!(name.ends_with("::framebuffer::tese"), "{name}");
    }
}
