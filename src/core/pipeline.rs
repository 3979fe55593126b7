//! Deploy pipeline: filter, stamp, transfer, restart, verify.
//!
//! A run walks `Step::ALL` in order and stops at the first failing step.
//! Nothing is retried and nothing is rolled back; a failed run needs a new
//! trigger event. The outcome is always a `RunReport`, never a panic or a
//! bare error, so callers can print it whatever happened.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::clock::{format_stamp, Clock};
use crate::config::DeployConfig;
use crate::credential::Redactor;
use crate::error::{ErrorCategory, Hint, Result};
use crate::marker::Marker;
use crate::remote::{CommandRecord, ServiceControl};
use crate::ssh::{Connector, RemoteShell};
use crate::transfer::{self, TransferRequest};
use crate::trigger::{SkipReason, TriggerDecision, TriggerEvent};
use crate::utils::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Filtering,
    Injecting,
    Transferring,
    Restarting,
    Verifying,
    Success,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Filter,
    Inject,
    Transfer,
    Restart,
    Verify,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Filter,
        Step::Inject,
        Step::Transfer,
        Step::Restart,
        Step::Verify,
    ];

    pub fn state(self) -> RunState {
        match self {
            Step::Filter => RunState::Filtering,
            Step::Inject => RunState::Injecting,
            Step::Transfer => RunState::Transferring,
            Step::Restart => RunState::Restarting,
            Step::Verify => RunState::Verifying,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Filter => "filter",
            Step::Inject => "inject",
            Step::Transfer => "transfer",
            Step::Restart => "restart",
            Step::Verify => "verify",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub detail: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    pub step: Step,
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub details: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<Hint>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub branch: String,
    pub stamp: String,
    /// RFC 3339, UTC.
    pub started_at: String,
    pub status: RunStatus,
    pub states: Vec<RunState>,
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

impl RunReport {
    fn start(run_id: String, event: &TriggerEvent, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            commit: event.commit.clone(),
            branch: event.branch.clone(),
            stamp: format_stamp(started_at),
            started_at: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            status: RunStatus::Failed,
            states: vec![RunState::Idle],
            steps: Vec::new(),
            skip_reason: None,
            status_output: None,
            failure: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// 0 for success and skipped runs, 1 for a failed run.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Success | RunStatus::Skipped => 0,
            RunStatus::Failed => 1,
        }
    }

    /// Step the run stopped in, if it failed.
    pub fn failed_step(&self) -> Option<Step> {
        self.failure.as_ref().map(|f| f.step)
    }

    /// True if `step` ran, whatever its outcome.
    pub fn reached(&self, step: Step) -> bool {
        self.states.contains(&step.state())
    }
}

enum Outcome {
    Deployed,
    Skipped(SkipReason),
}

/// One deploy run against one remote target.
pub struct Pipeline<'a> {
    config: DeployConfig,
    connector: &'a dyn Connector,
    clock: &'a dyn Clock,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: DeployConfig, connector: &'a dyn Connector, clock: &'a dyn Clock) -> Self {
        Self {
            config,
            connector,
            clock,
        }
    }

    /// Run every step for `event`. The config (and its credential) is
    /// dropped when the run ends.
    pub fn run(self, event: TriggerEvent) -> RunReport {
        let run_id = Uuid::new_v4().simple().to_string();
        let mut report = RunReport::start(run_id, &event, self.clock.now());
        let redactor = self.config.secrets.redactor();

        log_status!(
            "pipeline",
            "Run {} on {}{}",
            report.run_id,
            event.branch,
            event
                .commit
                .as_deref()
                .map(|c| format!(" @ {}", c))
                .unwrap_or_default()
        );

        match self.drive(&event, &redactor, &mut report) {
            Ok(Outcome::Deployed) => {
                report.states.push(RunState::Success);
                report.status = RunStatus::Success;
                log_status!("pipeline", "Run {} succeeded", report.run_id);
            }
            Ok(Outcome::Skipped(reason)) => {
                log_status!("pipeline", "Skipped: {}", reason);
                report.states.push(RunState::Skipped);
                report.status = RunStatus::Skipped;
                report.skip_reason = Some(reason);
            }
            Err(err) => {
                let step = report
                    .steps
                    .last()
                    .map(|record| record.step)
                    .unwrap_or(Step::Filter);
                let failure = RunFailure {
                    step,
                    category: err.category(),
                    code: err.code.as_str().to_string(),
                    message: redactor.redact(&err.message),
                    details: redactor.redact_value(&err.details),
                    hints: err
                        .hints
                        .iter()
                        .map(|h| Hint {
                            message: redactor.redact(&h.message),
                        })
                        .collect(),
                };
                log_status!(
                    "pipeline",
                    "Run {} failed at {}: {} ({})",
                    report.run_id,
                    step.as_str(),
                    failure.message,
                    failure.code
                );
                report.states.push(RunState::Failed);
                report.status = RunStatus::Failed;
                report.failure = Some(failure);
            }
        }

        report
    }

    fn drive(
        &self,
        event: &TriggerEvent,
        redactor: &Redactor<'_>,
        report: &mut RunReport,
    ) -> Result<Outcome> {
        let settings = &self.config.settings;

        let decision = execute(report, Step::Filter, || {
            let decision = settings.trigger_policy().evaluate(event);
            let detail = serde_json::to_value(&decision).unwrap_or(Value::Null);
            Ok((decision, detail))
        })?;
        if let TriggerDecision::Skip { reason } = decision {
            if let Some(record) = report.steps.last_mut() {
                record.status = StepStatus::Skipped;
            }
            return Ok(Outcome::Skipped(reason));
        }

        let stamp = report.stamp.clone();
        let artifact = execute(report, Step::Inject, || self.inject(&stamp))?;

        let remote = self.connector.open(&self.config);
        let run_id = report.run_id.clone();
        execute(report, Step::Transfer, || {
            self.transfer(remote.as_ref(), artifact.as_bytes(), &run_id, redactor)
        })?;

        let control = ServiceControl::new(
            remote.as_ref(),
            &settings.remote.service,
            settings.remote.privilege,
            &self.config.secrets.credential,
            redactor,
        );

        execute(report, Step::Restart, || {
            let record = control.restart()?;
            Ok(((), command_detail(&record)))
        })?;

        let delay = settings.remote.status_delay_secs;
        let status = execute(report, Step::Verify, || {
            if delay > 0 {
                log_status!("remote", "Waiting {}s before status query", delay);
                std::thread::sleep(Duration::from_secs(delay));
            }
            let record = control.status()?;
            let detail = command_detail(&record);
            Ok((record, detail))
        });

        match status {
            Ok(record) => {
                report.status_output = Some(record.stdout);
                Ok(Outcome::Deployed)
            }
            Err(err) => {
                report.status_output = err.details["stdout"].as_str().map(|s| s.to_string());
                Err(err)
            }
        }
    }

    fn inject(&self, stamp: &str) -> Result<(String, Value)> {
        let artifact = &self.config.settings.artifact;
        let path = Path::new(&artifact.path);

        let marker = Marker::new(&artifact.marker_key)?;
        let original = io::read_file(path, "read artifact")?;
        let previous = marker.locate(&original)?;
        let stamped = marker.inject(&original, stamp)?;

        let written = artifact.write_back && stamped != original;
        if written {
            io::write_file_atomic(path, &stamped, "write stamped artifact")?;
        }

        log_status!(
            "inject",
            "{}:{} {} = \"{}\"",
            artifact.path,
            previous.line,
            marker.key(),
            stamp
        );

        let detail = serde_json::json!({
            "path": artifact.path,
            "line": previous.line,
            "previous": previous.value,
            "stamp": stamp,
            "written": written,
        });
        Ok((stamped, detail))
    }

    fn transfer(
        &self,
        remote: &dyn RemoteShell,
        bytes: &[u8],
        run_id: &str,
        redactor: &Redactor<'_>,
    ) -> Result<((), Value)> {
        let destination = self.config.destination()?;
        let settings = &self.config.settings.transfer;
        let request = TransferRequest {
            destination: &destination,
            run_id,
            atomic: settings.atomic,
            verify_checksum: settings.verify_checksum,
        };

        let receipt = transfer::transfer(remote, bytes, &request, redactor)?;
        Ok(((), serde_json::to_value(&receipt).unwrap_or(Value::Null)))
    }
}

/// Run one step, recording its state transition, duration and outcome.
fn execute<T>(
    report: &mut RunReport,
    step: Step,
    body: impl FnOnce() -> Result<(T, Value)>,
) -> Result<T> {
    report.states.push(step.state());
    log_status!("pipeline", "Step {}", step.as_str());

    let started = Instant::now();
    let result = body();
    let duration_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok((value, detail)) => {
            report.steps.push(StepRecord {
                step,
                status: StepStatus::Ok,
                duration_ms,
                detail,
            });
            Ok(value)
        }
        Err(err) => {
            report.steps.push(StepRecord {
                step,
                status: StepStatus::Failed,
                duration_ms,
                detail: Value::Null,
            });
            Err(err)
        }
    }
}

fn command_detail(record: &CommandRecord) -> Value {
    serde_json::json!({
        "command": record.command,
        "exitCode": record.exit_code,
    })
}
