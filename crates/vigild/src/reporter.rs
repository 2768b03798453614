//! Health report sink for the agent: one JSON line per report on stdout,
//! then the task's `on_status` hooks.

use std::io::Write;
use std::sync::{Arc, Mutex};

use tracing::error;

use vigil_health::{HealthReport, StatusReporter};
use vigil_hooks::{Hooks, TaskContext, TaskLifecycleHook};

pub struct JsonLinesReporter<W> {
    out: Mutex<W>,
    task: TaskContext,
    hooks: Arc<Hooks>,
}

impl JsonLinesReporter<std::io::Stdout> {
    pub fn stdout(task: TaskContext, hooks: Arc<Hooks>) -> Self {
        Self::new(std::io::stdout(), task, hooks)
    }
}

impl<W: Write + Send> JsonLinesReporter<W> {
    pub fn new(out: W, task: TaskContext, hooks: Arc<Hooks>) -> Self {
        Self {
            out: Mutex::new(out),
            task,
            hooks,
        }
    }

    fn write_line(&self, report: &HealthReport) -> anyhow::Result<()> {
        let line = serde_json::to_string(report)?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow::anyhow!("report writer poisoned"))?;
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> StatusReporter for JsonLinesReporter<W> {
    fn on_health_report(&self, report: HealthReport) {
        if let Err(e) = self.write_line(&report) {
            error!(task_id = %report.task_id, error = %e, "failed to write health report");
        }
        self.hooks.on_status(&self.task, &report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_health::ProbeOutcome;

    #[test]
    fn reports_written_as_json_lines() {
        let reporter = JsonLinesReporter::new(
            Vec::new(),
            TaskContext::new("web-1", "web"),
            Arc::new(Hooks::default()),
        );

        reporter.on_health_report(HealthReport::from_outcome(
            "web-1",
            &ProbeOutcome::unhealthy("exit status = 1"),
            1,
        ));
        reporter.on_health_report(HealthReport::terminated("web-1", 1, "killed"));

        let out = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["healthy"], false);
        assert_eq!(lines[0]["consecutive_failures"], 1);
        assert_eq!(lines[0]["error"], "exit status = 1");
        assert_eq!(lines[1]["terminated"], true);
    }
}
