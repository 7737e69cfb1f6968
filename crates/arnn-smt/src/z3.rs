//! Z3 as an external process.
//!
//! Queries are written to a file (a temporary one unless
//! [`Z3OracleConfig::keep_queries_in`] is set) and solved with
//! `z3 -smt2 <file>`. The soft per-query timeout is passed with `-t:`, a
//! hard one with `-T:`.

use crate::encoder::{EncodedNetwork, QueryEncoder};
use crate::model_parser::{parse_model_to_map, parse_value_literal};
use crate::oracle::{Oracle, OracleOutcome, OracleStatus};
use crate::{Result, SmtError};
use arnn_core::{Bound, Network, NeuronBounds, NeuronId, NeuronValues, INF};
use arnn_propagate::Presolver;
use arnn_property::{property_to_input_bounds, BasicProperty};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration for the Z3 process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Z3OracleConfig {
    /// Path to the z3 binary. Looked up on `PATH` when unset.
    pub z3_path: Option<PathBuf>,
    /// Per-query timeout.
    pub timeout: Duration,
    /// Memory limit in MB (0 = no limit).
    pub memory_limit_mb: u32,
    /// Keep every query as `<dir>/<kind>_<n>.smt2` instead of a temporary
    /// file.
    pub keep_queries_in: Option<PathBuf>,
}

impl Default for Z3OracleConfig {
    fn default() -> Self {
        Self {
            z3_path: None,
            timeout: Duration::from_secs(60),
            memory_limit_mb: 0,
            keep_queries_in: None,
        }
    }
}

/// Status line of a `z3 -smt2` run.
pub fn parse_check_sat(stdout: &str) -> OracleStatus {
    match stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some("sat") => OracleStatus::Sat,
        Some("unsat") => OracleStatus::Unsat,
        Some("unknown") => OracleStatus::Unknown,
        Some("timeout") => OracleStatus::Timeout,
        _ => OracleStatus::Error,
    }
}

struct Z3Run {
    stdout: String,
    stderr: String,
    /// Killed by a signal rather than exiting.
    interrupted: bool,
    elapsed: Duration,
}

#[derive(Debug)]
struct Z3Process {
    config: Z3OracleConfig,
    queries: usize,
}

impl Z3Process {
    fn detect_z3(&self) -> Result<PathBuf> {
        self.config
            .z3_path
            .clone()
            .or_else(|| which::which("z3").ok())
            .ok_or_else(|| SmtError::Unavailable("z3 not found on PATH".to_string()))
    }

    fn run(&mut self, kind: &str, query: &str) -> Result<Z3Run> {
        self.queries += 1;
        // the temporary file must outlive the process
        let (_temp, path) = match &self.config.keep_queries_in {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let path = dir.join(format!("{kind}_{:04}.smt2", self.queries));
                std::fs::write(&path, query)?;
                (None, path)
            }
            None => {
                let mut file = tempfile::Builder::new().prefix(kind).suffix(".smt2").tempfile()?;
                file.write_all(query.as_bytes())?;
                let path = file.path().to_path_buf();
                (Some(file), path)
            }
        };
        self.execute(&path)
    }

    fn execute(&self, path: &Path) -> Result<Z3Run> {
        let z3 = self.detect_z3()?;
        let timeout = self.config.timeout;
        let mut cmd = Command::new(&z3);
        cmd.arg("-smt2")
            .arg(path)
            .arg(format!("-t:{}", timeout.as_millis()))
            .arg(format!("-T:{}", timeout.as_secs() + 1))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if self.config.memory_limit_mb > 0 {
            cmd.arg(format!("-memory:{}", self.config.memory_limit_mb));
        }

        let start = Instant::now();
        let output = cmd
            .output()
            .map_err(|e| SmtError::Solver(format!("failed to execute {}: {e}", z3.display())))?;
        let run = Z3Run {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            interrupted: output.status.code().is_none(),
            elapsed: start.elapsed(),
        };
        debug!(query = %path.display(), elapsed_ms = run.elapsed.as_millis() as u64, "z3 finished");
        if !run.stderr.trim().is_empty() {
            debug!(stderr = %run.stderr.trim(), "z3 stderr");
        }
        Ok(run)
    }

    fn status(&self, run: &Z3Run) -> OracleStatus {
        if run.interrupted {
            return OracleStatus::QuitRequested;
        }
        match parse_check_sat(&run.stdout) {
            OracleStatus::Unknown if run.elapsed >= self.config.timeout => OracleStatus::Timeout,
            status => status,
        }
    }
}

/// Everything after the status line.
fn after_status(stdout: &str) -> &str {
    let trimmed = stdout.trim_start();
    trimmed.find('\n').map_or("", |i| &trimmed[i + 1..])
}

// ============================================================================
// Oracle
// ============================================================================

/// [`Oracle`] answering with a Z3 process.
#[derive(Debug)]
pub struct Z3Oracle {
    process: Z3Process,
}

impl Default for Z3Oracle {
    fn default() -> Self {
        Self::new()
    }
}

impl Z3Oracle {
    pub fn new() -> Self {
        Self::with_config(Z3OracleConfig::default())
    }

    pub fn with_config(config: Z3OracleConfig) -> Self {
        Self {
            process: Z3Process { config, queries: 0 },
        }
    }

    pub fn config(&self) -> &Z3OracleConfig {
        &self.process.config
    }

    /// The SMT-LIB query [`Oracle::check`] submits.
    pub fn query(network: &Network, property: &BasicProperty) -> Result<(EncodedNetwork, String)> {
        let mut encoded = QueryEncoder::new().encode(network)?;
        encoded.assert_property(property)?;
        let query = encoded.to_query(&["(set-option :produce-models true)"], &["(check-sat)", "(get-model)"]);
        Ok((encoded, query))
    }

    fn solve(&mut self, network: &Network, property: &BasicProperty) -> Result<OracleOutcome> {
        let (encoded, query) = Self::query(network, property)?;
        let run = self.process.run("query", &query)?;
        let status = self.process.status(&run);
        info!(%status, elapsed_ms = run.elapsed.as_millis() as u64, "z3 answered");
        if status != OracleStatus::Sat {
            if status == OracleStatus::Error {
                warn!(stdout = %run.stdout.trim(), "z3 reported an error");
            }
            return Ok(OracleOutcome::without_assignment(status));
        }

        let model = parse_model_to_map(after_status(&run.stdout))
            .ok_or_else(|| SmtError::Model(run.stdout.lines().take(3).collect::<Vec<_>>().join("; ")))?;
        let input_bounds = property_to_input_bounds(property);
        let mut assignment = NeuronValues::new();
        for (id, var) in encoded.input_vars() {
            let value = match model.get(var) {
                Some(value) => *value,
                // unconstrained inputs are left out of the model
                None => unconstrained_value(input_bounds.get(id)),
            };
            assignment.insert(id.clone(), value);
        }
        Ok(OracleOutcome::sat(assignment))
    }
}

fn unconstrained_value(bound: Option<&Bound>) -> f64 {
    match bound {
        Some(b) if b.lower <= b.upper => 0.0_f64.clamp(b.lower, b.upper),
        _ => 0.0,
    }
}

impl Oracle for Z3Oracle {
    fn check(&mut self, network: &Network, property: &BasicProperty) -> arnn_core::Result<OracleOutcome> {
        Ok(self.solve(network, property)?)
    }
}

// ============================================================================
// Presolver
// ============================================================================

/// [`Presolver`] running Z3's optimizer: every input and output neuron is
/// minimized and maximized independently under the known bounds.
#[derive(Debug)]
pub struct Z3Presolver {
    process: Z3Process,
}

impl Z3Presolver {
    pub fn new(config: Z3OracleConfig) -> Self {
        Self {
            process: Z3Process { config, queries: 0 },
        }
    }

    fn tighten(&mut self, network: &Network, bounds: &NeuronBounds) -> Result<NeuronBounds> {
        let mut encoded = QueryEncoder::new().encode(network)?;
        encoded.assert_bounds(bounds)?;
        let targets: Vec<NeuronId> = network.input_ids().iter().chain(network.output_ids()).cloned().collect();
        let mut objectives = Vec::with_capacity(2 * targets.len());
        for id in &targets {
            let var = encoded.var(id)?;
            objectives.push(format!("(minimize {var})"));
            objectives.push(format!("(maximize {var})"));
        }
        let mut commands: Vec<&str> = objectives.iter().map(String::as_str).collect();
        commands.extend(["(check-sat)", "(get-objectives)"]);
        let query = encoded.to_query(&["(set-option :opt.priority box)"], &commands);

        let run = self.process.run("presolve", &query)?;
        let status = self.process.status(&run);
        let known = |id: &NeuronId| bounds.get(id).copied().unwrap_or_else(Bound::unbounded);
        match status {
            OracleStatus::Sat => {}
            OracleStatus::Unsat => {
                warn!("presolve query is infeasible; keeping the known bounds");
                return Ok(targets.iter().map(|id| (id.clone(), known(id))).collect());
            }
            other => return Err(SmtError::Solver(format!("presolve ended with {other}"))),
        }

        let values = parse_objectives(after_status(&run.stdout));
        if values.len() != objectives.len() {
            return Err(SmtError::Model(format!(
                "expected {} objectives, got {}",
                objectives.len(),
                values.len()
            )));
        }
        let mut tightened = NeuronBounds::new();
        for (k, id) in targets.iter().enumerate() {
            let lower = values[2 * k].unwrap_or(-INF);
            let upper = values[2 * k + 1].unwrap_or(INF);
            let bound = known(id);
            let lower = lower.max(bound.lower);
            let upper = upper.min(bound.upper);
            let bound = if lower <= upper { Bound::new(lower, upper) } else { bound };
            tightened.insert(id.clone(), bound);
        }
        debug!(neurons = tightened.len(), "presolve tightened bounds");
        Ok(tightened)
    }
}

impl Presolver for Z3Presolver {
    fn presolve(&mut self, network: &Network, bounds: &NeuronBounds) -> arnn_core::Result<NeuronBounds> {
        Ok(self.tighten(network, bounds)?)
    }
}

/// Values listed by `(get-objectives)`, in order. Unbounded or symbolic
/// values (`oo`, `epsilon`) are `None`.
fn parse_objectives(output: &str) -> Vec<Option<f64>> {
    let Some(start) = output.find("(objectives") else {
        return Vec::new();
    };
    let body = &output[start + "(objectives".len()..];
    let mut values = Vec::new();
    let mut depth = 0usize;
    let mut entry_start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '(' => {
                if depth == 0 {
                    entry_start = i + 1;
                }
                depth += 1;
            }
            ')' if depth == 0 => break,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let entry = body[entry_start..i].trim();
                    let value = entry
                        .split_once(char::is_whitespace)
                        .and_then(|(_, value)| parse_value_literal(value));
                    values.push(value);
                }
            }
            _ => {}
        }
    }
    values
}
