//! Post-deployment verification.
//!
//! Every check runs, and every failure is reported; a failing check never
//! stops the others.

use deck_core::{CheckConfig, Resource, ResourceKind, WorkloadSpec};
use thiserror::Error;
use tracing::{info, warn};

use crate::env::resolve_env;
use crate::plane::ControlPlane;
use crate::routes::RouteTable;

/// A post-deployment check that did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("check `{check}` failed: {reason}")]
pub struct VerificationError {
    pub check: String,
    pub reason: String,
}

/// Default connectivity probe run inside the application workload.
pub const DEFAULT_DATABASE_PROBE: [&str; 5] = ["python", "manage.py", "check", "--database", "default"];

/// Run all checks and return the failures.
pub fn verify(plane: &dyn ControlPlane, checks: &[CheckConfig]) -> Vec<VerificationError> {
    let mut failures = Vec::new();
    for check in checks {
        match run_check(plane, check) {
            Ok(()) => info!(check = check.name(), "check passed"),
            Err(failure) => {
                warn!(check = check.name(), reason = %failure.reason, "check failed");
                failures.push(failure);
            }
        }
    }
    failures
}

pub fn run_check(plane: &dyn ControlPlane, check: &CheckConfig) -> Result<(), VerificationError> {
    let fail = |reason: String| VerificationError {
        check: check.name().to_string(),
        reason,
    };
    match check {
        CheckConfig::Database {
            workload,
            host_env,
            port_env,
            command,
            ..
        } => {
            let app = live_workload(plane, workload).map_err(fail)?;
            let env = resolve_env(plane, &app).map_err(|e| fail(e.to_string()))?;
            let host = env
                .get(host_env)
                .ok_or_else(|| fail(format!("`{workload}` does not set {host_env}")))?;
            let port: u16 = env
                .get(port_env)
                .ok_or_else(|| fail(format!("`{workload}` does not set {port_env}")))?
                .parse()
                .map_err(|_| fail(format!("{port_env} is not a port number")))?;

            let address = match plane.get(ResourceKind::Address, host) {
                Ok(Some(Resource::Address(address))) => address,
                Ok(_) => return Err(fail(format!("host `{host}` is not an internal address"))),
                Err(e) => return Err(fail(e.to_string())),
            };
            if !address.exposes(port) {
                return Err(fail(format!("address `{host}` does not expose port {port}")));
            }
            live_workload(plane, &address.workload).map_err(fail)?;

            let probe: Vec<String> = match command {
                Some(command) => command.clone(),
                None => DEFAULT_DATABASE_PROBE.iter().map(|s| s.to_string()).collect(),
            };
            exec_ok(plane, workload, &probe).map_err(fail)
        }

        CheckConfig::Route { route, .. } => {
            let spec = match plane.get(ResourceKind::Route, route) {
                Ok(Some(Resource::Route(spec))) => spec,
                Ok(_) => return Err(fail(format!("route `{route}` does not exist"))),
                Err(e) => return Err(fail(e.to_string())),
            };
            let address = match plane.get(ResourceKind::Address, &spec.address) {
                Ok(Some(Resource::Address(address))) => address,
                Ok(_) => return Err(fail(format!("address `{}` does not exist", spec.address))),
                Err(e) => return Err(fail(e.to_string())),
            };
            if !address.exposes(spec.port) {
                return Err(fail(format!(
                    "address `{}` does not expose port {}",
                    address.name, spec.port
                )));
            }
            live_workload(plane, &address.workload).map_err(fail)?;

            let table = RouteTable::from_plane(plane).map_err(|e| fail(e.to_string()))?;
            match table.resolve(&spec.host, &spec.path) {
                Some(target) if target.route == spec.name => Ok(()),
                Some(target) => Err(fail(format!(
                    "{}{} is shadowed by route `{}`",
                    spec.host, spec.path, target.route
                ))),
                None => Err(fail(format!("{}{} does not resolve", spec.host, spec.path))),
            }
        }

        CheckConfig::Exec {
            workload, command, ..
        } => exec_ok(plane, workload, command).map_err(fail),
    }
}

/// The workload, if it exists and has at least one replica.
fn live_workload(plane: &dyn ControlPlane, name: &str) -> Result<WorkloadSpec, String> {
    match plane.get(ResourceKind::Workload, name) {
        Ok(Some(Resource::Workload(w))) if w.replicas > 0 => Ok(w),
        Ok(Some(_)) => Err(format!("workload `{name}` has no replicas")),
        Ok(None) => Err(format!("workload `{name}` does not exist")),
        Err(e) => Err(e.to_string()),
    }
}

fn exec_ok(plane: &dyn ControlPlane, workload: &str, command: &[String]) -> Result<(), String> {
    let output = plane.exec(workload, command).map_err(|e| e.to_string())?;
    if output.success() {
        Ok(())
    } else {
        Err(format!(
            "`{}` exited with {}: {}",
            command.join(" "),
            output.exit_code,
            output.stderr.trim()
        ))
    }
}
