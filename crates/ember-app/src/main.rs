//! Binary entry point for the `ember` launcher.
//!
//! Registers the built-in heartbeat deployable and hands control to
//! [`Application`]. On a successful launch the process stays alive for
//! as long as the runtime runs; failures exit with the launch error's
//! classified code.

use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use tracing::info;

use ember_app::{Application, Deployable, DeployError, DeploymentContext, LaunchOutcome};

/// Minimal built-in deployable that logs a pulse on a fixed interval.
///
/// Useful for exercising the launcher end to end without writing a
/// deployable first: `ember ember:heartbeat --instances 2`.
struct Heartbeat;

impl Deployable for Heartbeat {
    fn start(&mut self, context: &DeploymentContext) -> Result<(), DeployError> {
        let instance = context.instance();
        info!(target: "ember::heartbeat", instance, "heartbeat started");
        thread::Builder::new()
            .name(format!("heartbeat-{instance}"))
            .spawn(move || {
                loop {
                    thread::sleep(Duration::from_secs(30));
                    info!(target: "ember::heartbeat", instance, "pulse");
                }
            })
            .map_err(DeployError::from)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeployError> {
        info!(target: "ember::heartbeat", "heartbeat stopped");
        Ok(())
    }
}

fn main() -> ExitCode {
    let mut application = Application::from_env()
        .with_deployable("ember:heartbeat", || Box::new(Heartbeat) as Box<dyn Deployable>);
    match application.launch() {
        LaunchOutcome::Running(launched) => {
            // Holding the handle keeps the runtime alive; parking keeps
            // the process alive until it is terminated externally.
            let _running = launched;
            loop {
                thread::park();
            }
        }
        LaunchOutcome::Exited(code) => ExitCode::from(code),
    }
}
