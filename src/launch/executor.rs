//! Ways of starting an assembled [`LaunchCommand`].

use super::command::LaunchCommand;
use crate::error::{Error, Result};
use crate::preflight;
use crate::process::{ExitOutcome, ProcessSupervisor};
use std::io::Write;
use tracing::debug;

/// Result of handing a command to an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The platform ran as a supervised child process.
    Supervised(ExitOutcome),
    /// Another component took over the launch.
    Delegated,
}

/// Starts the platform described by a command.
pub trait LaunchExecutor {
    fn execute(&mut self, command: &LaunchCommand) -> Result<LaunchOutcome>;
}

impl<E: LaunchExecutor + ?Sized> LaunchExecutor for &mut E {
    fn execute(&mut self, command: &LaunchCommand) -> Result<LaunchOutcome> {
        (**self).execute(command)
    }
}

/// Runs `java` as a child process and waits for it.
pub struct ProcessExecutor {
    supervisor: Option<ProcessSupervisor>,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self { supervisor: None }
    }

    /// Use a preconfigured supervisor for the first launch.
    pub fn with_supervisor(supervisor: ProcessSupervisor) -> Self {
        Self {
            supervisor: Some(supervisor),
        }
    }
}

impl LaunchExecutor for ProcessExecutor {
    fn execute(&mut self, command: &LaunchCommand) -> Result<LaunchOutcome> {
        preflight::check_java(command.java()?)?;
        let command_line = command.to_command_line()?;
        debug!("start command line {command_line:?}");
        let supervisor = self.supervisor.take().unwrap_or_default();
        supervisor
            .run(&command_line, &command.working_directory)
            .map(LaunchOutcome::Supervised)
    }
}

/// Starts a JVM some other way, such as in-process or remotely.
pub trait JavaRunner {
    fn exec(
        &mut self,
        vm_options: &[String],
        classpath: &[String],
        main_class: &str,
        arguments: &[String],
    ) -> Result<()>;
}

impl<R: JavaRunner + ?Sized> JavaRunner for &mut R {
    fn exec(
        &mut self,
        vm_options: &[String],
        classpath: &[String],
        main_class: &str,
        arguments: &[String],
    ) -> Result<()> {
        (**self).exec(vm_options, classpath, main_class, arguments)
    }
}

/// Hands the command's parts to a [`JavaRunner`].
pub struct RunnerExecutor<R> {
    runner: R,
}

impl<R: JavaRunner> RunnerExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn into_inner(self) -> R {
        self.runner
    }
}

impl<R: JavaRunner> LaunchExecutor for RunnerExecutor<R> {
    fn execute(&mut self, command: &LaunchCommand) -> Result<LaunchOutcome> {
        let classpath = command.classpath_entries();
        debug!("start via runner [{}]", command.main_class);
        debug!("vm options     {:?}", command.vm_options);
        debug!("classpath      {classpath:?}");
        debug!("arguments      {:?}", command.arguments);
        self.runner.exec(
            &command.vm_options,
            &classpath,
            &command.main_class,
            &command.arguments,
        )?;
        Ok(LaunchOutcome::Delegated)
    }
}

/// Writes the command as JSON instead of running it.
pub struct DryRunExecutor<W> {
    out: W,
}

impl<W: Write> DryRunExecutor<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> LaunchExecutor for DryRunExecutor<W> {
    fn execute(&mut self, command: &LaunchCommand) -> Result<LaunchOutcome> {
        let write = |out: &mut W| -> std::io::Result<()> {
            serde_json::to_writer_pretty(&mut *out, command)?;
            writeln!(out)?;
            out.flush()
        };
        write(&mut self.out).map_err(|e| Error::io("writing launch command", e))?;
        Ok(LaunchOutcome::Delegated)
    }
}
