#[cfg(test)]
pub mod fake;
mod launcher;

pub use launcher::{
    ExitReport, LaunchError, LaunchedPipeline, PipelineHandle, PipelineSignal, ProcessLauncher,
    ShellLauncher,
};
