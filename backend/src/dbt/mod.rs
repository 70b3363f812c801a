//! External transformation trigger.
//!
//! Runs the dbt build (or any configured command) to completion inside the
//! project directory. The directory is passed to the child process; the
//! current process never changes its own working directory.

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::DbtConfig;
use crate::error::{ToolError, ToolResult};
use crate::logs::{log_info, log_success};

/// Runs the post-load transformation.
#[async_trait]
pub trait Transform: Send + Sync {
    async fn transform(&self) -> ToolResult<()>;
}

/// Invokes the dbt command line.
#[derive(Debug, Clone)]
pub struct DbtRunner {
    config: DbtConfig,
}

impl DbtRunner {
    pub fn new(config: DbtConfig) -> Self {
        Self { config }
    }

    fn command_line(&self) -> String {
        std::iter::once(self.config.program.as_str())
            .chain(self.config.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Transform for DbtRunner {
    async fn transform(&self) -> ToolResult<()> {
        let project = &self.config.project_dir;
        if !project.is_dir() {
            return Err(ToolError::MissingProject(project.clone()));
        }

        log_info(format!("Running `{}` in {}", self.command_line(), project.display()));

        // stdio is inherited so the tool's own output reaches the console
        let status = Command::new(&self.config.program)
            .args(&self.config.args)
            .current_dir(project)
            .status()
            .await
            .map_err(|source| ToolError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(ToolError::Failed {
                program: self.config.program.clone(),
                status,
            });
        }

        log_success("dbt transformations successful");
        Ok(())
    }
}
