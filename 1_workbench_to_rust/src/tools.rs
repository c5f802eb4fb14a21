use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use anyhow::{Result, anyhow, Context};
use tracing::debug;

/// Manages the external binaries used to split CIFTI files and query volumetric atlases.
#[derive(Debug, Clone)]
pub struct ExternalTools {
    /// Connectome Workbench `wb_command`.
    pub wb_command: Option<PathBuf>,
    /// FSL `atlasquery`. Only required for the built-in volumetric atlases.
    pub atlasquery: Option<PathBuf>,
}

impl ExternalTools {
    /// Locates the binaries from environment overrides, then the system PATH.
    ///
    /// A binary that cannot be found is only an error once something tries to run it.
    pub fn new() -> Result<Self> {
        // Environment override -> System PATH
        let wb_command = match env::var_os("WB_COMMAND") {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    return Err(anyhow!("wb_command missing at {:?}. Please check WB_COMMAND.", path));
                }
                Some(path)
            }
            None => which::which("wb_command").ok(),
        };

        let atlasquery = env::var_os("FSLDIR")
            .map(|dir| PathBuf::from(dir).join("bin").join("atlasquery"))
            .filter(|path| path.exists())
            .or_else(|| which::which("atlasquery").ok());

        Ok(Self { wb_command, atlasquery })
    }

    /// Returns `wb_command` or explains how to make it available.
    pub fn wb_command(&self) -> Result<&Path> {
        self.wb_command
            .as_deref()
            .ok_or_else(|| anyhow!("'wb_command' not found in PATH. Install Connectome Workbench or set WB_COMMAND."))
    }

    /// Returns the `atlasquery` binary or explains how to make it available.
    pub fn atlasquery(&self) -> Result<&Path> {
        self.atlasquery
            .as_deref()
            .ok_or_else(|| anyhow!("FSL 'atlasquery' not found. Set FSLDIR or add $FSLDIR/bin to PATH."))
    }

    /// Runs `wb_command` with the given arguments.
    pub fn wb<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run_cmd(self.wb_command()?, args)
    }

    /// Executes a command to completion and returns its trimmed stdout.
    ///
    /// There is no timeout: a hung tool hangs the caller.
    pub fn run_cmd<I, S>(&self, program: &Path, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(program);
        cmd.args(args);

        // FSL tools pick their output format from the environment
        cmd.env("FSLOUTPUTTYPE", "NIFTI_GZ");

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!(program = %program.display(), args = ?cmd.get_args().collect::<Vec<_>>(), "running external tool");

        let output = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {:?}", program))?
            .wait_with_output()
            .with_context(|| format!("Failed to wait for {:?}", program))?;

        if !output.status.success() {
            let err_msg = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Command failed: {:?} ({})\nStderr: {}", program, output.status, err_msg.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Fails when a tool exited cleanly but left no output behind.
pub fn ensure_output(path: &Path, program: &str) -> Result<()> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("{} produced no output at {:?}", program, path))?;
    if meta.len() == 0 {
        return Err(anyhow!("{} produced an empty output file at {:?}", program, path));
    }
    Ok(())
}
