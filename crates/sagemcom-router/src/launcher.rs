//! Opening the router's admin interface in a browser.

use sagemcom_core::{Error, Result};
use std::process::{Command, Stdio};
use tracing::info;
use url::Url;

/// Hands a URL to something that can show it to a person.
#[cfg_attr(test, mockall::automock)]
pub trait AdminLauncher: Send + Sync {
    /// Open `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LaunchFailed`] if no handler could be started.
    fn open(&self, url: &Url) -> Result<()>;
}

/// The desktop's default URL handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

#[cfg(target_os = "macos")]
fn handler_command(url: &Url) -> Command {
    let mut command = Command::new("open");
    command.arg(url.as_str());
    command
}

#[cfg(target_os = "windows")]
fn handler_command(url: &Url) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", "", url.as_str()]);
    command
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn handler_command(url: &Url) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(url.as_str());
    command
}

impl AdminLauncher for SystemBrowser {
    fn open(&self, url: &Url) -> Result<()> {
        let mut command = handler_command(url);
        let program = command.get_program().to_string_lossy().into_owned();
        // The handler outlives us; it is spawned and not waited for.
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::LaunchFailed(format!("could not start `{program}` for {url}: {e}"))
            })?;
        info!(%url, "opened router admin interface");
        Ok(())
    }
}
