use std::process::Command;

/// Only web URLs are handed to the system opener.
fn is_web_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

/// Open a URL in the default browser.
pub fn open_in_browser(url: &str) -> Result<(), String> {
    if !is_web_url(url) {
        return Err(format!("refusing to open non-web URL {url:?}"));
    }

    let result = if cfg!(target_os = "macos") {
        Command::new("open").arg(url).status()
    } else if cfg!(target_os = "linux") {
        Command::new("xdg-open").arg(url).status()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", "", url]).status()
    } else {
        return Err("Browser open not supported on this platform".to_owned());
    };

    match result {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(format!("Browser command exited with {status}")),
        Err(e) => Err(format!("Failed to open browser: {e}")),
    }
}
