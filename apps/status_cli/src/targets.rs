//! Render targets and notifier used by the binary.

use std::{ffi::OsString, fs, io::Write, path::PathBuf};

use status_core::{render_html, render_text, Controls, Notifier, RenderState, RenderTarget};
use tracing::warn;

pub struct TerminalTarget {
    show_transient: bool,
}

impl TerminalTarget {
    pub fn new(show_transient: bool) -> Self {
        Self { show_transient }
    }
}

impl RenderTarget for TerminalTarget {
    fn render(&self, state: &RenderState, controls: Controls) {
        if !self.show_transient && state.is_loading() {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}\n", render_text(state, controls));
    }
}

pub struct HtmlFileTarget {
    path: PathBuf,
}

impl HtmlFileTarget {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn staging_path(&self) -> PathBuf {
        let mut staged = OsString::from(self.path.as_os_str());
        staged.push(".tmp");
        PathBuf::from(staged)
    }

    /// Readers of the page only ever see a complete previous or next version.
    fn replace_page(&self, page: &str) -> std::io::Result<()> {
        let staged = self.staging_path();
        fs::write(&staged, page)?;
        fs::rename(&staged, &self.path).inspect_err(|_| {
            let _ = fs::remove_file(&staged);
        })
    }
}

impl RenderTarget for HtmlFileTarget {
    fn render(&self, state: &RenderState, controls: Controls) {
        let view = render_html(state, controls);
        let page = format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>Connection Status</title></head>\n<body>\n<div id=\"statusHeader\">{}</div>\n<div id=\"statusContent\">{}</div>\n<div id=\"statusControls\">{}</div>\n</body>\n</html>\n",
            view.header, view.content, view.controls
        );
        if let Err(err) = self.replace_page(&page) {
            warn!(path = %self.path.display(), error = %err, "failed to write status page");
        }
    }
}

pub struct MultiTarget(pub Vec<Box<dyn RenderTarget>>);

impl RenderTarget for MultiTarget {
    fn render(&self, state: &RenderState, controls: Controls) {
        for target in &self.0 {
            target.render(state, controls);
        }
    }
}

// The caller prints the final state itself.
pub struct QuietTarget;

impl RenderTarget for QuietTarget {
    fn render(&self, _state: &RenderState, _controls: Controls) {}
}

pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn alert(&self, message: &str) {
        warn!(%message, "operator alert");
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "ALERT: {message}");
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    #[test]
    fn html_target_writes_page_regions() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("bridge_status_page_{suffix}.html"));
        let target = HtmlFileTarget::new(path.clone());

        target.render(
            &RenderState::Disconnected {
                qr_code_image: None,
                qr_code: None,
                bridge_error: None,
            },
            Controls::default(),
        );

        let page = fs::read_to_string(&path).expect("page written");
        assert!(page.contains("<div id=\"statusHeader\">"));
        assert!(page.contains("QR code is not available"));
        fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn html_target_replaces_page_without_leaving_staging_file() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("bridge_status_swap_{suffix}.html"));
        let target = HtmlFileTarget::new(path.clone());

        target.render(&RenderState::Loading, Controls::default());
        target.render(
            &RenderState::Error {
                message: "bridge offline".into(),
            },
            Controls::default(),
        );

        let page = fs::read_to_string(&path).expect("page written");
        assert!(page.contains("bridge offline"));
        assert!(!page.contains("Checking connection status"));
        assert!(!target.staging_path().exists());
        fs::remove_file(path).expect("cleanup");
    }
}
