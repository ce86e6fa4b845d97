use chrono::{DateTime, Local};
use log::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    Info,
    Warning,
    Error,
}

impl AlertType {
    fn label(self) -> &'static str {
        match self {
            AlertType::Info => "INFO",
            AlertType::Warning => "WARNING",
            AlertType::Error => "ERROR",
        }
    }
}

/// One user-facing notification, stamped when it was raised.
#[derive(Debug, Clone)]
pub struct Notice {
    pub level: AlertType,
    pub title: String,
    pub message: String,
    pub raised_at: DateTime<Local>,
}

impl Notice {
    pub fn new(level: AlertType, title: &str, message: &str) -> Self {
        Notice {
            level,
            title: title.to_string(),
            message: message.to_string(),
            raised_at: Local::now(),
        }
    }
}

/// Blocking, user-visible notification. Returns once the user has seen it.
pub trait Notifier: Send + Sync {
    fn deliver(&self, notice: &Notice);

    /// Raises a notification.
    ///
    /// # Arguments
    ///
    /// * `level` - Severity, which picks the icon and the log level
    /// * `title` - Short caption, e.g. "Installation error"
    /// * `message` - Text shown to the user
    fn notify(&self, level: AlertType, title: &str, message: &str) {
        self.deliver(&Notice::new(level, title, message));
    }
}

/// Message boxes on Windows, stderr elsewhere. Every notice is also logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn deliver(&self, notice: &Notice) {
        match notice.level {
            AlertType::Info => info!("{}: {}", notice.title, notice.message),
            AlertType::Warning => warn!("{}: {}", notice.title, notice.message),
            AlertType::Error => error!("{}: {}", notice.title, notice.message),
        }
        show(notice);
    }
}

#[cfg(windows)]
fn show(notice: &Notice) {
    use native_windows_gui as nwg;

    let icons = match notice.level {
        AlertType::Info => nwg::MessageIcons::Info,
        AlertType::Warning => nwg::MessageIcons::Warning,
        AlertType::Error => nwg::MessageIcons::Error,
    };
    let params = nwg::MessageParams {
        title: &notice.title,
        content: &notice.message,
        buttons: nwg::MessageButtons::Ok,
        icons,
    };
    nwg::message(&params);
}

#[cfg(not(windows))]
fn show(notice: &Notice) {
    eprintln!("{}", render(notice));
}

/// Console form of a notice: `[HH:MM:SS] [LEVEL] title: message`.
pub fn render(notice: &Notice) -> String {
    format!(
        "[{}] [{}] {}: {}",
        notice.raised_at.format("%H:%M:%S"),
        notice.level.label(),
        notice.title,
        notice.message
    )
}
