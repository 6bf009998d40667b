//! Lockout presentation
//!
//! When the gate denies a device, the presenter:
//! 1. Unregisters the offline-caching agent and purges what it stored, so
//!    the app cannot keep running from a local copy
//! 2. Replaces the whole surface with a denial view
//!
//! The denial view always shows the device id in full so the user can send
//! it to the operator, offers a pre-filled `mailto:` action, and offers a
//! retry that re-runs the gate from the start.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::identity::DeviceId;

pub const CONTACT_SUBJECT: &str = "AMPACT Selector Access Request";
pub const RETRY_LABEL: &str = "Check Access Again";

const DEFAULT_TITLE: &str = "Access Restricted";
const DEFAULT_BODY: &str =
    "This application is currently restricted. Please contact the administrator for access.";

/// RFC 3986 unreserved characters stay literal in `mailto:` parameters
const MAILTO_PARAM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const OFFLINE_CACHE_DIR: &str = "offline-cache";
const REGISTRATION_FILE: &str = "registration.json";
const ASSETS_DIR: &str = "assets";

/// Wording and contact details for the denial view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageConfig {
    pub title: String,
    pub body: String,
    pub contact_email: Option<String>,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            body: DEFAULT_BODY.to_string(),
            contact_email: None,
        }
    }
}

impl MessageConfig {
    /// Shown when a live fetch denies the device.
    pub fn revoked(contact_email: &str) -> Self {
        Self {
            title: "Access Change Required".to_string(),
            body: "Due to recent changes, this app now requires explicit authorization. \
                   If you need continued access, please send your Access ID below to the \
                   administrator."
                .to_string(),
            contact_email: Some(contact_email.to_string()),
        }
    }

    /// Shown when the cached table denies the device.
    pub fn restricted(contact_email: &str) -> Self {
        Self {
            body: "This application requires authorization. You appear to be offline or \
                   your access has been revoked."
                .to_string(),
            contact_email: Some(contact_email.to_string()),
            ..Self::default()
        }
    }
}

/// Pre-filled request-access mail action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactAction {
    pub email: String,
    pub href: String,
}

impl ContactAction {
    pub fn new(email: &str, device_id: &DeviceId) -> Self {
        Self {
            email: email.to_string(),
            href: mailto_href(email, device_id),
        }
    }
}

/// `mailto:` link with the fixed subject and the device id in the body.
pub fn mailto_href(email: &str, device_id: &DeviceId) -> String {
    let body = format!(
        "Hello, I would like to request access to the AMPACT Selector app.\r\n\r\n\
         My Access ID is: {device_id}\r\n\r\nThank you."
    );
    format!(
        "mailto:{email}?subject={}&body={}",
        utf8_percent_encode(CONTACT_SUBJECT, MAILTO_PARAM),
        utf8_percent_encode(&body, MAILTO_PARAM)
    )
}

/// Everything the denial surface shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenialView {
    pub title: String,
    pub body: String,
    /// Always shown in full.
    pub device_id: DeviceId,
    pub contact: Option<ContactAction>,
    pub retry_label: &'static str,
}

impl DenialView {
    pub fn new(device_id: &DeviceId, config: &MessageConfig) -> Self {
        Self {
            title: config.title.clone(),
            body: config.body.clone(),
            device_id: device_id.clone(),
            contact: config
                .contact_email
                .as_deref()
                .filter(|email| !email.trim().is_empty())
                .map(|email| ContactAction::new(email, device_id)),
            retry_label: RETRY_LABEL,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = format!(
            "{}\n\n{}\n\nYour Access ID\n    {}\n",
            self.title, self.body, self.device_id
        );
        if let Some(contact) = &self.contact {
            out.push_str(&format!(
                "\nContact for access: {}\n    {}\n",
                contact.email, contact.href
            ));
        }
        out
    }

    pub fn render_html(&self) -> String {
        let mut html = String::from(
            "<div class=\"access-denied-container\">\n  <div class=\"access-card\">\n",
        );
        html.push_str(&format!(
            "    <h1 class=\"access-title\">{}</h1>\n    <p class=\"access-body\">{}</p>\n",
            escape_html(&self.title),
            escape_html(&self.body)
        ));
        html.push_str(&format!(
            "    <div class=\"access-id-section\">\n      \
             <div class=\"access-id-label\">Your Access ID</div>\n      \
             <div class=\"access-id-value\" id=\"access-id-display\" \
             style=\"user-select: all\">{}</div>\n    </div>\n",
            escape_html(self.device_id.as_str())
        ));
        if let Some(contact) = &self.contact {
            html.push_str(&format!(
                "    <div class=\"contact-section\">\n      \
                 <div class=\"contact-label\">Contact for access:</div>\n      \
                 <a href=\"{}\" class=\"contact-email\">{}</a>\n    </div>\n",
                escape_html(&contact.href),
                escape_html(&contact.email)
            ));
        }
        html.push_str(&format!(
            "    <button class=\"retry-button\" onclick=\"location.reload()\">{}</button>\n  \
             </div>\n</div>\n",
            self.retry_label
        ));
        html
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// The agent that keeps an offline copy of the application.
pub trait OfflineAgent {
    fn unregister(&mut self) -> io::Result<()>;
    fn purge_storage(&mut self) -> io::Result<()>;
}

/// Whatever the user is looking at.
pub trait Surface {
    /// Replace everything currently shown with `view`.
    fn replace(&mut self, view: &DenialView) -> io::Result<()>;
    /// Block until the user picks the retry action. `false` means they left.
    fn wait_for_retry(&mut self) -> io::Result<bool>;
}

/// Host offline cache: a registration marker plus an asset directory under
/// `<data_dir>/offline-cache/`.
#[derive(Debug, Clone)]
pub struct OfflineCacheDir {
    root: PathBuf,
}

impl OfflineCacheDir {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join(OFFLINE_CACHE_DIR),
        }
    }

    pub fn registration_path(&self) -> PathBuf {
        self.root.join(REGISTRATION_FILE)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join(ASSETS_DIR)
    }

    pub fn is_registered(&self) -> bool {
        self.registration_path().exists()
    }
}

impl OfflineAgent for OfflineCacheDir {
    fn unregister(&mut self) -> io::Result<()> {
        let registration = self.registration_path();
        if registration.exists() {
            fs::remove_file(&registration)?;
            info!("Unregistered offline agent at {}", self.root.display());
        }
        Ok(())
    }

    fn purge_storage(&mut self) -> io::Result<()> {
        let assets = self.assets_dir();
        if assets.exists() {
            fs::remove_dir_all(&assets)?;
            info!("Purged offline cache {}", assets.display());
        }
        Ok(())
    }
}

/// Denial view on a text terminal; retry is the Enter key.
pub struct TerminalSurface<R, W> {
    input: R,
    output: W,
}

impl TerminalSurface<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalSurface<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Surface for TerminalSurface<R, W> {
    fn replace(&mut self, view: &DenialView) -> io::Result<()> {
        // Clear screen, cursor home
        write!(self.output, "\x1B[2J\x1B[H{}", view.render_text())?;
        self.output.flush()
    }

    fn wait_for_retry(&mut self) -> io::Result<bool> {
        write!(self.output, "\n[Enter] {RETRY_LABEL}   [q] Quit\n> ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(false);
        }
        Ok(!line.trim().eq_ignore_ascii_case("q"))
    }
}

/// Tears down offline state and takes over the surface on deny.
pub struct LockoutPresenter<A, V> {
    agent: A,
    surface: V,
}

impl<A: OfflineAgent, V: Surface> LockoutPresenter<A, V> {
    pub fn new(agent: A, surface: V) -> Self {
        Self { agent, surface }
    }

    /// Show the denial view for `device_id`. Teardown failures are logged
    /// and never keep the view from being shown.
    pub fn present(&mut self, device_id: &DeviceId, config: &MessageConfig) -> DenialView {
        if let Err(err) = self.agent.unregister() {
            warn!("Offline agent unregister failed: {err}");
        }
        if let Err(err) = self.agent.purge_storage() {
            warn!("Offline cache purge failed: {err}");
        }

        let view = DenialView::new(device_id, config);
        if let Err(err) = self.surface.replace(&view) {
            warn!("Could not render denial view: {err}");
        }
        view
    }

    /// Wait for the retry action. `true` means re-run the gate.
    pub fn await_retry(&mut self) -> bool {
        self.surface.wait_for_retry().unwrap_or_else(|err| {
            warn!("Retry input unavailable: {err}");
            false
        })
    }

    pub fn into_parts(self) -> (A, V) {
        (self.agent, self.surface)
    }
}
