//! Playwright browser automation
//!
//! [`PlaywrightPage`] keeps one Node process alive for the whole session. The
//! process runs a small bridge script that owns the browser and answers one
//! JSON request per line on stdin with one JSON response per line on stdout.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tablewright_common::config::BrowserConfig;
use tablewright_common::{Address, Error, Result, WaitState};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::page::Page;

/// Slack on top of an operation's own timeout before the bridge is considered hung
const RESPONSE_GRACE: Duration = Duration::from_secs(5);
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(30);

const BRIDGE_JS: &str = r##"
const readline = require('readline');
const playwright = require('playwright');

(async () => {
  const kind = process.env.TW_BROWSER || 'chromium';
  const browser = await playwright[kind].launch({ headless: process.env.TW_HEADLESS !== '0' });
  const context = await browser.newContext({
    viewport: {
      width: parseInt(process.env.TW_VIEWPORT_WIDTH || '1280', 10),
      height: parseInt(process.env.TW_VIEWPORT_HEIGHT || '720', 10),
    },
  });
  const page = await context.newPage();
  const baseUrl = process.env.TW_BASE_URL || undefined;
  const send = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');
  const first = (selector) => page.locator(selector).first();

  const ops = {
    goto: async (r) => { await page.goto(new URL(r.value, baseUrl).toString()); },
    wait: async (r) => { await first(r.selector).waitFor({ state: r.state, timeout: r.timeout_ms }); },
    count: async (r) => page.locator(r.selector).count(),
    read: async (r) => first(r.selector).evaluate((e) =>
      ('value' in e && e.tagName !== 'BUTTON') ? String(e.value) : (e.textContent || '').trim()),
    fill: async (r) => { await first(r.selector).fill(r.value); },
    select: async (r) => { await first(r.selector).selectOption(r.value); },
    click: async (r) => { await first(r.selector).click(); },
    focus: async (r) => { await first(r.selector).focus(); },
    blur: async (r) => { await first(r.selector).blur(); },
    type: async (r) => { await first(r.selector).pressSequentially(r.value); },
    press: async (r) => { await first(r.selector).press(r.value); },
    files: async (r) => { await first(r.selector).setInputFiles(r.files); },
    close: async () => { await browser.close(); },
  };

  send({ ready: true });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    let req;
    try {
      req = JSON.parse(line);
    } catch (e) {
      continue;
    }
    try {
      const op = ops[req.op];
      if (!op) throw new Error('unknown op ' + req.op);
      const value = await op(req);
      send({ id: req.id, ok: true, value: value === undefined ? null : value });
    } catch (e) {
      send({ id: req.id, ok: false, error: String((e && e.message) || e), timeout: !!(e && e.name === 'TimeoutError') });
    }
    if (req.op === 'close') break;
  }
  process.exit(0);
})().catch((e) => {
  process.stderr.write(String((e && e.stack) || e) + '\n');
  process.exit(1);
});
"##;

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    op: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    selector: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<Vec<String>>,
}

impl<'a> BridgeRequest<'a> {
    fn new(op: &'a str) -> Self {
        Self {
            id: 0,
            op,
            selector: None,
            value: None,
            state: None,
            timeout_ms: None,
            files: None,
        }
    }

    fn on(mut self, address: &'a Address) -> Self {
        self.selector = Some(address.as_str());
        self
    }

    fn value(mut self, value: &'a str) -> Self {
        self.value = Some(value);
        self
    }
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    timeout: bool,
}

struct BridgeIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

/// A live browser page driven through a Node/Playwright bridge
pub struct PlaywrightPage {
    io: Mutex<BridgeIo>,
    child: Mutex<Child>,
    pid: Option<u32>,
    // Holds the bridge script for the lifetime of the process
    _script_dir: tempfile::TempDir,
}

impl PlaywrightPage {
    /// Start the bridge, launch the browser and wait for it to report ready
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        Self::check_playwright_installed(config)?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_JS)?;

        let mut command = TokioCommand::new(&config.node_binary);
        command
            .arg(&script_path)
            .current_dir(script_dir.path())
            .env("TW_BROWSER", config.browser.as_str())
            .env("TW_HEADLESS", if config.headless { "1" } else { "0" })
            .env("TW_VIEWPORT_WIDTH", config.viewport_width.to_string())
            .env("TW_VIEWPORT_HEIGHT", config.viewport_height.to_string())
            .env("TW_BASE_URL", &config.base_url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(node_path) = &config.node_path {
            command.env("NODE_PATH", node_path);
        }

        info!(
            "Launching {} via {} (headless: {})",
            config.browser.as_str(),
            config.node_binary.display(),
            config.headless
        );
        let mut child = command.spawn()?;
        let pid = child.id();

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Driver("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Driver("bridge stdout unavailable".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(target: "tablewright::bridge", "{}", line);
                }
            });
        }

        let mut io = BridgeIo {
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
        };

        let launch_timeout = Duration::from_millis(config.launch_timeout_ms);
        let ready = tokio::time::timeout(launch_timeout, Self::read_response(&mut io.stdout))
            .await
            .map_err(|_| {
                Error::Driver(format!(
                    "browser did not start within {} ms",
                    config.launch_timeout_ms
                ))
            })??;
        if !ready.ready {
            return Err(Error::Driver(format!(
                "unexpected first message from bridge: {:?}",
                ready.error
            )));
        }

        info!("Browser ready (pid: {:?})", pid);
        Ok(Self {
            io: Mutex::new(io),
            child: Mutex::new(child),
            pid,
            _script_dir: script_dir,
        })
    }

    /// Check that node can load the playwright package
    fn check_playwright_installed(config: &BrowserConfig) -> Result<()> {
        let mut command = Command::new(&config.node_binary);
        command
            .args(["-e", "require('playwright')"])
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(node_path) = &config.node_path {
            command.env("NODE_PATH", node_path);
        }

        match command.status() {
            Ok(status) if status.success() => Ok(()),
            _ => Err(Error::Driver(format!(
                "playwright is not installed for {}",
                config.node_binary.display()
            ))),
        }
    }

    /// Navigate to a path relative to the configured base URL, or to an absolute URL
    pub async fn navigate(&self, url: &str) -> Result<()> {
        info!("Navigating to {}", url);
        self.call(BridgeRequest::new("goto").value(url), DEFAULT_OP_TIMEOUT)
            .await
            .map(|_| ())
    }

    /// Close the browser and stop the bridge process
    pub async fn close(&self) -> Result<()> {
        let closed = self.call(BridgeRequest::new("close"), DEFAULT_OP_TIMEOUT).await;
        if let Err(e) = &closed {
            warn!("Bridge did not close cleanly: {}", e);
        }

        let mut child = self.child.lock().await;
        if tokio::time::timeout(Duration::from_secs(2), child.wait()).await.is_err() {
            #[cfg(unix)]
            {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;

                if let Some(pid) = self.pid {
                    if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
            let _ = child.kill().await;
        }

        info!("Browser closed (pid: {:?})", self.pid);
        Ok(())
    }

    async fn read_response(stdout: &mut Lines<BufReader<ChildStdout>>) -> Result<BridgeResponse> {
        loop {
            let line = stdout
                .next_line()
                .await?
                .ok_or_else(|| Error::Driver("bridge exited".to_string()))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<BridgeResponse>(trimmed) {
                Ok(response) => return Ok(response),
                Err(_) => debug!(target: "tablewright::bridge", "{}", trimmed),
            }
        }
    }

    /// Send one request and wait for its response
    async fn exchange(&self, mut request: BridgeRequest<'_>, timeout: Duration) -> Result<BridgeResponse> {
        let mut io = self.io.lock().await;
        io.next_id += 1;
        request.id = io.next_id;

        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        debug!(op = request.op, selector = ?request.selector, "Bridge request");
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;

        let id = request.id;
        let op = request.op;
        let read = async {
            loop {
                let response = Self::read_response(&mut io.stdout).await?;
                if response.id == Some(id) {
                    return Ok::<_, Error>(response);
                }
            }
        };
        tokio::time::timeout(timeout + RESPONSE_GRACE, read)
            .await
            .map_err(|_| Error::Driver(format!("bridge did not answer '{}' in time", op)))?
    }

    async fn call(&self, request: BridgeRequest<'_>, timeout: Duration) -> Result<Value> {
        let op = request.op;
        let response = self.exchange(request, timeout).await?;
        if response.ok {
            Ok(response.value)
        } else {
            Err(Error::Driver(format!(
                "{} failed: {}",
                op,
                response.error.unwrap_or_default()
            )))
        }
    }
}

#[async_trait]
impl Page for PlaywrightPage {
    async fn wait_for(&self, address: &Address, state: WaitState, timeout: Duration) -> Result<()> {
        let timeout_ms = timeout.as_millis() as u64;
        let mut request = BridgeRequest::new("wait").on(address);
        request.state = Some(state.as_str());
        request.timeout_ms = Some(timeout_ms);

        let response = self.exchange(request, timeout).await?;
        match (response.ok, response.timeout) {
            (true, _) => Ok(()),
            (false, true) => Err(Error::WaitTimeout {
                address: address.to_string(),
                state,
                timeout_ms,
            }),
            (false, false) => Err(Error::Driver(format!(
                "wait for {} failed: {}",
                address,
                response.error.unwrap_or_default()
            ))),
        }
    }

    async fn count(&self, address: &Address) -> Result<usize> {
        let value = self
            .call(BridgeRequest::new("count").on(address), DEFAULT_OP_TIMEOUT)
            .await?;
        value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| Error::Driver(format!("count returned {}", value)))
    }

    async fn read_value(&self, address: &Address) -> Result<String> {
        let value = self
            .call(BridgeRequest::new("read").on(address), DEFAULT_OP_TIMEOUT)
            .await?;
        Ok(match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    async fn set_value(&self, address: &Address, value: &str) -> Result<()> {
        self.call(BridgeRequest::new("fill").on(address).value(value), DEFAULT_OP_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn select_option(&self, address: &Address, value: &str) -> Result<()> {
        self.call(BridgeRequest::new("select").on(address).value(value), DEFAULT_OP_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn click(&self, address: &Address) -> Result<()> {
        self.call(BridgeRequest::new("click").on(address), DEFAULT_OP_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn focus(&self, address: &Address) -> Result<()> {
        self.call(BridgeRequest::new("focus").on(address), DEFAULT_OP_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn blur(&self, address: &Address) -> Result<()> {
        self.call(BridgeRequest::new("blur").on(address), DEFAULT_OP_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn type_char(&self, address: &Address, ch: char) -> Result<()> {
        let mut buf = [0u8; 4];
        let text: &str = ch.encode_utf8(&mut buf);
        self.call(BridgeRequest::new("type").on(address).value(text), DEFAULT_OP_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn press(&self, address: &Address, key: &str) -> Result<()> {
        self.call(BridgeRequest::new("press").on(address).value(key), DEFAULT_OP_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn set_input_files(&self, address: &Address, files: &[PathBuf]) -> Result<()> {
        let mut request = BridgeRequest::new("files").on(address);
        request.files = Some(files.iter().map(|f| path_arg(f)).collect());
        self.call(request, DEFAULT_OP_TIMEOUT).await.map(|_| ())
    }
}

fn path_arg(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_unset_fields() {
        let address = Address::new(r#"[id="stacom_fuel_0"]"#);
        let mut request = BridgeRequest::new("fill").on(&address).value("Diesel");
        request.id = 7;
        let json: Value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "op": "fill",
                "selector": "[id=\"stacom_fuel_0\"]",
                "value": "Diesel",
            })
        );
    }

    #[test]
    fn test_parse_timeout_response() {
        let response: BridgeResponse = serde_json::from_str(
            r#"{"id": 3, "ok": false, "error": "Timeout 500ms exceeded", "timeout": true}"#,
        )
        .unwrap();
        assert_eq!(response.id, Some(3));
        assert!(!response.ok && response.timeout);
    }

    #[test]
    fn test_ready_message() {
        let response: BridgeResponse = serde_json::from_str(r#"{"ready": true}"#).unwrap();
        assert!(response.ready);
        assert!(response.id.is_none());
    }

    #[test]
    fn test_bridge_handles_every_page_op() {
        for op in ["wait", "count", "read", "fill", "select", "click", "focus", "blur", "type", "press", "files"] {
            assert!(BRIDGE_JS.contains(&format!("    {}: async", op)), "missing op {op}");
        }
    }
}
