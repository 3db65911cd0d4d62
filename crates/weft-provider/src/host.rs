use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use weft_core::config::ProviderConfig;
use weft_core::error::{Result, WeftError};
use weft_core::types::ToolDefinition;

use crate::protocol::{self, CallToolResult, Frame, ListToolsResult, RpcError, ToolDescriptor};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<std::result::Result<Value, RpcError>>>>>;

/// Where a tool provider comes from.
#[derive(Debug, Clone)]
pub enum ProviderSource {
    /// An npm-style package name, spawned through the configured runner.
    Package(String),
    /// An explicit program invocation (used by tests and local providers).
    Command { program: String, args: Vec<String> },
    /// Reserved. Loading a URL source fails explicitly instead of silently.
    Url(String),
}

impl ProviderSource {
    pub fn parse(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            Self::Url(source.to_string())
        } else {
            Self::Package(source.to_string())
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Package(name) => name.clone(),
            Self::Command { program, .. } => program.clone(),
            Self::Url(url) => url.clone(),
        }
    }
}

/// Structured outcome of a provider tool call. Unknown tool names come back
/// here as `success: false` rather than as an error, because callers may
/// probe tool availability.
#[derive(Debug, Clone)]
pub struct ProviderCallResult {
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
}

struct Session {
    source: String,
    child: Child,
    stdin: ChildStdin,
    tools: HashMap<String, ToolDescriptor>,
    reader: JoinHandle<()>,
    stderr_drain: Option<JoinHandle<()>>,
}

/// Manages one subprocess hosting an external tool provider.
///
/// The wire protocol (see `protocol`) is newline-delimited JSON-RPC over the
/// child's standard streams: an `initialize` handshake, a `tools/list`
/// catalogue request, and `tools/call` invocations, each matched to its
/// response by request id.
pub struct ProcessToolHost {
    config: ProviderConfig,
    env: HashMap<String, String>,
    session: Mutex<Option<Session>>,
    pending: Pending,
    next_id: AtomicU64,
}

impl ProcessToolHost {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            env: HashMap::new(),
            session: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Set environment overrides applied on top of the inherited environment
    /// when the provider is spawned.
    pub fn initialize(&mut self, env: HashMap<String, String>) {
        self.env = env;
    }

    pub async fn is_loaded(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Spawn the provider, perform the handshake, and discover its tool
    /// catalogue. Spawn or handshake failure is a `SandboxLoad` error; the
    /// caller should not retry automatically (package sources may be slow or
    /// permanently broken).
    pub async fn load_provider(&self, source: &ProviderSource) -> Result<()> {
        // Replace any existing session.
        self.terminate().await;

        let label = source.label();
        let mut cmd = match source {
            ProviderSource::Url(url) => {
                return Err(WeftError::SandboxLoad(format!(
                    "URL-based providers are not supported yet: {}",
                    url
                )));
            }
            ProviderSource::Package(name) => {
                let mut cmd = Command::new(&self.config.runner);
                cmd.args(&self.config.runner_args).arg(name);
                cmd
            }
            ProviderSource::Command { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        };

        cmd.envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| WeftError::SandboxLoad(format!("failed to spawn '{}': {}", label, e)))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            WeftError::SandboxLoad(format!("provider '{}' has no stdout", label))
        })?;
        let mut stdin = child.stdin.take().ok_or_else(|| {
            WeftError::SandboxLoad(format!("provider '{}' has no stdin", label))
        })?;
        let stderr_drain = child.stderr.take().map(|stderr| {
            let label = label.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(provider = %label, "{}", line);
                }
            })
        });

        let reader = spawn_reader(stdout, self.pending.clone(), label.clone());

        let handshake_timeout = Duration::from_secs(self.config.handshake_timeout_secs);
        let request_timeout = Duration::from_secs(self.config.request_timeout_secs);

        let handshake = async {
            self.round_trip(
                &mut stdin,
                protocol::METHOD_INITIALIZE,
                protocol::initialize_params(),
                handshake_timeout,
            )
            .await?;

            let line = protocol::notification(protocol::METHOD_INITIALIZED, serde_json::json!({}));
            write_line(&mut stdin, &line).await?;

            let listed = self
                .round_trip(
                    &mut stdin,
                    protocol::METHOD_LIST_TOOLS,
                    serde_json::json!({}),
                    request_timeout,
                )
                .await?;
            let listed: ListToolsResult = serde_json::from_value(listed)
                .map_err(|e| WeftError::Transport(format!("malformed tool catalogue: {}", e)))?;
            Ok::<_, WeftError>(listed)
        };

        let listed = match handshake.await {
            Ok(listed) => listed,
            Err(e) => {
                reader.abort();
                if let Some(drain) = stderr_drain {
                    drain.abort();
                }
                let _ = child.start_kill();
                let _ = child.wait().await;
                self.pending.lock().await.clear();
                return Err(WeftError::SandboxLoad(format!(
                    "handshake with '{}' failed: {}",
                    label, e
                )));
            }
        };

        let tools: HashMap<String, ToolDescriptor> = listed
            .tools
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();

        info!(provider = %label, tools = tools.len(), "Provider loaded");

        *self.session.lock().await = Some(Session {
            source: label,
            child,
            stdin,
            tools,
            reader,
            stderr_drain,
        });
        Ok(())
    }

    /// The discovered tool catalogue as capability descriptors.
    pub async fn list_capabilities(&self) -> Result<Vec<ToolDefinition>> {
        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| WeftError::Transport("no provider loaded".to_string()))?;

        let mut definitions: Vec<ToolDefinition> = session
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name.clone(),
                description: t
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("Provider tool: {}", t.name)),
                input_schema: t.input_schema.clone(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(definitions)
    }

    /// Call a provider tool by name with a structured argument object.
    ///
    /// A provider-reported JSON-RPC error raises `Provider`; a broken session
    /// raises `Transport`; a tool-level failure (`isError`) and an unknown
    /// tool name both come back as a non-success `ProviderCallResult`.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<ProviderCallResult> {
        let mut guard = self.session.lock().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| WeftError::Transport("no provider loaded".to_string()))?;

        if !session.tools.contains_key(name) {
            return Ok(ProviderCallResult {
                success: false,
                output: None,
                error: Some(format!("Tool '{}' not found in sandbox", name)),
            });
        }

        debug!(provider = %session.source, tool = %name, "Calling provider tool");

        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let request_timeout = Duration::from_secs(self.config.request_timeout_secs);
        let value = self
            .round_trip(&mut session.stdin, protocol::METHOD_CALL_TOOL, params, request_timeout)
            .await?;

        let call: CallToolResult = serde_json::from_value(value)
            .map_err(|e| WeftError::Transport(format!("malformed tool result: {}", e)))?;

        let text = call.text();
        if call.is_error {
            return Ok(ProviderCallResult {
                success: false,
                output: None,
                error: Some(text),
            });
        }

        let output = match serde_json::from_str::<Value>(&text) {
            Ok(value) => value,
            Err(_) => Value::String(text),
        };
        Ok(ProviderCallResult {
            success: true,
            output: Some(output),
            error: None,
        })
    }

    /// Tear down the subprocess. Idempotent; kills the child even when the
    /// handshake never completed.
    pub async fn terminate(&self) {
        let mut guard = self.session.lock().await;
        if let Some(mut session) = guard.take() {
            session.reader.abort();
            if let Some(drain) = session.stderr_drain.take() {
                drain.abort();
            }
            let _ = session.child.start_kill();
            let _ = session.child.wait().await;
            info!(provider = %session.source, "Provider terminated");
        }
        self.pending.lock().await.clear();
    }

    async fn round_trip(
        &self,
        stdin: &mut ChildStdin,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let line = protocol::request(id, method, params);
        if let Err(e) = write_line(stdin, &line).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(rpc))) => Err(WeftError::Provider(format!(
                "{} (code {})",
                rpc.message, rpc.code
            ))),
            Ok(Err(_)) => Err(WeftError::Transport(
                "provider connection closed".to_string(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(WeftError::Transport(format!(
                    "request '{}' timed out",
                    method
                )))
            }
        }
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> Result<()> {
    let write = async {
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await
    };
    write
        .await
        .map_err(|e| WeftError::Transport(format!("write to provider failed: {}", e)))
}

fn spawn_reader(stdout: ChildStdout, pending: Pending, source: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match protocol::parse_frame(line) {
                        Ok(Frame::Response { id, result }) => {
                            if let Some(tx) = pending.lock().await.remove(&id) {
                                let _ = tx.send(result);
                            } else {
                                warn!(provider = %source, id, "Response for unknown request id");
                            }
                        }
                        Ok(Frame::Notification { method }) => {
                            debug!(provider = %source, method = %method, "Provider notification");
                        }
                        Err(e) => {
                            warn!(provider = %source, error = %e, "Ignoring malformed provider frame");
                        }
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        // EOF fails all in-flight requests by dropping their reply channels.
        pending.lock().await.clear();
        debug!(provider = %source, "Provider stdout closed");
    })
}
