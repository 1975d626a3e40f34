//! http extension - a curl-style HTTP client confined to the sandbox.
//!
//! The response body goes to stdout, or into the sandbox filesystem with
//! `-o` (through the quota wrapper, so an oversized download fails like any
//! other oversized write). Requests honor the sandbox command timeout.

use async_trait::async_trait;

use crate::shell::command::{CommandOutput, ShellCommand};
use crate::shell::context::ShellContext;

/// `http [-X METHOD] [-H 'K: V']... [-d BODY] [-o FILE] URL`
pub struct HttpCommand {
    client: reqwest::Client,
}

impl Default for HttpCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpCommand {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ShellCommand for HttpCommand {
    fn name(&self) -> &str {
        "http"
    }

    fn aliases(&self) -> &[&str] {
        &["curl"]
    }

    fn description(&self) -> &str {
        "perform an HTTP request"
    }

    fn usage(&self) -> &str {
        "http [-X METHOD] [-H 'KEY: VALUE']... [-d BODY] [-o FILE] URL"
    }

    async fn execute(&self, args: &[String], ctx: &mut ShellContext) -> CommandOutput {
        let opts = match HttpOpts::parse(args) {
            Ok(opts) => opts,
            Err(e) => return CommandOutput::fail(format!("http: {}", e)),
        };

        let method = match reqwest::Method::from_bytes(opts.method.as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                return CommandOutput::fail(format!("http: invalid method: {}", opts.method));
            }
        };

        let mut request = self
            .client
            .request(method, &opts.url)
            .timeout(ctx.command_timeout);
        for (key, value) in &opts.headers {
            request = request.header(key, value);
        }
        if let Some(body) = opts.body {
            request = request.body(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return CommandOutput::fail(format!("http: {}: request timed out", opts.url));
            }
            Err(e) => return CommandOutput::fail(format!("http: {}", e)),
        };

        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return CommandOutput::fail(format!("http: {}", e)),
        };

        if !status.is_success() {
            return CommandOutput::fail(format!("http: {}: {}", opts.url, status));
        }

        match opts.output {
            Some(file) => {
                let target = ctx.resolve_path(&file);
                match ctx.fs.write_file(&target, &bytes).await {
                    Ok(()) => CommandOutput::empty(),
                    Err(e) => CommandOutput::fail(format!("http: {}: {}", file, e)),
                }
            }
            None => CommandOutput::ok(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }
}

struct HttpOpts {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
    output: Option<String>,
}

impl HttpOpts {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut method = None;
        let mut url = None;
        let mut headers = Vec::new();
        let mut body = None;
        let mut output = None;

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-X" | "--request" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| "option requires an argument -- 'X'".to_string())?;
                    method = Some(value.to_uppercase());
                }
                "-H" | "--header" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| "option requires an argument -- 'H'".to_string())?;
                    let (key, val) = value
                        .split_once(':')
                        .ok_or_else(|| format!("malformed header: {}", value))?;
                    headers.push((key.trim().to_string(), val.trim().to_string()));
                }
                "-d" | "--data" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| "option requires an argument -- 'd'".to_string())?;
                    body = Some(value.clone());
                }
                "-o" | "--output" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| "option requires an argument -- 'o'".to_string())?;
                    output = Some(value.clone());
                }
                flag if flag.starts_with('-') && flag.len() > 1 => {
                    return Err(format!("unknown option: {}", flag));
                }
                positional => url = Some(positional.to_string()),
            }
        }

        let url = url.ok_or_else(|| "missing URL".to_string())?;
        // POST when a body is supplied without an explicit method, GET
        // otherwise.
        let method =
            method.unwrap_or_else(|| if body.is_some() { "POST" } else { "GET" }.to_string());

        Ok(Self {
            method,
            url,
            headers,
            body,
            output,
        })
    }
}
