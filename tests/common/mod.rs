//! Shared helpers: a scripted vision model and a backend on a free port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use gptodo::config::{ClientConfig, ResponseMode, ServerConfig};
use gptodo::server::run_server_with_model;
use gptodo::vision::{ModelPart, PartStream, VisionModel};

pub const IMAGE_A: &str = "aW1hZ2UtYQ==";
pub const IMAGE_B: &str = "aW1hZ2UtYg==";

/// What the model does for one image.
#[derive(Clone)]
pub enum Script {
    Parts(Vec<ModelPart>),
    Delayed(Duration, Vec<ModelPart>),
    FailBeforeStream(String),
    FailMidStream(Vec<ModelPart>, String),
}

#[derive(Default)]
pub struct ScriptedModel {
    scripts: HashMap<String, Script>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, image: &str, script: Script) -> Self {
        self.scripts.insert(image.to_string(), script);
        self
    }
}

fn ok_stream(parts: Vec<ModelPart>) -> PartStream {
    stream::iter(parts.into_iter().map(Ok)).boxed()
}

#[async_trait]
impl VisionModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_parts(&self, image_base64: &str) -> Result<PartStream> {
        match self.scripts.get(image_base64).cloned() {
            Some(Script::Parts(parts)) => Ok(ok_stream(parts)),
            Some(Script::Delayed(delay, parts)) => {
                tokio::time::sleep(delay).await;
                Ok(ok_stream(parts))
            }
            Some(Script::FailBeforeStream(message)) => bail!("{}", message),
            Some(Script::FailMidStream(parts, message)) => {
                let items: Vec<Result<ModelPart>> = parts
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(anyhow!(message))))
                    .collect();
                Ok(stream::iter(items).boxed())
            }
            None => bail!("no script for image {}", image_base64),
        }
    }
}

/// One thought, then the answer for `items` split across two fragments.
pub fn answer_parts(items: &[&str]) -> Vec<ModelPart> {
    let answer = serde_json::to_string(
        &items
            .iter()
            .map(|t| serde_json::json!({ "text": t }))
            .collect::<Vec<_>>(),
    )
    .unwrap();
    let mid = answer.len() / 2;
    vec![
        ModelPart::thought("**Reading the note** Looking at each line in turn."),
        ModelPart::answer(&answer[..mid]),
        ModelPart::answer(&answer[mid..]),
    ]
}

pub fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

pub fn server_config(port: u16, mode: ResponseMode) -> ServerConfig {
    ServerConfig {
        bind: format!("127.0.0.1:{}", port),
        allowed_origins: vec![
            "http://localhost:3000".to_string(),
            "https://gptodo.app".to_string(),
        ],
        mode,
        auth_token: None,
    }
}

/// Start a backend in the background and return its `/process-image` URL.
pub async fn spawn_backend(config: ServerConfig, model: ScriptedModel) -> String {
    let port = config
        .bind
        .rsplit(':')
        .next()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap();
    let model: Arc<dyn VisionModel> = Arc::new(model);
    tokio::spawn(async move {
        run_server_with_model(&config, model).await.ok();
    });
    wait_for_server(port).await;
    format!("http://127.0.0.1:{}/process-image", port)
}

pub fn client_config(endpoint: &str, mode: ResponseMode) -> ClientConfig {
    ClientConfig {
        endpoint: endpoint.to_string(),
        mode,
        ..Default::default()
    }
}
