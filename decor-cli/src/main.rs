//! Command-line client for the plan decor server: upload a plan, kick off
//! generation, and watch tasks until they resolve.

use anyhow::{bail, Context};
use futures::future::join_all;
use serde_json::{json, Value};

use comet_client::poll::{poll_with_cancel, PollConfig, PollOutcome, StatusSource};
use comet_client::Prediction;

/// Room set used when the caller does not name any, mirroring a typical
/// small apartment plan.
const DEFAULT_ROOMS: [(&str, &str); 5] = [
    ("Left Bedroom", "bedroom"),
    ("Living Room", "living room"),
    ("Right Bedroom", "bedroom"),
    ("Kitchen", "kitchen"),
    ("Bathroom", "bathroom"),
];

/// Reads task status through the server's proxy endpoint, which returns the
/// external prediction verbatim.
#[derive(Clone)]
struct ApiSource {
    client: reqwest::Client,
    api_base: String,
}

impl StatusSource for ApiSource {
    async fn fetch(&self, id: &str) -> anyhow::Result<Prediction> {
        let response = self
            .client
            .get(format!("{}/api/tasks/{}", self.api_base, id))
            .send()
            .await
            .context("status request failed")?;

        if !response.status().is_success() {
            bail!("status request returned {}", response.status());
        }

        response
            .json()
            .await
            .context("failed to decode status response")
    }
}

fn usage() -> ! {
    eprintln!("Usage: decor-cli <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  upload <image-path>");
    eprintln!("  decorate <plan-url> [wall-id] [floor-id] [doors-id] [fabric-id]");
    eprintln!("  visualize <plan-url> [wall-id] [floor-id] [doors-id] [fabric-id]");
    eprintln!("  watch <task-id>");
    eprintln!();
    eprintln!("The server address is taken from DECOR_API (default http://localhost:4000).");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let api_base = std::env::var("DECOR_API")
        .unwrap_or_else(|_| "http://localhost:4000".to_string())
        .trim_end_matches('/')
        .to_string();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let source = ApiSource {
        client: reqwest::Client::new(),
        api_base: api_base.clone(),
    };

    match args.first().map(String::as_str) {
        Some("upload") => {
            let path = args.get(1).map(String::as_str).unwrap_or_else(|| usage());
            upload(&source, path).await
        }
        Some("decorate") => {
            let plan_url = args.get(1).map(String::as_str).unwrap_or_else(|| usage());
            decorate(&source, plan_url, textures_from(&args[2..])).await
        }
        Some("visualize") => {
            let plan_url = args.get(1).map(String::as_str).unwrap_or_else(|| usage());
            visualize(&source, plan_url, textures_from(&args[2..])).await
        }
        Some("watch") => {
            let id = args.get(1).map(String::as_str).unwrap_or_else(|| usage());
            watch(&source, id).await
        }
        _ => usage(),
    }
}

/// Positional texture ids: wall, floor, doors, fabric. Anything omitted or
/// passed as "-" stays unselected.
fn textures_from(ids: &[String]) -> Value {
    let surface = |i: usize| {
        ids.get(i)
            .map(String::as_str)
            .filter(|s| !s.is_empty() && *s != "-")
    };
    json!({
        "wall": surface(0),
        "floor": surface(1),
        "doors": surface(2),
        "fabric": surface(3),
    })
}

async fn upload(source: &ApiSource, path: &str) -> anyhow::Result<()> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path))?;
    let file_name = std::path::Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("plan.png")
        .to_string();

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(data).file_name(file_name),
    );

    let response = source
        .client
        .post(format!("{}/api/upload", source.api_base))
        .multipart(form)
        .send()
        .await
        .context("upload request failed")?;
    let body: Value = check(response).await?;

    println!("{}", body["url"].as_str().unwrap_or_default());
    Ok(())
}

async fn decorate(source: &ApiSource, plan_url: &str, textures: Value) -> anyhow::Result<()> {
    let response = source
        .client
        .post(format!("{}/api/plan/decorate", source.api_base))
        .json(&json!({ "planUrl": plan_url, "textures": textures }))
        .send()
        .await
        .context("decorate request failed")?;
    let body: Value = check(response).await?;

    let id = body["id"]
        .as_str()
        .context("decorate response carried no task id")?
        .to_string();
    println!("task {} submitted, waiting (ctrl-c cancels the watch)...", id);

    report(&id, watch_one(source, &id).await);
    Ok(())
}

async fn visualize(source: &ApiSource, plan_url: &str, textures: Value) -> anyhow::Result<()> {
    let rooms: Vec<Value> = DEFAULT_ROOMS
        .iter()
        .map(|(name, room_type)| json!({ "name": name, "type": room_type }))
        .collect();

    let response = source
        .client
        .post(format!("{}/api/visualize", source.api_base))
        .json(&json!({ "planUrl": plan_url, "rooms": rooms, "textures": textures }))
        .send()
        .await
        .context("visualize request failed")?;
    let body: Value = check(response).await?;

    let tasks = body["tasks"].as_array().cloned().unwrap_or_default();
    let mut watches = Vec::new();
    for task in &tasks {
        let room = task["room"].as_str().unwrap_or("?").to_string();
        match task["id"].as_str() {
            Some(id) => {
                let id = id.to_string();
                let source = source.clone();
                println!("{}: task {} submitted", room, id);
                watches.push(async move {
                    let outcome = watch_one(&source, &id).await;
                    (room, outcome)
                });
            }
            None => {
                println!(
                    "{}: submission failed: {}",
                    room,
                    task["error"].as_str().unwrap_or("unknown error")
                );
            }
        }
    }

    // Each room resolves independently; a stuck task only delays its own line.
    for (room, outcome) in join_all(watches).await {
        report(&room, outcome);
    }
    Ok(())
}

async fn watch(source: &ApiSource, id: &str) -> anyhow::Result<()> {
    report(id, watch_one(source, id).await);
    Ok(())
}

async fn watch_one(source: &ApiSource, id: &str) -> PollOutcome {
    let cancel = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    poll_with_cancel(source, id, &PollConfig::default(), cancel).await
}

fn report(label: &str, outcome: PollOutcome) {
    match outcome {
        PollOutcome::Succeeded { output } => {
            println!("{}: done", label);
            for url in output {
                println!("  {}", url);
            }
        }
        PollOutcome::Failed { message } => println!("{}: failed: {}", label, message),
        PollOutcome::TimedOut => println!("{}: gave up waiting", label),
        PollOutcome::Canceled => println!("{}: canceled", label),
    }
}

async fn check(response: reqwest::Response) -> anyhow::Result<Value> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .context("failed to decode server response")?;
    if !status.is_success() {
        bail!(
            "server returned {}: {}",
            status,
            body["error"].as_str().unwrap_or("unknown error")
        );
    }
    Ok(body)
}
