use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use snapmock_core::Envelope;

#[derive(Parser, Debug)]
#[command(name = "snapmockctl", about = "Drive a running snapmock daemon by hand")]
struct Args {
    /// Base URL of the daemon.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8181")]
    daemon: String,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Show system information.
    Info,
    /// List installed snaps.
    List {
        #[arg(long)]
        enabled: bool,
    },
    Install {
        name: String,
        #[arg(long)]
        channel: Option<String>,
        #[arg(long)]
        revision: Option<String>,
        #[arg(long)]
        classic: bool,
        #[arg(long)]
        devmode: bool,
    },
    Remove {
        name: String,
    },
    Refresh {
        name: String,
        #[arg(long)]
        channel: Option<String>,
    },
    Find {
        query: Option<String>,
        #[arg(long)]
        section: Option<String>,
    },
    /// List changes.
    Changes {
        #[arg(long, default_value = "all")]
        select: String,
        #[arg(long = "for")]
        snap: Option<String>,
    },
    /// Poll a change until it is ready.
    Watch {
        id: String,
        #[arg(long, default_value_t = 200)]
        interval_ms: u64,
    },
    /// Connect `snap:plug` to `snap:slot`.
    Connect {
        plug: String,
        slot: String,
    },
    /// Disconnect `snap:plug`, optionally only from `snap:slot`.
    Disconnect {
        plug: String,
        slot: Option<String>,
    },
}

struct Client {
    http: reqwest::Client,
    base: String,
}

impl Client {
    fn url(&self, path: &str) -> String {
        format!("{}/v2{}", self.base.trim_end_matches('/'), path)
    }

    async fn get(&self, path: &str) -> anyhow::Result<Envelope> {
        let resp = self.http.get(self.url(path)).send().await?;
        decode(resp).await
    }

    async fn post(&self, path: &str, body: &Value) -> anyhow::Result<Envelope> {
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        decode(resp).await
    }

    /// Polls until the change is ready and returns its final rendering.
    async fn wait(&self, id: &str, interval: Duration) -> anyhow::Result<Value> {
        loop {
            let change = sync_result(self.get(&format!("/changes/{id}")).await?)?;
            if change["ready"] == true {
                return Ok(change);
            }
            eprintln!(
                "{} ({}/{})",
                change["status"].as_str().unwrap_or("?"),
                done_steps(&change),
                total_steps(&change)
            );
            tokio::time::sleep(interval).await;
        }
    }
}

async fn decode(resp: reqwest::Response) -> anyhow::Result<Envelope> {
    let envelope: Envelope = resp.json().await.context("decode response envelope")?;
    envelope.into_result().map_err(anyhow::Error::from)
}

fn sync_result(envelope: Envelope) -> anyhow::Result<Value> {
    match envelope {
        Envelope::Sync { result, .. } => Ok(result),
        other => bail!("expected a sync response, got {other:?}"),
    }
}

fn steps(change: &Value, key: &str) -> u64 {
    change["tasks"]
        .as_array()
        .map(|tasks| tasks.iter().filter_map(|t| t["progress"][key].as_u64()).sum())
        .unwrap_or(0)
}

fn done_steps(change: &Value) -> u64 {
    steps(change, "done")
}

fn total_steps(change: &Value) -> u64 {
    steps(change, "total")
}

/// `snap:name` into its two halves.
fn endpoint(spec: &str, key: &str) -> anyhow::Result<Value> {
    let (snap, name) = spec
        .split_once(':')
        .with_context(|| format!("expected snap:{key}, got {spec:?}"))?;
    Ok(json!({ "snap": snap, key: name }))
}

fn print(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let client = Client {
        http: reqwest::Client::new(),
        base: args.daemon,
    };
    let interval = Duration::from_millis(200);

    let envelope = match args.cmd {
        Cmd::Info => client.get("/system-info").await?,
        Cmd::List { enabled } => {
            let path = if enabled { "/snaps?select=enabled" } else { "/snaps" };
            client.get(path).await?
        }
        Cmd::Install {
            name,
            channel,
            revision,
            classic,
            devmode,
        } => {
            let body = json!({
                "action": "install",
                "channel": channel,
                "revision": revision,
                "classic": classic,
                "devmode": devmode,
            });
            client.post(&format!("/snaps/{name}"), &body).await?
        }
        Cmd::Remove { name } => {
            client
                .post(&format!("/snaps/{name}"), &json!({"action": "remove"}))
                .await?
        }
        Cmd::Refresh { name, channel } => {
            let body = json!({"action": "refresh", "channel": channel});
            client.post(&format!("/snaps/{name}"), &body).await?
        }
        Cmd::Find { query, section } => {
            let mut url = reqwest::Url::parse("http://find/")?;
            {
                let mut pairs = url.query_pairs_mut();
                if let Some(q) = &query {
                    pairs.append_pair("q", q);
                }
                if let Some(section) = &section {
                    pairs.append_pair("section", section);
                }
            }
            let path = match url.query() {
                Some(q) => format!("/find?{q}"),
                None => "/find".to_string(),
            };
            client.get(&path).await?
        }
        Cmd::Changes { select, snap } => {
            let mut path = format!("/changes?select={select}");
            if let Some(snap) = snap {
                path.push_str(&format!("&for={snap}"));
            }
            client.get(&path).await?
        }
        Cmd::Watch { id, interval_ms } => {
            let change = client.wait(&id, Duration::from_millis(interval_ms)).await?;
            return print(&change);
        }
        Cmd::Connect { plug, slot } => {
            let body = json!({
                "action": "connect",
                "plugs": [endpoint(&plug, "plug")?],
                "slots": [endpoint(&slot, "slot")?],
            });
            client.post("/interfaces", &body).await?
        }
        Cmd::Disconnect { plug, slot } => {
            let slots = match slot {
                Some(slot) => vec![endpoint(&slot, "slot")?],
                None => Vec::new(),
            };
            let body = json!({
                "action": "disconnect",
                "plugs": [endpoint(&plug, "plug")?],
                "slots": slots,
            });
            client.post("/interfaces", &body).await?
        }
    };

    match envelope {
        Envelope::Async { change, .. } => {
            eprintln!("change {change} accepted");
            let change = client.wait(&change, interval).await?;
            if let Some(err) = change["err"].as_str() {
                bail!("{err}");
            }
            print(&change)
        }
        other => print(&sync_result(other)?),
    }
}
