mod config;
mod events;
mod server;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use config::ServerConfig;
use scenesync::{Scene, SyncEngine};
use server::EditorServer;

#[derive(Parser)]
#[command(name = "scenesync-server")]
#[command(about = "Collaborative 3D scene editing server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, env = "PORT", default_value_t = scenesync::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, help = "glTF document to load as the shared scene")]
    scene: Option<PathBuf>,

    #[arg(short, long, default_value_t = 64)]
    max_clients: usize,

    #[arg(long, default_value_t = 1024, help = "Queued messages per client before warning")]
    outbound_warn_threshold: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ServerConfig {
        bind: args.bind,
        port: args.port,
        scene_path: args.scene,
        max_clients: args.max_clients,
        outbound_warn_threshold: args.outbound_warn_threshold,
    };

    let scene = load_scene(config.scene_path.as_deref())?;
    let server = EditorServer::bind(config.clone())
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;
    log::info!("Server started on {}", server.local_addr()?);

    tokio::select! {
        result = server.run(SyncEngine::new(scene)) => result?,
        _ = tokio::signal::ctrl_c() => log::info!("Server shutting down"),
    }

    Ok(())
}

fn load_scene(path: Option<&Path>) -> Result<Scene> {
    let Some(path) = path else {
        return Ok(Scene::new());
    };

    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let scene = Scene::from_gltf(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    log::info!("Loaded {} nodes from {}", scene.node_count(), path.display());
    Ok(scene)
}
