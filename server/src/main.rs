//! Composition root for the `crucible-server` binary (§10): loads
//! `Live<Configuration>`, starts a `TaskCenter`, and — on a node that runs
//! the metadata role — spins up the Keeper server task; every node spins
//! up the query-serving listener.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crucible_core::{TaskCenterFactory, TaskKind};
use crucible_keeper_raft::{NoForwarder, RaftDriver};
use crucible_keeper_server::KeeperServer;
use crucible_keeper_store::KeeperStore;
use crucible_types::{Live, NodeId};

use config::Configuration;

#[derive(Parser, Debug)]
#[command(name = "crucible-server", about = "Crucible database server")]
struct Args {
    /// Path to a YAML configuration file. Falls back to built-in defaults,
    /// overridable by `CRUCIBLE_`-prefixed environment variables, if unset.
    #[arg(long, env = "CRUCIBLE_CONFIG")]
    config_file: Option<PathBuf>,

    /// Increase logging verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn verbosity_to_level(verbose: u8) -> Option<tracing::Level> {
    match verbose {
        0 => None,
        1 => Some(tracing::Level::DEBUG),
        _ => Some(tracing::Level::TRACE),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let configuration = match &args.config_file {
        Some(path) => Configuration::load(path).context("failed to load configuration")?,
        None => Configuration::load_with_default(Configuration::default(), None)
            .context("failed to load default configuration")?,
    };

    let mut filter = tracing_subscriber::EnvFilter::try_new(&configuration.observability_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if let Some(level) = verbosity_to_level(args.verbose) {
        filter = filter.add_directive(level.into());
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Live::from_value(configuration);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(config))
}

async fn run(config: Live<Configuration>) -> anyhow::Result<()> {
    let task_center = TaskCenterFactory::create(tokio::runtime::Handle::current());
    let snapshot = config.live_load();

    if snapshot.runs_metadata_role {
        let keeper_config = snapshot.keeper.clone();
        let node_id = snapshot.node_id;
        task_center.spawn_child(TaskKind::KeeperRaftDriver, "keeper-server", async move {
            run_keeper_server(keeper_config, node_id).await
        });
    }

    let query_config = snapshot.query.clone();
    task_center.spawn_child(TaskKind::Disposable, "query-listener", async move {
        run_query_listener(query_config).await
    });

    tokio::signal::ctrl_c().await.context("failed to wait for ctrl-c")?;
    tracing::info!("shutdown requested");
    task_center.cancel_tasks(Some(snapshot.shutdown_grace_period)).await;
    Ok(())
}

/// Accepts ZooKeeper-shaped client connections and dispatches each framed
/// request to a single-node `KeeperServer`. A production deployment wires
/// `keeper.peers` into a real `LeaderForwarder`/Raft peer transport; this
/// composition root always bootstraps as the sole member of its cluster.
async fn run_keeper_server(keeper_config: config::KeeperOptions, node_id: u64) -> anyhow::Result<()> {
    std::fs::create_dir_all(&keeper_config.data_dir)?;
    let raft = Arc::new(RaftDriver::bootstrap_leader(
        NodeId::new(node_id),
        Vec::new(),
        &keeper_config.data_dir,
        keeper_config.fsync_policy.into(),
    )?);
    let store = KeeperStore::new(keeper_config.container_block_count);
    let server = Arc::new(KeeperServer::new(store, raft, Arc::new(NoForwarder)));

    let listener = TcpListener::bind(keeper_config.listen_addr.as_str()).await?;
    tracing::info!(addr = %keeper_config.listen_addr, "keeper server listening");
    loop {
        let (socket, peer) = listener.accept().await?;
        let server = server.clone();
        tokio::spawn(async move {
            if let Err(error) = handle_keeper_connection(server, socket).await {
                tracing::warn!(%peer, %error, "keeper connection ended with an error");
            }
        });
    }
}

async fn handle_keeper_connection(server: Arc<KeeperServer>, mut socket: tokio::net::TcpStream) -> anyhow::Result<()> {
    let session = crucible_types::SessionId::new(socket.peer_addr().map(|a| a.port() as i64).unwrap_or(0));
    loop {
        let mut len_buf = [0u8; 4];
        if socket.read_exact(&mut len_buf).await.is_err() {
            return Ok(());
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        socket.read_exact(&mut body).await?;

        let mut xid_op = [0u8; 8];
        xid_op.copy_from_slice(&body[..8]);
        let xid = i32::from_be_bytes(xid_op[0..4].try_into().unwrap());
        let op_num = i32::from_be_bytes(xid_op[4..8].try_into().unwrap());
        let rest = bytes::BytesMut::from(&body[8..]);

        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        let response = server.handle_frame(session, xid, op_num, rest, now_ms).await?;

        socket.write_u32(response.len() as u32).await?;
        socket.write_all(&response).await?;
    }
}

/// Minimal accept loop for the client query wire protocol (§8). Full query
/// execution (MergeTree read path + aggregation, wired through
/// `crucible-wire-protocol`'s packet codec) is composed per-query by the
/// caller of this listener; this binary only establishes the composition
/// root's shape.
async fn run_query_listener(query_config: config::QueryOptions) -> anyhow::Result<()> {
    let listener = TcpListener::bind(query_config.listen_addr.as_str()).await?;
    tracing::info!(addr = %query_config.listen_addr, "query listener listening");
    loop {
        let (_socket, peer) = listener.accept().await?;
        tracing::debug!(%peer, "query connection accepted");
    }
}
