use bytes::Bytes;
use clap::{Parser, Subcommand};
use quorumlog::{
    RaftClusterClient, RaftElectionState, RaftEvent, RaftLogStorage, RaftMemberInfo, RaftNode, RaftNodeConfig,
    RaftOptions,
};
use slog::Drain;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "quorumlog")]
#[command(version)]
#[command(about = "A replicated, majority-committed log")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a cluster member until interrupted
    Node(NodeArgs),

    /// Append one entry through whichever member is leader
    Write {
        /// Any cluster member. Repeat to give fallbacks.
        #[arg(long = "member", required = true)]
        members: Vec<SocketAddr>,

        #[arg(long, default_value = "cli")]
        source_tag: String,

        payload: String,
    },

    /// Print one member's view of the cluster
    Status {
        #[arg(long)]
        member: SocketAddr,
    },
}

#[derive(Parser, Debug)]
struct NodeArgs {
    /// This member's replica ID. Must appear in --member.
    #[arg(long)]
    id: String,

    /// Cluster member, formatted as "id=host:port". Repeat for every member, including this one.
    #[arg(long = "member", required = true, value_parser = parse_member)]
    members: Vec<(String, SocketAddr)>,

    /// Keep the log in this directory. In memory if unset.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[arg(long)]
    heartbeat_ms: Option<u64>,

    #[arg(long)]
    min_timeout_ms: Option<u64>,

    #[arg(long)]
    max_timeout_ms: Option<u64>,
}

fn parse_member(s: &str) -> Result<(String, SocketAddr), String> {
    let (id, addr) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected 'id=host:port', got '{}'", s))?;
    let addr = addr.parse().map_err(|e| format!("Bad address '{}': {}", addr, e))?;

    Ok((id.to_string(), addr))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let logger = create_root_logger_for_stdout();

    let exit_code = match args.command {
        Commands::Node(node_args) => run_node(logger, node_args).await,
        Commands::Write {
            members,
            source_tag,
            payload,
        } => {
            let client = RaftClusterClient::new(logger, members);
            match client.write(Bytes::from(payload), source_tag).await {
                Ok(entry_id) => {
                    println!("Committed at term {} index {}", entry_id.term(), entry_id.index());
                    0
                }
                Err(e) => {
                    eprintln!("Write failed: {}", e);
                    1
                }
            }
        }
        Commands::Status { member } => {
            let client = RaftClusterClient::new(logger, vec![member]);
            match client.status(member).await {
                Ok(status) => {
                    println!("{:#?}", status);
                    0
                }
                Err(e) => {
                    eprintln!("Status failed: {}", e);
                    1
                }
            }
        }
    };

    process::exit(exit_code);
}

async fn run_node(logger: slog::Logger, args: NodeArgs) -> i32 {
    let config = RaftNodeConfig {
        my_replica_id: args.id,
        cluster_members: args
            .members
            .into_iter()
            .map(|(replica_id, rpc_addr)| RaftMemberInfo { replica_id, rpc_addr })
            .collect(),
        log_storage: match args.log_dir {
            Some(dir) => RaftLogStorage::Directory(dir),
            None => RaftLogStorage::InMemory,
        },
        info_logger: logger.clone(),
        options: RaftOptions {
            leader_heartbeat_duration: args.heartbeat_ms.map(Duration::from_millis),
            follower_min_timeout: args.min_timeout_ms.map(Duration::from_millis),
            follower_max_timeout: args.max_timeout_ms.map(Duration::from_millis),
            ..RaftOptions::default()
        },
    };

    let node = match quorumlog::try_create_raft_node(config).await {
        Ok(node) => node,
        Err(e) => {
            slog::crit!(logger, "Failed to start node: {}", e);
            return 2;
        }
    };
    let RaftNode {
        replicated_log,
        mut commit_stream,
        mut event_listener,
        replica_exit,
    } = node;

    let commit_logger = logger.clone();
    tokio::spawn(async move {
        while let Some(entry) = commit_stream.next().await {
            slog::info!(
                commit_logger,
                "Committed {}:{} from '{}' ({} bytes)",
                entry.entry_id.term(),
                entry.entry_id.index(),
                entry.source_tag,
                entry.payload.len()
            );
        }
    });

    let event_logger = logger.clone();
    tokio::spawn(async move {
        while let Some(RaftEvent::Election(state)) = event_listener.next_event().await {
            match state {
                RaftElectionState::Follower(leader) => {
                    slog::info!(event_logger, "Following {} at {}", leader.replica_id, leader.rpc_addr)
                }
                other => slog::info!(event_logger, "Election state: {:?}", other),
            }
        }
    });

    let exit_code = tokio::select! {
        result = replica_exit.wait() => match result {
            Ok(()) => 0,
            Err(e) => {
                slog::crit!(logger, "{}", e);
                1
            }
        },
        _ = tokio::signal::ctrl_c() => {
            slog::info!(logger, "Interrupted. Shutting down.");
            0
        }
    };

    drop(replicated_log);
    // Let slog_async flush.
    drop(logger);
    tokio::time::sleep(Duration::from_millis(50)).await;

    exit_code
}

fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}
