//! agora-admin CLI tool
//!
//! Inspects a running Agora node over its admin socket.
//!
//! Usage:
//!   agora-admin get <id>
//!   agora-admin list
//!   agora-admin identity
//!   agora-admin peers
//!   agora-admin ping

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    Get { id: String },
    List,
    Identity,
    Peers,
    Ping,
}

/// Response from admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    List { items: Vec<String> },
    Pong,
}

fn print_usage() {
    eprintln!("agora-admin - Inspect a running Agora node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  agora-admin get <id>     Show one document");
    eprintln!("  agora-admin list         List all documents, newest first");
    eprintln!("  agora-admin identity     Show node identity and store address");
    eprintln!("  agora-admin peers        List connected peers");
    eprintln!("  agora-admin ping         Check if daemon is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  AGORA_SOCKET  Path to admin socket (default: ./agora-data/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("AGORA_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./agora-data/admin.sock"))
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to agora-node at {:?}: {}\n\
             Is the agora-node running?",
            socket_path, e
        )
    })?;

    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let cmd = match args[1].as_str() {
        "get" | "g" => {
            if args.len() < 3 {
                eprintln!("Error: get requires an id argument");
                std::process::exit(1);
            }
            AdminCommand::Get {
                id: args[2].clone(),
            }
        }
        "list" | "l" => AdminCommand::List,
        "identity" => AdminCommand::Identity,
        "peers" => AdminCommand::Peers,
        "ping" => AdminCommand::Ping,
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Ok { message } => {
                println!("{}", message);
            }
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::List { items } => {
                if items.is_empty() {
                    println!("(none)");
                } else {
                    for item in items {
                        println!("{}", item);
                    }
                }
            }
            AdminResponse::Pong => {
                println!("pong - agora-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
