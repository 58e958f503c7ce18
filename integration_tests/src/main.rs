//! Mesh discovery tests for the LoRa mesh firmware.
//!
//! Connects to the BLE console of two or more flashed nodes and checks
//! that they find each other, route sensibly and exchange demo traffic.

mod ble_client;
mod report;

use std::time::Duration;

use anyhow::{anyhow, bail};
use clap::Parser;
use colored::Colorize;

use ble_client::BleClient;
use report::node_id_from_name;
use tests::{print_results, run_all_tests, MeshNode};

#[derive(Parser)]
#[command(name = "mesh-integration-tests")]
#[command(about = "Mesh discovery tests over the BLE consoles of several nodes")]
struct Args {
    /// BLE name of a node, e.g. "DR-00A1B2C3" (repeat for every node)
    #[arg(short, long = "device", required = true)]
    devices: Vec<String>,

    /// BLE scan timeout in seconds
    #[arg(long, default_value = "10")]
    scan_timeout: u64,

    /// Time allowed for the nodes to discover each other, in seconds
    #[arg(long, default_value = "180")]
    discovery_timeout: u64,

    /// Time allowed for demo traffic to arrive everywhere, in seconds
    #[arg(long, default_value = "120")]
    data_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.devices.len() < 2 {
        bail!("At least two devices are needed to form a mesh");
    }

    println!("{}", "LoRa Mesh Integration Tests".bold());

    let mut nodes = Vec::new();
    for name in &args.devices {
        let id = node_id_from_name(name).ok_or_else(|| anyhow!("'{}' is not a mesh node name", name))?;

        println!("Scanning for \"{}\"...", name);
        let client = BleClient::connect_by_name(name, Duration::from_secs(args.scan_timeout)).await?;
        println!("{}", format!("  {} connected", name).green());

        nodes.push(MeshNode::new(id, client));
    }

    println!("\nRunning tests...\n");

    let results = run_all_tests(
        &mut nodes,
        Duration::from_secs(args.discovery_timeout),
        Duration::from_secs(args.data_timeout),
    )
    .await;
    print_results(&results);

    for node in &nodes {
        let _ = node.client.disconnect().await;
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
