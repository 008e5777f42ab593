/// Example: Full lease lifecycle against a throwaway home
///
/// This example walks the whole surface: register an instance, reserve a
/// contiguous range, submit an observation, inspect the annotated port
/// listing, and deregister with the cascading release.
///
/// Usage:
///   cargo run --example quickstart

use gatekeeper_core::{
    Gatekeeper, GatekeeperConfig, ObserveRequest, RegisterRequest, ReleaseRequest, ReserveRequest,
};
use std::collections::BTreeMap;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let home = std::env::temp_dir().join("gatekeeper-quickstart");
    let mut config = GatekeeperConfig::defaults(&home);
    config.port_range_start = 8000;
    config.port_range_end = 8020;

    let gatekeeper = Gatekeeper::open(config)?;

    // Register an instance
    let instance = gatekeeper.register(RegisterRequest {
        instance_id: "web-1".to_string(),
        name: "Web frontend".to_string(),
        metadata: BTreeMap::from([("team".to_string(), "edge".to_string())]),
    })?;
    println!("registered {} ({})", instance.id, instance.name);

    // Reserve a 3-port contiguous range
    let grant = gatekeeper.reserve(ReserveRequest {
        instance_id: "web-1".to_string(),
        range_size: 3,
    })?;
    println!(
        "granted {}-{} (binding {})",
        grant.start_port, grant.end_port, grant.binding_id
    );

    // An agent reports what it actually sees bound on the host
    let drift = gatekeeper.observe(ObserveRequest {
        instance_id: "web-1".to_string(),
        used_ports: vec![grant.start_port, 9090],
    })?;
    println!(
        "drift: confirmed={:?} leaked={:?} rogue={:?}",
        drift.confirmed, drift.leaked, drift.rogue
    );

    // Release by exact range
    let released = gatekeeper.release(ReleaseRequest {
        port_number: None,
        start_port: Some(grant.start_port),
        end_port: Some(grant.end_port),
        instance_id: Some("web-1".to_string()),
    })?;
    println!("released binding {} at {}", released.binding_id, released.released_at);

    // Deregister; any remaining bindings would cascade here
    let outcome = gatekeeper.deregister("web-1")?;
    println!(
        "deregistered {} ({} binding(s) cascaded)",
        outcome.instance.id,
        outcome.released.len()
    );

    std::fs::remove_dir_all(&home).ok();
    Ok(())
}
