use std::fs;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;

use cluster_registry::{
    NodeInfo, NodeResources, NodeRole, NodeStatus, Registry, RegistryConfig, RegistryError,
};

fn open_registry(dir: &TempDir) -> Registry {
    let _ = env_logger::builder().is_test(true).try_init();
    Registry::open(RegistryConfig::new(dir.path())).unwrap()
}

fn web_node(id: &str) -> NodeInfo {
    NodeInfo::new(id, "10.0.0.1", format!("host-{}", id), vec![NodeRole::Web], "1.0")
}

fn snapshot(cpu: u8, ram: u8, disk: u8) -> NodeResources {
    NodeResources {
        cpu_cores: 8,
        ram_mb: 16384,
        disk_gb: 500,
        used_cpu_percent: cpu,
        used_ram_percent: ram,
        used_disk_percent: disk,
        account_count: 0,
        domain_count: 0,
    }
}

// Save a node whose last heartbeat lies `secs` in the past
fn save_stale(registry: &Registry, id: &str, secs: i64, status: NodeStatus) {
    let mut node = web_node(id);
    node.status = status;
    node.last_seen = Utc::now() - chrono::Duration::seconds(secs);
    registry.save_node(&node).unwrap();
}

#[test]
fn test_join_and_query_by_role() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);

    registry.save_node(&web_node("n1")).unwrap();

    let web = registry.list_nodes_by_role(NodeRole::Web).unwrap();
    assert_eq!(web.len(), 1);
    assert_eq!(web[0].id, "n1");

    let data = registry.list_nodes_by_role(NodeRole::Data).unwrap();
    assert!(data.is_empty());

    // A node record lands on disk under its id
    assert!(dir.path().join("nodes").join("n1.json").is_file());
}

#[test]
fn test_list_nodes_matches_saved_set() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);

    for id in ["n1", "n2", "n3"] {
        registry.save_node(&web_node(id)).unwrap();
    }
    registry.delete_node("n2").unwrap();

    let mut ids: Vec<String> = registry
        .list_nodes()
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["n1".to_string(), "n3".to_string()]);
}

#[test]
fn test_heartbeat_promotes_offline_node() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);

    registry.save_node(&web_node("n1")).unwrap();
    registry
        .update_node_status("n1", NodeStatus::Offline)
        .unwrap();
    assert_eq!(registry.get_node("n1").unwrap().status, NodeStatus::Offline);

    let before = Utc::now();
    registry
        .process_heartbeat("n1", Some(snapshot(10, 20, 30)))
        .unwrap();

    let node = registry.get_node("n1").unwrap();
    assert_eq!(node.status, NodeStatus::Online);
    assert!(node.last_seen >= before);
    assert_eq!(node.resources.unwrap(), snapshot(10, 20, 30));
}

#[test]
fn test_heartbeat_without_snapshot_keeps_resources() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);

    let mut node = web_node("n1");
    node.set_resources(snapshot(50, 50, 50));
    registry.save_node(&node).unwrap();

    registry.process_heartbeat("n1", None).unwrap();

    let node = registry.get_node("n1").unwrap();
    assert_eq!(node.resources.unwrap(), snapshot(50, 50, 50));
}

#[test]
fn test_update_resources_replaces_snapshot() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);

    let mut node = web_node("n1");
    node.set_resources(snapshot(0, 0, 0));
    registry.save_node(&node).unwrap();

    registry
        .update_node_resources("n1", snapshot(100, 100, 100))
        .unwrap();
    let node = registry.get_node("n1").unwrap();
    assert_eq!(node.resources.unwrap(), snapshot(100, 100, 100));
}

#[test]
fn test_dead_node_detection_and_sweep() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);

    save_stale(&registry, "n1", 120, NodeStatus::Online);
    save_stale(&registry, "n2", 5, NodeStatus::Online);

    let dead = registry.get_dead_nodes(Duration::from_secs(60)).unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, "n1");

    // Observation does not mutate
    assert_eq!(registry.get_node("n1").unwrap().status, NodeStatus::Online);

    let marked = registry.mark_dead_nodes(Duration::from_secs(60)).unwrap();
    assert_eq!(marked, vec!["n1".to_string()]);
    assert_eq!(registry.get_node("n1").unwrap().status, NodeStatus::Offline);
    assert_eq!(registry.get_node("n2").unwrap().status, NodeStatus::Online);

    // A second sweep finds nothing left
    assert!(registry
        .get_dead_nodes(Duration::from_secs(60))
        .unwrap()
        .is_empty());
}

#[test]
fn test_maintenance_and_draining_immune_to_sweep() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);

    save_stale(&registry, "n3", 3600, NodeStatus::Maintenance);
    save_stale(&registry, "n4", 3600, NodeStatus::Draining);

    let marked = registry.mark_dead_nodes(Duration::from_secs(60)).unwrap();
    assert!(marked.is_empty());
    assert_eq!(
        registry.get_node("n3").unwrap().status,
        NodeStatus::Maintenance
    );
    assert_eq!(
        registry.get_node("n4").unwrap().status,
        NodeStatus::Draining
    );
}

#[test]
fn test_sweep_uses_configured_timeout() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::open(
        RegistryConfig::new(dir.path()).node_timeout(Duration::from_secs(30)),
    )
    .unwrap();

    save_stale(&registry, "n1", 45, NodeStatus::Online);
    let marked = registry.sweep_dead_nodes().unwrap();
    assert_eq!(marked, vec!["n1".to_string()]);
}

#[test]
fn test_corrupt_record_does_not_hide_the_rest() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);

    registry.save_node(&web_node("n1")).unwrap();
    fs::write(dir.path().join("nodes").join("corrupt.json"), "{ not json").unwrap();
    fs::write(dir.path().join("nodes").join("empty.json"), "").unwrap();

    let nodes = registry.list_nodes().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].id, "n1");
}

#[test]
fn test_unknown_status_on_disk_is_readable() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);

    let json = r#"{
  "id": "n9",
  "ip": "10.0.0.9",
  "hostname": "host-n9",
  "roles": ["web"],
  "status": "rebooting",
  "last_seen": "2024-01-01T00:00:00Z",
  "joined_at": "2024-01-01T00:00:00Z",
  "version": "1.0"
}"#;
    fs::write(dir.path().join("nodes").join("n9.json"), json).unwrap();

    let node = registry.get_node("n9").unwrap();
    assert_eq!(node.status, NodeStatus::Unknown);

    // Unknown is not online, so it is invisible to the sweep and the
    // online listing
    assert!(registry.list_online_nodes().unwrap().is_empty());
    assert!(registry
        .get_dead_nodes(Duration::from_secs(0))
        .unwrap()
        .is_empty());
}

#[test]
fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let registry = open_registry(&dir);
        registry.save_node(&web_node("n1")).unwrap();
        registry.set_account_placement(42, "n1").unwrap();
    }

    let registry = open_registry(&dir);
    assert_eq!(registry.get_node("n1").unwrap().id, "n1");
    assert_eq!(registry.get_account_placement(42).unwrap().node_id, "n1");
}

#[test]
fn test_concurrent_heartbeats_do_not_tear_the_record() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);

    registry.save_node(&web_node("n1")).unwrap();
    let start = Utc::now();

    // Each thread heartbeats with its own snapshot; compound updates hold
    // one exclusive section, so the final record must be exactly one
    // thread's write, never a mix.
    thread::scope(|scope| {
        for cpu in 1..=8u8 {
            let registry = &registry;
            scope.spawn(move || {
                for _ in 0..20 {
                    registry
                        .process_heartbeat("n1", Some(snapshot(cpu, cpu, cpu)))
                        .unwrap();
                }
            });
        }
    });

    let node = registry.get_node("n1").unwrap();
    assert_eq!(node.status, NodeStatus::Online);
    assert!(node.last_seen >= start);

    let resources = node.resources.unwrap();
    assert!((1..=8).contains(&resources.used_cpu_percent));
    assert_eq!(
        resources,
        snapshot(
            resources.used_cpu_percent,
            resources.used_cpu_percent,
            resources.used_cpu_percent
        )
    );
}

#[test]
fn test_concurrent_resource_update_is_not_lost() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);

    // Joins without a snapshot
    registry.save_node(&web_node("n1")).unwrap();

    // Snapshot-less heartbeats read-modify-write the record concurrently
    // with one resource update. Were the compound split into separate
    // read and write sections, a heartbeat could overwrite the record
    // with its pre-update view and drop the snapshot.
    thread::scope(|scope| {
        let registry = &registry;
        for _ in 0..4 {
            scope.spawn(move || {
                for _ in 0..50 {
                    registry.process_heartbeat("n1", None).unwrap();
                }
            });
        }
        scope.spawn(move || {
            registry
                .update_node_resources("n1", snapshot(25, 50, 75))
                .unwrap();
        });
    });

    let node = registry.get_node("n1").unwrap();
    assert_eq!(node.resources.unwrap(), snapshot(25, 50, 75));
}

#[test]
fn test_missing_records_are_not_found() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);

    assert!(matches!(
        registry.get_node("ghost"),
        Err(RegistryError::NodeNotFound(_))
    ));
    assert!(matches!(
        registry.update_node_status("ghost", NodeStatus::Offline),
        Err(RegistryError::NodeNotFound(_))
    ));
    assert!(matches!(
        registry.get_account_placement(99),
        Err(RegistryError::PlacementNotFound(99))
    ));
}
