//! ---
//! fleetsim_section: "07-failover"
//! fleetsim_subsection: "tests"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Scenario tests for load-driven database failover."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
use std::collections::HashMap;

use fleetsim_common::ConfigError;
use fleetsim_engine::{
    FailoverController, FailoverDecision, MemorySink, Role, Server, SignalSource,
    SimulationLoop, SimulationState, DB_IS_ACTIVE,
};

/// Pins the active database's load per tick; everything else idles.
#[derive(Debug, Default)]
struct PinnedLoad {
    active_load: HashMap<u64, u8>,
}

impl PinnedLoad {
    fn at(mut self, tick: u64, load: u8) -> Self {
        self.active_load.insert(tick, load);
        self
    }
}

impl SignalSource for PinnedLoad {
    fn sample(&mut self, _server: &Server, is_active: bool, tick: u64) -> u8 {
        if is_active {
            self.active_load.get(&tick).copied().unwrap_or(70)
        } else {
            20
        }
    }
}

fn two_databases() -> Vec<Server> {
    vec![
        Server::database("db-primary"),
        Server::database("db-replica-1"),
        Server::new("frontend-1", Role::Frontend),
    ]
}

fn build(roster: Vec<Server>, source: PinnedLoad) -> SimulationLoop<PinnedLoad, MemorySink> {
    let controller = FailoverController::new(96, 50, &roster);
    SimulationLoop::new(
        roster,
        SimulationState::new("db-primary"),
        controller,
        source,
        MemorySink::new(),
    )
    .unwrap()
}

#[tokio::test]
async fn overload_at_tick_ten_promotes_replica() {
    let mut sim = build(two_databases(), PinnedLoad::default().at(10, 97));

    for _ in 0..10 {
        let report = sim.step().await;
        assert_eq!(report.decision, FailoverDecision::Hold);
        assert_eq!(report.active_primary, "db-primary");
    }

    let report = sim.step().await;
    assert_eq!(report.tick, 10);
    assert_eq!(report.primary_load, 97);
    let event = report.failover().expect("failover at tick 10");
    assert_eq!(event.demoted, "db-primary");
    assert_eq!(event.promoted, "db-replica-1");
    assert_eq!(sim.state().active_primary, "db-replica-1");
    assert_eq!(sim.state().failover_cooldown, 50);

    // The state metric for tick 10 already reports the new primary.
    let activity = report.batch(DB_IS_ACTIVE).unwrap();
    assert_eq!(activity.value_for("db-replica-1"), Some(1));
    assert_eq!(activity.value_for("db-primary"), Some(0));
}

#[tokio::test]
async fn cooldown_suppresses_second_overload() {
    let mut sim = build(
        two_databases(),
        PinnedLoad::default().at(10, 97).at(20, 96).at(59, 100),
    );

    let mut failovers = Vec::new();
    for _ in 0..60 {
        let report = sim.step().await;
        if let Some(event) = report.failover() {
            failovers.push(event.clone());
        }
    }

    assert_eq!(failovers.len(), 1);
    assert_eq!(failovers[0].tick, 10);
    assert_eq!(sim.state().active_primary, "db-replica-1");
    // Ticks 11..=59 each took one off the window.
    assert_eq!(sim.state().failover_cooldown, 1);
}

#[tokio::test]
async fn cooldown_decrements_once_per_tick_then_rearms() {
    let mut sim = build(two_databases(), PinnedLoad::default().at(10, 97).at(60, 98));

    for _ in 0..=10 {
        sim.step().await;
    }
    let mut previous = sim.state().failover_cooldown;
    assert_eq!(previous, 50);
    for _ in 11..60 {
        sim.step().await;
        let current = sim.state().failover_cooldown;
        assert_eq!(current, previous - 1);
        previous = current;
    }

    let report = sim.step().await;
    assert_eq!(report.tick, 60);
    let event = report.failover().expect("window expired by tick 60");
    assert_eq!(event.demoted, "db-replica-1");
    assert_eq!(event.promoted, "db-primary");
}

#[tokio::test]
async fn single_database_survives_overload() {
    let roster = vec![
        Server::database("db-primary"),
        Server::new("backend-1", Role::Backend),
    ];
    let mut sim = build(roster, PinnedLoad::default().at(5, 99));

    for _ in 0..20 {
        let report = sim.step().await;
        assert!(report.failover().is_none());
        if report.tick == 5 {
            assert_eq!(report.decision, FailoverDecision::NoTarget);
        }
    }
    assert_eq!(sim.state().active_primary, "db-primary");
    assert_eq!(sim.state().failover_cooldown, 0);
}

#[tokio::test]
async fn unknown_initial_primary_is_rejected() {
    let roster = two_databases();
    let controller = FailoverController::new(96, 50, &roster);
    let result = SimulationLoop::new(
        roster,
        SimulationState::new("frontend-1"),
        controller,
        PinnedLoad::default(),
        MemorySink::new(),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn duplicate_server_names_are_rejected() {
    let roster = vec![Server::database("db-a"), Server::database("db-a")];
    let controller = FailoverController::new(96, 50, &roster);
    let result = SimulationLoop::new(
        roster,
        SimulationState::new("db-a"),
        controller,
        PinnedLoad::default(),
        MemorySink::new(),
    );
    assert!(matches!(
        result,
        Err(ConfigError::DuplicateServer(name)) if name == "db-a"
    ));
}
