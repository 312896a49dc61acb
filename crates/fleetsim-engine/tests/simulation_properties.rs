//! ---
//! fleetsim_section: "11-simulation"
//! fleetsim_subsection: "tests"
//! fleetsim_type: "source"
//! fleetsim_scope: "code"
//! fleetsim_description: "Whole-loop properties: bounds, exclusivity, determinism, delivery."
//! fleetsim_version: "v0.1.0"
//! fleetsim_owner: "tbd"
//! ---
use std::time::Duration;

use fleetsim_common::FleetConfig;
use fleetsim_engine::{
    CountingSink, MemorySink, RoleSignalGenerator, SeededRandom, SimulationLoop, CPU_USAGE,
    DB_IS_ACTIVE,
};
use fleetsim_metrics::{new_registry, SimulatorMetrics};
use tokio::sync::broadcast;

type SeededLoop = SimulationLoop<RoleSignalGenerator<SeededRandom>, MemorySink>;

fn seeded_loop(seed: u64, iterations: i64) -> SeededLoop {
    let mut config = FleetConfig::default();
    config.simulation.iterations = Some(iterations);
    config.simulation.pacing_interval = Duration::ZERO;
    SimulationLoop::from_config(
        &config,
        RoleSignalGenerator::seeded(seed),
        MemorySink::new(),
    )
    .unwrap()
}

#[tokio::test]
async fn every_tick_emits_bounded_values_and_one_active_database() {
    let mut sim = seeded_loop(11, 0);
    for _ in 0..500 {
        let report = sim.step().await;
        let utilization = report.batch(CPU_USAGE).unwrap();
        assert_eq!(utilization.len(), 9);
        assert!(utilization.samples.iter().all(|sample| sample.value <= 100));

        let activity = report.batch(DB_IS_ACTIVE).unwrap();
        assert_eq!(activity.len(), 3);
        let active: Vec<_> = activity
            .samples
            .iter()
            .filter(|sample| sample.value == 1)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].server.name, report.active_primary);
        assert!(activity.samples.iter().all(|sample| sample.value <= 1));
    }
}

#[tokio::test]
async fn identical_seeds_produce_identical_runs() {
    let mut first = seeded_loop(0xDEC0DE, 400);
    let mut second = seeded_loop(0xDEC0DE, 400);

    let summary_a = first.run(None).await;
    let summary_b = second.run(None).await;

    assert_eq!(first.sink().batches(), second.sink().batches());
    assert_eq!(summary_a.failovers, summary_b.failovers);
    assert_eq!(summary_a.active_primary, summary_b.active_primary);
}

#[tokio::test]
async fn failovers_respect_the_cooldown_window() {
    let mut sim = seeded_loop(3, 2_000);
    let summary = sim.run(None).await;
    for pair in summary.failovers.windows(2) {
        assert!(pair[1].tick - pair[0].tick >= 50);
    }
}

#[tokio::test]
async fn run_stops_at_iteration_limit_and_pushes_in_tick_order() {
    let mut sim = seeded_loop(5, 25);
    let summary = sim.run(None).await;
    assert_eq!(summary.ticks, 25);
    assert!(!summary.cancelled);
    assert_eq!(sim.state().tick, 25);

    let batches = sim.sink().batches();
    assert_eq!(batches.len(), 50);
    for (index, batch) in batches.iter().enumerate() {
        assert_eq!(batch.tick, (index / 2) as u64);
        let expected = if index % 2 == 0 { CPU_USAGE } else { DB_IS_ACTIVE };
        assert_eq!(batch.metric_name, expected);
    }
}

#[tokio::test]
async fn emission_failures_are_counted_not_fatal() {
    let mut sim = seeded_loop(9, 4);
    sim.sink().respond_with([
        Ok(500),
        Err("connection reset".to_owned()),
        Ok(204),
        Ok(429),
    ]);

    let summary = sim.run(None).await;
    assert_eq!(summary.ticks, 4);
    assert_eq!(summary.emission_failures, 3);
    assert_eq!(sim.sink().len(), 8);
}

#[tokio::test]
async fn metrics_track_ticks_and_primary() {
    let registry = new_registry();
    let metrics = SimulatorMetrics::new(registry).unwrap();
    let mut sim = seeded_loop(1, 10).with_metrics(metrics.clone());
    sim.run(None).await;
    assert_eq!(metrics.ticks(), 10);
}

#[tokio::test]
async fn shutdown_before_start_runs_no_ticks() {
    let (tx, rx) = broadcast::channel(1);
    tx.send(()).unwrap();
    let mut sim = seeded_loop(2, 100);
    let summary = sim.run(Some(rx)).await;
    assert!(summary.cancelled);
    assert_eq!(summary.ticks, 0);
    assert!(sim.sink().is_empty());
}

#[tokio::test]
async fn shutdown_during_pacing_completes_whole_ticks() {
    let (tx, rx) = broadcast::channel(1);
    let mut config = FleetConfig::default();
    config.simulation.unbounded = true;
    config.simulation.pacing_interval = Duration::from_millis(5);
    let sink = MemorySink::new();
    let mut sim =
        SimulationLoop::from_config(&config, RoleSignalGenerator::seeded(4), sink.clone())
            .unwrap();

    let handle = tokio::spawn(async move { sim.run(Some(rx)).await });
    tokio::time::sleep(Duration::from_millis(40)).await;
    tx.send(()).unwrap();
    let summary = handle.await.unwrap();

    assert!(summary.cancelled);
    assert!(summary.ticks > 0);
    assert_eq!(sink.len() as u64, summary.ticks * 2);
}

#[tokio::test(flavor = "current_thread")]
async fn unpaced_unbounded_run_still_observes_shutdown() {
    let (tx, rx) = broadcast::channel(1);
    let mut config = FleetConfig::default();
    config.simulation.unbounded = true;
    config.simulation.pacing_interval = Duration::ZERO;
    let sink = CountingSink::new();
    let mut sim =
        SimulationLoop::from_config(&config, RoleSignalGenerator::seeded(8), sink.clone())
            .unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(()).unwrap();
    });
    let summary = tokio::time::timeout(Duration::from_secs(5), sim.run(Some(rx)))
        .await
        .expect("run did not stop after shutdown");

    assert!(summary.cancelled);
    assert!(summary.ticks > 0);
    assert_eq!(sink.batches(), summary.ticks * 2);
}

#[tokio::test]
async fn dropped_shutdown_sender_does_not_cancel() {
    let (tx, rx) = broadcast::channel::<()>(1);
    drop(tx);
    let mut sim = seeded_loop(6, 12);
    let summary = sim.run(Some(rx)).await;
    assert!(!summary.cancelled);
    assert_eq!(summary.ticks, 12);
}
