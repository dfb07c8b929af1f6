// benches/bench_traversal_tick.rs
use criterion::{
    black_box, criterion_group, criterion_main, AxisScale, Criterion, PlotConfiguration,
};
use junction_sim::control_system::traffic_light_controller::{LightState, Phase};
use junction_sim::simulation_engine::junction::Junction;
use std::time::Duration;

// A junction that has already taken `rounds` generator rounds.
fn loaded_junction(rounds: usize) -> Junction {
    let mut junction = Junction::default();
    for _ in 0..rounds {
        junction.generate();
    }
    junction
}

fn bench_traversal_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("traversal_tick");

    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));
    group.warm_up_time(Duration::from_secs(2));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Linear));

    // Backlogs below, at and well above the congestion threshold.
    for &rounds in [5usize, 10, 40].iter() {
        group.bench_function(format!("backlog_{}", rounds), |b| {
            let mut junction = loaded_junction(rounds);
            let mut phase = Phase::AcGreen;
            b.iter(|| {
                junction.generate();
                let report = junction.traverse(&LightState::with_phase(phase));
                phase = phase.next();
                while junction.drain_next_move().is_some() {}
                black_box(report);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_traversal_tick);
criterion_main!(benches);
