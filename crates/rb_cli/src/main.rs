//! Headless encounter driver.
//!
//! Runs a deterministic session at a fixed tick rate and prints the event
//! stream, either from a JSON/YAML config file or from a built-in demo
//! encounter.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nalgebra::Vector3;
use rb_core::{
    AttackShape, Checkpoint, CourseConfig, EncounterConfig, EncounterEngine, EncounterEvent,
    Pattern, Phase, PlayerAttackKind, SessionConfig, PATTERN_STEPS,
};

#[derive(Parser)]
#[command(name = "rb_cli")]
#[command(about = "Run rhythm combat encounters headless", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate an encounter from a config file
    Run {
        /// Encounter config (.json, .yaml or .yml)
        #[arg(long)]
        config: PathBuf,

        /// RNG seed for pattern selection
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Session length in seconds
        #[arg(long, default_value_t = 30.0)]
        seconds: f64,

        /// Driver ticks per second
        #[arg(long, default_value_t = 60.0)]
        tick_rate: f64,

        /// Swing a rhythm attack on every beat
        #[arg(long)]
        auto_player: bool,
    },

    /// Simulate the built-in demo encounter
    Demo {
        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value_t = 60.0)]
        seconds: f64,

        #[arg(long, default_value_t = 60.0)]
        tick_rate: f64,
    },

    /// Print the demo encounter config as JSON
    SampleConfig {
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, seed, seconds, tick_rate, auto_player } => {
            let loaded = SessionConfig::load(&config)
                .with_context(|| format!("failed to load config {}", config.display()))?;
            simulate(loaded, seed, seconds, tick_rate, auto_player)
        }
        Commands::Demo { seed, seconds, tick_rate } => {
            simulate(demo_config(), seed, seconds, tick_rate, true)
        }
        Commands::SampleConfig { out } => {
            let json = serde_json::to_string_pretty(&demo_config())?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("wrote demo config to {}", path.display());
                }
                None => println!("{}", json),
            }
            Ok(())
        }
    }
}

fn simulate(
    config: SessionConfig,
    seed: u64,
    seconds: f64,
    tick_rate: f64,
    auto_player: bool,
) -> Result<()> {
    anyhow::ensure!(tick_rate > 0.0, "tick rate must be positive");

    let mut engine = EncounterEngine::new(config, seed)?;
    engine.set_player_position(Some(Vector3::new(2.0, 0.0, 0.0)));
    engine.set_enemy_position(Some(Vector3::new(0.0, 0.0, 0.0)));
    engine.reached_checkpoint();
    print_events(&mut engine);

    let dt = 1.0 / tick_rate;
    let ticks = (seconds * tick_rate).ceil() as u64;
    for _ in 0..ticks {
        engine.tick(dt);
        let crossed = print_events(&mut engine);

        // Traversal stand-in: moving covers one checkpoint per bar.
        if crossed.bar && engine.state() == rb_core::GameplayState::Moving {
            engine.reached_checkpoint();
            print_events(&mut engine);
        }

        // The demo player swings just after every beat, which the judge
        // grades as on-beat.
        if auto_player && crossed.beat && engine.is_enemy_turn() {
            engine.player_attack(PlayerAttackKind::Rhythm);
            print_events(&mut engine);
        }

        if engine.is_course_complete() {
            break;
        }
    }

    println!("---");
    println!(
        "final: state={:?} score={} combo={} player_hp={} enemy_hp={}",
        engine.state(),
        engine.score(),
        engine.combo(),
        engine.player_health().current(),
        engine.enemy_health().current(),
    );
    Ok(())
}

#[derive(Default)]
struct Crossed {
    beat: bool,
    bar: bool,
}

/// Print and consume pending events, noting beat/bar edges.
fn print_events(engine: &mut EncounterEngine) -> Crossed {
    let elapsed = engine.clock().elapsed_seconds();
    let mut crossed = Crossed::default();
    for event in engine.drain_events() {
        match event {
            EncounterEvent::BeatCrossed { .. } => crossed.beat = true,
            EncounterEvent::BarCrossed { .. } => crossed.bar = true,
            _ => {}
        }
        print_event(elapsed, &event);
    }
    crossed
}

fn print_event(elapsed: f64, event: &EncounterEvent) {
    let label = match event {
        EncounterEvent::BeatCrossed { beat } => format!("beat {}", beat),
        EncounterEvent::BarCrossed { bar } => format!("bar {}", bar),
        EncounterEvent::StateChanged { state } => format!("state -> {:?}", state),
        EncounterEvent::PhaseChanged { phase_index } => format!("phase -> {}", phase_index),
        EncounterEvent::TelegraphStarted { step, pattern } => {
            format!("telegraph step {} ({})", step, pattern)
        }
        EncounterEvent::AttackFired { step, pattern } => {
            format!("attack step {} ({})", step, pattern)
        }
        EncounterEvent::TimingEvaluated { result } => format!("timing {:?}", result),
        EncounterEvent::Damaged { target, amount } => {
            format!("{:?} took {} damage", target, amount)
        }
        EncounterEvent::Healed { target, amount } => format!("{:?} healed {}", target, amount),
        EncounterEvent::Defeated { target } => format!("{:?} defeated", target),
        EncounterEvent::ScoreChanged { score, combo } => {
            format!("score {} (combo {})", score, combo)
        }
        EncounterEvent::CourseCompleted => "course complete".to_string(),
    };
    println!("[{:8.3}s] {}", elapsed, label);
}

fn demo_config() -> SessionConfig {
    let stomp = {
        let mut grid = [false; PATTERN_STEPS];
        for step in [0, 8, 16, 24, 32, 40, 48, 56] {
            grid[step] = true;
        }
        let mut pattern =
            Pattern::from_grid("stomp", 8, 0.25, 3.0, AttackShape::Sphere, &grid).unwrap();
        pattern.telegraph_cue = Some("cue.telegraph.low".into());
        pattern.attack_cue = Some("cue.impact.low".into());
        pattern
    };

    let sweep = {
        let mut grid = [false; PATTERN_STEPS];
        for step in [4, 12, 20, 28, 36, 44, 52, 60] {
            grid[step] = true;
        }
        Pattern::from_grid("sweep", 12, 0.25, 4.0, AttackShape::Cone, &grid).unwrap()
    };

    let barrage = {
        let mut grid = [false; PATTERN_STEPS];
        for step in (0..PATTERN_STEPS).step_by(4) {
            grid[step] = true;
        }
        Pattern::from_grid("barrage", 6, 0.5, 6.0, AttackShape::Line, &grid).unwrap()
    };

    SessionConfig {
        bpm: 200.0,
        beats_per_bar: 4,
        count_in_bars: 1,
        timing: Default::default(),
        encounter: EncounterConfig {
            phases: vec![
                Phase { name: "warmup".into(), health_threshold: 0.6, patterns: vec![stomp] },
                Phase {
                    name: "pressure".into(),
                    health_threshold: 0.25,
                    patterns: vec![sweep.clone(), barrage.clone()],
                },
                Phase { name: "frenzy".into(), health_threshold: 0.0, patterns: vec![sweep, barrage] },
            ],
            attack_cooldown_seconds: 0.1,
        },
        course: CourseConfig {
            checkpoints: vec![
                Checkpoint {
                    is_battle_point: false,
                    pre_battle_wait_bars: 0,
                    post_battle_wait_bars: 0,
                    battle_duration_bars: 0,
                },
                Checkpoint {
                    is_battle_point: true,
                    pre_battle_wait_bars: 2,
                    post_battle_wait_bars: 2,
                    battle_duration_bars: 16,
                },
            ],
        },
        player: rb_core::CombatantConfig::PLAYER_DEFAULT,
        enemy: rb_core::CombatantConfig { max_health: 400, invincibility_seconds: 0.2 },
        player_attack: Default::default(),
    }
}
